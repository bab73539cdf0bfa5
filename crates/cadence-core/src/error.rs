// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Errors reported by event loop operations.

use std::io;

use thiserror::Error;

use crate::job::HandlerPanic;

/// A specialized `Result` type for event loop operations.
pub type LoopResult<T> = Result<T, LoopError>;

/// An error returned by an event loop operation.
#[derive(Debug, Error)]
pub enum LoopError {
    /// The loop has stopped and no longer accepts work.
    #[error("event loop has stopped")]
    Stopped,

    /// The worker thread could not be spawned.
    #[error("failed to spawn event loop worker thread: {0}")]
    Spawn(#[source] io::Error),

    /// An error handler panicked and took the loop down.
    #[error("event loop terminated by a failing error handler: {0}")]
    HandlerPanicked(String),

    /// The worker thread panicked outside of any job.
    #[error("event loop worker thread panicked: {0}")]
    WorkerPanicked(String),

    /// A scheduled handle issued by a different loop was presented.
    #[error("scheduled handle belongs to another event loop")]
    ForeignHandle,

    /// The operation would block the loop's own worker thread on itself.
    #[error("operation cannot be performed from the event loop's own worker thread")]
    OnWorkerThread,

    /// The loop configuration is invalid.
    #[error("invalid event loop configuration: {0}")]
    Config(String),
}

impl From<HandlerPanic> for LoopError {
    fn from(panic: HandlerPanic) -> Self {
        LoopError::HandlerPanicked(panic.message)
    }
}
