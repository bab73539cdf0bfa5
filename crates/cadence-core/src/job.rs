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

//! The unit of work dispatched by an event loop.
//!
//! A [`Job`] pairs an action with the handler that receives the action's
//! failure. Both halves are consumed when the job runs, so a job executes at
//! most once.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

/// The work half of a [`Job`].
pub type Action = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

/// The failure half of a [`Job`], invoked with the action's error.
pub type ErrorHandler = Box<dyn FnOnce(anyhow::Error) + Send + 'static>;

/// Raised when a job's error handler itself panics.
///
/// This is the one failure an event loop does not absorb: it terminates the
/// loop that was running the job.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("error handler panicked: {message}")]
pub struct HandlerPanic {
    /// The panic payload rendered as text.
    pub message: String,
}

/// An action together with the handler for its failure.
pub struct Job {
    action: Action,
    on_error: ErrorHandler,
}

impl Job {
    /// Creates a job from an action and the handler that receives its failure.
    pub fn new<A, H>(action: A, on_error: H) -> Self
    where
        A: FnOnce() -> anyhow::Result<()> + Send + 'static,
        H: FnOnce(anyhow::Error) + Send + 'static,
    {
        Self {
            action: Box::new(action),
            on_error: Box::new(on_error),
        }
    }

    /// Creates a job whose failures are only logged.
    pub fn logged<A>(action: A) -> Self
    where
        A: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self::new(action, log_failure)
    }

    /// Runs the action, routing any failure to the error handler.
    ///
    /// An `Err` returned by the action and a panic raised inside it are both
    /// delivered to the handler; neither escapes this call.
    ///
    /// ## Returns
    /// `Err(HandlerPanic)` only if the error handler panicked.
    pub fn run(self) -> Result<(), HandlerPanic> {
        let Job { action, on_error } = self;

        let failure = match panic::catch_unwind(AssertUnwindSafe(action)) {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(err)) => err,
            Err(payload) => anyhow::anyhow!("job panicked: {}", panic_message(payload.as_ref())),
        };

        log::trace!("Job failed, invoking its error handler: {failure:#}");
        panic::catch_unwind(AssertUnwindSafe(move || on_error(failure))).map_err(|payload| {
            HandlerPanic {
                message: panic_message(payload.as_ref()),
            }
        })
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").finish_non_exhaustive()
    }
}

/// The default error handler: logs the failure and does nothing else.
pub fn log_failure(err: anyhow::Error) {
    log::error!("An unexpected error has occurred: {err:#}");
}

/// Renders a panic payload as text.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
