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

//! Lifecycle states of an event loop.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Where an event loop is in its lifecycle.
///
/// Transitions only ever move forward: `Ready` → `Running` → `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LoopState {
    /// Constructed; the worker thread has not entered its loop yet.
    Ready = 0,
    /// The worker thread is dispatching jobs.
    Running = 1,
    /// Terminal. The worker has left, or is leaving, its loop.
    Stopped = 2,
}

impl LoopState {
    /// Returns the lowercase name of the state, as used in log messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Ready,
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A [`LoopState`] that can be shared between threads.
///
/// Every write is an "advance": a state can never be moved back to an
/// earlier one, which keeps the lifecycle monotonic even when the worker and
/// a stopping thread race.
#[derive(Debug)]
pub struct AtomicLoopState(AtomicU8);

impl AtomicLoopState {
    /// Creates a cell holding [`LoopState::Ready`].
    pub const fn new() -> Self {
        Self(AtomicU8::new(LoopState::Ready as u8))
    }

    /// Reads the current state.
    #[inline]
    pub fn load(&self) -> LoopState {
        LoopState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves to `next` unless the cell is already at or past it.
    ///
    /// ## Returns
    /// The state held before the call.
    #[inline]
    pub fn advance(&self, next: LoopState) -> LoopState {
        LoopState::from_u8(self.0.fetch_max(next as u8, Ordering::AcqRel))
    }
}

impl Default for AtomicLoopState {
    fn default() -> Self {
        Self::new()
    }
}
