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

//! # Cadence Loop
//!
//! A per-instance event loop that serializes work submitted from many
//! threads onto one dedicated worker thread, including work deferred to a
//! future point in time.
//!
//! ```rust,ignore
//! use cadence_loop::{EventLoop, LoopConfig};
//! use std::time::Duration;
//!
//! let event_loop = EventLoop::new(LoopConfig::named("io"))?;
//! event_loop.submit(|| { println!("now"); Ok(()) }, cadence_core::log_failure)?;
//! let handle = event_loop.submit_scheduled(
//!     Duration::from_millis(50),
//!     || { println!("later"); Ok(()) },
//!     cadence_core::log_failure,
//! )?;
//! event_loop.cancel(&handle)?;
//! event_loop.stop()?;
//! ```

#![warn(missing_docs)]

pub mod event_loop;
pub mod immediate;
pub mod timed_queue;

pub use cadence_core::{Clock, Job, LoopConfig, LoopError, LoopResult, LoopState, ManualClock};
pub use event_loop::EventLoop;
pub use immediate::{ImmediateQueue, ImmediateSender, Taken};
pub use timed_queue::{ScheduledHandle, TimedJobQueue};
