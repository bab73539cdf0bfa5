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

//! # Cadence Core
//!
//! Foundational crate containing the contracts shared by the cadence event
//! loop: the [`Clock`] abstraction, the [`Job`] record, lifecycle states,
//! errors and configuration.

#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod error;
pub mod job;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LoopConfig;
pub use error::{LoopError, LoopResult};
pub use job::{log_failure, HandlerPanic, Job};
pub use state::{AtomicLoopState, LoopState};
