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

//! Monotonic time sources used by the event loop to make scheduling decisions.
//!
//! Every timestamp handed out by a [`Clock`] is a count of milliseconds on a
//! monotonic timeline. The absolute origin is meaningless; only differences
//! between two readings of the same clock are.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// A monotonic millisecond time source.
///
/// Implementations must never return a value smaller than one previously
/// returned from the same instance.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current time in milliseconds.
    fn now_ms(&self) -> u64;
}

/// Process-wide epoch shared by every [`SystemClock`].
static EPOCH: OnceLock<Instant> = OnceLock::new();

/// The host's monotonic clock, measured from a process-wide epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Creates a handle to the system clock.
    /// ## Returns
    /// A new instance of the SystemClock struct.
    #[inline]
    pub fn new() -> Self {
        Self
    }

    /// Returns the time elapsed since the process-wide epoch.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        EPOCH.get_or_init(Instant::now).elapsed()
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }
}

/// A virtual clock that only moves when told to.
///
/// Intended for tests: scheduling decisions made against a `ManualClock`
/// are fully deterministic, independent of how long the host takes.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a manual clock reading `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    /// Moves the clock to `ms`.
    ///
    /// Attempts to move backwards are ignored so the clock stays monotonic.
    /// ## Returns
    /// The time the clock reads after the call.
    pub fn set(&self, ms: u64) -> u64 {
        let previous = self.now.fetch_max(ms, Ordering::SeqCst);
        if ms < previous {
            log::warn!("ManualClock cannot move backwards ({previous}ms -> {ms}ms), ignoring");
        }
        previous.max(ms)
    }

    /// Moves the clock forward by `by`, saturating at `u64::MAX`.
    /// ## Returns
    /// The time the clock reads after the call.
    pub fn advance(&self, by: Duration) -> u64 {
        let by = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        let previous = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.saturating_add(by))
            })
            .unwrap_or_else(|now| now);
        previous.saturating_add(by)
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const SLEEP_DURATION_MS: u64 = 50;
    const SLEEP_MARGIN_MS: u64 = 500;

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let mut last = clock.now_ms();
        for _ in 0..1000 {
            let now = clock.now_ms();
            assert!(now >= last, "SystemClock went backwards: {last} -> {now}");
            last = now;
        }
    }

    #[test]
    fn system_clock_tracks_real_time() {
        let clock = SystemClock::new();
        let before = clock.now_ms();
        thread::sleep(Duration::from_millis(SLEEP_DURATION_MS));
        let elapsed = clock.now_ms() - before;
        assert!(
            elapsed >= SLEEP_DURATION_MS,
            "Elapsed ms ({elapsed}) should be >= sleep duration ms ({SLEEP_DURATION_MS})"
        );
        assert!(
            elapsed < SLEEP_DURATION_MS + SLEEP_MARGIN_MS,
            "Elapsed ms ({elapsed}) should be < sleep duration ms + margin"
        );
    }

    #[test]
    fn system_clocks_share_an_epoch() {
        let a = SystemClock::new();
        let b = SystemClock::default();
        let (ta, tb) = (a.now_ms(), b.now_ms());
        assert!(ta.abs_diff(tb) < 5, "Two system clocks disagree: {ta} vs {tb}");
    }

    #[test]
    fn manual_clock_only_moves_when_told() {
        let clock = ManualClock::new(0);
        assert_eq!(clock.now_ms(), 0);
        thread::sleep(Duration::from_millis(5));
        assert_eq!(clock.now_ms(), 0);

        assert_eq!(clock.advance(Duration::from_millis(60)), 60);
        assert_eq!(clock.now_ms(), 60);
        assert_eq!(clock.set(110), 110);
        assert_eq!(clock.now_ms(), 110);
    }

    #[test]
    fn manual_clock_refuses_to_go_backwards() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.set(40), 100);
        assert_eq!(clock.now_ms(), 100);
    }

    #[test]
    fn manual_clock_advance_saturates_instead_of_wrapping() {
        let clock = ManualClock::new(u64::MAX - 5);
        assert_eq!(clock.advance(Duration::from_millis(10)), u64::MAX);
        assert_eq!(clock.now_ms(), u64::MAX);

        assert_eq!(clock.advance(Duration::MAX), u64::MAX);
        assert_eq!(clock.now_ms(), u64::MAX);
    }

    #[test]
    fn manual_clock_is_usable_as_trait_object() {
        let clock: std::sync::Arc<dyn Clock> = std::sync::Arc::new(ManualClock::new(7));
        assert_eq!(clock.now_ms(), 7);
    }
}
