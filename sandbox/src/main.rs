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

//! Drives an event loop through immediate, scheduled, cancelled and failing
//! work. Pass a RON file holding a `LoopConfig` as the first argument to
//! override the defaults.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use cadence_core::{LoopConfig, log_failure};
use cadence_loop::EventLoop;

const TICKS: u32 = 3;
const TICK_INTERVAL: Duration = Duration::from_millis(100);

fn load_config() -> Result<LoopConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let source = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config file {path}"))?;
            let config = LoopConfig::from_ron(&source)?;
            log::info!("Loaded loop configuration from {path}.");
            Ok(config)
        }
        None => Ok(LoopConfig::named("sandbox-loop")),
    }
}

/// Reschedules itself until `TICKS` ticks have fired.
fn schedule_tick(event_loop: Arc<EventLoop>, ticks: Arc<AtomicU32>) -> Result<()> {
    let next_loop = Arc::clone(&event_loop);
    event_loop.submit_scheduled(
        TICK_INTERVAL,
        move || {
            let n = ticks.fetch_add(1, Ordering::SeqCst) + 1;
            log::info!("tick {n}/{TICKS}");
            if n < TICKS {
                schedule_tick(next_loop, ticks)?;
            }
            Ok(())
        },
        log_failure,
    )?;
    Ok(())
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = load_config()?;
    log::info!("Starting event loop with:\n{}", config.to_ron()?);
    let event_loop = Arc::new(EventLoop::new(config)?);

    event_loop.submit(
        || {
            log::info!("immediate job running");
            Ok(())
        },
        log_failure,
    )?;

    event_loop.submit(
        || anyhow::bail!("this job always fails"),
        |err| log::warn!("failure handled by its own handler: {err}"),
    )?;

    let doomed = event_loop.submit_scheduled(
        Duration::from_millis(50),
        || {
            log::error!("cancelled job ran");
            Ok(())
        },
        log_failure,
    )?;
    log::info!("cancelled pending job: {}", event_loop.cancel(&doomed)?);

    let ticks = Arc::new(AtomicU32::new(0));
    schedule_tick(Arc::clone(&event_loop), Arc::clone(&ticks))?;

    // Wait for the tick chain, then stop once the last tick is in.
    let (done_tx, done_rx) = std::sync::mpsc::channel();
    event_loop.submit_scheduled(
        TICK_INTERVAL * (TICKS + 1),
        move || {
            let _ = done_tx.send(());
            Ok(())
        },
        log_failure,
    )?;
    done_rx
        .recv_timeout(TICK_INTERVAL * (TICKS + 10))
        .context("tick chain did not finish")?;

    event_loop.stop()?;
    log::info!(
        "Event loop '{}' is {} after {} ticks.",
        event_loop.name(),
        event_loop.state(),
        ticks.load(Ordering::SeqCst)
    );
    Ok(())
}
