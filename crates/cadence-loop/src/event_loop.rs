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

//! The event loop: one worker thread serializing every job submitted to it.
//!
//! Producers hand work to the worker through an [`ImmediateQueue`]. Deferred
//! work lives in a [`TimedJobQueue`] that only the worker thread touches;
//! requests to insert into it or cancel from it travel through the immediate
//! queue as commands, so the timed queue needs no lock.
//!
//! The worker repeats three steps:
//!
//! 1. run the earliest scheduled job if it is due,
//! 2. otherwise wait on the immediate queue, bounded by the time until the
//!    next scheduled deadline (unbounded if nothing is scheduled),
//! 3. run whatever arrived, or go back to step 1 on timeout.
//!
//! A failing job is routed to its own error handler. A panicking error handler
//! terminates the loop; that outcome is reported by
//! [`EventLoop::await_termination`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cadence_core::job::panic_message;
use cadence_core::{
    AtomicLoopState, Clock, HandlerPanic, Job, LoopConfig, LoopError, LoopResult, LoopState,
    SystemClock,
};
use crossbeam_channel::Sender;

use crate::immediate::{ImmediateQueue, ImmediateSender, Taken};
use crate::timed_queue::{ScheduledHandle, TimedJobQueue};

/// Source of the process-unique id given to each loop.
static NEXT_LOOP_ID: AtomicU64 = AtomicU64::new(1);

fn next_loop_id() -> u64 {
    NEXT_LOOP_ID.fetch_add(1, Ordering::Relaxed)
}

/// Requests carried to the worker through the immediate queue.
enum Command {
    Run(Job),
    Schedule {
        delay: Duration,
        job: Job,
        reply: Sender<ScheduledHandle>,
    },
    Cancel {
        handle: ScheduledHandle,
        reply: Sender<bool>,
    },
    Stop,
}

/// How the worker thread left its loop.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Termination {
    Orderly,
    HandlerPanicked(String),
    WorkerPanicked(String),
}

impl Termination {
    fn to_result(&self) -> LoopResult<()> {
        match self {
            Termination::Orderly => Ok(()),
            Termination::HandlerPanicked(msg) => Err(LoopError::HandlerPanicked(msg.clone())),
            Termination::WorkerPanicked(msg) => Err(LoopError::WorkerPanicked(msg.clone())),
        }
    }
}

impl From<HandlerPanic> for Termination {
    fn from(panic: HandlerPanic) -> Self {
        Termination::HandlerPanicked(panic.message)
    }
}

#[derive(Debug)]
struct Shared {
    id: u64,
    name: String,
    state: AtomicLoopState,
}

#[derive(Debug)]
struct WorkerSlot {
    thread: Option<JoinHandle<Termination>>,
    outcome: Option<Termination>,
}

/// What the worker thread publishes about itself to code running on it.
struct WorkerContext {
    loop_id: u64,
    timed: Rc<RefCell<TimedJobQueue>>,
    clock: Arc<dyn Clock>,
}

thread_local! {
    static WORKER: RefCell<Option<WorkerContext>> = const { RefCell::new(None) };
}

/// Returns `true` if the calling thread is the worker of loop `loop_id`.
fn is_worker_of(loop_id: u64) -> bool {
    WORKER.with(|slot| matches!(&*slot.borrow(), Some(ctx) if ctx.loop_id == loop_id))
}

/// Runs `f` against the timed queue if the calling thread is the worker of
/// loop `loop_id`.
fn on_own_worker<R>(
    loop_id: u64,
    f: impl FnOnce(&mut TimedJobQueue, &dyn Clock) -> R,
) -> Option<R> {
    WORKER.with(|slot| {
        let slot = slot.borrow();
        let ctx = slot.as_ref().filter(|ctx| ctx.loop_id == loop_id)?;
        let mut timed = ctx.timed.borrow_mut();
        Some(f(&mut *timed, ctx.clock.as_ref()))
    })
}

/// Installs the worker context for the lifetime of the dispatch loop and
/// marks the loop stopped when the worker leaves, even by unwinding.
struct WorkerGuard {
    shared: Arc<Shared>,
}

impl WorkerGuard {
    fn install(shared: Arc<Shared>, context: WorkerContext) -> Self {
        WORKER.with(|slot| *slot.borrow_mut() = Some(context));
        Self { shared }
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.shared.state.advance(LoopState::Stopped);
        // Take the context out first so pending jobs are dropped outside the borrow.
        let context = WORKER.with(|slot| slot.borrow_mut().take());
        drop(context);
    }
}

/// Due time for a job scheduled `delay` after `now_ms`.
///
/// Sub-millisecond remainders round up so a job never becomes due early.
fn due_after(now_ms: u64, delay: Duration) -> u64 {
    let mut delay_ms = delay.as_millis();
    if delay.subsec_nanos() % 1_000_000 != 0 {
        delay_ms += 1;
    }
    now_ms.saturating_add(u64::try_from(delay_ms).unwrap_or(u64::MAX))
}

/// A single-threaded dispatcher for immediate and deferred jobs.
///
/// All methods take `&self`; share the loop between producer threads with an
/// [`Arc`]. Job bodies always run on the loop's worker thread, one at a time,
/// so they may mutate state they capture without further synchronization.
pub struct EventLoop {
    shared: Arc<Shared>,
    sender: ImmediateSender<Command>,
    worker: Mutex<WorkerSlot>,
}

impl EventLoop {
    /// Starts a loop driven by the system clock.
    pub fn new(config: LoopConfig) -> LoopResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Starts a loop whose scheduling decisions are made against `clock`.
    ///
    /// The worker thread is spawned before this returns.
    pub fn with_clock(config: LoopConfig, clock: Arc<dyn Clock>) -> LoopResult<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            id: next_loop_id(),
            name: config.thread_name.clone(),
            state: AtomicLoopState::new(),
        });
        let (sender, queue) = ImmediateQueue::new();

        let mut builder = thread::Builder::new().name(config.thread_name);
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let worker_shared = Arc::clone(&shared);
        let thread = builder
            .spawn(move || dispatch(worker_shared, queue, clock))
            .map_err(LoopError::Spawn)?;

        log::debug!("Event loop '{}' (#{}) spawned.", shared.name, shared.id);

        Ok(Self {
            shared,
            sender,
            worker: Mutex::new(WorkerSlot {
                thread: Some(thread),
                outcome: None,
            }),
        })
    }

    /// Identifier of this loop, carried by every handle it issues.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Name of the worker thread.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LoopState {
        self.shared.state.load()
    }

    /// Returns `true` while the worker is dispatching jobs.
    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Running
    }

    /// Queues `action` to run as soon as the loop is free.
    ///
    /// Immediate jobs run in arrival order. If `action` fails, by returning an
    /// error or panicking, `on_error` receives the failure on the worker thread.
    pub fn submit<A, H>(&self, action: A, on_error: H) -> LoopResult<()>
    where
        A: FnOnce() -> anyhow::Result<()> + Send + 'static,
        H: FnOnce(anyhow::Error) + Send + 'static,
    {
        self.submit_job(Job::new(action, on_error))
    }

    /// Queues a prepared [`Job`].
    pub fn submit_job(&self, job: Job) -> LoopResult<()> {
        self.send(Command::Run(job))
    }

    /// Schedules `action` to run no earlier than `delay` from now.
    ///
    /// Blocks until the worker has recorded the job, so the returned handle
    /// can be cancelled immediately. Called from a job on this loop's own
    /// worker, the job is recorded directly instead.
    pub fn submit_scheduled<A, H>(
        &self,
        delay: Duration,
        action: A,
        on_error: H,
    ) -> LoopResult<ScheduledHandle>
    where
        A: FnOnce() -> anyhow::Result<()> + Send + 'static,
        H: FnOnce(anyhow::Error) + Send + 'static,
    {
        self.schedule_job(delay, Job::new(action, on_error))
    }

    /// Schedules a prepared [`Job`]. See [`submit_scheduled`](Self::submit_scheduled).
    pub fn schedule_job(&self, delay: Duration, job: Job) -> LoopResult<ScheduledHandle> {
        self.ensure_accepting()?;

        // The worker would wait on its own queue, so it inserts directly.
        if is_worker_of(self.shared.id) {
            return on_own_worker(self.shared.id, |timed, clock| {
                timed.offer(due_after(clock.now_ms(), delay), job)
            })
            .ok_or(LoopError::OnWorkerThread);
        }

        let (reply, response) = crossbeam_channel::bounded(1);
        self.send(Command::Schedule { delay, job, reply })?;
        response.recv().map_err(|_| LoopError::Stopped)
    }

    /// Cancels a scheduled job.
    ///
    /// Cancellation is not preemptive: a job that has started runs to
    /// completion regardless.
    ///
    /// ## Returns
    /// `Ok(true)` if the job was still pending and will now never run,
    /// `Ok(false)` if it already ran or was already cancelled.
    pub fn cancel(&self, handle: &ScheduledHandle) -> LoopResult<bool> {
        if handle.owner() != self.shared.id {
            return Err(LoopError::ForeignHandle);
        }
        if let Some(cancelled) = on_own_worker(self.shared.id, |timed, _| timed.cancel(handle)) {
            return Ok(cancelled);
        }
        self.ensure_accepting()?;

        let (reply, response) = crossbeam_channel::bounded(1);
        self.send(Command::Cancel {
            handle: *handle,
            reply,
        })?;
        response.recv().map_err(|_| LoopError::Stopped)
    }

    /// Stops the loop and waits for the worker thread to exit.
    ///
    /// The stop request is queued behind immediate jobs already submitted,
    /// which still run. When the worker reaches it, every scheduled job
    /// already due runs as well. Anything still queued behind it, and every
    /// scheduled job that is not yet due, is dropped without running.
    ///
    /// Called from a job on this loop, the loop is marked stopped and the call
    /// returns at once; the worker exits after the current job.
    pub fn stop(&self) -> LoopResult<()> {
        if is_worker_of(self.shared.id) {
            let previous = self.shared.state.advance(LoopState::Stopped);
            log::debug!("Event loop '{}' stopped from its own worker ({previous}).", self.shared.name);
            return Ok(());
        }

        if self.sender.offer(Command::Stop).is_err() {
            log::trace!("Event loop '{}' already gone, awaiting outcome.", self.shared.name);
        }
        self.await_termination()
    }

    /// Blocks until the worker thread has exited.
    ///
    /// Any number of threads may wait. After this returns the worker thread
    /// is no longer alive.
    ///
    /// ## Returns
    /// `Ok(())` after an orderly stop, or the failure that took the loop down.
    pub fn await_termination(&self) -> LoopResult<()> {
        if is_worker_of(self.shared.id) {
            return Err(LoopError::OnWorkerThread);
        }

        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(thread) = worker.thread.take() {
            let outcome = thread.join().unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                log::error!("Event loop '{}' worker panicked: {message}", self.shared.name);
                Termination::WorkerPanicked(message)
            });
            worker.outcome = Some(outcome);
        }

        worker
            .outcome
            .as_ref()
            .map_or(Ok(()), Termination::to_result)
    }

    fn ensure_accepting(&self) -> LoopResult<()> {
        if self.state() == LoopState::Stopped {
            log::warn!("Event loop '{}' has stopped, rejecting submission.", self.shared.name);
            return Err(LoopError::Stopped);
        }
        Ok(())
    }

    fn send(&self, command: Command) -> LoopResult<()> {
        self.ensure_accepting()?;
        self.sender.offer(command).map_err(|_| {
            log::warn!("Event loop '{}' worker is gone, rejecting submission.", self.shared.name);
            LoopError::Stopped
        })
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        if is_worker_of(self.shared.id) {
            // Cannot join ourselves; the worker exits after the current job.
            self.shared.state.advance(LoopState::Stopped);
            return;
        }
        let joined = self
            .worker
            .lock()
            .map(|worker| worker.thread.is_none())
            .unwrap_or(true);
        if joined {
            return;
        }
        if let Err(e) = self.stop() {
            log::error!("Event loop '{}' terminated abnormally: {e}", self.shared.name);
        }
    }
}

/// Body of the worker thread.
fn dispatch(
    shared: Arc<Shared>,
    queue: ImmediateQueue<Command>,
    clock: Arc<dyn Clock>,
) -> Termination {
    let timed = Rc::new(RefCell::new(TimedJobQueue::new(shared.id)));
    let _guard = WorkerGuard::install(
        Arc::clone(&shared),
        WorkerContext {
            loop_id: shared.id,
            timed: Rc::clone(&timed),
            clock: Arc::clone(&clock),
        },
    );

    if shared.state.advance(LoopState::Running) == LoopState::Ready {
        log::debug!("Event loop '{}' started.", shared.name);
    }

    let termination = loop {
        if shared.state.load() != LoopState::Running {
            break Termination::Orderly;
        }

        let now = clock.now_ms();
        let due = timed.borrow_mut().poll_due(now);
        if let Some(job) = due {
            log::trace!("Event loop '{}' running scheduled job.", shared.name);
            if let Err(panic) = job.run() {
                break panic.into();
            }
            continue;
        }

        let wait = timed.borrow_mut().time_until_next(now);
        match queue.take_with_timeout(wait) {
            Taken::Item(command) => {
                if let Err(panic) = execute(&shared, &timed, clock.as_ref(), command) {
                    break panic.into();
                }
            }
            Taken::TimedOut => {}
            Taken::Disconnected => {
                log::warn!(
                    "Event loop '{}' lost every producer, shutting down.",
                    shared.name
                );
                break Termination::Orderly;
            }
        }
    };

    shared.state.advance(LoopState::Stopped);
    if let Termination::HandlerPanicked(message) = &termination {
        log::error!(
            "Event loop '{}' terminated: error handler panicked: {message}",
            shared.name
        );
    }

    // Leftovers are dropped while the worker context is still installed, so a
    // job owning the last reference to this loop does not try to join it.
    let dropped_immediate = queue.drain().count();
    drop(queue);
    let leftovers = std::mem::take(&mut *timed.borrow_mut());
    let dropped_scheduled = leftovers.len();
    drop(leftovers);
    log::debug!(
        "Event loop '{}' stopped ({dropped_immediate} queued and {dropped_scheduled} scheduled jobs dropped).",
        shared.name
    );

    termination
}

/// Carries out one command on the worker thread.
fn execute(
    shared: &Shared,
    timed: &RefCell<TimedJobQueue>,
    clock: &dyn Clock,
    command: Command,
) -> Result<(), HandlerPanic> {
    match command {
        Command::Run(job) => {
            log::trace!("Event loop '{}' running immediate job.", shared.name);
            job.run()
        }
        Command::Schedule { delay, job, reply } => {
            let handle = timed
                .borrow_mut()
                .offer(due_after(clock.now_ms(), delay), job);
            // The submitter blocks on the reply, so it is always still there.
            let _ = reply.send(handle);
            Ok(())
        }
        Command::Cancel { handle, reply } => {
            let cancelled = timed.borrow_mut().cancel(&handle);
            let _ = reply.send(cancelled);
            Ok(())
        }
        Command::Stop => {
            // Stopped before draining: jobs run here cannot schedule more work.
            shared.state.advance(LoopState::Stopped);
            let stop_ms = clock.now_ms();
            let mut ran = 0usize;
            loop {
                let due = timed.borrow_mut().poll_due(stop_ms);
                let Some(job) = due else { break };
                job.run()?;
                ran += 1;
            }
            if ran > 0 {
                log::debug!(
                    "Event loop '{}' ran {ran} due scheduled jobs before stopping.",
                    shared.name
                );
            }
            Ok(())
        }
    }
}
