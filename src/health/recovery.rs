//! Delayed, cancellable actions used for endpoint auto-recovery.
//!
//! # Responsibilities
//! - Run a closure after a delay unless it was cancelled first
//! - Work with a Tokio runtime (`TokioScheduler`) or without any event loop
//!   (`ManualScheduler`, driven explicitly by the owner)
//!
//! Staleness is not decided here: the selector tags each action with the
//! endpoint generation it was scheduled for and the action re-checks it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::task::AbortHandle;

/// Work to run once the delay elapses.
pub type ScheduledAction = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run an action later.
pub trait RecoveryScheduler: Send + Sync + fmt::Debug {
    fn schedule(&self, delay: Duration, action: ScheduledAction) -> ScheduledHandle;
}

/// Handle to a scheduled action. Dropping it does not cancel the action.
#[derive(Debug)]
pub struct ScheduledHandle {
    cancelled: Arc<AtomicBool>,
    abort: Option<AbortHandle>,
}

impl ScheduledHandle {
    fn new(cancelled: Arc<AtomicBool>, abort: Option<AbortHandle>) -> Self {
        Self { cancelled, abort }
    }

    /// Handle for a custom scheduler that checks `cancelled` before running the action.
    pub fn from_flag(cancelled: Arc<AtomicBool>) -> Self {
        Self::new(cancelled, None)
    }

    /// Prevent the action from running. No-op if it already ran.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Runs actions on a Tokio runtime after `tokio::time::sleep`.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Bind to the runtime the caller is running in.
    pub fn current() -> Result<Self, TryCurrentError> {
        Handle::try_current().map(Self::from_handle)
    }

    pub fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl RecoveryScheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, action: ScheduledAction) -> ScheduledHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if !flag.load(Ordering::Acquire) {
                action();
            }
        });
        ScheduledHandle::new(cancelled, Some(task.abort_handle()))
    }
}

struct PendingAction {
    due: Duration,
    cancelled: Arc<AtomicBool>,
    action: ScheduledAction,
}

#[derive(Default)]
struct ManualClock {
    now: Duration,
    pending: Vec<PendingAction>,
}

/// Scheduler with a virtual clock, advanced explicitly by its owner.
///
/// Useful where no event loop is available, and in tests.
#[derive(Default, Clone)]
pub struct ManualScheduler {
    inner: Arc<Mutex<ManualClock>>,
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of actions that are neither run nor cancelled.
    pub fn pending(&self) -> usize {
        let clock = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        clock
            .pending
            .iter()
            .filter(|p| !p.cancelled.load(Ordering::Acquire))
            .count()
    }

    /// Move the virtual clock forward and run every action that became due.
    ///
    /// Returns how many actions ran. Actions run outside the internal lock, so
    /// they may schedule further work.
    pub fn advance(&self, by: Duration) -> usize {
        let due = {
            let mut clock = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            clock.now += by;
            let now = clock.now;
            let (due, waiting): (Vec<_>, Vec<_>) =
                clock.pending.drain(..).partition(|p| p.due <= now);
            clock.pending = waiting;
            due
        };

        let mut ran = 0;
        for pending in due {
            if !pending.cancelled.load(Ordering::Acquire) {
                (pending.action)();
                ran += 1;
            }
        }
        ran
    }
}

impl RecoveryScheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, action: ScheduledAction) -> ScheduledHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut clock = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let due = clock.now + delay;
        clock.pending.push(PendingAction {
            due,
            cancelled: cancelled.clone(),
            action,
        });
        ScheduledHandle::new(cancelled, None)
    }
}
