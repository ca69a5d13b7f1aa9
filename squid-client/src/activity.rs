//! Request activity tracking
//!
//! Every request sent through [`crate::ApiClient`] registers a task here
//! for its duration, which lets a host show a global busy indicator along
//! with the last error and status message.
//!
//! The state is published on a `watch` channel. Task bookkeeping happens
//! under a short synchronous lock, so the published running count always
//! matches the set of live tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use squid_model::{ApiError, JobStatus};
use tokio::sync::watch;

/// Identity of one tracked task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

/// Snapshot published to subscribers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityState {
    pub running_count: usize,
    /// `None` until the first task starts.
    pub status: Option<JobStatus>,
    pub last_error: Option<ApiError>,
    pub message: Option<String>,
}

impl ActivityState {
    pub fn is_running(&self) -> bool {
        self.status == Some(JobStatus::Running)
    }
}

#[derive(Debug)]
struct Inner {
    tasks: Mutex<Vec<TaskId>>,
    next_id: AtomicU64,
    sender: watch::Sender<ActivityState>,
}

/// Shared tracker; clones observe the same state.
#[derive(Debug, Clone)]
pub struct ActivityTracker {
    inner: Arc<Inner>,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTracker {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(ActivityState::default());
        Self {
            inner: Arc::new(Inner {
                tasks: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                sender,
            }),
        }
    }

    /// Registers a new task. The first running task switches the status to
    /// RUNNING.
    pub fn track_start(&self) -> TaskId {
        let id = TaskId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let mut tasks = self.inner.tasks.lock();
        tasks.push(id);
        let running = tasks.len();
        self.inner.sender.send_modify(|state| {
            state.running_count = running;
            state.status = Some(JobStatus::Running);
        });
        log::trace!("[Activity] running tasks count: {}", running);
        id
    }

    /// Unregisters `task`. Unknown ids are ignored. When no task is left the
    /// status becomes DONE.
    pub fn track_end(&self, task: TaskId) {
        let mut tasks = self.inner.tasks.lock();
        if let Some(pos) = tasks.iter().position(|id| *id == task) {
            tasks.remove(pos);
        }
        let running = tasks.len();
        self.inner.sender.send_modify(|state| {
            state.running_count = running;
            if running == 0 {
                state.status = Some(JobStatus::Done);
            }
        });
        log::trace!("[Activity] running tasks count: {}", running);
    }

    /// Starts a task that ends when the returned guard is dropped.
    pub fn begin(&self) -> TaskGuard {
        TaskGuard {
            tracker: self.clone(),
            id: self.track_start(),
        }
    }

    pub fn record_error(&self, error: ApiError) {
        self.inner
            .sender
            .send_modify(|state| state.last_error = Some(error));
    }

    pub fn clear_error(&self) {
        self.inner.sender.send_modify(|state| state.last_error = None);
    }

    pub fn last_error(&self) -> Option<ApiError> {
        self.inner.sender.borrow().last_error.clone()
    }

    pub fn set_message(&self, message: impl Into<String>) {
        let message = message.into();
        self.inner
            .sender
            .send_modify(|state| state.message = Some(message));
    }

    pub fn message(&self) -> Option<String> {
        self.inner.sender.borrow().message.clone()
    }

    pub fn running_count(&self) -> usize {
        self.inner.sender.borrow().running_count
    }

    pub fn status(&self) -> Option<JobStatus> {
        self.inner.sender.borrow().status
    }

    pub fn state(&self) -> ActivityState {
        self.inner.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ActivityState> {
        self.inner.sender.subscribe()
    }
}

/// Ends its task on drop, including on early return, panic unwinding and
/// cancellation of the owning future.
#[derive(Debug)]
#[must_use = "the task ends as soon as the guard is dropped"]
pub struct TaskGuard {
    tracker: ActivityTracker,
    id: TaskId,
}

impl TaskGuard {
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.tracker.track_end(self.id);
    }
}
