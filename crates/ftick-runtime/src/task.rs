#![forbid(unsafe_code)]

//! Task plumbing: ids, wakers and the loop's inbound message channel.
//!
//! Tasks are `!Send` futures owned by exactly one [`EventLoop`]. Their wakers
//! are `Send + Sync`, but waking never polls anything: it only posts
//! [`LoopMsg::Wake`] on the loop's channel. The loop picks the message up on
//! its own thread and polls the task there, so a continuation always resumes
//! on the loop no matter which thread completed the wait.
//!
//! [`EventLoop`]: crate::event_loop::EventLoop

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::mpsc;
use std::task::{Wake, Waker};

use ftick_core::Lifetime;

use crate::error::RuntimeResult;

pub(crate) type TaskId = u64;

/// A boxed, pinned, loop-local future.
pub(crate) type LocalTask = Pin<Box<dyn Future<Output = RuntimeResult<()>>>>;

/// Messages posted to a loop, possibly from other threads.
pub(crate) enum LoopMsg {
    /// Re-poll a suspended task.
    Wake(TaskId),
    /// Run a closure on the loop.
    Invoke(Box<dyn FnOnce() -> RuntimeResult<()> + Send>),
    /// Request a graceful stop.
    Stop,
}

/// Waker that marshals wake-ups back onto the owning loop.
pub(crate) struct TaskWaker {
    id: TaskId,
    tx: mpsc::Sender<LoopMsg>,
}

impl TaskWaker {
    pub(crate) fn waker(id: TaskId, tx: mpsc::Sender<LoopMsg>) -> Waker {
        Waker::from(Arc::new(Self { id, tx }))
    }
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        // A closed channel means the loop is gone; nothing left to resume.
        let _ = self.tx.send(LoopMsg::Wake(self.id));
    }
}

/// Loop-side bookkeeping for one task.
pub(crate) struct TaskSlot {
    /// `None` while the task is being polled.
    pub(crate) future: Option<LocalTask>,
    pub(crate) waker: Waker,
    pub(crate) lifetime: Lifetime,
    /// Whether a poll is already queued; collapses duplicate wakes.
    pub(crate) queued: bool,
}
