//! Completion correlation between one submitted protocol call and the
//! context waiting on it.
//!
//! The one rule that everything here serves: a suspended waiter is never
//! woken from inside the protocol client's dispatch stack. Completion only
//! records the outcome and queues a one-shot deferred callback on the
//! reactor; the wake happens when the reactor runs that callback on its own
//! dispatch.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use super::proto::{status, Callback, RemoteStat, Reply, Status};
use super::session::Session;
use crate::block::{BlockError, BlockResult};

/// Correlation record for one in-flight protocol call.
///
/// Created immediately before submission, completed exactly once by the
/// client's callback, consumed exactly once by the waiter, then dropped.
/// Never reused, never pooled.
#[derive(Debug, Default)]
pub(super) struct Task {
    complete: Cell<bool>,
    status: Cell<Status>,
    read_buf: RefCell<Option<ReadBuf>>,
    stat: Cell<Option<RemoteStat>>,
    waker: RefCell<Option<Waker>>,
}

/// Capacity-bounded staging area for a read payload.
#[derive(Debug)]
struct ReadBuf {
    data: Vec<u8>,
    cap: usize,
}

impl Task {
    pub fn new() -> Rc<Task> {
        Rc::new(Task::default())
    }

    /// A task expecting a read payload of at most `cap` bytes.
    pub fn with_read_buf(cap: usize) -> Rc<Task> {
        let task = Task::default();
        *task.read_buf.borrow_mut() = Some(ReadBuf {
            data: Vec::with_capacity(cap),
            cap,
        });
        Rc::new(task)
    }

    pub fn is_complete(&self) -> bool {
        self.complete.get()
    }

    /// Raw status. Meaningful only once [`Task::is_complete`] is true.
    pub fn status(&self) -> Status {
        self.status.get()
    }

    pub fn take_stat(&self) -> Option<RemoteStat> {
        self.stat.take()
    }

    /// Consume the staged read payload.
    pub fn take_read_buf(&self) -> Vec<u8> {
        match self.read_buf.borrow_mut().take() {
            Some(buf) => buf.data,
            None => Vec::new(),
        }
    }

    /// Build the one-shot completion callback for `task`, to be handed to
    /// an async submission on `session`'s client.
    pub fn completion(task: &Rc<Task>, session: &Rc<Session>) -> Callback {
        let task = Rc::clone(task);
        let session = Rc::clone(session);
        Box::new(move |status, reply| task.finish(status, reply, &session))
    }

    fn finish(&self, status: Status, reply: Reply<'_>, session: &Rc<Session>) {
        debug_assert!(!self.complete.get(), "task completed twice");
        self.complete.set(true);

        let mut status = status;
        match reply {
            Reply::Data(payload) if status > 0 => {
                if let Some(buf) = self.read_buf.borrow_mut().as_mut() {
                    if payload.len() > buf.cap {
                        // more data than requested is a protocol violation;
                        // the staged payload stays empty
                        status = status::EIO;
                    } else {
                        buf.data.extend_from_slice(payload);
                    }
                }
            }
            Reply::Stat(st) if status == 0 => self.stat.set(Some(st)),
            _ => {}
        }
        if status < 0 {
            if let Some(client) = session.client() {
                warn!("remote call failed (status {}): {}", status, client.last_error());
            }
        }
        self.status.set(status);

        if let Some(waker) = self.waker.borrow_mut().take() {
            // wake strictly outside the client's dispatch stack
            session.reactor().defer(Box::new(move || waker.wake()));
        }
    }

    /// Suspend until the task completes. Re-arms readiness on every poll,
    /// since interest may have shifted under us.
    pub fn wait(task: &Rc<Task>, session: &Rc<Session>) -> Wait {
        Wait {
            task: Rc::clone(task),
            session: Rc::clone(session),
        }
    }
}

/// Future half of the waiting protocol: the single suspension point of a
/// block operation.
pub(super) struct Wait {
    task: Rc<Task>,
    session: Rc<Session>,
}

impl Future for Wait {
    type Output = BlockResult<Status>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.task.is_complete() {
            return Poll::Ready(Ok(self.task.status()));
        }
        if let Err(e) = self.session.sync_events() {
            return Poll::Ready(Err(BlockError::Reactor(e)));
        }
        *self.task.waker.borrow_mut() = Some(cx.waker().clone());
        Poll::Pending
    }
}
