//! The reactor boundary.
//!
//! The machine runs one reactor loop on one thread; everything else is
//! cooperative. This crate never polls descriptors itself. It consumes a
//! readiness-notification service through the [`Reactor`] trait and leaves
//! the actual mechanism (epoll, kqueue, IOCP, a hand-cranked fake in tests)
//! to whoever embeds it.

use std::fmt::Debug;
use std::io;

/// Platform-neutral descriptor handle for a registered connection.
pub type RawFd = i32;

/// Readiness handler. Invoked by the reactor whenever the registered
/// direction becomes ready; may be invoked any number of times.
pub type IoHandler = Box<dyn Fn()>;

/// One-shot callback scheduled onto the reactor's own dispatch queue.
pub type Deferred = Box<dyn FnOnce()>;

/// Readiness-notification service driving this crate's sessions.
pub trait Reactor: Debug {
    /// Register (or re-register) `fd`. A direction with no handler is not
    /// watched; passing `None` for both directions deregisters `fd`
    /// entirely. Replaces any previous registration for the descriptor.
    fn register(
        &self,
        fd: RawFd,
        readable: Option<IoHandler>,
        writable: Option<IoHandler>,
    ) -> io::Result<()>;

    /// Queue a one-shot callback to run from the reactor's own dispatch,
    /// strictly outside any handler or library call stack currently on the
    /// stack.
    fn defer(&self, callback: Deferred);

    /// Run one blocking reactor iteration: wait for readiness on the
    /// registered descriptors, dispatch their handlers, then drain deferred
    /// callbacks. Used by synchronous callers that cannot suspend.
    fn wait_dispatch(&self) -> io::Result<()>;
}
