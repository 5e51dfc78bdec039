//! The remote-protocol client boundary.
//!
//! The wire protocol is opaque to this crate. A [`ProtoClient`] owns one
//! connection to one server, multiplexes any number of in-flight calls over
//! it, and reports which readiness directions it currently needs serviced.
//! Completion callbacks fire from inside [`ProtoClient::service`], i.e. from
//! the client's own dispatch stack; see the session and task machinery for
//! the rules that follow from that.

use std::fmt::Debug;

use crate::reactor::RawFd;

/// Raw protocol status: a negative errno-style code on failure, a payload
/// byte count (or zero) on success.
pub type Status = i32;

/// Status values produced by this layer itself.
pub mod status {
    use super::Status;

    pub const EIO: Status = -5;
    pub const EINVAL: Status = -22;
}

/// Readiness interest of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventMask {
    bits: u8,
}

impl EventMask {
    pub const NONE: EventMask = EventMask { bits: 0 };
    pub const READ: EventMask = EventMask { bits: 1 };
    pub const WRITE: EventMask = EventMask { bits: 2 };

    pub fn readable(self) -> bool {
        self.bits & EventMask::READ.bits != 0
    }

    pub fn writable(self) -> bool {
        self.bits & EventMask::WRITE.bits != 0
    }
}

impl std::ops::BitOr for EventMask {
    type Output = EventMask;

    fn bitor(self, rhs: EventMask) -> EventMask {
        EventMask {
            bits: self.bits | rhs.bits,
        }
    }
}

/// Opaque handle to a file opened within a mounted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fh(pub u64);

/// What a remote path resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
    /// Device nodes, fifos, anything else without plain-file semantics.
    Special,
}

/// Stat information for a remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteStat {
    pub kind: FileKind,
    /// Logical size in bytes.
    pub size: u64,
    /// 512-byte units actually allocated on the backing store.
    pub blocks_allocated: u64,
}

/// Payload delivered alongside a completion status.
pub enum Reply<'a> {
    None,
    Data(&'a [u8]),
    Stat(RemoteStat),
}

/// One-shot completion callback for an async protocol call. Fires from
/// inside [`ProtoClient::service`]; dropped unfired if the submission
/// itself failed.
pub type Callback = Box<dyn FnOnce(Status, Reply<'_>)>;

/// A stateful, single-connection remote file-access client.
///
/// Async submissions return `Ok(())` once queued; `Err` means the call
/// could not even be queued (an out-of-resources condition, surfaced to
/// callers without retry).
pub trait ProtoClient: Debug {
    // Connection parameters. Applied before `mount`.
    fn set_uid(&self, uid: u32);
    fn set_gid(&self, gid: u32);
    fn set_tcp_retry_count(&self, count: u32);

    fn mount(&self, server: &str, export: &str) -> Result<(), Status>;
    fn open(&self, path: &str, writable: bool) -> Result<Fh, Status>;
    fn create(&self, path: &str, mode: u32) -> Result<Fh, Status>;
    fn close(&self, fh: Fh);
    fn fstat(&self, fh: Fh) -> Result<RemoteStat, Status>;
    fn truncate(&self, fh: Fh, len: u64) -> Result<(), Status>;

    fn pread_async(&self, fh: Fh, offset: u64, count: usize, cb: Callback) -> Result<(), Status>;
    fn pwrite_async(&self, fh: Fh, offset: u64, data: &[u8], cb: Callback) -> Result<(), Status>;
    fn fsync_async(&self, fh: Fh, cb: Callback) -> Result<(), Status>;
    fn fstat_async(&self, fh: Fh, cb: Callback) -> Result<(), Status>;

    /// Readiness directions the connection currently needs serviced. May
    /// change as a side effect of every submission and every service round.
    fn which_events(&self) -> EventMask;

    /// Descriptor of the underlying connection.
    fn fd(&self) -> RawFd;

    /// Service one round of pending protocol I/O for the given directions.
    /// Completion callbacks fire from inside this call.
    fn service(&self, events: EventMask);

    /// Human-readable text for the most recent failure.
    fn last_error(&self) -> String;
}
