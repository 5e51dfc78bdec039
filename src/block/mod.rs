//! Block device interface and backend implementations.

use std::fmt::Debug;

use async_trait::async_trait;
use static_assertions::const_assert;
use thiserror::Error;

pub mod backend;
pub mod iovec;
pub mod locator;
pub mod registry;

pub use self::iovec::{IoVec, IoVecMut};
pub use self::locator::Locator;
pub use self::registry::{BlockDriver, DriverRegistry};

use self::backend::remote::proto::Status;
use self::locator::LocatorError;

/// Fixed transfer unit of every block device, in bytes.
pub const BLOCK_SIZE: usize = 512;
const_assert!(BLOCK_SIZE.is_power_of_two());

pub type BlockResult<T> = Result<T, BlockError>;

/// Error resulting from a block device operation.
#[derive(Debug, Error)]
pub enum BlockError {
    /// The remote side reported a failure (negative protocol status).
    #[error("remote operation failed (status {0})")]
    Remote(Status),
    /// Hard I/O error: a request that could not be queued, a reply that
    /// violated block-device semantics, or an access outside the device.
    #[error("I/O error")]
    Io,
    /// A local file backing the device failed.
    #[error(transparent)]
    File(#[from] std::io::Error),
    /// The reactor refused to (re-)register the session's descriptor.
    /// Fatal to the session.
    #[error("reactor registration failed: {0}")]
    Reactor(std::io::Error),
}

/// Error surfaced while attaching (opening or creating) a block device.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("malformed locator: {0}")]
    Locator(#[from] LocatorError),
    #[error("no driver registered for scheme `{0}`")]
    UnknownScheme(String),
    #[error("failed to mount {server}:{export}: {msg}")]
    Mount {
        server: String,
        export: String,
        msg: String,
    },
    #[error("failed to open {path}: {msg}")]
    Open { path: String, msg: String },
    #[error("failed to create {path}: {msg}")]
    Create { path: String, msg: String },
    #[error("failed to stat remote file: {msg}")]
    Stat { msg: String },
    #[error("failed to resize device (status {0})")]
    Truncate(Status),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Abstraction over different Block Device backends.
///
/// Transfers are addressed in whole blocks of [`BLOCK_SIZE`] bytes; the
/// scatter/gather lists they carry must hold a multiple of [`BLOCK_SIZE`]
/// bytes in total.
#[async_trait(?Send)]
pub trait BlockDev: Debug {
    /// Return the length (in blocks) of the underlying medium.
    fn num_blocks(&self) -> u64;

    /// Whether regions never written through this device are guaranteed to
    /// read back as zero.
    fn has_zero_init(&self) -> bool;

    /// Read `iov.len()` bytes starting at block `block`. Always fills the
    /// entire list: data past the medium's logical end reads as zero.
    async fn read_blocks(&mut self, block: u64, iov: &mut IoVecMut<'_>) -> BlockResult<()>;

    /// Write `iov.len()` bytes starting at block `block`. Succeeds only if
    /// every byte was written.
    async fn write_blocks(&mut self, block: u64, iov: &IoVec<'_>) -> BlockResult<()>;

    /// Flush completed writes down to the backing medium.
    async fn flush(&mut self) -> BlockResult<()>;

    /// Bytes actually allocated on the backing store (may be less than
    /// `num_blocks() * BLOCK_SIZE` for sparse media).
    fn allocated_size(&self) -> BlockResult<u64>;
}
