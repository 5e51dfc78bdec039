//! Remote-backed block device.
//!
//! Bridges fixed-size block transfers onto a callback-driven remote
//! file-access client. One operation, start to finish:
//!
//! 1. create a completion task and submit an async call on the session's
//!    client;
//! 2. suspend, re-arming the reactor registration on every poll;
//! 3. a readiness handler services the client, whose completion callback
//!    records the outcome on the task and queues a deferred wake;
//! 4. the reactor runs the deferred callback on its own dispatch, the
//!    operation resumes and inspects the task.
//!
//! Waiters are never resumed from inside the client's own dispatch stack,
//! so a resumed operation may immediately re-enter the client.

pub mod proto;
mod session;
mod task;

pub use session::Session;

use std::cell::Cell;
use std::rc::Rc;

use async_trait::async_trait;

use self::proto::{ProtoClient, Status};
use self::task::Task;
use crate::block::iovec::{IoVec, IoVecMut};
use crate::block::registry::BlockDriver;
use crate::block::{BlockDev, BlockError, BlockResult, OpenError, BLOCK_SIZE};
use crate::reactor::Reactor;

/// Factory producing a fresh, unconnected protocol client. Called once per
/// attached disk; a client is never shared between sessions.
pub type ClientFactory = Rc<dyn Fn() -> Rc<dyn ProtoClient>>;

/// Block device backed by a file on a remote server.
#[derive(Debug)]
pub struct Remote {
    session: Rc<Session>,
    blocks: Cell<u64>,
}

impl Remote {
    /// Attach `target` (a locator with the scheme stripped) as a block
    /// device. `create` makes the remote file instead of requiring it to
    /// exist.
    pub fn open(
        reactor: Rc<dyn Reactor>,
        client: Rc<dyn ProtoClient>,
        target: &str,
        writable: bool,
        create: bool,
    ) -> Result<Remote, OpenError> {
        let (session, blocks) = Session::open(reactor, client, target, writable, create)?;
        Ok(Remote {
            session,
            blocks: Cell::new(blocks),
        })
    }

    /// Driver entry under `scheme`. Locator:
    /// `scheme://server/export/path[?uid=..&gid=..&tcp-retry-count=..]`.
    pub fn driver(
        scheme: &'static str,
        reactor: Rc<dyn Reactor>,
        clients: ClientFactory,
    ) -> BlockDriver {
        let open_reactor = Rc::clone(&reactor);
        let open_clients = Rc::clone(&clients);
        BlockDriver::new(
            scheme,
            move |loc, writable| {
                let dev = Remote::open(
                    Rc::clone(&open_reactor),
                    open_clients(),
                    &loc.target,
                    writable,
                    false,
                )?;
                Ok(Box::new(dev) as Box<dyn BlockDev>)
            },
            move |loc, blocks| {
                let dev = Remote::open(Rc::clone(&reactor), clients(), &loc.target, true, true)?;
                dev.truncate(blocks * BLOCK_SIZE as u64)
                    .map_err(OpenError::Truncate)?;
                dev.blocks.set(blocks);
                Ok(Box::new(dev) as Box<dyn BlockDev>)
            },
        )
    }

    /// Read `iov.len()` bytes starting at block `block`. A short transfer
    /// from the remote side (reading past the logical end, or a hole) comes
    /// back zero-filled; block devices always return full-length data.
    pub async fn read_blocks(&self, block: u64, iov: &mut IoVecMut<'_>) -> BlockResult<()> {
        debug_assert_eq!(iov.len() % BLOCK_SIZE, 0);
        let (client, fh) = self.handles()?;

        let task = Task::with_read_buf(iov.len());
        client
            .pread_async(
                fh,
                block * BLOCK_SIZE as u64,
                iov.len(),
                Task::completion(&task, &self.session),
            )
            .map_err(|_| BlockError::Io)?;

        let status = Task::wait(&task, &self.session).await?;
        if status < 0 {
            return Err(BlockError::Remote(status));
        }
        iov.fill_from(&task.take_read_buf());
        Ok(())
    }

    /// Write `iov.len()` bytes starting at block `block`. Anything other
    /// than a full-length write is an error.
    pub async fn write_blocks(&self, block: u64, iov: &IoVec<'_>) -> BlockResult<()> {
        debug_assert_eq!(iov.len() % BLOCK_SIZE, 0);
        let (client, fh) = self.handles()?;

        let task = Task::new();
        // the protocol call wants one contiguous region
        let buf = iov.to_contiguous();
        client
            .pwrite_async(
                fh,
                block * BLOCK_SIZE as u64,
                &buf,
                Task::completion(&task, &self.session),
            )
            .map_err(|_| BlockError::Io)?;

        let status = Task::wait(&task, &self.session).await?;
        if status < 0 {
            return Err(BlockError::Remote(status));
        }
        if status as usize != buf.len() {
            // a partial write would corrupt block-device semantics
            return Err(BlockError::Io);
        }

        let end = block + (buf.len() / BLOCK_SIZE) as u64;
        if end > self.blocks.get() {
            self.blocks.set(end);
        }
        Ok(())
    }

    /// Flush completed writes on the remote side.
    pub async fn flush(&self) -> BlockResult<()> {
        let (client, fh) = self.handles()?;

        let task = Task::new();
        client
            .fsync_async(fh, Task::completion(&task, &self.session))
            .map_err(|_| BlockError::Io)?;

        let status = Task::wait(&task, &self.session).await?;
        if status < 0 {
            return Err(BlockError::Remote(status));
        }
        Ok(())
    }

    /// Bytes allocated on the remote store. Usable outside any executor:
    /// the stat is submitted with no waiter recorded, then the reactor is
    /// serviced synchronously until it completes.
    pub fn allocated_size(&self) -> BlockResult<u64> {
        let (client, fh) = self.handles()?;

        let task = Task::new();
        client
            .fstat_async(fh, Task::completion(&task, &self.session))
            .map_err(|_| BlockError::Io)?;

        while !task.is_complete() {
            self.session.sync_events().map_err(BlockError::Reactor)?;
            self.session
                .reactor()
                .wait_dispatch()
                .map_err(BlockError::Reactor)?;
        }

        if task.status() < 0 {
            return Err(BlockError::Remote(task.status()));
        }
        let st = task.take_stat().ok_or(BlockError::Io)?;
        Ok(st.blocks_allocated * 512)
    }

    /// Synchronous resize of the remote file, status passed through.
    pub fn truncate(&self, new_size: u64) -> Result<(), Status> {
        self.session.truncate(new_size)
    }

    pub fn has_zero_init(&self) -> bool {
        self.session.zero_init()
    }

    /// Tear down the session. Callers must not close while operations are
    /// outstanding; a waiter suspended on a closed session is never
    /// resumed.
    pub fn close(&self) {
        self.session.close();
    }

    fn handles(&self) -> BlockResult<(Rc<dyn ProtoClient>, proto::Fh)> {
        match (self.session.client(), self.session.fh()) {
            (Some(client), Some(fh)) => Ok((client, fh)),
            // fail closed rather than resume into freed state
            _ => Err(BlockError::Io),
        }
    }
}

#[async_trait(?Send)]
impl BlockDev for Remote {
    fn num_blocks(&self) -> u64 {
        self.blocks.get()
    }

    fn has_zero_init(&self) -> bool {
        Remote::has_zero_init(self)
    }

    async fn read_blocks(&mut self, block: u64, iov: &mut IoVecMut<'_>) -> BlockResult<()> {
        Remote::read_blocks(self, block, iov).await
    }

    async fn write_blocks(&mut self, block: u64, iov: &IoVec<'_>) -> BlockResult<()> {
        Remote::write_blocks(self, block, iov).await
    }

    async fn flush(&mut self) -> BlockResult<()> {
        Remote::flush(self).await
    }

    fn allocated_size(&self) -> BlockResult<u64> {
        Remote::allocated_size(self)
    }
}
