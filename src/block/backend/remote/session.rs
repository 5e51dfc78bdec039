//! Session lifecycle and readiness bookkeeping for one remote disk.

use std::cell::{Cell, RefCell};
use std::io;
use std::rc::{Rc, Weak};

use super::proto::{status, EventMask, Fh, FileKind, ProtoClient, Status};
use crate::block::locator::RemoteTarget;
use crate::block::{OpenError, BLOCK_SIZE};
use crate::reactor::{IoHandler, Reactor};

/// The single connection + open-file state for one attached remote disk.
///
/// A session exclusively owns its client and file handle; both are only
/// ever touched from the reactor thread, and both are released together by
/// [`Session::close`].
#[derive(Debug)]
pub struct Session {
    weak: Weak<Session>,
    reactor: Rc<dyn Reactor>,
    client: RefCell<Option<Rc<dyn ProtoClient>>>,
    fh: Cell<Option<Fh>>,
    /// Last readiness mask handed to the reactor, kept only to skip
    /// redundant registration calls.
    applied: Cell<Option<EventMask>>,
    zero_init: Cell<bool>,
}

impl Session {
    /// Mount, open (or create) and stat the remote target named by
    /// `target` (a locator with the scheme already stripped).
    ///
    /// Returns the session and the device length in blocks, rounded up. On
    /// any failure the session is fully torn down before the error is
    /// returned; no partial state stays live.
    pub fn open(
        reactor: Rc<dyn Reactor>,
        client: Rc<dyn ProtoClient>,
        target: &str,
        writable: bool,
        create: bool,
    ) -> Result<(Rc<Session>, u64), OpenError> {
        // Configuration errors fail before any network activity.
        let target = RemoteTarget::parse(target)?;

        if let Some(uid) = target.params.uid {
            client.set_uid(uid);
        }
        if let Some(gid) = target.params.gid {
            client.set_gid(gid);
        }
        if let Some(count) = target.params.tcp_retry_count {
            client.set_tcp_retry_count(count);
        }

        let session = Rc::new_cyclic(|weak| Session {
            weak: weak.clone(),
            reactor,
            client: RefCell::new(Some(Rc::clone(&client))),
            fh: Cell::new(None),
            applied: Cell::new(None),
            zero_init: Cell::new(false),
        });

        match session.open_inner(&client, &target, writable, create) {
            Ok(blocks) => Ok((session, blocks)),
            Err(e) => {
                session.close();
                Err(e)
            }
        }
    }

    fn open_inner(
        &self,
        client: &Rc<dyn ProtoClient>,
        target: &RemoteTarget,
        writable: bool,
        create: bool,
    ) -> Result<u64, OpenError> {
        client
            .mount(&target.server, &target.export)
            .map_err(|_| OpenError::Mount {
                server: target.server.clone(),
                export: target.export.clone(),
                msg: client.last_error(),
            })?;

        let fh = if create {
            client.create(&target.path, 0o600).map_err(|_| OpenError::Create {
                path: target.path.clone(),
                msg: client.last_error(),
            })?
        } else {
            client.open(&target.path, writable).map_err(|_| OpenError::Open {
                path: target.path.clone(),
                msg: client.last_error(),
            })?
        };
        self.fh.set(Some(fh));

        let st = client.fstat(fh).map_err(|_| OpenError::Stat {
            msg: client.last_error(),
        })?;
        self.zero_init.set(st.kind == FileKind::Regular);

        Ok((st.size + BLOCK_SIZE as u64 - 1) / BLOCK_SIZE as u64)
    }

    /// Tear the session down: close the file handle if one is held,
    /// deregister from the reactor, drop the client. Safe to call
    /// repeatedly, and on a session whose open failed partway.
    pub fn close(&self) {
        if let Some(client) = self.client.borrow_mut().take() {
            if let Some(fh) = self.fh.take() {
                client.close(fh);
            }
            if let Err(e) = self.reactor.register(client.fd(), None, None) {
                warn!("failed to deregister fd {}: {}", client.fd(), e);
            }
            // last strong reference: dropping the client destroys the
            // connection
        }
        self.fh.set(None);
        self.applied.set(None);
        self.zero_init.set(false);
    }

    pub fn is_open(&self) -> bool {
        self.client.borrow().is_some()
    }

    /// Whether the remote object is a plain regular file (unwritten ranges
    /// read back as zero).
    pub fn zero_init(&self) -> bool {
        self.zero_init.get()
    }

    /// Synchronous resize of the remote file.
    pub fn truncate(&self, new_size: u64) -> Result<(), Status> {
        match (self.client(), self.fh.get()) {
            (Some(client), Some(fh)) => client.truncate(fh, new_size),
            _ => Err(status::EINVAL),
        }
    }

    pub(super) fn client(&self) -> Option<Rc<dyn ProtoClient>> {
        self.client.borrow().clone()
    }

    pub(super) fn fh(&self) -> Option<Fh> {
        self.fh.get()
    }

    pub(super) fn reactor(&self) -> &Rc<dyn Reactor> {
        &self.reactor
    }

    /// Reconcile the reactor registration with the client's current
    /// readiness interest. Must run after every submission and every
    /// service round, since interest shifts as a side effect of both.
    /// Cheap when nothing changed.
    pub fn sync_events(&self) -> io::Result<()> {
        let client = match self.client() {
            Some(client) => client,
            None => return Ok(()),
        };
        let want = client.which_events();
        if self.applied.get() == Some(want) {
            return Ok(());
        }
        let readable = if want.readable() {
            Some(self.handler(EventMask::READ))
        } else {
            None
        };
        let writable = if want.writable() {
            Some(self.handler(EventMask::WRITE))
        } else {
            None
        };
        self.reactor.register(client.fd(), readable, writable)?;
        self.applied.set(Some(want));
        Ok(())
    }

    fn handler(&self, dir: EventMask) -> IoHandler {
        let weak = self.weak.clone();
        Box::new(move || {
            // the session may be gone by the time the reactor fires
            if let Some(session) = weak.upgrade() {
                session.service(dir);
            }
        })
    }

    /// Service one protocol round for `dir`, then re-arm. This is the only
    /// path through which the client's completion callbacks fire.
    fn service(&self, dir: EventMask) {
        let client = match self.client() {
            Some(client) => client,
            None => return,
        };
        client.service(dir);
        if let Err(e) = self.sync_events() {
            error!("reactor registration failed: {}", e);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
