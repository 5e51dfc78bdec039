//! Test doubles: a hand-cranked reactor and a scriptable protocol client.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::Waker;

use futures::task::{waker, ArcWake};

use crate::block::backend::remote::proto::{
    Callback, EventMask, Fh, FileKind, ProtoClient, RemoteStat, Reply, Status,
};
use crate::reactor::{Deferred, IoHandler, RawFd, Reactor};

/// Reactor whose readiness and deferred dispatch are driven by the test.
pub struct FakeReactor {
    fd: Cell<Option<RawFd>>,
    read_h: RefCell<Option<Rc<dyn Fn()>>>,
    write_h: RefCell<Option<Rc<dyn Fn()>>>,
    deferred: RefCell<VecDeque<Deferred>>,
    pub registrations: Cell<usize>,
    pub fail_register: Cell<bool>,
}

impl FakeReactor {
    pub fn new() -> Rc<FakeReactor> {
        Rc::new(FakeReactor {
            fd: Cell::new(None),
            read_h: RefCell::new(None),
            write_h: RefCell::new(None),
            deferred: RefCell::new(VecDeque::new()),
            registrations: Cell::new(0),
            fail_register: Cell::new(false),
        })
    }

    /// Which directions are currently registered.
    pub fn registered(&self) -> (bool, bool) {
        (
            self.read_h.borrow().is_some(),
            self.write_h.borrow().is_some(),
        )
    }

    pub fn read_handler(&self) -> Option<Rc<dyn Fn()>> {
        self.read_h.borrow().clone()
    }

    /// Pretend the descriptor became ready in every registered direction.
    pub fn fire_ready(&self) {
        let read = self.read_h.borrow().clone();
        if let Some(h) = read {
            h();
        }
        let write = self.write_h.borrow().clone();
        if let Some(h) = write {
            h();
        }
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.borrow().len()
    }

    /// Drain the deferred queue, one callback at a time.
    pub fn run_deferred(&self) {
        loop {
            let cb = self.deferred.borrow_mut().pop_front();
            match cb {
                Some(cb) => cb(),
                None => break,
            }
        }
    }

    /// One full hand-cranked iteration.
    pub fn pump(&self) {
        self.fire_ready();
        self.run_deferred();
    }
}

impl Reactor for FakeReactor {
    fn register(
        &self,
        fd: RawFd,
        readable: Option<IoHandler>,
        writable: Option<IoHandler>,
    ) -> io::Result<()> {
        if self.fail_register.get() {
            return Err(io::Error::new(io::ErrorKind::Other, "no descriptor slots"));
        }
        self.registrations.set(self.registrations.get() + 1);
        self.fd.set(Some(fd));
        *self.read_h.borrow_mut() = readable.map(Rc::from);
        *self.write_h.borrow_mut() = writable.map(Rc::from);
        Ok(())
    }

    fn defer(&self, callback: Deferred) {
        self.deferred.borrow_mut().push_back(callback);
    }

    fn wait_dispatch(&self) -> io::Result<()> {
        if self.read_h.borrow().is_none()
            && self.write_h.borrow().is_none()
            && self.deferred.borrow().is_empty()
        {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "nothing to wait on",
            ));
        }
        self.pump();
        Ok(())
    }
}

impl fmt::Debug for FakeReactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeReactor")
            .field("registrations", &self.registrations.get())
            .field("deferred", &self.deferred.borrow().len())
            .finish()
    }
}

/// Scripted reply for the next serviced submission.
pub enum ReplyVal {
    None,
    Data(Vec<u8>),
    Stat(RemoteStat),
}

impl ReplyVal {
    fn as_reply(&self) -> Reply<'_> {
        match self {
            ReplyVal::None => Reply::None,
            ReplyVal::Data(data) => Reply::Data(data),
            ReplyVal::Stat(st) => Reply::Stat(*st),
        }
    }
}

/// Protocol client whose behavior is scripted by the test: submissions
/// queue up, and `service` pairs them FIFO with scripted replies.
pub struct FakeClient {
    pub fail_mount: Cell<bool>,
    pub fail_open: Cell<bool>,
    pub fail_stat: Cell<bool>,
    pub fail_submit: Cell<bool>,
    stat: Cell<RemoteStat>,
    pub events: Cell<EventMask>,
    pub mounts: Cell<usize>,
    pub closes: Cell<usize>,
    pub created: Cell<bool>,
    pub truncated: Cell<Option<u64>>,
    pub uid: Cell<Option<u32>>,
    pub gid: Cell<Option<u32>>,
    pub tcp_retry_count: Cell<Option<u32>>,
    submitted: RefCell<VecDeque<Callback>>,
    scripted: RefCell<VecDeque<(Status, ReplyVal)>>,
    last_error: RefCell<String>,
}

impl FakeClient {
    pub fn new() -> Rc<FakeClient> {
        Rc::new(FakeClient {
            fail_mount: Cell::new(false),
            fail_open: Cell::new(false),
            fail_stat: Cell::new(false),
            fail_submit: Cell::new(false),
            stat: Cell::new(RemoteStat {
                kind: FileKind::Regular,
                size: 5120,
                blocks_allocated: 10,
            }),
            events: Cell::new(EventMask::NONE),
            mounts: Cell::new(0),
            closes: Cell::new(0),
            created: Cell::new(false),
            truncated: Cell::new(None),
            uid: Cell::new(None),
            gid: Cell::new(None),
            tcp_retry_count: Cell::new(None),
            submitted: RefCell::new(VecDeque::new()),
            scripted: RefCell::new(VecDeque::new()),
            last_error: RefCell::new(String::new()),
        })
    }

    pub fn set_stat_size(&self, size: u64) {
        let mut st = self.stat.get();
        st.size = size;
        self.stat.set(st);
    }

    pub fn set_stat_kind(&self, kind: FileKind) {
        let mut st = self.stat.get();
        st.kind = kind;
        self.stat.set(st);
    }

    /// Queue the reply for the next serviced submission.
    pub fn script(&self, status: Status, val: ReplyVal) {
        self.scripted.borrow_mut().push_back((status, val));
    }

    fn submit(&self, cb: Callback) -> Result<(), Status> {
        if self.fail_submit.get() {
            return Err(-12);
        }
        self.submitted.borrow_mut().push_back(cb);
        Ok(())
    }

    fn fail(&self, msg: &str, status: Status) -> Status {
        *self.last_error.borrow_mut() = msg.to_owned();
        status
    }
}

impl ProtoClient for FakeClient {
    fn set_uid(&self, uid: u32) {
        self.uid.set(Some(uid));
    }

    fn set_gid(&self, gid: u32) {
        self.gid.set(Some(gid));
    }

    fn set_tcp_retry_count(&self, count: u32) {
        self.tcp_retry_count.set(Some(count));
    }

    fn mount(&self, _server: &str, _export: &str) -> Result<(), Status> {
        if self.fail_mount.get() {
            return Err(self.fail("mount denied", -13));
        }
        self.mounts.set(self.mounts.get() + 1);
        Ok(())
    }

    fn open(&self, _path: &str, _writable: bool) -> Result<Fh, Status> {
        if self.fail_open.get() {
            return Err(self.fail("no such file", -2));
        }
        Ok(Fh(1))
    }

    fn create(&self, _path: &str, _mode: u32) -> Result<Fh, Status> {
        self.created.set(true);
        Ok(Fh(1))
    }

    fn close(&self, _fh: Fh) {
        self.closes.set(self.closes.get() + 1);
    }

    fn fstat(&self, _fh: Fh) -> Result<RemoteStat, Status> {
        if self.fail_stat.get() {
            return Err(self.fail("stat failed", -5));
        }
        Ok(self.stat.get())
    }

    fn truncate(&self, _fh: Fh, len: u64) -> Result<(), Status> {
        self.truncated.set(Some(len));
        Ok(())
    }

    fn pread_async(
        &self,
        _fh: Fh,
        _offset: u64,
        _count: usize,
        cb: Callback,
    ) -> Result<(), Status> {
        self.submit(cb)
    }

    fn pwrite_async(
        &self,
        _fh: Fh,
        _offset: u64,
        _data: &[u8],
        cb: Callback,
    ) -> Result<(), Status> {
        self.submit(cb)
    }

    fn fsync_async(&self, _fh: Fh, cb: Callback) -> Result<(), Status> {
        self.submit(cb)
    }

    fn fstat_async(&self, _fh: Fh, cb: Callback) -> Result<(), Status> {
        self.submit(cb)
    }

    fn which_events(&self) -> EventMask {
        self.events.get()
    }

    fn fd(&self) -> RawFd {
        7
    }

    fn service(&self, _events: EventMask) {
        loop {
            let ready =
                !self.submitted.borrow().is_empty() && !self.scripted.borrow().is_empty();
            if !ready {
                break;
            }
            let cb = self.submitted.borrow_mut().pop_front().unwrap();
            let (status, val) = self.scripted.borrow_mut().pop_front().unwrap();
            cb(status, val.as_reply());
        }
    }

    fn last_error(&self) -> String {
        self.last_error.borrow().clone()
    }
}

impl fmt::Debug for FakeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeClient")
            .field("mounts", &self.mounts.get())
            .field("closes", &self.closes.get())
            .field("pending", &self.submitted.borrow().len())
            .finish()
    }
}

struct WakeCounter(AtomicUsize);

impl ArcWake for WakeCounter {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Observer handle for [`wake_counter`].
pub struct WakeCount(Arc<WakeCounter>);

impl WakeCount {
    pub fn get(&self) -> usize {
        (self.0).0.load(Ordering::SeqCst)
    }
}

/// A waker that counts how many times it is woken.
pub fn wake_counter() -> (Waker, WakeCount) {
    let counter = Arc::new(WakeCounter(AtomicUsize::new(0)));
    (waker(Arc::clone(&counter)), WakeCount(counter))
}
