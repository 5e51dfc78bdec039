//! Explicit registry of block drivers.
//!
//! There is no global driver table. Whoever composes the machine builds a
//! [`DriverRegistry`] at startup, registers the backends it wants to offer,
//! and passes the registry by reference to the attachment code.

use std::fmt;

use crate::block::locator::Locator;
use crate::block::{BlockDev, OpenError};

type OpenFn = Box<dyn Fn(&Locator, bool) -> Result<Box<dyn BlockDev>, OpenError>>;
type CreateFn = Box<dyn Fn(&Locator, u64) -> Result<Box<dyn BlockDev>, OpenError>>;

/// A storage backend selectable by locator scheme.
pub struct BlockDriver {
    scheme: &'static str,
    open: OpenFn,
    create: CreateFn,
}

impl BlockDriver {
    /// `open` attaches an existing medium (second argument: writable);
    /// `create` makes a new one of the requested length in blocks and
    /// returns it live.
    pub fn new(
        scheme: &'static str,
        open: impl Fn(&Locator, bool) -> Result<Box<dyn BlockDev>, OpenError> + 'static,
        create: impl Fn(&Locator, u64) -> Result<Box<dyn BlockDev>, OpenError> + 'static,
    ) -> BlockDriver {
        BlockDriver {
            scheme,
            open: Box::new(open),
            create: Box::new(create),
        }
    }

    pub fn scheme(&self) -> &'static str {
        self.scheme
    }
}

impl fmt::Debug for BlockDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockDriver")
            .field("scheme", &self.scheme)
            .finish()
    }
}

/// Registry of storage backends, populated at process startup.
#[derive(Debug, Default)]
pub struct DriverRegistry {
    drivers: Vec<BlockDriver>,
}

impl DriverRegistry {
    pub fn new() -> DriverRegistry {
        DriverRegistry::default()
    }

    /// Register a driver. The first driver registered for a scheme wins.
    pub fn register(&mut self, driver: BlockDriver) {
        self.drivers.push(driver);
    }

    /// Attach the device named by `locator`.
    pub fn open(&self, locator: &str, writable: bool) -> Result<Box<dyn BlockDev>, OpenError> {
        let loc: Locator = locator.parse()?;
        let driver = self.lookup(&loc.scheme)?;
        (driver.open)(&loc, writable)
    }

    /// Create the device named by `locator` with the requested length in
    /// blocks, returning it opened read-write.
    pub fn create(&self, locator: &str, blocks: u64) -> Result<Box<dyn BlockDev>, OpenError> {
        let loc: Locator = locator.parse()?;
        let driver = self.lookup(&loc.scheme)?;
        (driver.create)(&loc, blocks)
    }

    fn lookup(&self, scheme: &str) -> Result<&BlockDriver, OpenError> {
        self.drivers
            .iter()
            .find(|d| d.scheme == scheme)
            .ok_or_else(|| OpenError::UnknownScheme(scheme.to_owned()))
    }
}
