use async_trait::async_trait;

use crate::block::iovec::{IoVec, IoVecMut};
use crate::block::locator::{Locator, LocatorError};
use crate::block::registry::BlockDriver;
use crate::block::{BlockDev, BlockResult};

/// Null block device. Can be configured to report any size, where reads
/// always return zero, and writes are a noop.
#[derive(Debug)]
pub struct Null {
    blocks: u64,
}

impl Null {
    pub fn new(blocks: u64) -> Null {
        Null { blocks }
    }

    /// Driver entry. Locator: `null://<blocks>`.
    pub fn driver() -> BlockDriver {
        BlockDriver::new(
            "null",
            |loc, _writable| Ok(Box::new(Null::new(parse_blocks(loc)?)) as Box<dyn BlockDev>),
            |_loc, blocks| Ok(Box::new(Null::new(blocks)) as Box<dyn BlockDev>),
        )
    }
}

fn parse_blocks(loc: &Locator) -> Result<u64, LocatorError> {
    loc.target
        .parse::<u64>()
        .map_err(|_| LocatorError::BadNumber("blocks".to_owned()))
}

#[async_trait(?Send)]
impl BlockDev for Null {
    fn num_blocks(&self) -> u64 {
        self.blocks
    }

    fn has_zero_init(&self) -> bool {
        true
    }

    async fn read_blocks(&mut self, _block: u64, iov: &mut IoVecMut<'_>) -> BlockResult<()> {
        iov.fill_from(&[]);
        Ok(())
    }

    async fn write_blocks(&mut self, _block: u64, _iov: &IoVec<'_>) -> BlockResult<()> {
        // noop
        Ok(())
    }

    async fn flush(&mut self) -> BlockResult<()> {
        // noop
        Ok(())
    }

    fn allocated_size(&self) -> BlockResult<u64> {
        Ok(0)
    }
}
