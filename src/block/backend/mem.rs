use async_trait::async_trait;

use crate::block::iovec::{IoVec, IoVecMut};
use crate::block::locator::{Locator, LocatorError};
use crate::block::registry::BlockDriver;
use crate::block::{BlockDev, BlockError, BlockResult, BLOCK_SIZE};

/// In-memory block device. Writes stay in memory and are lost when the
/// device is dropped.
#[derive(Debug)]
pub struct Mem {
    data: Vec<u8>,
    zero_init: bool,
}

impl Mem {
    /// Wrap an existing image. Padded up to a whole number of blocks.
    pub fn new(mut data: Vec<u8>) -> Mem {
        let rem = data.len() % BLOCK_SIZE;
        if rem != 0 {
            data.resize(data.len() + (BLOCK_SIZE - rem), 0);
        }
        Mem {
            data,
            zero_init: false,
        }
    }

    /// Fresh all-zero device of the given length.
    pub fn zeroed(blocks: u64) -> Mem {
        Mem {
            data: vec![0; blocks as usize * BLOCK_SIZE],
            zero_init: true,
        }
    }

    /// Driver entry. Locator: `mem://<blocks>` (opens a zeroed device).
    pub fn driver() -> BlockDriver {
        BlockDriver::new(
            "mem",
            |loc, _writable| Ok(Box::new(Mem::zeroed(parse_blocks(loc)?)) as Box<dyn BlockDev>),
            |_loc, blocks| Ok(Box::new(Mem::zeroed(blocks)) as Box<dyn BlockDev>),
        )
    }

    fn range(&self, block: u64, len: usize) -> BlockResult<std::ops::Range<usize>> {
        let start = block as usize * BLOCK_SIZE;
        let end = start.checked_add(len).ok_or(BlockError::Io)?;
        if end > self.data.len() {
            return Err(BlockError::Io);
        }
        Ok(start..end)
    }
}

fn parse_blocks(loc: &Locator) -> Result<u64, LocatorError> {
    loc.target
        .parse::<u64>()
        .map_err(|_| LocatorError::BadNumber("blocks".to_owned()))
}

#[async_trait(?Send)]
impl BlockDev for Mem {
    fn num_blocks(&self) -> u64 {
        (self.data.len() / BLOCK_SIZE) as u64
    }

    fn has_zero_init(&self) -> bool {
        self.zero_init
    }

    async fn read_blocks(&mut self, block: u64, iov: &mut IoVecMut<'_>) -> BlockResult<()> {
        let range = self.range(block, iov.len())?;
        iov.fill_from(&self.data[range]);
        Ok(())
    }

    async fn write_blocks(&mut self, block: u64, iov: &IoVec<'_>) -> BlockResult<()> {
        let range = self.range(block, iov.len())?;
        self.data[range].copy_from_slice(&iov.to_contiguous());
        Ok(())
    }

    async fn flush(&mut self) -> BlockResult<()> {
        // noop
        Ok(())
    }

    fn allocated_size(&self) -> BlockResult<u64> {
        Ok(self.data.len() as u64)
    }
}
