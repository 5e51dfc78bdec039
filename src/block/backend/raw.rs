use std::fs::{File, OpenOptions};
use std::io::{self, SeekFrom};

use async_trait::async_trait;
use blocking::Unblock;
use futures::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::block::iovec::{IoVec, IoVecMut};
use crate::block::registry::BlockDriver;
use crate::block::{BlockDev, BlockResult, BLOCK_SIZE};

/// Raw, file-backed block device. No fancy features, just raw 1:1 access to
/// the underlying file's contents.
#[derive(Debug)]
pub struct Raw {
    len: u64,
    file: Unblock<File>,
}

impl Raw {
    pub fn new(file: File) -> io::Result<Raw> {
        Ok(Raw {
            len: file.metadata()?.len(),
            file: Unblock::new(file),
        })
    }

    /// Driver entry. Locator: `raw://<path>`.
    pub fn driver() -> BlockDriver {
        BlockDriver::new(
            "raw",
            |loc, writable| {
                let file = OpenOptions::new()
                    .read(true)
                    .write(writable)
                    .open(&loc.target)?;
                Ok(Box::new(Raw::new(file)?) as Box<dyn BlockDev>)
            },
            |loc, blocks| {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .open(&loc.target)?;
                file.set_len(blocks * BLOCK_SIZE as u64)?;
                Ok(Box::new(Raw::new(file)?) as Box<dyn BlockDev>)
            },
        )
    }
}

#[async_trait(?Send)]
impl BlockDev for Raw {
    fn num_blocks(&self) -> u64 {
        (self.len + BLOCK_SIZE as u64 - 1) / BLOCK_SIZE as u64
    }

    fn has_zero_init(&self) -> bool {
        false
    }

    async fn read_blocks(&mut self, block: u64, iov: &mut IoVecMut<'_>) -> BlockResult<()> {
        self.file
            .seek(SeekFrom::Start(block * BLOCK_SIZE as u64))
            .await?;
        let mut buf = vec![0; iov.len()];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        iov.fill_from(&buf[..filled]);
        Ok(())
    }

    async fn write_blocks(&mut self, block: u64, iov: &IoVec<'_>) -> BlockResult<()> {
        let off = block * BLOCK_SIZE as u64;
        self.file.seek(SeekFrom::Start(off)).await?;
        self.file.write_all(&iov.to_contiguous()).await?;
        self.len = self.len.max(off + iov.len() as u64);
        Ok(())
    }

    async fn flush(&mut self) -> BlockResult<()> {
        self.file.flush().await?;
        Ok(())
    }

    fn allocated_size(&self) -> BlockResult<u64> {
        Ok(self.len)
    }
}
