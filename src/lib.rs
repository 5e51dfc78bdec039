//! Remote-backed virtual block devices for a single-threaded machine
//! emulator.
//!
//! A virtual disk is attached by locator (`scheme://...`) through a
//! [`block::registry::DriverRegistry`]. Simple backends (`null`, `mem`,
//! `raw`) serve blocks locally; the interesting one is
//! [`block::backend::Remote`], which bridges block transfers onto a
//! stateful, callback-driven remote file-access client serviced by the
//! machine's reactor.

#[macro_use]
extern crate log;

pub mod block;
pub mod executor;
pub mod reactor;

#[cfg(test)]
pub(crate) mod testutil;
