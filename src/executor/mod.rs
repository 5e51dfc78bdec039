//! Types and Traits related to task execution.
//!
//! The block layer never spawns tasks itself. Disk-facing devices run their
//! transfers as cooperative tasks on a single-threaded pool, interleaved
//! with the reactor on the same thread.

use futures::future::LocalFutureObj;
use futures::task::{LocalSpawn, SpawnError};
pub use futures::task::LocalSpawnExt;

/// Single-threaded cooperative executor.
#[derive(Debug)]
pub struct Executor(futures_executor::LocalPool);

impl Executor {
    /// Construct a new executor.
    pub fn new() -> Executor {
        Executor(futures_executor::LocalPool::new())
    }

    /// Runs all tasks in the pool and returns if no more progress can be
    /// made on any task.
    pub fn run_until_stalled(&mut self) {
        self.0.run_until_stalled()
    }

    /// Return a cloneable spawn handle.
    pub fn spawner(&self) -> Spawner {
        Spawner(self.0.spawner())
    }
}

impl Default for Executor {
    fn default() -> Executor {
        Executor::new()
    }
}

/// A cloneable spawn handle.
#[derive(Debug, Clone)]
pub struct Spawner(futures_executor::LocalSpawner);

impl LocalSpawn for Spawner {
    fn spawn_local_obj(&self, future: LocalFutureObj<'static, ()>) -> Result<(), SpawnError> {
        self.0.spawn_local_obj(future)
    }

    #[inline]
    fn status_local(&self) -> Result<(), SpawnError> {
        self.0.status_local()
    }
}
