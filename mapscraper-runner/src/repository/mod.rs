//! Repository layer
//!
//! Queue backing stores and result writers. Every store implements both
//! queue contracts from `mapscraper_core::queue`:
//! - [`PostgresJobStore`]: durable, at-least-once across restarts and
//!   consumer crashes, no FIFO guarantee between concurrent pushes
//! - [`MemoryJobStore`]: no durability, FIFO in order of completed pushes

mod memory;
mod postgres;
pub mod results;

use mapscraper_core::queue::{JobQueue, Provider};
use std::sync::Arc;

pub use memory::MemoryJobStore;
pub use postgres::{DEFAULT_CLAIM_LEASE, PostgresJobStore};
pub use results::{JobFileResultWriter, JsonlResultWriter, PostgresResultWriter, ResultWriter};

/// One backing store seen through both queue roles.
///
/// Jobs pushed through `provider` are the jobs `queue` hands out.
#[derive(Clone)]
pub struct JobStore {
    pub provider: Arc<dyn Provider>,
    pub queue: Arc<dyn JobQueue>,
}

impl JobStore {
    pub fn new<S>(store: Arc<S>) -> Self
    where
        S: Provider + JobQueue + 'static,
    {
        let provider: Arc<dyn Provider> = store.clone();
        let queue: Arc<dyn JobQueue> = store;
        Self { provider, queue }
    }
}
