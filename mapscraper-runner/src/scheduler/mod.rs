//! Scheduler layer
//!
//! Worker pools that drain a job queue, drive the scraper and record each
//! job's outcome. Used by the long-running consumer modes.

pub mod pool;

pub use pool::WorkerPool;
