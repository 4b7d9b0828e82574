//! Core domain types
//!
//! These types are shared between the ingestion API (which builds jobs),
//! the queue backends (which persist them) and the runners (which execute them).

pub mod job;
pub mod run_mode;
