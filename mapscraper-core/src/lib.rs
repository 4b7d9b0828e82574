//! Mapscraper Core
//!
//! Core types and abstractions for the mapscraper job system.
//!
//! This crate contains:
//! - Domain types: Job, run modes and queue states
//! - DTOs: Payloads exchanged over the HTTP ingestion API
//! - Queue contracts: the `Provider` (producer) and `JobQueue` (consumer) seams

pub mod domain;
pub mod dto;
pub mod queue;
