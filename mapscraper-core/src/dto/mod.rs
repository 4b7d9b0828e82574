//! Data Transfer Objects
//!
//! Payloads exchanged with HTTP clients and with the serverless function.
//! DTOs carry raw, unvalidated values; domain types are built from them.

pub mod function;
pub mod job;
