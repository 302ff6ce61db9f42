//! DealScout: marketplace deal intake, scoring and flip tracking
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod listings;
pub mod classify;
pub mod pricing;
pub mod notify;
pub mod orders;
pub mod scoring;
pub mod engine;
pub mod storage;
pub mod scheduler;
