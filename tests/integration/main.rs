//! Integration test harness.

mod mock_adapters;
mod simulation;
