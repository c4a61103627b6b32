//! Cross-module scenario tests for the engine
//!
//! Tests are organized by topic:
//! - `end_to_end` - Full analyses through the `api` entry points
//! - `properties` - Invariants that must hold for any valid input
//! - `survival_recovery` - Parameter recovery from simulated survival data

mod end_to_end;
mod properties;
