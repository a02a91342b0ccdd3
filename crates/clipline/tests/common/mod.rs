//! Shared test utilities for clipline integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a status store, a queue and a submitter over one
//!   temporary database
//! - Fake stage adapters that record what the pipeline asked of them

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::TestHarness;
