//! Shared test utilities for nlmex integration tests.
//!
//! This module provides:
//! - Scripted and gated extraction engines for driving task state
//! - `TestHarness` wrapping a `TaskManager` with short waits
//! - A minimal PDF builder

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{wait_until, GatedEngine, ScriptedEngine, TestHarness, SETTLE_TIMEOUT};
