//! Integration test utilities for the gateway session
//!
//! Provides a scriptable mock gateway and payload fixtures for end-to-end tests of
//! the session lifecycle.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
