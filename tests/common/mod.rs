//! Common test utilities and helpers
//!
//! This module provides shared test infrastructure including:
//! - Test fixtures and factories
//! - Mock record stores
//! - API test client

#![allow(dead_code)]

pub mod factories;
pub mod fixtures;
pub mod mocks;

pub use factories::*;
pub use fixtures::*;
pub use mocks::*;
pub use test_app::*;
