//! Shared types for the integration-test environment
//!
//! Contains the platform description every component agrees on: allocated
//! ports, backend kinds, debug selectors and logging setup.

pub mod errors;
pub mod logging;
pub mod types;

pub use errors::*;
pub use types::*;
