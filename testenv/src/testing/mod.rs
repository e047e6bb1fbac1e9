//! Teardown reporting

pub mod report;

pub use report::{TearDownFailure, TearDownReport};
