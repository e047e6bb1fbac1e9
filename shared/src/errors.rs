//! Shared error types for the test environment

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SharedError {
    #[error("backend ({name}) is not supported")]
    UnsupportedBackend { name: String },

    #[error("invalid debug components selector: {value}")]
    InvalidDebugComponents { value: String },

    #[error("test id {test_id} does not fit in the port range")]
    PortRangeExhausted { test_id: u16 },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
