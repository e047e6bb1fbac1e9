//! Configuration Management
//!
//! Per-test options (builder), the backend variant they resolve to, and
//! process-wide harness settings.

pub mod backend;
pub mod options;
pub mod settings;

// Re-export main types
pub use backend::{BackendOverrides, BackendSpec, EchoServerFlags};
pub use options::{IamScript, Impersonation, TestEnvOptions, TestEnvOptionsBuilder};
pub use settings::HarnessSettings;
