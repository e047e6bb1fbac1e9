//! Runtime Management
//!
//! Process lifecycles, readiness probing and the test environment that ties
//! them together.

pub mod env;
pub mod envoy;
pub mod factory;
pub mod health;
pub mod probe;
pub mod process;
pub mod slot;

// Re-export main types
pub use env::TestEnv;
pub use envoy::EnvoyProcess;
pub use factory::RealComponents;
pub use health::HealthRegistry;
pub use probe::{HttpProbe, TcpProbe};
pub use process::ChildProcess;
pub use slot::ProcessSlot;
