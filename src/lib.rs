//! DUBSS: scholarship case-file management. The `workflows::tramites` module
//! carries the lifecycle state machine, document gate, and ranking engine;
//! the rest is service plumbing around it.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
