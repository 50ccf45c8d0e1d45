//! Vigil Core - Foundation for the session lifecycle workspace
//!
//! This module defines the shared error type, logging setup, retry/timeout
//! helpers and configuration handling used by the rest of the system.

pub mod config;
pub mod error;
pub mod logging;
pub mod retry;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use retry::*;

// Re-export commonly used external types
pub use tokio;
pub use tracing;
