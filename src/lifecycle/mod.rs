//! Runtime orchestration and lifecycle management.
//!
//! - [`RuntimeConfig`] - layered configuration (defaults, file, environment)
//! - [`Runtime`] - starts the actor core, the registry and the syscall layer, and shuts them down
//! - [`setup_tracing`] - initializes the tracing/logging infrastructure

pub mod config;
pub mod runtime;
pub mod tracing;

pub use self::config::{ActorConfig, RuntimeConfig, SyscallConfig};
pub use runtime::Runtime;
pub use self::tracing::setup_tracing;
