//! Runtime configuration.
//!
//! Every field has a default, so an empty configuration is valid. Values are
//! layered: defaults, then an optional file (format from its extension), then
//! `ROSIX_` environment variables with `__` between nested keys:
//!
//! ```text
//! ROSIX_ACTOR__MAILBOX_CAPACITY=500
//! ROSIX_SYSCALL__ENFORCE_READ_MODE=false
//! ```

use crate::actor::{ActorOptions, Backpressure};
use crate::error::Result;
use crate::syscall::SystemOptions;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub actor: ActorConfig,
    pub syscall: SyscallConfig,
    /// Directory of behavior definitions, one sub-directory per category.
    pub behaviors_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    pub mailbox_capacity: usize,
    pub backpressure: Backpressure,
    pub call_timeout_ms: u64,
    pub response_log_capacity: usize,
    /// Zero disables the heartbeat.
    pub heartbeat_interval_secs: u64,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 100,
            backpressure: Backpressure::default(),
            call_timeout_ms: 30_000,
            response_log_capacity: 256,
            heartbeat_interval_secs: 30,
        }
    }
}

impl ActorConfig {
    pub fn to_actor_options(&self) -> ActorOptions {
        ActorOptions {
            mailbox_capacity: self.mailbox_capacity.max(1),
            backpressure: self.backpressure,
            call_timeout: Duration::from_millis(self.call_timeout_ms),
            response_log_capacity: self.response_log_capacity.max(1),
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyscallConfig {
    pub descriptor_base: i64,
    pub enforce_read_mode: bool,
}

impl Default for SyscallConfig {
    fn default() -> Self {
        let options = SystemOptions::default();
        Self {
            descriptor_base: options.descriptor_base,
            enforce_read_mode: options.enforce_read_mode,
        }
    }
}

impl SyscallConfig {
    pub fn to_system_options(&self) -> SystemOptions {
        SystemOptions {
            descriptor_base: self.descriptor_base,
            enforce_read_mode: self.enforce_read_mode,
        }
    }
}

impl RuntimeConfig {
    /// Loads defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, environment())
    }

    fn load_with(path: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).required(true));
        }
        let config = builder.add_source(env).build()?;
        Ok(config.try_deserialize()?)
    }
}

fn environment() -> Environment {
    Environment::with_prefix("ROSIX")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
