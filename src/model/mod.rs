//! Domain records consumed by the runtime: behavior definitions and things.

pub mod behavior;
pub mod loader;
pub mod thing;

pub use behavior::*;
pub use thing::*;

/// Key/value map used for attributes, features, parameters and results.
pub type Params = serde_json::Map<String, serde_json::Value>;
