//! # rosix
//!
//! > **A resource-oriented syscall layer over behavior-driven actors.**
//!
//! Everything the runtime manages, physical things and live actors alike, is a
//! [`Resource`](resource::Resource) at a path. Callers `open` a path to get a
//! descriptor, then `read`, `write`, `invoke` and `watch` through it, much like
//! files. Invocations are served by actors, one per behavior definition, each
//! running declarative step lists through a fixed table of primitive actions.
//!
//! ## Architecture
//!
//! ```text
//!   caller ──► syscall::System ──► resource::Registry ──► ThingAdapter / ActorAdapter
//!                    │
//!                    └── invoke ──► actor::ActorManager ──► Actor (mailbox) ──► FunctionExecutor
//! ```
//!
//! ### 1. The Syscall Layer ([`syscall`])
//! The only entry point. Descriptors are never reused and carry an [`OpenMode`](syscall::OpenMode)
//! fixed at open time, so a descriptor opened without `WRITE` can never write.
//!
//! ### 2. The Registry ([`resource`])
//! Three indices (id, path, type) updated under a single lock, so a reader never sees a
//! resource in one index but not another. Adapters project their domain object on every
//! call rather than caching it.
//!
//! ### 3. The Actor Core ([`actor`])
//! Each actor owns one bounded mailbox and processes it sequentially in its own Tokio task.
//! Every call, including synchronous-looking ones, goes through the mailbox and waits
//! for a correlated reply. A full mailbox is handled by one configurable
//! [`Backpressure`](actor::Backpressure) policy.
//!
//! ### 4. The Orchestrator ([`lifecycle`])
//! [`Runtime`](lifecycle::Runtime) wires the three layers together from a
//! [`RuntimeConfig`](lifecycle::RuntimeConfig) and tears them down, reporting every
//! actor that failed to stop.
//!
//! ## Error Handling
//! One [`RosixError`] across all layers. Protocol extension points that are declared but
//! not provided (link, pipe, fork, batch, transaction) return
//! [`RosixError::Unsupported`], and [`System::supports`](syscall::System::supports)
//! lets callers check support without triggering them.
//!
//! ## Testing
//! See [`mock`] for a scripted [`FunctionTable`](actor::FunctionTable) that lets you test
//! actors and the manager without writing behavior definitions.
//!
//! ### Running the Demo
//!
//! ```bash
//! RUST_LOG=info cargo run
//! ```

pub mod actor;
pub mod error;
pub mod lifecycle;
pub mod mock;
pub mod model;
pub mod provider;
pub mod resource;
pub mod syscall;

pub use error::{Capability, ErrorCode, Result, RosixError};
