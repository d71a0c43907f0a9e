//! # Actor Concurrency Core
//!
//! Behavior-driven actors and everything needed to run them:
//!
//! - [`message`]: the message envelope exchanged with actors.
//! - [`actor`](mod@actor): the mailbox loop, state machine and backpressure policy.
//! - [`executor`]: parameter validation and step interpretation.
//! - [`condition`]: guard expressions on implementation steps.
//! - [`primitives`]: the table of leaf actions steps dispatch to.
//! - [`manager`]: supervision, binding table, heartbeat and shutdown.

#[allow(clippy::module_inception)]
pub mod actor;
pub mod condition;
pub mod executor;
pub mod manager;
pub mod message;
pub mod primitives;

pub use actor::{
    Actor, ActorOptions, ActorState, ActorStatus, Backpressure, FunctionTable, SYSTEM_SENDER,
};
pub use executor::{Execution, FunctionExecutor, FunctionInfo, StepReport, StepStatus};
pub use manager::{ActorInfo, ActorManager, BehaviorCatalog, HealthReport, ManagedActor};
pub use message::{Message, MessageType};
pub use primitives::{ActionTable, PrimitiveAction};
