//! # Actor Core
//!
//! One [`Actor`] per behavior. The actor is split the same way a resource actor is:
//!
//! - The **client half** ([`Actor`]) is cheap to clone and holds the mailbox sender,
//!   the shared status and the shutdown signal.
//! - The **server half** (`ActorCell`) owns the mailbox receiver and the
//!   [`FunctionTable`]. It runs in its own Tokio task and processes messages one at
//!   a time, so the function table needs no locking.
//!
//! ## State machine
//!
//! ```text
//! Idle --start--> Running --stop--> Stopped
//!   \                |
//!    \--stop-->  Stopped        any --fatal--> Error
//! ```
//!
//! `start` is rejected unless the actor is `Idle`. `stop` is a no-op on a stopped
//! actor. A loop that ends abnormally (a panicking handler) leaves the actor in
//! `Error`, which is terminal: recreate the actor to recover.
//!
//! ## Calls
//!
//! There is one path into the function table: the mailbox. [`Actor::call`] enqueues a
//! function-call message carrying a oneshot reply channel and awaits the correlated
//! result. [`Actor::send`] enqueues without waiting. Either way the loop publishes
//! the function-response on the actor's response log ([`Actor::subscribe`]), in
//! processing order.
//!
//! ## Backpressure
//!
//! Every actor uses the same [`Backpressure`] policy when its mailbox is full: block
//! the sender up to a timeout, or fail immediately. Both end in
//! [`RosixError::ResourceBusy`].

use super::message::{Message, MessageType};
use crate::error::{Result, RosixError};
use crate::model::Params;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Sender name used for calls that originate from the runtime itself.
pub const SYSTEM_SENDER: &str = "system";

/// The named functions an actor can execute.
///
/// The table is owned by the actor's loop, so `call` takes `&mut self`.
#[async_trait]
pub trait FunctionTable: Send + 'static {
    fn functions(&self) -> Vec<String>;
    async fn call(&mut self, function: &str, params: &Params) -> Result<Params>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorState {
    Idle,
    Running,
    Stopped,
    Error,
}

impl fmt::Display for ActorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActorState::Idle => "idle",
            ActorState::Running => "running",
            ActorState::Stopped => "stopped",
            ActorState::Error => "error",
        };
        f.write_str(s)
    }
}

/// What to do when a mailbox is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum Backpressure {
    /// Wait for room, giving up after `timeout_ms`.
    Block { timeout_ms: u64 },
    /// Fail at once.
    FailFast,
}

impl Default for Backpressure {
    fn default() -> Self {
        Backpressure::Block { timeout_ms: 5000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorOptions {
    pub mailbox_capacity: usize,
    pub backpressure: Backpressure,
    pub call_timeout: Duration,
    pub response_log_capacity: usize,
}

impl Default for ActorOptions {
    fn default() -> Self {
        Self {
            mailbox_capacity: 100,
            backpressure: Backpressure::default(),
            call_timeout: Duration::from_secs(30),
            response_log_capacity: 256,
        }
    }
}

/// Point-in-time view of an actor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActorStatus {
    pub id: String,
    pub name: String,
    pub state: ActorState,
    pub last_active: DateTime<Utc>,
    pub functions: Vec<String>,
    /// Messages handled so far, heartbeats excluded.
    pub processed: u64,
    /// Messages waiting in the mailbox.
    pub queued: usize,
}

impl ActorStatus {
    fn to_params(&self) -> Params {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => Params::new(),
        }
    }
}

type Response<T> = oneshot::Sender<Result<T>>;

enum Reply {
    Function(Response<Params>),
    Status(Response<ActorStatus>),
}

struct Envelope {
    message: Message,
    reply: Option<Reply>,
}

// =============================================================================
// CLIENT HALF
// =============================================================================

/// Handle to a running (or not yet started) actor.
#[derive(Clone)]
pub struct Actor {
    inner: Arc<Inner>,
}

struct Inner {
    id: String,
    options: ActorOptions,
    sender: mpsc::Sender<Envelope>,
    status: Arc<RwLock<ActorStatus>>,
    shutdown: watch::Sender<bool>,
    states: Arc<watch::Sender<ActorState>>,
    responses: broadcast::Sender<Message>,
    cell: Mutex<Option<ActorCell>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Actor {
    /// Creates an idle actor. Nothing runs until [`Actor::start`].
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        table: impl FunctionTable,
        options: ActorOptions,
    ) -> Self {
        let id = id.into();
        let (sender, receiver) = mpsc::channel(options.mailbox_capacity.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let states = Arc::new(watch::channel(ActorState::Idle).0);
        let (responses, _) = broadcast::channel(options.response_log_capacity.max(1));
        let status = Arc::new(RwLock::new(ActorStatus {
            id: id.clone(),
            name: name.into(),
            state: ActorState::Idle,
            last_active: Utc::now(),
            functions: table.functions(),
            processed: 0,
            queued: 0,
        }));

        let cell = ActorCell {
            id: id.clone(),
            receiver,
            table: Box::new(table),
            status: status.clone(),
            states: states.clone(),
            shutdown: shutdown_rx,
            responses: responses.clone(),
        };

        Self {
            inner: Arc::new(Inner {
                id,
                options,
                sender,
                status,
                shutdown,
                states,
                responses,
                cell: Mutex::new(Some(cell)),
                handle: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn state(&self) -> ActorState {
        self.inner.status.read().state
    }

    /// Reads the shared status without going through the mailbox.
    pub fn status(&self) -> ActorStatus {
        let mut status = self.inner.status.read().clone();
        status.queued = self.queued();
        status
    }

    /// Follows state transitions from now on. The current state counts as seen.
    pub fn watch_state(&self) -> watch::Receiver<ActorState> {
        self.inner.states.subscribe()
    }

    fn queued(&self) -> usize {
        self.inner.sender.max_capacity() - self.inner.sender.capacity()
    }

    /// Spawns the message loop. Fails unless the actor is idle and a Tokio
    /// runtime is current.
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            RosixError::Internal(format!("actor {} needs a Tokio runtime: {e}", self.inner.id))
        })?;
        let mut slot = self.inner.cell.lock();
        {
            let mut status = self.inner.status.write();
            if status.state != ActorState::Idle {
                return Err(RosixError::ResourceBusy(format!(
                    "actor {} is {}, start requires idle",
                    self.inner.id, status.state
                )));
            }
            let Some(cell) = slot.take() else {
                return Err(RosixError::Internal(format!(
                    "actor {} has no mailbox to run",
                    self.inner.id
                )));
            };
            set_state(&mut status, &self.inner.states, ActorState::Running);
            status.last_active = Utc::now();
            *self.inner.handle.lock() = Some(runtime.spawn(cell.run()));
        }
        info!(actor_id = %self.inner.id, "Actor started");
        Ok(())
    }

    /// Stops the loop and waits for it to finish. Queued messages are dropped.
    ///
    /// Returns an error only when the loop had died abnormally.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut status = self.inner.status.write();
            let current = status.state;
            match current {
                ActorState::Stopped => return Ok(()),
                ActorState::Idle => {
                    set_state(&mut status, &self.inner.states, ActorState::Stopped);
                    self.inner.cell.lock().take();
                    info!(actor_id = %self.inner.id, "Actor stopped before start");
                    return Ok(());
                }
                ActorState::Running => {
                    set_state(&mut status, &self.inner.states, ActorState::Stopped)
                }
                ActorState::Error => {}
            }
        }

        let _ = self.inner.shutdown.send(true);
        let handle = self.inner.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                set_state(
                    &mut self.inner.status.write(),
                    &self.inner.states,
                    ActorState::Error,
                );
                warn!(actor_id = %self.inner.id, error = %e, "Actor loop failed");
                return Err(RosixError::Internal(format!(
                    "actor {} loop failed: {e}",
                    self.inner.id
                )));
            }
        }
        info!(actor_id = %self.inner.id, "Actor stopped");
        Ok(())
    }

    /// Enqueues a message without waiting for it to be processed.
    pub async fn send(&self, message: Message) -> Result<()> {
        self.enqueue(Envelope {
            message,
            reply: None,
        })
        .await
    }

    /// Enqueues a message only if the mailbox has room right now, whatever the
    /// backpressure policy.
    pub fn try_send(&self, message: Message) -> Result<()> {
        self.ensure_running()?;
        self.inner
            .sender
            .try_send(Envelope {
                message,
                reply: None,
            })
            .map_err(|e| self.try_send_error(e))
    }

    /// Executes `function` through the mailbox and waits for its correlated result.
    pub async fn call(&self, function: &str, params: Params) -> Result<Params> {
        let message = Message::function_call(SYSTEM_SENDER, &self.inner.id, function, params);
        let correlation_id = message.correlation_id.clone();
        let (tx, rx) = oneshot::channel();
        self.enqueue(Envelope {
            message,
            reply: Some(Reply::Function(tx)),
        })
        .await?;
        debug!(actor_id = %self.inner.id, function, %correlation_id, "Call enqueued");
        self.await_reply(rx).await?
    }

    /// Asks the loop for its status. Unlike [`Actor::status`] this waits behind
    /// every message already queued.
    pub async fn query_status(&self) -> Result<ActorStatus> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(Envelope {
            message: Message::status_query(SYSTEM_SENDER, &self.inner.id),
            reply: Some(Reply::Status(tx)),
        })
        .await?;
        let mut status = self.await_reply(rx).await??;
        status.queued = self.queued();
        Ok(status)
    }

    /// Subscribes to every response this actor emits from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.inner.responses.subscribe()
    }

    async fn await_reply<T>(&self, rx: oneshot::Receiver<T>) -> Result<T> {
        match tokio::time::timeout(self.inner.options.call_timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(RosixError::ActorUnavailable(format!(
                "actor {} dropped the reply",
                self.inner.id
            ))),
            Err(_) => Err(RosixError::ResourceBusy(format!(
                "actor {} did not reply within {:?}",
                self.inner.id, self.inner.options.call_timeout
            ))),
        }
    }

    fn ensure_running(&self) -> Result<()> {
        let state = self.state();
        if state != ActorState::Running {
            return Err(RosixError::ActorUnavailable(format!(
                "actor {} is {state}",
                self.inner.id
            )));
        }
        Ok(())
    }

    async fn enqueue(&self, envelope: Envelope) -> Result<()> {
        self.ensure_running()?;
        match self.inner.options.backpressure {
            Backpressure::FailFast => self
                .inner
                .sender
                .try_send(envelope)
                .map_err(|e| self.try_send_error(e)),
            Backpressure::Block { timeout_ms } => {
                let wait = Duration::from_millis(timeout_ms);
                match tokio::time::timeout(wait, self.inner.sender.send(envelope)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(_)) => Err(self.mailbox_closed()),
                    Err(_) => Err(self.mailbox_full()),
                }
            }
        }
    }

    fn try_send_error(&self, error: mpsc::error::TrySendError<Envelope>) -> RosixError {
        match error {
            mpsc::error::TrySendError::Full(_) => self.mailbox_full(),
            mpsc::error::TrySendError::Closed(_) => self.mailbox_closed(),
        }
    }

    fn mailbox_full(&self) -> RosixError {
        warn!(actor_id = %self.inner.id, "Mailbox full");
        RosixError::ResourceBusy(format!("mailbox of actor {} is full", self.inner.id))
    }

    fn mailbox_closed(&self) -> RosixError {
        RosixError::ActorUnavailable(format!("mailbox of actor {} is closed", self.inner.id))
    }
}

// =============================================================================
// SERVER HALF
// =============================================================================

struct ActorCell {
    id: String,
    receiver: mpsc::Receiver<Envelope>,
    table: Box<dyn FunctionTable>,
    status: Arc<RwLock<ActorStatus>>,
    states: Arc<watch::Sender<ActorState>>,
    shutdown: watch::Receiver<bool>,
    responses: broadcast::Sender<Message>,
}

/// Marks the actor `Error` if the loop is torn down without a clean exit.
struct LoopGuard {
    status: Arc<RwLock<ActorStatus>>,
    states: Arc<watch::Sender<ActorState>>,
    clean: bool,
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        if !self.clean {
            set_state(&mut self.status.write(), &self.states, ActorState::Error);
        }
    }
}

/// Every state transition goes through here so watchers see it.
fn set_state(status: &mut ActorStatus, states: &watch::Sender<ActorState>, state: ActorState) {
    status.state = state;
    states.send_if_modified(|current| {
        let changed = *current != state;
        *current = state;
        changed
    });
}

impl ActorCell {
    async fn run(mut self) {
        let mut guard = LoopGuard {
            status: self.status.clone(),
            states: self.states.clone(),
            clean: false,
        };
        debug!(actor_id = %self.id, "Actor loop running");

        loop {
            tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                envelope = self.receiver.recv() => match envelope {
                    Some(envelope) => {
                        if self.handle(envelope).await.is_break() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        guard.clean = true;
        let mut status = guard.status.write();
        if status.state == ActorState::Running {
            set_state(&mut status, &guard.states, ActorState::Stopped);
        }
        debug!(actor_id = %self.id, "Actor loop exited");
    }

    async fn handle(&mut self, envelope: Envelope) -> ControlFlow<()> {
        let Envelope { message, reply } = envelope;

        if message.to != self.id {
            warn!(
                actor_id = %self.id,
                to = %message.to,
                kind = ?message.kind,
                "Dropping misaddressed message"
            );
            fail_reply(
                reply,
                RosixError::InvalidParameter(format!("message addressed to {}", message.to)),
            );
            return ControlFlow::Continue(());
        }

        self.touch(message.kind != MessageType::Heartbeat);

        match message.kind {
            MessageType::Heartbeat => {
                debug!(actor_id = %self.id, "Heartbeat");
                ControlFlow::Continue(())
            }
            MessageType::FunctionCall => self.handle_call(message, reply).await,
            MessageType::StatusQuery => {
                let status = self.status.read().clone();
                self.publish(Message::status_response(&message, status.to_params()));
                if let Some(Reply::Status(tx)) = reply {
                    let _ = tx.send(Ok(status));
                }
                ControlFlow::Continue(())
            }
            MessageType::FunctionResponse | MessageType::StatusResponse | MessageType::Error => {
                debug!(
                    actor_id = %self.id,
                    kind = ?message.kind,
                    from = %message.from,
                    "Ignoring response message"
                );
                fail_reply(
                    reply,
                    RosixError::InvalidParameter(format!("{:?} is not a request", message.kind)),
                );
                ControlFlow::Continue(())
            }
        }
    }

    async fn handle_call(&mut self, message: Message, reply: Option<Reply>) -> ControlFlow<()> {
        let Some(function) = message.function_name().map(str::to_string) else {
            warn!(
                actor_id = %self.id,
                correlation_id = %message.correlation_id,
                "Function call without a function name"
            );
            let result = Err(RosixError::InvalidParameter(
                "function call without a function name".into(),
            ));
            self.respond(&message, result, reply);
            return ControlFlow::Continue(());
        };

        debug!(
            actor_id = %self.id,
            %function,
            correlation_id = %message.correlation_id,
            "Executing"
        );
        let outcome = tokio::select! {
            biased;
            _ = self.shutdown.changed() => None,
            result = self.table.call(&function, message.call_params()) => Some(result),
        };

        match outcome {
            Some(result) => {
                if let Err(e) = &result {
                    warn!(actor_id = %self.id, %function, error = %e, "Function failed");
                }
                self.respond(&message, result, reply);
                ControlFlow::Continue(())
            }
            None => {
                info!(actor_id = %self.id, %function, "Call interrupted by stop");
                let result = Err(RosixError::ActorUnavailable(format!(
                    "actor {} stopped during {function}",
                    self.id
                )));
                self.respond(&message, result, reply);
                ControlFlow::Break(())
            }
        }
    }

    fn respond(&self, request: &Message, result: Result<Params>, reply: Option<Reply>) {
        self.publish(Message::function_response(request, &result));
        match reply {
            Some(Reply::Function(tx)) => {
                let _ = tx.send(result);
            }
            Some(Reply::Status(tx)) => {
                let _ = tx.send(Err(RosixError::Internal("status reply to a call".into())));
            }
            None => {}
        }
    }

    fn publish(&self, message: Message) {
        // No subscribers is fine.
        let _ = self.responses.send(message);
    }

    fn touch(&self, counted: bool) {
        let mut status = self.status.write();
        status.last_active = Utc::now();
        if counted {
            status.processed += 1;
        }
    }
}

fn fail_reply(reply: Option<Reply>, error: RosixError) {
    match reply {
        Some(Reply::Function(tx)) => {
            let _ = tx.send(Err(error));
        }
        Some(Reply::Status(tx)) => {
            let _ = tx.send(Err(error));
        }
        None => {}
    }
}
