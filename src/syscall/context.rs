//! Caller sessions.
//!
//! A [`Context`] identifies who is calling and carries a cancellation signal that
//! every handle opened under it shares. Once the context is destroyed or its
//! deadline passes, operations on those handles fail with
//! [`RosixError::Cancelled`]. The handles themselves stay open until closed.

use crate::error::{Result, RosixError};
use crate::model::Params;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug)]
pub struct Context {
    pub id: String,
    pub user_id: String,
    pub session_id: String,
    pub metadata: Params,
    pub deadline: Option<DateTime<Utc>>,
    cancel: watch::Sender<bool>,
}

impl Context {
    pub fn new(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        metadata: Params,
    ) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            session_id: session_id.into(),
            metadata,
            deadline: None,
            cancel,
        }
    }

    pub fn with_deadline(mut self, timeout: Duration) -> Self {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        self.deadline = Utc::now().checked_add_signed(timeout);
        self
    }

    /// Raises the cancellation signal. Idempotent.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Utc::now() >= d)
    }

    /// Fails if the context was cancelled or its deadline has passed.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(RosixError::Cancelled(format!("context {} was cancelled", self.id)));
        }
        if self.is_expired() {
            return Err(RosixError::Cancelled(format!(
                "context {} passed its deadline",
                self.id
            )));
        }
        Ok(())
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.subscribe();
        let deadline = self.deadline.map(|d| {
            let remaining = (d - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::Instant::now() + remaining
        });

        let signalled = rx.wait_for(|cancelled| *cancelled);
        match deadline {
            Some(at) => {
                tokio::select! {
                    _ = signalled => {}
                    _ = tokio::time::sleep_until(at) => {}
                }
            }
            None => {
                // The sender lives as long as `self`, so this only returns once cancelled.
                let _ = signalled.await;
            }
        }
    }
}
