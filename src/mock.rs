//! # Mock Function Tables
//!
//! Utilities for testing actors, the manager and the syscall layer without
//! writing behavior definitions.
//!
//! A [`MockTable`] is a [`FunctionTable`] that answers calls from a queue of
//! scripted expectations, in order. A call that does not match the next
//! expectation panics inside the actor loop, which is exactly how a test observes
//! an actor dying.
//!
//! # Example
//! ```ignore
//! let mock = MockTable::new(["purify_air"]);
//! mock.expect_call("purify_air").return_ok(output);
//!
//! let actor = Actor::new("purifier", "Purifier", mock.table(), ActorOptions::default());
//! actor.start()?;
//! actor.call("purify_air", params).await?;
//!
//! mock.verify(); // Ensures all expectations were met
//! ```

use crate::actor::FunctionTable;
use crate::error::{Result, RosixError};
use crate::model::Params;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

struct Expectation {
    function: String,
    response: Result<Params>,
}

/// Scripted function table with expectation tracking.
#[derive(Clone)]
pub struct MockTable {
    functions: Vec<String>,
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
    calls: Arc<Mutex<Vec<(String, Params)>>>,
}

impl MockTable {
    /// Creates a table advertising `functions`, with no expectations.
    pub fn new<I, S>(functions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            functions: functions.into_iter().map(Into::into).collect(),
            expectations: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A handle to hand to an actor. Expectations stay shared with `self`.
    pub fn table(&self) -> MockTable {
        self.clone()
    }

    /// Expects a call to `function`.
    pub fn expect_call(&self, function: impl Into<String>) -> CallExpectationBuilder {
        CallExpectationBuilder {
            function: function.into(),
            expectations: self.expectations.clone(),
        }
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<(String, Params)> {
        self.calls.lock().clone()
    }

    /// Verifies that all expectations were met.
    pub fn verify(&self) {
        let exps = self.expectations.lock();
        if !exps.is_empty() {
            panic!("Not all expectations were met. {} remaining", exps.len());
        }
    }
}

#[async_trait]
impl FunctionTable for MockTable {
    fn functions(&self) -> Vec<String> {
        self.functions.clone()
    }

    async fn call(&mut self, function: &str, params: &Params) -> Result<Params> {
        self.calls.lock().push((function.to_string(), params.clone()));
        let expectation = self.expectations.lock().pop_front();
        match expectation {
            Some(exp) if exp.function == function => exp.response,
            Some(exp) => panic!(
                "Unexpected call to {function}, expected {}",
                exp.function
            ),
            None => panic!("Unexpected call to {function}, no expectations left"),
        }
    }
}

/// Builder for call expectations.
pub struct CallExpectationBuilder {
    function: String,
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
}

impl CallExpectationBuilder {
    /// Sets the expectation to return a successful result.
    pub fn return_ok(self, output: Params) {
        self.push(Ok(output));
    }

    /// Sets the expectation to return an error.
    pub fn return_err(self, error: RosixError) {
        self.push(Err(error));
    }

    fn push(self, response: Result<Params>) {
        self.expectations.lock().push_back(Expectation {
            function: self.function,
            response,
        });
    }
}
