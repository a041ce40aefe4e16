//! # Mock Provisioner & Testing Guide
//!
//! `MockProvisioner` implements [`Provisioner`] entirely in memory. It lets tests
//! script what the "cloud" answers for each resource, inject failures that are hard
//! to reproduce against a real backend, slow individual calls down to exercise
//! concurrency, and inspect the exact order in which remote calls were issued.
//!
//! ## When to use the mock vs a simulated backend
//!
//! | Feature | MockProvisioner | Simulated backend |
//! |---------|-----------------|-------------------|
//! | **Outputs** | Scripted per resource | Derived from inputs |
//! | **Error Injection** | Easy (`return_err`) | Hard |
//! | **Call log** | Yes | No |
//! | **Use Case** | Testing engine behaviour | Running whole programs |
//!
//! ## Example
//!
//! ```rust
//! use resource_graph::mock::MockProvisioner;
//! use resource_graph::provider::{CreateRequest, Provisioner};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mock = MockProvisioner::new();
//!     mock.expect_create("vault").return_err("quota exceeded");
//!
//!     let request = CreateRequest {
//!         name: "vault".into(),
//!         type_tag: "keyvault:Vault".into(),
//!         inputs: json!({}),
//!     };
//!     assert!(mock.create(request).await.is_err());
//!     assert_eq!(mock.calls(), vec!["vault"]);
//!     mock.verify();
//! }
//! ```
//!
//! ## Unscripted calls
//!
//! A `create` without a scripted answer echoes its inputs back as outputs, adding an
//! `id` (`<type_tag>/<name>`) and a `name` when the inputs do not carry one. This
//! keeps tests short: only the resources a test cares about need expectations.

use crate::error::ProvisionError;
use crate::provider::{CreateRequest, Provisioner};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// =============================================================================
// EXPECTATION BUILDER API
// =============================================================================

#[derive(Debug, Clone)]
enum Expectation {
    Ok(Value),
    Err(String),
}

impl Expectation {
    fn into_result(self) -> Result<Value, ProvisionError> {
        match self {
            Expectation::Ok(value) => Ok(value),
            Expectation::Err(message) => Err(ProvisionError::new(message)),
        }
    }
}

#[derive(Default)]
struct MockState {
    creates: HashMap<String, VecDeque<Expectation>>,
    invokes: HashMap<String, VecDeque<Expectation>>,
    delays: HashMap<String, Duration>,
    requests: Vec<CreateRequest>,
    invoked: Vec<(String, Value)>,
}

/// An in-memory provisioner with scripted answers and a call log.
///
/// Clones share the same script and log, so a test can hand one clone to the engine
/// and keep another for assertions.
#[derive(Clone, Default)]
pub struct MockProvisioner {
    state: Arc<Mutex<MockState>>,
}

impl MockProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the next `create` of resource `name`.
    pub fn expect_create(&self, name: impl Into<String>) -> ExpectationBuilder {
        ExpectationBuilder {
            key: name.into(),
            kind: Kind::Create,
            state: self.state.clone(),
        }
    }

    /// Scripts the next `invoke` of `function`.
    pub fn expect_invoke(&self, function: impl Into<String>) -> ExpectationBuilder {
        ExpectationBuilder {
            key: function.into(),
            kind: Kind::Invoke,
            state: self.state.clone(),
        }
    }

    /// Makes every `create` of `name` take at least `delay`.
    pub fn delay(&self, name: impl Into<String>, delay: Duration) {
        self.lock().delays.insert(name.into(), delay);
    }

    /// Resource names in the order their `create` calls were issued.
    pub fn calls(&self) -> Vec<String> {
        self.lock().requests.iter().map(|r| r.name.clone()).collect()
    }

    /// Full requests in the order they were issued.
    pub fn requests(&self) -> Vec<CreateRequest> {
        self.lock().requests.clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.lock().requests.iter().filter(|r| r.name == name).count()
    }

    /// Functions invoked, with their resolved arguments.
    pub fn invocations(&self) -> Vec<(String, Value)> {
        self.lock().invoked.clone()
    }

    /// Verifies that all scripted answers were consumed.
    pub fn verify(&self) {
        let state = self.lock();
        let remaining: usize = state
            .creates
            .values()
            .chain(state.invokes.values())
            .map(VecDeque::len)
            .sum();
        if remaining > 0 {
            panic!("Not all expectations were met. {remaining} remaining");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panicking test thread poisons the lock; the state itself is still valid.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Provisioner for MockProvisioner {
    async fn create(&self, request: CreateRequest) -> Result<Value, ProvisionError> {
        let (scripted, delay) = {
            let mut state = self.lock();
            state.requests.push(request.clone());
            let scripted = state
                .creates
                .get_mut(&request.name)
                .and_then(VecDeque::pop_front);
            (scripted, state.delays.get(&request.name).copied())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match scripted {
            Some(expectation) => expectation.into_result(),
            None => Ok(echo(&request)),
        }
    }

    async fn invoke(&self, function: &str, args: Value) -> Result<Value, ProvisionError> {
        let scripted = {
            let mut state = self.lock();
            state.invoked.push((function.to_string(), args));
            state.invokes.get_mut(function).and_then(VecDeque::pop_front)
        };
        match scripted {
            Some(expectation) => expectation.into_result(),
            None => Err(ProvisionError::new(format!(
                "unexpected invoke of {function}"
            ))),
        }
    }
}

fn echo(request: &CreateRequest) -> Value {
    let mut outputs = match &request.inputs {
        Value::Object(object) => object.clone(),
        _ => serde_json::Map::new(),
    };
    outputs
        .entry("id")
        .or_insert_with(|| json!(format!("{}/{}", request.type_tag, request.name)));
    outputs
        .entry("name")
        .or_insert_with(|| json!(request.name));
    Value::Object(outputs)
}

enum Kind {
    Create,
    Invoke,
}

/// Builder returned by [`MockProvisioner::expect_create`] and
/// [`MockProvisioner::expect_invoke`].
pub struct ExpectationBuilder {
    key: String,
    kind: Kind,
    state: Arc<Mutex<MockState>>,
}

impl ExpectationBuilder {
    /// Answers with these outputs.
    pub fn return_ok(self, outputs: Value) {
        self.push(Expectation::Ok(outputs));
    }

    /// Answers with a remote failure.
    pub fn return_err(self, message: impl Into<String>) {
        self.push(Expectation::Err(message.into()));
    }

    fn push(self, expectation: Expectation) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let queue = match self.kind {
            Kind::Create => &mut state.creates,
            Kind::Invoke => &mut state.invokes,
        };
        queue.entry(self.key).or_default().push_back(expectation);
    }
}
