//! # Materialization Engine
//!
//! The `Engine` turns a declared [`Stack`] into remote calls. It owns no state of its
//! own between runs: everything it needs is the stack, a [`Provisioner`] and,
//! optionally, a [`StateClient`] to reconcile against.
//!
//! ## Scheduling
//!
//! The run is a single cooperative loop. Resources whose dependencies have all
//! settled wait in a ready queue (in plan order); up to `max_in_flight` of them are
//! polled together from a `FuturesUnordered`. When one settles, its outputs complete
//! the deferred value other resources read from it, and each dependent whose last
//! dependency just settled becomes ready. A resource's inputs are therefore only
//! resolved, and its remote call only issued, after everything it depends on has
//! resolved.
//!
//! ## Failures
//!
//! A failed resource fails its deferred outputs, so dependents are skipped with
//! [`GraphError::DependencyFailed`] naming the root failure, without ever resolving
//! their inputs. What happens to unrelated branches depends on the
//! [`FailurePolicy`]. In-flight calls are never aborted.
//!
//! ## Reconciliation
//!
//! With a state client, a resource whose resolved inputs and type tag equal its
//! recorded ones, and none of whose dependencies were created in this run, reuses
//! the recorded outputs and reports [`ResourceStatus::Unchanged`].

use crate::client::StateClient;
use crate::config::{EngineConfig, FailurePolicy};
use crate::deferred::Resolver;
use crate::error::GraphError;
use crate::message::ResourceRecord;
use crate::provider::{CreateRequest, Provisioner};
use crate::report::{ResourceReport, ResourceStatus, RunReport};
use crate::resource::Resource;
use crate::stack::{Plan, Stack};
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

struct Outcome {
    status: ResourceStatus,
    inputs: Option<Value>,
    outputs: Option<Value>,
}

impl Outcome {
    fn skipped(error: GraphError) -> Self {
        Self {
            status: ResourceStatus::Skipped(error),
            inputs: None,
            outputs: None,
        }
    }
}

/// Bookkeeping of one run, kept apart from the resources so in-flight futures can
/// borrow those while the loop updates this.
struct Progress {
    outcomes: Vec<Option<Outcome>>,
    resolvers: Vec<Option<Resolver<Value>>>,
    remaining: Vec<usize>,
    ready: VecDeque<usize>,
    policy: FailurePolicy,
    halted: bool,
}

impl Progress {
    /// Records an outcome, completes the resource's deferred outputs and releases
    /// dependents. Dependents that can no longer run are settled as skipped.
    fn settle(&mut self, plan: &Plan, resources: &[Resource], position: usize, outcome: Outcome) {
        let mut pending = vec![(position, outcome)];

        while let Some((position, outcome)) = pending.pop() {
            if let Some(resolver) = self.resolvers[position].take() {
                let value = match &outcome.status {
                    ResourceStatus::Failed(error) | ResourceStatus::Skipped(error) => {
                        Err(error.clone())
                    }
                    _ => Ok(outcome.outputs.clone().unwrap_or(Value::Null)),
                };
                resolver.complete(value);
            }
            if let ResourceStatus::Failed(error) = &outcome.status {
                if self.policy == FailurePolicy::HaltOnFailure && !self.halted {
                    warn!(resource = %resources[position].name, %error, "Halting run");
                    self.halted = true;
                }
            }
            self.outcomes[position] = Some(outcome);

            for &dependent in &plan.dependents[position] {
                self.remaining[dependent] -= 1;
                if self.remaining[dependent] > 0 {
                    continue;
                }
                match self.blocked(plan, resources, dependent) {
                    Some(error) => {
                        warn!(resource = %resources[dependent].name, %error, "Skipped");
                        pending.push((dependent, Outcome::skipped(error)));
                    }
                    None => self.ready.push_back(dependent),
                }
            }
        }
    }

    /// Why `position` cannot run, if any of its dependencies did not succeed.
    fn blocked(&self, plan: &Plan, resources: &[Resource], position: usize) -> Option<GraphError> {
        let resource = &resources[position].name;
        for &dependency in &plan.dependencies[position] {
            let status = self.outcomes[dependency].as_ref().map(|o| &o.status);
            match status {
                Some(ResourceStatus::Failed(_)) => {
                    return Some(GraphError::DependencyFailed {
                        resource: resource.clone(),
                        upstream: resources[dependency].name.clone(),
                    });
                }
                Some(ResourceStatus::Skipped(GraphError::DependencyFailed { upstream, .. })) => {
                    return Some(GraphError::DependencyFailed {
                        resource: resource.clone(),
                        upstream: upstream.clone(),
                    });
                }
                Some(ResourceStatus::Skipped(_)) => {
                    return Some(GraphError::Halted(resource.clone()));
                }
                _ => {}
            }
        }
        None
    }

    fn created(&self, position: usize) -> bool {
        matches!(
            self.outcomes[position].as_ref().map(|o| &o.status),
            Some(ResourceStatus::Created)
        )
    }
}

/// Drives the materialization of a [`Stack`].
///
/// ```rust
/// use resource_graph::engine::Engine;
/// use resource_graph::mock::MockProvisioner;
/// use resource_graph::resource::Resource;
/// use resource_graph::stack::Stack;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() {
///     let mock = MockProvisioner::new();
///     mock.expect_create("registry")
///         .return_ok(json!({ "loginServer": "demo.azurecr.io" }));
///
///     let mut stack = Stack::new("demo");
///     let registry = stack.declare(Resource::new("registry", "Registry")).unwrap();
///     stack.export("loginServer", registry.output("loginServer"));
///
///     let report = Engine::new(Arc::new(mock.clone())).run(stack).await.unwrap();
///     assert!(report.is_success());
///     assert_eq!(
///         report.export("loginServer").unwrap().as_ref().unwrap(),
///         &json!("demo.azurecr.io")
///     );
/// }
/// ```
pub struct Engine {
    provisioner: Arc<dyn Provisioner>,
    config: EngineConfig,
    state: Option<StateClient>,
}

impl Engine {
    pub fn new(provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            provisioner,
            config: EngineConfig::default(),
            state: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Reconciles against, and records into, the given state store.
    pub fn with_state(mut self, state: StateClient) -> Self {
        self.state = Some(state);
        self
    }

    /// Materializes the stack.
    ///
    /// Returns `Err` only for definition errors, in which case no remote call was
    /// made. Runtime failures are reported inside the [`RunReport`].
    #[instrument(skip_all, fields(stack = %stack.name()))]
    pub async fn run(&self, stack: Stack) -> Result<RunReport, GraphError> {
        let plan = stack.plan()?;
        let stack_name = stack.name().to_string();
        let (entries, exports) = stack.into_parts();
        let count = entries.len();
        let (resources, resolvers): (Vec<Resource>, Vec<Resolver<Value>>) = entries
            .into_iter()
            .map(|entry| (entry.resource, entry.resolver))
            .unzip();

        let remaining: Vec<usize> = plan.dependencies.iter().map(Vec::len).collect();
        let mut progress = Progress {
            outcomes: (0..count).map(|_| None).collect(),
            resolvers: resolvers.into_iter().map(Some).collect(),
            ready: plan
                .positions
                .iter()
                .copied()
                .filter(|position| remaining[*position] == 0)
                .collect(),
            remaining,
            policy: self.config.failure_policy,
            halted: false,
        };

        let max_in_flight = self.config.max_in_flight.max(1);
        let mut in_flight = FuturesUnordered::new();
        let mut started = Vec::with_capacity(count);

        loop {
            while in_flight.len() < max_in_flight {
                let Some(position) = progress.ready.pop_front() else {
                    break;
                };
                let resource = &resources[position];
                if progress.halted {
                    let outcome = Outcome::skipped(GraphError::Halted(resource.name.clone()));
                    progress.settle(&plan, &resources, position, outcome);
                    continue;
                }
                let reuse = !plan.dependencies[position]
                    .iter()
                    .any(|dependency| progress.created(*dependency));
                started.push(resource.name.clone());
                in_flight.push(self.materialize(position, resource, reuse));
            }

            let Some((position, outcome)) = in_flight.next().await else {
                break;
            };
            progress.settle(&plan, &resources, position, outcome);
        }
        drop(in_flight);
        // Every resource has settled; nothing is left to complete.
        progress.resolvers.clear();

        let mut exported = BTreeMap::new();
        for (name, value) in exports {
            let outcome = value.resolve().await;
            if let Err(error) = &outcome {
                warn!(export = %name, %error, "Export failed");
            }
            exported.insert(name, outcome);
        }

        let reports: Vec<ResourceReport> = resources
            .into_iter()
            .zip(progress.outcomes)
            .map(|(resource, outcome)| {
                let outcome = outcome.unwrap_or_else(|| {
                    Outcome::skipped(GraphError::Abandoned(resource.name.clone()))
                });
                ResourceReport {
                    name: resource.name,
                    type_tag: resource.type_tag,
                    status: outcome.status,
                    inputs: outcome.inputs,
                    outputs: outcome.outputs,
                }
            })
            .collect();

        let report = RunReport {
            stack: stack_name,
            plan: plan.order().to_vec(),
            started,
            resources: reports,
            exports: exported,
        };
        let failures = report.failures();
        info!(
            succeeded = report.succeeded().len(),
            failed = failures.0.len(),
            "Run finished"
        );
        Ok(report)
    }

    async fn materialize(
        &self,
        position: usize,
        resource: &Resource,
        reuse: bool,
    ) -> (usize, Outcome) {
        debug!(resource = %resource.name, "Resolving inputs");
        let inputs = match resource.resolve_inputs().await {
            Ok(inputs) => inputs,
            Err(error) => {
                warn!(resource = %resource.name, %error, "Input resolution failed");
                let outcome = Outcome {
                    status: ResourceStatus::Failed(error),
                    inputs: None,
                    outputs: None,
                };
                return (position, outcome);
            }
        };

        let outcome = match self.create(resource, &inputs, reuse).await {
            Ok((status, outputs)) => Outcome {
                status,
                inputs: Some(inputs),
                outputs: Some(outputs),
            },
            Err(error) => {
                warn!(resource = %resource.name, %error, "Materialization failed");
                Outcome {
                    status: ResourceStatus::Failed(error),
                    inputs: Some(inputs),
                    outputs: None,
                }
            }
        };
        (position, outcome)
    }

    async fn create(
        &self,
        resource: &Resource,
        inputs: &Value,
        reuse: bool,
    ) -> Result<(ResourceStatus, Value), GraphError> {
        if let (Some(state), true) = (&self.state, reuse) {
            if let Some(record) = state.get(resource.name.clone()).await? {
                if record.type_tag == resource.type_tag && &record.inputs == inputs {
                    info!(resource = %resource.name, "Unchanged");
                    return Ok((ResourceStatus::Unchanged, record.outputs));
                }
            }
        }

        info!(resource = %resource.name, type_tag = %resource.type_tag, "Creating");
        let request = CreateRequest {
            name: resource.name.clone(),
            type_tag: resource.type_tag.clone(),
            inputs: inputs.clone(),
        };
        let outputs = self
            .provisioner
            .create(request)
            .await
            .map_err(|e| GraphError::Remote {
                resource: resource.name.clone(),
                message: e.message,
            })?;

        if let Some(state) = &self.state {
            state
                .record(ResourceRecord {
                    name: resource.name.clone(),
                    type_tag: resource.type_tag.clone(),
                    inputs: inputs.clone(),
                    outputs: outputs.clone(),
                })
                .await?;
        }
        info!(resource = %resource.name, "Created");
        Ok((ResourceStatus::Created, outputs))
    }
}
