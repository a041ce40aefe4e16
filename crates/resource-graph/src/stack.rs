//! # Stack Declaration & Planning
//!
//! A [`Stack`] collects everything one program run declares: resources, composite
//! manifests and exported values. Nothing remote happens while declaring; the
//! [`Engine`](crate::engine::Engine) materializes the stack afterwards.
//!
//! ## Dependency edges
//!
//! Edges come from two places:
//! - **explicit** names given with [`Resource::depends_on`], which may refer to
//!   resources declared later in the program;
//! - **implicit** producer references of every deferred value found in the inputs.
//!
//! The materialization order is therefore derived from the edges, never from the
//! order of the declarations. [`Stack::plan`] validates the graph and computes a
//! topological order (ties broken by declaration order). Every definition error
//! is reported here, before any remote call.

use crate::artifact::{ArtifactSource, Document};
use crate::deferred::{Deferred, Producer, Resolver};
use crate::error::{CyclePath, GraphError};
use crate::hooks::{apply_hooks, Hook};
use crate::resource::{Input, Resource, ResourceRef};
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

// Scope 0 is reserved for values created outside any stack.
static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

pub(crate) struct Entry {
    pub(crate) resource: Resource,
    pub(crate) resolver: Resolver<Value>,
}

/// The declarations of one program run.
pub struct Stack {
    name: String,
    scope: u64,
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    exports: Vec<(String, Deferred<Value>)>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: NEXT_SCOPE.fetch_add(1, Ordering::Relaxed),
            entries: Vec::new(),
            index: HashMap::new(),
            exports: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.entries.iter().map(|entry| &entry.resource)
    }

    /// Declares a resource and returns the handle to its outputs.
    pub fn declare(&mut self, resource: Resource) -> Result<ResourceRef, GraphError> {
        if self.index.contains_key(&resource.name) {
            return Err(GraphError::DuplicateResource(resource.name));
        }
        let (outputs, resolver) = Deferred::pending_in(self.scope, resource.name.clone());
        debug!(resource = %resource.name, type_tag = %resource.type_tag, "Declared");
        self.index.insert(resource.name.clone(), self.entries.len());
        let handle = ResourceRef::new(resource.name.clone(), outputs);
        self.entries.push(Entry { resource, resolver });
        Ok(handle)
    }

    /// Publishes a value in the run report under `name`.
    pub fn export(&mut self, name: impl Into<String>, value: Deferred<Value>) {
        self.exports.push((name.into(), value));
    }

    /// Fetches a composite artifact, applies its hooks and declares one resource per
    /// document.
    ///
    /// Either every document is declared or none is: a fetch error, a hook error or
    /// a name clash leaves the stack untouched.
    pub async fn declare_manifest(
        &mut self,
        source: &dyn ArtifactSource,
        manifest: Manifest,
    ) -> Result<Vec<ResourceRef>, GraphError> {
        let documents = source.fetch(&manifest.location).await?;
        let documents = apply_hooks(documents, &manifest.hooks)?;

        let mut names = HashSet::new();
        let mut resources = Vec::with_capacity(documents.len());
        for (position, document) in documents.into_iter().enumerate() {
            let resource = manifest.document_resource(position, document);
            if self.index.contains_key(&resource.name) || !names.insert(resource.name.clone()) {
                return Err(GraphError::DuplicateResource(resource.name));
            }
            resources.push(resource);
        }

        info!(
            manifest = %manifest.name,
            location = %manifest.location,
            documents = resources.len(),
            "Manifest declared"
        );
        resources
            .into_iter()
            .map(|resource| self.declare(resource))
            .collect()
    }

    /// Validates the graph and computes the materialization order.
    pub fn plan(&self) -> Result<Plan, GraphError> {
        let count = self.entries.len();
        let mut dependencies: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); count];

        for (position, entry) in self.entries.iter().enumerate() {
            let resource = &entry.resource;
            for dependency in &resource.depends_on {
                let target =
                    self.index
                        .get(dependency)
                        .ok_or_else(|| GraphError::UnknownDependency {
                            resource: resource.name.clone(),
                            dependency: dependency.clone(),
                        })?;
                dependencies[position].insert(*target);
            }
            for producer in resource.origins() {
                let target = self
                    .own(&producer)
                    .ok_or_else(|| GraphError::UnknownProducer {
                        consumer: resource.name.clone(),
                        producer: producer.name.clone(),
                    })?;
                dependencies[position].insert(target);
            }
        }
        for (name, value) in &self.exports {
            if let Some(producer) = value.origins().iter().find(|p| self.own(p).is_none()) {
                return Err(GraphError::UnknownProducer {
                    consumer: format!("export {name}"),
                    producer: producer.name.clone(),
                });
            }
        }

        let mut dependents = vec![Vec::new(); count];
        for (position, deps) in dependencies.iter().enumerate() {
            for &dep in deps {
                dependents[dep].push(position);
            }
        }

        // Kahn's algorithm, lowest declaration index first.
        let mut indegree: Vec<usize> = dependencies.iter().map(BTreeSet::len).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = indegree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(position, _)| Reverse(position))
            .collect();
        let mut order = Vec::with_capacity(count);
        while let Some(Reverse(position)) = ready.pop() {
            order.push(position);
            for &dependent in &dependents[position] {
                indegree[dependent] -= 1;
                if indegree[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if order.len() < count {
            let residual: Vec<bool> = indegree.iter().map(|degree| *degree > 0).collect();
            let cycle = shortest_cycle(&dependencies, &residual)
                .into_iter()
                .map(|position| self.entries[position].resource.name.clone())
                .collect();
            return Err(GraphError::Cycle(CyclePath(cycle)));
        }

        let names: Vec<String> = self
            .entries
            .iter()
            .map(|entry| entry.resource.name.clone())
            .collect();
        info!(stack = %self.name, resources = count, "Plan computed");
        Ok(Plan {
            order: order.iter().map(|position| names[*position].clone()).collect(),
            positions: order,
            dependencies: dependencies
                .into_iter()
                .map(|deps| deps.into_iter().collect())
                .collect(),
            dependents,
            names,
        })
    }

    /// Position of a producer declared in this stack. Values taken from another
    /// stack never match, even when a resource here has the same name.
    fn own(&self, producer: &Producer) -> Option<usize> {
        if producer.scope != self.scope {
            return None;
        }
        self.index.get(&producer.name).copied()
    }

    pub(crate) fn into_parts(self) -> (Vec<Entry>, Vec<(String, Deferred<Value>)>) {
        (self.entries, self.exports)
    }
}

/// The shortest cycle among the nodes left over by Kahn's algorithm.
fn shortest_cycle(dependencies: &[BTreeSet<usize>], residual: &[bool]) -> Vec<usize> {
    let mut best: Option<Vec<usize>> = None;

    for start in (0..residual.len()).filter(|position| residual[*position]) {
        let mut parent = HashMap::new();
        let mut visited = vec![false; residual.len()];
        visited[start] = true;
        let mut queue = VecDeque::from([start]);
        let mut found = None;

        'search: while let Some(node) = queue.pop_front() {
            for &next in &dependencies[node] {
                if !residual[next] {
                    continue;
                }
                if next == start {
                    let mut path = vec![node];
                    let mut current = node;
                    while current != start {
                        current = parent[&current];
                        path.push(current);
                    }
                    path.reverse();
                    found = Some(path);
                    break 'search;
                }
                if !visited[next] {
                    visited[next] = true;
                    parent.insert(next, node);
                    queue.push_back(next);
                }
            }
        }

        if let Some(path) = found {
            if best.as_ref().map_or(true, |b| path.len() < b.len()) {
                best = Some(path);
            }
        }
    }

    best.unwrap_or_else(|| {
        (0..residual.len())
            .filter(|position| residual[*position])
            .collect()
    })
}

/// A validated materialization order.
#[derive(Debug, Clone)]
pub struct Plan {
    order: Vec<String>,
    pub(crate) positions: Vec<usize>,
    pub(crate) dependencies: Vec<Vec<usize>>,
    pub(crate) dependents: Vec<Vec<usize>>,
    names: Vec<String>,
}

impl Plan {
    /// Resource names in a topological order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Direct dependencies of `name`, explicit and implicit.
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|position| {
                self.dependencies[position]
                    .iter()
                    .map(|dep| self.names[*dep].as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A composite artifact to expand into one resource per document.
#[derive(Debug, Clone)]
pub struct Manifest {
    name: String,
    location: String,
    hooks: Vec<Hook>,
    depends_on: Vec<String>,
    inputs: BTreeMap<String, Input>,
}

impl Manifest {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            hooks: Vec::new(),
            depends_on: Vec::new(),
            inputs: BTreeMap::new(),
        }
    }

    /// Adds a hook. Hooks run in the order they are added.
    pub fn hook(mut self, hook: Hook) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Adds an explicit dependency shared by every document resource.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    /// Adds an input shared by every document resource, e.g. the provider to
    /// apply through.
    pub fn input(mut self, key: impl Into<String>, value: impl Into<Input>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }

    fn document_resource(&self, position: usize, document: Document) -> Resource {
        let text = |value: &Value| value.as_str().map(str::to_string);
        let kind = text(&document["kind"]).unwrap_or_else(|| "Unknown".to_string());
        let api_version = text(&document["apiVersion"]).unwrap_or_else(|| "v1".to_string());
        let metadata = &document["metadata"];
        let object_name = text(&metadata["name"]).unwrap_or_else(|| format!("#{position}"));

        let name = match text(&metadata["namespace"]) {
            Some(namespace) => format!("{}/{kind}/{namespace}/{object_name}", self.name),
            None => format!("{}/{kind}/{object_name}", self.name),
        };

        let mut resource = Resource::new(name, format!("kubernetes:{api_version}:{kind}"))
            .input("manifest", document);
        for (key, input) in &self.inputs {
            resource = resource.input(key.clone(), input.clone());
        }
        for dependency in &self.depends_on {
            resource = resource.depends_on(dependency.clone());
        }
        resource
    }
}
