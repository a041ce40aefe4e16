//! # Resource Declarations
//!
//! A [`Resource`] is the declaration of one remote object: a logical name, a type
//! tag understood by the provisioning backend, a bag of [`Input`]s and explicit
//! dependency edges. Inputs may mix literals with [`Deferred`] values, at any depth,
//! so a nested field like `linux_profile.ssh.public_keys[0].key_data` can carry the
//! public key of a key pair that does not exist yet.
//!
//! Declaring a resource on a [`Stack`](crate::stack::Stack) returns a
//! [`ResourceRef`], the only way to read the resource's outputs. Every read through
//! it is a deferred value whose producer is the resource, which is how the engine
//! learns the implicit dependency edges.

use crate::deferred::{Deferred, Producer};
use crate::error::GraphError;
use futures::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// One input field of a resource.
#[derive(Debug, Clone)]
pub enum Input {
    Literal(Value),
    Deferred(Deferred<Value>),
    Object(BTreeMap<String, Input>),
    List(Vec<Input>),
}

impl Input {
    /// Builds a nested object input.
    pub fn object<K, V, I>(fields: I) -> Self
    where
        K: Into<String>,
        V: Into<Input>,
        I: IntoIterator<Item = (K, V)>,
    {
        Input::Object(
            fields
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    /// Builds a list input.
    pub fn list<V, I>(items: I) -> Self
    where
        V: Into<Input>,
        I: IntoIterator<Item = V>,
    {
        Input::List(items.into_iter().map(Into::into).collect())
    }

    /// Collects the producers of every deferred value inside this input.
    pub fn collect_producers(&self, into: &mut BTreeSet<Producer>) {
        match self {
            Input::Literal(_) => {}
            Input::Deferred(value) => into.extend(value.origins().iter().cloned()),
            Input::Object(fields) => fields.values().for_each(|f| f.collect_producers(into)),
            Input::List(items) => items.iter().for_each(|i| i.collect_producers(into)),
        }
    }

    /// Resolves every deferred value and returns the concrete JSON value.
    pub fn resolve(&self) -> BoxFuture<'_, Result<Value, GraphError>> {
        async move {
            match self {
                Input::Literal(value) => Ok(value.clone()),
                Input::Deferred(value) => value.resolve().await,
                Input::Object(fields) => {
                    let mut object = Map::new();
                    for (key, field) in fields {
                        object.insert(key.clone(), field.resolve().await?);
                    }
                    Ok(Value::Object(object))
                }
                Input::List(items) => {
                    let mut list = Vec::with_capacity(items.len());
                    for item in items {
                        list.push(item.resolve().await?);
                    }
                    Ok(Value::Array(list))
                }
            }
        }
        .boxed()
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Input::Literal(value)
    }
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Input::Literal(Value::from(value))
    }
}

impl From<String> for Input {
    fn from(value: String) -> Self {
        Input::Literal(Value::from(value))
    }
}

impl From<bool> for Input {
    fn from(value: bool) -> Self {
        Input::Literal(Value::from(value))
    }
}

impl From<u32> for Input {
    fn from(value: u32) -> Self {
        Input::Literal(Value::from(value))
    }
}

impl From<Deferred<Value>> for Input {
    fn from(value: Deferred<Value>) -> Self {
        Input::Deferred(value)
    }
}

impl From<&Deferred<Value>> for Input {
    fn from(value: &Deferred<Value>) -> Self {
        Input::Deferred(value.clone())
    }
}

/// Declaration of a remote object.
#[derive(Debug, Clone)]
pub struct Resource {
    pub name: String,
    pub type_tag: String,
    pub inputs: BTreeMap<String, Input>,
    pub depends_on: Vec<String>,
}

impl Resource {
    pub fn new(name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_tag: type_tag.into(),
            inputs: BTreeMap::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn input(mut self, key: impl Into<String>, value: impl Into<Input>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }

    /// Adds an explicit edge. The named resource may be declared later.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    /// Resources referenced through deferred inputs (the implicit edges).
    pub fn producers(&self) -> BTreeSet<String> {
        self.origins()
            .into_iter()
            .map(|producer| producer.name)
            .collect()
    }

    pub fn origins(&self) -> BTreeSet<Producer> {
        let mut producers = BTreeSet::new();
        for input in self.inputs.values() {
            input.collect_producers(&mut producers);
        }
        producers
    }

    /// Resolves the full input set into a JSON object.
    pub async fn resolve_inputs(&self) -> Result<Value, GraphError> {
        let mut object = Map::new();
        for (key, input) in &self.inputs {
            object.insert(key.clone(), input.resolve().await?);
        }
        Ok(Value::Object(object))
    }
}

/// Handle to a declared resource's outputs.
#[derive(Debug, Clone)]
pub struct ResourceRef {
    name: String,
    outputs: Deferred<Value>,
}

impl ResourceRef {
    pub(crate) fn new(name: String, outputs: Deferred<Value>) -> Self {
        Self { name, outputs }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every output field, as returned by the backend.
    pub fn outputs(&self) -> Deferred<Value> {
        self.outputs.clone()
    }

    /// One output field. A field the backend did not return fails the value with
    /// [`GraphError::MissingOutput`].
    pub fn output(&self, field: &str) -> Deferred<Value> {
        let resource = self.name.clone();
        let field = field.to_string();
        self.outputs
            .try_map(move |outputs| match outputs.get(&field) {
                Some(value) => Ok(value.clone()),
                None => Err(GraphError::MissingOutput { resource, field }),
            })
    }
}
