//! # Deferred Values
//!
//! A [`Deferred<T>`] is a placeholder for a value that only exists once remote work
//! has finished, e.g. the `name` a cloud assigns to a cluster or the credentials it
//! issues for it. Program code never reads such a value directly; it attaches
//! transformations with [`Deferred::map`], [`Deferred::try_map`] and
//! [`Deferred::then`], or combines several values with [`all`] and [`zip`].
//!
//! ## Resolution
//!
//! Every deferred value is a node with an explicit state:
//!
//! ```text
//! Unresolved -> Resolving -> Resolved(value)
//!                         \-> Failed(error)
//! ```
//!
//! [`Deferred::resolve`] drives the node's source future to completion exactly once.
//! The outcome is cached in a [`tokio::sync::OnceCell`], so a second call (or a
//! concurrent one from another branch of the graph) returns the cached value and
//! never repeats the remote call or re-runs a transformation.
//!
//! ## Transformation chains
//!
//! `map` does not mutate the node it is called on. It creates a new node whose source
//! first resolves the parent and then applies the function, so `map(map(d, f), g)`
//! is the chain `d -> f -> g`: `g` can only run after `f` produced its value, and
//! neither runs if `d` failed. A failure is cached on the first failing node and every
//! node composed from it reports the same error without touching upstream work.
//!
//! ## Producers
//!
//! Each node remembers which resources it ultimately comes from. The ordering engine
//! reads [`Deferred::producers`] to derive implicit dependency edges, which is why a
//! value read from a not-yet-created resource is itself always a `Deferred`.
//! A [`Producer`] is qualified by the scope (stack) that declared it, so a value
//! taken from one stack is never mistaken for a same-named resource of another.
//!
//! ```rust
//! use resource_graph::deferred::{all, Deferred};
//!
//! #[tokio::main]
//! async fn main() {
//!     let name = Deferred::ready("aks".to_string());
//!     let upper = name.map(|n| n.to_uppercase());
//!     let both = all([name, upper]);
//!     assert_eq!(both.resolve().await.unwrap(), vec!["aks", "AKS"]);
//! }
//! ```

use crate::error::GraphError;
use futures::future::{self, BoxFuture, FutureExt};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex, OnceCell};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type Source<T> = BoxFuture<'static, Result<T, GraphError>>;

/// Scope of values created outside any stack.
pub const UNSCOPED: u64 = 0;

/// A resource a value comes from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Producer {
    pub scope: u64,
    pub name: String,
}

/// Observable state of a deferred value.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredState<T> {
    Unresolved,
    Resolving,
    Resolved(T),
    Failed(GraphError),
}

struct Node<T> {
    id: u64,
    producers: BTreeSet<Producer>,
    // Taken once the source completed. Kept boxed so a cancelled resolve
    // leaves its progress in place for the next caller.
    source: Mutex<Option<Source<T>>>,
    resolving: AtomicBool,
    outcome: OnceCell<Result<T, GraphError>>,
}

/// A value that will exist once the resources producing it have been materialized.
///
/// Cloning a `Deferred` is cheap and yields a handle to the *same* node: resolving
/// either clone resolves both.
pub struct Deferred<T> {
    node: Arc<Node<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("id", &self.node.id)
            .field("producers", &self.node.producers)
            .finish()
    }
}

impl<T> Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn from_parts(producers: BTreeSet<Producer>, source: Source<T>) -> Self {
        Self {
            node: Arc::new(Node {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                producers,
                source: Mutex::new(Some(source)),
                resolving: AtomicBool::new(false),
                outcome: OnceCell::new(),
            }),
        }
    }

    fn settled(outcome: Result<T, GraphError>) -> Self {
        Self {
            node: Arc::new(Node {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                producers: BTreeSet::new(),
                source: Mutex::new(None),
                resolving: AtomicBool::new(false),
                outcome: OnceCell::new_with(Some(outcome)),
            }),
        }
    }

    /// A value that is already known.
    pub fn ready(value: T) -> Self {
        Self::settled(Ok(value))
    }

    /// A value that is already known to have failed.
    pub fn failed(error: GraphError) -> Self {
        Self::settled(Err(error))
    }

    /// A value computed by an arbitrary future that depends on no declared resource,
    /// e.g. a lookup of something that already exists.
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, GraphError>> + Send + 'static,
    {
        Self::from_parts(BTreeSet::new(), future.boxed())
    }

    /// A value produced by the resource `producer`, completed through the returned
    /// [`Resolver`]. Dropping the resolver fails the value with
    /// [`GraphError::Abandoned`].
    pub fn pending(producer: impl Into<String>) -> (Self, Resolver<T>) {
        Self::pending_in(UNSCOPED, producer)
    }

    /// Like [`Deferred::pending`], for a resource declared in `scope`.
    pub(crate) fn pending_in(scope: u64, producer: impl Into<String>) -> (Self, Resolver<T>) {
        let producer = producer.into();
        let (tx, rx) = oneshot::channel();
        let label = producer.clone();
        let source = async move {
            match rx.await {
                Ok(outcome) => outcome,
                Err(_) => Err(GraphError::Abandoned(label)),
            }
        };
        let origin = Producer {
            scope,
            name: producer.clone(),
        };
        let deferred = Self::from_parts(BTreeSet::from([origin]), source.boxed());
        (deferred, Resolver { producer, tx })
    }

    /// Identity of the underlying node. Clones share it.
    pub fn id(&self) -> u64 {
        self.node.id
    }

    /// Names of the resources this value (transitively) comes from.
    pub fn producers(&self) -> BTreeSet<String> {
        self.node
            .producers
            .iter()
            .map(|producer| producer.name.clone())
            .collect()
    }

    /// Scoped producers, as checked when a stack is planned.
    pub fn origins(&self) -> &BTreeSet<Producer> {
        &self.node.producers
    }

    pub fn state(&self) -> DeferredState<T> {
        match self.node.outcome.get() {
            Some(Ok(value)) => DeferredState::Resolved(value.clone()),
            Some(Err(error)) => DeferredState::Failed(error.clone()),
            None if self.node.resolving.load(Ordering::SeqCst) => DeferredState::Resolving,
            None => DeferredState::Unresolved,
        }
    }

    /// Attaches an infallible transformation.
    pub fn map<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let parent = self.clone();
        Deferred::from_parts(
            self.node.producers.clone(),
            async move { parent.resolve().await.map(f) }.boxed(),
        )
    }

    /// Attaches a fallible transformation. An `Err` fails the new value and
    /// everything composed from it.
    pub fn try_map<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Result<U, GraphError> + Send + 'static,
    {
        let parent = self.clone();
        Deferred::from_parts(
            self.node.producers.clone(),
            async move { parent.resolve().await.and_then(f) }.boxed(),
        )
    }

    /// Attaches an asynchronous transformation, such as a remote lookup keyed on the
    /// resolved value.
    pub fn then<U, F, Fut>(&self, f: F) -> Deferred<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<U, GraphError>> + Send + 'static,
    {
        let parent = self.clone();
        Deferred::from_parts(
            self.node.producers.clone(),
            async move {
                let value = parent.resolve().await?;
                f(value).await
            }
            .boxed(),
        )
    }

    /// Drives the value to completion and returns the cached outcome.
    ///
    /// Intended for the runtime (the engine and export collection). Safe to call
    /// repeatedly and concurrently.
    pub async fn resolve(&self) -> Result<T, GraphError> {
        let node = &self.node;
        node.outcome
            .get_or_init(|| async {
                node.resolving.store(true, Ordering::SeqCst);
                let mut slot = node.source.lock().await;
                let outcome = match slot.as_mut() {
                    Some(source) => source.await,
                    None => Err(GraphError::Abandoned(format!("deferred #{}", node.id))),
                };
                *slot = None;
                outcome
            })
            .await
            .clone()
    }
}

/// Write half of a [`Deferred::pending`] value, held by whoever performs the remote
/// work.
pub struct Resolver<T> {
    producer: String,
    tx: oneshot::Sender<Result<T, GraphError>>,
}

impl<T> Resolver<T> {
    pub fn producer(&self) -> &str {
        &self.producer
    }

    /// Completes the value. Has no effect if every handle was dropped.
    pub fn complete(self, outcome: Result<T, GraphError>) {
        let _ = self.tx.send(outcome);
    }
}

/// Resolves to every input, in order, once all of them resolved.
///
/// Fails with the first failure in declaration order, regardless of which input
/// failed first in time.
pub fn all<T, I>(values: I) -> Deferred<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = Deferred<T>>,
{
    let values: Vec<Deferred<T>> = values.into_iter().collect();
    let producers = values
        .iter()
        .flat_map(|value| value.origins().iter().cloned())
        .collect();
    Deferred::from_parts(
        producers,
        async move {
            let outcomes = future::join_all(values.iter().map(Deferred::resolve)).await;
            outcomes.into_iter().collect()
        }
        .boxed(),
    )
}

/// Pairs two values of different types.
pub fn zip<A, B>(a: &Deferred<A>, b: &Deferred<B>) -> Deferred<(A, B)>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
{
    let producers = a.origins().union(b.origins()).cloned().collect();
    let (a, b) = (a.clone(), b.clone());
    Deferred::from_parts(
        producers,
        async move {
            let (left, right) = future::join(a.resolve(), b.resolve()).await;
            Ok((left?, right?))
        }
        .boxed(),
    )
}
