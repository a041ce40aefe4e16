use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use resource_graph::{
    invoke, CreateRequest, Engine, EngineConfig, FailurePolicy, GraphError, Input,
    MockProvisioner, ProvisionError, Provisioner, Resource, ResourceStatus, StateActor, Stack,
};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn engine(mock: &MockProvisioner) -> Engine {
    Engine::new(Arc::new(mock.clone()))
}

/// Edge kinds between a resource and an earlier one.
#[derive(Debug, Clone, Copy)]
enum Edge {
    None,
    Input,
    Explicit,
}

fn edge() -> impl Strategy<Value = Edge> {
    prop_oneof![
        2 => Just(Edge::None),
        1 => Just(Edge::Input),
        1 => Just(Edge::Explicit),
    ]
}

/// Resource count, an edge matrix (only `[i][j]` with `j < i` is used) and a
/// per-resource create delay in milliseconds.
fn dag() -> impl Strategy<Value = (usize, Vec<Vec<Edge>>, Vec<u64>)> {
    (3usize..=10).prop_flat_map(|count| {
        (
            Just(count),
            proptest::collection::vec(proptest::collection::vec(edge(), count), count),
            proptest::collection::vec(0u64..5, count),
        )
    })
}

/// Declares the generated graph, runs it and returns the creation order plus the
/// direct edges.
async fn run_dag(
    count: usize,
    matrix: &[Vec<Edge>],
    delays: &[u64],
) -> (Vec<String>, Vec<BTreeSet<usize>>) {
    let mock = MockProvisioner::new();
    let mut stack = Stack::new("generated");
    let mut handles = Vec::new();
    let mut edges: Vec<BTreeSet<usize>> = Vec::new();

    for i in 0..count {
        let name = format!("r{i}");
        let mut resource = Resource::new(name.clone(), "test:Node");
        let mut deps = BTreeSet::new();
        for j in 0..i {
            match matrix[i][j] {
                Edge::Input => {
                    resource = resource
                        .input(format!("from_{j}"), Input::from(handles_output(&handles, j)));
                    deps.insert(j);
                }
                Edge::Explicit => {
                    resource = resource.depends_on(format!("r{j}"));
                    deps.insert(j);
                }
                Edge::None => {}
            }
        }
        mock.delay(name, Duration::from_millis(delays[i]));
        handles.push(stack.declare(resource).unwrap());
        edges.push(deps);
    }

    let report = engine(&mock)
        .with_config(EngineConfig {
            max_in_flight: 3,
            ..EngineConfig::default()
        })
        .run(stack)
        .await
        .unwrap();
    assert!(report.is_success(), "{}", report.failures());
    (mock.calls(), edges)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        .. ProptestConfig::default()
    })]

    /// Every resource is created after everything it transitively depends on.
    #[test]
    fn test_remote_calls_respect_transitive_dependencies((count, matrix, delays) in dag()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let (calls, edges) = runtime.block_on(run_dag(count, &matrix, &delays));

        prop_assert_eq!(calls.len(), count);
        let position: HashMap<&str, usize> =
            calls.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();
        for i in 0..count {
            for dep in transitive(&edges, i) {
                prop_assert!(
                    position[format!("r{dep}").as_str()] < position[format!("r{i}").as_str()],
                    "r{} must be created before r{} in {:?}", dep, i, calls
                );
            }
        }
    }
}

fn handles_output(handles: &[resource_graph::ResourceRef], j: usize) -> resource_graph::Deferred<Value> {
    handles[j].output("id")
}

fn transitive(edges: &[BTreeSet<usize>], start: usize) -> BTreeSet<usize> {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<usize> = edges[start].iter().copied().collect();
    while let Some(node) = stack.pop() {
        if seen.insert(node) {
            stack.extend(edges[node].iter().copied());
        }
    }
    seen
}

#[tokio::test]
async fn test_value_from_another_stack_is_rejected_before_remote_calls() {
    let mock = MockProvisioner::new();
    let mut other = Stack::new("other");
    let foreign = other.declare(Resource::new("cluster", "t")).unwrap();

    let mut stack = Stack::new("main");
    stack.declare(Resource::new("cluster", "t")).unwrap();
    stack
        .declare(Resource::new("app", "t").input("id", foreign.output("id")))
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), engine(&mock).run(stack))
        .await
        .expect("run must not wait on another stack's resources");
    assert_eq!(
        result.unwrap_err(),
        GraphError::UnknownProducer {
            consumer: "app".into(),
            producer: "cluster".into(),
        }
    );
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_cycle_issues_no_remote_calls() {
    let mock = MockProvisioner::new();
    let mut stack = Stack::new("cyclic");
    stack.declare(Resource::new("free", "t")).unwrap();
    let a = stack
        .declare(Resource::new("a", "t").depends_on("b"))
        .unwrap();
    stack
        .declare(Resource::new("b", "t").input("x", Input::from(a.output("id"))))
        .unwrap();

    let result = engine(&mock).run(stack).await;
    match result {
        Err(error @ GraphError::Cycle(_)) => assert!(error.is_definition_error()),
        other => panic!("expected a cycle, got {other:?}"),
    }
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_independent_branches_survive_dependent_failure() {
    let mock = MockProvisioner::new();
    mock.expect_create("a").return_ok(json!({ "id": "a-1" }));
    mock.expect_create("b").return_ok(json!({ "id": "b-1" }));
    mock.expect_create("c").return_err("quota exceeded");

    let mut stack = Stack::new("partial");
    let a = stack.declare(Resource::new("a", "t")).unwrap();
    let b = stack.declare(Resource::new("b", "t")).unwrap();
    let c = stack
        .declare(
            Resource::new("c", "t")
                .input("a", Input::from(a.output("id")))
                .input("b", Input::from(b.output("id"))),
        )
        .unwrap();
    stack
        .declare(Resource::new("d", "t").input("c", Input::from(c.output("id"))))
        .unwrap();
    stack.export("a", a.output("id"));
    stack.export("c", c.output("id"));

    let report = engine(&mock).run(stack).await.unwrap();

    assert_eq!(report.succeeded(), vec!["a", "b"]);
    assert_eq!(report.resource("a").unwrap().outputs, Some(json!({ "id": "a-1" })));
    assert_eq!(report.export("a"), Some(&Ok(json!("a-1"))));
    assert_eq!(
        report.resource("c").unwrap().status,
        ResourceStatus::Failed(GraphError::Remote {
            resource: "c".into(),
            message: "quota exceeded".into(),
        })
    );
    assert_eq!(
        report.resource("d").unwrap().status,
        ResourceStatus::Skipped(GraphError::DependencyFailed {
            resource: "d".into(),
            upstream: "c".into(),
        })
    );

    // c, d and the export of c are all enumerated.
    let failures = report.failures();
    let names: Vec<&str> = failures.0.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["c", "d", "export c"]);
    assert!(matches!(report.ensure_success(), Err(GraphError::RunFailed(_))));
    assert_eq!(mock.call_count("d"), 0);
    mock.verify();
}

#[tokio::test]
async fn test_credentials_decode_chain() {
    let mock = MockProvisioner::new();
    mock.expect_create("cluster").return_ok(json!({ "name": "aks" }));
    mock.expect_invoke("listClusterUserCredentials")
        .return_ok(json!({ "kubeconfigs": [{ "value": STANDARD.encode("hello") }] }));
    let provisioner: Arc<dyn Provisioner> = Arc::new(mock.clone());

    let mut stack = Stack::new("creds");
    let cluster = stack.declare(Resource::new("cluster", "t")).unwrap();
    let credentials = invoke(
        provisioner.clone(),
        "listClusterUserCredentials",
        Input::object([("resourceName", cluster.output("name"))]),
    );
    assert_eq!(
        credentials.producers(),
        BTreeSet::from(["cluster".to_string()])
    );

    let raw = credentials.try_map(|creds| {
        creds["kubeconfigs"][0]["value"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| GraphError::transform("no kubeconfig"))
    });
    let decoded = raw
        .try_map(|encoded| STANDARD.decode(encoded).map_err(GraphError::transform))
        .try_map(|bytes| String::from_utf8(bytes).map_err(GraphError::transform));
    stack.export("kubeconfig", decoded.map(Value::from));

    let report = Engine::new(provisioner).run(stack).await.unwrap();
    assert_eq!(report.export("kubeconfig"), Some(&Ok(json!("hello"))));
    assert_eq!(
        mock.invocations(),
        vec![(
            "listClusterUserCredentials".to_string(),
            json!({ "resourceName": "aks" })
        )]
    );
}

#[tokio::test]
async fn test_transformation_failure_fails_consumer() {
    let mock = MockProvisioner::new();
    let mut stack = Stack::new("transform");
    let key = stack.declare(Resource::new("key", "t")).unwrap();
    let broken = key
        .outputs()
        .try_map(|_| Err::<Value, _>(GraphError::transform("bad key")));
    stack
        .declare(Resource::new("cluster", "t").input("key", Input::from(broken)))
        .unwrap();
    stack
        .declare(Resource::new("pool", "t").depends_on("cluster"))
        .unwrap();

    let report = engine(&mock).run(stack).await.unwrap();
    assert_eq!(
        report.resource("cluster").unwrap().status,
        ResourceStatus::Failed(GraphError::transform("bad key"))
    );
    assert!(matches!(
        report.resource("pool").unwrap().status,
        ResourceStatus::Skipped(GraphError::DependencyFailed { .. })
    ));
    assert_eq!(mock.calls(), vec!["key"]);
}

#[tokio::test]
async fn test_halt_on_failure_starts_nothing_new() {
    let mock = MockProvisioner::new();
    mock.expect_create("first").return_err("boom");
    mock.delay("slow", Duration::from_millis(20));

    let mut stack = Stack::new("halt");
    stack.declare(Resource::new("first", "t")).unwrap();
    stack.declare(Resource::new("slow", "t")).unwrap();
    stack
        .declare(Resource::new("after-slow", "t").depends_on("slow"))
        .unwrap();

    let report = engine(&mock)
        .with_config(EngineConfig {
            max_in_flight: 2,
            failure_policy: FailurePolicy::HaltOnFailure,
        })
        .run(stack)
        .await
        .unwrap();

    // slow was already in flight and is allowed to finish
    assert_eq!(report.resource("slow").unwrap().status, ResourceStatus::Created);
    assert_eq!(
        report.resource("after-slow").unwrap().status,
        ResourceStatus::Skipped(GraphError::Halted("after-slow".into()))
    );
    assert_eq!(mock.call_count("after-slow"), 0);
}

#[tokio::test]
async fn test_rerun_reconciles_against_recorded_state() {
    let (actor, state) = StateActor::new(16);
    let store = tokio::spawn(actor.run());

    let declare = |version: &str| {
        let mut stack = Stack::new("reconcile");
        let group = stack.declare(Resource::new("group", "t").input("location", "westus")).unwrap();
        let cluster = stack
            .declare(
                Resource::new("cluster", "t")
                    .input("group", Input::from(group.output("name")))
                    .input("version", version),
            )
            .unwrap();
        stack
            .declare(Resource::new("pool", "t").input("cluster", Input::from(cluster.output("id"))))
            .unwrap();
        stack.declare(Resource::new("vault", "t").input("sku", "standard")).unwrap();
        stack
    };

    let first = MockProvisioner::new();
    let report = engine(&first)
        .with_state(state.clone())
        .run(declare("1.22.6"))
        .await
        .unwrap();
    assert!(report.is_success());
    assert_eq!(first.calls().len(), 4);

    let second = MockProvisioner::new();
    let report = engine(&second)
        .with_state(state.clone())
        .run(declare("1.22.6"))
        .await
        .unwrap();
    assert!(second.calls().is_empty());
    assert!(report
        .resources
        .iter()
        .all(|r| r.status == ResourceStatus::Unchanged));

    let third = MockProvisioner::new();
    let report = engine(&third)
        .with_state(state.clone())
        .run(declare("1.23.0"))
        .await
        .unwrap();
    assert_eq!(third.calls(), vec!["cluster", "pool"]);
    assert_eq!(report.resource("vault").unwrap().status, ResourceStatus::Unchanged);
    assert_eq!(
        report.resource("cluster").unwrap().inputs,
        Some(json!({ "group": "group", "version": "1.23.0" }))
    );

    let snapshot = state.snapshot().await.unwrap();
    assert_eq!(snapshot.resources["cluster"].inputs["version"], json!("1.23.0"));

    drop(state);
    store.await.unwrap();
}

/// Counts how many creates overlap.
#[derive(Default)]
struct ConcurrencyGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Provisioner for ConcurrencyGauge {
    async fn create(&self, request: CreateRequest) -> Result<Value, ProvisionError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(json!({ "id": request.name }))
    }
}

#[tokio::test]
async fn test_independent_resources_overlap_within_bound() {
    for (bound, expected_peak) in [(1, 1), (3, 3)] {
        let gauge = Arc::new(ConcurrencyGauge::default());
        let mut stack = Stack::new("wide");
        for i in 0..6 {
            stack.declare(Resource::new(format!("r{i}"), "t")).unwrap();
        }

        let report = Engine::new(gauge.clone())
            .with_config(EngineConfig {
                max_in_flight: bound,
                ..EngineConfig::default()
            })
            .run(stack)
            .await
            .unwrap();
        assert!(report.is_success());
        assert_eq!(gauge.peak.load(Ordering::SeqCst), expected_peak);
    }
}
