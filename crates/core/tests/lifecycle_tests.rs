//! Runtime behavior of linked injectors: fabrication modes, container
//! scopes and parent/child injector instances.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use wirelink_core::lifecycle::{Arguments, CacheDiscipline, Elements, Resolution, WiringBuilder};
use wirelink_core::{
    BindingKey, CatalogRecords, CoreError, FabricationMode, Injector, Instance, LinkReport,
    LinkedInjector, Linker, LinkerSettings, Provider, ProviderId, Specification, TypeRef, Wiring,
};

#[derive(Debug)]
struct Leaf {
    value: u64,
}

#[derive(Debug)]
struct Node {
    leaves: Vec<Arc<Leaf>>,
}

fn key(name: &str) -> BindingKey {
    BindingKey::named(name)
}

fn leaves() -> BindingKey {
    BindingKey::of(TypeRef::generic("List", [TypeRef::named("Leaf")]))
}

fn id(spec: &str, member: &str) -> ProviderId {
    ProviderId::new(TypeRef::named(spec), member)
}

fn fixture(name: &str) -> CatalogRecords {
    let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
    CatalogRecords::from_file(path).expect("fixture should load")
}

fn linked<'a>(report: &'a LinkReport, injector: &str) -> &'a LinkedInjector {
    let linked = report
        .find(&TypeRef::named(injector))
        .unwrap_or_else(|| panic!("{} was not linked", injector));
    assert!(linked.diagnostics.is_empty(), "{}", linked.diagnostics);
    linked
}

fn wiring_for(linked: &LinkedInjector) -> WiringBuilder {
    Wiring::builder(
        linked.graph.clone().expect("graph"),
        linked.plan.clone().expect("plan"),
    )
}

fn tree_wiring(counter: Arc<AtomicU64>) -> Wiring {
    let report = Linker::default().link(fixture("tree.yaml"));
    let tree = linked(&report, "TreeInjector");

    let leaf = |args: &Arguments| -> Result<Instance, CoreError> {
        let value = args.get::<u64>(0)?;
        Ok(Arc::new(Leaf { value: *value }) as Instance)
    };

    wiring_for(tree)
        .factory(id("TreeSpec", "counter"), move |_| {
            Ok(Arc::new(counter.fetch_add(1, Ordering::SeqCst)) as Instance)
        })
        .factory(id("TreeSpec", "left_leaf"), leaf)
        .factory(id("TreeSpec", "right_leaf"), leaf)
        .factory(id("TreeSpec", "node"), |args| {
            let elements = args.get::<Elements>(0)?;
            let leaves = elements
                .iter()
                .map(|element| {
                    Arc::clone(element)
                        .downcast::<Leaf>()
                        .map_err(|_| CoreError::factory_failed(args.key(), "element is not a leaf"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Arc::new(Node { leaves }) as Instance)
        })
        .build()
        .expect("every provider has a factory")
}

#[test]
fn test_container_call_shares_container_scoped_values() {
    let wiring = tree_wiring(Arc::new(AtomicU64::new(1)));
    let scope = wiring.root_scope(HashMap::new());

    let first = wiring.output_as::<Node>(&scope, "node").unwrap();
    assert_eq!(first.leaves.len(), 2);
    assert_eq!(first.leaves[0].value, first.leaves[1].value);
    assert!(!Arc::ptr_eq(&first.leaves[0], &first.leaves[1]));

    let second = wiring.output_as::<Node>(&scope, "node").unwrap();
    assert_eq!(second.leaves[0].value, second.leaves[1].value);
    assert_ne!(first.leaves[0].value, second.leaves[0].value);
}

#[test]
fn test_tree_plan_disciplines() {
    let wiring = tree_wiring(Arc::new(AtomicU64::new(0)));
    let plan = wiring.plan();

    assert_eq!(plan.discipline(&key("Node")), Some(&CacheDiscipline::OpensContainer));
    assert_eq!(plan.discipline(&key("Int")), Some(&CacheDiscipline::ContainerCache));
    assert_eq!(plan.discipline(&leaves()), Some(&CacheDiscipline::Uncached));
    assert!(plan.output("counter").unwrap().opens_container());
    assert!(!plan.binding(&key("Int")).unwrap().reached_outside_container);
}

#[test]
fn test_output_override_opens_fresh_container() {
    let wiring = tree_wiring(Arc::new(AtomicU64::new(10)));
    let scope = wiring.root_scope(HashMap::new());

    let a = wiring.output_as::<u64>(&scope, "counter").unwrap();
    let b = wiring.output_as::<u64>(&scope, "counter").unwrap();
    assert_eq!((*a, *b), (10, 11));
    assert_eq!(scope.cached_count(), 0);
}

#[test]
fn test_concurrent_container_calls_are_isolated() {
    let wiring = tree_wiring(Arc::new(AtomicU64::new(0)));
    let scope = wiring.root_scope(HashMap::new());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let wiring = wiring.clone();
            let scope = Arc::clone(&scope);
            thread::spawn(move || {
                let node = wiring.output_as::<Node>(&scope, "node").unwrap();
                assert_eq!(node.leaves[0].value, node.leaves[1].value);
                node.leaves[0].value
            })
        })
        .collect();

    let mut values: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    values.sort_unstable();
    values.dedup();
    assert_eq!(values.len(), 8);
}

#[derive(Debug)]
struct Session {
    clock: Arc<u64>,
}

#[derive(Debug)]
struct Request {
    session: Arc<Session>,
    clock: Arc<u64>,
}

fn session_wiring(clock: Arc<AtomicU64>) -> Wiring {
    let records = CatalogRecords::new()
        .specification(
            Specification::named("WebSpec")
                .provider(Provider::method("clock", key("Clock")).with_mode(FabricationMode::ContainerScoped))
                .provider(
                    Provider::method("session", key("Session"))
                        .param(key("Clock"))
                        .with_mode(FabricationMode::Scoped),
                )
                .provider(
                    Provider::method("request", key("Request"))
                        .param(key("Session"))
                        .param(key("Clock"))
                        .with_mode(FabricationMode::Container),
                ),
        )
        .injector(Injector::named("Web").compose("WebSpec").output("request", key("Request")));

    let report = Linker::default().link(records);
    wiring_for(linked(&report, "Web"))
        .factory(id("WebSpec", "clock"), move |_| {
            Ok(Arc::new(clock.fetch_add(1, Ordering::SeqCst)) as Instance)
        })
        .factory(id("WebSpec", "session"), |args| {
            Ok(Arc::new(Session { clock: args.get::<u64>(0)? }) as Instance)
        })
        .factory(id("WebSpec", "request"), |args| {
            Ok(Arc::new(Request {
                session: args.get::<Session>(0)?,
                clock: args.get::<u64>(1)?,
            }) as Instance)
        })
        .build()
        .unwrap()
}

#[test]
fn test_scoped_pins_container_scoped_value() {
    let wiring = session_wiring(Arc::new(AtomicU64::new(0)));
    assert_eq!(wiring.plan().binding(&key("Session")).unwrap().pinned, vec![key("Clock")]);
    let scope = wiring.root_scope(HashMap::new());

    let first = wiring.output_as::<Request>(&scope, "request").unwrap();
    let second = wiring.output_as::<Request>(&scope, "request").unwrap();

    assert_eq!((*first.clock, *second.clock), (0, 1));
    assert!(Arc::ptr_eq(&first.session, &second.session));
    assert_eq!(*second.session.clock, 0);
    assert!(Arc::ptr_eq(&first.session.clock, &first.clock));
}

#[test]
fn test_concurrent_calls_in_one_container_build_once() {
    let counter = Arc::new(AtomicU64::new(0));
    let wiring = session_wiring(Arc::clone(&counter));
    let call = Resolution::new(wiring.root_scope(HashMap::new())).open_container();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let wiring = wiring.clone();
            let call = call.clone();
            thread::spawn(move || wiring.resolve_as::<u64>(&call, &key("Clock")).unwrap())
        })
        .collect();

    let clocks: Vec<Arc<u64>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(clocks.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
}

fn counting_spec_records(mode: FabricationMode) -> CatalogRecords {
    CatalogRecords::new()
        .specification(
            Specification::named("ServiceSpec")
                .provider(Provider::method("service", key("Service")).with_mode(mode))
                .provider(Provider::method("client", key("Client")).param(key("Service"))),
        )
        .injector(
            Injector::named("App")
                .compose("ServiceSpec")
                .output("service", key("Service"))
                .output("client", key("Client")),
        )
}

fn counting_wiring(mode: FabricationMode, built: Arc<AtomicUsize>) -> Wiring {
    let report = Linker::default().link(counting_spec_records(mode));
    wiring_for(linked(&report, "App"))
        .factory(id("ServiceSpec", "service"), move |_| {
            Ok(Arc::new(built.fetch_add(1, Ordering::SeqCst)) as Instance)
        })
        .factory(id("ServiceSpec", "client"), |args| Ok(args.instance(0)?))
        .build()
        .unwrap()
}

#[test]
fn test_scoped_binding_is_shared_per_injector_instance() {
    let built = Arc::new(AtomicUsize::new(0));
    let wiring = counting_wiring(FabricationMode::Scoped, Arc::clone(&built));

    let scope = wiring.root_scope(HashMap::new());
    let direct = wiring.output(&scope, "service").unwrap();
    let through_client = wiring.output(&scope, "client").unwrap();
    assert!(Arc::ptr_eq(&direct, &through_client));
    assert_eq!(built.load(Ordering::SeqCst), 1);

    let other = wiring.root_scope(HashMap::new());
    let fresh = wiring.output(&other, "service").unwrap();
    assert!(!Arc::ptr_eq(&direct, &fresh));
    assert_eq!(built.load(Ordering::SeqCst), 2);
}

#[test]
fn test_recurrent_binding_is_rebuilt_every_time() {
    let built = Arc::new(AtomicUsize::new(0));
    let wiring = counting_wiring(FabricationMode::Recurrent, Arc::clone(&built));

    let scope = wiring.root_scope(HashMap::new());
    let a = wiring.output(&scope, "service").unwrap();
    let b = wiring.output(&scope, "service").unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(built.load(Ordering::SeqCst), 2);
    assert_eq!(scope.cached_count(), 0);
}

#[derive(Debug)]
struct Handler {
    database: Instance,
    request: Arc<String>,
}

#[derive(Debug)]
struct Pair {
    clock: Arc<u64>,
    stamp: Arc<u64>,
}

fn request_records() -> CatalogRecords {
    CatalogRecords::new()
        .specification(
            Specification::named("AppSpec")
                .provider(Provider::method("database", key("Database")).with_mode(FabricationMode::Scoped))
                .provider(Provider::method("clock", key("Clock")).with_mode(FabricationMode::ContainerScoped)),
        )
        .specification(
            Specification::named("RequestSpec")
                .provider(
                    Provider::method("handler", key("Handler"))
                        .param(key("Database"))
                        .param(key("RequestId")),
                )
                .provider(Provider::method("stamp", key("Stamp")).param(key("Clock")))
                .provider(
                    Provider::method("pair", key("Pair"))
                        .param(key("Clock"))
                        .param(key("Stamp"))
                        .with_mode(FabricationMode::Container),
                ),
        )
        .injector(
            Injector::named("App")
                .compose("AppSpec")
                .output("database", key("Database"))
                .child("request", "RequestInjector", [key("RequestId")]),
        )
        .injector(
            Injector::named("RequestInjector")
                .compose("RequestSpec")
                .output("handler", key("Handler"))
                .output("pair", key("Pair")),
        )
}

fn request_wirings(clock: Arc<AtomicU64>) -> (Wiring, Wiring) {
    let report = Linker::new(LinkerSettings::new().with_parallel(false)).link(request_records());

    let app = wiring_for(linked(&report, "App"))
        .factory(id("AppSpec", "database"), |_| Ok(Arc::new("db".to_string()) as Instance))
        .factory(id("AppSpec", "clock"), move |_| {
            Ok(Arc::new(clock.fetch_add(1, Ordering::SeqCst)) as Instance)
        })
        .build()
        .unwrap();

    let request = wiring_for(linked(&report, "RequestInjector"))
        .factory(id("RequestSpec", "handler"), |args| {
            Ok(Arc::new(Handler {
                database: args.instance(0)?,
                request: args.get::<String>(1)?,
            }) as Instance)
        })
        .factory(id("RequestSpec", "stamp"), |args| Ok(args.instance(0)?))
        .factory(id("RequestSpec", "pair"), |args| {
            Ok(Arc::new(Pair {
                clock: args.get::<u64>(0)?,
                stamp: args.get::<u64>(1)?,
            }) as Instance)
        })
        .parent(app.clone())
        .build()
        .unwrap();

    (app, request)
}

fn request_id(value: &str) -> HashMap<BindingKey, Instance> {
    let mut supplied: HashMap<BindingKey, Instance> = HashMap::new();
    supplied.insert(key("RequestId"), Arc::new(value.to_string()));
    supplied
}

#[test]
fn test_child_injectors_reuse_parent_scoped_values() {
    let (app, request) = request_wirings(Arc::new(AtomicU64::new(0)));
    let root = app.root_scope(HashMap::new());
    let database = app.output(&root, "database").unwrap();

    let first = request.child_scope(&root, request_id("r1"));
    let second = request.child_scope(&root, request_id("r2"));
    let a = request.output_as::<Handler>(&first, "handler").unwrap();
    let b = request.output_as::<Handler>(&second, "handler").unwrap();

    assert!(Arc::ptr_eq(&a.database, &database));
    assert!(Arc::ptr_eq(&b.database, &database));
    assert_eq!(a.request.as_str(), "r1");
    assert_eq!(b.request.as_str(), "r2");
    assert_eq!(first.parent().map(|p| p.id()), Some(root.id()));
}

#[test]
fn test_child_container_calls_share_inherited_container_values() {
    let (app, request) = request_wirings(Arc::new(AtomicU64::new(0)));
    let root = app.root_scope(HashMap::new());
    let child = request.child_scope(&root, request_id("r1"));

    let first = request.output_as::<Pair>(&child, "pair").unwrap();
    assert!(Arc::ptr_eq(&first.clock, &first.stamp));

    let second = request.output_as::<Pair>(&child, "pair").unwrap();
    assert!(Arc::ptr_eq(&second.clock, &second.stamp));
    assert_ne!(*first.clock, *second.clock);
    assert_eq!(root.cached_count(), 0);
}

#[test]
fn test_child_wiring_requires_parent() {
    let report = Linker::default().link(request_records());
    let result = wiring_for(linked(&report, "RequestInjector"))
        .factory(id("RequestSpec", "handler"), |args| Ok(args.instance(0)?))
        .factory(id("RequestSpec", "stamp"), |args| Ok(args.instance(0)?))
        .factory(id("RequestSpec", "pair"), |args| Ok(args.instance(0)?))
        .build();

    assert!(matches!(result, Err(CoreError::Scope { .. })));
}

#[test]
fn test_missing_child_parameter_is_a_scope_error() {
    let (app, request) = request_wirings(Arc::new(AtomicU64::new(0)));
    let root = app.root_scope(HashMap::new());
    let child = request.child_scope(&root, HashMap::new());

    let result = request.output(&child, "handler");
    assert!(matches!(result, Err(CoreError::Scope { .. })));
}
