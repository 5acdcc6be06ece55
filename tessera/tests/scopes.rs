mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use once_cell::sync::OnceCell;
use tessera::prelude::*;

struct Expensive {
    id: usize,
}

fn expensive(builds: &Arc<AtomicUsize>) -> ComponentRecord {
    let builds = builds.clone();
    ComponentRecord::of::<Expensive>("expensive").recipe(ConstructionRecipe::no_args(move || Expensive {
        id: builds.fetch_add(1, Ordering::SeqCst),
    }))
}

struct Holder {
    expensive: OnceCell<Lazy<Expensive>>,
}

fn holder() -> ComponentRecord {
    ComponentRecord::of::<Holder>("holder")
        .recipe(ConstructionRecipe::no_args(|| Holder { expensive: OnceCell::new() }))
        .field(FieldInjection::lazy("expensive", |h: &Holder, lazy: Lazy<Expensive>| {
            let _ = h.expensive.set(lazy);
        }))
}

#[test]
fn deferred_target_is_not_built_with_its_consumer() {
    common::init_tracing();
    let builds = Arc::new(AtomicUsize::new(0));
    let container = Container::builder()
        .component(holder())
        .component(expensive(&builds).deferred())
        .build()
        .unwrap();
    container.refresh().unwrap();

    assert_eq!(builds.load(Ordering::SeqCst), 0);
    assert_eq!(container.ready_components(), vec!["holder"]);

    let holder: Arc<Holder> = container.resolve().unwrap();
    let lazy = holder.expensive.get().unwrap();
    assert!(lazy.is_deferred());
    assert_eq!(lazy.target_name(), Some("expensive"));

    let first = lazy.get().unwrap();
    let second = lazy.get().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert_eq!(container.ready_components(), vec!["holder", "expensive"]);
}

#[test]
fn eager_requirement_on_deferred_component_builds_on_first_use() {
    struct Consumer {
        expensive: Arc<Expensive>,
    }

    common::init_tracing();
    let builds = Arc::new(AtomicUsize::new(0));
    let container = Container::builder()
        .component(expensive(&builds).deferred())
        .component(ComponentRecord::of::<Consumer>("consumer").transient().recipe(ConstructionRecipe::new(
            vec![DependencyRequirement::of::<Expensive>()],
            |args| Ok(Consumer { expensive: args.instance()? }),
        )))
        .build()
        .unwrap();
    container.refresh().unwrap();
    assert_eq!(builds.load(Ordering::SeqCst), 0);

    let a: Arc<Consumer> = container.resolve().unwrap();
    let b: Arc<Consumer> = container.resolve().unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a.expensive, &b.expensive));
    assert_eq!(builds.load(Ordering::SeqCst), 1);
}

#[test]
fn supplier_resolves_fresh_transients() {
    struct Ticket;

    common::init_tracing();
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = builds.clone();
    let container = Container::builder()
        .component(ComponentRecord::of::<Ticket>("ticket").transient().recipe(ConstructionRecipe::no_args(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ticket
            },
        )))
        .build()
        .unwrap();
    container.refresh().unwrap();

    let supplier: Supplier<Ticket> = container.resolve_supplier().unwrap();
    assert_eq!(builds.load(Ordering::SeqCst), 0);

    let a = supplier.get().unwrap();
    let b = supplier.get().unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(supplier.all().unwrap().len(), 1);
    assert!(supplier.get_if_unique().unwrap().is_some());
    assert_eq!(builds.load(Ordering::SeqCst), 4);
}

#[test]
fn supplier_tolerates_missing_and_ambiguous() {
    trait Plugin: Send + Sync {}
    struct A;
    impl Plugin for A {}
    struct B;
    impl Plugin for B {}

    common::init_tracing();
    let container = Container::builder().build().unwrap();
    container.refresh().unwrap();
    let supplier: Supplier<dyn Plugin> = container.resolve_supplier().unwrap();
    assert!(supplier.get_if_available().unwrap().is_none());
    assert!(supplier.get().is_err());

    let container = Container::builder()
        .component(ComponentRecord::of::<A>("a").exposes(|a: Arc<A>| a as Arc<dyn Plugin>).recipe(ConstructionRecipe::no_args(|| A)))
        .component(ComponentRecord::of::<B>("b").exposes(|b: Arc<B>| b as Arc<dyn Plugin>).recipe(ConstructionRecipe::no_args(|| B)))
        .build()
        .unwrap();
    container.refresh().unwrap();
    let supplier: Supplier<dyn Plugin> = container.resolve_supplier().unwrap();
    assert!(supplier.get_if_unique().unwrap().is_none());
    assert!(matches!(supplier.get_if_available(), Err(ContainerError::AmbiguousDependency(_))));
    assert_eq!(supplier.all().unwrap().len(), 2);
}

#[test]
fn custom_scope_delegates_to_its_handler() {
    common::init_tracing();
    let builds = Arc::new(AtomicUsize::new(0));
    let unit = Arc::new(ScopedStore::new());
    let container = Container::builder()
        .scope("unit", unit.clone())
        .component(expensive(&builds).in_scope(Scope::Custom("unit")))
        .build()
        .unwrap();
    container.refresh().unwrap();
    assert_eq!(builds.load(Ordering::SeqCst), 0);

    let a: Arc<Expensive> = container.resolve().unwrap();
    let b: Arc<Expensive> = container.resolve().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(unit.len(), 1);

    unit.clear();
    let c: Arc<Expensive> = container.resolve().unwrap();
    assert_eq!((a.id, c.id), (0, 1));
    assert!(container.ready_components().is_empty());
}

#[test]
fn scope_mismatch_can_be_denied() {
    struct Pool;
    struct Session;

    common::init_tracing();
    let container = Container::builder()
        .scope_mismatch(ScopeMismatchPolicy::Deny)
        .component(ComponentRecord::of::<Session>("session").transient().recipe(ConstructionRecipe::no_args(|| Session)))
        .component(ComponentRecord::of::<Pool>("pool").recipe(ConstructionRecipe::new(
            vec![DependencyRequirement::of::<Session>()],
            |_| Ok(Pool),
        )))
        .build()
        .unwrap();
    match container.refresh() {
        Err(ContainerError::ScopeMismatch(e)) => {
            assert_eq!(e.consumer, "pool");
            assert_eq!(e.dependency, "session");
        }
        other => panic!("Expected ScopeMismatch, got: {other:?}"),
    }
}

// ── Late registration ──

trait Plugin: Send + Sync {
    fn id(&self) -> &'static str;
}

struct Audit;
impl Plugin for Audit {
    fn id(&self) -> &'static str {
        "audit"
    }
}

struct Host {
    plugin: OnceCell<Lazy<dyn Plugin>>,
}

#[test]
fn late_deferred_registration_binds_pending_handles() {
    common::init_tracing();
    let container = Container::builder()
        .component(
            ComponentRecord::of::<Host>("host")
                .recipe(ConstructionRecipe::no_args(|| Host { plugin: OnceCell::new() }))
                .field(FieldInjection::lazy("plugin", |h: &Host, lazy: Lazy<dyn Plugin>| {
                    let _ = h.plugin.set(lazy);
                })),
        )
        .build()
        .unwrap();
    container.refresh().unwrap();

    let host: Arc<Host> = container.resolve().unwrap();
    let plugin = host.plugin.get().unwrap();
    assert_eq!(plugin.target_name(), None);
    assert!(matches!(plugin.get(), Err(ContainerError::UnresolvedDependency(_))));

    let eager = ComponentRecord::of::<Audit>("eagerAudit").recipe(ConstructionRecipe::no_args(|| Audit));
    assert!(matches!(
        container.register_component(eager),
        Err(ContainerError::RegistryFrozen { .. })
    ));

    container
        .register_component(
            ComponentRecord::of::<Audit>("audit")
                .exposes(|a: Arc<Audit>| a as Arc<dyn Plugin>)
                .deferred()
                .recipe(ConstructionRecipe::no_args(|| Audit)),
        )
        .unwrap();
    assert_eq!(plugin.target_name(), Some("audit"));
    assert_eq!(plugin.get().unwrap().id(), "audit");
}

struct Heavy;
impl Plugin for Heavy {
    fn id(&self) -> &'static str {
        "heavy"
    }
}

struct Registry {
    loaded: OnceCell<Vec<Arc<dyn Plugin>>>,
    all: OnceCell<Vec<Lazy<dyn Plugin>>>,
}

#[test]
fn collections_do_not_build_deferred_members() {
    common::init_tracing();
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = builds.clone();
    let container = Container::builder()
        .component(
            ComponentRecord::of::<Audit>("audit")
                .exposes(|a: Arc<Audit>| a as Arc<dyn Plugin>)
                .recipe(ConstructionRecipe::no_args(|| Audit)),
        )
        .component(
            ComponentRecord::of::<Heavy>("heavy")
                .exposes(|h: Arc<Heavy>| h as Arc<dyn Plugin>)
                .deferred()
                .recipe(ConstructionRecipe::no_args(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Heavy
                })),
        )
        .component(
            ComponentRecord::of::<Registry>("registry")
                .recipe(ConstructionRecipe::no_args(|| Registry {
                    loaded: OnceCell::new(),
                    all: OnceCell::new(),
                }))
                .field(FieldInjection::all("loaded", |r: &Registry, plugins: Vec<Arc<dyn Plugin>>| {
                    let _ = r.loaded.set(plugins);
                }))
                .field(FieldInjection::lazy_all("all", |r: &Registry, plugins: Vec<Lazy<dyn Plugin>>| {
                    let _ = r.all.set(plugins);
                })),
        )
        .build()
        .unwrap();
    container.refresh().unwrap();

    assert_eq!(builds.load(Ordering::SeqCst), 0);
    assert_eq!(container.ready_components(), vec!["audit", "registry"]);

    let registry: Arc<Registry> = container.resolve().unwrap();
    let loaded: Vec<&str> = registry.loaded.get().unwrap().iter().map(|p| p.id()).collect();
    assert_eq!(loaded, vec!["audit"]);

    let all = registry.all.get().unwrap();
    assert_eq!(all.len(), 2);
    assert!(all[1].is_deferred());
    assert_eq!(all[1].target_name(), Some("heavy"));
    assert_eq!(builds.load(Ordering::SeqCst), 0);
    assert_eq!(all[1].get().unwrap().id(), "heavy");
    assert_eq!(builds.load(Ordering::SeqCst), 1);

    let everything: Vec<Arc<dyn Plugin>> = container.resolve_all().unwrap();
    assert_eq!(everything.len(), 2);
    assert_eq!(builds.load(Ordering::SeqCst), 1);
}

// ── Concurrency ──

#[test]
fn racing_lookups_build_once() {
    common::init_tracing();
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = builds.clone();
    let container = Container::builder()
        .component(
            ComponentRecord::of::<Expensive>("slow")
                .deferred()
                .recipe(ConstructionRecipe::no_args(move || {
                    thread::sleep(Duration::from_millis(20));
                    Expensive {
                        id: counter.fetch_add(1, Ordering::SeqCst),
                    }
                })),
        )
        .build()
        .unwrap();
    container.refresh().unwrap();

    let instances: Vec<Instance> = thread::scope(|scope| {
        let workers: Vec<_> = (0..8).map(|_| scope.spawn(|| container.get("slow").unwrap())).collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(instances.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}

#[test]
fn close_waits_for_in_flight_lookups() {
    common::init_tracing();
    let started = Arc::new(AtomicUsize::new(0));
    let signal = started.clone();
    let container = Container::builder()
        .component(
            ComponentRecord::of::<Expensive>("slow")
                .transient()
                .recipe(ConstructionRecipe::no_args(move || {
                    signal.store(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(50));
                    Expensive { id: 7 }
                })),
        )
        .build()
        .unwrap();
    container.refresh().unwrap();

    thread::scope(|scope| {
        let lookup = scope.spawn(|| container.resolve::<Expensive>());
        while started.load(Ordering::SeqCst) == 0 {
            thread::yield_now();
        }
        container.close().unwrap();
        let resolved = lookup.join().unwrap();
        assert_eq!(resolved.unwrap().id, 7);
    });

    assert!(matches!(container.get("slow"), Err(ContainerError::ContainerClosed)));
}
