mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::OnceCell;
use tessera::prelude::*;

struct ServiceX {
    y: OnceCell<Arc<ServiceY>>,
}

struct ServiceY {
    x: OnceCell<Arc<ServiceX>>,
}

fn service_x() -> ComponentRecord {
    ComponentRecord::of::<ServiceX>("serviceX")
        .recipe(ConstructionRecipe::no_args(|| ServiceX { y: OnceCell::new() }))
        .field(FieldInjection::one("y", |x: &ServiceX, y: Arc<ServiceY>| {
            let _ = x.y.set(y);
        }))
}

fn service_y() -> ComponentRecord {
    ComponentRecord::of::<ServiceY>("serviceY")
        .recipe(ConstructionRecipe::no_args(|| ServiceY { x: OnceCell::new() }))
        .field(FieldInjection::one("x", |y: &ServiceY, x: Arc<ServiceX>| {
            let _ = y.x.set(x);
        }))
}

#[test]
fn field_cycle_round_trips_identity() {
    common::init_tracing();
    let container = Container::builder()
        .component(service_x())
        .component(service_y())
        .build()
        .unwrap();
    container.refresh().unwrap();

    let x: Arc<ServiceX> = container.resolve_named("serviceX").unwrap();
    let y: Arc<ServiceY> = container.resolve_named("serviceY").unwrap();

    assert!(Arc::ptr_eq(x.y.get().unwrap().x.get().unwrap(), &x));
    assert!(Arc::ptr_eq(y.x.get().unwrap().y.get().unwrap(), &y));
    assert!(!container.is_early_pending("serviceX"));
    assert!(!container.is_early_pending("serviceY"));
}

#[test]
fn field_cycle_fails_in_strict_mode() {
    common::init_tracing();
    let container = Container::builder()
        .allow_circular_references(false)
        .component(service_x())
        .component(service_y())
        .build()
        .unwrap();
    match container.refresh() {
        Err(ContainerError::CyclicConstruction(e)) => {
            assert_eq!(e.chain.first(), e.chain.last());
            assert!(e.chain.contains(&"serviceX".to_string()));
        }
        other => panic!("Expected CyclicConstruction, got: {other:?}"),
    }
    assert_eq!(container.phase(), Phase::Closed);
}

struct Left {
    _right: Arc<Right>,
}

struct Right {
    _left: Arc<Left>,
}

fn left() -> ComponentRecord {
    ComponentRecord::of::<Left>("left").recipe(ConstructionRecipe::new(
        vec![DependencyRequirement::of::<Right>()],
        |args| Ok(Left { _right: args.instance()? }),
    ))
}

fn right() -> ComponentRecord {
    ComponentRecord::of::<Right>("right").recipe(ConstructionRecipe::new(
        vec![DependencyRequirement::of::<Left>()],
        |args| Ok(Right { _left: args.instance()? }),
    ))
}

#[test]
fn constructor_cycle_fails_refresh() {
    common::init_tracing();
    let container = Container::builder()
        .component(left())
        .component(right())
        .build()
        .unwrap();
    match container.refresh() {
        Err(ContainerError::CyclicConstruction(e)) => {
            assert_eq!(e.chain, vec!["left", "right", "left"]);
        }
        other => panic!("Expected CyclicConstruction, got: {other:?}"),
    }
    assert!(container.ready_components().is_empty());
    assert!(!container.is_early_pending("left"));
}

#[test]
fn transient_cycle_fails_without_cache_entries() {
    common::init_tracing();
    let container = Container::builder()
        .component(left().transient())
        .component(right().transient())
        .build()
        .unwrap();
    container.refresh().unwrap();

    match container.get("left") {
        Err(ContainerError::CyclicConstruction(e)) => {
            assert_eq!(e.chain, vec!["left", "right", "left"]);
        }
        other => panic!("Expected CyclicConstruction, got: {:?}", other.is_ok()),
    }
    assert!(container.ready_components().is_empty());
    assert!(!container.is_early_pending("left"));
    assert!(!container.is_early_pending("right"));
    assert!(container.is_active());
}

#[test]
fn lazy_requirement_breaks_constructor_cycle() {
    struct Lhs {
        rhs: Lazy<Rhs>,
    }
    struct Rhs {
        lhs: Arc<Lhs>,
    }

    common::init_tracing();
    let container = Container::builder()
        .component(ComponentRecord::of::<Lhs>("lhs").recipe(ConstructionRecipe::new(
            vec![DependencyRequirement::of::<Rhs>().lazy()],
            |args| Ok(Lhs { rhs: args.lazy()? }),
        )))
        .component(ComponentRecord::of::<Rhs>("rhs").recipe(ConstructionRecipe::new(
            vec![DependencyRequirement::of::<Lhs>()],
            |args| Ok(Rhs { lhs: args.instance()? }),
        )))
        .build()
        .unwrap();
    container.refresh().unwrap();

    let lhs: Arc<Lhs> = container.resolve().unwrap();
    let rhs = lhs.rhs.get().unwrap();
    assert!(Arc::ptr_eq(&rhs.lhs, &lhs));
    assert_eq!(container.ready_components(), vec!["lhs", "rhs"]);
}

#[test]
fn depth_guard_reports_runaway_recursion() {
    struct Node;

    common::init_tracing();
    let mut builder = Container::builder().max_construction_depth(3);
    for i in 0..5 {
        let mut record = ComponentRecord::of::<Node>(format!("n{i}")).recipe(ConstructionRecipe::no_args(|| Node));
        if i < 4 {
            record = record.depends_on(format!("n{}", i + 1));
        }
        builder = builder.component(record);
    }
    let container = builder.build().unwrap();
    match container.refresh() {
        Err(ContainerError::CyclicConstruction(e)) => {
            assert_eq!(e.chain, vec!["n0", "n1", "n2", "n3"]);
        }
        other => panic!("Expected CyclicConstruction, got: {other:?}"),
    }
}

struct Flaky {
    partner: OnceCell<Arc<Partner>>,
}

struct Partner {
    flaky: OnceCell<Arc<Flaky>>,
}

#[test]
fn failed_construction_evicts_holders_of_its_early_reference() {
    common::init_tracing();
    let attempts = Arc::new(AtomicUsize::new(0));
    let partner_destroyed = Arc::new(AtomicUsize::new(0));
    let attempt = attempts.clone();
    let destroyed = partner_destroyed.clone();

    let container = Container::builder()
        .component(
            ComponentRecord::of::<Flaky>("flaky")
                .deferred()
                .recipe(ConstructionRecipe::no_args(|| Flaky { partner: OnceCell::new() }))
                .field(FieldInjection::one("partner", |f: &Flaky, p: Arc<Partner>| {
                    let _ = f.partner.set(p);
                }))
                .on_init("warm-up", move |_: &Flaky| {
                    if attempt.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ContainerError::NotActive)
                    } else {
                        Ok(())
                    }
                }),
        )
        .component(
            ComponentRecord::of::<Partner>("partner")
                .deferred()
                .recipe(ConstructionRecipe::no_args(|| Partner { flaky: OnceCell::new() }))
                .field(FieldInjection::one("flaky", |p: &Partner, f: Arc<Flaky>| {
                    let _ = p.flaky.set(f);
                }))
                .on_destroy("release", move |_: &Partner| {
                    destroyed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
        )
        .build()
        .unwrap();
    container.refresh().unwrap();

    match container.get("flaky") {
        Err(ContainerError::HookFailed { component, .. }) => assert_eq!(component, "flaky"),
        other => panic!("Expected HookFailed, got: {:?}", other.is_ok()),
    }
    assert!(container.ready_components().is_empty());
    assert!(!container.is_early_pending("flaky"));
    assert_eq!(partner_destroyed.load(Ordering::SeqCst), 1);

    let flaky: Arc<Flaky> = container.resolve_named("flaky").unwrap();
    let partner: Arc<Partner> = container.resolve_named("partner").unwrap();
    assert!(Arc::ptr_eq(partner.flaky.get().unwrap(), &flaky));
    assert!(Arc::ptr_eq(flaky.partner.get().unwrap().flaky.get().unwrap(), &flaky));
    assert_eq!(container.ready_components(), vec!["partner", "flaky"]);
}
