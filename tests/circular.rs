use std::sync::Arc;
use std::thread;

use warden_di::{Container, DiError, ServiceDescriptor, ServiceId};

fn names(path: &[ServiceId]) -> Vec<String> {
    path.iter().map(|id| id.to_string()).collect()
}

fn node(container: &Container, id: &'static str, dependency: &'static str) {
    container.register(
        ServiceDescriptor::transient(id, move |ctx| {
            ctx.get::<()>(dependency)?;
            Ok(Arc::new(()))
        })
        .depends_on(dependency),
    );
}

#[test]
fn test_self_circular_dependency() {
    let container = Container::new();
    node(&container, "self", "self");

    match container.get::<()>("self") {
        Err(DiError::Circular(path)) => assert_eq!(names(&path), ["self", "self"]),
        other => panic!("expected Circular, got {other:?}"),
    }
}

#[test]
fn test_two_level_circular() {
    let container = Container::new();
    node(&container, "X", "Y");
    node(&container, "Y", "X");

    let err = container.get::<()>("X").unwrap_err();
    assert_eq!(names(err.cycle_path().unwrap()), ["X", "Y", "X"]);
    assert_eq!(err.to_string(), "Circular dependency: X -> Y -> X");
}

#[test]
fn test_cycle_path_starts_at_first_repeat() {
    let container = Container::new();
    node(&container, "entry", "A");
    node(&container, "A", "B");
    node(&container, "B", "C");
    node(&container, "C", "A");

    let err = container.get::<()>("entry").unwrap_err();
    assert_eq!(names(err.cycle_path().unwrap()), ["A", "B", "C", "A"]);
}

#[test]
fn test_cycles_through_singletons_do_not_poison_the_cache() {
    let container = Container::new();
    container.register(
        ServiceDescriptor::singleton("S", |ctx| {
            ctx.get::<()>("T")?;
            Ok(Arc::new(()))
        })
        .depends_on("T"),
    );
    node(&container, "T", "S");

    assert!(matches!(container.get::<()>("S"), Err(DiError::Circular(_))));
    assert_eq!(container.cached_singletons(), 0);

    // Break the cycle and the singleton builds normally.
    container.add_transient_factory("T", |_| Ok(()));
    assert!(container.get::<()>("S").is_ok());
}

#[test]
fn test_diamond_is_not_a_cycle() {
    let container = Container::new();
    container.add_singleton("base", ());
    node(&container, "left", "base");
    node(&container, "right", "base");
    container.register(ServiceDescriptor::transient("top", |ctx| {
        ctx.get::<()>("left")?;
        ctx.get::<()>("right")?;
        Ok(Arc::new(()))
    }));

    assert!(container.get::<()>("top").is_ok());
}

#[test]
fn test_concurrent_resolutions_do_not_share_paths() {
    let container = Container::new();
    container.add_singleton("leaf", ());
    node(&container, "branch", "leaf");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let container = container.clone();
            thread::spawn(move || container.get::<()>("branch").is_ok())
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }
}

#[test]
fn test_declared_cycles_found_by_validation() {
    let container = Container::new();
    node(&container, "X", "Y");
    node(&container, "Y", "X");

    let report = container.validate();
    assert!(!report.is_valid());
    assert!(report.errors[0].to_string().contains("X -> Y -> X"));
}

fn chain(container: &Container, length: usize) {
    for i in 0..length {
        let next = format!("svc-{}", i + 1);
        container.register(
            ServiceDescriptor::transient(format!("svc-{i}"), move |ctx| {
                if let Some(inner) = ctx.try_get::<usize>(next.clone())? {
                    return Ok(Arc::new(*inner + 1));
                }
                Ok(Arc::new(0))
            })
            .depends_on(format!("svc-{}", i + 1)),
        );
    }
}

#[test]
fn test_long_acyclic_chain_resolves_below_the_limit() {
    let container = Container::new();
    chain(&container, 200);

    assert_eq!(*container.get::<usize>("svc-0").unwrap(), 199);
}

#[test]
fn test_chain_past_the_limit_fails_with_depth_exceeded() {
    let container = Container::new();
    chain(&container, 300);

    match container.get::<usize>("svc-0") {
        Err(DiError::DepthExceeded(depth)) => assert_eq!(depth, 256),
        other => panic!("expected DepthExceeded, got {other:?}"),
    }
}
