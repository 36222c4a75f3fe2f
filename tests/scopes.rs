use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use warden_di::{Container, DiError, ServiceDescriptor};

struct RequestContext {
    scope_id: Option<u64>,
}

fn container_with_request_context() -> Container {
    let container = Container::new();
    container.add_scoped_factory("request", |ctx| {
        Ok(RequestContext { scope_id: ctx.scope().map(|s| s.id()) })
    });
    container
}

#[test]
fn same_scope_shares_instance() {
    let container = container_with_request_context();
    let scope = container.create_scope();

    let a = scope.get::<RequestContext>("request").unwrap();
    let b = scope.get::<RequestContext>("request").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.scope_id, Some(scope.id()));
}

#[test]
fn different_scopes_get_different_instances() {
    let container = container_with_request_context();
    let first = container.create_scope();
    let second = container.create_scope();

    let a = first.get::<RequestContext>("request").unwrap();
    let b = second.get::<RequestContext>("request").unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_ne!(first.id(), second.id());
}

#[test]
fn scoped_without_scope_behaves_as_transient() {
    let container = container_with_request_context();
    let a = container.get::<RequestContext>("request").unwrap();
    let b = container.get::<RequestContext>("request").unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(a.scope_id, None);
}

#[test]
fn singletons_are_shared_across_scopes() {
    let container = Container::new();
    container.add_singleton("config", String::from("shared"));

    let a = container.create_scope().get::<String>("config").unwrap();
    let b = container.create_scope().get::<String>("config").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn singleton_factories_never_see_a_scope() {
    let container = Container::new();
    container.add_singleton_factory("probe", |ctx| Ok(ctx.scope().is_some()));

    let scope = container.create_scope();
    assert!(!*scope.get::<bool>("probe").unwrap());
}

#[test]
fn transients_inside_a_scope_share_scoped_dependencies() {
    struct Handler {
        request: Arc<RequestContext>,
    }

    let container = container_with_request_context();
    container.register(
        ServiceDescriptor::transient("handler", |ctx| {
            Ok(Arc::new(Handler { request: ctx.get("request")? }))
        })
        .depends_on("request"),
    );

    let scope = container.create_scope();
    let h1 = scope.get::<Handler>("handler").unwrap();
    let h2 = scope.get::<Handler>("handler").unwrap();
    assert!(!Arc::ptr_eq(&h1, &h2));
    assert!(Arc::ptr_eq(&h1.request, &h2.request));
}

#[test]
fn disposed_scope_refuses_resolution() {
    let container = container_with_request_context();
    let scope = container.create_scope();
    scope.get::<RequestContext>("request").unwrap();
    assert_eq!(scope.len(), 1);

    assert_eq!(scope.dispose(), 1);
    assert!(scope.is_disposed());
    assert!(scope.is_empty());
    match scope.get::<RequestContext>("request") {
        Err(DiError::ScopeDisposed(id)) => assert_eq!(id, scope.id()),
        _ => panic!("expected ScopeDisposed"),
    }
}

#[test]
fn scoped_factory_runs_once_per_scope() {
    let builds = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    let counter = builds.clone();
    container.add_scoped_factory("unit_of_work", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    for _ in 0..3 {
        let scope = container.create_scope();
        scope.get::<()>("unit_of_work").unwrap();
        scope.get::<()>("unit_of_work").unwrap();
    }
    assert_eq!(builds.load(Ordering::SeqCst), 3);
}
