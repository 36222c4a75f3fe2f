//! Property-based tests for lifetime semantics and plugin ordering
//!
//! These check behavior that must hold for any registration shape, not
//! just the hand-picked cases in the other suites.
mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{journal, RecordingPlugin};
use proptest::prelude::*;
use warden_di::{Container, Lifetime, PluginManager, ServiceDescriptor};

proptest! {
    #[test]
    fn singleton_resolution_consistency(value in "\\PC{0,50}", lookups in 1usize..16) {
        let container = Container::new();
        container.add_singleton("value", value.clone());

        let first = container.get::<String>("value").unwrap();
        for _ in 0..lookups {
            let again = container.get::<String>("value").unwrap();
            prop_assert!(Arc::ptr_eq(&first, &again));
        }
        prop_assert_eq!(first.as_str(), value.as_str());
    }
}

proptest! {
    #[test]
    fn transients_are_always_fresh(lookups in 1usize..32) {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = builds.clone();
        let container = Container::new();
        container.add_transient_factory("fresh", move |_| {
            Ok(counter.fetch_add(1, Ordering::SeqCst))
        });

        let resolved: Vec<_> = (0..lookups)
            .map(|_| container.get::<usize>("fresh").unwrap())
            .collect();
        let distinct: HashSet<_> = resolved.iter().map(|v| **v).collect();

        prop_assert_eq!(builds.load(Ordering::SeqCst), lookups);
        prop_assert_eq!(distinct.len(), lookups);
    }
}

proptest! {
    #[test]
    fn scoped_instances_are_per_scope(scopes in 1usize..8, lookups in 1usize..8) {
        let container = Container::new();
        container.add_scoped_factory("unit", |_| Ok(()));

        let mut seen = Vec::new();
        for _ in 0..scopes {
            let scope = container.create_scope();
            let first = scope.get::<()>("unit").unwrap();
            for _ in 1..lookups {
                prop_assert!(Arc::ptr_eq(&first, &scope.get::<()>("unit").unwrap()));
            }
            prop_assert!(seen.iter().all(|other| !Arc::ptr_eq(other, &first)));
            seen.push(first);
        }
    }
}

proptest! {
    #[test]
    fn validation_reports_each_missing_dependency(
        registered in proptest::collection::vec(any::<bool>(), 1..10)
    ) {
        let container = Container::new();
        let mut dependencies = Vec::new();
        for (i, present) in registered.iter().enumerate() {
            let name = format!("dep-{i}");
            if *present {
                container.register(ServiceDescriptor::new(
                    name.clone(),
                    Lifetime::Singleton,
                    |_| Ok(Arc::new(())),
                ));
            }
            dependencies.push(name);
        }
        container.register(
            ServiceDescriptor::new("root", Lifetime::Transient, |_| Ok(Arc::new(())))
                .with_dependencies(dependencies),
        );

        let errors = container.validate_dependencies("root");
        let missing = registered.iter().filter(|present| !**present).count();
        prop_assert_eq!(errors.len(), missing);
    }
}

fn dag_and_order() -> impl Strategy<Value = (Vec<Vec<usize>>, Vec<usize>)> {
    (1usize..8).prop_flat_map(|n| {
        let masks = proptest::collection::vec(proptest::collection::vec(any::<bool>(), n), n);
        let order = Just((0..n).collect::<Vec<_>>()).prop_shuffle();
        (masks, order).prop_map(|(masks, order)| {
            let deps: Vec<Vec<usize>> = masks
                .iter()
                .enumerate()
                .map(|(i, mask)| (0..i).filter(|j| mask[*j]).collect())
                .collect();
            (deps, order)
        })
    })
}

proptest! {
    #[test]
    fn batch_attach_orders_dependencies_first((deps, order) in dag_and_order()) {
        let log = journal();
        let manager = PluginManager::new();
        let plugins = order.iter().map(|&i| {
            deps[i]
                .iter()
                .fold(RecordingPlugin::new(&format!("p{i}"), &log), |plugin, j| {
                    plugin.depends_on(&format!("p{j}"))
                })
                .shared()
        });

        let report = manager.attach_all(plugins);
        prop_assert!(report.is_ok());

        let attached = manager.initialization_order();
        prop_assert_eq!(attached.len(), deps.len());
        let position = |name: &str| attached.iter().position(|n| n == name);
        for (i, plugin_deps) in deps.iter().enumerate() {
            for j in plugin_deps {
                let dep_name = format!("p{j}");
                let plugin_name = format!("p{i}");
                prop_assert!(position(&dep_name) < position(&plugin_name));
            }
        }
    }
}
