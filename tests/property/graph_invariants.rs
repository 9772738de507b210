// Copyright 2025 Cowboy AI, LLC.
//! Property-Based Tests for Graph Invariants
//!
//! These tests verify the builder contracts for all valid (and invalid)
//! inputs: port-set validation, the unconditional broker entry, the
//! datastore-derived environment keys, compose acyclicity, and event-log
//! reconstruction.

use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

use pm_domain_deployment::compose::patient_management_topology;
use pm_domain_deployment::*;

// ============================================================================
// Fixtures
// ============================================================================

fn node_id(id: &str) -> NodeId {
    NodeId::new(id).unwrap()
}

/// Aggregate with network domain, data store, and compute cluster declared
fn seeded_aggregate() -> (TopologyAggregate, MessageIdentity) {
    let mut aggregate = TopologyAggregate::new(TopologyId::new());
    let identity = MessageIdentity::new_root();

    aggregate
        .handle_declare_network_domain(
            NetworkDomainSpec {
                id: node_id("Network"),
                name: "Network".into(),
            },
            &identity,
        )
        .unwrap();
    aggregate
        .handle_declare_data_store(
            DataStoreSpec {
                id: node_id("Store"),
                database_name: "store-db".into(),
            },
            &identity,
        )
        .unwrap();
    aggregate
        .handle_declare_compute_cluster(
            ComputeClusterSpec {
                id: node_id("Cluster"),
                namespace: "test.local".into(),
            },
            &identity,
        )
        .unwrap();

    (aggregate, identity)
}

// ============================================================================
// Property Test Strategies
// ============================================================================

/// Port lists small enough to hit both the empty and the duplicate case
fn port_list() -> impl Strategy<Value = Vec<u16>> {
    prop::collection::vec(1u16..10, 0..6)
}

/// Caller-supplied environment entries; the prefix keeps them disjoint from
/// the fixed contract keys
fn extra_env() -> impl Strategy<Value = HashMap<String, String>> {
    prop::collection::hash_map("EXTRA_[A-Z]{1,8}", "[a-z0-9]{0,12}", 0..5)
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// Property: a unit is declared iff the port set is non-empty and free of
    /// duplicates; the mappings then mirror the request exactly.
    #[test]
    fn prop_port_set_validation(ports in port_list()) {
        let (mut aggregate, identity) = seeded_aggregate();

        let distinct: HashSet<u16> = ports.iter().copied().collect();
        let valid = !ports.is_empty() && distinct.len() == ports.len();

        let result = aggregate.handle_declare_deployable_unit(
            DeployableUnitSpec {
                id: node_id("Unit"),
                image: "unit".into(),
                ports: ports.clone(),
                data_store: None,
                extra_env: None,
            },
            &identity,
        );

        match result {
            Ok(unit) => {
                prop_assert!(valid);
                prop_assert_eq!(unit.port_mappings.len(), ports.len());
                for mapping in &unit.port_mappings {
                    prop_assert_eq!(mapping.container_port, mapping.host_port);
                    prop_assert_eq!(mapping.protocol, TransportProtocol::Tcp);
                }
            }
            Err(TopologyError::InvalidPortSet(_)) => prop_assert!(!valid),
            Err(other) => prop_assert!(false, "unexpected error: {}", other),
        }
    }

    /// Property: the broker entry is present for any extras, and the
    /// datastore-derived keys appear exactly when a data store is wired.
    #[test]
    fn prop_environment_assembly(extra in extra_env(), with_store in any::<bool>()) {
        let (mut aggregate, identity) = seeded_aggregate();

        let unit = aggregate
            .handle_declare_deployable_unit(
                DeployableUnitSpec {
                    id: node_id("Unit"),
                    image: "unit".into(),
                    ports: vec![8080],
                    data_store: with_store.then(|| node_id("Store")),
                    extra_env: Some(extra.clone()),
                },
                &identity,
            )
            .unwrap();

        let env = &unit.environment;
        prop_assert!(env.contains(BROKER_BOOTSTRAP_KEY));

        let datastore_keys = 6;
        let expected = 1 + extra.len() + if with_store { datastore_keys } else { 0 };
        prop_assert_eq!(env.len(), expected);

        if !with_store {
            prop_assert!(!env.contains(DATASOURCE_URL_KEY));
            prop_assert!(!env.contains(DATASOURCE_USERNAME_KEY));
            prop_assert!(!env.contains(DATASOURCE_PASSWORD_KEY));
        }

        for name in extra.keys() {
            prop_assert!(env.contains(name));
        }
    }

    /// Property: the fixed compose sequence yields a complete, acyclic graph
    /// for any caller-supplied secret.
    #[test]
    fn prop_compose_is_ordered_and_acyclic(secret in "[A-Za-z0-9]{1,64}") {
        let snapshot = patient_management_topology(&secret).unwrap();

        let order = snapshot.provisioning_order();
        prop_assert_eq!(order.len(), snapshot.nodes().len());

        let position = |id: &NodeId| order.iter().position(|n| n == id);
        for edge in snapshot.effective_edges() {
            let dependency = position(&edge.dependency);
            let dependent = position(&edge.dependent);
            prop_assert!(dependency.is_some() && dependent.is_some());
            prop_assert!(dependency < dependent, "edge {} violated", edge);
        }
    }

    /// Property: replaying the event log reproduces the aggregate exactly.
    #[test]
    fn prop_event_log_reconstruction(extra in extra_env()) {
        let (mut aggregate, identity) = seeded_aggregate();
        aggregate
            .handle_declare_deployable_unit(
                DeployableUnitSpec {
                    id: node_id("Unit"),
                    image: "unit".into(),
                    ports: vec![8080],
                    data_store: Some(node_id("Store")),
                    extra_env: Some(extra),
                },
                &identity,
            )
            .unwrap();

        let events = aggregate.take_uncommitted_events();
        let rebuilt = TopologyAggregate::from_events(aggregate.id, events);

        prop_assert_eq!(rebuilt.version, aggregate.version);
        prop_assert_eq!(rebuilt.node_count(), aggregate.node_count());
        prop_assert_eq!(rebuilt.explicit_edges(), aggregate.explicit_edges());
        prop_assert_eq!(rebuilt.implied_edges(), aggregate.implied_edges());
    }
}
