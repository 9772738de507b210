// Copyright 2025 Cowboy AI, LLC.

//! Fixed Compose Sequence
//!
//! The concrete patient-management topology as an explicit ordered script of
//! builder calls plus an edge list. The order is the declaration order:
//! network domain, data stores, health probes, event cluster, compute
//! cluster, deployable units with their explicit dependencies, gateway.

use std::collections::HashMap;
use tracing::info;

use super::aggregate::{TopologyAggregate, TopologySnapshot};
use super::commands::*;
use super::value_objects::{NodeId, Result, TopologyId};

pub const NETWORK_DOMAIN_ID: &str = "PatientManagementNetwork";
pub const AUTH_DATA_STORE_ID: &str = "AuthDataStore";
pub const PATIENT_DATA_STORE_ID: &str = "PatientDataStore";
pub const AUTH_HEALTH_PROBE_ID: &str = "AuthHealthProbe";
pub const PATIENT_HEALTH_PROBE_ID: &str = "PatientHealthProbe";
pub const EVENT_CLUSTER_ID: &str = "EventCluster";
pub const COMPUTE_CLUSTER_ID: &str = "PatientManagementCluster";
pub const AUTH_SERVICE_ID: &str = "AuthService";
pub const BILLING_SERVICE_ID: &str = "BillingService";
pub const ANALYTICS_SERVICE_ID: &str = "AnalyticsService";
pub const PATIENT_SERVICE_ID: &str = "PatientService";
pub const API_GATEWAY_ID: &str = "ApiGateway";

/// Build, wire, and finalize the patient-management deployment topology
///
/// `jwt_secret` is the one caller-supplied credential, injected into the auth
/// service environment as a literal.
pub fn patient_management_topology(jwt_secret: &str) -> Result<TopologySnapshot> {
    let mut topology = TopologyAggregate::new(TopologyId::new());
    let identity = MessageIdentity::new_root();

    topology.handle_declare_network_domain(
        NetworkDomainSpec {
            id: NodeId::new(NETWORK_DOMAIN_ID)?,
            name: NETWORK_DOMAIN_ID.into(),
        },
        &identity,
    )?;

    let auth_db = topology.handle_declare_data_store(
        DataStoreSpec {
            id: NodeId::new(AUTH_DATA_STORE_ID)?,
            database_name: "auth-service-db".into(),
        },
        &identity,
    )?;

    let patient_db = topology.handle_declare_data_store(
        DataStoreSpec {
            id: NodeId::new(PATIENT_DATA_STORE_ID)?,
            database_name: "patient-service-db".into(),
        },
        &identity,
    )?;

    let auth_probe = topology.handle_declare_health_probe(
        HealthProbeSpec {
            id: NodeId::new(AUTH_HEALTH_PROBE_ID)?,
            data_store: auth_db.id.clone(),
        },
        &identity,
    )?;

    let patient_probe = topology.handle_declare_health_probe(
        HealthProbeSpec {
            id: NodeId::new(PATIENT_HEALTH_PROBE_ID)?,
            data_store: patient_db.id.clone(),
        },
        &identity,
    )?;

    let event_cluster = topology.handle_declare_event_cluster(
        EventClusterSpec {
            id: NodeId::new(EVENT_CLUSTER_ID)?,
            name: "kafka-cluster".into(),
        },
        &identity,
    )?;

    topology.handle_declare_compute_cluster(
        ComputeClusterSpec {
            id: NodeId::new(COMPUTE_CLUSTER_ID)?,
            namespace: "patient-management.local".into(),
        },
        &identity,
    )?;

    let auth_service = topology.handle_declare_deployable_unit(
        DeployableUnitSpec {
            id: NodeId::new(AUTH_SERVICE_ID)?,
            image: "auth-service".into(),
            ports: vec![4005],
            data_store: Some(auth_db.id.clone()),
            extra_env: Some(HashMap::from([(
                "JWT_SECRET".to_string(),
                jwt_secret.to_string(),
            )])),
        },
        &identity,
    )?;
    topology.handle_declare_dependency(auth_service.id.clone(), auth_probe.id.clone(), &identity)?;
    topology.handle_declare_dependency(auth_service.id.clone(), auth_db.id.clone(), &identity)?;

    let billing_service = topology.handle_declare_deployable_unit(
        DeployableUnitSpec {
            id: NodeId::new(BILLING_SERVICE_ID)?,
            image: "billing-service".into(),
            ports: vec![4001, 9001],
            data_store: None,
            extra_env: None,
        },
        &identity,
    )?;

    let analytics_service = topology.handle_declare_deployable_unit(
        DeployableUnitSpec {
            id: NodeId::new(ANALYTICS_SERVICE_ID)?,
            image: "analytics-service".into(),
            ports: vec![4002],
            data_store: None,
            extra_env: None,
        },
        &identity,
    )?;
    topology.handle_declare_dependency(
        analytics_service.id.clone(),
        event_cluster.id.clone(),
        &identity,
    )?;

    let patient_service = topology.handle_declare_deployable_unit(
        DeployableUnitSpec {
            id: NodeId::new(PATIENT_SERVICE_ID)?,
            image: "patient-service".into(),
            ports: vec![4000],
            data_store: Some(patient_db.id.clone()),
            extra_env: Some(HashMap::from([
                (
                    "BILLING_SERVICE_ADDRESS".to_string(),
                    "host.docker.internal".to_string(),
                ),
                ("BILLING_SERVICE_GRPC_PORT".to_string(), "9001".to_string()),
            ])),
        },
        &identity,
    )?;
    topology.handle_declare_dependency(patient_service.id.clone(), patient_db.id.clone(), &identity)?;
    topology.handle_declare_dependency(
        patient_service.id.clone(),
        patient_probe.id.clone(),
        &identity,
    )?;
    topology.handle_declare_dependency(
        patient_service.id.clone(),
        billing_service.id.clone(),
        &identity,
    )?;
    topology.handle_declare_dependency(
        patient_service.id.clone(),
        event_cluster.id.clone(),
        &identity,
    )?;

    topology.handle_declare_gateway_unit(
        GatewayUnitSpec {
            id: NodeId::new(API_GATEWAY_ID)?,
            image: "api-gateway".into(),
            target_unit: auth_service.id.clone(),
            ports: vec![4004],
            env: HashMap::from([
                ("SPRING_PROFILES_ACTIVE".to_string(), "prod".to_string()),
                (
                    "AUTH_SERVICE_URL".to_string(),
                    "http://host.docker.internal:4005".to_string(),
                ),
            ]),
        },
        &identity,
    )?;

    info!("Composed patient management topology");
    topology.finalize()
}
