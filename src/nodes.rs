// Copyright 2025 Cowboy AI, LLC.

//! Deployment Topology Nodes
//!
//! Domain entities for every kind of node the topology graph can hold.
//! Nodes are created once by the aggregate's command handlers and are
//! immutable thereafter; attributes that only exist after provisioning are
//! carried as [`DeferredAttribute`] references, never as values.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::value_objects::*;

// ============================================================================
// Network Domain
// ============================================================================

/// Isolated virtual network spanning multiple availability zones
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDomain {
    pub id: NodeId,
    pub name: String,
    pub max_availability_zones: u8,
    pub subnets: Vec<Subnet>,
}

impl NetworkDomain {
    pub fn private_subnet_ids(&self) -> Vec<String> {
        self.subnets
            .iter()
            .filter(|s| s.tier == SubnetTier::Private)
            .map(|s| s.id.clone())
            .collect()
    }

    pub fn public_subnet_ids(&self) -> Vec<String> {
        self.subnets
            .iter()
            .filter(|s| s.tier == SubnetTier::Public)
            .map(|s| s.id.clone())
            .collect()
    }
}

// ============================================================================
// Data Store
// ============================================================================

/// Managed relational database instance
///
/// The endpoint host/port and the generated master credential do not exist
/// until the provisioning engine creates the instance; the handle exposes
/// them as deferred references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataStore {
    pub id: NodeId,
    pub database_name: String,
    pub engine: String,
    pub engine_version: Version,
    pub instance_class: String,
    pub allocated_storage: u32,
    pub master_username: String,
    pub removal_policy: RemovalPolicy,
    /// Network domain this instance is placed in
    pub network: NodeId,
}

impl DataStore {
    /// Endpoint host, assigned at provisioning time
    pub fn host(&self) -> DeferredAttribute {
        DeferredAttribute::new(self.id.clone(), AttributeName::Host)
    }

    /// Endpoint port, assigned at provisioning time
    pub fn port(&self) -> DeferredAttribute {
        DeferredAttribute::new(self.id.clone(), AttributeName::Port)
    }

    /// Generated master password, stored in the engine's secret store
    pub fn password_secret(&self) -> DeferredAttribute {
        DeferredAttribute::new(self.id.clone(), AttributeName::PasswordSecret)
    }
}

// ============================================================================
// Health Probe
// ============================================================================

/// Periodic reachability check against a data store endpoint
///
/// `ip_address` and `port` are forwarded from the data store unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthProbe {
    pub id: NodeId,
    pub data_store: NodeId,
    pub protocol: TransportProtocol,
    pub ip_address: DeferredAttribute,
    pub port: DeferredAttribute,
    pub request_interval_secs: u32,
    pub failure_threshold: u32,
}

// ============================================================================
// Event Cluster
// ============================================================================

/// Broker placement policy across availability zones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AzDistribution {
    Default,
}

impl fmt::Display for AzDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AzDistribution::Default => write!(f, "default"),
        }
    }
}

/// Message-broker cluster declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCluster {
    pub id: NodeId,
    pub name: String,
    pub version: Version,
    pub broker_count: u32,
    pub broker_instance_class: String,
    /// Private subnets of the network domain the brokers attach to
    pub client_subnets: Vec<String>,
    pub az_distribution: AzDistribution,
    pub network: NodeId,
}

// ============================================================================
// Compute Cluster
// ============================================================================

/// Scheduling domain that hosts all deployable units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeCluster {
    pub id: NodeId,
    pub network: NodeId,
    /// Service-discovery namespace for inter-unit DNS resolution
    pub namespace: String,
}

// ============================================================================
// Deployable Units
// ============================================================================

/// Log destination for one unit's container output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSink {
    pub group: String,
    pub retention_days: u32,
    pub removal_policy: RemovalPolicy,
    pub stream_prefix: String,
}

/// One named service: image, fixed resource envelope, ports, log sink,
/// environment map, and its place in the compute cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployableUnit {
    pub id: NodeId,
    pub image: String,
    pub service_name: String,
    pub limits: ResourceLimits,
    pub port_mappings: Vec<PortMapping>,
    pub log_sink: LogSink,
    pub environment: EnvironmentMap,
    /// Data store this unit's environment is wired to, if any
    pub data_store: Option<NodeId>,
    pub cluster: NodeId,
    pub assign_public_ip: bool,
}

/// Ingress unit fronted by a load balancer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayUnit {
    pub id: NodeId,
    pub image: String,
    pub service_name: String,
    pub cluster: NodeId,
    /// Unit this gateway fronts
    pub target_unit: NodeId,
    pub desired_count: u32,
    pub health_check_grace_secs: u64,
    pub port_mappings: Vec<PortMapping>,
    pub log_sink: LogSink,
    pub environment: EnvironmentMap,
}

// ============================================================================
// Node Sum Type
// ============================================================================

/// Kind discriminator for topology nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    NetworkDomain,
    DataStore,
    HealthProbe,
    EventCluster,
    ComputeCluster,
    DeployableUnit,
    GatewayUnit,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::NetworkDomain => write!(f, "network-domain"),
            NodeKind::DataStore => write!(f, "data-store"),
            NodeKind::HealthProbe => write!(f, "health-probe"),
            NodeKind::EventCluster => write!(f, "event-cluster"),
            NodeKind::ComputeCluster => write!(f, "compute-cluster"),
            NodeKind::DeployableUnit => write!(f, "deployable-unit"),
            NodeKind::GatewayUnit => write!(f, "gateway-unit"),
        }
    }
}

/// A topology graph node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    NetworkDomain(NetworkDomain),
    DataStore(DataStore),
    HealthProbe(HealthProbe),
    EventCluster(EventCluster),
    ComputeCluster(ComputeCluster),
    DeployableUnit(DeployableUnit),
    GatewayUnit(GatewayUnit),
}

impl Node {
    pub fn id(&self) -> &NodeId {
        match self {
            Node::NetworkDomain(n) => &n.id,
            Node::DataStore(n) => &n.id,
            Node::HealthProbe(n) => &n.id,
            Node::EventCluster(n) => &n.id,
            Node::ComputeCluster(n) => &n.id,
            Node::DeployableUnit(n) => &n.id,
            Node::GatewayUnit(n) => &n.id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::NetworkDomain(_) => NodeKind::NetworkDomain,
            Node::DataStore(_) => NodeKind::DataStore,
            Node::HealthProbe(_) => NodeKind::HealthProbe,
            Node::EventCluster(_) => NodeKind::EventCluster,
            Node::ComputeCluster(_) => NodeKind::ComputeCluster,
            Node::DeployableUnit(_) => NodeKind::DeployableUnit,
            Node::GatewayUnit(_) => NodeKind::GatewayUnit,
        }
    }

    /// Whether this node exposes `attribute` for deferred resolution
    pub fn exposes(&self, attribute: AttributeName) -> bool {
        match self {
            Node::DataStore(_) => matches!(
                attribute,
                AttributeName::Host | AttributeName::Port | AttributeName::PasswordSecret
            ),
            _ => false,
        }
    }

    /// Deferred references this node holds toward other nodes
    pub fn deferred_references(&self) -> Vec<&DeferredAttribute> {
        match self {
            Node::HealthProbe(probe) => vec![&probe.ip_address, &probe.port],
            Node::DeployableUnit(unit) => unit.environment.deferred_references(),
            Node::GatewayUnit(gateway) => gateway.environment.deferred_references(),
            _ => vec![],
        }
    }
}

/// Ordering edge: `dependent` must be provisioned after `dependency`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub dependent: NodeId,
    pub dependency: NodeId,
}

impl DependencyEdge {
    pub fn new(dependent: NodeId, dependency: NodeId) -> Self {
        Self {
            dependent,
            dependency,
        }
    }
}

impl fmt::Display for DependencyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.dependent, self.dependency)
    }
}
