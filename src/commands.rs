// Copyright 2025 Cowboy AI, LLC.

//! Deployment Domain Commands
//!
//! Commands represent the intent to declare part of the deployment topology.
//! They are validated before execution and result in events being emitted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::value_objects::NodeId;

// ============================================================================
// Message Identity (for Command/Event correlation)
// ============================================================================

/// Message identity for tracking command lineage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageIdentity {
    /// Unique command ID
    pub command_id: Uuid,
    /// Correlation ID - groups related commands/events
    pub correlation_id: Uuid,
    /// Causation ID - the event that caused this command (if any)
    pub causation_id: Option<Uuid>,
}

impl MessageIdentity {
    /// Create a new root message identity (no parent)
    pub fn new_root() -> Self {
        let id = Uuid::now_v7();
        Self {
            command_id: id,
            correlation_id: id,
            causation_id: None,
        }
    }

    /// Create a child message identity caused by an event
    pub fn caused_by(correlation_id: Uuid, causation_id: Uuid) -> Self {
        Self {
            command_id: Uuid::now_v7(),
            correlation_id,
            causation_id: Some(causation_id),
        }
    }
}

// ============================================================================
// Command Specifications
// ============================================================================

/// Specification for declaring the network domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDomainSpec {
    /// Unique identifier for the node
    pub id: NodeId,
    /// Network name, also used to derive subnet identifiers
    pub name: String,
}

/// Specification for declaring a data store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataStoreSpec {
    /// Unique identifier for the node
    pub id: NodeId,
    /// Logical database name created inside the instance
    pub database_name: String,
}

/// Specification for declaring a health probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthProbeSpec {
    /// Unique identifier for the node
    pub id: NodeId,
    /// Data store whose endpoint the probe checks
    pub data_store: NodeId,
}

/// Specification for declaring the message-broker cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventClusterSpec {
    /// Unique identifier for the node
    pub id: NodeId,
    /// Broker cluster name
    pub name: String,
}

/// Specification for declaring the compute scheduling domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeClusterSpec {
    /// Unique identifier for the node
    pub id: NodeId,
    /// Service-discovery namespace for units in the cluster
    pub namespace: String,
}

/// Specification for declaring a deployable unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployableUnitSpec {
    /// Unique identifier for the node
    pub id: NodeId,
    /// Container image reference; also the service name and log group suffix
    pub image: String,
    /// Requested ports; must be non-empty and free of duplicates
    pub ports: Vec<u16>,
    /// Data store to wire connection environment for, if any
    pub data_store: Option<NodeId>,
    /// Caller-supplied environment entries merged after the broker address
    pub extra_env: Option<HashMap<String, String>>,
}

/// Specification for declaring the load-balanced ingress unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayUnitSpec {
    /// Unique identifier for the node
    pub id: NodeId,
    /// Container image reference
    pub image: String,
    /// Unit this gateway fronts
    pub target_unit: NodeId,
    /// Requested ports; must be non-empty and free of duplicates
    pub ports: Vec<u16>,
    /// Caller-supplied environment entries
    pub env: HashMap<String, String>,
}

// ============================================================================
// Topology Commands
// ============================================================================

/// Domain commands for the topology aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TopologyCommand {
    /// Declare the network domain
    DeclareNetworkDomain {
        identity: MessageIdentity,
        spec: NetworkDomainSpec,
    },

    /// Declare a data store
    DeclareDataStore {
        identity: MessageIdentity,
        spec: DataStoreSpec,
    },

    /// Declare a health probe against a data store
    DeclareHealthProbe {
        identity: MessageIdentity,
        spec: HealthProbeSpec,
    },

    /// Declare the message-broker cluster
    DeclareEventCluster {
        identity: MessageIdentity,
        spec: EventClusterSpec,
    },

    /// Declare the compute scheduling domain
    DeclareComputeCluster {
        identity: MessageIdentity,
        spec: ComputeClusterSpec,
    },

    /// Declare a deployable unit
    DeclareDeployableUnit {
        identity: MessageIdentity,
        spec: DeployableUnitSpec,
    },

    /// Declare the load-balanced ingress unit
    DeclareGatewayUnit {
        identity: MessageIdentity,
        spec: GatewayUnitSpec,
    },

    /// Attach an explicit ordering edge between two declared nodes
    DeclareDependency {
        identity: MessageIdentity,
        dependent: NodeId,
        dependency: NodeId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_identity() {
        let identity = MessageIdentity::new_root();
        assert_eq!(identity.command_id, identity.correlation_id);
        assert!(identity.causation_id.is_none());
    }

    #[test]
    fn test_caused_by_identity() {
        let root = MessageIdentity::new_root();
        let event_id = Uuid::now_v7();
        let child = MessageIdentity::caused_by(root.correlation_id, event_id);

        assert_eq!(child.correlation_id, root.correlation_id);
        assert_eq!(child.causation_id, Some(event_id));
        assert_ne!(child.command_id, root.command_id);
    }
}
