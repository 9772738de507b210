// Copyright 2025 Cowboy AI, LLC.

//! Deployment Domain Events
//!
//! All construction steps of the topology graph are represented as immutable
//! events. Events follow event sourcing principles with correlation and
//! causation tracking; the aggregate state is a fold over the event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::nodes::{DependencyEdge, Node};

/// Domain events for the topology aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TopologyEvent {
    /// A node was declared in the topology graph
    NodeDeclared {
        event_id: Uuid,
        correlation_id: Uuid,
        causation_id: Option<Uuid>,
        timestamp: DateTime<Utc>,
        node: Node,
    },

    /// An ordering edge was declared between two nodes
    DependencyDeclared {
        event_id: Uuid,
        correlation_id: Uuid,
        causation_id: Option<Uuid>,
        timestamp: DateTime<Utc>,
        edge: DependencyEdge,
    },
}

impl TopologyEvent {
    /// Get the event ID
    pub fn event_id(&self) -> Uuid {
        match self {
            TopologyEvent::NodeDeclared { event_id, .. } => *event_id,
            TopologyEvent::DependencyDeclared { event_id, .. } => *event_id,
        }
    }

    /// Get the correlation ID
    pub fn correlation_id(&self) -> Uuid {
        match self {
            TopologyEvent::NodeDeclared { correlation_id, .. } => *correlation_id,
            TopologyEvent::DependencyDeclared { correlation_id, .. } => *correlation_id,
        }
    }

    /// Get the causation ID (if any)
    pub fn causation_id(&self) -> Option<Uuid> {
        match self {
            TopologyEvent::NodeDeclared { causation_id, .. } => *causation_id,
            TopologyEvent::DependencyDeclared { causation_id, .. } => *causation_id,
        }
    }

    /// Get the timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TopologyEvent::NodeDeclared { timestamp, .. } => *timestamp,
            TopologyEvent::DependencyDeclared { timestamp, .. } => *timestamp,
        }
    }

    /// Get event type as string
    pub fn event_type(&self) -> &'static str {
        match self {
            TopologyEvent::NodeDeclared { .. } => "NodeDeclared",
            TopologyEvent::DependencyDeclared { .. } => "DependencyDeclared",
        }
    }
}

// ============================================================================
// Event Constructors
// ============================================================================

impl TopologyEvent {
    /// Create a NodeDeclared event
    pub fn node_declared(correlation_id: Uuid, causation_id: Option<Uuid>, node: Node) -> Self {
        Self::NodeDeclared {
            event_id: Uuid::now_v7(),
            correlation_id,
            causation_id,
            timestamp: Utc::now(),
            node,
        }
    }

    /// Create a DependencyDeclared event
    pub fn dependency_declared(
        correlation_id: Uuid,
        causation_id: Option<Uuid>,
        edge: DependencyEdge,
    ) -> Self {
        Self::DependencyDeclared {
            event_id: Uuid::now_v7(),
            correlation_id,
            causation_id,
            timestamp: Utc::now(),
            edge,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::ComputeCluster;
    use crate::value_objects::NodeId;

    fn cluster_node() -> Node {
        Node::ComputeCluster(ComputeCluster {
            id: NodeId::new("PatientManagementCluster").unwrap(),
            network: NodeId::new("PatientManagementNetwork").unwrap(),
            namespace: "patient-management.local".into(),
        })
    }

    #[test]
    fn test_event_creation() {
        let correlation_id = Uuid::now_v7();
        let event = TopologyEvent::node_declared(correlation_id, None, cluster_node());

        assert_eq!(event.correlation_id(), correlation_id);
        assert!(event.causation_id().is_none());
        assert_eq!(event.event_type(), "NodeDeclared");

        if let TopologyEvent::NodeDeclared { node, .. } = event {
            assert_eq!(node.id().as_str(), "PatientManagementCluster");
        } else {
            panic!("Wrong event type");
        }
    }

    #[test]
    fn test_event_id_is_v7() {
        let event = TopologyEvent::node_declared(Uuid::now_v7(), None, cluster_node());
        assert_eq!(event.event_id().get_version_num(), 7);
    }

    #[test]
    fn test_causation_chain() {
        let correlation_id = Uuid::now_v7();
        let event1 = TopologyEvent::node_declared(correlation_id, None, cluster_node());

        let edge = DependencyEdge::new(
            NodeId::new("AuthService").unwrap(),
            NodeId::new("AuthDataStore").unwrap(),
        );
        let event2 =
            TopologyEvent::dependency_declared(correlation_id, Some(event1.event_id()), edge);

        assert_eq!(event2.causation_id(), Some(event1.event_id()));
        assert_eq!(event2.correlation_id(), correlation_id);
    }

    #[test]
    fn test_serialization() {
        let event = TopologyEvent::dependency_declared(
            Uuid::now_v7(),
            None,
            DependencyEdge::new(
                NodeId::new("PatientService").unwrap(),
                NodeId::new("BillingService").unwrap(),
            ),
        );

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: TopologyEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(event.event_id(), deserialized.event_id());
        assert_eq!(event, deserialized);
    }
}
