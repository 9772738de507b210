// Copyright 2025 Cowboy AI, LLC.

//! Deployment Domain Module
//!
//! This module implements the Deployment domain for the Patient Management
//! platform using Domain-Driven Design and Event Sourcing principles. The
//! domain models the deployment topology: network domain, data stores,
//! health probes, the message-broker cluster, the compute scheduling domain,
//! deployable units, and the load-balanced gateway.
//!
//! ## Architecture
//!
//! The domain follows these principles:
//!
//! 1. **Event Sourcing**: Every construction step is an immutable event
//! 2. **Aggregate Root**: `TopologyAggregate` maintains graph consistency
//! 3. **Value Objects**: Immutable, validated data types
//! 4. **Deferred Attributes**: Provisioning-time values are referenced, never
//!    resolved, during graph construction
//! 5. **Two-Phase Wiring**: Nodes are declared first, explicit ordering edges
//!    are attached afterwards
//!
//! ## Key Concepts
//!
//! - **Nodes**: Network domain, data stores, probes, clusters, units, gateway
//! - **Edges**: Ordering constraints, explicit or implied by deferred
//!   attribute references; the combined set must stay acyclic
//! - **Snapshot**: The finalized, immutable graph handed to the external
//!   provisioning engine
//!
//! ## Usage
//!
//! ```rust
//! use pm_domain_deployment::*;
//!
//! // Create aggregate
//! let mut topology = TopologyAggregate::new(TopologyId::new());
//! let identity = MessageIdentity::new_root();
//!
//! // Declare the network domain
//! let spec = NetworkDomainSpec {
//!     id: NodeId::new("PatientManagementNetwork").unwrap(),
//!     name: "PatientManagementNetwork".into(),
//! };
//! topology.handle_declare_network_domain(spec, &identity).unwrap();
//!
//! // Get events
//! let events = topology.take_uncommitted_events();
//! assert!(!events.is_empty());
//! ```

pub mod aggregate;
pub mod commands;
pub mod compose;
pub mod events;
pub mod nodes;
pub mod value_objects;

// Re-export commonly used types
pub use aggregate::{
    TopologyAggregate, TopologySnapshot, BROKER_BOOTSTRAP_KEY, BROKER_BOOTSTRAP_SERVERS,
    DATASOURCE_PASSWORD_KEY, DATASOURCE_URL_KEY, DATASOURCE_USERNAME_KEY, DDL_AUTO_KEY,
    POOL_INIT_TIMEOUT_KEY, SQL_INIT_MODE_KEY,
};
pub use commands::{
    ComputeClusterSpec, DataStoreSpec, DeployableUnitSpec, EventClusterSpec, GatewayUnitSpec,
    HealthProbeSpec, MessageIdentity, NetworkDomainSpec, TopologyCommand,
};
pub use compose::patient_management_topology;
pub use events::TopologyEvent;
pub use nodes::{
    AzDistribution, ComputeCluster, DataStore, DependencyEdge, DeployableUnit, EventCluster,
    GatewayUnit, HealthProbe, LogSink, NetworkDomain, Node, NodeKind,
};
pub use value_objects::{
    AttributeName, DeferredAttribute, EnvValue, EnvironmentMap, NodeId, PortMapping,
    RemovalPolicy, ResourceLimits, Result, Subnet, SubnetTier, TopologyError, TopologyId,
    TransportProtocol, Version,
};
