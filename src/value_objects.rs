// Copyright 2025 Cowboy AI, LLC.

//! Deployment Domain Value Objects
//!
//! These are the building blocks of the Deployment domain model.
//! All value objects are immutable and validated on construction.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error types for the Deployment domain
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("Invalid node ID: {0}")]
    InvalidNodeId(String),

    #[error("Duplicate node ID: {0}")]
    DuplicateId(NodeId),

    #[error("Dependency cycle detected at node: {0}")]
    CycleDetected(NodeId),

    #[error("Dangling reference: {0}")]
    DanglingReference(String),

    #[error("Invalid port set: {0}")]
    InvalidPortSet(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for TopologyError {
    fn from(err: serde_json::Error) -> Self {
        TopologyError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TopologyError>;

// ============================================================================
// Identity Value Objects
// ============================================================================

/// Unique identifier for a topology aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopologyId(Uuid);

impl TopologyId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TopologyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TopologyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a node within a topology
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(TopologyError::InvalidNodeId(
                "Node ID cannot be empty".into(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

// ============================================================================
// Deferred Attribute References
// ============================================================================

/// Attribute of a node whose value is only known at provisioning time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeName {
    /// Endpoint host assigned by the provider
    Host,
    /// Endpoint port assigned by the provider
    Port,
    /// Generated credential stored in the provider's secret store
    PasswordSecret,
}

impl fmt::Display for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeName::Host => write!(f, "host"),
            AttributeName::Port => write!(f, "port"),
            AttributeName::PasswordSecret => write!(f, "passwordSecret"),
        }
    }
}

/// Reference to a value that the provisioning engine resolves after the
/// graph is finalized. Construction never produces or inspects the real value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeferredAttribute {
    /// Node the value belongs to
    pub node: NodeId,
    /// Which attribute of that node
    pub attribute: AttributeName,
}

impl DeferredAttribute {
    pub fn new(node: NodeId, attribute: AttributeName) -> Self {
        Self { node, attribute }
    }
}

impl fmt::Display for DeferredAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}.{}}}", self.node, self.attribute)
    }
}

// ============================================================================
// Environment Value Objects
// ============================================================================

/// A single environment variable value
///
/// `Interpolated` covers values like connection URLs where deferred
/// attributes are embedded inside a fixed pattern. Placeholders (`{}`) in the
/// template are filled positionally from `substitutions` by the provisioning
/// engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvValue {
    /// Plain literal string, known at build time
    Literal(String),
    /// Single deferred attribute reference
    Deferred(DeferredAttribute),
    /// Fixed template with embedded deferred references
    Interpolated {
        template: String,
        substitutions: Vec<DeferredAttribute>,
    },
}

impl EnvValue {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    pub fn deferred(node: NodeId, attribute: AttributeName) -> Self {
        Self::Deferred(DeferredAttribute::new(node, attribute))
    }

    pub fn interpolated(
        template: impl Into<String>,
        substitutions: Vec<DeferredAttribute>,
    ) -> Self {
        Self::Interpolated {
            template: template.into(),
            substitutions,
        }
    }

    /// Deferred references embedded in this value
    pub fn deferred_references(&self) -> Vec<&DeferredAttribute> {
        match self {
            EnvValue::Literal(_) => vec![],
            EnvValue::Deferred(attr) => vec![attr],
            EnvValue::Interpolated { substitutions, .. } => substitutions.iter().collect(),
        }
    }

    pub fn is_deferred(&self) -> bool {
        !matches!(self, EnvValue::Literal(_))
    }
}

/// Environment variable map for one deployable unit
///
/// Later inserts replace earlier ones for the same name, matching the
/// assembly order contract: broker bootstrap first, caller-supplied extras,
/// then datastore-derived entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentMap(BTreeMap<String, EnvValue>);

impl EnvironmentMap {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: EnvValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&EnvValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &EnvValue)> {
        self.0.iter()
    }

    /// All deferred references held by any value in the map
    pub fn deferred_references(&self) -> Vec<&DeferredAttribute> {
        self.0
            .values()
            .flat_map(|v| v.deferred_references())
            .collect()
    }
}

// ============================================================================
// Network Value Objects
// ============================================================================

/// Subnet placement tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubnetTier {
    Public,
    Private,
}

impl fmt::Display for SubnetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubnetTier::Public => write!(f, "public"),
            SubnetTier::Private => write!(f, "private"),
        }
    }
}

/// A subnet allocated inside a network domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub tier: SubnetTier,
    pub availability_zone: String,
}

// ============================================================================
// Service Value Objects
// ============================================================================

/// Transport protocol for port mappings and reachability probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportProtocol {
    Tcp,
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportProtocol::Tcp => write!(f, "tcp"),
        }
    }
}

/// Container port exposed on the same host port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
    pub protocol: TransportProtocol,
}

impl PortMapping {
    /// TCP mapping with container port equal to host port
    pub fn tcp(port: u16) -> Self {
        Self {
            container_port: port,
            host_port: port,
            protocol: TransportProtocol::Tcp,
        }
    }
}

/// CPU/memory envelope for one deployable unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu_units: u32,
    pub memory_mib: u32,
}

/// What happens to a provisioned resource on teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalPolicy {
    Destroy,
    Retain,
}

impl fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemovalPolicy::Destroy => write!(f, "destroy"),
            RemovalPolicy::Retain => write!(f, "retain"),
        }
    }
}

/// Software version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version(String);

impl Version {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
