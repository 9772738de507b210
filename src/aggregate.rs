// Copyright 2025 Cowboy AI, LLC.

//! Topology Aggregate
//!
//! The topology aggregate is the root entity that maintains consistency for
//! the deployment graph: nodes, ordering edges, and the environment maps that
//! reference deferred attributes. It handles commands and emits events
//! following event sourcing principles. `finalize` validates the whole graph
//! and produces the immutable snapshot handed to the provisioning engine.

use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info};

use serde::{Deserialize, Serialize};

use super::commands::*;
use super::events::*;
use super::nodes::*;
use super::value_objects::*;

// ============================================================================
// Fixed Provisioning Constants
// ============================================================================

pub const BROKER_BOOTSTRAP_KEY: &str = "SPRING_KAFKA_BOOTSTRAP_SERVERS";
pub const BROKER_BOOTSTRAP_SERVERS: &str =
    "localhost.localstack.cloud:4510, localhost.localstack.cloud:4511, localhost.localstack.cloud:4512";

pub const DATASOURCE_URL_KEY: &str = "SPRING_DATASOURCE_URL";
pub const DATASOURCE_USERNAME_KEY: &str = "SPRING_DATASOURCE_USERNAME";
pub const DATASOURCE_PASSWORD_KEY: &str = "SPRING_DATASOURCE_PASSWORD";
pub const DDL_AUTO_KEY: &str = "SPRING_JPA_HIBERNATE_DDL_AUTO";
pub const SQL_INIT_MODE_KEY: &str = "SPRING_SQL_INIT_MODE";
pub const POOL_INIT_TIMEOUT_KEY: &str = "SPRING_DATASOURCE_HIKARI_INITIALIZATION_FAIL_TIMEOUT";

pub const DATA_STORE_ENGINE: &str = "postgres";
pub const DATA_STORE_ENGINE_VERSION: &str = "17.2";
pub const DATA_STORE_INSTANCE_CLASS: &str = "db.t2.micro";
pub const DATA_STORE_ALLOCATED_STORAGE: u32 = 20;
pub const DATA_STORE_MASTER_USERNAME: &str = "admin_user";

pub const PROBE_REQUEST_INTERVAL_SECS: u32 = 30;
pub const PROBE_FAILURE_THRESHOLD: u32 = 3;

pub const BROKER_VERSION: &str = "2.8.0";
pub const BROKER_COUNT: u32 = 1;
pub const BROKER_INSTANCE_CLASS: &str = "kafka.m5.xlarge";

pub const NETWORK_MAX_AVAILABILITY_ZONES: u8 = 2;

pub const UNIT_CPU_UNITS: u32 = 256;
pub const UNIT_MEMORY_MIB: u32 = 512;
pub const LOG_GROUP_PREFIX: &str = "/ecs/";
pub const LOG_RETENTION_DAYS: u32 = 1;

pub const GATEWAY_DESIRED_COUNT: u32 = 1;
pub const GATEWAY_HEALTH_GRACE_SECS: u64 = 60;

// ============================================================================
// Topology Aggregate
// ============================================================================

/// Topology aggregate - the domain model root
#[derive(Debug, Clone)]
pub struct TopologyAggregate {
    /// Aggregate ID
    pub id: TopologyId,

    /// Current version (event count)
    pub version: u64,

    /// Nodes indexed by ID
    nodes: HashMap<NodeId, Node>,

    /// Node IDs in declaration order
    declaration_order: Vec<NodeId>,

    /// Explicit ordering edges
    edges: Vec<DependencyEdge>,

    /// Uncommitted events (to be published)
    uncommitted_events: Vec<TopologyEvent>,
}

impl TopologyAggregate {
    /// Create a new topology aggregate
    pub fn new(id: TopologyId) -> Self {
        Self {
            id,
            version: 0,
            nodes: HashMap::new(),
            declaration_order: Vec::new(),
            edges: Vec::new(),
            uncommitted_events: Vec::new(),
        }
    }

    /// Load aggregate from event history
    pub fn from_events(id: TopologyId, events: Vec<TopologyEvent>) -> Self {
        let mut aggregate = Self::new(id);

        for event in events {
            aggregate.apply_event(&event);
        }

        aggregate
    }

    /// Get uncommitted events and clear the list
    pub fn take_uncommitted_events(&mut self) -> Vec<TopologyEvent> {
        std::mem::take(&mut self.uncommitted_events)
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    /// Handle DeclareNetworkDomain command
    ///
    /// Allocates one public and one private subnet in each availability zone.
    pub fn handle_declare_network_domain(
        &mut self,
        spec: NetworkDomainSpec,
        identity: &MessageIdentity,
    ) -> Result<NetworkDomain> {
        self.ensure_vacant(&spec.id)?;

        let mut subnets = Vec::new();
        for az in 1..=NETWORK_MAX_AVAILABILITY_ZONES {
            for tier in [SubnetTier::Public, SubnetTier::Private] {
                subnets.push(Subnet {
                    id: format!("{}-{}-az{}", spec.name, tier, az),
                    tier,
                    availability_zone: format!("az{}", az),
                });
            }
        }

        let domain = NetworkDomain {
            id: spec.id,
            name: spec.name,
            max_availability_zones: NETWORK_MAX_AVAILABILITY_ZONES,
            subnets,
        };

        debug!("Declaring network domain {}", domain.id);
        self.emit_node(Node::NetworkDomain(domain.clone()), &[], identity);

        Ok(domain)
    }

    /// Handle DeclareDataStore command
    ///
    /// Binds to the network domain; the endpoint and generated credential are
    /// exposed as deferred attributes on the returned handle.
    pub fn handle_declare_data_store(
        &mut self,
        spec: DataStoreSpec,
        identity: &MessageIdentity,
    ) -> Result<DataStore> {
        self.ensure_vacant(&spec.id)?;
        let network = self.require_network_domain(&spec.id)?;

        let store = DataStore {
            id: spec.id,
            database_name: spec.database_name,
            engine: DATA_STORE_ENGINE.into(),
            engine_version: Version::new(DATA_STORE_ENGINE_VERSION),
            instance_class: DATA_STORE_INSTANCE_CLASS.into(),
            allocated_storage: DATA_STORE_ALLOCATED_STORAGE,
            master_username: DATA_STORE_MASTER_USERNAME.into(),
            removal_policy: RemovalPolicy::Destroy,
            network: network.clone(),
        };

        debug!("Declaring data store {}", store.id);
        let bindings = [network];
        self.emit_node(Node::DataStore(store.clone()), &bindings, identity);

        Ok(store)
    }

    /// Handle DeclareHealthProbe command
    ///
    /// The probe's address and port are forwarded from the data store
    /// unresolved; only the provisioning engine materializes them.
    pub fn handle_declare_health_probe(
        &mut self,
        spec: HealthProbeSpec,
        identity: &MessageIdentity,
    ) -> Result<HealthProbe> {
        self.ensure_vacant(&spec.id)?;

        let store = match self.nodes.get(&spec.data_store) {
            Some(Node::DataStore(store)) => store.clone(),
            Some(other) => {
                return Err(TopologyError::ValidationError(format!(
                    "Health probe {} targets {} which is a {}, not a data store",
                    spec.id,
                    spec.data_store,
                    other.kind()
                )))
            }
            None => {
                return Err(TopologyError::DanglingReference(format!(
                    "Health probe {} references unknown data store {}",
                    spec.id, spec.data_store
                )))
            }
        };

        let probe = HealthProbe {
            id: spec.id,
            data_store: store.id.clone(),
            protocol: TransportProtocol::Tcp,
            ip_address: store.host(),
            port: store.port(),
            request_interval_secs: PROBE_REQUEST_INTERVAL_SECS,
            failure_threshold: PROBE_FAILURE_THRESHOLD,
        };

        debug!("Declaring health probe {} on {}", probe.id, probe.data_store);
        let bindings = [store.id];
        self.emit_node(Node::HealthProbe(probe.clone()), &bindings, identity);

        Ok(probe)
    }

    /// Handle DeclareEventCluster command
    pub fn handle_declare_event_cluster(
        &mut self,
        spec: EventClusterSpec,
        identity: &MessageIdentity,
    ) -> Result<EventCluster> {
        self.ensure_vacant(&spec.id)?;
        let network_id = self.require_network_domain(&spec.id)?;

        let client_subnets = match self.nodes.get(&network_id) {
            Some(Node::NetworkDomain(domain)) => domain.private_subnet_ids(),
            _ => vec![],
        };

        let cluster = EventCluster {
            id: spec.id,
            name: spec.name,
            version: Version::new(BROKER_VERSION),
            broker_count: BROKER_COUNT,
            broker_instance_class: BROKER_INSTANCE_CLASS.into(),
            client_subnets,
            az_distribution: AzDistribution::Default,
            network: network_id.clone(),
        };

        debug!("Declaring event cluster {}", cluster.id);
        let bindings = [network_id];
        self.emit_node(Node::EventCluster(cluster.clone()), &bindings, identity);

        Ok(cluster)
    }

    /// Handle DeclareComputeCluster command
    ///
    /// One cluster per topology; all deployable units are scheduled into it.
    pub fn handle_declare_compute_cluster(
        &mut self,
        spec: ComputeClusterSpec,
        identity: &MessageIdentity,
    ) -> Result<ComputeCluster> {
        self.ensure_vacant(&spec.id)?;
        let network_id = self.require_network_domain(&spec.id)?;

        if self.compute_cluster().is_some() {
            return Err(TopologyError::ValidationError(format!(
                "Compute cluster {} declared but the topology already has one",
                spec.id
            )));
        }

        let cluster = ComputeCluster {
            id: spec.id,
            network: network_id.clone(),
            namespace: spec.namespace,
        };

        debug!("Declaring compute cluster {}", cluster.id);
        let bindings = [network_id];
        self.emit_node(Node::ComputeCluster(cluster.clone()), &bindings, identity);

        Ok(cluster)
    }

    /// Handle DeclareDeployableUnit command
    ///
    /// Declares the node with its assembled environment and binding to the
    /// compute cluster. Explicit ordering edges are attached afterwards with
    /// [`handle_declare_dependency`](Self::handle_declare_dependency), since
    /// some dependencies are only known once other nodes exist.
    pub fn handle_declare_deployable_unit(
        &mut self,
        spec: DeployableUnitSpec,
        identity: &MessageIdentity,
    ) -> Result<DeployableUnit> {
        self.ensure_vacant(&spec.id)?;
        let port_mappings = validate_ports(&spec.ports)?;
        let cluster_id = self.require_compute_cluster(&spec.id)?;

        let store = match &spec.data_store {
            Some(store_id) => match self.nodes.get(store_id) {
                Some(Node::DataStore(store)) => Some(store.clone()),
                Some(other) => {
                    return Err(TopologyError::ValidationError(format!(
                        "Unit {} wires data store {} which is a {}, not a data store",
                        spec.id,
                        store_id,
                        other.kind()
                    )))
                }
                None => {
                    return Err(TopologyError::DanglingReference(format!(
                        "Unit {} references unknown data store {}",
                        spec.id, store_id
                    )))
                }
            },
            None => None,
        };

        let environment =
            assemble_environment(&spec.image, spec.extra_env.as_ref(), store.as_ref());

        let unit = DeployableUnit {
            id: spec.id,
            image: spec.image.clone(),
            service_name: spec.image.clone(),
            limits: ResourceLimits {
                cpu_units: UNIT_CPU_UNITS,
                memory_mib: UNIT_MEMORY_MIB,
            },
            port_mappings,
            log_sink: log_sink(&spec.image),
            environment,
            data_store: spec.data_store,
            cluster: cluster_id.clone(),
            assign_public_ip: false,
        };

        debug!("Declaring deployable unit {}", unit.id);
        let bindings = [cluster_id];
        self.emit_node(Node::DeployableUnit(unit.clone()), &bindings, identity);

        Ok(unit)
    }

    /// Handle DeclareGatewayUnit command
    ///
    /// The single load-balanced ingress point; provisioned after the unit it
    /// fronts.
    pub fn handle_declare_gateway_unit(
        &mut self,
        spec: GatewayUnitSpec,
        identity: &MessageIdentity,
    ) -> Result<GatewayUnit> {
        self.ensure_vacant(&spec.id)?;
        let port_mappings = validate_ports(&spec.ports)?;
        let cluster_id = self.require_compute_cluster(&spec.id)?;

        match self.nodes.get(&spec.target_unit) {
            Some(Node::DeployableUnit(_)) => {}
            Some(other) => {
                return Err(TopologyError::ValidationError(format!(
                    "Gateway {} fronts {} which is a {}, not a deployable unit",
                    spec.id,
                    spec.target_unit,
                    other.kind()
                )))
            }
            None => {
                return Err(TopologyError::DanglingReference(format!(
                    "Gateway {} references unknown unit {}",
                    spec.id, spec.target_unit
                )))
            }
        }

        let mut environment = EnvironmentMap::new();
        for (name, value) in &spec.env {
            environment.insert(name.clone(), EnvValue::literal(value.clone()));
        }

        let gateway = GatewayUnit {
            id: spec.id,
            image: spec.image.clone(),
            service_name: spec.image.clone(),
            cluster: cluster_id.clone(),
            target_unit: spec.target_unit.clone(),
            desired_count: GATEWAY_DESIRED_COUNT,
            health_check_grace_secs: GATEWAY_HEALTH_GRACE_SECS,
            port_mappings,
            log_sink: log_sink(&spec.image),
            environment,
        };

        debug!("Declaring gateway unit {}", gateway.id);
        let bindings = [cluster_id, spec.target_unit];
        self.emit_node(Node::GatewayUnit(gateway.clone()), &bindings, identity);

        Ok(gateway)
    }

    /// Handle DeclareDependency command
    ///
    /// Attaches an explicit ordering edge. Fails if either endpoint is
    /// missing or if the edge would close a cycle over the combined explicit
    /// and attribute-implied edge set.
    pub fn handle_declare_dependency(
        &mut self,
        dependent: NodeId,
        dependency: NodeId,
        identity: &MessageIdentity,
    ) -> Result<()> {
        for id in [&dependent, &dependency] {
            if !self.nodes.contains_key(id) {
                return Err(TopologyError::DanglingReference(format!(
                    "Dependency edge references unknown node {}",
                    id
                )));
            }
        }

        if dependent == dependency {
            return Err(TopologyError::ValidationError(format!(
                "Node {} cannot depend on itself",
                dependent
            )));
        }

        let edge = DependencyEdge::new(dependent, dependency);
        if self.edges.contains(&edge) {
            debug!("Dependency {} already declared", edge);
            return Ok(());
        }

        // Adding dependent -> dependency closes a cycle iff the dependency
        // can already reach the dependent.
        if self.has_path(&edge.dependency, &edge.dependent) {
            return Err(TopologyError::CycleDetected(edge.dependent));
        }

        debug!("Declaring dependency {}", edge);
        let event =
            TopologyEvent::dependency_declared(identity.correlation_id, identity.causation_id, edge);
        self.apply_event(&event);
        self.uncommitted_events.push(event);

        Ok(())
    }

    // ========================================================================
    // Event Application (State Changes)
    // ========================================================================

    /// Apply an event to update aggregate state
    pub fn apply_event(&mut self, event: &TopologyEvent) {
        match event {
            TopologyEvent::NodeDeclared { node, .. } => {
                self.declaration_order.push(node.id().clone());
                self.nodes.insert(node.id().clone(), node.clone());
            }

            TopologyEvent::DependencyDeclared { edge, .. } => {
                self.edges.push(edge.clone());
            }
        }

        self.version += 1;
    }

    // ========================================================================
    // Query Methods
    // ========================================================================

    /// Get a node by ID
    pub fn get_node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// All nodes in declaration order
    pub fn nodes(&self) -> Vec<&Node> {
        self.declaration_order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .collect()
    }

    /// Number of declared nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Explicit ordering edges
    pub fn explicit_edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// Edges implied by deferred attribute references, minus those already
    /// declared explicitly
    pub fn implied_edges(&self) -> Vec<DependencyEdge> {
        let explicit: HashSet<&DependencyEdge> = self.edges.iter().collect();
        let mut seen = HashSet::new();
        let mut implied = Vec::new();

        for id in &self.declaration_order {
            let node = &self.nodes[id];
            for reference in node.deferred_references() {
                if &reference.node == node.id() {
                    continue;
                }
                let edge = DependencyEdge::new(node.id().clone(), reference.node.clone());
                if !explicit.contains(&edge) && seen.insert(edge.clone()) {
                    implied.push(edge);
                }
            }
        }

        implied
    }

    /// Explicit and implied edges combined
    pub fn effective_edges(&self) -> Vec<DependencyEdge> {
        let mut edges = self.edges.clone();
        edges.extend(self.implied_edges());
        edges
    }

    /// Direct dependencies of a node (explicit and implied)
    pub fn dependencies_of(&self, id: &NodeId) -> Vec<NodeId> {
        self.effective_edges()
            .into_iter()
            .filter(|e| &e.dependent == id)
            .map(|e| e.dependency)
            .collect()
    }

    /// Direct dependents of a node (explicit and implied)
    pub fn dependents_of(&self, id: &NodeId) -> Vec<NodeId> {
        self.effective_edges()
            .into_iter()
            .filter(|e| &e.dependency == id)
            .map(|e| e.dependent)
            .collect()
    }

    /// The network domain node, if declared
    pub fn network_domain(&self) -> Option<&NetworkDomain> {
        self.nodes.values().find_map(|node| match node {
            Node::NetworkDomain(domain) => Some(domain),
            _ => None,
        })
    }

    /// The compute cluster node, if declared
    pub fn compute_cluster(&self) -> Option<&ComputeCluster> {
        self.nodes.values().find_map(|node| match node {
            Node::ComputeCluster(cluster) => Some(cluster),
            _ => None,
        })
    }

    // ========================================================================
    // Finalization
    // ========================================================================

    /// Validate the complete graph and produce the immutable snapshot
    ///
    /// Checks that every deferred reference points to an existing node that
    /// exposes the referenced attribute, that every edge endpoint exists, and
    /// that the combined edge set is acyclic. Consumes the aggregate: the
    /// snapshot has no mutation path.
    pub fn finalize(self) -> Result<TopologySnapshot> {
        for id in &self.declaration_order {
            let node = &self.nodes[id];
            for reference in node.deferred_references() {
                match self.nodes.get(&reference.node) {
                    None => {
                        return Err(TopologyError::DanglingReference(format!(
                            "{} references missing node {}",
                            node.id(),
                            reference.node
                        )))
                    }
                    Some(target) if !target.exposes(reference.attribute) => {
                        return Err(TopologyError::DanglingReference(format!(
                            "{} does not expose attribute {}",
                            reference.node, reference.attribute
                        )))
                    }
                    Some(_) => {}
                }
            }
        }

        for edge in &self.edges {
            for id in [&edge.dependent, &edge.dependency] {
                if !self.nodes.contains_key(id) {
                    return Err(TopologyError::DanglingReference(format!(
                        "Edge {} references unknown node {}",
                        edge, id
                    )));
                }
            }
        }

        let provisioning_order = self.topological_order()?;

        info!(
            "Finalized topology {} with {} nodes and {} edges",
            self.id,
            self.nodes.len(),
            self.edges.len()
        );

        let implied_edges = self.implied_edges();
        let nodes = self
            .declaration_order
            .iter()
            .map(|id| self.nodes[id].clone())
            .collect();

        Ok(TopologySnapshot {
            topology_id: self.id,
            nodes,
            edges: self.edges,
            implied_edges,
            provisioning_order,
        })
    }

    /// Dependency-first topological order over the effective edge set
    fn topological_order(&self) -> Result<Vec<NodeId>> {
        let edges = self.effective_edges();

        let mut pending: HashMap<&NodeId, usize> = self
            .declaration_order
            .iter()
            .map(|id| (id, 0usize))
            .collect();
        let mut dependents: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();

        for edge in &edges {
            *pending.entry(&edge.dependent).or_default() += 1;
            dependents
                .entry(&edge.dependency)
                .or_default()
                .push(&edge.dependent);
        }

        let mut ready: VecDeque<&NodeId> = self
            .declaration_order
            .iter()
            .filter(|id| pending.get(*id) == Some(&0))
            .collect();
        let mut order = Vec::with_capacity(self.declaration_order.len());

        while let Some(id) = ready.pop_front() {
            order.push(id.clone());
            for &dependent in dependents.get(id).into_iter().flatten() {
                if let Some(remaining) = pending.get_mut(dependent) {
                    *remaining -= 1;
                    if *remaining == 0 {
                        ready.push_back(dependent);
                    }
                }
            }
        }

        if order.len() != self.declaration_order.len() {
            // At least one node still waits on a dependency inside the cycle.
            let stuck = self
                .declaration_order
                .iter()
                .find(|id| pending.get(*id).is_some_and(|n| *n > 0))
                .cloned()
                .unwrap_or_else(|| self.declaration_order[0].clone());
            return Err(TopologyError::CycleDetected(stuck));
        }

        Ok(order)
    }

    // ========================================================================
    // Internal Helpers
    // ========================================================================

    fn ensure_vacant(&self, id: &NodeId) -> Result<()> {
        if self.nodes.contains_key(id) {
            return Err(TopologyError::DuplicateId(id.clone()));
        }
        Ok(())
    }

    fn require_network_domain(&self, declaring: &NodeId) -> Result<NodeId> {
        self.network_domain()
            .map(|domain| domain.id.clone())
            .ok_or_else(|| {
                TopologyError::DanglingReference(format!(
                    "{} declared before the network domain",
                    declaring
                ))
            })
    }

    fn require_compute_cluster(&self, declaring: &NodeId) -> Result<NodeId> {
        self.compute_cluster()
            .map(|cluster| cluster.id.clone())
            .ok_or_else(|| {
                TopologyError::DanglingReference(format!(
                    "{} declared before the compute cluster",
                    declaring
                ))
            })
    }

    /// Declare a node plus its binding edges in one causal chain
    fn emit_node(&mut self, node: Node, bindings: &[NodeId], identity: &MessageIdentity) {
        let dependent = node.id().clone();
        let node_event =
            TopologyEvent::node_declared(identity.correlation_id, identity.causation_id, node);
        let node_event_id = node_event.event_id();
        self.apply_event(&node_event);
        self.uncommitted_events.push(node_event);

        for binding in bindings {
            let edge = DependencyEdge::new(dependent.clone(), binding.clone());
            let edge_event = TopologyEvent::dependency_declared(
                identity.correlation_id,
                Some(node_event_id),
                edge,
            );
            self.apply_event(&edge_event);
            self.uncommitted_events.push(edge_event);
        }
    }

    /// Whether `from` can reach `to` over the effective edge set
    fn has_path(&self, from: &NodeId, to: &NodeId) -> bool {
        let edges = self.effective_edges();
        let mut adjacency: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
        for edge in &edges {
            adjacency
                .entry(&edge.dependent)
                .or_default()
                .push(&edge.dependency);
        }

        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([from]);
        while let Some(id) = queue.pop_front() {
            if id == to {
                return true;
            }
            if visited.insert(id) {
                queue.extend(adjacency.get(id).into_iter().flatten().copied());
            }
        }

        false
    }
}

// ============================================================================
// Environment Assembly
// ============================================================================

/// Assemble a unit's environment map
///
/// Order: broker bootstrap address (always), caller extras, then
/// datastore-derived entries. Later entries replace earlier ones for the same
/// name.
fn assemble_environment(
    image: &str,
    extra_env: Option<&HashMap<String, String>>,
    store: Option<&DataStore>,
) -> EnvironmentMap {
    let mut environment = EnvironmentMap::new();
    environment.insert(
        BROKER_BOOTSTRAP_KEY,
        EnvValue::literal(BROKER_BOOTSTRAP_SERVERS),
    );

    if let Some(extras) = extra_env {
        for (name, value) in extras {
            environment.insert(name.clone(), EnvValue::literal(value.clone()));
        }
    }

    if let Some(store) = store {
        environment.insert(
            DATASOURCE_URL_KEY,
            EnvValue::interpolated(
                format!("jdbc:postgresql://{{}}:{{}}/{}-db", image),
                vec![store.host(), store.port()],
            ),
        );
        environment.insert(
            DATASOURCE_USERNAME_KEY,
            EnvValue::literal(store.master_username.clone()),
        );
        environment.insert(
            DATASOURCE_PASSWORD_KEY,
            EnvValue::Deferred(store.password_secret()),
        );
        environment.insert(DDL_AUTO_KEY, EnvValue::literal("update"));
        environment.insert(SQL_INIT_MODE_KEY, EnvValue::literal("always"));
        environment.insert(POOL_INIT_TIMEOUT_KEY, EnvValue::literal("60000"));
    }

    environment
}

fn validate_ports(ports: &[u16]) -> Result<Vec<PortMapping>> {
    if ports.is_empty() {
        return Err(TopologyError::InvalidPortSet("No ports requested".into()));
    }

    let mut seen = HashSet::new();
    for port in ports {
        if !seen.insert(port) {
            return Err(TopologyError::InvalidPortSet(format!(
                "Port {} requested more than once",
                port
            )));
        }
    }

    Ok(ports.iter().map(|port| PortMapping::tcp(*port)).collect())
}

fn log_sink(image: &str) -> LogSink {
    LogSink {
        group: format!("{}{}", LOG_GROUP_PREFIX, image),
        retention_days: LOG_RETENTION_DAYS,
        removal_policy: RemovalPolicy::Destroy,
        stream_prefix: image.into(),
    }
}

// ============================================================================
// Topology Snapshot
// ============================================================================

/// Immutable graph snapshot handed to the external provisioning engine
///
/// Nodes appear in declaration order. Nodes with no path between them may be
/// provisioned concurrently; nodes connected by an edge must be provisioned
/// dependency-first, for which [`provisioning_order`](Self::provisioning_order)
/// gives one valid sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    topology_id: TopologyId,
    nodes: Vec<Node>,
    edges: Vec<DependencyEdge>,
    implied_edges: Vec<DependencyEdge>,
    provisioning_order: Vec<NodeId>,
}

impl TopologySnapshot {
    pub fn topology_id(&self) -> TopologyId {
        self.topology_id
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn get_node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id() == id)
    }

    /// Explicitly declared ordering edges
    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// Edges implied by deferred attribute references
    pub fn implied_edges(&self) -> &[DependencyEdge] {
        &self.implied_edges
    }

    /// Explicit and implied edges combined
    pub fn effective_edges(&self) -> Vec<&DependencyEdge> {
        self.edges.iter().chain(self.implied_edges.iter()).collect()
    }

    /// One dependency-first provisioning sequence
    pub fn provisioning_order(&self) -> &[NodeId] {
        &self.provisioning_order
    }

    /// All nodes reachable from `id` by dependency edges, explicit and
    /// implied, excluding `id` itself
    pub fn reachable_from(&self, id: &NodeId) -> Result<HashSet<NodeId>> {
        if self.get_node(id).is_none() {
            return Err(TopologyError::DanglingReference(format!(
                "Unknown node {}",
                id
            )));
        }

        let mut adjacency: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
        for edge in self.effective_edges() {
            adjacency
                .entry(&edge.dependent)
                .or_default()
                .push(&edge.dependency);
        }

        let mut reachable = HashSet::new();
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for &dependency in adjacency.get(current).into_iter().flatten() {
                if reachable.insert(dependency.clone()) {
                    queue.push_back(dependency);
                }
            }
        }

        Ok(reachable)
    }

    /// Export the snapshot for engines that consume it declaratively
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn node_id(id: &str) -> NodeId {
        NodeId::new(id).unwrap()
    }

    /// Aggregate with network, auth data store, and compute cluster declared
    fn seeded_aggregate() -> (TopologyAggregate, MessageIdentity) {
        let mut aggregate = TopologyAggregate::new(TopologyId::new());
        let identity = MessageIdentity::new_root();

        aggregate
            .handle_declare_network_domain(
                NetworkDomainSpec {
                    id: node_id("PatientManagementNetwork"),
                    name: "patient-management".into(),
                },
                &identity,
            )
            .unwrap();
        aggregate
            .handle_declare_data_store(
                DataStoreSpec {
                    id: node_id("AuthDataStore"),
                    database_name: "auth-service-db".into(),
                },
                &identity,
            )
            .unwrap();
        aggregate
            .handle_declare_compute_cluster(
                ComputeClusterSpec {
                    id: node_id("PatientManagementCluster"),
                    namespace: "patient-management.local".into(),
                },
                &identity,
            )
            .unwrap();

        (aggregate, identity)
    }

    #[test]
    fn test_aggregate_creation() {
        let id = TopologyId::new();
        let aggregate = TopologyAggregate::new(id);

        assert_eq!(aggregate.id, id);
        assert_eq!(aggregate.version, 0);
        assert_eq!(aggregate.node_count(), 0);
    }

    #[test]
    fn test_declare_network_domain_allocates_subnets() {
        let mut aggregate = TopologyAggregate::new(TopologyId::new());
        let identity = MessageIdentity::new_root();

        let domain = aggregate
            .handle_declare_network_domain(
                NetworkDomainSpec {
                    id: node_id("net"),
                    name: "pm".into(),
                },
                &identity,
            )
            .unwrap();

        assert_eq!(domain.max_availability_zones, 2);
        assert_eq!(domain.subnets.len(), 4);
        assert_eq!(domain.private_subnet_ids().len(), 2);
        assert_eq!(domain.public_subnet_ids().len(), 2);
    }

    #[test]
    fn test_duplicate_id_fails_before_adding() {
        let (mut aggregate, identity) = seeded_aggregate();
        let before = aggregate.node_count();

        let result = aggregate.handle_declare_data_store(
            DataStoreSpec {
                id: node_id("AuthDataStore"),
                database_name: "other-db".into(),
            },
            &identity,
        );

        assert_eq!(
            result,
            Err(TopologyError::DuplicateId(node_id("AuthDataStore")))
        );
        assert_eq!(aggregate.node_count(), before);
    }

    #[test]
    fn test_data_store_requires_network_domain() {
        let mut aggregate = TopologyAggregate::new(TopologyId::new());
        let identity = MessageIdentity::new_root();

        let result = aggregate.handle_declare_data_store(
            DataStoreSpec {
                id: node_id("AuthDataStore"),
                database_name: "auth-service-db".into(),
            },
            &identity,
        );

        assert!(matches!(result, Err(TopologyError::DanglingReference(_))));
    }

    #[test]
    fn test_data_store_fixed_shape() {
        let (aggregate, _) = seeded_aggregate();

        let Some(Node::DataStore(store)) = aggregate.get_node(&node_id("AuthDataStore")) else {
            panic!("data store not declared");
        };

        assert_eq!(store.engine, "postgres");
        assert_eq!(store.engine_version.as_str(), "17.2");
        assert_eq!(store.allocated_storage, 20);
        assert_eq!(store.master_username, "admin_user");
        assert_eq!(store.removal_policy, RemovalPolicy::Destroy);
    }

    #[test]
    fn test_health_probe_constants() {
        let (mut aggregate, identity) = seeded_aggregate();

        let probe = aggregate
            .handle_declare_health_probe(
                HealthProbeSpec {
                    id: node_id("AuthHealthProbe"),
                    data_store: node_id("AuthDataStore"),
                },
                &identity,
            )
            .unwrap();

        assert_eq!(probe.request_interval_secs, 30);
        assert_eq!(probe.failure_threshold, 3);
        assert_eq!(probe.protocol, TransportProtocol::Tcp);
        assert_eq!(probe.ip_address.attribute, AttributeName::Host);
        assert_eq!(probe.port.attribute, AttributeName::Port);

        // probe -> data store binding edge
        assert!(aggregate
            .explicit_edges()
            .contains(&DependencyEdge::new(probe.id, probe.data_store)));
    }

    #[test]
    fn test_health_probe_unknown_store_fails() {
        let (mut aggregate, identity) = seeded_aggregate();

        let result = aggregate.handle_declare_health_probe(
            HealthProbeSpec {
                id: node_id("probe"),
                data_store: node_id("missing"),
            },
            &identity,
        );

        assert!(matches!(result, Err(TopologyError::DanglingReference(_))));
    }

    #[test]
    fn test_event_cluster_uses_private_subnets() {
        let (mut aggregate, identity) = seeded_aggregate();

        let cluster = aggregate
            .handle_declare_event_cluster(
                EventClusterSpec {
                    id: node_id("EventCluster"),
                    name: "kafka-cluster".into(),
                },
                &identity,
            )
            .unwrap();

        assert_eq!(cluster.broker_count, 1);
        assert_eq!(cluster.version.as_str(), "2.8.0");
        assert_eq!(cluster.az_distribution, AzDistribution::Default);
        assert_eq!(
            cluster.client_subnets,
            aggregate.network_domain().unwrap().private_subnet_ids()
        );
    }

    #[test]
    fn test_second_compute_cluster_fails() {
        let (mut aggregate, identity) = seeded_aggregate();

        let result = aggregate.handle_declare_compute_cluster(
            ComputeClusterSpec {
                id: node_id("SecondCluster"),
                namespace: "other.local".into(),
            },
            &identity,
        );

        assert!(matches!(result, Err(TopologyError::ValidationError(_))));
    }

    #[test]
    fn test_unit_environment_with_data_store() {
        let (mut aggregate, identity) = seeded_aggregate();

        let unit = aggregate
            .handle_declare_deployable_unit(
                DeployableUnitSpec {
                    id: node_id("AuthService"),
                    image: "auth-service".into(),
                    ports: vec![4005],
                    data_store: Some(node_id("AuthDataStore")),
                    extra_env: Some(
                        [("JWT_SECRET".to_string(), "token".to_string())].into(),
                    ),
                },
                &identity,
            )
            .unwrap();

        let env = &unit.environment;
        assert_eq!(env.len(), 8);
        assert_eq!(
            env.get(BROKER_BOOTSTRAP_KEY),
            Some(&EnvValue::literal(BROKER_BOOTSTRAP_SERVERS))
        );
        assert_eq!(env.get("JWT_SECRET"), Some(&EnvValue::literal("token")));
        assert_eq!(
            env.get(DATASOURCE_URL_KEY),
            Some(&EnvValue::interpolated(
                "jdbc:postgresql://{}:{}/auth-service-db",
                vec![
                    DeferredAttribute::new(node_id("AuthDataStore"), AttributeName::Host),
                    DeferredAttribute::new(node_id("AuthDataStore"), AttributeName::Port),
                ],
            ))
        );
        assert_eq!(
            env.get(DATASOURCE_USERNAME_KEY),
            Some(&EnvValue::literal("admin_user"))
        );
        assert_eq!(
            env.get(DATASOURCE_PASSWORD_KEY),
            Some(&EnvValue::deferred(
                node_id("AuthDataStore"),
                AttributeName::PasswordSecret
            ))
        );
        assert_eq!(env.get(DDL_AUTO_KEY), Some(&EnvValue::literal("update")));
        assert_eq!(env.get(SQL_INIT_MODE_KEY), Some(&EnvValue::literal("always")));
        assert_eq!(
            env.get(POOL_INIT_TIMEOUT_KEY),
            Some(&EnvValue::literal("60000"))
        );
    }

    #[test]
    fn test_unit_environment_without_data_store() {
        let (mut aggregate, identity) = seeded_aggregate();

        let unit = aggregate
            .handle_declare_deployable_unit(
                DeployableUnitSpec {
                    id: node_id("BillingService"),
                    image: "billing-service".into(),
                    ports: vec![4001, 9001],
                    data_store: None,
                    extra_env: None,
                },
                &identity,
            )
            .unwrap();

        assert_eq!(unit.environment.len(), 1);
        assert!(unit.environment.contains(BROKER_BOOTSTRAP_KEY));
        assert_eq!(unit.port_mappings.len(), 2);
        assert!(unit
            .port_mappings
            .iter()
            .all(|m| m.container_port == m.host_port && m.protocol == TransportProtocol::Tcp));
        assert_eq!(unit.limits.cpu_units, 256);
        assert_eq!(unit.limits.memory_mib, 512);
        assert_eq!(unit.log_sink.group, "/ecs/billing-service");
        assert_eq!(unit.log_sink.retention_days, 1);
    }

    #[test_case(Vec::new(); "empty port set")]
    #[test_case(vec![4001, 4001]; "duplicate ports")]
    fn test_invalid_port_set_fails(ports: Vec<u16>) {
        let (mut aggregate, identity) = seeded_aggregate();

        let result = aggregate.handle_declare_deployable_unit(
            DeployableUnitSpec {
                id: node_id("BadUnit"),
                image: "bad-unit".into(),
                ports,
                data_store: None,
                extra_env: None,
            },
            &identity,
        );

        assert!(matches!(result, Err(TopologyError::InvalidPortSet(_))));
    }

    #[test]
    fn test_implied_edges_from_environment() {
        let (mut aggregate, identity) = seeded_aggregate();

        aggregate
            .handle_declare_deployable_unit(
                DeployableUnitSpec {
                    id: node_id("AuthService"),
                    image: "auth-service".into(),
                    ports: vec![4005],
                    data_store: Some(node_id("AuthDataStore")),
                    extra_env: None,
                },
                &identity,
            )
            .unwrap();

        let implied = aggregate.implied_edges();
        assert!(implied.contains(&DependencyEdge::new(
            node_id("AuthService"),
            node_id("AuthDataStore")
        )));

        let dependencies = aggregate.dependencies_of(&node_id("AuthService"));
        assert!(dependencies.contains(&node_id("AuthDataStore")));
        assert!(dependencies.contains(&node_id("PatientManagementCluster")));
        assert!(aggregate
            .dependents_of(&node_id("AuthDataStore"))
            .contains(&node_id("AuthService")));
    }

    #[test]
    fn test_dependency_cycle_detected() {
        let (mut aggregate, identity) = seeded_aggregate();

        for (id, image, port) in [("A", "a", 4000), ("B", "b", 4001)] {
            aggregate
                .handle_declare_deployable_unit(
                    DeployableUnitSpec {
                        id: node_id(id),
                        image: image.into(),
                        ports: vec![port],
                        data_store: None,
                        extra_env: None,
                    },
                    &identity,
                )
                .unwrap();
        }

        aggregate
            .handle_declare_dependency(node_id("A"), node_id("B"), &identity)
            .unwrap();
        let result = aggregate.handle_declare_dependency(node_id("B"), node_id("A"), &identity);

        assert_eq!(result, Err(TopologyError::CycleDetected(node_id("B"))));
    }

    #[test]
    fn test_dependency_on_unknown_node_fails() {
        let (mut aggregate, identity) = seeded_aggregate();

        let result =
            aggregate.handle_declare_dependency(node_id("AuthDataStore"), node_id("ghost"), &identity);

        assert!(matches!(result, Err(TopologyError::DanglingReference(_))));
    }

    #[test]
    fn test_self_dependency_fails() {
        let (mut aggregate, identity) = seeded_aggregate();

        let result = aggregate.handle_declare_dependency(
            node_id("AuthDataStore"),
            node_id("AuthDataStore"),
            &identity,
        );

        assert!(matches!(result, Err(TopologyError::ValidationError(_))));
    }

    #[test]
    fn test_event_sourcing_reconstruction() {
        let (mut aggregate, identity) = seeded_aggregate();
        aggregate
            .handle_declare_health_probe(
                HealthProbeSpec {
                    id: node_id("AuthHealthProbe"),
                    data_store: node_id("AuthDataStore"),
                },
                &identity,
            )
            .unwrap();

        let events = aggregate.take_uncommitted_events();
        let rebuilt = TopologyAggregate::from_events(aggregate.id, events);

        assert_eq!(rebuilt.version, aggregate.version);
        assert_eq!(rebuilt.node_count(), aggregate.node_count());
        assert_eq!(rebuilt.explicit_edges(), aggregate.explicit_edges());

        let ids = |agg: &TopologyAggregate| -> Vec<NodeId> {
            agg.nodes().iter().map(|n| n.id().clone()).collect()
        };
        assert_eq!(ids(&rebuilt), ids(&aggregate));
    }

    #[test]
    fn test_finalize_orders_dependencies_first() {
        let (mut aggregate, identity) = seeded_aggregate();
        aggregate
            .handle_declare_deployable_unit(
                DeployableUnitSpec {
                    id: node_id("AuthService"),
                    image: "auth-service".into(),
                    ports: vec![4005],
                    data_store: Some(node_id("AuthDataStore")),
                    extra_env: None,
                },
                &identity,
            )
            .unwrap();

        let snapshot = aggregate.finalize().unwrap();
        let order = snapshot.provisioning_order();
        let position = |id: &NodeId| order.iter().position(|n| n == id).unwrap();

        assert_eq!(order.len(), snapshot.nodes().len());
        assert!(position(&node_id("PatientManagementNetwork")) < position(&node_id("AuthDataStore")));
        assert!(position(&node_id("AuthDataStore")) < position(&node_id("AuthService")));
        assert!(
            position(&node_id("PatientManagementCluster")) < position(&node_id("AuthService"))
        );
    }

    #[test]
    fn test_finalize_rejects_dangling_deferred_reference() {
        // Hand-built event log: a probe whose data store was never declared.
        let id = TopologyId::new();
        let correlation = MessageIdentity::new_root().correlation_id;
        let ghost = DataStore {
            id: node_id("GhostStore"),
            database_name: "ghost-db".into(),
            engine: DATA_STORE_ENGINE.into(),
            engine_version: Version::new(DATA_STORE_ENGINE_VERSION),
            instance_class: DATA_STORE_INSTANCE_CLASS.into(),
            allocated_storage: DATA_STORE_ALLOCATED_STORAGE,
            master_username: DATA_STORE_MASTER_USERNAME.into(),
            removal_policy: RemovalPolicy::Destroy,
            network: node_id("net"),
        };
        let probe = HealthProbe {
            id: node_id("OrphanProbe"),
            data_store: ghost.id.clone(),
            protocol: TransportProtocol::Tcp,
            ip_address: ghost.host(),
            port: ghost.port(),
            request_interval_secs: PROBE_REQUEST_INTERVAL_SECS,
            failure_threshold: PROBE_FAILURE_THRESHOLD,
        };

        let events = vec![TopologyEvent::node_declared(
            correlation,
            None,
            Node::HealthProbe(probe),
        )];
        let aggregate = TopologyAggregate::from_events(id, events);

        assert!(matches!(
            aggregate.finalize(),
            Err(TopologyError::DanglingReference(_))
        ));
    }

    #[test]
    fn test_snapshot_json_round_trip() {
        let (aggregate, _) = seeded_aggregate();
        let snapshot = aggregate.finalize().unwrap();

        let json = snapshot.to_json().unwrap();
        let back: TopologySnapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(snapshot, back);
    }
}
