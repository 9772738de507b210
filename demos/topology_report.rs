//! Deployment Topology Report Example
//!
//! This example demonstrates:
//! - Running the fixed compose sequence for the patient-management platform
//! - Inspecting nodes, explicit edges, and attribute-implied edges
//! - Producing the dependency-first provisioning order
//! - Exporting the snapshot for an external provisioning engine
//!
//! Run with:
//! ```bash
//! cargo run --example topology_report
//! ```

use anyhow::Result;
use pm_domain_deployment::compose::patient_management_topology;
use pm_domain_deployment::Node;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("===========================================");
    println!("  Patient Management Deployment Topology");
    println!("===========================================\n");

    let snapshot = patient_management_topology("demo-secret")?;

    println!("📦 Declared nodes...\n");
    for node in snapshot.nodes() {
        println!("  ✓ {} ({})", node.id(), node.kind());
    }

    println!("\n🔗 Ordering edges...\n");
    for edge in snapshot.edges() {
        println!("  {}", edge);
    }
    println!("\n  plus {} attribute-implied:", snapshot.implied_edges().len());
    for edge in snapshot.implied_edges() {
        println!("  {}", edge);
    }

    println!("\n🚀 Provisioning order...\n");
    for (step, id) in snapshot.provisioning_order().iter().enumerate() {
        println!("  {}. {}", step + 1, id);
    }

    println!("\n🔌 Environment of each deployable unit...\n");
    for node in snapshot.nodes() {
        if let Node::DeployableUnit(unit) = node {
            println!("  {}:", unit.id);
            for (name, value) in unit.environment.iter() {
                match value {
                    v if v.is_deferred() => println!("    {} = <deferred>", name),
                    _ => println!("    {} = <literal>", name),
                }
            }
        }
    }

    println!("\n📄 Snapshot export:\n");
    println!("{}", snapshot.to_json()?);

    Ok(())
}
