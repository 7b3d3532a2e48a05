use super::Deployment;
use crate::Context;
use crate::topology::Names;
use crate::ui;
use anyhow::Result;
use colored::Colorize;

pub fn run(ctx: &Context) -> Result<()> {
    let deployment = Deployment::load(ctx)?;
    let graph = &deployment.graph;
    let ledger = &deployment.state.ledger;

    ui::header(&format!("drtopo: {}", deployment.config.topology.prefix));
    deployment.print_location();
    if ledger.is_empty() {
        println!();
        ui::info("Nothing provisioned yet. Run 'drtopo apply'.");
        return Ok(());
    }
    ui::kv(
        "Last updated",
        &deployment
            .state
            .last_updated
            .format("%Y-%m-%d %H:%M:%S UTC")
            .to_string(),
    );

    let prefix = &deployment.config.topology.prefix;
    let names = Names::new(&deployment.config.topology);
    for region in names.regions() {
        ui::section(&region.region);
        let scope = format!("{prefix}-{}-", region.region);
        for name in graph.apply_order() {
            if name.starts_with(&scope) {
                print_resource(name, ledger.get(name).map(|r| r.pending));
            }
        }
    }

    ui::section("Shared");
    print_resource(&names.manager, ledger.get(&names.manager).map(|r| r.pending));

    // Recorded but no longer part of the topology
    let stale: Vec<&String> = ledger
        .resources
        .keys()
        .filter(|name| graph.descriptor(name).is_none())
        .collect();
    if !stale.is_empty() {
        ui::section("Orphaned");
        for name in stale {
            ui::warn(&format!("{name} is recorded but not in the config"));
        }
    }

    if !ledger.links.is_empty() {
        ui::section("Links");
        for link in &ledger.links {
            ui::kv(&link.name, &ui::link_phase(link.phase).to_string());
            if link.is_partial() {
                ui::dim(&format!(
                    "forward link {} exists without its reverse half; re-run apply or destroy",
                    link.forward_link_id.as_deref().unwrap_or("?")
                ));
            }
        }
    }
    Ok(())
}

fn print_resource(name: &str, pending: Option<bool>) {
    let state = match pending {
        Some(false) => "ready".green(),
        Some(true) => "not ready".yellow(),
        None => "absent".dimmed(),
    };
    println!("  {} {}", name, state);
}
