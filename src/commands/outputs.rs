use super::Deployment;
use crate::Context;
use crate::cli::OutputsArgs;
use crate::ui;
use anyhow::{Context as _, Result};
use provision::Export;

pub fn run(ctx: &Context, args: OutputsArgs) -> Result<()> {
    let deployment = Deployment::load(ctx)?;
    let export = deployment.state.ledger.export(!args.reveal);

    if args.json {
        let json = serde_json::to_string_pretty(&export).context("Failed to serialize outputs")?;
        println!("{json}");
        return Ok(());
    }

    if export.is_empty() {
        ui::info("No outputs recorded. Run 'drtopo apply' first.");
        return Ok(());
    }
    ui::header("Outputs");
    print_export(&export);
    if !args.reveal {
        println!();
        ui::dim("Secrets are redacted; pass --reveal to show them.");
    }
    Ok(())
}

pub fn print_export(export: &Export) {
    for (resource, fields) in export {
        println!("  {resource}");
        for (field, value) in fields {
            ui::kv(&format!("  {field}"), value);
        }
    }
}
