//! Client credential files
//!
//! Each region's producer and consumer applications read a `<region>.env`
//! file with the cluster, topic and schema registry they should talk to.

use super::Deployment;
use crate::Context;
use crate::cli::EnvArgs;
use crate::platform::fields;
use crate::state::write_private;
use crate::topology::{Names, RegionNames};
use crate::ui;
use anyhow::{Context as _, Result, bail};
use provision::Export;
use std::fs;

pub fn run(ctx: &Context, args: EnvArgs) -> Result<()> {
    let deployment = Deployment::load(ctx)?;
    let export = deployment.state.ledger.export(false);
    let names = Names::new(&deployment.config.topology);
    let group = &deployment.config.topology.consumer_group;

    let regions = match args.region.as_deref() {
        Some(name) => match names.region(name) {
            Some(region) => vec![region],
            None => bail!("No region named {name:?} in the config"),
        },
        None => names.regions().to_vec(),
    };

    fs::create_dir_all(&args.dir)
        .with_context(|| format!("Failed to create directory: {}", args.dir.display()))?;

    for region in regions {
        let content = render(region, group, &export)?;
        let path = args.dir.join(format!("{}.env", region.region));
        write_private(&path, &content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        ui::success(&format!("Wrote {}", path.display()));
    }
    if !ctx.quiet {
        ui::dim("These files contain API secrets; keep them out of version control.");
    }
    Ok(())
}

/// Render one region's env file from the recorded outputs
pub fn render(region: &RegionNames, consumer_group: &str, export: &Export) -> Result<String> {
    let bootstrap = lookup(export, &region.cluster, fields::BOOTSTRAP_ENDPOINT)?;
    let vars = [
        (
            "BOOTSTRAP_SERVER",
            bootstrap.strip_prefix("SASL_SSL://").unwrap_or(bootstrap),
        ),
        ("SASL_USERNAME", lookup(export, &region.kafka_key, fields::KEY)?),
        ("SASL_PASSWORD", lookup(export, &region.kafka_key, fields::SECRET)?),
        ("TOPIC_NAME", lookup(export, &region.topic, fields::TOPIC_NAME)?),
        ("SCHEMA_REGISTRY_URL", lookup(export, &region.registry, fields::ENDPOINT)?),
        ("SCHEMA_REGISTRY_API_KEY", lookup(export, &region.registry_key, fields::KEY)?),
        (
            "SCHEMA_REGISTRY_API_SECRET",
            lookup(export, &region.registry_key, fields::SECRET)?,
        ),
        ("CONSUMER_GROUP", consumer_group),
    ];

    Ok(vars
        .iter()
        .map(|(key, value)| format!("{key}={value}\n"))
        .collect())
}

fn lookup<'a>(export: &'a Export, resource: &str, field: &str) -> Result<&'a str> {
    match export.get(resource).and_then(|fields| fields.get(field)) {
        Some(value) => Ok(value.as_str()),
        None => bail!("{resource} has no recorded {field}; run 'drtopo apply' until it completes"),
    }
}
