use crate::Context;
use crate::cli::InitArgs;
use crate::config::Config;
use crate::ui;
use anyhow::{Context as _, Result, bail};
use dialoguer::Input;
use std::fs;

pub fn run(ctx: &Context, args: InitArgs) -> Result<()> {
    let path = Config::path(ctx.config.as_deref());
    if path.exists() && !args.force {
        bail!(
            "Config file already exists: {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let organization = match args.org {
        Some(org) => org,
        None if console::user_attended() => Input::<String>::new()
            .with_prompt("Organization ID")
            .interact_text()
            .context("Failed to read organization ID")?,
        None => bail!("Pass --org when running unattended"),
    };

    let content = Config::template(&organization)?;
    // The template must load as-is
    Config::parse(&content).context("Generated config does not validate")?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }
    fs::write(&path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;

    ui::success(&format!("Wrote {}", path.display()));
    if !ctx.quiet {
        ui::dim("Review the regions and names, then run 'drtopo plan'.");
    }
    Ok(())
}
