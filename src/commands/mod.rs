pub mod apply;
pub mod destroy;
pub mod env;
pub mod init;
pub mod outputs;
pub mod plan;
pub mod status;

use crate::Context;
use crate::cli::CredentialArgs;
use crate::config::Config;
use crate::platform::CloudPlatform;
use crate::state::DeploymentState;
use crate::topology;
use crate::ui;
use anyhow::{Context as _, Result, bail};
use ccloud::{CloudClient, Credentials};
use dialoguer::Confirm;
use provision::{Graph, Outcome, RunReport, RunStatus};
use std::path::PathBuf;

/// Config, graph and recorded state of one deployment
pub struct Deployment {
    pub config_path: PathBuf,
    pub config: Config,
    pub graph: Graph,
    pub state_path: PathBuf,
    pub state: DeploymentState,
}

impl Deployment {
    pub fn load(ctx: &Context) -> Result<Self> {
        let config_path = Config::path(ctx.config.as_deref());
        if !config_path.exists() {
            bail!(
                "Config file not found: {}\nRun 'drtopo init' to create one.",
                config_path.display()
            );
        }
        let config = Config::load(&config_path)?;
        let graph = topology::build(&config)?;

        let prefix = &config.topology.prefix;
        let state_path = DeploymentState::path(ctx.state.as_deref(), prefix)?;
        let state = DeploymentState::load(&state_path, prefix)?;

        Ok(Self {
            config_path,
            config,
            graph,
            state_path,
            state,
        })
    }

    /// Record a run's ledger. Called whatever the run's status.
    pub fn record(&mut self, outcome: &Outcome) -> Result<()> {
        self.state.ledger = outcome.ledger.clone();
        self.state.save(&self.state_path)
    }

    pub fn print_location(&self) {
        ui::kv("Config", &self.config_path.display().to_string());
        ui::kv("State", &self.state_path.display().to_string());
        ui::kv("Organization", &self.config.platform.organization_id);
    }
}

/// Platform adapter authenticated with the given credentials
pub fn connect(config: &Config, credentials: &CredentialArgs) -> Result<CloudPlatform> {
    let key = credentials
        .api_key
        .as_deref()
        .context("No API key: pass --api-key or set CONFLUENT_CLOUD_API_KEY")?;
    let secret = credentials
        .api_secret
        .as_deref()
        .context("No API secret: pass --api-secret or set CONFLUENT_CLOUD_API_SECRET")?;

    let client = CloudClient::with_api_base(&config.platform.api_base, Credentials::new(key, secret));
    Ok(CloudPlatform::new(client, &config.platform.organization_id))
}

/// Ask before touching the platform. Unattended runs must pass `--yes`.
pub fn confirm(prompt: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    if !console::user_attended() {
        bail!("Refusing to run unattended without --yes");
    }
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

/// Print the three-way partition of a run plus link status
pub fn print_report(ctx: &Context, outcome: &Outcome) {
    let report = &outcome.report;
    let summary = report.summary();

    ui::section("Result");
    ui::kv("Status", &ui::run_status(report.status()).to_string());
    if let Some(cause) = &report.aborted {
        ui::error(&format!("Stopped dispatching: {cause}"));
    }
    ui::kv("Ready", &report.ready().len().to_string());
    ui::kv("Failed", &summary.failed.to_string());
    ui::kv("Blocked", &summary.blocked.to_string());
    if summary.cancelled > 0 {
        ui::kv("Cancelled", &summary.cancelled.to_string());
    }
    ui::kv(
        "Changes",
        &format!(
            "{} created, {} replaced, {} destroyed, {} unchanged",
            summary.created, summary.replaced, summary.destroyed, summary.unchanged
        ),
    );

    let failed = report.failed();
    if !failed.is_empty() {
        ui::section("Failed");
        for (name, cause) in failed {
            ui::error(&format!("{name}: {cause}"));
        }
    }

    let blocked = report.blocked();
    if !blocked.is_empty() {
        ui::section("Blocked");
        for (name, by) in blocked {
            ui::dim(&format!("{name} (waiting on {by})"));
        }
    }

    if !report.links.is_empty() {
        ui::section("Links");
        for link in &report.links {
            ui::kv(&link.name, &ui::link_phase(link.phase).to_string());
        }
    }

    for partial in report.partial_links() {
        ui::warn(&partial.to_string());
    }

    if !report.orphaned.is_empty() {
        ui::section("Orphaned");
        for name in &report.orphaned {
            ui::warn(&format!(
                "{name} is recorded but not in the config; restore it there or remove it by hand"
            ));
        }
    }

    let retryable = report.retryable();
    if !retryable.is_empty() && !ctx.quiet {
        println!();
        ui::info(&format!(
            "{} resource(s) may succeed on a re-run: {}",
            retryable.len(),
            retryable.join(", ")
        ));
    }
}

/// Turn a finished run into the process result
pub fn finish(operation: &str, report: &RunReport) -> Result<()> {
    match report.status() {
        RunStatus::Complete => {
            println!();
            ui::success(&format!("{operation} complete"));
            Ok(())
        }
        RunStatus::Cancelled => bail!("{operation} interrupted; state was saved, re-run to continue"),
        RunStatus::PartialLink => {
            bail!("{operation} left a link pair half-established; see the warnings above")
        }
        RunStatus::Partial => bail!("{operation} did not complete; see the report above"),
        RunStatus::Aborted => match &report.aborted {
            Some(cause) => bail!("{operation} aborted: {cause}; state was saved"),
            None => bail!("{operation} aborted; state was saved"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provision::{Error, Operation};

    fn report(operation: Operation) -> RunReport {
        RunReport {
            operation,
            entries: Vec::new(),
            dispatch_order: Vec::new(),
            links: Vec::new(),
            aborted: None,
            orphaned: Vec::new(),
        }
    }

    #[test]
    fn test_finish_complete_is_ok() {
        assert!(finish("Apply", &report(Operation::Apply)).is_ok());
    }

    #[test]
    fn test_finish_aborted_names_cause() {
        let mut report = report(Operation::Apply);
        report.aborted = Some(Error::OutputNotFound {
            resource: "env-a".into(),
            field: "id".into(),
        });
        let err = finish("Apply", &report).unwrap_err().to_string();
        assert!(err.starts_with("Apply aborted"));
        assert!(err.contains("env-a"));
        assert!(err.contains("state was saved"));
    }

    #[test]
    fn test_finish_destroy_with_orphans_fails() {
        let mut report = report(Operation::Destroy);
        report.orphaned.push("env-old".into());
        assert!(finish("Destroy", &report).is_err());
    }
}
