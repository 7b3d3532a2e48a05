use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "drtopo")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Provision a bidirectional disaster-recovery Kafka topology", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Topology config file [default: ./drtopo.toml]
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<String>,

    /// Deployment state file [default: ~/.local/state/drtopo/<prefix>.toml]
    #[arg(long, global = true, value_name = "FILE")]
    pub state: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a starter config file
    Init(InitArgs),

    /// Show what apply (or destroy) would do, in order
    Plan(PlanArgs),

    /// Create everything that is missing
    Apply(ApplyArgs),

    /// Tear down everything recorded in the state, dependents first
    Destroy(DestroyArgs),

    /// Show recorded resources and link status
    Status,

    /// Print recorded outputs (secrets redacted unless --reveal)
    Outputs(OutputsArgs),

    /// Write per-region client credential files
    Env(EnvArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct InitArgs {
    /// Organization ID to put in the config
    #[arg(long, value_name = "ID")]
    pub org: Option<String>,

    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Show the teardown order instead
    #[arg(long)]
    pub destroy: bool,
}

/// Platform API credentials
#[derive(Args, Clone)]
pub struct CredentialArgs {
    /// Cloud API key
    #[arg(long, env = "CONFLUENT_CLOUD_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Cloud API secret
    #[arg(long, env = "CONFLUENT_CLOUD_API_SECRET", hide_env_values = true)]
    pub api_secret: Option<String>,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Maximum concurrent platform operations
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Destroy and recreate resources whose inputs changed
    #[arg(long)]
    pub replace_changed: bool,

    #[command(flatten)]
    pub credentials: CredentialArgs,
}

#[derive(Args)]
pub struct DestroyArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Maximum concurrent platform operations
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    #[command(flatten)]
    pub credentials: CredentialArgs,
}

#[derive(Args)]
pub struct OutputsArgs {
    /// Show secret values
    #[arg(long)]
    pub reveal: bool,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct EnvArgs {
    /// Directory to write <region>.env files into
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Only write the file for this region
    #[arg(long, value_name = "NAME")]
    pub region: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "drtopo", "apply", "--yes", "-j", "4", "--config", "dr.toml", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config.as_deref(), Some("dr.toml"));
        match cli.command {
            Command::Apply(args) => {
                assert!(args.yes);
                assert_eq!(args.jobs, Some(4));
                assert!(!args.replace_changed);
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn test_env_dir_defaults_to_cwd() {
        let cli = Cli::try_parse_from(["drtopo", "env"]).unwrap();
        match cli.command {
            Command::Env(args) => assert_eq!(args.dir, PathBuf::from(".")),
            _ => panic!("expected env"),
        }
    }
}
