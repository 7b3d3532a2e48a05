//! Deployment configuration (`drtopo.toml`)

use anyhow::{Context, Result};
use provision::{ChangePolicy, GateConfig, GatePolicy, ResourceKind, ScheduleOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name, looked up in the current directory
pub const DEFAULT_CONFIG: &str = "drtopo.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("platform.organization_id is required")]
    MissingOrganization,

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("primary and secondary regions must have different names (both are {0:?})")]
    SameRegionName(String),

    #[error("{field} must be at least 1")]
    Zero { field: &'static str },

    #[error("{section}.backoff_factor must be at least 1.0")]
    Backoff { section: &'static str },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub topology: TopologyConfig,
    /// Schema registry readiness polling
    #[serde(default)]
    pub registry: GateSettings,
    /// Dedicated cluster readiness polling
    #[serde(default)]
    pub cluster: GateSettings,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlatformConfig {
    pub organization_id: String,
    pub api_base: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            organization_id: String::new(),
            api_base: default_api_base(),
        }
    }
}

fn default_api_base() -> String {
    ccloud::API_BASE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TopologyConfig {
    /// Prefix of every logical name and display name
    pub prefix: String,
    pub cloud: String,
    /// Stream governance package of both environments
    pub governance: String,
    pub availability: String,
    pub cku: u32,
    pub partitions: u32,
    /// Name shared by both halves of the cluster link
    pub link_name: String,
    /// Base topic name; each region produces to `<region>-<topic>`
    pub topic: String,
    pub consumer_group: String,
    pub primary: RegionConfig,
    pub secondary: RegionConfig,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            prefix: "dr".to_string(),
            cloud: "AWS".to_string(),
            governance: "ESSENTIALS".to_string(),
            availability: "SINGLE_ZONE".to_string(),
            cku: 1,
            partitions: 6,
            link_name: "bidirectional-link".to_string(),
            topic: "orders".to_string(),
            consumer_group: "demo-dr-consumer-group".to_string(),
            primary: RegionConfig {
                name: "east".to_string(),
                region: "us-east-1".to_string(),
            },
            secondary: RegionConfig {
                name: "west".to_string(),
                region: "us-west-2".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionConfig {
    /// Short name used in logical names and env file names
    pub name: String,
    /// Cloud provider region
    pub region: String,
}

/// Settle-then-poll timings in seconds; unset fields keep the per-kind default
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GateSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settle_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_delay_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_probes: Option<u32>,
}

/// Registry polling defaults: 30 s settle, then up to 10 probes
pub fn registry_gate_defaults() -> GateConfig {
    GateConfig::default()
}

/// Dedicated clusters take tens of minutes to provision
pub fn cluster_gate_defaults() -> GateConfig {
    GateConfig {
        settle: Duration::from_secs(120),
        initial_delay: Duration::from_secs(30),
        backoff_factor: 1.5,
        max_delay: Duration::from_secs(120),
        max_probes: 60,
    }
}

impl GateSettings {
    /// Every field set from `gate`
    pub fn from_gate(gate: &GateConfig) -> Self {
        Self {
            settle_secs: Some(gate.settle.as_secs()),
            initial_delay_secs: Some(gate.initial_delay.as_secs()),
            backoff_factor: Some(gate.backoff_factor),
            max_delay_secs: Some(gate.max_delay.as_secs()),
            max_probes: Some(gate.max_probes),
        }
    }

    /// Overlay the configured fields on `defaults`
    pub fn resolve(&self, defaults: GateConfig) -> GateConfig {
        GateConfig {
            settle: self
                .settle_secs
                .map_or(defaults.settle, Duration::from_secs),
            initial_delay: self
                .initial_delay_secs
                .map_or(defaults.initial_delay, Duration::from_secs),
            backoff_factor: self.backoff_factor.unwrap_or(defaults.backoff_factor),
            max_delay: self
                .max_delay_secs
                .map_or(defaults.max_delay, Duration::from_secs),
            max_probes: self.max_probes.unwrap_or(defaults.max_probes),
        }
    }

    fn validate(&self, section: &'static str, probes_field: &'static str) -> Result<(), ConfigError> {
        if self.max_probes == Some(0) {
            return Err(ConfigError::Zero { field: probes_field });
        }
        if self.backoff_factor.is_some_and(|f| !f.is_finite() || f < 1.0) {
            return Err(ConfigError::Backoff { section });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnChange {
    #[default]
    Refuse,
    Replace,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum in-flight platform calls (unset: no limit)
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub on_change: OnChange,
}

impl Config {
    /// Resolve the config path: explicit `--config`, else `./drtopo.toml`.
    pub fn path(explicit: Option<&str>) -> PathBuf {
        match explicit {
            Some(path) => PathBuf::from(shellexpand::tilde(path).as_ref()),
            None => PathBuf::from(DEFAULT_CONFIG),
        }
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.platform.organization_id.trim().is_empty() {
            return Err(ConfigError::MissingOrganization);
        }
        let topology = &self.topology;
        for (field, value) in [
            ("topology.prefix", &topology.prefix),
            ("topology.link_name", &topology.link_name),
            ("topology.topic", &topology.topic),
            ("topology.primary.name", &topology.primary.name),
            ("topology.secondary.name", &topology.secondary.name),
            ("topology.primary.region", &topology.primary.region),
            ("topology.secondary.region", &topology.secondary.region),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Empty { field });
            }
        }
        if topology.primary.name == topology.secondary.name {
            return Err(ConfigError::SameRegionName(topology.primary.name.clone()));
        }
        if topology.partitions == 0 {
            return Err(ConfigError::Zero {
                field: "topology.partitions",
            });
        }
        if topology.cku == 0 {
            return Err(ConfigError::Zero {
                field: "topology.cku",
            });
        }
        if self.engine.max_concurrency == Some(0) {
            return Err(ConfigError::Zero {
                field: "engine.max_concurrency",
            });
        }
        self.registry.validate("registry", "registry.max_probes")?;
        self.cluster.validate("cluster", "cluster.max_probes")?;
        Ok(())
    }

    /// Engine options, with command-line overrides applied
    pub fn schedule_options(&self, jobs: Option<usize>, replace_changed: bool) -> ScheduleOptions {
        let on_change = if replace_changed || self.engine.on_change == OnChange::Replace {
            ChangePolicy::Replace
        } else {
            ChangePolicy::Refuse
        };
        ScheduleOptions {
            max_concurrency: jobs.or(self.engine.max_concurrency),
            gates: GatePolicy::default()
                .with_override(
                    ResourceKind::RegistryInstance,
                    self.registry.resolve(registry_gate_defaults()),
                )
                .with_override(
                    ResourceKind::Cluster,
                    self.cluster.resolve(cluster_gate_defaults()),
                ),
            on_change,
        }
    }

    /// Starter config written by `drtopo init`
    pub fn template(organization_id: &str) -> Result<String> {
        let config = Self {
            platform: PlatformConfig {
                organization_id: organization_id.to_string(),
                ..PlatformConfig::default()
            },
            registry: GateSettings::from_gate(&registry_gate_defaults()),
            cluster: GateSettings::from_gate(&cluster_gate_defaults()),
            ..Self::default()
        };
        toml::to_string_pretty(&config).context("Failed to serialize config template")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::parse(
            r#"
[platform]
organization_id = "org-123"
"#,
        )
        .unwrap();

        assert_eq!(config.platform.api_base, ccloud::API_BASE);
        assert_eq!(config.topology.primary.name, "east");
        assert_eq!(config.topology.secondary.region, "us-west-2");
        assert_eq!(config.registry, GateSettings::default());
        let options = config.schedule_options(None, false);
        assert_eq!(
            options.gates.for_kind(ResourceKind::RegistryInstance).settle,
            Duration::from_secs(30)
        );
        assert_eq!(options.gates.for_kind(ResourceKind::Cluster).max_probes, 60);
        assert_eq!(config.engine.on_change, OnChange::Refuse);
    }

    #[test]
    fn test_missing_organization_is_rejected() {
        let err = Config::parse("[topology]\nprefix = \"dr\"\n").unwrap_err();
        assert!(err.to_string().contains("organization_id"));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = Config::parse(
            r#"
[platform]
organization_id = "org-123"
regoin = "typo"
"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_same_region_names_rejected() {
        let mut config = Config::default();
        config.platform.organization_id = "org-1".into();
        config.topology.secondary.name = "east".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SameRegionName(_))
        ));
    }

    #[test]
    fn test_zero_probes_rejected() {
        let mut config = Config::default();
        config.platform.organization_id = "org-1".into();
        config.registry.max_probes = Some(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero {
                field: "registry.max_probes"
            })
        ));
    }

    #[test]
    fn test_non_finite_backoff_rejected() {
        let config = Config::parse(
            r#"
[platform]
organization_id = "org-1"

[cluster]
backoff_factor = inf
"#,
        );
        assert!(config.is_err());
    }

    #[test]
    fn test_schedule_options_overrides() {
        let mut config = Config::default();
        config.engine.max_concurrency = Some(4);
        config.registry.settle_secs = Some(45);

        let options = config.schedule_options(None, false);
        assert_eq!(options.max_concurrency, Some(4));
        assert_eq!(options.on_change, ChangePolicy::Refuse);
        assert_eq!(
            options.gates.for_kind(ResourceKind::RegistryInstance).settle,
            Duration::from_secs(45)
        );
        // Unset fields keep the kind's default
        assert_eq!(
            options.gates.for_kind(ResourceKind::RegistryInstance).max_probes,
            10
        );

        let options = config.schedule_options(Some(2), true);
        assert_eq!(options.max_concurrency, Some(2));
        assert_eq!(options.on_change, ChangePolicy::Replace);
    }

    #[test]
    fn test_template_round_trips() {
        let template = Config::template("org-xyz").unwrap();
        let config = Config::parse(&template).unwrap();
        assert_eq!(config.platform.organization_id, "org-xyz");
        assert_eq!(config.topology.partitions, 6);
        assert_eq!(config.cluster.settle_secs, Some(120));
    }

    #[test]
    fn test_partial_topology_keeps_defaults() {
        let config = Config::parse(
            r#"
[platform]
organization_id = "org-123"

[topology]
prefix = "acme"
partitions = 12

[registry]
settle_secs = 10
"#,
        )
        .unwrap();
        assert_eq!(config.topology.prefix, "acme");
        assert_eq!(config.topology.link_name, "bidirectional-link");
        assert_eq!(config.registry.settle_secs, Some(10));
        assert_eq!(config.registry.max_probes, None);
    }

    #[test]
    fn test_explicit_path_expands_tilde() {
        let path = Config::path(Some("~/drtopo.toml"));
        assert!(!path.to_string_lossy().starts_with('~'));
        assert_eq!(Config::path(None), PathBuf::from(DEFAULT_CONFIG));
    }
}
