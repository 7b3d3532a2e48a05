//! Persisted deployment state
//!
//! The engine's ledger (what exists, with the inputs it was created from and
//! every output it produced) is carried between runs in a TOML file. It holds
//! API secrets in the clear, so the file is only readable by its owner.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use provision::Ledger;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentState {
    /// Prefix of the topology this state belongs to
    pub prefix: String,

    /// Last time the state was written
    pub last_updated: DateTime<Utc>,

    #[serde(default)]
    pub ledger: Ledger,
}

impl DeploymentState {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            last_updated: Utc::now(),
            ledger: Ledger::new(),
        }
    }

    /// Get the state directory path (~/.local/state/drtopo)
    pub fn state_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".local").join("state").join("drtopo"))
    }

    /// State file for `prefix`, unless `--state` names one
    pub fn path(explicit: Option<&str>, prefix: &str) -> Result<PathBuf> {
        match explicit {
            Some(path) => Ok(PathBuf::from(shellexpand::tilde(path).as_ref())),
            None => Ok(Self::state_dir()?.join(format!("{prefix}.toml"))),
        }
    }

    /// Load state from disk, or start empty if the file doesn't exist
    pub fn load(path: &Path, prefix: &str) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file {} does not exist, starting empty", path.display());
            return Ok(Self::new(prefix));
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        let state: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        if state.prefix != prefix {
            anyhow::bail!(
                "State file {} belongs to prefix {:?}, but the config uses {:?}",
                path.display(),
                state.prefix,
                prefix
            );
        }

        log::debug!(
            "Loaded state from {} ({} resources)",
            path.display(),
            state.ledger.len()
        );
        Ok(state)
    }

    /// Stamp and write the state, or remove the file once nothing is left
    pub fn save(&mut self, path: &Path) -> Result<()> {
        if self.ledger.is_empty() {
            if path.exists() {
                fs::remove_file(path)
                    .with_context(|| format!("Failed to remove state file: {}", path.display()))?;
                log::debug!("Removed empty state file {}", path.display());
            }
            return Ok(());
        }

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        self.last_updated = Utc::now();
        let content = toml::to_string_pretty(&*self).context("Failed to serialize state to TOML")?;
        write_private(path, &content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }
}

#[cfg(unix)]
pub fn write_private(path: &Path, content: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies to newly created files
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(content.as_bytes())
}

#[cfg(not(unix))]
pub fn write_private(path: &Path, content: &str) -> std::io::Result<()> {
    fs::write(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use provision::{AppliedResource, LinkPairState, LinkPhase, Output, ResourceKind};
    use tempfile::TempDir;

    fn sample_ledger() -> Ledger {
        let mut ledger = Ledger::new();
        ledger.resources.insert(
            "dr-east-env".into(),
            AppliedResource {
                kind: ResourceKind::Environment,
                fingerprint: "abc".into(),
                pending: false,
                outputs: vec![Output::plain("id", "env-1")],
            },
        );
        ledger.resources.insert(
            "dr-east-app-kafka-key".into(),
            AppliedResource {
                kind: ResourceKind::ApiKey,
                fingerprint: "def".into(),
                pending: false,
                outputs: vec![Output::plain("key", "KEY"), Output::secret("secret", "S3CR3T")],
            },
        );
        ledger.resources.insert(
            "dr-east-sr".into(),
            AppliedResource {
                kind: ResourceKind::RegistryInstance,
                fingerprint: "ghi".into(),
                pending: true,
                outputs: Vec::new(),
            },
        );
        ledger.links.push(LinkPairState {
            name: "bidirectional-link".into(),
            phase: LinkPhase::ForwardEstablished,
            forward_link_id: Some("link-1".into()),
            reverse_link_id: None,
        });
        ledger
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let state = DeploymentState::load(&dir.path().join("dr.toml"), "dr").unwrap();
        assert!(state.ledger.is_empty());
        assert_eq!(state.prefix, "dr");
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("dr.toml");

        let mut state = DeploymentState::new("dr");
        state.ledger = sample_ledger();
        state.save(&path).unwrap();

        let loaded = DeploymentState::load(&path, "dr").unwrap();
        assert_eq!(loaded.ledger, state.ledger);
        let secret = &loaded.ledger.resources["dr-east-app-kafka-key"].outputs[1];
        assert!(secret.value.is_sensitive());
        assert!(loaded.ledger.resources["dr-east-sr"].pending);
    }

    #[cfg(unix)]
    #[test]
    fn test_state_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dr.toml");
        fs::write(&path, "").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let mut state = DeploymentState::new("dr");
        state.ledger = sample_ledger();
        state.save(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_empty_ledger_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dr.toml");

        let mut state = DeploymentState::new("dr");
        state.ledger = sample_ledger();
        state.save(&path).unwrap();
        assert!(path.exists());

        state.ledger = Ledger::new();
        state.save(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_prefix_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.toml");

        let mut state = DeploymentState::new("dr");
        state.ledger = sample_ledger();
        state.save(&path).unwrap();

        let err = DeploymentState::load(&path, "prod").unwrap_err();
        assert!(err.to_string().contains("prefix"));
    }

    #[test]
    fn test_default_path_uses_prefix() {
        let path = DeploymentState::path(None, "dr").unwrap();
        assert!(path.ends_with(".local/state/drtopo/dr.toml"));
        let path = DeploymentState::path(Some("/tmp/x.toml"), "dr").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/x.toml"));
    }
}
