//! Resource descriptors
//!
//! A [`ResourceDescriptor`] declares one provisionable entity: its kind, its
//! inputs (literals or references to another resource's outputs), extra
//! ordering dependencies, and how readiness is established after the create
//! call returns.

use crate::outputs::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Kinds of resources the engine knows how to order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Environment,
    Cluster,
    ServiceAccount,
    RoleBinding,
    ApiKey,
    RegistryInstance,
    ClusterLink,
    Topic,
    MirrorTopic,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 9] = [
        Self::Environment,
        Self::Cluster,
        Self::ServiceAccount,
        Self::RoleBinding,
        Self::ApiKey,
        Self::RegistryInstance,
        Self::ClusterLink,
        Self::Topic,
        Self::MirrorTopic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Environment => "environment",
            Self::Cluster => "cluster",
            Self::ServiceAccount => "service_account",
            Self::RoleBinding => "role_binding",
            Self::ApiKey => "api_key",
            Self::RegistryInstance => "registry_instance",
            Self::ClusterLink => "cluster_link",
            Self::Topic => "topic",
            Self::MirrorTopic => "mirror_topic",
        }
    }

    /// Readiness used when a descriptor does not set one explicitly.
    ///
    /// Registry instances are provisioned asynchronously by the platform and
    /// are never queryable the instant their environment exists.
    pub fn default_readiness(&self) -> Readiness {
        match self {
            Self::RegistryInstance => Readiness::PollAfterDelay,
            _ => Readiness::Immediate,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the engine decides a created resource is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    /// Ready as soon as the create call returns
    Immediate,
    /// Wait a settle period, then probe with bounded backoff
    PollAfterDelay,
}

/// An input parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputValue {
    /// A fixed value
    Literal(String),
    /// The output `field` of resource `resource`, available once it is Ready
    Output { resource: String, field: String },
}

impl InputValue {
    /// The resource this input depends on, if any
    pub fn referenced_resource(&self) -> Option<&str> {
        match self {
            Self::Literal(_) => None,
            Self::Output { resource, .. } => Some(resource),
        }
    }
}

/// Declaration of a single provisionable resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// Unique key of the resource within a graph
    pub name: String,
    pub kind: ResourceKind,
    pub inputs: BTreeMap<String, InputValue>,
    /// Ordering-only dependencies, in addition to those implied by inputs
    pub depends_on: BTreeSet<String>,
    pub readiness: Readiness,
    /// Link pair a mirror topic replicates through
    pub via_link: Option<String>,
}

impl ResourceDescriptor {
    pub fn new(name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            inputs: BTreeMap::new(),
            depends_on: BTreeSet::new(),
            readiness: kind.default_readiness(),
            via_link: None,
        }
    }

    /// Add a literal input
    pub fn input(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs
            .insert(key.into(), InputValue::Literal(value.into()));
        self
    }

    /// Add an input taken from another resource's output
    pub fn input_from(
        mut self,
        key: impl Into<String>,
        resource: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        self.inputs.insert(
            key.into(),
            InputValue::Output {
                resource: resource.into(),
                field: field.into(),
            },
        );
        self
    }

    /// Add an ordering-only dependency
    pub fn depends_on(mut self, resource: impl Into<String>) -> Self {
        self.depends_on.insert(resource.into());
        self
    }

    pub fn readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    /// Route a mirror topic through a declared link pair
    pub fn via_link(mut self, pair: impl Into<String>) -> Self {
        self.via_link = Some(pair.into());
        self
    }

    /// Every resource this descriptor depends on: declared plus referenced.
    pub fn dependencies(&self) -> BTreeSet<&str> {
        self.depends_on
            .iter()
            .map(String::as_str)
            .chain(
                self.inputs
                    .values()
                    .filter_map(InputValue::referenced_resource),
            )
            .collect()
    }
}

/// Inputs with every reference replaced by the referenced value.
///
/// Built by the scheduler once all dependencies are Ready. Sensitivity of
/// referenced outputs carries over, so logging an `Inputs` never leaks secrets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inputs {
    values: BTreeMap<String, Value>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(Value::expose)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Get a required input or fail with an invalid-request platform error
    pub fn require(&self, key: &str) -> std::result::Result<&str, crate::PlatformError> {
        self.get(key)
            .ok_or_else(|| crate::PlatformError::invalid(format!("missing input {key}")))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Stable digest of the resolved inputs, used to detect changed inputs
    /// across runs.
    pub fn fingerprint(&self, kind: ResourceKind) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(kind.as_str().as_bytes());
        for (key, value) in &self.values {
            hasher.update(&(key.len() as u64).to_le_bytes());
            hasher.update(key.as_bytes());
            hasher.update(&(value.expose().len() as u64).to_le_bytes());
            hasher.update(value.expose().as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependencies_include_references() {
        let desc = ResourceDescriptor::new("cluster-east", ResourceKind::Cluster)
            .input("cku", "1")
            .input_from("environment", "env-east", "id")
            .depends_on("sa-east");

        let deps: Vec<_> = desc.dependencies().into_iter().collect();
        assert_eq!(deps, vec!["env-east", "sa-east"]);
    }

    #[test]
    fn test_registry_defaults_to_polling() {
        let desc = ResourceDescriptor::new("sr-east", ResourceKind::RegistryInstance);
        assert_eq!(desc.readiness, Readiness::PollAfterDelay);

        let desc = ResourceDescriptor::new("env-east", ResourceKind::Environment);
        assert_eq!(desc.readiness, Readiness::Immediate);
    }

    #[test]
    fn test_fingerprint_tracks_values() {
        let mut a = Inputs::new();
        a.insert("partitions", Value::plain("6"));
        let mut b = Inputs::new();
        b.insert("partitions", Value::plain("12"));

        assert_eq!(
            a.fingerprint(ResourceKind::Topic),
            a.clone().fingerprint(ResourceKind::Topic)
        );
        assert_ne!(
            a.fingerprint(ResourceKind::Topic),
            b.fingerprint(ResourceKind::Topic)
        );
        assert_ne!(
            a.fingerprint(ResourceKind::Topic),
            a.fingerprint(ResourceKind::MirrorTopic)
        );
    }

    #[test]
    fn test_inputs_debug_hides_secrets() {
        let mut inputs = Inputs::new();
        inputs.insert("api_secret", Value::secret("hunter2"));
        assert!(!format!("{inputs:?}").contains("hunter2"));
        assert_eq!(inputs.get("api_secret"), Some("hunter2"));
    }
}
