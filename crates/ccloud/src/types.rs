//! Request and response payloads
//!
//! Only the fields this crate reads or writes are modelled; everything else
//! the API returns is ignored.

use serde::{Deserialize, Serialize};

/// Reference to another object by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Box<ObjectRef>>,
}

impl ObjectRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            environment: None,
        }
    }

    /// Reference scoped to an environment
    pub fn in_environment(id: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            environment: Some(Box::new(Self::new(environment))),
        }
    }
}

// =============================================================================
// Environments
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct NewEnvironment {
    pub display_name: String,
    pub stream_governance_config: GovernanceConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct GovernanceConfig {
    pub package: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Environment {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
}

// =============================================================================
// Clusters
// =============================================================================

/// Dedicated cluster sizing and placement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSpec {
    pub display_name: String,
    pub environment: String,
    pub cloud: String,
    pub region: String,
    pub availability: String,
    pub cku: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewCluster<'a> {
    pub spec: NewClusterSpec<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewClusterSpec<'a> {
    pub display_name: &'a str,
    pub availability: &'a str,
    pub cloud: &'a str,
    pub region: &'a str,
    pub config: DedicatedConfig,
    pub environment: ObjectRef,
}

#[derive(Debug, Serialize)]
pub(crate) struct DedicatedConfig {
    pub kind: &'static str,
    pub cku: u32,
}

impl<'a> From<&'a ClusterSpec> for NewCluster<'a> {
    fn from(spec: &'a ClusterSpec) -> Self {
        Self {
            spec: NewClusterSpec {
                display_name: &spec.display_name,
                availability: &spec.availability,
                cloud: &spec.cloud,
                region: &spec.region,
                config: DedicatedConfig {
                    kind: "Dedicated",
                    cku: spec.cku,
                },
                environment: ObjectRef::new(spec.environment.clone()),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cluster {
    pub id: String,
    #[serde(default)]
    pub spec: ClusterEndpoints,
    #[serde(default)]
    pub status: ClusterStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClusterEndpoints {
    #[serde(default)]
    pub kafka_bootstrap_endpoint: String,
    #[serde(default)]
    pub http_endpoint: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClusterStatus {
    #[serde(default)]
    pub phase: String,
}

impl Cluster {
    /// Provisioning finished; the cluster accepts admin requests
    pub fn is_provisioned(&self) -> bool {
        self.status.phase == "PROVISIONED"
    }
}

// =============================================================================
// Schema registry
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaRegistry {
    pub id: String,
    #[serde(default)]
    pub spec: RegistryEndpoints,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryEndpoints {
    #[serde(default)]
    pub http_endpoint: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct List<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

// =============================================================================
// IAM
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct NewServiceAccount {
    pub display_name: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewRoleBinding {
    pub principal: String,
    pub role_name: String,
    pub crn_pattern: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleBinding {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewApiKey {
    pub spec: NewApiKeySpec,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewApiKeySpec {
    pub display_name: String,
    pub owner: ObjectRef,
    pub resource: ObjectRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub spec: ApiKeySecret,
}

#[derive(Clone, Deserialize)]
pub struct ApiKeySecret {
    #[serde(default)]
    pub secret: String,
}

impl std::fmt::Debug for ApiKeySecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKeySecret { secret: \"<redacted>\" }")
    }
}

// =============================================================================
// Kafka REST
// =============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct NewTopic<'a> {
    pub topic_name: &'a str,
    pub partitions_count: u32,
}

/// A `name = value` entry in a link's configuration list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub name: String,
    pub value: String,
}

impl ConfigEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct NewLink<'a> {
    pub remote_cluster_id: &'a str,
    /// Both halves of a bidirectional link share one id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_link_id: Option<&'a str>,
    pub configs: Vec<ConfigEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterLink {
    pub link_name: String,
    #[serde(default)]
    pub cluster_link_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewMirror<'a> {
    pub source_topic_name: &'a str,
    pub mirror_topic_name: &'a str,
}
