//! [`provision::Platform`] over the managed streaming platform's APIs.
//!
//! Each resource kind maps to one control-plane or Kafka REST call. Outputs
//! only known once a resource is queryable (cluster endpoints, registry id)
//! are returned by `probe`, never by `create`, so the registry sees every
//! field exactly once.

use ccloud::{
    CloudClient, ClusterSpec, ConnectionMode, Credentials, KafkaRestClient, LinkSpec,
    NewRoleBinding, cluster_crn, environment_crn, registry_crn,
};
use provision::link::{
    CONNECTION_MODE, FORWARD_LINK_ID, LINK_ID, LINK_NAME, LOCAL_API_KEY, LOCAL_API_SECRET,
    LOCAL_CLUSTER_ID, LOCAL_REST_ENDPOINT, REMOTE_API_KEY, REMOTE_API_SECRET, REMOTE_BOOTSTRAP,
    REMOTE_CLUSTER_ID,
};
use provision::{
    CreateRequest, DestroyRequest, ErrorCategory, Inputs, Output, Platform, PlatformError, Probe,
    ResourceKind,
};

/// Input keys the adapter reads
pub mod keys {
    pub const DISPLAY_NAME: &str = "display_name";
    pub const DESCRIPTION: &str = "description";
    pub const GOVERNANCE: &str = "governance";
    pub const ENVIRONMENT: &str = "environment";
    pub const CLOUD: &str = "cloud";
    pub const REGION: &str = "region";
    pub const AVAILABILITY: &str = "availability";
    pub const CKU: &str = "cku";

    pub const PRINCIPAL: &str = "principal";
    pub const ROLE_NAME: &str = "role_name";
    pub const CLUSTER: &str = "cluster";
    pub const REGISTRY: &str = "registry";
    pub const TOPIC: &str = "topic";
    pub const GROUP: &str = "group";
    pub const SUBJECT: &str = "subject";

    pub const OWNER: &str = "owner";
    pub const RESOURCE: &str = "resource";

    // Topics and mirrors talk to the cluster's REST endpoint
    pub const CLUSTER_ID: &str = "cluster_id";
    pub const REST_ENDPOINT: &str = "rest_endpoint";
    pub const API_KEY: &str = "api_key";
    pub const API_SECRET: &str = "api_secret";
    pub const TOPIC_NAME: &str = "topic_name";
    pub const PARTITIONS: &str = "partitions";
    pub const LINK_NAME: &str = "link_name";
    pub const SOURCE_TOPIC: &str = "source_topic";
}

/// Output fields the adapter produces
pub mod fields {
    pub const ID: &str = "id";
    pub const BOOTSTRAP_ENDPOINT: &str = "bootstrap_endpoint";
    pub const REST_ENDPOINT: &str = "rest_endpoint";
    pub const ENDPOINT: &str = "endpoint";
    pub const KEY: &str = "key";
    pub const SECRET: &str = "secret";
    pub const TOPIC_NAME: &str = "topic_name";
}

/// Map an API error onto the engine's retry categories
pub fn platform_error(err: ccloud::Error) -> PlatformError {
    let category = match err.category() {
        ccloud::ErrorCategory::Network => ErrorCategory::Transient,
        ccloud::ErrorCategory::NotFound => ErrorCategory::NotFound,
        ccloud::ErrorCategory::Conflict => ErrorCategory::Conflict,
        ccloud::ErrorCategory::Permission => ErrorCategory::Permission,
        ccloud::ErrorCategory::Invalid => ErrorCategory::Invalid,
        ccloud::ErrorCategory::Other => ErrorCategory::Other,
    };
    PlatformError::new(category, err.to_string())
}

type PlatformResult<T> = Result<T, PlatformError>;

/// Live platform backed by [`CloudClient`] and per-cluster [`KafkaRestClient`]s
pub struct CloudPlatform {
    cloud: CloudClient,
    organization: String,
}

impl CloudPlatform {
    pub fn new(cloud: CloudClient, organization: impl Into<String>) -> Self {
        Self {
            cloud,
            organization: organization.into(),
        }
    }

    fn cluster_spec(inputs: &Inputs) -> PlatformResult<ClusterSpec> {
        let cku = inputs.require(keys::CKU)?;
        Ok(ClusterSpec {
            display_name: inputs.require(keys::DISPLAY_NAME)?.to_string(),
            environment: inputs.require(keys::ENVIRONMENT)?.to_string(),
            cloud: inputs.require(keys::CLOUD)?.to_string(),
            region: inputs.require(keys::REGION)?.to_string(),
            availability: inputs.require(keys::AVAILABILITY)?.to_string(),
            cku: cku
                .parse()
                .map_err(|_| PlatformError::invalid(format!("cku must be a number, got {cku}")))?,
        })
    }

    /// CRN pattern scoping a role binding, narrowest scope first
    fn crn_pattern(&self, inputs: &Inputs) -> PlatformResult<String> {
        let org = &self.organization;
        let env = inputs.require(keys::ENVIRONMENT)?;
        if let Some(registry) = inputs.get(keys::REGISTRY) {
            let base = registry_crn(org, env, registry);
            return Ok(match inputs.get(keys::SUBJECT) {
                Some(subject) => format!("{base}/subject={subject}"),
                None => base,
            });
        }
        if let Some(cluster) = inputs.get(keys::CLUSTER) {
            let base = cluster_crn(org, env, cluster);
            return Ok(if let Some(topic) = inputs.get(keys::TOPIC) {
                format!("{base}/kafka={cluster}/topic={topic}")
            } else if let Some(group) = inputs.get(keys::GROUP) {
                format!("{base}/kafka={cluster}/group={group}")
            } else {
                base
            });
        }
        Ok(environment_crn(org, env))
    }

    fn create_link(inputs: &Inputs) -> PlatformResult<Vec<Output>> {
        let mode = inputs.require(CONNECTION_MODE)?;
        let mode = ConnectionMode::parse(mode)
            .ok_or_else(|| PlatformError::invalid(format!("unknown connection mode {mode}")))?;
        let remote_credentials = match (inputs.get(REMOTE_API_KEY), inputs.get(REMOTE_API_SECRET)) {
            (Some(key), Some(secret)) => Some(Credentials::new(key, secret)),
            _ => None,
        };
        let spec = LinkSpec {
            link_name: inputs.require(LINK_NAME)?.to_string(),
            remote_cluster_id: inputs.require(REMOTE_CLUSTER_ID)?.to_string(),
            mode,
            link_id: inputs.get(FORWARD_LINK_ID).map(str::to_string),
            remote_bootstrap: inputs.get(REMOTE_BOOTSTRAP).map(str::to_string),
            remote_credentials,
        };

        let client = link_client(inputs)?;
        let link = client.create_link(&spec).map_err(platform_error)?;
        Ok(vec![
            Output::plain(LINK_ID, link.cluster_link_id),
            Output::plain(LINK_NAME, link.link_name),
        ])
    }
}

/// REST client for the cluster a topic or mirror lives on
fn rest_client(inputs: &Inputs) -> PlatformResult<KafkaRestClient> {
    Ok(KafkaRestClient::new(
        inputs.require(keys::REST_ENDPOINT)?,
        inputs.require(keys::CLUSTER_ID)?,
        Credentials::new(
            inputs.require(keys::API_KEY)?,
            inputs.require(keys::API_SECRET)?,
        ),
    ))
}

/// REST client for the cluster a link half lives on
fn link_client(inputs: &Inputs) -> PlatformResult<KafkaRestClient> {
    Ok(KafkaRestClient::new(
        inputs.require(LOCAL_REST_ENDPOINT)?,
        inputs.require(LOCAL_CLUSTER_ID)?,
        Credentials::new(
            inputs.require(LOCAL_API_KEY)?,
            inputs.require(LOCAL_API_SECRET)?,
        ),
    ))
}

/// A recorded output the destroy call cannot do without
fn recorded<'a>(request: &'a DestroyRequest, field: &str) -> PlatformResult<&'a str> {
    request.output(field).ok_or_else(|| {
        PlatformError::invalid(format!("{} has no recorded {field}", request.name))
    })
}

/// Deleting something already gone counts as success
fn tolerate_missing(name: &str, result: ccloud::Result<()>) -> PlatformResult<()> {
    match result {
        Err(err) if err.category() == ccloud::ErrorCategory::NotFound => {
            log::warn!("{name} was already deleted");
            Ok(())
        }
        other => other.map_err(platform_error),
    }
}

impl Platform for CloudPlatform {
    fn create(&self, request: &CreateRequest) -> PlatformResult<Vec<Output>> {
        let inputs = &request.inputs;
        match request.kind {
            ResourceKind::Environment => {
                let env = self
                    .cloud
                    .create_environment(
                        inputs.require(keys::DISPLAY_NAME)?,
                        inputs.require(keys::GOVERNANCE)?,
                    )
                    .map_err(platform_error)?;
                Ok(vec![Output::plain(fields::ID, env.id)])
            }
            ResourceKind::Cluster => {
                let cluster = self
                    .cloud
                    .create_cluster(&Self::cluster_spec(inputs)?)
                    .map_err(platform_error)?;
                Ok(vec![Output::plain(fields::ID, cluster.id)])
            }
            // Provisioned by the platform; the readiness probe finds it
            ResourceKind::RegistryInstance => Ok(Vec::new()),
            ResourceKind::ServiceAccount => {
                let account = self
                    .cloud
                    .create_service_account(
                        inputs.require(keys::DISPLAY_NAME)?,
                        inputs.get(keys::DESCRIPTION).unwrap_or_default(),
                    )
                    .map_err(platform_error)?;
                Ok(vec![Output::plain(fields::ID, account.id)])
            }
            ResourceKind::RoleBinding => {
                let binding = NewRoleBinding {
                    principal: format!("User:{}", inputs.require(keys::PRINCIPAL)?),
                    role_name: inputs.require(keys::ROLE_NAME)?.to_string(),
                    crn_pattern: self.crn_pattern(inputs)?,
                };
                log::debug!("{}: {} on {}", request.name, binding.role_name, binding.crn_pattern);
                let created = self
                    .cloud
                    .create_role_binding(&binding)
                    .map_err(platform_error)?;
                Ok(vec![Output::plain(fields::ID, created.id)])
            }
            ResourceKind::ApiKey => {
                let key = self
                    .cloud
                    .create_api_key(
                        inputs.require(keys::DISPLAY_NAME)?,
                        inputs.require(keys::OWNER)?,
                        inputs.require(keys::RESOURCE)?,
                        inputs.require(keys::ENVIRONMENT)?,
                    )
                    .map_err(platform_error)?;
                Ok(vec![
                    Output::plain(fields::KEY, key.id),
                    Output::secret(fields::SECRET, key.spec.secret),
                ])
            }
            ResourceKind::ClusterLink => Self::create_link(inputs),
            ResourceKind::Topic => {
                let name = inputs.require(keys::TOPIC_NAME)?;
                let partitions = inputs.require(keys::PARTITIONS)?;
                let partitions = partitions.parse().map_err(|_| {
                    PlatformError::invalid(format!("partitions must be a number, got {partitions}"))
                })?;
                rest_client(inputs)?
                    .create_topic(name, partitions)
                    .map_err(platform_error)?;
                Ok(vec![Output::plain(fields::TOPIC_NAME, name)])
            }
            ResourceKind::MirrorTopic => {
                // Mirrors keep the source topic's name
                let source = inputs.require(keys::SOURCE_TOPIC)?;
                rest_client(inputs)?
                    .create_mirror(inputs.require(keys::LINK_NAME)?, source, source)
                    .map_err(platform_error)?;
                Ok(vec![Output::plain(fields::TOPIC_NAME, source)])
            }
        }
    }

    fn probe(&self, request: &CreateRequest, created: &[Output]) -> PlatformResult<Probe> {
        let inputs = &request.inputs;
        match request.kind {
            ResourceKind::Cluster => {
                let id = created
                    .iter()
                    .find(|o| o.field == fields::ID)
                    .map(|o| o.value.expose())
                    .ok_or_else(|| PlatformError::invalid("cluster create returned no id"))?;
                let cluster = self
                    .cloud
                    .get_cluster(id, inputs.require(keys::ENVIRONMENT)?)
                    .map_err(platform_error)?;
                if !cluster.is_provisioned() {
                    log::debug!("{}: phase {}", request.name, cluster.status.phase);
                    return Ok(Probe::NotReady);
                }
                Ok(Probe::Ready(vec![
                    Output::plain(fields::BOOTSTRAP_ENDPOINT, cluster.spec.kafka_bootstrap_endpoint),
                    Output::plain(fields::REST_ENDPOINT, cluster.spec.http_endpoint),
                ]))
            }
            ResourceKind::RegistryInstance => {
                match self.cloud.schema_registry(inputs.require(keys::ENVIRONMENT)?) {
                    Ok(registry) => Ok(Probe::Ready(vec![
                        Output::plain(fields::ID, registry.id),
                        Output::plain(fields::ENDPOINT, registry.spec.http_endpoint),
                    ])),
                    Err(err) if err.category() == ccloud::ErrorCategory::NotFound => {
                        Ok(Probe::NotReady)
                    }
                    Err(err) => Err(platform_error(err)),
                }
            }
            _ => Ok(Probe::Ready(Vec::new())),
        }
    }

    fn destroy(&self, request: &DestroyRequest) -> PlatformResult<()> {
        let name = &request.name;
        let inputs = &request.inputs;
        match request.kind {
            ResourceKind::Environment => tolerate_missing(
                name,
                self.cloud.delete_environment(recorded(request, fields::ID)?),
            ),
            ResourceKind::Cluster => tolerate_missing(
                name,
                self.cloud.delete_cluster(
                    recorded(request, fields::ID)?,
                    inputs.require(keys::ENVIRONMENT)?,
                ),
            ),
            // Removed together with its environment
            ResourceKind::RegistryInstance => Ok(()),
            ResourceKind::ServiceAccount => tolerate_missing(
                name,
                self.cloud
                    .delete_service_account(recorded(request, fields::ID)?),
            ),
            ResourceKind::RoleBinding => tolerate_missing(
                name,
                self.cloud.delete_role_binding(recorded(request, fields::ID)?),
            ),
            ResourceKind::ApiKey => tolerate_missing(
                name,
                self.cloud.delete_api_key(recorded(request, fields::KEY)?),
            ),
            ResourceKind::ClusterLink => tolerate_missing(
                name,
                link_client(inputs)?.delete_link(recorded(request, LINK_NAME)?),
            ),
            ResourceKind::Topic | ResourceKind::MirrorTopic => tolerate_missing(
                name,
                rest_client(inputs)?.delete_topic(recorded(request, fields::TOPIC_NAME)?),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provision::Value;

    fn platform() -> CloudPlatform {
        CloudPlatform::new(
            CloudClient::with_api_base("http://127.0.0.1:9", Credentials::new("k", "s")),
            "org-1",
        )
    }

    fn inputs(pairs: &[(&str, &str)]) -> Inputs {
        let mut inputs = Inputs::new();
        for (key, value) in pairs {
            inputs.insert(*key, Value::plain(*value));
        }
        inputs
    }

    #[test]
    fn test_error_categories_map_across() {
        let err = platform_error(ccloud::Error::http("throttled", Some(429)));
        assert!(err.is_retryable());

        let err = platform_error(ccloud::Error::http("forbidden", Some(403)));
        assert_eq!(err.category, ErrorCategory::Permission);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_crn_for_topic_binding() {
        let crn = platform()
            .crn_pattern(&inputs(&[
                (keys::ENVIRONMENT, "env-1"),
                (keys::CLUSTER, "lkc-1"),
                (keys::TOPIC, "east-orders"),
            ]))
            .unwrap();
        assert_eq!(
            crn,
            "crn://confluent.cloud/organization=org-1/environment=env-1/cloud-cluster=lkc-1/kafka=lkc-1/topic=east-orders"
        );
    }

    #[test]
    fn test_crn_for_cluster_and_registry_bindings() {
        let platform = platform();
        let crn = platform
            .crn_pattern(&inputs(&[(keys::ENVIRONMENT, "env-1"), (keys::CLUSTER, "lkc-1")]))
            .unwrap();
        assert!(crn.ends_with("/cloud-cluster=lkc-1"));

        let crn = platform
            .crn_pattern(&inputs(&[
                (keys::ENVIRONMENT, "env-1"),
                (keys::REGISTRY, "lsrc-1"),
                (keys::SUBJECT, "*"),
            ]))
            .unwrap();
        assert!(crn.ends_with("/schema-registry=lsrc-1/subject=*"));
    }

    #[test]
    fn test_crn_requires_environment() {
        let err = platform()
            .crn_pattern(&inputs(&[(keys::CLUSTER, "lkc-1")]))
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::Invalid);
    }

    #[test]
    fn test_cluster_spec_rejects_bad_cku() {
        let err = CloudPlatform::cluster_spec(&inputs(&[
            (keys::DISPLAY_NAME, "dr-east-cluster"),
            (keys::ENVIRONMENT, "env-1"),
            (keys::CLOUD, "AWS"),
            (keys::REGION, "us-east-1"),
            (keys::AVAILABILITY, "SINGLE_ZONE"),
            (keys::CKU, "one"),
        ]))
        .unwrap_err();
        assert!(err.message.contains("cku"));
    }

    #[test]
    fn test_registry_is_never_created_or_deleted() {
        let platform = platform();
        let request = CreateRequest {
            name: "dr-east-sr".into(),
            kind: ResourceKind::RegistryInstance,
            inputs: inputs(&[(keys::ENVIRONMENT, "env-1")]),
        };
        assert!(platform.create(&request).unwrap().is_empty());

        let request = DestroyRequest {
            name: "dr-east-sr".into(),
            kind: ResourceKind::RegistryInstance,
            inputs: Inputs::new(),
            outputs: Vec::new(),
        };
        assert!(platform.destroy(&request).is_ok());
    }

    #[test]
    fn test_registry_probe_treats_transport_failure_as_retryable() {
        let request = CreateRequest {
            name: "dr-east-sr".into(),
            kind: ResourceKind::RegistryInstance,
            inputs: inputs(&[(keys::ENVIRONMENT, "env-1")]),
        };
        let err = platform().probe(&request, &[]).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_destroy_without_recorded_id_fails() {
        let request = DestroyRequest {
            name: "dr-east-env".into(),
            kind: ResourceKind::Environment,
            inputs: Inputs::new(),
            outputs: Vec::new(),
        };
        let err = platform().destroy(&request).unwrap_err();
        assert!(err.message.contains("no recorded id"));
    }

    #[test]
    fn test_link_requires_connection_mode() {
        let err = CloudPlatform::create_link(&inputs(&[(LINK_NAME, "dr")])).unwrap_err();
        assert!(err.message.contains("connection_mode"));
    }
}
