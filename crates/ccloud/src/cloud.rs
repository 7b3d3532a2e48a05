//! Control-plane client.
//!
//! Environments, dedicated clusters, schema registries and IAM objects live
//! behind the organization-wide API, authenticated with a cloud API key.

use crate::auth::Credentials;
use crate::error::{Error, Result};
use crate::types::{
    ApiKey, Cluster, ClusterSpec, Environment, GovernanceConfig, List, NewApiKey, NewApiKeySpec,
    NewCluster, NewEnvironment, NewRoleBinding, NewServiceAccount, ObjectRef, RoleBinding,
    SchemaRegistry, ServiceAccount,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Default control-plane endpoint.
pub const API_BASE: &str = "https://api.confluent.cloud";

const USER_AGENT: &str = "drtopo";

/// Blocking control-plane client.
pub struct CloudClient {
    agent: ureq::Agent,
    api_base: String,
    credentials: Credentials,
}

impl CloudClient {
    pub fn new(credentials: Credentials) -> Self {
        Self::with_api_base(API_BASE, credentials)
    }

    /// Create a client with a custom API base (for testing).
    pub fn with_api_base(api_base: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            api_base: api_base.into(),
            credentials,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), path)
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        log::debug!("GET {url}");
        let value = self
            .agent
            .get(&url)
            .header("Authorization", self.credentials.basic_auth())
            .header("User-Agent", USER_AGENT)
            .call()?
            .body_mut()
            .read_json()?;
        Ok(value)
    }

    fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path);
        log::debug!("POST {url}");
        let value = self
            .agent
            .post(&url)
            .header("Authorization", self.credentials.basic_auth())
            .header("User-Agent", USER_AGENT)
            .send_json(body)?
            .body_mut()
            .read_json()?;
        Ok(value)
    }

    fn delete(&self, path: &str) -> Result<()> {
        let url = self.url(path);
        log::debug!("DELETE {url}");
        self.agent
            .delete(&url)
            .header("Authorization", self.credentials.basic_auth())
            .header("User-Agent", USER_AGENT)
            .call()?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Environments
    // -------------------------------------------------------------------------

    pub fn create_environment(&self, display_name: &str, governance: &str) -> Result<Environment> {
        self.post(
            "org/v2/environments",
            &NewEnvironment {
                display_name: display_name.to_string(),
                stream_governance_config: GovernanceConfig {
                    package: governance.to_string(),
                },
            },
        )
    }

    pub fn delete_environment(&self, id: &str) -> Result<()> {
        self.delete(&format!("org/v2/environments/{id}"))
    }

    // -------------------------------------------------------------------------
    // Clusters
    // -------------------------------------------------------------------------

    pub fn create_cluster(&self, spec: &ClusterSpec) -> Result<Cluster> {
        self.post("cmk/v2/clusters", &NewCluster::from(spec))
    }

    pub fn get_cluster(&self, id: &str, environment: &str) -> Result<Cluster> {
        self.get(&format!("cmk/v2/clusters/{id}?environment={environment}"))
    }

    pub fn delete_cluster(&self, id: &str, environment: &str) -> Result<()> {
        self.delete(&format!("cmk/v2/clusters/{id}?environment={environment}"))
    }

    // -------------------------------------------------------------------------
    // Schema registry
    // -------------------------------------------------------------------------

    /// The environment's schema registry.
    ///
    /// Provisioned by the platform some time after the environment; until
    /// then the list is empty and this fails with [`Error::NotFound`].
    pub fn schema_registry(&self, environment: &str) -> Result<SchemaRegistry> {
        let list: List<SchemaRegistry> =
            self.get(&format!("srcm/v3/clusters?environment={environment}"))?;
        list.data.into_iter().next().ok_or_else(|| Error::NotFound {
            kind: "schema registry",
            id: environment.to_string(),
        })
    }

    // -------------------------------------------------------------------------
    // IAM
    // -------------------------------------------------------------------------

    pub fn create_service_account(
        &self,
        display_name: &str,
        description: &str,
    ) -> Result<ServiceAccount> {
        self.post(
            "iam/v2/service-accounts",
            &NewServiceAccount {
                display_name: display_name.to_string(),
                description: description.to_string(),
            },
        )
    }

    pub fn delete_service_account(&self, id: &str) -> Result<()> {
        self.delete(&format!("iam/v2/service-accounts/{id}"))
    }

    pub fn create_role_binding(&self, binding: &NewRoleBinding) -> Result<RoleBinding> {
        self.post("iam/v2/role-bindings", binding)
    }

    pub fn delete_role_binding(&self, id: &str) -> Result<()> {
        self.delete(&format!("iam/v2/role-bindings/{id}"))
    }

    /// Create an API key owned by `owner` for `resource` (cluster or registry)
    /// in `environment`.
    pub fn create_api_key(
        &self,
        display_name: &str,
        owner: &str,
        resource: &str,
        environment: &str,
    ) -> Result<ApiKey> {
        self.post(
            "iam/v2/api-keys",
            &NewApiKey {
                spec: NewApiKeySpec {
                    display_name: display_name.to_string(),
                    owner: ObjectRef::new(owner),
                    resource: ObjectRef::in_environment(resource, environment),
                },
            },
        )
    }

    pub fn delete_api_key(&self, id: &str) -> Result<()> {
        self.delete(&format!("iam/v2/api-keys/{id}"))
    }
}

/// CRN scope of an organization
pub fn organization_crn(organization: &str) -> String {
    format!("crn://confluent.cloud/organization={organization}")
}

/// CRN scope of an environment
pub fn environment_crn(organization: &str, environment: &str) -> String {
    format!("{}/environment={environment}", organization_crn(organization))
}

/// CRN scope of a Kafka cluster
pub fn cluster_crn(organization: &str, environment: &str, cluster: &str) -> String {
    format!(
        "{}/cloud-cluster={cluster}",
        environment_crn(organization, environment)
    )
}

/// CRN scope of a schema registry
pub fn registry_crn(organization: &str, environment: &str, registry: &str) -> String {
    format!(
        "{}/schema-registry={registry}",
        environment_crn(organization, environment)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_paths() {
        let client =
            CloudClient::with_api_base("https://example.test/", Credentials::new("k", "s"));
        assert_eq!(
            client.url("org/v2/environments"),
            "https://example.test/org/v2/environments"
        );
    }

    #[test]
    fn test_default_api_base() {
        let client = CloudClient::new(Credentials::new("k", "s"));
        assert_eq!(client.api_base(), API_BASE);
    }

    #[test]
    fn test_crn_patterns() {
        assert_eq!(
            environment_crn("org-1", "env-1"),
            "crn://confluent.cloud/organization=org-1/environment=env-1"
        );
        assert_eq!(
            cluster_crn("org-1", "env-1", "lkc-1"),
            "crn://confluent.cloud/organization=org-1/environment=env-1/cloud-cluster=lkc-1"
        );
        assert!(registry_crn("org-1", "env-1", "lsrc-1").ends_with("/schema-registry=lsrc-1"));
    }

    #[test]
    fn test_transport_error_is_retryable() {
        // Nothing listens on port 9 locally; the call fails without a status
        let client =
            CloudClient::with_api_base("http://127.0.0.1:9", Credentials::new("k", "s"));
        let err = client.delete_environment("env-1").unwrap_err();
        assert!(err.is_retryable());
    }
}
