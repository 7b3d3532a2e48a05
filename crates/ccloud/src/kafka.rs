//! Kafka REST (v3) client for a single cluster.
//!
//! Topics, cluster links and mirror topics are managed through the cluster's
//! own REST endpoint, authenticated with a cluster-scoped API key.

use crate::auth::Credentials;
use crate::error::Result;
use crate::types::{ClusterLink, ConfigEntry, NewLink, NewMirror, NewTopic};

/// Direction a link half accepts connections in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Waits for the remote cluster to connect
    Inbound,
    /// Connects out to the remote cluster
    Outbound,
}

impl ConnectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "INBOUND",
            Self::Outbound => "OUTBOUND",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "INBOUND" => Some(Self::Inbound),
            "OUTBOUND" => Some(Self::Outbound),
            _ => None,
        }
    }
}

/// One half of a bidirectional cluster link.
#[derive(Debug, Clone)]
pub struct LinkSpec {
    pub link_name: String,
    pub remote_cluster_id: String,
    pub mode: ConnectionMode,
    /// Id of the half created first; unset when creating that half
    pub link_id: Option<String>,
    /// Required when connecting out
    pub remote_bootstrap: Option<String>,
    /// Credentials presented to the remote cluster (outbound only)
    pub remote_credentials: Option<Credentials>,
}

impl LinkSpec {
    /// Link configuration entries for this half.
    ///
    /// The inbound half carries no remote credentials; it only waits for its
    /// peer to connect.
    pub fn configs(&self) -> Vec<ConfigEntry> {
        let mut configs = vec![
            ConfigEntry::new("link.mode", "BIDIRECTIONAL"),
            ConfigEntry::new("connection.mode", self.mode.as_str()),
        ];
        if self.mode == ConnectionMode::Outbound {
            if let Some(bootstrap) = &self.remote_bootstrap {
                configs.push(ConfigEntry::new("bootstrap.servers", bootstrap.clone()));
            }
            if let Some(creds) = &self.remote_credentials {
                configs.push(ConfigEntry::new("security.protocol", "SASL_SSL"));
                configs.push(ConfigEntry::new("sasl.mechanism", "PLAIN"));
                configs.push(ConfigEntry::new("sasl.jaas.config", creds.jaas_config()));
            }
        }
        configs
    }
}

/// Blocking Kafka REST client bound to one cluster.
pub struct KafkaRestClient {
    agent: ureq::Agent,
    rest_endpoint: String,
    cluster_id: String,
    credentials: Credentials,
}

impl KafkaRestClient {
    pub fn new(
        rest_endpoint: impl Into<String>,
        cluster_id: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            rest_endpoint: rest_endpoint.into(),
            cluster_id: cluster_id.into(),
            credentials,
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/kafka/v3/clusters/{}/{}",
            self.rest_endpoint.trim_end_matches('/'),
            self.cluster_id,
            path
        )
    }

    fn post_json<B: serde::Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let url = self.url(path);
        log::debug!("POST {url}");
        self.agent
            .post(&url)
            .header("Authorization", self.credentials.basic_auth())
            .send_json(body)?;
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<()> {
        let url = self.url(path);
        log::debug!("DELETE {url}");
        self.agent
            .delete(&url)
            .header("Authorization", self.credentials.basic_auth())
            .call()?;
        Ok(())
    }

    fn topic_path(name: &str) -> String {
        format!("topics/{}", urlencoding::encode(name))
    }

    fn link_path(link_name: &str) -> String {
        format!("links/{}", urlencoding::encode(link_name))
    }

    pub fn create_topic(&self, name: &str, partitions: u32) -> Result<()> {
        self.post_json(
            "topics",
            &NewTopic {
                topic_name: name,
                partitions_count: partitions,
            },
        )
    }

    /// Delete a topic; also removes mirror topics
    pub fn delete_topic(&self, name: &str) -> Result<()> {
        self.delete(&Self::topic_path(name))
    }

    /// Create one half of a cluster link and read back its identifier.
    pub fn create_link(&self, spec: &LinkSpec) -> Result<ClusterLink> {
        self.post_json(
            &format!("links?link_name={}", urlencoding::encode(&spec.link_name)),
            &NewLink {
                remote_cluster_id: &spec.remote_cluster_id,
                cluster_link_id: spec.link_id.as_deref(),
                configs: spec.configs(),
            },
        )?;
        self.get_link(&spec.link_name)
    }

    pub fn get_link(&self, link_name: &str) -> Result<ClusterLink> {
        let url = self.url(&Self::link_path(link_name));
        log::debug!("GET {url}");
        let link = self
            .agent
            .get(&url)
            .header("Authorization", self.credentials.basic_auth())
            .call()?
            .body_mut()
            .read_json()?;
        Ok(link)
    }

    pub fn delete_link(&self, link_name: &str) -> Result<()> {
        self.delete(&Self::link_path(link_name))
    }

    /// Mirror `source_topic` from the link's remote cluster onto this cluster
    pub fn create_mirror(&self, link_name: &str, source_topic: &str, mirror_topic: &str) -> Result<()> {
        self.post_json(
            &format!("{}/mirrors", Self::link_path(link_name)),
            &NewMirror {
                source_topic_name: source_topic,
                mirror_topic_name: mirror_topic,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config<'a>(configs: &'a [ConfigEntry], name: &str) -> Option<&'a str> {
        configs
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
    }

    #[test]
    fn test_inbound_half_has_no_remote_auth() {
        let spec = LinkSpec {
            link_name: "dr-link".into(),
            remote_cluster_id: "lkc-a".into(),
            mode: ConnectionMode::Inbound,
            link_id: None,
            remote_bootstrap: Some("SASL_SSL://a:9092".into()),
            remote_credentials: Some(Credentials::new("KEY", "SECRET")),
        };
        let configs = spec.configs();
        assert_eq!(config(&configs, "connection.mode"), Some("INBOUND"));
        assert_eq!(config(&configs, "link.mode"), Some("BIDIRECTIONAL"));
        assert!(config(&configs, "sasl.jaas.config").is_none());
        assert!(config(&configs, "bootstrap.servers").is_none());
    }

    #[test]
    fn test_outbound_half_embeds_remote_auth() {
        let spec = LinkSpec {
            link_name: "dr-link".into(),
            remote_cluster_id: "lkc-b".into(),
            mode: ConnectionMode::Outbound,
            link_id: Some("abc123".into()),
            remote_bootstrap: Some("SASL_SSL://b:9092".into()),
            remote_credentials: Some(Credentials::new("KEYB", "SECRETB")),
        };
        let configs = spec.configs();
        assert_eq!(config(&configs, "connection.mode"), Some("OUTBOUND"));
        assert_eq!(config(&configs, "bootstrap.servers"), Some("SASL_SSL://b:9092"));
        assert!(
            config(&configs, "sasl.jaas.config")
                .unwrap()
                .contains("username=\"KEYB\"")
        );
    }

    #[test]
    fn test_reverse_half_reuses_link_id() {
        let body = serde_json::to_value(NewLink {
            remote_cluster_id: "lkc-b",
            cluster_link_id: Some("abc123"),
            configs: Vec::new(),
        })
        .unwrap();
        assert_eq!(body["cluster_link_id"], "abc123");

        let body = serde_json::to_value(NewLink {
            remote_cluster_id: "lkc-a",
            cluster_link_id: None,
            configs: Vec::new(),
        })
        .unwrap();
        assert!(body.get("cluster_link_id").is_none());
    }

    #[test]
    fn test_rest_urls() {
        let client = KafkaRestClient::new("https://rest.b/", "lkc-b", Credentials::new("k", "s"));
        assert_eq!(
            client.url("links/dr-link/mirrors"),
            "https://rest.b/kafka/v3/clusters/lkc-b/links/dr-link/mirrors"
        );
    }

    #[test]
    fn test_names_are_encoded_in_paths() {
        assert_eq!(KafkaRestClient::link_path("dr-link"), "links/dr-link");
        assert_eq!(
            KafkaRestClient::link_path("dr link/a?b"),
            "links/dr%20link%2Fa%3Fb"
        );
        assert_eq!(
            KafkaRestClient::topic_path("east.orders#1"),
            "topics/east.orders%231"
        );
    }

    #[test]
    fn test_connection_mode_parse() {
        assert_eq!(ConnectionMode::parse("INBOUND"), Some(ConnectionMode::Inbound));
        assert_eq!(ConnectionMode::parse("outbound"), None);
    }
}
