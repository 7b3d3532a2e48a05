//! The disaster-recovery topology.
//!
//! Two regions, each with an environment, a dedicated cluster, its schema
//! registry, an application service account with its role bindings and API
//! keys, and a source topic. A shared manager account administers both
//! clusters. The clusters are joined by a bidirectional link whose forward
//! half lives on the secondary cluster, and each region mirrors the other's
//! source topic through it.
//!
//! Only this module knows the DR shape; the engine sees a plain graph.

use crate::config::{Config, RegionConfig, TopologyConfig};
use crate::platform::keys;
use anyhow::Result;
use provision::link::{
    LOCAL_API_KEY, LOCAL_API_SECRET, LOCAL_CLUSTER_ID, LOCAL_REST_ENDPOINT, REMOTE_API_KEY,
    REMOTE_API_SECRET, REMOTE_BOOTSTRAP, REMOTE_CLUSTER_ID,
};
use provision::{Graph, GraphBuilder, LinkPair, Readiness, ResourceDescriptor, ResourceKind};

/// Logical names of one region's resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionNames {
    pub region: String,
    pub environment: String,
    pub cluster: String,
    pub registry: String,
    pub app: String,
    pub manager_binding: String,
    pub write_binding: String,
    pub read_binding: String,
    pub group_binding: String,
    pub subject_binding: String,
    pub manager_key: String,
    pub kafka_key: String,
    pub registry_key: String,
    pub link: String,
    pub topic: String,
    pub mirror: String,
    /// Topic this region's applications produce to
    pub topic_name: String,
}

impl RegionNames {
    pub fn new(topology: &TopologyConfig, region: &RegionConfig) -> Self {
        let name = |role: &str| format!("{}-{}-{role}", topology.prefix, region.name);
        Self {
            region: region.name.clone(),
            environment: name("env"),
            cluster: name("cluster"),
            registry: name("sr"),
            app: name("app"),
            manager_binding: name("rb-manager"),
            write_binding: name("rb-write"),
            read_binding: name("rb-read"),
            group_binding: name("rb-group"),
            subject_binding: name("rb-subject"),
            manager_key: name("manager-key"),
            kafka_key: name("app-kafka-key"),
            registry_key: name("app-sr-key"),
            link: name("link"),
            topic: name("topic"),
            mirror: name("mirror"),
            topic_name: format!("{}-{}", region.name, topology.topic),
        }
    }
}

/// Logical names of the whole topology
#[derive(Debug, Clone)]
pub struct Names {
    pub manager: String,
    pub link_pair: String,
    pub primary: RegionNames,
    pub secondary: RegionNames,
}

impl Names {
    pub fn new(topology: &TopologyConfig) -> Self {
        Self {
            manager: format!("{}-manager", topology.prefix),
            link_pair: topology.link_name.clone(),
            primary: RegionNames::new(topology, &topology.primary),
            secondary: RegionNames::new(topology, &topology.secondary),
        }
    }

    pub fn regions(&self) -> [&RegionNames; 2] {
        [&self.primary, &self.secondary]
    }

    pub fn region(&self, name: &str) -> Option<&RegionNames> {
        self.regions().into_iter().find(|r| r.region == name)
    }
}

/// Build the validated DR graph from configuration
pub fn build(config: &Config) -> Result<Graph> {
    let topology = &config.topology;
    let names = Names::new(topology);

    let mut descriptors = vec![
        ResourceDescriptor::new(&names.manager, ResourceKind::ServiceAccount)
            .input(keys::DISPLAY_NAME, &names.manager)
            .input(
                keys::DESCRIPTION,
                "Administers both DR clusters and their cluster link",
            ),
    ];

    for (region, config) in [
        (&names.primary, &topology.primary),
        (&names.secondary, &topology.secondary),
    ] {
        descriptors.extend(region_resources(topology, config, region, &names.manager));
    }

    // The forward half waits on the secondary cluster for the primary to
    // connect; the reverse half dials out from the primary.
    let (a, b) = (&names.primary, &names.secondary);
    descriptors.push(
        ResourceDescriptor::new(&b.link, ResourceKind::ClusterLink)
            .input_from(LOCAL_CLUSTER_ID, &b.cluster, "id")
            .input_from(LOCAL_REST_ENDPOINT, &b.cluster, "rest_endpoint")
            .input_from(LOCAL_API_KEY, &b.manager_key, "key")
            .input_from(LOCAL_API_SECRET, &b.manager_key, "secret")
            .input_from(REMOTE_CLUSTER_ID, &a.cluster, "id"),
    );
    descriptors.push(
        ResourceDescriptor::new(&a.link, ResourceKind::ClusterLink)
            .input_from(LOCAL_CLUSTER_ID, &a.cluster, "id")
            .input_from(LOCAL_REST_ENDPOINT, &a.cluster, "rest_endpoint")
            .input_from(LOCAL_API_KEY, &a.manager_key, "key")
            .input_from(LOCAL_API_SECRET, &a.manager_key, "secret")
            .input_from(REMOTE_CLUSTER_ID, &b.cluster, "id")
            .input_from(REMOTE_BOOTSTRAP, &b.cluster, "bootstrap_endpoint")
            .input_from(REMOTE_API_KEY, &b.manager_key, "key")
            .input_from(REMOTE_API_SECRET, &b.manager_key, "secret"),
    );

    // Each region mirrors the other's source topic
    for (local, remote) in [(a, b), (b, a)] {
        descriptors.push(
            ResourceDescriptor::new(&local.mirror, ResourceKind::MirrorTopic)
                .input_from(keys::CLUSTER_ID, &local.cluster, "id")
                .input_from(keys::REST_ENDPOINT, &local.cluster, "rest_endpoint")
                .input_from(keys::API_KEY, &local.manager_key, "key")
                .input_from(keys::API_SECRET, &local.manager_key, "secret")
                .input(keys::LINK_NAME, &names.link_pair)
                .input_from(keys::SOURCE_TOPIC, &remote.topic, "topic_name")
                .via_link(&names.link_pair),
        );
    }

    let graph = GraphBuilder::new()
        .resources(descriptors)
        .link_pair(LinkPair::new(&names.link_pair, &b.link, &a.link))
        .build()?;
    Ok(graph)
}

fn region_resources(
    topology: &TopologyConfig,
    region: &RegionConfig,
    names: &RegionNames,
    manager: &str,
) -> Vec<ResourceDescriptor> {
    let env = &names.environment;
    let cluster = &names.cluster;
    let display = format!("{}-{}", topology.prefix, region.name);

    let binding = |name: &str, principal: &str, role: &str| {
        ResourceDescriptor::new(name, ResourceKind::RoleBinding)
            .input_from(keys::PRINCIPAL, principal, "id")
            .input(keys::ROLE_NAME, role)
            .input_from(keys::ENVIRONMENT, env, "id")
    };
    let api_key = |name: &str, owner: &str, resource: &str| {
        ResourceDescriptor::new(name, ResourceKind::ApiKey)
            .input(keys::DISPLAY_NAME, name)
            .input_from(keys::OWNER, owner, "id")
            .input_from(keys::RESOURCE, resource, "id")
            .input_from(keys::ENVIRONMENT, env, "id")
    };

    vec![
        ResourceDescriptor::new(env, ResourceKind::Environment)
            .input(keys::DISPLAY_NAME, &display)
            .input(keys::GOVERNANCE, &topology.governance),
        ResourceDescriptor::new(cluster, ResourceKind::Cluster)
            .input(keys::DISPLAY_NAME, format!("{display}-cluster"))
            .input_from(keys::ENVIRONMENT, env, "id")
            .input(keys::CLOUD, &topology.cloud)
            .input(keys::REGION, &region.region)
            .input(keys::AVAILABILITY, &topology.availability)
            .input(keys::CKU, topology.cku.to_string())
            .readiness(Readiness::PollAfterDelay),
        // Enabled by the platform once the environment has its first cluster
        ResourceDescriptor::new(&names.registry, ResourceKind::RegistryInstance)
            .input_from(keys::ENVIRONMENT, env, "id")
            .depends_on(cluster),
        ResourceDescriptor::new(&names.app, ResourceKind::ServiceAccount)
            .input(keys::DISPLAY_NAME, &names.app)
            .input(
                keys::DESCRIPTION,
                format!("Producer and consumer applications in {}", region.name),
            ),
        binding(&names.manager_binding, manager, "CloudClusterAdmin")
            .input_from(keys::CLUSTER, cluster, "id"),
        binding(&names.write_binding, &names.app, "DeveloperWrite")
            .input_from(keys::CLUSTER, cluster, "id")
            .input(keys::TOPIC, &names.topic_name),
        binding(&names.read_binding, &names.app, "DeveloperRead")
            .input_from(keys::CLUSTER, cluster, "id")
            .input(keys::TOPIC, "*"),
        binding(&names.group_binding, &names.app, "DeveloperRead")
            .input_from(keys::CLUSTER, cluster, "id")
            .input(keys::GROUP, &topology.consumer_group),
        binding(&names.subject_binding, &names.app, "DeveloperWrite")
            .input_from(keys::REGISTRY, &names.registry, "id")
            .input(keys::SUBJECT, "*"),
        api_key(&names.manager_key, manager, cluster).depends_on(&names.manager_binding),
        api_key(&names.kafka_key, &names.app, cluster)
            .depends_on(&names.write_binding)
            .depends_on(&names.read_binding)
            .depends_on(&names.group_binding),
        api_key(&names.registry_key, &names.app, &names.registry)
            .depends_on(&names.subject_binding),
        ResourceDescriptor::new(&names.topic, ResourceKind::Topic)
            .input_from(keys::CLUSTER_ID, cluster, "id")
            .input_from(keys::REST_ENDPOINT, cluster, "rest_endpoint")
            .input_from(keys::API_KEY, &names.manager_key, "key")
            .input_from(keys::API_SECRET, &names.manager_key, "secret")
            .input(keys::TOPIC_NAME, &names.topic_name)
            .input(keys::PARTITIONS, topology.partitions.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use provision::{
        CreateRequest, DestroyRequest, Ledger, NoProgress, Output, Platform, PlatformError, Probe,
        ScheduleOptions, Scheduler, Sleeper,
    };
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn config() -> Config {
        let mut config = Config::default();
        config.platform.organization_id = "org-1".into();
        config
    }

    fn position(order: &[&str], name: &str) -> usize {
        order.iter().position(|n| *n == name).unwrap()
    }

    #[test]
    fn test_resource_counts() {
        let graph = build(&config()).unwrap();
        let expected = [
            (ResourceKind::Environment, 2),
            (ResourceKind::Cluster, 2),
            (ResourceKind::RegistryInstance, 2),
            (ResourceKind::ServiceAccount, 3),
            (ResourceKind::RoleBinding, 10),
            (ResourceKind::ApiKey, 6),
            (ResourceKind::ClusterLink, 2),
            (ResourceKind::Topic, 2),
            (ResourceKind::MirrorTopic, 2),
        ];
        for (kind, count) in expected {
            assert_eq!(graph.count_kind(kind), count, "{kind}");
        }
        assert_eq!(graph.len(), 31);
    }

    #[test]
    fn test_names_follow_prefix_and_region() {
        let names = Names::new(&config().topology);
        assert_eq!(names.primary.cluster, "dr-east-cluster");
        assert_eq!(names.secondary.mirror, "dr-west-mirror");
        assert_eq!(names.primary.topic_name, "east-orders");
        assert_eq!(names.manager, "dr-manager");
        assert!(names.region("west").is_some());
        assert!(names.region("north").is_none());
    }

    #[test]
    fn test_link_and_mirror_ordering() {
        let graph = build(&config()).unwrap();
        let order = graph.apply_order();
        let names = Names::new(&config().topology);

        // Forward half on the secondary, reverse half on the primary
        assert_eq!(graph.links()[0].forward, names.secondary.link);
        assert!(position(&order, &names.secondary.link) < position(&order, &names.primary.link));
        for region in names.regions() {
            assert!(position(&order, &names.primary.link) < position(&order, &region.mirror));
        }
        // Each mirror waits on the other region's source topic
        assert!(position(&order, &names.primary.topic) < position(&order, &names.secondary.mirror));
        assert!(position(&order, &names.secondary.topic) < position(&order, &names.primary.mirror));
    }

    #[test]
    fn test_registry_waits_for_cluster() {
        let graph = build(&config()).unwrap();
        let deps = graph.dependencies_of("dr-east-sr");
        assert!(deps.contains(&"dr-east-cluster"));
        assert!(deps.contains(&"dr-east-env"));
        assert_eq!(
            graph.descriptor("dr-east-cluster").unwrap().readiness,
            Readiness::PollAfterDelay
        );
    }

    #[test]
    fn test_destroy_order_mirrors_apply_order() {
        let graph = build(&config()).unwrap();
        let mut reversed = graph.apply_order();
        reversed.reverse();
        assert_eq!(graph.destroy_order(), reversed);
    }

    struct NoSleep;

    impl Sleeper for NoSleep {
        fn sleep(&self, _duration: Duration) {}
    }

    /// Answers every call with deterministic identifiers
    #[derive(Default)]
    struct EchoPlatform {
        created: Mutex<Vec<String>>,
    }

    impl Platform for EchoPlatform {
        fn create(&self, request: &CreateRequest) -> Result<Vec<Output>, PlatformError> {
            self.created.lock().unwrap().push(request.name.clone());
            let id = Output::plain("id", format!("id-{}", request.name));
            Ok(match request.kind {
                ResourceKind::RegistryInstance => Vec::new(),
                ResourceKind::ApiKey => vec![
                    Output::plain("key", format!("key-{}", request.name)),
                    Output::secret("secret", format!("secret-{}", request.name)),
                ],
                ResourceKind::ClusterLink => vec![
                    Output::plain("link_id", "link-1"),
                    Output::plain("link_name", request.inputs.require("link_name")?),
                ],
                ResourceKind::Topic => vec![Output::plain(
                    "topic_name",
                    request.inputs.require(keys::TOPIC_NAME)?,
                )],
                ResourceKind::MirrorTopic => vec![Output::plain(
                    "topic_name",
                    request.inputs.require(keys::SOURCE_TOPIC)?,
                )],
                _ => vec![id],
            })
        }

        fn probe(&self, request: &CreateRequest, _created: &[Output]) -> Result<Probe, PlatformError> {
            Ok(match request.kind {
                ResourceKind::Cluster => Probe::Ready(vec![
                    Output::plain("bootstrap_endpoint", format!("SASL_SSL://{}:9092", request.name)),
                    Output::plain("rest_endpoint", format!("https://{}", request.name)),
                ]),
                ResourceKind::RegistryInstance => Probe::Ready(vec![
                    Output::plain("id", format!("lsrc-{}", request.name)),
                    Output::plain("endpoint", format!("https://{}", request.name)),
                ]),
                _ => Probe::Ready(Vec::new()),
            })
        }

        fn destroy(&self, _request: &DestroyRequest) -> Result<(), PlatformError> {
            Ok(())
        }
    }

    #[test]
    fn test_full_topology_applies_and_rerun_is_noop() {
        let graph = build(&config()).unwrap();
        let platform = Arc::new(EchoPlatform::default());
        let scheduler = Scheduler::new(platform.clone(), ScheduleOptions::default())
            .with_sleeper(Arc::new(NoSleep));

        let outcome = scheduler.apply(&graph, &Ledger::new(), &mut NoProgress).unwrap();
        assert!(outcome.report.is_complete(), "{:?}", outcome.report.failed());
        assert_eq!(platform.created.lock().unwrap().len(), 31);

        let export = outcome.export(true);
        assert_eq!(export["dr-east-app-kafka-key"]["secret"], provision::REDACTED);
        assert_eq!(export["dr-west-mirror"]["topic_name"], "east-orders");

        let rerun = scheduler.apply(&graph, &outcome.ledger, &mut NoProgress).unwrap();
        assert_eq!(platform.created.lock().unwrap().len(), 31);
        assert_eq!(rerun.export(false), outcome.export(false));
    }
}
