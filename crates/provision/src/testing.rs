//! In-memory platform and sleeper for engine tests

use crate::context::{CancelToken, CreateRequest, DestroyRequest, Platform};
use crate::descriptor::{ResourceDescriptor, ResourceKind};
use crate::error::{ErrorCategory, PlatformError};
use crate::gate::{Probe, Sleeper};
use crate::graph::{Graph, GraphBuilder};
use crate::link::{self, LinkPair};
use crate::outputs::Output;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Records requested sleeps instead of sleeping.
#[derive(Default)]
pub(crate) struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub(crate) fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// Platform fake with deterministic outputs and injectable faults.
///
/// Events are recorded as `create:<name>`, `created:<name>` and
/// `destroy:<name>` in the order workers observe them.
#[derive(Default)]
pub(crate) struct FakePlatform {
    events: Mutex<Vec<String>>,
    requests: Mutex<Vec<CreateRequest>>,
    creates: AtomicUsize,
    probes: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fail_create: BTreeSet<String>,
    fail_transient: BTreeSet<String>,
    fail_destroy: BTreeSet<String>,
    delays: BTreeMap<String, Duration>,
    not_ready: Mutex<BTreeMap<String, u32>>,
    cancel_on: Option<(String, CancelToken)>,
}

impl FakePlatform {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Reject the create call of `name` with a permanent error
    pub(crate) fn fail_create(mut self, name: &str) -> Self {
        self.fail_create.insert(name.to_string());
        self
    }

    /// Reject the create call of `name` with a transient error
    pub(crate) fn fail_transient(mut self, name: &str) -> Self {
        self.fail_transient.insert(name.to_string());
        self
    }

    pub(crate) fn fail_destroy(mut self, name: &str) -> Self {
        self.fail_destroy.insert(name.to_string());
        self
    }

    /// Hold the create call of `name` for `millis`
    pub(crate) fn delay(mut self, name: &str, millis: u64) -> Self {
        self.delays
            .insert(name.to_string(), Duration::from_millis(millis));
        self
    }

    /// Answer the first `probes` readiness probes of `name` with not-ready
    pub(crate) fn not_ready_for(self, name: &str, probes: u32) -> Self {
        self.not_ready
            .lock()
            .unwrap()
            .insert(name.to_string(), probes);
        self
    }

    /// Cancel `token` while creating `name`
    pub(crate) fn cancel_during(mut self, name: &str, token: CancelToken) -> Self {
        self.cancel_on = Some((name.to_string(), token));
        self
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    pub(crate) fn request(&self, name: &str) -> Option<CreateRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.name == name)
            .cloned()
    }

    pub(crate) fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub(crate) fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn outputs_for(request: &CreateRequest) -> Vec<Output> {
        let name = &request.name;
        match request.kind {
            ResourceKind::ApiKey => vec![
                Output::plain("key", format!("{name}-key")),
                Output::secret("secret", format!("{name}-secret")),
            ],
            ResourceKind::ClusterLink => vec![
                Output::plain(link::LINK_ID, format!("{name}-id")),
                Output::plain(
                    "link_name",
                    request.inputs.get(link::LINK_NAME).unwrap_or_default(),
                ),
            ],
            ResourceKind::Topic | ResourceKind::MirrorTopic => vec![Output::plain(
                "topic_name",
                request.inputs.get("topic_name").unwrap_or(name.as_str()),
            )],
            ResourceKind::RegistryInstance => Vec::new(),
            _ => vec![Output::plain("id", format!("{name}-id"))],
        }
    }
}

impl Platform for FakePlatform {
    fn create(&self, request: &CreateRequest) -> Result<Vec<Output>, PlatformError> {
        let name = &request.name;
        self.record(format!("create:{name}"));
        self.requests.lock().unwrap().push(request.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some((target, token)) = &self.cancel_on
            && target == name
        {
            token.cancel();
        }
        if let Some(delay) = self.delays.get(name) {
            thread::sleep(*delay);
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.record(format!("created:{name}"));

        if self.fail_create.contains(name) {
            return Err(PlatformError::new(
                ErrorCategory::Permission,
                format!("{name} rejected"),
            ));
        }
        if self.fail_transient.contains(name) {
            return Err(PlatformError::transient(format!("{name} throttled")));
        }
        Ok(Self::outputs_for(request))
    }

    fn probe(&self, request: &CreateRequest, _created: &[Output]) -> Result<Probe, PlatformError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let mut not_ready = self.not_ready.lock().unwrap();
        if let Some(remaining) = not_ready.get_mut(&request.name)
            && *remaining > 0
        {
            *remaining -= 1;
            return Ok(Probe::NotReady);
        }
        let outputs = match request.kind {
            ResourceKind::RegistryInstance => vec![
                Output::plain("id", format!("{}-id", request.name)),
                Output::plain("endpoint", format!("https://{}.example", request.name)),
            ],
            _ => Vec::new(),
        };
        Ok(Probe::Ready(outputs))
    }

    fn destroy(&self, request: &DestroyRequest) -> Result<(), PlatformError> {
        self.record(format!("destroy:{}", request.name));
        if self.fail_destroy.contains(&request.name) {
            return Err(PlatformError::new(
                ErrorCategory::Conflict,
                format!("{} still in use", request.name),
            ));
        }
        Ok(())
    }
}

/// Two regions, a link pair and one mirrored topic:
/// `env-a, env-b, cluster-a, cluster-b, link-fwd, link-rev, topic-a, mirror-a`.
pub(crate) fn dr_scenario() -> Graph {
    let cluster_link = |name: &str, local: &str, remote: &str| {
        ResourceDescriptor::new(name, ResourceKind::ClusterLink)
            .input_from(link::LOCAL_CLUSTER_ID, local, "id")
            .input(link::LOCAL_REST_ENDPOINT, format!("https://{local}"))
            .input(link::LOCAL_API_KEY, format!("{local}-key"))
            .input(link::LOCAL_API_SECRET, format!("{local}-secret"))
            .input_from(link::REMOTE_CLUSTER_ID, remote, "id")
    };

    GraphBuilder::new()
        .resource(ResourceDescriptor::new("env-a", ResourceKind::Environment))
        .resource(ResourceDescriptor::new("env-b", ResourceKind::Environment))
        .resource(
            ResourceDescriptor::new("cluster-a", ResourceKind::Cluster)
                .input_from("environment", "env-a", "id"),
        )
        .resource(
            ResourceDescriptor::new("cluster-b", ResourceKind::Cluster)
                .input_from("environment", "env-b", "id"),
        )
        .resource(cluster_link("link-fwd", "cluster-b", "cluster-a"))
        .resource(
            cluster_link("link-rev", "cluster-a", "cluster-b")
                .input(link::REMOTE_BOOTSTRAP, "SASL_SSL://cluster-b:9092")
                .input(link::REMOTE_API_KEY, "cluster-b-key")
                .input(link::REMOTE_API_SECRET, "cluster-b-secret"),
        )
        .resource(
            ResourceDescriptor::new("topic-a", ResourceKind::Topic)
                .input_from("cluster", "cluster-a", "id")
                .input("topic_name", "a-orders"),
        )
        .resource(
            ResourceDescriptor::new("mirror-a", ResourceKind::MirrorTopic)
                .input_from("cluster", "cluster-b", "id")
                .input_from("topic_name", "topic-a", "topic_name")
                .via_link("dr"),
        )
        .link_pair(LinkPair::new("dr", "link-fwd", "link-rev"))
        .build()
        .unwrap()
}
