//! Provisioning scheduler
//!
//! Walks a [`Graph`] in topological order for apply and in reverse for
//! destroy. The coordinating thread owns all run state: the per-resource
//! state table, the output registry, the link bootstrapper and the ledger.
//! Workers on a rayon pool receive owned, already-resolved requests and
//! report back over a channel, so nothing below is shared mutably.
//!
//! A resource is dispatched only once every dependency is Ready (apply) or
//! every dependent is Destroyed (destroy). A failure blocks everything that
//! transitively waits on it while independent branches keep going.

use crate::context::{CancelToken, CreateRequest, DestroyRequest, Platform, ProgressCallback};
use crate::descriptor::{InputValue, Inputs, Readiness, ResourceDescriptor};
use crate::error::{Error, Result};
use crate::gate::{self, GateConfig, GatePolicy, Sleeper, ThreadSleeper};
use crate::graph::Graph;
use crate::link::{LinkBootstrapper, LinkPhase};
use crate::outputs::{Output, OutputRegistry, Value};
use crate::types::{
    AppliedResource, Disposition, Ledger, Operation, Outcome, ReportEntry, ResourceState,
    RunReport,
};
use std::sync::{Arc, mpsc};

/// What to do with a recorded resource whose resolved inputs changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangePolicy {
    /// Fail the resource with [`Error::InputsChanged`] and leave it in place
    #[default]
    Refuse,
    /// Destroy it, then create it again with the new inputs
    Replace,
}

/// Options for apply and destroy runs
#[derive(Debug, Clone, Default)]
pub struct ScheduleOptions {
    /// Maximum in-flight platform operations (`None`: one per resource)
    pub max_concurrency: Option<usize>,
    /// Readiness gate timings
    pub gates: GatePolicy,
    pub on_change: ChangePolicy,
}

/// Applies and destroys resource graphs against a [`Platform`].
pub struct Scheduler {
    platform: Arc<dyn Platform>,
    sleeper: Arc<dyn Sleeper>,
    options: ScheduleOptions,
    cancel: CancelToken,
}

impl Scheduler {
    pub fn new(platform: Arc<dyn Platform>, options: ScheduleOptions) -> Self {
        Self {
            platform,
            sleeper: Arc::new(ThreadSleeper),
            options,
            cancel: CancelToken::new(),
        }
    }

    /// Replace the sleeping primitive used by readiness gates
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Observe an externally owned cancellation token
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels runs of this scheduler
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &ScheduleOptions {
        &self.options
    }

    /// Create every resource of `graph` that `prior` does not already record
    /// with identical inputs.
    ///
    /// Returns `Err` only when the worker pool cannot run. Per-resource
    /// failures are reported in the outcome. An engine contract violation
    /// stops dispatching and lands in [`RunReport::aborted`]; the outcome
    /// still carries everything created before it.
    pub fn apply<P: ProgressCallback>(
        &self,
        graph: &Graph,
        prior: &Ledger,
        progress: &mut P,
    ) -> Result<Outcome> {
        let mut run = Run::new(graph, Operation::Apply, prior);
        progress.on_run_start(Operation::Apply, graph.len());

        let (cancelled, aborted) = self.drive(&mut run, prior, progress)?;
        let outcome = run.finish(cancelled, aborted, progress);

        progress.on_run_complete(&outcome.report);
        log::info!(
            "apply {}: {} dispatched",
            outcome.status(),
            outcome.report.dispatch_order.len()
        );
        Ok(outcome)
    }

    /// Destroy every resource `prior` records, dependents first.
    ///
    /// Records with no counterpart in `graph` are left alone and reported in
    /// [`RunReport::orphaned`].
    pub fn destroy<P: ProgressCallback>(
        &self,
        graph: &Graph,
        prior: &Ledger,
        progress: &mut P,
    ) -> Result<Outcome> {
        let mut run = Run::new(graph, Operation::Destroy, prior);
        progress.on_run_start(Operation::Destroy, graph.len());
        run.seed_from_ledger(progress)?;

        let (cancelled, aborted) = self.drive(&mut run, prior, progress)?;
        let outcome = run.finish(cancelled, aborted, progress);

        progress.on_run_complete(&outcome.report);
        log::info!(
            "destroy {}: {} dispatched",
            outcome.status(),
            outcome.report.dispatch_order.len()
        );
        Ok(outcome)
    }

    /// Dispatch until nothing is runnable and nothing is in flight.
    ///
    /// Returns whether the run was cancelled and the contract violation that
    /// stopped it, if any.
    fn drive<P: ProgressCallback>(
        &self,
        run: &mut Run<'_>,
        prior: &Ledger,
        progress: &mut P,
    ) -> Result<(bool, Option<Error>)> {
        let graph = run.graph;
        let limit = self
            .options
            .max_concurrency
            .unwrap_or(graph.len())
            .max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(limit)
            .thread_name(|i| format!("provision-{i}"))
            .build()
            .map_err(|e| Error::Scheduler(format!("failed to create thread pool: {e}")))?;

        let order: Vec<usize> = match run.operation {
            Operation::Apply => graph.order().to_vec(),
            Operation::Destroy => graph.order().iter().rev().copied().collect(),
        };

        let (tx, rx) = mpsc::channel::<(usize, WorkResult)>();
        let mut in_flight = 0usize;
        let mut cancelled = false;
        let mut fatal: Option<Error> = None;

        loop {
            if !cancelled && self.cancel.is_cancelled() {
                log::warn!(
                    "{} cancelled, waiting for {in_flight} in-flight operation(s)",
                    run.operation
                );
                cancelled = true;
            }

            if !cancelled && fatal.is_none() {
                for &i in &order {
                    if in_flight >= limit {
                        break;
                    }
                    let next = match run.operation {
                        Operation::Apply => run.next_create(i, prior, &self.options, progress),
                        Operation::Destroy => run.next_destroy(i, progress),
                    };
                    match next {
                        Ok(Some(job)) => {
                            let platform = Arc::clone(&self.platform);
                            let sleeper = Arc::clone(&self.sleeper);
                            let tx = tx.clone();
                            pool.spawn(move || {
                                let result = job.run(platform.as_ref(), sleeper.as_ref());
                                // The coordinator outlives every job it spawns
                                let _ = tx.send((i, result));
                            });
                            in_flight += 1;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            log::error!("aborting {}: {e}", run.operation);
                            run.fail(i, e.clone(), progress);
                            fatal = Some(e);
                            break;
                        }
                    }
                }
            }

            if in_flight == 0 {
                break;
            }

            let (i, result) = rx
                .recv()
                .map_err(|_| Error::Scheduler("worker channel closed".into()))?;
            in_flight -= 1;
            if let Err(e) = run.complete(i, result, progress) {
                log::error!("aborting {}: {e}", run.operation);
                run.fail(i, e.clone(), progress);
                fatal.get_or_insert(e);
            }
        }

        Ok((cancelled, fatal))
    }
}

/// Owned unit of work handed to a worker thread
enum Job {
    Create {
        request: CreateRequest,
        readiness: Readiness,
        gate: GateConfig,
        /// Recorded resource to destroy first (replace policy)
        previous: Option<DestroyRequest>,
        /// Outputs of a prior create whose gate never passed
        created: Option<Vec<Output>>,
    },
    Destroy {
        request: DestroyRequest,
    },
}

enum WorkResult {
    Ready(Vec<Output>),
    /// Created, but the readiness gate failed
    NotReady {
        outputs: Vec<Output>,
        error: Error,
    },
    Failed {
        error: Error,
        previous_destroyed: bool,
    },
    Destroyed,
}

impl Job {
    fn run(self, platform: &dyn Platform, sleeper: &dyn Sleeper) -> WorkResult {
        match self {
            Job::Destroy { request } => match platform.destroy(&request) {
                Ok(()) => WorkResult::Destroyed,
                Err(source) => WorkResult::Failed {
                    error: Error::DestroyFailed {
                        resource: request.name,
                        source,
                    },
                    previous_destroyed: false,
                },
            },
            Job::Create {
                request,
                readiness,
                gate,
                previous,
                created,
            } => {
                let replacing = previous.is_some();
                if let Some(previous) = previous {
                    log::info!("{}: inputs changed, destroying before recreate", request.name);
                    if let Err(source) = platform.destroy(&previous) {
                        return WorkResult::Failed {
                            error: Error::DestroyFailed {
                                resource: previous.name,
                                source,
                            },
                            previous_destroyed: false,
                        };
                    }
                }

                let created = match created {
                    Some(outputs) => outputs,
                    None => match platform.create(&request) {
                        Ok(outputs) => outputs,
                        Err(source) => {
                            return WorkResult::Failed {
                                error: Error::CreateFailed {
                                    resource: request.name.clone(),
                                    source,
                                },
                                previous_destroyed: replacing,
                            };
                        }
                    },
                };

                match gate::await_ready(&request.name, readiness, &gate, sleeper, || {
                    platform.probe(&request, &created)
                }) {
                    Ok(report) => {
                        let mut outputs = created;
                        outputs.extend(report.outputs);
                        WorkResult::Ready(outputs)
                    }
                    Err(error) => WorkResult::NotReady {
                        outputs: created,
                        error,
                    },
                }
            }
        }
    }
}

/// Coordinator-side state of one run
struct Run<'g> {
    graph: &'g Graph,
    operation: Operation,
    states: Vec<ResourceState>,
    dispositions: Vec<Option<Disposition>>,
    fingerprints: Vec<Option<String>>,
    replacing: Vec<bool>,
    dispatch_order: Vec<String>,
    registry: OutputRegistry,
    links: LinkBootstrapper,
    ledger: Ledger,
}

impl<'g> Run<'g> {
    fn new(graph: &'g Graph, operation: Operation, prior: &Ledger) -> Self {
        Self {
            graph,
            operation,
            states: vec![ResourceState::Pending; graph.len()],
            dispositions: vec![None; graph.len()],
            fingerprints: vec![None; graph.len()],
            replacing: vec![false; graph.len()],
            dispatch_order: Vec::new(),
            registry: OutputRegistry::new(),
            links: LinkBootstrapper::new(graph.links()),
            ledger: prior.clone(),
        }
    }

    /// Record a final disposition for resource `i`
    fn settle<P: ProgressCallback>(
        &mut self,
        i: usize,
        state: ResourceState,
        disposition: Disposition,
        progress: &mut P,
    ) {
        progress.on_resource_complete(&self.graph.node(i).name, &disposition);
        self.states[i] = state;
        self.dispositions[i] = Some(disposition);
    }

    /// Settle resource `i` as failed unless it already has a disposition
    fn fail<P: ProgressCallback>(&mut self, i: usize, cause: Error, progress: &mut P) {
        if self.dispositions[i].is_none() {
            self.settle(i, ResourceState::Failed, Disposition::Failed { cause }, progress);
        }
    }

    /// The failure that prevents `neighbors`' waiter from ever running
    fn blocker(&self, neighbors: &[usize]) -> Option<String> {
        neighbors
            .iter()
            .find_map(|&n| match (&self.states[n], &self.dispositions[n]) {
                (_, Some(Disposition::Blocked { by })) => Some(by.clone()),
                (ResourceState::Failed, _) => Some(self.graph.node(n).name.clone()),
                _ => None,
            })
    }

    /// Next create job for resource `i`, if it can run now.
    ///
    /// Resources that need no platform call (unchanged, refused) are settled
    /// here directly.
    fn next_create<P: ProgressCallback>(
        &mut self,
        i: usize,
        prior: &Ledger,
        options: &ScheduleOptions,
        progress: &mut P,
    ) -> Result<Option<Job>> {
        if self.states[i] != ResourceState::Pending || self.dispositions[i].is_some() {
            return Ok(None);
        }
        let graph = self.graph;
        if let Some(by) = self.blocker(graph.deps(i)) {
            self.settle(i, ResourceState::Pending, Disposition::Blocked { by }, progress);
            return Ok(None);
        }
        if !graph
            .deps(i)
            .iter()
            .all(|&d| self.states[d] == ResourceState::Ready)
        {
            return Ok(None);
        }
        let desc = graph.node(i);
        if !self.links.may_dispatch(&desc.name, desc.via_link.as_deref()) {
            return Ok(None);
        }

        let mut inputs = resolve_inputs(desc, &self.registry)?;
        self.links.prepare(&desc.name, &mut inputs)?;
        let fingerprint = inputs.fingerprint(desc.kind);
        let request = CreateRequest {
            name: desc.name.clone(),
            kind: desc.kind,
            inputs,
        };

        let mut previous = None;
        let mut created = None;
        if let Some(record) = prior.get(&desc.name) {
            if record.fingerprint == fingerprint {
                if !record.pending {
                    log::debug!("{}: unchanged, restoring recorded outputs", desc.name);
                    self.registry.publish(&desc.name, &record.outputs)?;
                    self.links.on_ready(&desc.name, &record.outputs);
                    self.settle(i, ResourceState::Ready, Disposition::Unchanged, progress);
                    return Ok(None);
                }
                log::info!("{}: created by a prior run, resuming readiness gate", desc.name);
                created = Some(record.outputs.clone());
            } else {
                match options.on_change {
                    ChangePolicy::Refuse => {
                        log::warn!("{}: inputs changed, refusing to modify", desc.name);
                        let cause = Error::InputsChanged {
                            resource: desc.name.clone(),
                        };
                        self.settle(i, ResourceState::Failed, Disposition::Failed { cause }, progress);
                        return Ok(None);
                    }
                    ChangePolicy::Replace => {
                        self.replacing[i] = true;
                        previous = Some(DestroyRequest {
                            name: desc.name.clone(),
                            kind: desc.kind,
                            inputs: request.inputs.clone(),
                            outputs: record.outputs.clone(),
                        });
                    }
                }
            }
        }

        log::info!("creating {} ({})", desc.name, desc.kind);
        self.fingerprints[i] = Some(fingerprint);
        self.states[i] = ResourceState::Creating;
        self.dispatch_order.push(desc.name.clone());
        progress.on_resource_start(&desc.name, desc.kind);

        Ok(Some(Job::Create {
            request,
            readiness: desc.readiness,
            gate: options.gates.for_kind(desc.kind).clone(),
            previous,
            created,
        }))
    }

    /// Next destroy job for resource `i`, if it can run now.
    fn next_destroy<P: ProgressCallback>(
        &mut self,
        i: usize,
        progress: &mut P,
    ) -> Result<Option<Job>> {
        if self.states[i] != ResourceState::Ready || self.dispositions[i].is_some() {
            return Ok(None);
        }
        let graph = self.graph;
        if let Some(by) = self.blocker(graph.dependents(i)) {
            self.settle(i, ResourceState::Ready, Disposition::Blocked { by }, progress);
            return Ok(None);
        }
        if !graph
            .dependents(i)
            .iter()
            .all(|&d| self.states[d] == ResourceState::Destroyed)
        {
            return Ok(None);
        }

        let desc = graph.node(i);
        let Some(record) = self.ledger.get(&desc.name) else {
            self.settle(i, ResourceState::Destroyed, Disposition::Absent, progress);
            return Ok(None);
        };
        let request = DestroyRequest {
            name: desc.name.clone(),
            kind: desc.kind,
            inputs: resolve_available_inputs(desc, &self.registry),
            outputs: record.outputs.clone(),
        };

        log::info!("destroying {} ({})", desc.name, desc.kind);
        self.states[i] = ResourceState::Destroying;
        self.dispatch_order.push(desc.name.clone());
        progress.on_resource_start(&desc.name, desc.kind);
        Ok(Some(Job::Destroy { request }))
    }

    /// Apply a worker's result to the run state.
    fn complete<P: ProgressCallback>(
        &mut self,
        i: usize,
        result: WorkResult,
        progress: &mut P,
    ) -> Result<()> {
        let graph = self.graph;
        let desc = graph.node(i);
        let name = &desc.name;

        match result {
            WorkResult::Ready(outputs) => {
                // Recorded first: it exists on the platform whatever happens next
                self.ledger.resources.insert(
                    name.clone(),
                    AppliedResource {
                        kind: desc.kind,
                        fingerprint: self.fingerprints[i].clone().unwrap_or_default(),
                        pending: false,
                        outputs: outputs.clone(),
                    },
                );
                self.registry.publish(name, &outputs)?;
                self.links.on_ready(name, &outputs);
                let disposition = if self.replacing[i] {
                    Disposition::Replaced
                } else {
                    Disposition::Created
                };
                log::info!("{name} is ready");
                self.settle(i, ResourceState::Ready, disposition, progress);
            }
            WorkResult::NotReady { outputs, error } => {
                log::error!("{error}");
                self.ledger.resources.insert(
                    name.clone(),
                    AppliedResource {
                        kind: desc.kind,
                        fingerprint: self.fingerprints[i].clone().unwrap_or_default(),
                        pending: true,
                        outputs,
                    },
                );
                self.settle(
                    i,
                    ResourceState::Failed,
                    Disposition::Failed { cause: error },
                    progress,
                );
            }
            WorkResult::Failed {
                error,
                previous_destroyed,
            } => {
                log::error!("{error}");
                if previous_destroyed {
                    self.ledger.resources.remove(name);
                }
                self.settle(
                    i,
                    ResourceState::Failed,
                    Disposition::Failed { cause: error },
                    progress,
                );
            }
            WorkResult::Destroyed => {
                log::info!("{name} destroyed");
                self.registry.remove(name);
                self.links.on_destroyed(name);
                self.ledger.resources.remove(name);
                self.settle(i, ResourceState::Destroyed, Disposition::Destroyed, progress);
            }
        }
        Ok(())
    }

    /// Load the recorded outputs and link phases a destroy run starts from.
    fn seed_from_ledger<P: ProgressCallback>(&mut self, progress: &mut P) -> Result<()> {
        let graph = self.graph;
        for &i in graph.order() {
            let name = &graph.node(i).name;
            match self.ledger.get(name) {
                Some(record) => {
                    self.registry.publish(name, &record.outputs)?;
                    self.links.on_ready(name, &record.outputs);
                    self.states[i] = ResourceState::Ready;
                }
                None => {
                    self.settle(i, ResourceState::Destroyed, Disposition::Absent, progress);
                }
            }
        }
        Ok(())
    }

    /// Settle everything never dispatched and build the outcome.
    fn finish<P: ProgressCallback>(
        mut self,
        cancelled: bool,
        aborted: Option<Error>,
        progress: &mut P,
    ) -> Outcome {
        let graph = self.graph;
        let stopped = cancelled || aborted.is_some();
        let order: Vec<usize> = match self.operation {
            Operation::Apply => graph.order().to_vec(),
            Operation::Destroy => graph.order().iter().rev().copied().collect(),
        };

        for i in order {
            if self.dispositions[i].is_some() {
                continue;
            }
            let neighbors = match self.operation {
                Operation::Apply => graph.deps(i),
                Operation::Destroy => graph.dependents(i),
            };
            let disposition = match self.blocker(neighbors) {
                Some(by) => Disposition::Blocked { by },
                None if stopped => Disposition::Cancelled,
                None => {
                    let desc = graph.node(i);
                    Disposition::Blocked {
                        by: desc.via_link.clone().unwrap_or_else(|| desc.name.clone()),
                    }
                }
            };
            let state = self.states[i];
            self.settle(i, state, disposition, progress);
        }

        let entries = graph
            .order()
            .iter()
            .map(|&i| {
                let desc = graph.node(i);
                ReportEntry {
                    name: desc.name.clone(),
                    kind: desc.kind,
                    state: self.states[i],
                    disposition: self.dispositions[i]
                        .take()
                        .unwrap_or(Disposition::Cancelled),
                }
            })
            .collect();

        let orphaned: Vec<String> = self
            .ledger
            .resources
            .keys()
            .filter(|name| graph.descriptor(name).is_none())
            .cloned()
            .collect();
        if self.operation == Operation::Destroy && !orphaned.is_empty() {
            log::warn!(
                "{} recorded resource(s) not in the graph were left in place: {}",
                orphaned.len(),
                orphaned.join(", ")
            );
        }

        let links = self.links.states();
        self.ledger.links = links
            .iter()
            .filter(|s| s.phase != LinkPhase::Unstarted)
            .cloned()
            .collect();

        Outcome {
            report: RunReport {
                operation: self.operation,
                entries,
                dispatch_order: self.dispatch_order,
                links,
                aborted,
                orphaned,
            },
            outputs: self.registry,
            ledger: self.ledger,
        }
    }
}

/// Replace every output reference with the referenced value.
///
/// Every producer is Ready by the time this runs, so a missing output is an
/// engine contract violation.
fn resolve_inputs(desc: &ResourceDescriptor, registry: &OutputRegistry) -> Result<Inputs> {
    let mut inputs = Inputs::new();
    for (key, value) in &desc.inputs {
        let resolved = match value {
            InputValue::Literal(literal) => Value::plain(literal.clone()),
            InputValue::Output { resource, field } => registry.get(resource, field)?.clone(),
        };
        inputs.insert(key.clone(), resolved);
    }
    Ok(inputs)
}

/// Resolve whatever inputs the recorded state still provides (teardown).
fn resolve_available_inputs(desc: &ResourceDescriptor, registry: &OutputRegistry) -> Inputs {
    let mut inputs = Inputs::new();
    for (key, value) in &desc.inputs {
        match value {
            InputValue::Literal(literal) => inputs.insert(key.clone(), Value::plain(literal.clone())),
            InputValue::Output { resource, field } => {
                if let Ok(resolved) = registry.get(resource, field) {
                    inputs.insert(key.clone(), resolved.clone());
                }
            }
        }
    }
    inputs
}
