//! Platform and callback traits
//!
//! The engine never talks to a cloud API directly. Callers implement
//! [`Platform`] for their backend and optionally [`ProgressCallback`] for
//! their UI, which keeps this crate free of HTTP and terminal dependencies.

use crate::descriptor::{Inputs, ResourceKind};
use crate::error::PlatformError;
use crate::gate::Probe;
use crate::outputs::Output;
use crate::types::{Disposition, Operation, RunReport};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A fully resolved create call, owned so it can be moved to a worker.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub name: String,
    pub kind: ResourceKind,
    pub inputs: Inputs,
}

/// A destroy call: the resource's resolved inputs plus what its create returned.
#[derive(Debug, Clone)]
pub struct DestroyRequest {
    pub name: String,
    pub kind: ResourceKind,
    pub inputs: Inputs,
    pub outputs: Vec<Output>,
}

impl DestroyRequest {
    /// Look up one of the recorded outputs
    pub fn output(&self, field: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|o| o.field == field)
            .map(|o| o.value.expose())
    }
}

/// Backend that creates, probes and destroys resources.
///
/// Implementations are called from worker threads, one call per resource at
/// a time. Calls are never interrupted; cancellation only stops new dispatch.
pub trait Platform: Send + Sync {
    /// Create the resource and return the outputs known at creation time.
    fn create(&self, request: &CreateRequest) -> Result<Vec<Output>, PlatformError>;

    /// Check whether a created resource is usable yet.
    ///
    /// Only called for resources with poll-after-delay readiness. Outputs
    /// returned with [`Probe::Ready`] are added to the creation outputs.
    fn probe(&self, request: &CreateRequest, created: &[Output]) -> Result<Probe, PlatformError> {
        let _ = (request, created);
        Ok(Probe::Ready(Vec::new()))
    }

    /// Destroy the resource.
    fn destroy(&self, request: &DestroyRequest) -> Result<(), PlatformError>;
}

/// Progress callback for apply and destroy runs
///
/// Called only from the scheduler's coordinating thread.
pub trait ProgressCallback {
    /// Called once before anything is dispatched
    fn on_run_start(&mut self, operation: Operation, total: usize);

    /// Called when a resource is handed to a worker
    fn on_resource_start(&mut self, name: &str, kind: ResourceKind);

    /// Called when a resource reaches its final disposition for the run
    fn on_resource_complete(&mut self, name: &str, disposition: &Disposition);

    /// Called once with the final report
    fn on_run_complete(&mut self, report: &RunReport);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_run_start(&mut self, _operation: Operation, _total: usize) {}
    fn on_resource_start(&mut self, _name: &str, _kind: ResourceKind) {}
    fn on_resource_complete(&mut self, _name: &str, _disposition: &Disposition) {}
    fn on_run_complete(&mut self, _report: &RunReport) {}
}

/// Cooperative cancellation flag shared between the caller and a run.
///
/// Cancelling stops dispatch of resources that have not started; in-flight
/// operations still run to a terminal state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_destroy_request_output_lookup() {
        let request = DestroyRequest {
            name: "topic-east".into(),
            kind: ResourceKind::Topic,
            inputs: Inputs::new(),
            outputs: vec![Output::plain("topic_name", "east-orders")],
        };
        assert_eq!(request.output("topic_name"), Some("east-orders"));
        assert_eq!(request.output("id"), None);
    }
}
