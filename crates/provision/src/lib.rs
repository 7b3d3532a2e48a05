//! # Provision
//!
//! A dependency-ordered provisioning engine.
//!
//! This crate turns a set of resource declarations into a validated DAG and
//! converges a backing platform to it: create in topological order with
//! bounded concurrency, destroy in exactly the reverse order, and never touch
//! a resource before everything it depends on is usable.
//!
//! ## Core Concepts
//!
//! - **ResourceDescriptor**: a provisionable entity, its inputs (literals or
//!   other resources' outputs) and its readiness policy
//! - **Graph**: the validated DAG with a deterministic topological order
//! - **Gate**: settle-then-poll readiness for eventually consistent resources
//! - **LinkBootstrapper**: the two-phase protocol for a bidirectional link
//! - **Scheduler**: applies and destroys a graph against a [`Platform`]
//! - **OutputRegistry**: write-once store of produced identifiers and secrets
//! - **Ledger**: what a run created, handed to the next run for idempotence
//!
//! ## Example
//!
//! ```ignore
//! use provision::{
//!     GraphBuilder, Ledger, NoProgress, ResourceDescriptor, ResourceKind,
//!     ScheduleOptions, Scheduler,
//! };
//! use std::sync::Arc;
//!
//! let graph = GraphBuilder::new()
//!     .resource(ResourceDescriptor::new("env", ResourceKind::Environment))
//!     .resource(
//!         ResourceDescriptor::new("cluster", ResourceKind::Cluster)
//!             .input_from("environment", "env", "id"),
//!     )
//!     .build()?;
//!
//! let scheduler = Scheduler::new(Arc::new(MyPlatform), ScheduleOptions::default());
//! let outcome = scheduler.apply(&graph, &Ledger::new(), &mut NoProgress)?;
//! println!("{:?}", outcome.export(true));
//! ```
//!
//! ## Provider Traits
//!
//! - [`Platform`]: creates, probes and destroys resources
//! - [`ProgressCallback`]: receives progress updates
//! - [`Sleeper`]: the waiting primitive used by readiness gates
//!
//! This allows the crate to be used without hard dependencies on
//! specific cloud APIs, UI frameworks, etc.

pub mod context;
pub mod descriptor;
pub mod error;
pub mod gate;
pub mod graph;
pub mod link;
pub mod outputs;
pub mod scheduler;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types at crate root
pub use context::{
    CancelToken, CreateRequest, DestroyRequest, NoProgress, Platform, ProgressCallback,
};
pub use descriptor::{InputValue, Inputs, Readiness, ResourceDescriptor, ResourceKind};
pub use error::{Error, ErrorCategory, PlatformError, Result};
pub use gate::{GateConfig, GatePolicy, GateReport, Probe, Sleeper, ThreadSleeper, await_ready};
pub use graph::{Graph, GraphBuilder};
pub use link::{LinkBootstrapper, LinkPair, LinkPairState, LinkPhase};
pub use outputs::{Export, Output, OutputRegistry, REDACTED, Value};
pub use scheduler::{ChangePolicy, ScheduleOptions, Scheduler};
pub use types::{
    AppliedResource, Disposition, Ledger, Operation, Outcome, ReportEntry, ResourceState,
    RunReport, RunStatus, Summary,
};
