//! Run state, reports and the persisted ledger

use crate::descriptor::ResourceKind;
use crate::error::Error;
use crate::link::LinkPairState;
use crate::outputs::{Export, Output, OutputRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which way a run walks the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Apply,
    Destroy,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apply => write!(f, "apply"),
            Self::Destroy => write!(f, "destroy"),
        }
    }
}

/// Lifecycle state of a resource within a run. Only the scheduler mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Pending,
    Creating,
    Ready,
    Failed,
    Destroying,
    Destroyed,
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Creating => "creating",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Destroying => "destroying",
            Self::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// What a run did with one resource
#[derive(Debug, Clone)]
pub enum Disposition {
    /// Created and passed its readiness gate
    Created,
    /// Recorded by a prior run with identical inputs; no platform call made
    Unchanged,
    /// Destroyed and recreated because its inputs changed
    Replaced,
    /// Torn down
    Destroyed,
    /// Nothing recorded, nothing to tear down
    Absent,
    /// The operation on this resource failed
    Failed { cause: Error },
    /// Never attempted because `by` failed (or was itself blocked by it)
    Blocked { by: String },
    /// Never attempted because the run was cancelled or aborted
    Cancelled,
}

impl Disposition {
    /// Check if the result represents a failure
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Check if the resource was never attempted
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Replaced | Self::Destroyed)
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::Replaced => write!(f, "replaced"),
            Self::Destroyed => write!(f, "destroyed"),
            Self::Absent => write!(f, "absent"),
            Self::Failed { cause } => write!(f, "failed: {cause}"),
            Self::Blocked { by } => write!(f, "blocked by {by}"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Overall result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every resource reached its target state
    Complete,
    /// Some resources failed or were blocked
    Partial,
    /// A link pair was left established in the forward direction only
    PartialLink,
    /// The run was cancelled before every resource was attempted
    Cancelled,
    /// An engine contract violation stopped dispatching
    Aborted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::Partial => write!(f, "partial"),
            Self::PartialLink => write!(f, "partial link"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Final state of one resource
#[derive(Debug, Clone)]
pub struct ReportEntry {
    pub name: String,
    pub kind: ResourceKind,
    pub state: ResourceState,
    pub disposition: Disposition,
}

/// Counts per disposition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub created: usize,
    pub unchanged: usize,
    pub replaced: usize,
    pub destroyed: usize,
    pub absent: usize,
    pub failed: usize,
    pub blocked: usize,
    pub cancelled: usize,
}

impl Summary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.replaced + self.destroyed
    }

    /// Total number of resources accounted for
    pub fn total(&self) -> usize {
        self.total_changes()
            + self.unchanged
            + self.absent
            + self.failed
            + self.blocked
            + self.cancelled
    }

    pub fn add(&mut self, disposition: &Disposition) {
        match disposition {
            Disposition::Created => self.created += 1,
            Disposition::Unchanged => self.unchanged += 1,
            Disposition::Replaced => self.replaced += 1,
            Disposition::Destroyed => self.destroyed += 1,
            Disposition::Absent => self.absent += 1,
            Disposition::Failed { .. } => self.failed += 1,
            Disposition::Blocked { .. } => self.blocked += 1,
            Disposition::Cancelled => self.cancelled += 1,
        }
    }
}

/// Everything a run did, with a status for every logical name.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub operation: Operation,
    /// One entry per resource, in apply order
    pub entries: Vec<ReportEntry>,
    /// Resources handed to the platform, in dispatch order
    pub dispatch_order: Vec<String>,
    /// Link pair states at the end of the run
    pub links: Vec<LinkPairState>,
    /// Contract violation that stopped the run; everything settled before it
    /// is still reported and recorded
    pub aborted: Option<Error>,
    /// Recorded resources that are not part of the graph. A destroy run
    /// cannot tear them down.
    pub orphaned: Vec<String>,
}

impl RunReport {
    pub fn status(&self) -> RunStatus {
        if self.aborted.is_some() {
            return RunStatus::Aborted;
        }
        if self
            .entries
            .iter()
            .any(|e| matches!(e.disposition, Disposition::Cancelled))
        {
            return RunStatus::Cancelled;
        }
        if self.operation == Operation::Apply && self.links.iter().any(LinkPairState::is_partial) {
            return RunStatus::PartialLink;
        }
        if self
            .entries
            .iter()
            .any(|e| e.disposition.is_failed() || e.disposition.is_blocked())
        {
            return RunStatus::Partial;
        }
        if self.operation == Operation::Destroy && !self.orphaned.is_empty() {
            return RunStatus::Partial;
        }
        RunStatus::Complete
    }

    pub fn is_complete(&self) -> bool {
        self.status() == RunStatus::Complete
    }

    pub fn entry(&self, name: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn disposition(&self, name: &str) -> Option<&Disposition> {
        self.entry(name).map(|e| &e.disposition)
    }

    /// Resources in the Ready state
    pub fn ready(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.state == ResourceState::Ready)
            .map(|e| e.name.as_str())
            .collect()
    }

    /// Failed resources with their cause
    pub fn failed(&self) -> Vec<(&str, &Error)> {
        self.entries
            .iter()
            .filter_map(|e| match &e.disposition {
                Disposition::Failed { cause } => Some((e.name.as_str(), cause)),
                _ => None,
            })
            .collect()
    }

    /// Never-attempted resources with the failure that blocked them
    pub fn blocked(&self) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .filter_map(|e| match &e.disposition {
                Disposition::Blocked { by } => Some((e.name.as_str(), by.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Resources a re-run can be expected to make progress on as-is:
    /// retryable failures, blocked and cancelled resources.
    pub fn retryable(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| match &e.disposition {
                Disposition::Failed { cause } => cause.is_retryable(),
                Disposition::Blocked { .. } | Disposition::Cancelled => true,
                _ => false,
            })
            .map(|e| e.name.as_str())
            .collect()
    }

    /// Partial-link errors for pairs left forward-only
    pub fn partial_links(&self) -> Vec<Error> {
        self.links
            .iter()
            .filter(|s| s.is_partial())
            .map(|s| Error::PartialLinkEstablished {
                pair: s.name.clone(),
                forward_link_id: s.forward_link_id.clone(),
            })
            .collect()
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for entry in &self.entries {
            summary.add(&entry.disposition);
        }
        summary
    }
}

/// What a prior run recorded about one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedResource {
    pub kind: ResourceKind,
    /// Digest of the resolved inputs the resource was created with
    pub fingerprint: String,
    /// Created but never passed its readiness gate
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pending: bool,
    #[serde(default)]
    pub outputs: Vec<Output>,
}

/// Durable record of what exists, carried from one run to the next.
///
/// Contains sensitive outputs in the clear; callers persisting it must
/// protect the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub resources: BTreeMap<String, AppliedResource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<LinkPairState>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&AppliedResource> {
        self.resources.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.links.is_empty()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Export every Ready resource's recorded outputs
    pub fn export(&self, redact_sensitive: bool) -> Export {
        let mut registry = OutputRegistry::new();
        for (name, record) in self.resources.iter().filter(|(_, r)| !r.pending) {
            // Records come from one registry per run, so fields are unique
            if registry.publish(name, &record.outputs).is_err() {
                log::warn!("ledger entry {name} has duplicate output fields");
            }
        }
        registry.export_all(redact_sensitive)
    }
}

/// Result of an apply or destroy run
#[derive(Debug, Clone)]
pub struct Outcome {
    pub report: RunReport,
    /// Outputs of every Ready resource at the end of the run
    pub outputs: OutputRegistry,
    /// Ledger to hand to the next run
    pub ledger: Ledger,
}

impl Outcome {
    pub fn status(&self) -> RunStatus {
        self.report.status()
    }

    /// Downstream contract: `logical_name -> {field -> value}`
    pub fn export(&self, redact_sensitive: bool) -> Export {
        self.outputs.export_all(redact_sensitive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformError;
    use crate::link::LinkPhase;

    fn entry(name: &str, state: ResourceState, disposition: Disposition) -> ReportEntry {
        ReportEntry {
            name: name.into(),
            kind: ResourceKind::Topic,
            state,
            disposition,
        }
    }

    fn report(entries: Vec<ReportEntry>) -> RunReport {
        RunReport {
            operation: Operation::Apply,
            entries,
            dispatch_order: Vec::new(),
            links: Vec::new(),
            aborted: None,
            orphaned: Vec::new(),
        }
    }

    #[test]
    fn test_status_partial_and_retryable() {
        let report = report(vec![
            entry("a", ResourceState::Ready, Disposition::Created),
            entry(
                "b",
                ResourceState::Failed,
                Disposition::Failed {
                    cause: Error::CreateFailed {
                        resource: "b".into(),
                        source: PlatformError::transient("HTTP 503"),
                    },
                },
            ),
            entry(
                "c",
                ResourceState::Pending,
                Disposition::Blocked { by: "b".into() },
            ),
            entry(
                "d",
                ResourceState::Failed,
                Disposition::Failed {
                    cause: Error::InputsChanged { resource: "d".into() },
                },
            ),
        ]);

        assert_eq!(report.status(), RunStatus::Partial);
        assert_eq!(report.ready(), vec!["a"]);
        assert_eq!(report.blocked(), vec![("c", "b")]);
        assert_eq!(report.retryable(), vec!["b", "c"]);
        assert_eq!(report.summary().failed, 2);
        assert_eq!(report.summary().total(), 4);
    }

    #[test]
    fn test_status_partial_link_wins_over_partial() {
        let mut report = report(vec![entry(
            "link-rev",
            ResourceState::Failed,
            Disposition::Failed {
                cause: Error::CreateFailed {
                    resource: "link-rev".into(),
                    source: PlatformError::invalid("bad credentials"),
                },
            },
        )]);
        report.links.push(LinkPairState {
            name: "dr".into(),
            phase: LinkPhase::ForwardEstablished,
            forward_link_id: Some("fwd".into()),
            reverse_link_id: None,
        });

        assert_eq!(report.status(), RunStatus::PartialLink);
        assert!(matches!(
            report.partial_links().as_slice(),
            [Error::PartialLinkEstablished { .. }]
        ));
    }

    #[test]
    fn test_status_cancelled() {
        let report = report(vec![
            entry("a", ResourceState::Ready, Disposition::Created),
            entry("b", ResourceState::Pending, Disposition::Cancelled),
        ]);
        assert_eq!(report.status(), RunStatus::Cancelled);
    }

    #[test]
    fn test_status_aborted_wins() {
        let mut report = report(vec![
            entry("a", ResourceState::Ready, Disposition::Created),
            entry("b", ResourceState::Pending, Disposition::Cancelled),
        ]);
        report.aborted = Some(Error::OutputNotFound {
            resource: "a".into(),
            field: "id".into(),
        });
        assert_eq!(report.status(), RunStatus::Aborted);
        assert_eq!(report.status().to_string(), "aborted");
    }

    #[test]
    fn test_orphans_make_destroy_partial() {
        let mut report = report(vec![entry(
            "a",
            ResourceState::Destroyed,
            Disposition::Destroyed,
        )]);
        report.orphaned.push("old-env".into());
        // Apply leaves orphans alone
        assert_eq!(report.status(), RunStatus::Complete);

        report.operation = Operation::Destroy;
        assert_eq!(report.status(), RunStatus::Partial);
    }

    #[test]
    fn test_ledger_export_skips_pending() {
        let mut ledger = Ledger::new();
        ledger.resources.insert(
            "key-east".into(),
            AppliedResource {
                kind: ResourceKind::ApiKey,
                fingerprint: "f".into(),
                pending: false,
                outputs: vec![Output::plain("key", "K"), Output::secret("secret", "S")],
            },
        );
        ledger.resources.insert(
            "sr-east".into(),
            AppliedResource {
                kind: ResourceKind::RegistryInstance,
                fingerprint: "f".into(),
                pending: true,
                outputs: Vec::new(),
            },
        );

        let export = ledger.export(true);
        assert_eq!(export.len(), 1);
        assert_eq!(export["key-east"]["secret"], crate::outputs::REDACTED);
    }

    #[test]
    fn test_ledger_serde_round_trip_keeps_sensitivity() {
        let mut ledger = Ledger::new();
        ledger.resources.insert(
            "key-east".into(),
            AppliedResource {
                kind: ResourceKind::ApiKey,
                fingerprint: "abc".into(),
                pending: false,
                outputs: vec![Output::secret("secret", "S")],
            },
        );

        let json = serde_json::to_string(&ledger).unwrap();
        let back: Ledger = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ledger);
        assert!(back.resources["key-east"].outputs[0].value.is_sensitive());
    }
}
