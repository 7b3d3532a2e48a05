//! Bidirectional link bootstrapper
//!
//! A bidirectional link between clusters A and B is authored in two phases:
//!
//! 1. **Forward**: a link on B in `INBOUND` connection mode, naming A as the
//!    remote peer and authenticated with B's own credentials only.
//! 2. **Reverse**: a link on A in `OUTBOUND` mode, authenticated with A's
//!    credentials and carrying B's credentials for the remote side.
//!
//! The reverse phase cannot succeed before the forward link exists, and
//! mirror topics cannot be created before both phases are Ready. The graph
//! builder turns both rules into edges; the bootstrapper additionally tracks
//! the pair's phase, injects the phase-specific inputs, and refuses dispatch
//! when the phase does not allow it.

use crate::descriptor::Inputs;
use crate::error::{Error, Result};
use crate::outputs::{Output, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Injected: `INBOUND` for the forward phase, `OUTBOUND` for the reverse phase.
pub const CONNECTION_MODE: &str = "connection_mode";
/// Injected into the reverse phase: the forward link's identifier.
pub const FORWARD_LINK_ID: &str = "forward_link_id";
/// Injected: name of the link pair, shared by both phases.
pub const LINK_NAME: &str = "link_name";
/// Output field carrying the platform's link identifier.
pub const LINK_ID: &str = "link_id";

pub const LOCAL_CLUSTER_ID: &str = "local_cluster_id";
pub const LOCAL_REST_ENDPOINT: &str = "local_rest_endpoint";
pub const LOCAL_API_KEY: &str = "local_api_key";
pub const LOCAL_API_SECRET: &str = "local_api_secret";
pub const REMOTE_CLUSTER_ID: &str = "remote_cluster_id";
pub const REMOTE_BOOTSTRAP: &str = "remote_bootstrap";
pub const REMOTE_API_KEY: &str = "remote_api_key";
pub const REMOTE_API_SECRET: &str = "remote_api_secret";

pub const INBOUND: &str = "INBOUND";
pub const OUTBOUND: &str = "OUTBOUND";

const FORWARD_REQUIRED: &[&str] = &[
    LOCAL_CLUSTER_ID,
    LOCAL_REST_ENDPOINT,
    LOCAL_API_KEY,
    LOCAL_API_SECRET,
    REMOTE_CLUSTER_ID,
];

const REVERSE_REQUIRED: &[&str] = &[
    LOCAL_CLUSTER_ID,
    LOCAL_REST_ENDPOINT,
    LOCAL_API_KEY,
    LOCAL_API_SECRET,
    REMOTE_CLUSTER_ID,
    REMOTE_BOOTSTRAP,
    REMOTE_API_KEY,
    REMOTE_API_SECRET,
];

/// Declaration of a bidirectional link: two cluster-link resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPair {
    /// Link name shared by both phases
    pub name: String,
    /// Logical name of the forward (INBOUND) phase resource
    pub forward: String,
    /// Logical name of the reverse (OUTBOUND) phase resource
    pub reverse: String,
}

impl LinkPair {
    pub fn new(
        name: impl Into<String>,
        forward: impl Into<String>,
        reverse: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            forward: forward.into(),
            reverse: reverse.into(),
        }
    }
}

/// Which phase a cluster-link resource implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    Forward,
    Reverse,
}

/// Bootstrap progress of a link pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPhase {
    Unstarted,
    ForwardEstablished,
    BidirectionalEstablished,
}

impl fmt::Display for LinkPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unstarted => write!(f, "unstarted"),
            Self::ForwardEstablished => write!(f, "forward only"),
            Self::BidirectionalEstablished => write!(f, "bidirectional"),
        }
    }
}

/// Tracked state of one link pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPairState {
    pub name: String,
    pub phase: LinkPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_link_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse_link_id: Option<String>,
}

impl LinkPairState {
    fn unstarted(name: &str) -> Self {
        Self {
            name: name.to_string(),
            phase: LinkPhase::Unstarted,
            forward_link_id: None,
            reverse_link_id: None,
        }
    }

    /// Forward link exists but the reverse phase never completed
    pub fn is_partial(&self) -> bool {
        self.phase == LinkPhase::ForwardEstablished
    }
}

/// Phase tracker and input preparer for all declared link pairs.
///
/// Owned by the scheduler's coordinating thread, like every other piece of
/// run state.
#[derive(Debug, Clone)]
pub struct LinkBootstrapper {
    pairs: Vec<LinkPair>,
    states: BTreeMap<String, LinkPairState>,
}

impl LinkBootstrapper {
    pub fn new(pairs: &[LinkPair]) -> Self {
        let states = pairs
            .iter()
            .map(|p| (p.name.clone(), LinkPairState::unstarted(&p.name)))
            .collect();
        Self {
            pairs: pairs.to_vec(),
            states,
        }
    }

    /// The pair and phase a resource implements, if it is a link phase
    pub fn role_of(&self, resource: &str) -> Option<(&LinkPair, LinkRole)> {
        self.pairs.iter().find_map(|p| {
            if p.forward == resource {
                Some((p, LinkRole::Forward))
            } else if p.reverse == resource {
                Some((p, LinkRole::Reverse))
            } else {
                None
            }
        })
    }

    pub fn state(&self, pair: &str) -> Option<&LinkPairState> {
        self.states.get(pair)
    }

    /// All pair states, in pair-name order
    pub fn states(&self) -> Vec<LinkPairState> {
        self.states.values().cloned().collect()
    }

    /// Pairs left with only the forward link in place
    pub fn partial_links(&self) -> Vec<Error> {
        self.states
            .values()
            .filter(|s| s.is_partial())
            .map(|s| Error::PartialLinkEstablished {
                pair: s.name.clone(),
                forward_link_id: s.forward_link_id.clone(),
            })
            .collect()
    }

    /// Whether the phase machine allows dispatching `resource` now.
    ///
    /// The reverse phase needs `ForwardEstablished`; anything routed through a
    /// pair (`via_link`) needs `BidirectionalEstablished`.
    pub fn may_dispatch(&self, resource: &str, via_link: Option<&str>) -> bool {
        if let Some((pair, LinkRole::Reverse)) = self.role_of(resource) {
            return self.phase(&pair.name) == LinkPhase::ForwardEstablished;
        }
        if let Some(pair) = via_link {
            return self.phase(pair) == LinkPhase::BidirectionalEstablished;
        }
        true
    }

    /// Inject the phase-specific inputs for a link phase and check that the
    /// credentials it needs were resolved.
    pub fn prepare(&self, resource: &str, inputs: &mut Inputs) -> Result<()> {
        let Some((pair, role)) = self.role_of(resource) else {
            return Ok(());
        };

        let invalid = |message: String| Error::InvalidLinkPair {
            pair: pair.name.clone(),
            message,
        };

        inputs.insert(LINK_NAME, Value::plain(pair.name.clone()));
        let required = match role {
            LinkRole::Forward => {
                inputs.insert(CONNECTION_MODE, Value::plain(INBOUND));
                FORWARD_REQUIRED
            }
            LinkRole::Reverse => {
                let state = self.states.get(&pair.name);
                let forward_id = state
                    .filter(|s| s.phase == LinkPhase::ForwardEstablished)
                    .and_then(|s| s.forward_link_id.clone())
                    .ok_or_else(|| {
                        invalid(format!(
                            "reverse phase {resource} prepared before the forward link is established"
                        ))
                    })?;
                inputs.insert(CONNECTION_MODE, Value::plain(OUTBOUND));
                inputs.insert(FORWARD_LINK_ID, Value::plain(forward_id));
                REVERSE_REQUIRED
            }
        };

        if let Some(missing) = required.iter().find(|key| !inputs.contains(key)) {
            return Err(invalid(format!("{resource} is missing input {missing}")));
        }
        Ok(())
    }

    /// Advance the phase machine after a link phase reached Ready.
    pub fn on_ready(&mut self, resource: &str, outputs: &[Output]) {
        let Some((pair, role)) = self.role_of(resource) else {
            return;
        };
        let name = pair.name.clone();
        let link_id = outputs
            .iter()
            .find(|o| o.field == LINK_ID)
            .map(|o| o.value.expose().to_string());

        let state = self
            .states
            .entry(name.clone())
            .or_insert_with(|| LinkPairState::unstarted(&name));
        match role {
            LinkRole::Forward => {
                state.forward_link_id = link_id;
                if state.phase == LinkPhase::Unstarted {
                    state.phase = LinkPhase::ForwardEstablished;
                }
            }
            LinkRole::Reverse => {
                state.reverse_link_id = link_id;
                state.phase = LinkPhase::BidirectionalEstablished;
            }
        }
        log::info!("link pair {name}: {}", state.phase);
    }

    /// Roll the phase machine back after a link phase was destroyed.
    ///
    /// Once both phases are gone the pair is back to `Unstarted`.
    pub fn on_destroyed(&mut self, resource: &str) {
        let Some((pair, role)) = self.role_of(resource) else {
            return;
        };
        let name = pair.name.clone();
        if let Some(state) = self.states.get_mut(&name) {
            match role {
                LinkRole::Reverse => {
                    state.reverse_link_id = None;
                    if state.phase == LinkPhase::BidirectionalEstablished {
                        state.phase = LinkPhase::ForwardEstablished;
                    }
                }
                LinkRole::Forward => {
                    *state = LinkPairState::unstarted(&name);
                }
            }
        }
    }

    fn phase(&self, pair: &str) -> LinkPhase {
        self.states
            .get(pair)
            .map_or(LinkPhase::Unstarted, |s| s.phase)
    }
}
