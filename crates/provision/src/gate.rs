//! Eventual-consistency gate
//!
//! Some resources exist on the platform before they are usable: a schema
//! registry is provisioned asynchronously after its environment, a dedicated
//! cluster reports `PROVISIONING` for a long while. The gate makes that wait
//! explicit: sleep a settle period, then probe with exponential backoff up to
//! a probe ceiling.

use crate::descriptor::{Readiness, ResourceKind};
use crate::error::{Error, PlatformError, Result};
use crate::outputs::Output;
use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

/// Timing of a poll-after-delay gate.
#[derive(Debug, Clone, PartialEq)]
pub struct GateConfig {
    /// Minimum wait before the first probe
    pub settle: Duration,
    /// Delay after the first failed probe
    pub initial_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between probes
    pub max_delay: Duration,
    /// Maximum number of probes before giving up
    pub max_probes: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(30),
            initial_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
            max_probes: 10,
        }
    }
}

impl GateConfig {
    /// Calculate the delay after a failed probe (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        // Beyond what Duration can hold the cap itself applies
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// Upper bound on the time a gate can spend waiting
    pub fn worst_case(&self) -> Duration {
        (0..self.max_probes.saturating_sub(1))
            .map(|a| self.delay_for_attempt(a))
            .fold(self.settle, Duration::saturating_add)
    }
}

/// Gate timings with per-kind overrides.
#[derive(Debug, Clone, Default)]
pub struct GatePolicy {
    pub default: GateConfig,
    pub overrides: BTreeMap<ResourceKind, GateConfig>,
}

impl GatePolicy {
    pub fn new(default: GateConfig) -> Self {
        Self {
            default,
            overrides: BTreeMap::new(),
        }
    }

    /// Use `config` for every resource of `kind`
    pub fn with_override(mut self, kind: ResourceKind, config: GateConfig) -> Self {
        self.overrides.insert(kind, config);
        self
    }

    pub fn for_kind(&self, kind: ResourceKind) -> &GateConfig {
        self.overrides.get(&kind).unwrap_or(&self.default)
    }
}

/// Blocking wait primitive, injectable so tests can observe delays.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Result of a single readiness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Usable; may carry outputs only known once the resource is queryable
    Ready(Vec<Output>),
    /// Not queryable yet
    NotReady,
}

/// What the gate observed on the way to Ready.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateReport {
    /// Number of probes performed (0 for immediate readiness)
    pub probes: u32,
    /// Outputs returned by the successful probe
    pub outputs: Vec<Output>,
}

/// Block until a freshly created resource is usable.
///
/// `Immediate` returns at once without probing. `PollAfterDelay` sleeps
/// `config.settle`, then probes up to `config.max_probes` times. Retryable
/// probe errors count as "not ready"; any other probe error fails the gate
/// with [`Error::CreateFailed`]. Exhausting the ceiling fails with
/// [`Error::ResourceNotReady`].
pub fn await_ready<F>(
    resource: &str,
    readiness: Readiness,
    config: &GateConfig,
    sleeper: &dyn Sleeper,
    mut probe: F,
) -> Result<GateReport>
where
    F: FnMut() -> std::result::Result<Probe, PlatformError>,
{
    if readiness == Readiness::Immediate {
        return Ok(GateReport::default());
    }

    log::debug!(
        "{resource}: settling for {:?} before first readiness probe",
        config.settle
    );
    sleeper.sleep(config.settle);

    let mut probes = 0;
    for attempt in 0..config.max_probes {
        probes += 1;
        match probe() {
            Ok(Probe::Ready(outputs)) => {
                log::debug!("{resource}: ready after {probes} probe(s)");
                return Ok(GateReport { probes, outputs });
            }
            Ok(Probe::NotReady) => {
                log::debug!("{resource}: probe {probes}/{} not ready", config.max_probes);
            }
            Err(e) if e.is_retryable() => {
                log::warn!("{resource}: probe {probes} failed ({e}), treating as not ready");
            }
            Err(e) => {
                return Err(Error::CreateFailed {
                    resource: resource.to_string(),
                    source: e,
                });
            }
        }

        if attempt + 1 < config.max_probes {
            sleeper.sleep(config.delay_for_attempt(attempt));
        }
    }

    Err(Error::ResourceNotReady {
        resource: resource.to_string(),
        attempts: probes,
    })
}
