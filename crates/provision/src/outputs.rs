//! Credential/output registry
//!
//! Holds every identifier and secret produced by a run, addressable by
//! `(logical_name, field)`. Records are write-once: the scheduler is the only
//! writer and each resource is dispatched at most once per run, so a second
//! write always means two descriptors claim the same output.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Placeholder substituted for sensitive values at export boundaries.
pub const REDACTED: &str = "<redacted>";

/// A produced value, possibly sensitive.
///
/// Sensitive values never appear in `Debug` or `Display` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    value: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    sensitive: bool,
}

impl Value {
    /// A plain value, safe to log
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            sensitive: false,
        }
    }

    /// A secret value, redacted in logs and redacted exports
    pub fn secret(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            sensitive: true,
        }
    }

    /// The raw value. Callers must not log it when [`Value::is_sensitive`].
    pub fn expose(&self) -> &str {
        &self.value
    }

    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    /// The value as it may appear in logs or redacted exports
    pub fn display_value(&self) -> &str {
        if self.sensitive {
            REDACTED
        } else {
            &self.value
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.display_value())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_value())
    }
}

/// A single output produced by a create or probe call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub field: String,
    #[serde(flatten)]
    pub value: Value,
}

impl Output {
    pub fn plain(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: Value::plain(value),
        }
    }

    pub fn secret(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: Value::secret(value),
        }
    }
}

/// Flat export consumed by external collaborators: `logical_name -> field -> value`.
pub type Export = BTreeMap<String, BTreeMap<String, String>>;

/// Write-once store of outputs, keyed by logical name.
#[derive(Debug, Default, Clone)]
pub struct OutputRegistry {
    records: BTreeMap<String, BTreeMap<String, Value>>,
    ready: BTreeSet<String>,
}

impl OutputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one output field.
    ///
    /// Fails with [`Error::DuplicateOutput`] if the field was already written.
    pub fn put(&mut self, resource: &str, field: &str, value: Value) -> Result<()> {
        let fields = self.records.entry(resource.to_string()).or_default();
        if fields.contains_key(field) {
            return Err(Error::DuplicateOutput {
                resource: resource.to_string(),
                field: field.to_string(),
            });
        }
        fields.insert(field.to_string(), value);
        Ok(())
    }

    /// Record every output of a resource, then mark it readable.
    pub fn publish(&mut self, resource: &str, outputs: &[Output]) -> Result<()> {
        for output in outputs {
            self.put(resource, &output.field, output.value.clone())?;
        }
        self.mark_ready(resource);
        Ok(())
    }

    /// Make a resource's outputs visible to [`OutputRegistry::get`].
    pub fn mark_ready(&mut self, resource: &str) {
        self.ready.insert(resource.to_string());
    }

    /// Whether the resource has reached Ready in this registry
    pub fn is_ready(&self, resource: &str) -> bool {
        self.ready.contains(resource)
    }

    /// Read one output.
    ///
    /// Fails with [`Error::OutputNotFound`] if the producer is not Ready or never
    /// produced the field.
    pub fn get(&self, resource: &str, field: &str) -> Result<&Value> {
        if !self.ready.contains(resource) {
            return Err(Error::OutputNotFound {
                resource: resource.to_string(),
                field: field.to_string(),
            });
        }
        self.records
            .get(resource)
            .and_then(|fields| fields.get(field))
            .ok_or_else(|| Error::OutputNotFound {
                resource: resource.to_string(),
                field: field.to_string(),
            })
    }

    /// All outputs of a resource, in field order
    pub fn outputs_of(&self, resource: &str) -> Vec<Output> {
        self.records
            .get(resource)
            .map(|fields| {
                fields
                    .iter()
                    .map(|(field, value)| Output {
                        field: field.clone(),
                        value: value.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop every record of a destroyed resource.
    pub fn remove(&mut self, resource: &str) {
        self.records.remove(resource);
        self.ready.remove(resource);
    }

    /// Export all Ready outputs.
    ///
    /// With `redact_sensitive`, sensitive fields stay present with the
    /// [`REDACTED`] placeholder so consumers can tell "withheld" from "absent".
    pub fn export_all(&self, redact_sensitive: bool) -> Export {
        self.records
            .iter()
            .filter(|(resource, _)| self.ready.contains(*resource))
            .map(|(resource, fields)| {
                let fields = fields
                    .iter()
                    .map(|(field, value)| {
                        let shown = if redact_sensitive {
                            value.display_value()
                        } else {
                            value.expose()
                        };
                        (field.clone(), shown.to_string())
                    })
                    .collect();
                (resource.clone(), fields)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }
}
