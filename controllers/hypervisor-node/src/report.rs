//! Outcome of a provisioning run
//!
//! Secondary steps that fail do not abort the run. They are logged and kept
//! here so callers and tests can see what degraded.

use crate::hypervisor::InitSummary;
use crate::identity::NodeIdentity;
use crate::registrar::RegistrationOutcome;
use std::fmt;
use tracing::warn;

/// Category of a non-fatal failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Facts unavailable; defaults used
    FactResolution,
    /// Storage, network, project or profile change not applied
    Configuration,
    /// Completion label not written
    SignalPublish,
    /// Periodic trust-secret refresh failed
    TrustRefresh,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WarningKind::FactResolution => "fact-resolution",
            WarningKind::Configuration => "configuration",
            WarningKind::SignalPublish => "signal-publish",
            WarningKind::TrustRefresh => "trust-refresh",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionWarning {
    pub kind: WarningKind,
    pub message: String,
}

/// Collected warnings of one run
#[derive(Debug, Clone, Default)]
pub struct Warnings(Vec<ProvisionWarning>);

impl Warnings {
    /// Log and record a warning
    pub fn push(&mut self, kind: WarningKind, message: impl Into<String>) {
        let message = message.into();
        warn!("[{}] {}", kind, message);
        self.0.push(ProvisionWarning { kind, message });
    }

    #[cfg(test)]
    pub fn count(&self, kind: WarningKind) -> usize {
        self.0.iter().filter(|w| w.kind == kind).count()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<ProvisionWarning> {
        self.0
    }
}

/// What a pipeline run did
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// The completion label was already present; nothing ran
    pub short_circuited: bool,
    pub identity: Option<NodeIdentity>,
    /// Present when initialization ran
    pub initialization: Option<InitSummary>,
    pub registration: Option<RegistrationOutcome>,
    pub validated: bool,
    pub signal_published: bool,
    pub warnings: Vec<ProvisionWarning>,
}

impl PipelineReport {
    pub fn short_circuit() -> Self {
        Self {
            short_circuited: true,
            ..Default::default()
        }
    }

    pub fn warning_count(&self, kind: WarningKind) -> usize {
        self.warnings.iter().filter(|w| w.kind == kind).count()
    }
}
