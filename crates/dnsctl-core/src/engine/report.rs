// # Run report
//
// What a run planned, applied and failed at, per domain and provider. The
// CLI derives its exit code from it.

use serde::Serialize;

use crate::audit::AuditIssue;

/// Whether corrections are only planned or also applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Plan and print
    Preview,
    /// Plan and apply
    Push,
}

/// Outcome for one provider or registrar of a domain
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProviderReport {
    /// Provider instance name
    pub name: String,
    /// Planned correction messages, in emission order
    pub corrections: Vec<String>,
    /// Number of actual changes the corrections carry
    pub changes: usize,
    /// Corrections applied successfully
    pub applied: usize,
    /// Planning or execution failures
    pub errors: Vec<String>,
}

impl ProviderReport {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Outcome for one domain
#[derive(Debug, Clone, Default, Serialize)]
pub struct DomainReport {
    /// Zone name
    pub domain: String,
    /// Audit findings, warnings included
    pub audit: Vec<AuditIssue>,
    /// DNS providers, in declaration order
    pub providers: Vec<ProviderReport>,
    /// Registrar, if the domain has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registrar: Option<ProviderReport>,
    /// Failures not attributable to a single provider
    pub errors: Vec<String>,
}

impl DomainReport {
    pub(crate) fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Self::default()
        }
    }

    fn all_providers(&self) -> impl Iterator<Item = &ProviderReport> {
        self.providers.iter().chain(self.registrar.iter())
    }

    /// Planned changes across providers and registrar
    pub fn changes(&self) -> usize {
        self.all_providers().map(|p| p.changes).sum()
    }

    /// Errors across providers, registrar and the domain itself
    pub fn error_count(&self) -> usize {
        self.errors.len() + self.all_providers().map(|p| p.errors.len()).sum::<usize>()
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Preview or push
    pub mode: Mode,
    /// Domains, in document order
    pub domains: Vec<DomainReport>,
}

impl RunReport {
    /// Planned changes across all domains
    pub fn total_changes(&self) -> usize {
        self.domains.iter().map(DomainReport::changes).sum()
    }

    /// Errors across all domains
    pub fn total_errors(&self) -> usize {
        self.domains.iter().map(DomainReport::error_count).sum()
    }

    /// Whether anything failed
    pub fn has_errors(&self) -> bool {
        self.total_errors() > 0
    }

    /// Process exit code: `1` on any error, `2` when a preview found
    /// changes, `0` otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.has_errors() {
            1
        } else if self.mode == Mode::Preview && self.total_changes() > 0 {
            2
        } else {
            0
        }
    }
}
