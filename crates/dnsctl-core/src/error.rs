//! Error types for the reconciliation pipeline
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for dnsctl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the reconciliation pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// Record type name is not present in the registry
    #[error("Unknown record type: {0}")]
    UnknownRecordType(String),

    /// A record type was registered twice
    #[error("Record type registered twice: {0}")]
    DuplicateType(String),

    /// A provider type was registered twice
    #[error("Provider type registered twice: {0}")]
    DuplicateProvider(String),

    /// Provider name or type is not known
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Required credential key is missing
    #[error("Provider {provider}: missing required credential {key:?}")]
    MissingCredential {
        /// Provider name
        provider: String,
        /// Missing key
        key: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A raw record could not be lowered into a typed record
    #[error("{rtype} record {name:?} in {domain}: {source}")]
    Lowering {
        /// Record type
        rtype: String,
        /// Short label
        name: String,
        /// Zone name
        domain: String,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// Structural validation failure of a single value
    #[error("Validation error: {0}")]
    Validation(String),

    /// One or more fatal audit findings for a zone
    #[error("Audit failed for {domain}: {}", .issues.join("; "))]
    Audit {
        /// Zone name
        domain: String,
        /// Rendered findings
        issues: Vec<String>,
    },

    /// SPF mechanism this engine does not evaluate
    #[error("Unsupported SPF mechanism: {0}")]
    UnsupportedMechanism(String),

    /// SPF parse or resolution failure
    #[error("SPF error: {0}")]
    Spf(String),

    /// Invalid IP transform table or transform failure
    #[error("Transform error: {0}")]
    Transform(String),

    /// Requested object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// HTTP client errors (from provider APIs)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Filesystem or socket errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run aborted at a correction boundary
    #[error("Cancelled")]
    Cancelled,

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an SPF error
    pub fn spf(msg: impl Into<String>) -> Self {
        Self::Spf(msg.into())
    }

    /// Create a transform error
    pub fn transform(msg: impl Into<String>) -> Self {
        Self::Transform(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a missing-credential error
    pub fn missing_credential(provider: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingCredential {
            provider: provider.into(),
            key: key.into(),
        }
    }

    /// Wrap a handler failure with the record it happened on
    pub fn lowering(
        rtype: impl Into<String>,
        name: impl Into<String>,
        domain: impl Into<String>,
        source: Error,
    ) -> Self {
        Self::Lowering {
            rtype: rtype.into(),
            name: name.into(),
            domain: domain.into(),
            source: Box::new(source),
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowering_error_names_record_and_domain() {
        let err = Error::lowering(
            "MX",
            "mail",
            "example.com",
            Error::validation("preference out of range"),
        );
        let msg = err.to_string();
        assert!(msg.contains("MX"));
        assert!(msg.contains("\"mail\""));
        assert!(msg.contains("example.com"));
        assert!(msg.contains("preference out of range"));
    }

    #[test]
    fn audit_error_joins_issues() {
        let err = Error::Audit {
            domain: "example.com".into(),
            issues: vec!["one".into(), "two".into()],
        };
        assert_eq!(err.to_string(), "Audit failed for example.com: one; two");
    }
}
