//! Error types for testimonial-scan.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for a scan run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Classification error: {0}")]
    Classification(#[from] ClassificationError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Unknown mailbox provider: {0}")]
    UnknownProvider(String),

    #[error("No mailbox provider configured")]
    NoProviders,
}

/// Credential/token acquisition errors. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No access token for {provider}: set {env_var} or provide {path}")]
    MissingToken {
        provider: String,
        env_var: String,
        path: PathBuf,
    },

    #[error("Failed to read token file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Token file {path} has no access token: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Provider {provider} rejected the access token")]
    Rejected { provider: String },
}

/// Remote mailbox API errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Request to {provider} failed: {reason}")]
    Network { provider: String, reason: String },

    #[error("{provider} returned HTTP {status} for {operation}: {body}")]
    Status {
        provider: String,
        operation: String,
        status: u16,
        body: String,
    },

    #[error("{provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl MailboxError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } | Self::RateLimited { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::InvalidResponse { .. } | Self::Auth(_) => false,
        }
    }
}

/// Errors from the external classifier.
#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("Failed to start classifier {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Classifier I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Classifier exited with {status}: {stderr}")]
    ExitStatus { status: String, stderr: String },

    #[error("Classifier timed out after {0:?}")]
    Timeout(Duration),

    #[error("Classifier output was not valid UTF-8")]
    InvalidOutput,
}

/// Report serialization/write errors.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write report to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for the scanner.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> MailboxError {
        MailboxError::Status {
            provider: "gmail".into(),
            operation: "list".into(),
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn server_errors_are_transient() {
        assert!(status(503).is_transient());
        assert!(!status(404).is_transient());
        assert!(
            MailboxError::RateLimited {
                provider: "gmail".into(),
                retry_after: None
            }
            .is_transient()
        );
    }

    #[test]
    fn auth_errors_are_not_retried() {
        let err = MailboxError::from(AuthError::Rejected {
            provider: "outlook".into(),
        });
        assert!(!err.is_transient());
        assert!(err.to_string().contains("outlook"));
    }
}
