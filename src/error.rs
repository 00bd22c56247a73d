//! Error types for the issue resolution engine

use std::fmt;

use crate::cloud::Service;

/// Crate-level error type.
///
/// Nothing in the resolution cycle lets one of these escape to the caller of
/// the orchestrator; they are folded into summaries and results instead.
#[derive(thiserror::Error, Debug)]
pub enum ResolverError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Dependency graph error: {0}")]
    DependencyGraph(String),

    #[error("Baseline results have not been recorded for this cycle")]
    BaselineNotSet,

    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),

    #[error("Tester error: {0}")]
    Tester(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ResolverError {
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration(message.into())
    }

    pub fn dependency_graph<S: Into<String>>(message: S) -> Self {
        Self::DependencyGraph(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ResolverError>;

/// Category of a provider-side failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudErrorKind {
    ResourceNotFound,
    AccessDenied,
    Throttled,
    Validation,
    Unsupported,
    Provider,
}

impl fmt::Display for CloudErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloudErrorKind::ResourceNotFound => write!(f, "ResourceNotFoundException"),
            CloudErrorKind::AccessDenied => write!(f, "AccessDeniedException"),
            CloudErrorKind::Throttled => write!(f, "ThrottlingException"),
            CloudErrorKind::Validation => write!(f, "ValidationException"),
            CloudErrorKind::Unsupported => write!(f, "UnsupportedOperation"),
            CloudErrorKind::Provider => write!(f, "ServiceException"),
        }
    }
}

/// Error returned by a remote resource client.
#[derive(thiserror::Error, Debug, Clone)]
#[error("{service} {kind}: {message}")]
pub struct CloudError {
    pub service: Service,
    pub kind: CloudErrorKind,
    pub message: String,
}

impl CloudError {
    pub fn new<S: Into<String>>(service: Service, kind: CloudErrorKind, message: S) -> Self {
        Self {
            service,
            kind,
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(service: Service, message: S) -> Self {
        Self::new(service, CloudErrorKind::ResourceNotFound, message)
    }

    pub fn access_denied<S: Into<String>>(service: Service, message: S) -> Self {
        Self::new(service, CloudErrorKind::AccessDenied, message)
    }

    pub fn throttled<S: Into<String>>(service: Service, message: S) -> Self {
        Self::new(service, CloudErrorKind::Throttled, message)
    }

    pub fn unsupported(service: Service, operation: &str) -> Self {
        Self::new(
            service,
            CloudErrorKind::Unsupported,
            format!("{} is not available on this client", operation),
        )
    }

    /// Throttling and generic provider faults are worth retrying; everything
    /// else will fail the same way again.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, CloudErrorKind::Throttled | CloudErrorKind::Provider)
    }

    /// `"<category>: <message>"`, the form embedded in resolution details.
    pub fn diagnostic(&self) -> String {
        format!("{}: {}", self.kind, self.message)
    }
}
