use thiserror::Error;

/// A single configuration problem found during validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Unified error type for the hit counter, the flusher and the listing cache.
#[derive(Error, Debug, Clone)]
pub enum MostReadError {
    /// The shared cache failed or lost an entry it just reported as present
    #[error("Shared cache unavailable: {0}")]
    CacheUnavailable(String),

    /// A cache entry does not have the shape this crate writes
    #[error("Malformed shared state at '{key}': {detail}")]
    MalformedState { key: String, detail: String },

    /// The persistent store rejected or failed a statement
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Validation error with every issue found
    #[error("Validation error: {}", .0.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("; "))]
    ValidationError(Vec<ValidationIssue>),

    /// Parse/serialization error
    #[error("Parse error: {0}")]
    ParseError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(String),
}

impl MostReadError {
    pub fn malformed(key: impl Into<String>, detail: impl Into<String>) -> Self {
        MostReadError::MalformedState {
            key: key.into(),
            detail: detail.into(),
        }
    }

    /// Check if this error is transient, i.e. a later attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MostReadError::CacheUnavailable(_)
                | MostReadError::Persistence(_)
                | MostReadError::IoError(_)
        )
    }
}

// === Conversion Implementations ===

macro_rules! impl_from_error {
    ($err_type:ty, $arm:pat => $body:expr) => {
        impl From<$err_type> for MostReadError {
            fn from(err: $err_type) -> Self {
                match err {
                    $arm => $body,
                }
            }
        }
    };
}

impl_from_error!(std::io::Error, e => match e.kind() {
    std::io::ErrorKind::InvalidInput => MostReadError::InvalidArgument(e.to_string()),
    _ => MostReadError::IoError(e.to_string()),
});

impl_from_error!(serde_json::Error, e => MostReadError::ParseError(e.to_string()));
impl_from_error!(toml::de::Error, e => MostReadError::ParseError(e.to_string()));

/// Result type alias for operations that can fail with MostReadError.
pub type MostReadResult<T> = Result<T, MostReadError>;
