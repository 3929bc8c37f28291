use thiserror::Error;

/// The request never produced an HTTP status: connection refused, DNS, timeout,
/// or the browser fetch rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Durable token storage could not be read or written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Token storage unavailable: {0}")]
    Unavailable(String),

    #[error("Token storage I/O failed: {0}")]
    Io(String),

    #[error("Token storage is corrupt: {0}")]
    Corrupt(String),
}

/// Client-side checks that run before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Field '{field_name}' cannot be empty")]
    EmptyField { field_name: String },

    #[error("Field '{field_name}' exceeds max length of {max_length} (actual: {actual_length})")]
    FieldTooLong { field_name: String, max_length: usize, actual_length: usize },

    #[error("Password must be at least {min_length} characters")]
    PasswordTooShort { min_length: usize },

    #[error("'{value}' is not a valid email address")]
    InvalidEmail { value: String },

    #[error("Type '{expected}' to confirm")]
    ConfirmationMismatch { expected: String },

    #[error("Unsupported file type '{mime}'")]
    UnsupportedMedia { mime: String },
}

impl ValidationError {
    pub fn empty(field_name: impl Into<String>) -> Self {
        ValidationError::EmptyField { field_name: field_name.into() }
    }
}

/// Every failure the API client can hand back to a call site.
#[derive(Debug, Error)]
pub enum ApiError {
    // ── Transport ────────────────────────────────────────────────────────────
    #[error("Network error: {0}")]
    Network(#[from] TransportError),

    // ── HTTP status ──────────────────────────────────────────────────────────
    #[error("Unauthorized: {}", .detail.as_deref().unwrap_or("session expired"))]
    Unauthorized { detail: Option<String> },

    #[error("Server error {status}: {}", .detail.as_deref().unwrap_or("no details"))]
    Status { status: u16, detail: Option<String> },

    // ── Payloads ─────────────────────────────────────────────────────────────
    #[error("Parse error: {0}")]
    Decode(String),

    #[error("Serialize error: {0}")]
    Encode(String),

    // ── Local ────────────────────────────────────────────────────────────────
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ApiError::Validation(_))
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Text for the inline error next to the form that issued the call: the
    /// server's `detail` when it sent one, the local message for validation and
    /// storage failures, `fallback` otherwise.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Unauthorized { detail: Some(detail) }
            | ApiError::Status { detail: Some(detail), .. } => detail.clone(),
            ApiError::Validation(err) => err.to_string(),
            ApiError::Storage(err) => err.to_string(),
            _ => fallback.to_string(),
        }
    }
}
