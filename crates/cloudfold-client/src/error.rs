//! Error types for the file store client.

/// Client errors.
///
/// `Clone` so that one failed in-flight request can be handed to every
/// caller that was coalesced onto it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Transport failure or request timeout.
    #[error("network error: {message}")]
    Network { message: String },

    /// Session token rejected (401).
    #[error("session expired")]
    AuthExpired,

    /// Request rejected by the server (4xx other than 401).
    #[error("request rejected ({status}): {message}")]
    Validation { status: u16, message: String },

    /// Server-side failure (5xx).
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Result of an abandoned navigation; discarded, never shown.
    #[error("stale navigation result (generation {generation}, current {current})")]
    StaleNavigation { generation: u64, current: u64 },

    /// Response body could not be decoded.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl ClientError {
    /// Client-side rejection with the same shape as a server 400.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            status: 400,
            message: message.into(),
        }
    }

    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } | Self::Config { .. } => 1,
            Self::AuthExpired => 2,
            Self::Network { .. } => 5,
            Self::Server { .. } | Self::InvalidResponse { .. } => 6,
            Self::StaleNavigation { .. } => 0,
        }
    }

    /// Whether an idempotent read may be retried automatically.
    ///
    /// Mutations never retry; see `MutationCoordinator`.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Server { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }

    /// Text shown to the user when a mutation or fetch fails.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network { .. } => "Could not reach the server. Check your connection.".into(),
            Self::AuthExpired => "Your session has expired. Please sign in again.".into(),
            Self::Validation { message, .. } => message.clone(),
            Self::Server { message, .. } if message.is_empty() => {
                "The server failed to handle the request. Try again.".into()
            }
            Self::Server { message, .. } => format!("{} (you can try again)", message),
            Self::StaleNavigation { .. } => String::new(),
            Self::InvalidResponse { .. } => "The server sent an unexpected response.".into(),
            Self::Config { message } => message.clone(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::InvalidResponse {
                message: err.to_string(),
            };
        }
        Self::Network {
            message: err.to_string(),
        }
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
