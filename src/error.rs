use thiserror::Error;

/// Type alias for Result with GmailError
pub type Result<T> = std::result::Result<T, GmailError>;

/// Error types for the inbox agent
#[derive(Error, Debug)]
pub enum GmailError {
    /// Gmail API returned an error
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Rate limit exceeded - should retry after specified seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Invalid message format or parsing error
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// Label-related errors
    #[error("Label error: {0}")]
    LabelError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration or rule-set error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Irreversible operation attempted without explicit confirmation
    #[error("Refusing to {0} without explicit confirmation")]
    SafetyGate(String),

    /// Generic catch-all error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl GmailError {
    /// Check if the error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GmailError::RateLimitExceeded { .. }
                | GmailError::ServerError { .. }
                | GmailError::NetworkError(_)
        )
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

/// Read the delay-seconds form of a Retry-After header, defaulting to 5 seconds
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 5;

    response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

impl From<google_gmail1::Error> for GmailError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );

                match status_code {
                    429 => GmailError::RateLimitExceeded {
                        retry_after: parse_retry_after_header(response),
                    },
                    404 => GmailError::MessageNotFound("Resource not found".to_string()),
                    400 => GmailError::BadRequest(message),
                    403 => GmailError::Forbidden(message),
                    500..=599 => GmailError::ServerError {
                        status: status_code,
                        message,
                    },
                    _ => GmailError::ApiError(message),
                }
            }
            google_gmail1::Error::BadRequest(ref err) => GmailError::BadRequest(format!("{}", err)),
            google_gmail1::Error::HttpError(ref err) => {
                GmailError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => GmailError::NetworkError(err.to_string()),
            _ => GmailError::ApiError(error.to_string()),
        }
    }
}
