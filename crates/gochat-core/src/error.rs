//! Error types shared by the GoChat crates.

/// Result type for GoChat operations.
pub type Result<T> = std::result::Result<T, Error>;

/// GoChat error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport could not be opened.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The transport is not open.
    #[error("Not connected")]
    NotConnected,

    /// A session is already running on this client.
    #[error("Session already active")]
    AlreadyConnected,

    /// The session has ended and cannot be restarted.
    #[error("Session terminated")]
    SessionTerminated,

    /// Writing a frame failed.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Reading a frame failed.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Closing the transport failed.
    #[error("Close failed: {0}")]
    CloseFailed(String),

    /// Timeout occurred.
    #[error("Operation timeout after {0}ms")]
    Timeout(u64),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// HTTP transport or decoding failure.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The server answered but refused the request.
    #[error("Request rejected (status {status}, code {code}): {message}")]
    Rejected {
        status: u16,
        code: i64,
        message: String,
    },

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error.
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Whether the error means the peer is gone rather than a single failed operation.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::NotConnected | Error::SessionTerminated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_display() {
        let err = Error::Rejected {
            status: 401,
            code: 400,
            message: "认证失败".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("401"));
        assert!(text.contains("400"));
        assert!(text.contains("认证失败"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_is_closed() {
        assert!(Error::NotConnected.is_closed());
        assert!(Error::SessionTerminated.is_closed());
        assert!(!Error::SendFailed("broken pipe".into()).is_closed());
    }
}
