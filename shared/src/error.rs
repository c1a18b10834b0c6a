//! Error types for pfurl.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid local path: {0}")]
    InvalidLocalPath(String),

    #[error("Invalid remote path: {0}")]
    InvalidRemotePath(String),

    #[error("Unsupported transport: {0}")]
    UnsupportedTransport(String),

    #[error("Unsupported proxy scheme '{0}' (only http is supported)")]
    UnsupportedProxyScheme(String),

    #[error("Remote exchange failed{}: {}", fmt_status(.status), .cause)]
    RemoteExchangeFailed { status: Option<u16>, cause: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Malformed HTTP encapsulation: no header/body boundary found")]
    MalformedHttpEncapsulation,

    #[error("Invalid indent {0}: must be between 1 and 64")]
    InvalidIndent(i64),

    #[error("Shutdown signal failed: {0}")]
    ShutdownSignalFailed(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid HTTP verb: {0}")]
    InvalidVerb(String),

    #[error("Archive error: {0}")]
    ArchiveFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status attached to a failed exchange, if the remote answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::RemoteExchangeFailed { status, .. } => *status,
            _ => None,
        }
    }
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {})", code),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_error_display() {
        let with_status = Error::RemoteExchangeFailed {
            status: Some(503),
            cause: "Service Unavailable".into(),
        };
        assert_eq!(
            with_status.to_string(),
            "Remote exchange failed (HTTP 503): Service Unavailable"
        );
        assert_eq!(with_status.status(), Some(503));

        let no_status = Error::RemoteExchangeFailed {
            status: None,
            cause: "connection refused".into(),
        };
        assert_eq!(no_status.to_string(), "Remote exchange failed: connection refused");
        assert_eq!(no_status.status(), None);
    }
}
