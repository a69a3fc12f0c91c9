//! Error types
//!
//! Registry operations return [`Result`]. Media writes never fail: misuse is
//! logged and dropped so loosely synchronized producers and consumers can
//! self-heal.

/// Errors surfaced by registry operations and codec parsing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A live publication already owns this name.
    #[error("stream already publishing: {0}")]
    AlreadyPublishing(String),

    /// No publication with this name, and the caller asked not to wait.
    #[error("stream not found: {0}")]
    NotFound(String),

    /// An authorization hook rejected the request.
    #[error("unauthorized access to {name}: {reason}")]
    Unauthorized { name: String, reason: String },

    /// The stream name is empty once extension and query are stripped.
    #[error("invalid stream name: {0:?}")]
    InvalidStreamName(String),

    /// Malformed codec payload.
    #[error("media error: {0}")]
    Media(#[from] MediaError),

    /// Underlying file error (recording, segment persistence).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Codec-level parse failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("invalid AVC packet")]
    InvalidAvcPacket,
    #[error("invalid AAC packet")]
    InvalidAacPacket,
    #[error("invalid FLV tag")]
    InvalidFlvTag,
}

/// Convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::AlreadyPublishing("live".into());
        assert_eq!(err.to_string(), "stream already publishing: live");

        let err = Error::Unauthorized {
            name: "live".into(),
            reason: "bad token".into(),
        };
        assert_eq!(err.to_string(), "unauthorized access to live: bad token");
    }

    #[test]
    fn test_media_error_conversion() {
        let err: Error = MediaError::InvalidAacPacket.into();
        assert!(matches!(err, Error::Media(MediaError::InvalidAacPacket)));
    }
}
