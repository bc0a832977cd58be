//! Protocol errors for the framed channel

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Length prefix of zero
    #[error("empty frame")]
    EmptyFrame,

    /// Length prefix above the configured cap
    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    /// Frame body is not valid JSON
    #[error("malformed JSON body: {0}")]
    MalformedJson(String),

    /// Frame body is valid JSON but not an object
    #[error("frame body is not a JSON object")]
    NotAnObject,

    /// Object without a known `type` or with a payload that does not fit it
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Outgoing value could not be serialized
    #[error("failed to encode message: {0}")]
    Encode(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    /// Whether the stream is no longer trustworthy and must be torn down.
    ///
    /// Body-level errors leave the frame boundary intact, so the channel can
    /// answer with an error message and carry on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::EmptyFrame | ProtocolError::FrameTooLarge { .. } | ProtocolError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_errors_are_fatal() {
        assert!(ProtocolError::EmptyFrame.is_fatal());
        assert!(ProtocolError::FrameTooLarge { len: 2, max: 1 }.is_fatal());
        assert!(ProtocolError::Io(io::Error::from(io::ErrorKind::UnexpectedEof)).is_fatal());
    }

    #[test]
    fn test_body_errors_are_recoverable() {
        assert!(!ProtocolError::MalformedJson("eof".into()).is_fatal());
        assert!(!ProtocolError::NotAnObject.is_fatal());
        assert!(!ProtocolError::InvalidMessage("unknown variant".into()).is_fatal());
    }

    #[test]
    fn test_too_large_display() {
        let err = ProtocolError::FrameTooLarge {
            len: 2_000_000,
            max: 1_048_576,
        };
        assert_eq!(
            err.to_string(),
            "frame of 2000000 bytes exceeds limit of 1048576 bytes"
        );
    }
}
