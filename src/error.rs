use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdbError {
    /// The device answered FAIL.
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// The device sent a tag that is not valid at this point of the exchange.
    #[error("Protocol error: unexpected {got} while {during}")]
    UnexpectedResponse { got: String, during: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Remote path is {len} bytes, limit is {max}")]
    PathTooLong { len: usize, max: usize },

    #[error("Timestamp {0} does not fit in 32-bit epoch seconds")]
    InvalidTimestamp(i64),

    #[error("Frame length {len} exceeds maximum allowed size {max}")]
    FrameTooLarge { len: u32, max: u32 },

    /// A previous operation left the channel mid-frame.
    #[error("Sync channel is no longer usable: {0}")]
    ChannelPoisoned(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AdbError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        AdbError::Protocol {
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AdbError::Cancelled)
    }

    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            AdbError::Protocol { .. } | AdbError::UnexpectedResponse { .. }
        )
    }

    /// Errors after which the bytes left on the channel can no longer be
    /// trusted to start at a frame boundary. A FAIL is terminal for the device
    /// side too, and argument errors are raised before anything is written.
    pub(crate) fn breaks_framing(&self) -> bool {
        !matches!(
            self,
            AdbError::Protocol { .. }
                | AdbError::PathTooLong { .. }
                | AdbError::InvalidTimestamp(_)
                | AdbError::ChannelPoisoned(_)
                | AdbError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AdbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        assert!(AdbError::Cancelled.is_cancelled());
        assert!(!AdbError::Cancelled.is_protocol());
        assert!(AdbError::protocol("No such file").is_protocol());
    }

    #[test]
    fn test_io_from() {
        let err: AdbError = io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(matches!(err, AdbError::Io(_)));
        assert!(err.breaks_framing());
    }

    #[test]
    fn test_fail_keeps_framing() {
        assert!(!AdbError::protocol("No such file or directory").breaks_framing());
        let unexpected = AdbError::UnexpectedResponse {
            got: "DATA".to_string(),
            during: "listing",
        };
        assert!(unexpected.is_protocol());
        assert!(unexpected.breaks_framing());
    }
}
