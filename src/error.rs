use thiserror::Error;

/// Result type for KEF speaker operations
pub type Result<T> = std::result::Result<T, KefError>;

/// Errors that can occur when talking to a KEF speaker
#[derive(Error, Debug)]
pub enum KefError {
    /// The speaker could not be reached (no route, connect timeout, OS error)
    #[error("Speaker is offline: {0}")]
    Offline(String),

    /// Every connection attempt was refused
    #[error("Connection retries exceeded after {attempts} attempts")]
    RetriesExceeded {
        /// Number of connection attempts made
        attempts: u32,
    },

    /// No reply arrived within the reply window
    #[error("Timeout waiting for reply")]
    Timeout,

    /// I/O error on an established connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An exchange was attempted without a live socket
    #[error("Not connected")]
    NotConnected,

    /// The speaker closed the connection
    #[error("Connection closed")]
    ConnectionClosed,

    /// Response too short to carry a reply byte
    #[error("Reply too short: got {len} byte(s)")]
    ShortReply {
        /// Number of bytes received
        len: usize,
    },

    /// A write-type command was not acknowledged
    #[error("{command} failed, got response {reply}")]
    UnexpectedReply {
        /// Name of the command that was sent
        command: &'static str,
        /// Reply byte received instead of the OK status
        reply: u8,
    },

    /// Source reply code is not in the source table
    #[error("Unknown source code {0}")]
    UnknownSource(u8),

    /// The speaker never reported the requested source
    #[error("Source is {actual} but {expected} is selected")]
    SourceNotConfirmed {
        /// Requested source
        expected: String,
        /// Last source the speaker reported
        actual: String,
    },

    /// The configured codec has no frame for a command
    #[error("Unsupported command: {0}")]
    Unsupported(String),

    /// Invalid argument or configuration
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Runtime for the blocking API could not be created
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl KefError {
    /// Whether this error means the speaker is unreachable
    pub fn is_offline(&self) -> bool {
        matches!(self, KefError::Offline(_) | KefError::RetriesExceeded { .. })
    }

    /// Whether the speaker answered with something the protocol does not allow
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            KefError::ShortReply { .. }
                | KefError::UnexpectedReply { .. }
                | KefError::UnknownSource(_)
                | KefError::SourceNotConfirmed { .. }
        )
    }

    /// Check if another attempt could succeed
    ///
    /// Caller and configuration errors are never retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            KefError::InvalidInput(_) | KefError::Unsupported(_) | KefError::Runtime(_)
        )
    }
}
