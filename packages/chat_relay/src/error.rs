//! Error taxonomy for the relay.

use std::io;

use tokio_util::codec::LinesCodecError;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Another authenticated session already holds this login.
    #[error("login {login:?} is already taken")]
    LoginConflict { login: String },

    /// Peer closed the connection or the network failed underneath us.
    #[error("transport disconnected")]
    TransportDisconnected,

    /// Inbound bytes could not be decoded into a text frame.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl From<LinesCodecError> for RelayError {
    fn from(err: LinesCodecError) -> Self {
        match err {
            LinesCodecError::MaxLineLengthExceeded => {
                RelayError::Decode("line exceeds maximum length".into())
            }
            LinesCodecError::Io(e) if e.kind() == io::ErrorKind::InvalidData => {
                RelayError::Decode(e.to_string())
            }
            LinesCodecError::Io(e) if is_disconnect(&e) => RelayError::TransportDisconnected,
            LinesCodecError::Io(e) => RelayError::Io(e),
        }
    }
}

/// Whether an I/O error means the peer went away rather than something
/// worth surfacing as a failure.
pub fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

pub type Result<T> = std::result::Result<T, RelayError>;
