//! TLS errors and per-connection error state

use crate::net;
use std::fmt;

/// Broad class of a failure
///
/// The kind tells a caller whether retrying at a higher level (another
/// host, another configuration) makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid input, e.g. no server name while name
    /// verification is requested
    Config,
    /// Name lookup failed
    Resolution,
    /// No candidate address accepted a connection
    Connect,
    /// Fatal protocol or cryptographic failure during the handshake
    Handshake,
    /// Peer identity did not match, or no peer certificate
    Verification,
    /// Fatal failure while reading, writing or closing an established session
    Session,
    /// Operation not valid in the context's current state
    State,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Config => "config",
            ErrorKind::Resolution => "resolution",
            ErrorKind::Connect => "connect",
            ErrorKind::Handshake => "handshake",
            ErrorKind::Verification => "verification",
            ErrorKind::Session => "session",
            ErrorKind::State => "state",
        };
        f.write_str(s)
    }
}

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Network(#[from] net::Error),

    #[error("handshake failed: {message}")]
    Handshake {
        message: String,
        code: Option<i32>,
    },

    #[error("verification failed: {0}")]
    Verification(String),

    #[error("{op} failed: {message}")]
    Session {
        op: &'static str,
        message: String,
        code: Option<i32>,
    },

    #[error("invalid state: {0}")]
    State(String),
}

impl TlsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TlsError::Config(_) => ErrorKind::Config,
            TlsError::Network(net::Error::Resolution { .. }) => ErrorKind::Resolution,
            TlsError::Network(net::Error::Connect { .. }) => ErrorKind::Connect,
            TlsError::Handshake { .. } => ErrorKind::Handshake,
            TlsError::Verification(_) => ErrorKind::Verification,
            TlsError::Session { .. } => ErrorKind::Session,
            TlsError::State(_) => ErrorKind::State,
        }
    }

    /// Numeric code from the failing subsystem (errno, EAI code), if any
    pub fn code(&self) -> Option<i32> {
        match self {
            TlsError::Network(e) => e.code(),
            TlsError::Handshake { code, .. } | TlsError::Session { code, .. } => *code,
            TlsError::Config(_) | TlsError::Verification(_) | TlsError::State(_) => None,
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        TlsError::Config(msg.into())
    }
}

/// Last failure recorded on a connection context
///
/// Overwritten by every failure and never cleared by a success; a stale
/// message does not mean the latest call failed.
#[derive(Debug, Clone, Default)]
pub struct ErrorState {
    message: Option<String>,
    code: Option<i32>,
    kind: Option<ErrorKind>,
}

impl ErrorState {
    /// Record `err`, replacing whatever was stored before
    pub fn record(&mut self, err: &TlsError) {
        self.message = Some(err.to_string());
        self.code = err.code();
        self.kind = Some(err.kind());
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.kind
    }
}
