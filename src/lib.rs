//! tls-connect - client TLS connection establishment
//!
//! This crate connects to a host over TCP, trying literal addresses before
//! filtered DNS results, then runs a resumable TLS handshake and checks the
//! peer certificate against the requested server name.

pub mod net;
pub mod tls;

pub use net::Connector;
pub use tls::{ErrorKind, Status, TlsConfig, TlsContext, TlsError};
