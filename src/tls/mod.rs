//! TLS client connections
//!
//! This module establishes client TLS connections over sockets it connects
//! itself or over descriptors handed in by the caller.
//!
//! # Architecture
//!
//! 1. `TlsConfig` holds shared settings (protocols, ciphers, trust anchors,
//!    verification switches) and is shared between contexts via `Arc`
//! 2. `TlsContext` is one connection: it connects, runs the handshake as a
//!    resumable state machine and verifies the peer identity
//! 3. `Engine`/`EngineSession` are the seam to the TLS library;
//!    `OpenSslEngine` is the default
//!
//! # Examples
//!
//! ## Blocking client
//!
//! ```no_run
//! use std::sync::Arc;
//! use tls_connect::tls::{Status, TlsConfig, TlsContext};
//!
//! let config = Arc::new(TlsConfig::builder().build().unwrap());
//! let mut ctx = TlsContext::client(config);
//!
//! assert_eq!(ctx.connect("example.com", Some("443")).unwrap(), Status::Ready(()));
//! ctx.write(b"GET / HTTP/1.0\r\n\r\n").unwrap();
//! ctx.close().unwrap();
//! ```
//!
//! ## Non-blocking descriptors
//!
//! ```no_run
//! use std::net::TcpStream;
//! use std::os::fd::AsRawFd;
//! use std::sync::Arc;
//! use tls_connect::tls::{Status, TlsConfig, TlsContext};
//!
//! let stream = TcpStream::connect("example.com:443").unwrap();
//! stream.set_nonblocking(true).unwrap();
//! let fd = stream.as_raw_fd();
//!
//! let mut ctx = TlsContext::client(Arc::new(TlsConfig::default()));
//! let mut status = ctx.connect_fds(fd, fd, Some("example.com")).unwrap();
//! while status != Status::Ready(()) {
//!     // wait for readiness of `fd` in the direction `status` names
//!     status = ctx.drive().unwrap();
//! }
//! ```

pub mod cert;
pub mod config;
pub mod error;
pub mod handshake;
pub mod session;
pub mod verify;

pub use cert::{AltName, PeerCertificate};
pub use config::{PemSource, Protocols, TlsConfig, TlsConfigBuilder, TlsVersion};
pub use error::{ErrorKind, ErrorState, TlsError};
pub use handshake::{Engine, EngineSession, FdPair, OpenSslEngine, OpenSslSession, Status};
pub use session::{Interest, Role, State, TlsContext};
pub use verify::{check_servername, match_name};

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, TlsError>;
