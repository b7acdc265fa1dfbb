//! Name resolution and raw socket connection
//!
//! This module turns a host/port pair into a connected stream socket:
//!
//! - `resolve` produces candidate addresses for one family/flag combination
//! - `connect` walks the fixed priority order of combinations and returns
//!   the first socket whose `connect(2)` succeeds
//!
//! Both layers treat a host that is already a literal IPv4 or IPv6 address
//! specially, see [`literal_addr`].

pub mod connect;
pub mod resolve;

pub use connect::{Connector, PRIORITY};
pub use resolve::{split_host_port, AddressResolver, Family, GaiResolver, Hints, Resolve};

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Port used when neither the caller nor the host string names one
pub const HTTPS_PORT: &str = "443";

/// Result type for resolution and connection
pub type Result<T> = std::result::Result<T, Error>;

/// Resolution and connection errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No address could be produced for the requested family
    #[error("{host}: {message}")]
    Resolution {
        host: String,
        message: String,
        /// `EAI_*` code when the system resolver reported one
        code: Option<i32>,
    },

    /// Socket creation or `connect(2)` failed for a candidate address
    #[error("connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn resolution(host: &str, message: impl Into<String>) -> Self {
        Error::Resolution {
            host: host.to_string(),
            message: message.into(),
            code: None,
        }
    }

    /// Numeric code from the failing subsystem (EAI code or errno)
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Resolution { code, .. } => *code,
            Error::Connect { source, .. } => source.raw_os_error(),
        }
    }
}

/// Parse `host` as a literal IPv4 or IPv6 address.
///
/// Accepts the same forms as `inet_pton(3)`: dotted-quad IPv4 and textual
/// IPv6 without brackets or zone identifiers.
pub fn literal_addr(host: &str) -> Option<IpAddr> {
    if let Ok(v4) = host.parse::<Ipv4Addr>() {
        return Some(IpAddr::V4(v4));
    }
    host.parse::<Ipv6Addr>().ok().map(IpAddr::V6)
}
