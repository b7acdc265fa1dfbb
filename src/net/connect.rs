//! Connection establishment
//!
//! [`Connector`] tries a fixed sequence of resolution hints. Literal
//! addresses are attempted before the filtered DNS lookup so that hosts
//! such as `127.0.0.1` or `::1` stay reachable even when
//! address-configuration filtering would hide their family.

use super::resolve::{AddressResolver, Family, Hints, Resolve};
use super::{Error, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;

/// Resolution hints in the order they are tried
pub const PRIORITY: [Hints; 3] = [
    Hints::numeric(Family::Inet),
    Hints::numeric(Family::Inet6),
    Hints::addr_config(Family::Unspec),
];

/// Connects to the first reachable candidate of a host
#[derive(Debug, Clone, Default)]
pub struct Connector<R = AddressResolver> {
    resolver: R,
}

impl Connector<AddressResolver> {
    /// Connector using the system resolver
    pub fn new() -> Self {
        Connector {
            resolver: AddressResolver::new(),
        }
    }
}

impl<R: Resolve> Connector<R> {
    /// Connector using a custom resolver
    pub fn with_resolver(resolver: R) -> Self {
        Connector { resolver }
    }

    /// Get a reference to the resolver
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Connect a stream socket to `host`/`port`.
    ///
    /// Each entry of [`PRIORITY`] is resolved afresh. Candidates of a step
    /// are tried in resolver order; the next step only runs when a whole
    /// step produced no connection. On total failure the error of the last
    /// attempt is returned.
    pub fn connect(&self, host: &str, port: &str) -> Result<Socket> {
        let mut last_err = None;

        for hints in PRIORITY {
            let addrs = match self.resolver.resolve(host, port, hints) {
                Ok(addrs) => addrs,
                Err(e) => {
                    tracing::debug!(host, family = %hints.family, error = %e, "resolution step failed");
                    last_err = Some(e);
                    continue;
                }
            };

            for addr in addrs {
                match connect_addr(addr) {
                    Ok(socket) => {
                        tracing::debug!(host, %addr, "connected");
                        return Ok(socket);
                    }
                    Err(e) => {
                        tracing::debug!(host, %addr, error = %e, "connect attempt failed");
                        last_err = Some(e);
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::resolution(host, "no addresses to connect to")))
    }
}

fn connect_addr(addr: SocketAddr) -> Result<Socket> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(|source| Error::Connect { addr, source })?;
    // On failure `socket` is dropped here, closing the descriptor.
    socket
        .connect(&addr.into())
        .map_err(|source| Error::Connect { addr, source })?;
    Ok(socket)
}
