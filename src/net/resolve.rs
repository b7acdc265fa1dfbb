//! Address resolution
//!
//! Resolution is layered. [`GaiResolver`] is a thin wrapper around the
//! system's `getaddrinfo(3)`; [`AddressResolver`] sits in front of any
//! [`Resolve`] implementation and answers literal IPv4/IPv6 hosts itself so
//! they never reach DNS.

use super::{literal_addr, Error, Result, HTTPS_PORT};
use std::ffi::{CStr, CString};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::ptr;

/// Address family filter for a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// IPv4 only (`AF_INET`)
    Inet,
    /// IPv6 only (`AF_INET6`)
    Inet6,
    /// Any family (`AF_UNSPEC`)
    Unspec,
}

impl Family {
    fn as_raw(self) -> libc::c_int {
        match self {
            Family::Inet => libc::AF_INET,
            Family::Inet6 => libc::AF_INET6,
            Family::Unspec => libc::AF_UNSPEC,
        }
    }

    /// Whether an address of this IP version passes the filter
    pub fn admits(self, ip: &IpAddr) -> bool {
        match self {
            Family::Inet => ip.is_ipv4(),
            Family::Inet6 => ip.is_ipv6(),
            Family::Unspec => true,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::Inet => f.write_str("IPv4"),
            Family::Inet6 => f.write_str("IPv6"),
            Family::Unspec => f.write_str("any"),
        }
    }
}

/// Family and flags for one lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hints {
    pub family: Family,
    /// Only accept numeric hosts (`AI_NUMERICHOST`), never query DNS
    pub numeric_host: bool,
    /// Skip families with no configured local address (`AI_ADDRCONFIG`)
    pub addr_config: bool,
}

impl Hints {
    /// Numeric-host lookup restricted to `family`
    pub const fn numeric(family: Family) -> Self {
        Hints {
            family,
            numeric_host: true,
            addr_config: false,
        }
    }

    /// Lookup with address-configuration filtering
    pub const fn addr_config(family: Family) -> Self {
        Hints {
            family,
            numeric_host: false,
            addr_config: true,
        }
    }

    fn flags(&self) -> libc::c_int {
        let mut flags = 0;
        if self.numeric_host {
            flags |= libc::AI_NUMERICHOST;
        }
        if self.addr_config {
            flags |= libc::AI_ADDRCONFIG;
        }
        flags
    }
}

/// Something that turns a host and port into candidate stream addresses
pub trait Resolve {
    /// Resolve `host`/`port` under `hints`, preserving resolver order.
    ///
    /// `port` may be numeric or a service name.
    fn resolve(&self, host: &str, port: &str, hints: Hints) -> Result<Vec<SocketAddr>>;
}

impl<R: Resolve + ?Sized> Resolve for &R {
    fn resolve(&self, host: &str, port: &str, hints: Hints) -> Result<Vec<SocketAddr>> {
        (**self).resolve(host, port, hints)
    }
}

/// System resolver backed by `getaddrinfo(3)`
#[derive(Debug, Clone, Copy, Default)]
pub struct GaiResolver;

/// Owns an `addrinfo` list and frees it on drop
struct AddrInfoList(*mut libc::addrinfo);

impl AddrInfoList {
    fn addrs(&self) -> Vec<SocketAddr> {
        let mut out = Vec::new();
        let mut cur = self.0;
        while !cur.is_null() {
            // SAFETY: `cur` is a node of the list returned by getaddrinfo,
            // which stays alive until `self` is dropped.
            let ai = unsafe { &*cur };
            // SAFETY: getaddrinfo sets ai_addr to a sockaddr of ai_family.
            if let Some(addr) = unsafe { to_socket_addr(ai) } {
                out.push(addr);
            }
            cur = ai.ai_next;
        }
        out
    }
}

impl Drop for AddrInfoList {
    fn drop(&mut self) {
        if !self.0.is_null() {
            // SAFETY: the list came from getaddrinfo and is freed only here.
            unsafe { libc::freeaddrinfo(self.0) };
        }
    }
}

/// Convert one `addrinfo` entry to a socket address.
///
/// # Safety
///
/// `ai.ai_addr` must be null or point to a sockaddr matching `ai.ai_family`.
unsafe fn to_socket_addr(ai: &libc::addrinfo) -> Option<SocketAddr> {
    if ai.ai_addr.is_null() {
        return None;
    }
    match ai.ai_family {
        libc::AF_INET => {
            let sin = &*(ai.ai_addr as *const libc::sockaddr_in);
            let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
            Some(SocketAddr::V4(SocketAddrV4::new(ip, u16::from_be(sin.sin_port))))
        }
        libc::AF_INET6 => {
            let sin6 = &*(ai.ai_addr as *const libc::sockaddr_in6);
            Some(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(sin6.sin6_addr.s6_addr),
                u16::from_be(sin6.sin6_port),
                sin6.sin6_flowinfo,
                sin6.sin6_scope_id,
            )))
        }
        _ => None,
    }
}

fn gai_message(rc: libc::c_int) -> String {
    if rc == libc::EAI_SYSTEM {
        return std::io::Error::last_os_error().to_string();
    }
    // SAFETY: gai_strerror returns a pointer to a static string.
    unsafe { CStr::from_ptr(libc::gai_strerror(rc)) }
        .to_string_lossy()
        .into_owned()
}

impl Resolve for GaiResolver {
    fn resolve(&self, host: &str, port: &str, hints: Hints) -> Result<Vec<SocketAddr>> {
        let c_host = CString::new(host)
            .map_err(|_| Error::resolution(host, "host contains a NUL byte"))?;
        let c_port = CString::new(port)
            .map_err(|_| Error::resolution(host, "port contains a NUL byte"))?;

        // SAFETY: an all-zero addrinfo is a valid "no hints" value.
        let mut raw: libc::addrinfo = unsafe { std::mem::zeroed() };
        raw.ai_family = hints.family.as_raw();
        raw.ai_socktype = libc::SOCK_STREAM;
        raw.ai_flags = hints.flags();

        let mut res: *mut libc::addrinfo = ptr::null_mut();
        // SAFETY: host and port are NUL-terminated and outlive the call;
        // on success `res` is handed to the AddrInfoList guard.
        let rc = unsafe { libc::getaddrinfo(c_host.as_ptr(), c_port.as_ptr(), &raw, &mut res) };
        if rc != 0 {
            return Err(Error::Resolution {
                host: host.to_string(),
                message: gai_message(rc),
                code: Some(rc),
            });
        }

        let list = AddrInfoList(res);
        let addrs = list.addrs();
        if addrs.is_empty() {
            return Err(Error::resolution(host, "no usable addresses"));
        }
        Ok(addrs)
    }
}

/// Resolver that short-circuits literal addresses
///
/// Literal IPv4/IPv6 hosts with a numeric port resolve to exactly that
/// address without consulting the inner resolver. Non-literal hosts get
/// address-configuration filtering unless a specific family is forced.
#[derive(Debug, Clone, Default)]
pub struct AddressResolver<R = GaiResolver> {
    inner: R,
}

impl AddressResolver<GaiResolver> {
    /// Resolver backed by the system's `getaddrinfo(3)`
    pub fn new() -> Self {
        AddressResolver { inner: GaiResolver }
    }
}

impl<R: Resolve> AddressResolver<R> {
    /// Put the literal-address layer in front of `inner`
    pub fn with_resolver(inner: R) -> Self {
        AddressResolver { inner }
    }

    /// Get a reference to the wrapped resolver
    pub fn get_ref(&self) -> &R {
        &self.inner
    }
}

impl<R: Resolve> Resolve for AddressResolver<R> {
    fn resolve(&self, host: &str, port: &str, hints: Hints) -> Result<Vec<SocketAddr>> {
        if let Some(ip) = literal_addr(host) {
            if !hints.family.admits(&ip) {
                return Err(Error::resolution(
                    host,
                    format!("not an {} address", hints.family),
                ));
            }
            if let Ok(port) = port.parse::<u16>() {
                return Ok(vec![SocketAddr::new(ip, port)]);
            }
            // Service name port: still no DNS for the host part.
            return self.inner.resolve(
                host,
                port,
                Hints {
                    numeric_host: true,
                    addr_config: false,
                    ..hints
                },
            );
        }

        if hints.numeric_host {
            return Err(Error::resolution(host, "not a numeric address"));
        }

        let hints = match hints.family {
            Family::Unspec => Hints {
                addr_config: true,
                ..hints
            },
            Family::Inet | Family::Inet6 => Hints {
                addr_config: false,
                ..hints
            },
        };
        self.inner.resolve(host, port, hints)
    }
}

/// Split a `host:port` or `[host]:port` string.
///
/// Returns `None` when the string carries no port, including bare IPv6
/// literals such as `::1` whose colons are not port separators.
pub fn split_host_port(hostport: &str) -> Option<(&str, &str)> {
    let (host, rest) = match hostport.strip_prefix('[') {
        Some(inner) => {
            let end = inner.find(']')?;
            (&inner[..end], &inner[end + 1..])
        }
        None => {
            let colon = hostport.find(':')?;
            (&hostport[..colon], &hostport[colon..])
        }
    };

    let port = rest.strip_prefix(':')?;
    if port.contains(':') || host.is_empty() || port.is_empty() {
        return None;
    }
    Some((host, port))
}

/// Pick the host and port to connect to.
///
/// An explicit `port` wins; otherwise a port embedded in `host` is used,
/// falling back to [`HTTPS_PORT`].
pub fn host_and_port<'a>(host: &'a str, port: Option<&'a str>) -> (&'a str, &'a str) {
    match port {
        Some(port) => (host, port),
        None => split_host_port(host).unwrap_or((host, HTTPS_PORT)),
    }
}
