//! Peer certificate identity view
//!
//! This module extracts the identity claims of a peer certificate (subject
//! common name and subject alternative names) into plain owned data, so
//! that name verification does not depend on the TLS engine.

use openssl::nid::Nid;
use openssl::x509::{X509NameRef, X509Ref};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// One subject alternative name entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AltName {
    Dns(String),
    Ip(IpAddr),
}

impl fmt::Display for AltName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AltName::Dns(name) => write!(f, "DNS:{name}"),
            AltName::Ip(ip) => write!(f, "IP:{ip}"),
        }
    }
}

/// Identity claims of a peer certificate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerCertificate {
    /// Subject Common Name
    pub common_name: Option<String>,
    /// Issuer Common Name
    pub issuer: Option<String>,
    /// Subject Alternative Names (DNS names and IP addresses)
    pub subject_alt_names: Vec<AltName>,
}

impl PeerCertificate {
    /// Extract identity claims from an X.509 certificate
    pub fn from_x509(cert: &X509Ref) -> Self {
        PeerCertificate {
            common_name: common_name(cert.subject_name()),
            issuer: common_name(cert.issuer_name()),
            subject_alt_names: subject_alt_names(cert),
        }
    }

    pub fn dns_names(&self) -> impl Iterator<Item = &str> {
        self.subject_alt_names.iter().filter_map(|name| match name {
            AltName::Dns(dns) => Some(dns.as_str()),
            AltName::Ip(_) => None,
        })
    }

    pub fn ip_addresses(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.subject_alt_names.iter().filter_map(|name| match name {
            AltName::Ip(ip) => Some(*ip),
            AltName::Dns(_) => None,
        })
    }
}

/// First Common Name entry of an X.509 name
///
/// Interior NUL bytes are kept so that verification can reject the name.
fn common_name(name: &X509NameRef) -> Option<String> {
    name.entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| entry.data().to_string().ok())
}

fn subject_alt_names(cert: &X509Ref) -> Vec<AltName> {
    let mut names = Vec::new();

    if let Some(sans) = cert.subject_alt_names() {
        for name in sans.iter() {
            if let Some(dns) = name.dnsname() {
                names.push(AltName::Dns(dns.to_string()));
            } else if let Some(ip) = name.ipaddress() {
                // Entries of any other length are malformed and skipped
                if let Ok(octets) = <[u8; 4]>::try_from(ip) {
                    names.push(AltName::Ip(IpAddr::V4(Ipv4Addr::from(octets))));
                } else if let Ok(octets) = <[u8; 16]>::try_from(ip) {
                    names.push(AltName::Ip(IpAddr::V6(Ipv6Addr::from(octets))));
                }
            }
        }
    }

    names
}
