//! Server identity verification
//!
//! Matches the requested server name against the identities a peer
//! certificate claims:
//!
//! - IP literals only match IP subject alternative names, byte for byte
//! - DNS names match DNS subject alternative names; the subject common
//!   name is consulted only when the certificate has no DNS SAN at all
//! - comparison is ASCII case-insensitive, and a `*` leftmost label
//!   matches exactly one non-empty label

use super::cert::PeerCertificate;
use super::error::TlsError;
use crate::net::literal_addr;

/// Check that `cert` is valid for `servername`.
pub fn check_servername(cert: &PeerCertificate, servername: &str) -> Result<(), TlsError> {
    if let Some(ip) = literal_addr(servername) {
        if cert.ip_addresses().any(|candidate| candidate == ip) {
            return Ok(());
        }
        return Err(mismatch(servername));
    }

    let mut has_dns = false;
    for name in cert.dns_names() {
        if name.contains('\0') {
            return Err(TlsError::Verification(format!(
                "NUL byte in subject alternative name while verifying {servername:?}"
            )));
        }
        has_dns = true;
        if match_name(name, servername) {
            return Ok(());
        }
    }
    if has_dns {
        return Err(mismatch(servername));
    }

    match cert.common_name.as_deref() {
        Some(cn) if cn.contains('\0') => Err(TlsError::Verification(format!(
            "NUL byte in common name while verifying {servername:?}"
        ))),
        Some(cn) if match_name(cn, servername) => Ok(()),
        _ => Err(mismatch(servername)),
    }
}

fn mismatch(servername: &str) -> TlsError {
    TlsError::Verification(format!(
        "name {servername:?} not present in server certificate"
    ))
}

/// Match a certificate name (possibly a wildcard) against a host name.
///
/// Valid wildcards look like `*.domain.tld`. `*`, `*foo`, `*..x`, `*.tld`
/// and `*.domain..` never match.
pub fn match_name(cert_name: &str, name: &str) -> bool {
    if cert_name.eq_ignore_ascii_case(name) {
        return true;
    }

    let Some(cert_domain) = cert_name.strip_prefix('*') else {
        return false;
    };

    // cert_domain must be ".label.rest" with two non-empty leading labels
    let Some(after_dot) = cert_domain.strip_prefix('.') else {
        return false;
    };
    let Some((first, rest)) = after_dot.split_once('.') else {
        return false;
    };
    if first.is_empty() || rest.is_empty() || rest.starts_with('.') {
        return false;
    }

    // IP literals never match a wildcard
    if literal_addr(name).is_some() {
        return false;
    }

    let Some(dot) = name.find('.') else {
        return false;
    };
    let (label, domain) = name.split_at(dot);
    if label.is_empty() || label.contains('*') || domain.len() == 1 {
        return false;
    }

    cert_domain.eq_ignore_ascii_case(domain)
}
