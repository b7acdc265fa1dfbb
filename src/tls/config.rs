//! TLS configuration
//!
//! A [`TlsConfig`] is built once and then only read. Many connection
//! contexts can share one through an `Arc`.

use super::error::TlsError;
use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// TLS version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.0
    Tls10,
    /// TLS 1.1
    Tls11,
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    pub const ALL: [TlsVersion; 4] = [
        TlsVersion::Tls10,
        TlsVersion::Tls11,
        TlsVersion::Tls12,
        TlsVersion::Tls13,
    ];

    /// Parse TLS version from string (case-insensitive)
    pub fn parse(s: &str) -> Result<Self, TlsError> {
        match s.to_ascii_lowercase().as_str() {
            "tlsv1.0" | "tls1.0" | "tlsv1" | "tls1" => Ok(TlsVersion::Tls10),
            "tlsv1.1" | "tls1.1" => Ok(TlsVersion::Tls11),
            "tlsv1.2" | "tls1.2" => Ok(TlsVersion::Tls12),
            "tlsv1.3" | "tls1.3" => Ok(TlsVersion::Tls13),
            _ => Err(TlsError::config(format!("unknown protocol version {s:?}"))),
        }
    }

    /// Get version as string
    pub fn as_str(&self) -> &'static str {
        match self {
            TlsVersion::Tls10 => "TLSv1.0",
            TlsVersion::Tls11 => "TLSv1.1",
            TlsVersion::Tls12 => "TLSv1.2",
            TlsVersion::Tls13 => "TLSv1.3",
        }
    }

    fn bit(self) -> u32 {
        match self {
            TlsVersion::Tls10 => 1 << 1,
            TlsVersion::Tls11 => 1 << 2,
            TlsVersion::Tls12 => 1 << 3,
            TlsVersion::Tls13 => 1 << 4,
        }
    }
}

/// Set of enabled protocol versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Protocols(u32);

impl Protocols {
    pub const NONE: Protocols = Protocols(0);
    pub const TLS1_0: Protocols = Protocols(1 << 1);
    pub const TLS1_1: Protocols = Protocols(1 << 2);
    pub const TLS1_2: Protocols = Protocols(1 << 3);
    pub const TLS1_3: Protocols = Protocols(1 << 4);
    pub const ALL: Protocols = Protocols((1 << 1) | (1 << 2) | (1 << 3) | (1 << 4));
    pub const SECURE: Protocols = Protocols((1 << 3) | (1 << 4));

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn union(self, other: Protocols) -> Protocols {
        Protocols(self.0 | other.0)
    }

    pub const fn difference(self, other: Protocols) -> Protocols {
        Protocols(self.0 & !other.0)
    }

    pub fn contains(self, version: TlsVersion) -> bool {
        self.0 & version.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Enabled versions, oldest first
    pub fn versions(self) -> impl Iterator<Item = TlsVersion> {
        TlsVersion::ALL.into_iter().filter(move |v| self.contains(*v))
    }

    /// Parse a protocol list such as `"secure"`, `"tlsv1.2,tlsv1.3"` or
    /// `"all:!tlsv1.0"`.
    ///
    /// Entries are separated by commas or colons. `all`, `secure`/`default`
    /// and `legacy` name groups; a leading `!` removes an entry.
    pub fn parse(s: &str) -> Result<Self, TlsError> {
        let mut protocols = Protocols::NONE;

        for entry in s.split(|c: char| c == ',' || c == ':').map(str::trim).filter(|e| !e.is_empty()) {
            let (negate, name) = match entry.strip_prefix('!') {
                Some(name) => (true, name),
                None => (false, entry),
            };

            let set = match name.to_ascii_lowercase().as_str() {
                "all" | "legacy" => Protocols::ALL,
                "secure" | "default" => Protocols::SECURE,
                _ => TlsVersion::parse(name)?.into(),
            };

            protocols = if negate {
                protocols.difference(set)
            } else {
                protocols.union(set)
            };
        }

        if protocols.is_empty() {
            return Err(TlsError::config(format!("no protocols enabled by {s:?}")));
        }
        Ok(protocols)
    }
}

impl Default for Protocols {
    fn default() -> Self {
        Protocols::SECURE
    }
}

impl From<TlsVersion> for Protocols {
    fn from(version: TlsVersion) -> Self {
        Protocols(version.bit())
    }
}

impl fmt::Display for Protocols {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.versions().map(|v| v.as_str()).collect();
        f.write_str(&names.join(","))
    }
}

/// "Anything that is not completely broken"
pub const CIPHERS_COMPAT: &str = "HIGH:MEDIUM:+3DES:!aNULL";

/// TLSv1.2 AEAD with ECDHE/DHE
pub const CIPHERS_DEFAULT: &str = "HIGH+EECDH:HIGH+EDH:!SSLv3:!SHA384:!SHA256:!DSS:!aNULL";

/// Compact subset of reasonable suites, ECDHE > DHE > RSA, AES256 first
pub const CIPHERS_NORMAL: &str = "HIGH+EECDH:HIGH+EDH:HIGH+RSA:+SHA384:+SHA256:+SSLv3:+EDH:+RSA:-3DES:3DES+RSA:!CAMELLIA:!DSS:!aNULL";

/// As [`CIPHERS_NORMAL`] but preferring AES128
pub const CIPHERS_FAST: &str = "HIGH+EECDH:HIGH+EDH:HIGH+RSA:+AES256:+SHA256:+SHA384:+SSLv3:+EDH:+RSA:-3DES:3DES+RSA:!CAMELLIA:!DSS:!aNULL";

/// Everything OpenSSL offers except unauthenticated or unencrypted suites
pub const CIPHERS_INSECURE: &str = "ALL:!aNULL:!eNULL";

/// Map a named cipher policy to an OpenSSL cipher string.
///
/// Unknown names are passed through as raw cipher strings.
pub fn cipher_policy(name: &str) -> &str {
    match name.to_ascii_lowercase().as_str() {
        "secure" | "default" => CIPHERS_DEFAULT,
        "compat" | "legacy" => CIPHERS_COMPAT,
        "normal" => CIPHERS_NORMAL,
        "fast" => CIPHERS_FAST,
        "insecure" | "all" => CIPHERS_INSECURE,
        _ => name,
    }
}

/// Where PEM material comes from
#[derive(Clone, PartialEq, Eq)]
pub enum PemSource {
    /// Read from a file when a connection is initialized
    File(PathBuf),
    /// Already in memory
    Memory(Vec<u8>),
}

impl PemSource {
    /// Load the PEM bytes
    pub fn load(&self) -> Result<Cow<'_, [u8]>, TlsError> {
        match self {
            PemSource::Memory(pem) => Ok(Cow::Borrowed(pem)),
            PemSource::File(path) => fs::read(path)
                .map(Cow::Owned)
                .map_err(|e| TlsError::config(format!("failed to read {}: {e}", path.display()))),
        }
    }
}

impl fmt::Debug for PemSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PemSource::File(path) => f.debug_tuple("File").field(path).finish(),
            PemSource::Memory(pem) => write!(f, "Memory(<{} bytes>)", pem.len()),
        }
    }
}

/// Default maximum certificate chain depth
pub const DEFAULT_VERIFY_DEPTH: u32 = 6;

/// TLS configuration (immutable after building)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub(crate) ca: Option<PemSource>,
    pub(crate) ca_path: Option<PathBuf>,
    pub(crate) cert: Option<PemSource>,
    pub(crate) key: Option<PemSource>,
    pub(crate) protocols: Protocols,
    pub(crate) ciphers: String,
    pub(crate) verify_cert: bool,
    pub(crate) verify_name: bool,
    pub(crate) verify_depth: u32,
}

impl TlsConfig {
    /// Create a new configuration builder
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::new()
    }

    pub fn protocols(&self) -> Protocols {
        self.protocols
    }

    /// OpenSSL cipher string after resolving named policies
    pub fn cipher_list(&self) -> &str {
        cipher_policy(&self.ciphers)
    }

    pub fn verify_cert(&self) -> bool {
        self.verify_cert
    }

    pub fn verify_name(&self) -> bool {
        self.verify_name
    }

    pub fn verify_depth(&self) -> u32 {
        self.verify_depth
    }

    pub fn ca(&self) -> Option<&PemSource> {
        self.ca.as_ref()
    }

    pub fn ca_path(&self) -> Option<&Path> {
        self.ca_path.as_deref()
    }

    pub fn cert(&self) -> Option<&PemSource> {
        self.cert.as_ref()
    }

    pub fn key(&self) -> Option<&PemSource> {
        self.key.as_ref()
    }

    /// Whether any client key pair material is configured
    pub fn has_keypair(&self) -> bool {
        self.cert.is_some() || self.key.is_some()
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        TlsConfigBuilder::new().into_config()
    }
}

/// Configuration builder
#[derive(Debug, Clone)]
pub struct TlsConfigBuilder {
    ca: Option<PemSource>,
    ca_path: Option<PathBuf>,
    cert: Option<PemSource>,
    key: Option<PemSource>,
    protocols: Protocols,
    ciphers: String,
    verify_cert: bool,
    verify_name: bool,
    verify_depth: u32,
}

impl TlsConfigBuilder {
    fn new() -> Self {
        TlsConfigBuilder {
            ca: None,
            ca_path: None,
            cert: None,
            key: None,
            protocols: Protocols::default(),
            ciphers: "default".to_string(),
            verify_cert: true,
            verify_name: true,
            verify_depth: DEFAULT_VERIFY_DEPTH,
        }
    }

    /// Set the enabled protocol versions
    pub fn protocols(mut self, protocols: Protocols) -> Self {
        self.protocols = protocols;
        self
    }

    /// Restrict to a single TLS version
    pub fn version(mut self, version: TlsVersion) -> Self {
        self.protocols = version.into();
        self
    }

    /// Enable every version between `min` and `max` inclusive
    pub fn version_range(mut self, min: TlsVersion, max: TlsVersion) -> Self {
        self.protocols = TlsVersion::ALL
            .into_iter()
            .filter(|v| *v >= min && *v <= max)
            .fold(Protocols::NONE, |acc, v| acc.union(v.into()));
        self
    }

    /// Set the cipher policy: a named policy or a raw OpenSSL cipher string
    pub fn ciphers(mut self, ciphers: &str) -> Result<Self, TlsError> {
        if ciphers.trim().is_empty() {
            return Err(TlsError::config("empty cipher list"));
        }
        self.ciphers = ciphers.to_string();
        Ok(self)
    }

    /// Load trusted CA certificates from a PEM file
    pub fn ca_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.ca = Some(PemSource::File(path.as_ref().to_path_buf()));
        self
    }

    /// Use trusted CA certificates from PEM bytes
    pub fn ca_mem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.ca = Some(PemSource::Memory(pem.into()));
        self
    }

    /// Look up trusted CA certificates in a hashed directory
    pub fn ca_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.ca_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load the client certificate chain from a PEM file
    pub fn cert_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.cert = Some(PemSource::File(path.as_ref().to_path_buf()));
        self
    }

    /// Use the client certificate chain from PEM bytes
    pub fn cert_mem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.cert = Some(PemSource::Memory(pem.into()));
        self
    }

    /// Load the client private key from a PEM file
    pub fn key_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.key = Some(PemSource::File(path.as_ref().to_path_buf()));
        self
    }

    /// Use the client private key from PEM bytes
    pub fn key_mem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.key = Some(PemSource::Memory(pem.into()));
        self
    }

    /// Enable/disable peer certificate chain verification
    pub fn verify_cert(mut self, verify: bool) -> Self {
        self.verify_cert = verify;
        self
    }

    /// Enable/disable matching the peer certificate against the server name
    pub fn verify_name(mut self, verify: bool) -> Self {
        self.verify_name = verify;
        self
    }

    /// Maximum certificate chain depth
    pub fn verify_depth(mut self, depth: u32) -> Self {
        self.verify_depth = depth;
        self
    }

    /// Build the TLS configuration
    pub fn build(self) -> Result<TlsConfig, TlsError> {
        if self.protocols.is_empty() {
            return Err(TlsError::config("no protocols enabled"));
        }
        match (&self.cert, &self.key) {
            (Some(_), None) => return Err(TlsError::config("certificate given without a private key")),
            (None, Some(_)) => return Err(TlsError::config("private key given without a certificate")),
            _ => {}
        }
        Ok(self.into_config())
    }

    fn into_config(self) -> TlsConfig {
        TlsConfig {
            ca: self.ca,
            ca_path: self.ca_path,
            cert: self.cert,
            key: self.key,
            protocols: self.protocols,
            ciphers: self.ciphers,
            verify_cert: self.verify_cert,
            verify_name: self.verify_name,
            verify_depth: self.verify_depth,
        }
    }
}
