//! TLS handshake engine
//!
//! The connection context never talks to OpenSSL directly. It drives an
//! [`Engine`], which builds a top-level context from a [`TlsConfig`] and a
//! per-connection [`EngineSession`] bound to a pair of descriptors. Every
//! session operation reports the three-valued [`Status`], so a
//! non-blocking descriptor suspends the operation instead of failing it.
//!
//! [`OpenSslEngine`] is the production engine; tests substitute their own.

use super::cert::PeerCertificate;
use super::config::{PemSource, TlsConfig};
use super::error::TlsError;
use openssl::pkey::PKey;
use openssl::ssl::{
    self, ErrorCode, ShutdownResult, Ssl, SslContext, SslContextBuilder, SslMethod, SslOptions,
    SslStream, SslVerifyMode,
};
use openssl::x509::{X509VerifyResult, X509};
use std::io::{self, Read, Write};
use std::os::fd::RawFd;

/// Outcome of an operation that may need to wait for the descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status<T = ()> {
    /// The operation completed
    Ready(T),
    /// Retry once the read descriptor is readable
    WantRead,
    /// Retry once the write descriptor is writable
    WantWrite,
}

impl<T> Status<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Status::Ready(_))
    }

    /// Completed value, if any
    pub fn ready(self) -> Option<T> {
        match self {
            Status::Ready(v) => Some(v),
            Status::WantRead | Status::WantWrite => None,
        }
    }
}

/// Read and write descriptors of one connection
///
/// The pair does not own the descriptors; the connection context does (or
/// the caller, when it supplied them).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdPair {
    pub read: RawFd,
    pub write: RawFd,
}

impl FdPair {
    pub fn new(read: RawFd, write: RawFd) -> Self {
        FdPair { read, write }
    }

    pub fn is_valid(&self) -> bool {
        self.read >= 0 && self.write >= 0
    }
}

impl Read for FdPair {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            // SAFETY: `buf` is valid for writes of `buf.len()` bytes.
            let n = unsafe { libc::read(self.read, buf.as_mut_ptr().cast(), buf.len()) };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

impl Write for FdPair {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            // SAFETY: `buf` is valid for reads of `buf.len()` bytes.
            let n = unsafe { libc::write(self.write, buf.as_ptr().cast(), buf.len()) };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Cryptographic engine capable of creating client sessions
pub trait Engine {
    type Session: EngineSession;

    /// Build the engine context from `config` and a session over `io`.
    ///
    /// `servername` is sent as SNI when present; the caller has already
    /// filtered out literal addresses.
    fn init(
        &mut self,
        config: &TlsConfig,
        io: FdPair,
        servername: Option<&str>,
    ) -> Result<Self::Session, TlsError>;
}

/// One TLS session of an [`Engine`]
pub trait EngineSession {
    /// Advance the client handshake as far as the descriptors allow
    fn handshake(&mut self) -> Result<Status, TlsError>;

    /// Read application data; `Ready(0)` means the peer closed the session
    fn read(&mut self, buf: &mut [u8]) -> Result<Status<usize>, TlsError>;

    /// Write application data
    fn write(&mut self, buf: &[u8]) -> Result<Status<usize>, TlsError>;

    /// Send close-notify
    fn shutdown(&mut self) -> Result<Status, TlsError>;

    /// Identity claims of the peer certificate, once the handshake is done
    fn peer_certificate(&self) -> Option<PeerCertificate>;
}

/// Engine backed by the `openssl` crate
///
/// Each session holds a reference to the context it was built from, so the
/// context lives exactly as long as the session.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenSslEngine;

impl OpenSslEngine {
    pub fn new() -> Self {
        OpenSslEngine
    }

    fn build_context(config: &TlsConfig) -> Result<SslContext, TlsError> {
        let mut builder = SslContextBuilder::new(SslMethod::tls_client())
            .map_err(|e| TlsError::config(format!("ssl context failure: {e}")))?;

        configure_protocols(&mut builder, config);
        builder
            .set_cipher_list(config.cipher_list())
            .map_err(|e| TlsError::config(format!("failed to set ciphers: {e}")))?;

        if config.has_keypair() {
            configure_keypair(&mut builder, config)?;
        }
        configure_verify(&mut builder, config)?;

        Ok(builder.build())
    }
}

fn configure_protocols(builder: &mut SslContextBuilder, config: &TlsConfig) {
    use super::config::TlsVersion;

    let protocols = config.protocols();
    let mut options = SslOptions::NO_SSLV2 | SslOptions::NO_SSLV3;
    for (version, option) in [
        (TlsVersion::Tls10, SslOptions::NO_TLSV1),
        (TlsVersion::Tls11, SslOptions::NO_TLSV1_1),
        (TlsVersion::Tls12, SslOptions::NO_TLSV1_2),
        (TlsVersion::Tls13, SslOptions::NO_TLSV1_3),
    ] {
        if !protocols.contains(version) {
            options |= option;
        }
    }
    builder.set_options(options);
}

fn configure_keypair(builder: &mut SslContextBuilder, config: &TlsConfig) -> Result<(), TlsError> {
    let (Some(cert), Some(key)) = (config.cert(), config.key()) else {
        return Err(TlsError::config("incomplete key pair"));
    };

    let chain = X509::stack_from_pem(&cert.load()?)
        .map_err(|e| TlsError::config(format!("failed to load certificate: {e}")))?;
    let mut chain = chain.into_iter();
    let leaf = chain
        .next()
        .ok_or_else(|| TlsError::config("no certificate in PEM data"))?;
    builder
        .set_certificate(&leaf)
        .map_err(|e| TlsError::config(format!("failed to use certificate: {e}")))?;
    for extra in chain {
        builder
            .add_extra_chain_cert(extra)
            .map_err(|e| TlsError::config(format!("failed to add chain certificate: {e}")))?;
    }

    let pkey = PKey::private_key_from_pem(&key.load()?)
        .map_err(|e| TlsError::config(format!("failed to load private key: {e}")))?;
    builder
        .set_private_key(&pkey)
        .map_err(|e| TlsError::config(format!("failed to use private key: {e}")))?;
    builder
        .check_private_key()
        .map_err(|e| TlsError::config(format!("private key does not match certificate: {e}")))
}

fn configure_verify(builder: &mut SslContextBuilder, config: &TlsConfig) -> Result<(), TlsError> {
    if !config.verify_cert() {
        builder.set_verify(SslVerifyMode::NONE);
        return Ok(());
    }
    builder.set_verify(SslVerifyMode::PEER);

    match config.ca() {
        Some(PemSource::Memory(pem)) => {
            let certs = X509::stack_from_pem(pem)
                .map_err(|e| TlsError::config(format!("failed to load CA: {e}")))?;
            if certs.is_empty() {
                return Err(TlsError::config("no certificates in CA data"));
            }
            let store = builder.cert_store_mut();
            for cert in certs {
                store
                    .add_cert(cert)
                    .map_err(|e| TlsError::config(format!("failed to add CA: {e}")))?;
            }
        }
        Some(PemSource::File(path)) => builder
            .load_verify_locations(Some(path.as_path()), None)
            .map_err(|e| TlsError::config(format!("failed to load CA file {}: {e}", path.display())))?,
        None => {}
    }
    if let Some(dir) = config.ca_path() {
        builder
            .load_verify_locations(None, Some(dir))
            .map_err(|e| TlsError::config(format!("failed to load CA path {}: {e}", dir.display())))?;
    }
    if config.ca().is_none() && config.ca_path().is_none() {
        builder
            .set_default_verify_paths()
            .map_err(|e| TlsError::config(format!("failed to load default CA: {e}")))?;
    }

    builder.set_verify_depth(config.verify_depth());
    Ok(())
}

impl Engine for OpenSslEngine {
    type Session = OpenSslSession;

    fn init(
        &mut self,
        config: &TlsConfig,
        io: FdPair,
        servername: Option<&str>,
    ) -> Result<OpenSslSession, TlsError> {
        let ctx = Self::build_context(config)?;

        let mut ssl =
            Ssl::new(&ctx).map_err(|e| TlsError::config(format!("ssl connection failure: {e}")))?;
        if let Some(name) = servername {
            ssl.set_hostname(name)
                .map_err(|e| TlsError::config(format!("server name indication failure: {e}")))?;
        }
        let stream = SslStream::new(ssl, io)
            .map_err(|e| TlsError::config(format!("ssl file descriptor failure: {e}")))?;

        Ok(OpenSslSession { stream })
    }
}

/// OpenSSL session over a descriptor pair
pub struct OpenSslSession {
    stream: SslStream<FdPair>,
}

impl OpenSslSession {
    /// Negotiated protocol version, e.g. `"TLSv1.3"`
    pub fn version(&self) -> &'static str {
        self.stream.ssl().version_str()
    }

    /// Negotiated cipher suite
    pub fn cipher(&self) -> Option<&'static str> {
        self.stream.ssl().current_cipher().map(|c| c.name())
    }
}

/// Split an OpenSSL error into a retry signal or a diagnostic and code
fn classify<T>(err: ssl::Error) -> Result<Status<T>, (String, Option<i32>)> {
    match err.code() {
        ErrorCode::WANT_READ => Ok(Status::WantRead),
        ErrorCode::WANT_WRITE => Ok(Status::WantWrite),
        _ => {
            let code = err.io_error().and_then(io::Error::raw_os_error);
            let message = match err.io_error() {
                Some(io) => io.to_string(),
                None if err.code() == ErrorCode::SYSCALL => "unexpected EOF".to_string(),
                None => err.to_string(),
            };
            Err((message, code))
        }
    }
}

impl EngineSession for OpenSslSession {
    fn handshake(&mut self) -> Result<Status, TlsError> {
        match self.stream.connect() {
            Ok(()) => Ok(Status::Ready(())),
            Err(e) => classify(e).map_err(|(mut message, code)| {
                let verify = self.stream.ssl().verify_result();
                if verify != X509VerifyResult::OK {
                    message = format!("certificate verification failed: {}", verify.error_string());
                }
                TlsError::Handshake { message, code }
            }),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<Status<usize>, TlsError> {
        match self.stream.ssl_read(buf) {
            Ok(n) => Ok(Status::Ready(n)),
            Err(e) if e.code() == ErrorCode::ZERO_RETURN => Ok(Status::Ready(0)),
            Err(e) => classify(e).map_err(|(message, code)| TlsError::Session {
                op: "read",
                message,
                code,
            }),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<Status<usize>, TlsError> {
        match self.stream.ssl_write(buf) {
            Ok(n) => Ok(Status::Ready(n)),
            Err(e) => classify(e).map_err(|(message, code)| TlsError::Session {
                op: "write",
                message,
                code,
            }),
        }
    }

    fn shutdown(&mut self) -> Result<Status, TlsError> {
        match self.stream.shutdown() {
            Ok(ShutdownResult::Sent) | Ok(ShutdownResult::Received) => Ok(Status::Ready(())),
            Err(e) if e.code() == ErrorCode::ZERO_RETURN => Ok(Status::Ready(())),
            Err(e) => classify(e).map_err(|(message, code)| TlsError::Session {
                op: "close",
                message,
                code,
            }),
        }
    }

    fn peer_certificate(&self) -> Option<PeerCertificate> {
        self.stream
            .ssl()
            .peer_certificate()
            .map(|cert| PeerCertificate::from_x509(&cert))
    }
}
