//! Shared helpers for integration tests: throwaway certificates and a
//! one-shot TLS server thread.

#![allow(dead_code)]

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{NameType, SslAcceptor, SslMethod, SslStream, SslVerifyMode};
use openssl::x509::extension::{BasicConstraints, SubjectAlternativeName};
use openssl::x509::{X509NameBuilder, X509};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver};
use std::thread;

/// Self-signed certificate with its key, in object and PEM form
pub struct TestCert {
    pub cert: X509,
    pub key: PKey<Private>,
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

/// Generate a self-signed CA certificate for `cn` with the given SANs
pub fn self_signed(cn: &str, dns: &[&str], ips: &[&str]) -> TestCert {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();
    builder
        .set_serial_number(&serial.to_asn1_integer().unwrap())
        .unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(2).unwrap())
        .unwrap();
    builder
        .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
        .unwrap();

    if !dns.is_empty() || !ips.is_empty() {
        let mut san = SubjectAlternativeName::new();
        for name in dns {
            san.dns(name);
        }
        for ip in ips {
            san.ip(ip);
        }
        let ext = san.build(&builder.x509v3_context(None, None)).unwrap();
        builder.append_extension(ext).unwrap();
    }

    builder.sign(&key, MessageDigest::sha256()).unwrap();
    let cert = builder.build();

    TestCert {
        cert_pem: cert.to_pem().unwrap(),
        key_pem: key.private_key_to_pem_pkcs8().unwrap(),
        cert,
        key,
    }
}

/// What the server saw of the client
#[derive(Debug)]
pub struct Accepted {
    /// SNI host name sent by the client
    pub sni: Option<String>,
    /// Whether the client presented a certificate
    pub client_cert: bool,
}

/// Options for [`spawn_server`]
#[derive(Default)]
pub struct ServerOptions<'a> {
    /// Require a client certificate signed by this CA
    pub client_ca: Option<&'a X509>,
}

/// Accept one TLS connection on a loopback port, report what was seen,
/// then hand the stream to `handler`.
///
/// Failed handshakes are ignored; nothing is reported for them.
pub fn spawn_server<F>(cert: &TestCert, options: ServerOptions<'_>, handler: F) -> (u16, Receiver<Accepted>)
where
    F: FnOnce(SslStream<TcpStream>) + Send + 'static,
{
    let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).unwrap();
    acceptor.set_private_key(&cert.key).unwrap();
    acceptor.set_certificate(&cert.cert).unwrap();
    if let Some(ca) = options.client_ca {
        acceptor.cert_store_mut().add_cert(ca.clone()).unwrap();
        acceptor.set_verify(SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT);
    }
    let acceptor = acceptor.build();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let (tcp, _) = listener.accept().unwrap();
        let Ok(stream) = acceptor.accept(tcp) else {
            return;
        };
        let _ = tx.send(Accepted {
            sni: stream
                .ssl()
                .servername(NameType::HOST_NAME)
                .map(str::to_string),
            client_cert: stream.ssl().peer_certificate().is_some(),
        });
        handler(stream);
    });

    (port, rx)
}

/// Echo one read back to the client
pub fn echo_once(mut stream: SslStream<TcpStream>) {
    use std::io::{Read, Write};

    let mut buf = [0u8; 1024];
    if let Ok(n) = stream.read(&mut buf) {
        let _ = stream.write_all(&buf[..n]);
    }
    let _ = stream.shutdown();
}
