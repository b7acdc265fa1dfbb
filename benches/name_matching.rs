//! Identity verification benchmarks
//!
//! Measures:
//! - exact and wildcard name matching
//! - certificate checks with many subject alternative names
//! - host/port splitting
//!
//! Run with: cargo bench --bench name_matching

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tls_connect::net::split_host_port;
use tls_connect::tls::{check_servername, match_name, AltName, PeerCertificate};

fn bench_match_name(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_name");

    group.bench_function("exact", |b| {
        b.iter(|| match_name(black_box("www.example.com"), black_box("WWW.Example.com")))
    });

    group.bench_function("wildcard", |b| {
        b.iter(|| match_name(black_box("*.example.com"), black_box("www.example.com")))
    });

    group.bench_function("wildcard_rejected", |b| {
        b.iter(|| match_name(black_box("*.com"), black_box("example.com")))
    });

    group.bench_function("ip_against_wildcard", |b| {
        b.iter(|| match_name(black_box("*.0.0.1"), black_box("127.0.0.1")))
    });

    group.finish();
}

fn certificate(sans: usize) -> PeerCertificate {
    PeerCertificate {
        common_name: Some("example.com".to_string()),
        issuer: None,
        subject_alt_names: (0..sans)
            .map(|i| AltName::Dns(format!("host{i}.example.com")))
            .collect(),
    }
}

fn bench_check_servername(c: &mut Criterion) {
    let mut group = c.benchmark_group("check_servername");

    for sans in [1, 10, 100] {
        let cert = certificate(sans);
        let last = format!("host{}.example.com", sans - 1);

        group.bench_with_input(BenchmarkId::new("last_san", sans), &cert, |b, cert| {
            b.iter(|| check_servername(black_box(cert), black_box(&last)))
        });
        group.bench_with_input(BenchmarkId::new("miss", sans), &cert, |b, cert| {
            b.iter(|| check_servername(black_box(cert), black_box("other.example.org")))
        });
    }

    let ip_cert = PeerCertificate {
        common_name: None,
        issuer: None,
        subject_alt_names: vec![AltName::Ip("::1".parse().unwrap())],
    };
    group.bench_function("ip", |b| {
        b.iter(|| check_servername(black_box(&ip_cert), black_box("::1")))
    });

    group.finish();
}

fn bench_split_host_port(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_host_port");

    for input in ["example.com:443", "[::1]:8443", "::1"] {
        group.bench_with_input(BenchmarkId::from_parameter(input), &input, |b, input| {
            b.iter(|| split_host_port(black_box(input)))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_match_name,
    bench_check_servername,
    bench_split_host_port
);
criterion_main!(benches);
