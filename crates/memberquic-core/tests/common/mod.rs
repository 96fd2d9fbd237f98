//! Shared helpers for the transport integration tests.

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use memberquic_core::config::ALPN;
use memberquic_core::endpoint::QuicSocket;
use memberquic_core::{Config, Packet, QuicTransport, Transport};
use memberquic_proto::identity::{CertificateAuthority, NodeCertificate};
use memberquic_proto::tls::{mutual_tls_config, MutualTlsConfig};

pub const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Generous bound for anything that should happen "promptly" on loopback.
pub const PROMPTLY: Duration = Duration::from_secs(5);

/// Init tracing subscriber (idempotent across tests via try_init).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .try_init();
}

pub fn banner(name: &str) {
    init_tracing();
    eprintln!("\n{}", "=".repeat(72));
    eprintln!("TEST: {name}");
    eprintln!("{}", "=".repeat(72));
}

pub fn cluster_ca() -> CertificateAuthority {
    CertificateAuthority::generate("memberquic-test", DAY).expect("CA generation")
}

/// Mutual-TLS config for `node_id`, valid for 127.0.0.1.
pub fn node_tls(ca: &CertificateAuthority, node_id: &str) -> MutualTlsConfig {
    let node = NodeCertificate::generate(ca, node_id, &[LOOPBACK], DAY).expect("node cert");
    mutual_tls_config(
        node.cert_pem().as_bytes(),
        node.key_pem().as_bytes(),
        ca.cert_pem().as_bytes(),
    )
    .expect("mutual TLS config")
}

/// Loopback config on an OS-assigned port.
pub fn node_config(ca: &CertificateAuthority, node_id: &str) -> Config {
    Config {
        bind_addr: LOOPBACK,
        ..Config::new(node_tls(ca, node_id))
    }
}

pub fn start_node(ca: &CertificateAuthority, node_id: &str) -> QuicTransport {
    let transport = QuicTransport::new(node_config(ca, node_id)).expect("transport should start");
    eprintln!("-- {node_id}: listening on {}", transport.local_addr());
    transport
}

/// A bare endpoint speaking the transport's ALPN, for driving the pool directly.
pub fn bind_socket(ca: &CertificateAuthority, node_id: &str) -> QuicSocket {
    let config = node_config(ca, node_id);
    let tls = node_tls(ca, node_id).with_alpn(ALPN);
    QuicSocket::bind(&config, &tls).expect("socket should bind")
}

pub async fn next_packet(transport: &QuicTransport) -> Packet {
    tokio::time::timeout(PROMPTLY, transport.packet_ch().recv())
        .await
        .expect("packet should arrive promptly")
        .expect("packet queue should be open")
}
