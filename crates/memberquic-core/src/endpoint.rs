//! The single QUIC socket every connection goes through.
//!
//! `QuicSocket` wraps one quinn endpoint that both listens and dials. Dials
//! must leave from the listening socket so NAT mappings (and hole punches)
//! made for inbound traffic are reused for outbound traffic.

use std::net::SocketAddr;
use std::sync::Arc;

use memberquic_proto::tls::MutualTlsConfig;
use quinn::crypto::rustls::{QuicClientConfig, QuicServerConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Result, TransportError};

/// A bound QUIC endpoint with mutual-TLS client and server configs.
#[derive(Clone, Debug)]
pub struct QuicSocket {
    endpoint: quinn::Endpoint,
    local_addr: SocketAddr,
}

impl QuicSocket {
    /// Bind a QUIC endpoint to `config`'s bind address.
    ///
    /// `tls` must already carry the transport's ALPN identifier. Must be
    /// called inside a tokio runtime.
    pub fn bind(config: &Config, tls: &MutualTlsConfig) -> Result<Self> {
        let transport = Arc::new(transport_config(config)?);

        let quic_server_config = QuicServerConfig::try_from(Arc::clone(tls.server()))
            .map_err(|e| TransportError::TlsConfig(format!("rustls→quinn server: {e}")))?;
        let mut server_config = quinn::ServerConfig::with_crypto(Arc::new(quic_server_config));
        server_config.transport_config(Arc::clone(&transport));

        let quic_client_config = QuicClientConfig::try_from(Arc::clone(tls.client()))
            .map_err(|e| TransportError::TlsConfig(format!("rustls→quinn client: {e}")))?;
        let mut client_config = quinn::ClientConfig::new(Arc::new(quic_client_config));
        client_config.transport_config(transport);

        let addr = config.bind_socket_addr();
        let mut endpoint = quinn::Endpoint::server(server_config, addr)
            .map_err(|e| TransportError::Bind(format!("{addr}: {e}")))?;
        endpoint.set_default_client_config(client_config);

        let local_addr = endpoint
            .local_addr()
            .map_err(|e| TransportError::Bind(e.to_string()))?;

        info!(%local_addr, "QUIC endpoint bound");

        Ok(Self {
            endpoint,
            local_addr,
        })
    }

    /// Dial `addr`, expecting the server certificate to be valid for
    /// `server_name`. Aborts with [`TransportError::Shutdown`] when `cancel`
    /// fires first.
    pub async fn dial(
        &self,
        cancel: &CancellationToken,
        addr: SocketAddr,
        server_name: &str,
    ) -> Result<quinn::Connection> {
        let connecting = self.endpoint.connect(addr, server_name)?;

        let conn = tokio::select! {
            result = connecting => result?,
            () = cancel.cancelled() => return Err(TransportError::Shutdown),
        };

        debug!(peer = %addr, "dialed connection");
        Ok(conn)
    }

    /// Wait for the next incoming connection attempt. `None` once the
    /// endpoint is closed.
    pub async fn accept(&self) -> Option<quinn::Incoming> {
        self.endpoint.accept().await
    }

    /// Resolve a textual `host:port` to a socket address this endpoint can
    /// reach, preferring the endpoint's own address family.
    pub async fn resolve(&self, addr: &str) -> Result<SocketAddr> {
        if let Ok(parsed) = addr.parse::<SocketAddr>() {
            return Ok(parsed);
        }

        let resolved: Vec<SocketAddr> = tokio::net::lookup_host(addr)
            .await
            .map_err(|e| TransportError::Resolve {
                addr: addr.to_owned(),
                reason: e.to_string(),
            })?
            .collect();

        resolved
            .iter()
            .find(|candidate| candidate.is_ipv4() == self.local_addr.is_ipv4())
            .or_else(|| resolved.first())
            .copied()
            .ok_or_else(|| TransportError::Resolve {
                addr: addr.to_owned(),
                reason: "no addresses found".into(),
            })
    }

    /// The address the endpoint is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The underlying quinn endpoint.
    pub fn endpoint(&self) -> &quinn::Endpoint {
        &self.endpoint
    }

    /// Close the endpoint and every connection on it.
    pub fn close(&self) {
        self.endpoint.close(0u32.into(), b"transport shutdown");
    }
}

/// QUIC transport parameters shared by inbound and outbound connections.
fn transport_config(config: &Config) -> Result<quinn::TransportConfig> {
    let idle_timeout = quinn::IdleTimeout::try_from(config.max_idle_timeout)
        .map_err(|e| TransportError::Config(format!("max idle timeout: {e}")))?;

    let mut transport = quinn::TransportConfig::default();
    transport.max_idle_timeout(Some(idle_timeout));
    transport.keep_alive_interval(Some(config.keep_alive_period));
    if config.disable_datagrams {
        transport.datagram_receive_buffer_size(None);
    }
    Ok(transport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn transport_config_accepts_defaults() {
        assert!(transport_config(&Config::default()).is_ok());
    }

    #[test]
    fn transport_config_rejects_huge_idle_timeout() {
        let config = Config {
            max_idle_timeout: Duration::from_secs(u64::MAX / 2),
            ..Config::default()
        };
        assert!(matches!(
            transport_config(&config),
            Err(TransportError::Config(_))
        ));
    }
}
