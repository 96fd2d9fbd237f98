//! Transport configuration.
//!
//! Every duration and queue size treats zero as "use the default", so a
//! partially filled [`Config`] can be normalized with
//! [`Config::with_defaults`].

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use memberquic_proto::tls::MutualTlsConfig;

/// ALPN identifier that separates memberquic sessions from anything else
/// sharing the port.
pub const ALPN: &[u8] = b"memberquic/1";

pub const DEFAULT_MAX_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_KEEP_ALIVE_PERIOD: Duration = Duration::from_secs(10);
pub const DEFAULT_PACKET_QUEUE_SIZE: usize = 256;
pub const DEFAULT_STREAM_QUEUE_SIZE: usize = 16;
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for [`QuicTransport`](crate::QuicTransport).
#[derive(Clone, Debug)]
pub struct Config {
    /// Address to bind. Unspecified binds every interface.
    pub bind_addr: IpAddr,
    /// Port to bind; 0 lets the OS pick.
    pub bind_port: u16,

    /// Mutual-TLS configuration. Required.
    pub tls: Option<MutualTlsConfig>,

    /// QUIC idle timeout after which a silent connection is closed.
    pub max_idle_timeout: Duration,
    /// Interval between QUIC keep-alive pings.
    pub keep_alive_period: Duration,

    /// Capacity of the inbound packet queue.
    pub packet_queue_size: usize,
    /// Capacity of the inbound stream queue.
    pub stream_queue_size: usize,

    /// Pooled connections older than this are closed by the sweep.
    /// Zero disables age eviction.
    pub max_connection_age: Duration,
    /// How often the pool sweeps dead and over-age connections.
    pub pool_sweep_interval: Duration,

    /// Advertise no datagram support, forcing every packet onto the
    /// framed-stream path.
    pub disable_datagrams: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            bind_port: 0,
            tls: None,
            max_idle_timeout: DEFAULT_MAX_IDLE_TIMEOUT,
            keep_alive_period: DEFAULT_KEEP_ALIVE_PERIOD,
            packet_queue_size: DEFAULT_PACKET_QUEUE_SIZE,
            stream_queue_size: DEFAULT_STREAM_QUEUE_SIZE,
            max_connection_age: Duration::ZERO,
            pool_sweep_interval: DEFAULT_SWEEP_INTERVAL,
            disable_datagrams: false,
        }
    }
}

impl Config {
    /// Default configuration with the given TLS config.
    pub fn new(tls: MutualTlsConfig) -> Self {
        Self {
            tls: Some(tls),
            ..Self::default()
        }
    }

    /// Replace zero-valued settings with their defaults.
    pub fn with_defaults(mut self) -> Self {
        if self.max_idle_timeout.is_zero() {
            self.max_idle_timeout = DEFAULT_MAX_IDLE_TIMEOUT;
        }
        if self.keep_alive_period.is_zero() {
            self.keep_alive_period = DEFAULT_KEEP_ALIVE_PERIOD;
        }
        if self.packet_queue_size == 0 {
            self.packet_queue_size = DEFAULT_PACKET_QUEUE_SIZE;
        }
        if self.stream_queue_size == 0 {
            self.stream_queue_size = DEFAULT_STREAM_QUEUE_SIZE;
        }
        if self.pool_sweep_interval.is_zero() {
            self.pool_sweep_interval = DEFAULT_SWEEP_INTERVAL;
        }
        self
    }

    /// The socket address to bind.
    pub fn bind_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.bind_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values_take_defaults() {
        let config = Config {
            max_idle_timeout: Duration::ZERO,
            keep_alive_period: Duration::ZERO,
            packet_queue_size: 0,
            stream_queue_size: 0,
            pool_sweep_interval: Duration::ZERO,
            ..Config::default()
        }
        .with_defaults();

        assert_eq!(config.max_idle_timeout, DEFAULT_MAX_IDLE_TIMEOUT);
        assert_eq!(config.keep_alive_period, DEFAULT_KEEP_ALIVE_PERIOD);
        assert_eq!(config.packet_queue_size, DEFAULT_PACKET_QUEUE_SIZE);
        assert_eq!(config.stream_queue_size, DEFAULT_STREAM_QUEUE_SIZE);
        assert_eq!(config.pool_sweep_interval, DEFAULT_SWEEP_INTERVAL);
    }

    #[test]
    fn explicit_values_survive() {
        let config = Config {
            max_idle_timeout: Duration::from_secs(5),
            packet_queue_size: 8,
            max_connection_age: Duration::from_secs(60),
            ..Config::default()
        }
        .with_defaults();

        assert_eq!(config.max_idle_timeout, Duration::from_secs(5));
        assert_eq!(config.packet_queue_size, 8);
        assert_eq!(config.max_connection_age, Duration::from_secs(60));
    }

    #[test]
    fn max_age_zero_stays_unbounded() {
        let config = Config::default().with_defaults();
        assert!(config.max_connection_age.is_zero());
        assert!(config.tls.is_none());
    }

    #[test]
    fn bind_socket_addr_combines_ip_and_port() {
        let config = Config {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            bind_port: 7946,
            ..Config::default()
        };
        assert_eq!(config.bind_socket_addr(), "127.0.0.1:7946".parse().unwrap());
    }
}
