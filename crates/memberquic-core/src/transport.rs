//! The QUIC transport handed to the membership engine.
//!
//! [`QuicTransport`] owns the endpoint, the connection pool, the inbound
//! queues and every background task. It implements [`Transport`] and
//! [`NodeAwareTransport`].

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::accept::{accept_loop, Dispatcher};
use crate::advertise::advertise_addr;
use crate::config::{Config, ALPN};
use crate::contract::{Address, NodeAwareTransport, Packet, Transport};
use crate::datagram::send_packet;
use crate::endpoint::QuicSocket;
use crate::error::{Result, TransportError};
use crate::pool::{ConnPool, NewConnHook};
use crate::queue::EventQueue;
use crate::stream_conn::StreamConn;

/// Gossip transport over a single mutual-TLS QUIC endpoint.
pub struct QuicTransport {
    socket: QuicSocket,
    pool: Arc<ConnPool>,
    packets: EventQueue<Packet>,
    streams: EventQueue<StreamConn>,
    shutdown: CancellationToken,
    shutdown_started: AtomicBool,
    tracker: TaskTracker,
}

impl std::fmt::Debug for QuicTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuicTransport")
            .field("local_addr", &self.socket.local_addr())
            .field("pool", &self.pool)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl QuicTransport {
    /// Bind the endpoint and start accepting connections.
    ///
    /// Zero-valued settings in `config` take their defaults. Fails with
    /// [`TransportError::MissingTlsConfig`] if no TLS config is set. Must be
    /// called inside a tokio runtime.
    pub fn new(config: Config) -> Result<Self> {
        let config = config.with_defaults();
        let tls = config
            .tls
            .as_ref()
            .ok_or(TransportError::MissingTlsConfig)?
            .with_alpn(ALPN);

        let socket = QuicSocket::bind(&config, &tls)?;
        let local_addr = socket.local_addr();

        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();

        let (packet_tx, packets) = EventQueue::new(config.packet_queue_size, shutdown.clone());
        let (stream_tx, streams) = EventQueue::new(config.stream_queue_size, shutdown.clone());

        let dispatcher = Dispatcher::new(
            packet_tx,
            stream_tx,
            local_addr,
            shutdown.clone(),
            tracker.clone(),
        );

        let on_dialed = dispatcher.clone();
        let hook: NewConnHook = Arc::new(move |conn: quinn::Connection| on_dialed.start(conn));
        let pool = ConnPool::new(
            socket.clone(),
            config.max_connection_age,
            config.pool_sweep_interval,
            Some(hook),
        );

        tracker.spawn(accept_loop(socket.clone(), Arc::clone(&pool), dispatcher));

        info!(%local_addr, "QUIC transport started");

        Ok(Self {
            socket,
            pool,
            packets,
            streams,
            shutdown,
            shutdown_started: AtomicBool::new(false),
            tracker,
        })
    }

    /// The connection pool, for introspection.
    pub fn conn_pool(&self) -> &Arc<ConnPool> {
        &self.pool
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr()
    }

    /// The raw quinn endpoint. Dials made through it leave from the
    /// listening socket, which hole punching relies on.
    pub fn endpoint(&self) -> &quinn::Endpoint {
        self.socket.endpoint()
    }

    /// Report any failure as [`TransportError::Shutdown`] once shutdown has
    /// begun; connections torn down by it otherwise surface as I/O errors.
    fn after_shutdown(&self, err: TransportError) -> TransportError {
        if self.shutdown.is_cancelled() {
            TransportError::Shutdown
        } else {
            err
        }
    }

    async fn send_to(&self, buf: &[u8], addr: &str) -> Result<Instant> {
        let conn = self
            .pool
            .get_or_dial(&self.shutdown, addr)
            .await
            .map_err(|e| self.after_shutdown(e))?;

        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Err(TransportError::Shutdown),
            result = send_packet(&conn, buf) => result.map_err(|e| self.after_shutdown(e)),
        }
    }

    async fn open_stream(&self, addr: &str, timeout: Duration) -> Result<StreamConn> {
        let conn = self
            .pool
            .get_or_dial(&self.shutdown, addr)
            .await
            .map_err(|e| self.after_shutdown(e))?;

        let (send, recv) = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => return Err(TransportError::Shutdown),
            result = conn.open_bi() => result.map_err(|e| self.after_shutdown(e.into()))?,
        };

        let mut stream = StreamConn::new(send, recv, self.local_addr(), conn.remote_address());
        if !timeout.is_zero() {
            stream.set_deadline(Some(Instant::now() + timeout));
        }
        Ok(stream)
    }
}

#[async_trait]
impl Transport for QuicTransport {
    fn final_advertise_addr(&self, ip: Option<IpAddr>, port: u16) -> Result<(IpAddr, u16)> {
        advertise_addr(self.local_addr(), ip, port)
    }

    async fn write_to(&self, buf: &[u8], addr: &str) -> Result<Instant> {
        self.send_to(buf, addr).await
    }

    fn packet_ch(&self) -> &EventQueue<Packet> {
        &self.packets
    }

    async fn dial_timeout(&self, addr: &str, timeout: Duration) -> Result<StreamConn> {
        self.open_stream(addr, timeout).await
    }

    fn stream_ch(&self) -> &EventQueue<StreamConn> {
        &self.streams
    }

    async fn shutdown(&self) -> Result<()> {
        if !self.shutdown_started.swap(true, Ordering::SeqCst) {
            debug!(local_addr = %self.local_addr(), "shutting down transport");
            self.shutdown.cancel();
            self.pool.close().await;
            self.socket.close();
            self.tracker.close();
        }

        self.tracker.wait().await;
        Ok(())
    }
}

#[async_trait]
impl NodeAwareTransport for QuicTransport {
    async fn write_to_address(&self, buf: &[u8], addr: &Address) -> Result<Instant> {
        self.send_to(buf, &addr.addr).await
    }

    async fn dial_address_timeout(
        &self,
        addr: &Address,
        timeout: Duration,
    ) -> Result<StreamConn> {
        self.open_stream(&addr.addr, timeout).await
    }
}
