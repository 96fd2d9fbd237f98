//! Receive side: the listener accept loop and the per-connection loops that
//! feed the packet and stream queues.
//!
//! Every connection, inbound or dialed, gets three loops: datagrams,
//! bidirectional streams, and unidirectional (framed packet) streams. The
//! loops are per connection so a broken peer only stops its own loops. All of
//! them run on the transport's [`TaskTracker`] and stop on shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use quinn::{Connection, RecvStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

use crate::connection::node_id_from_conn;
use crate::contract::Packet;
use crate::datagram::read_framed;
use crate::endpoint::QuicSocket;
use crate::pool::ConnPool;
use crate::stream_conn::StreamConn;

/// Starts receive loops for connections and routes what they read into the
/// inbound queues.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    packets: mpsc::Sender<Packet>,
    streams: mpsc::Sender<StreamConn>,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Dispatcher {
    pub fn new(
        packets: mpsc::Sender<Packet>,
        streams: mpsc::Sender<StreamConn>,
        local_addr: SocketAddr,
        shutdown: CancellationToken,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            packets,
            streams,
            local_addr,
            shutdown,
            tracker,
        }
    }

    /// Spawn the datagram, bidirectional and unidirectional stream loops for
    /// `conn`.
    pub fn start(&self, conn: Connection) {
        self.tracker.spawn(self.clone().datagram_loop(conn.clone()));
        self.tracker.spawn(self.clone().bi_loop(conn.clone()));
        self.tracker.spawn(self.clone().uni_loop(conn));
    }

    async fn datagram_loop(self, conn: Connection) {
        let from = conn.remote_address();
        loop {
            let datagram = tokio::select! {
                result = conn.read_datagram() => match result {
                    Ok(datagram) => datagram,
                    Err(e) => {
                        trace!(peer = %from, error = %e, "datagram loop ended");
                        return;
                    }
                },
                () = self.shutdown.cancelled() => return,
            };
            if !self.push_packet(Packet::new(datagram, from)).await {
                return;
            }
        }
    }

    async fn bi_loop(self, conn: Connection) {
        let remote = conn.remote_address();
        loop {
            let (send, recv) = tokio::select! {
                result = conn.accept_bi() => match result {
                    Ok(streams) => streams,
                    Err(e) => {
                        trace!(peer = %remote, error = %e, "stream loop ended");
                        return;
                    }
                },
                () = self.shutdown.cancelled() => return,
            };

            let stream = StreamConn::new(send, recv, self.local_addr, remote);
            let queued = tokio::select! {
                result = self.streams.send(stream) => result.is_ok(),
                () = self.shutdown.cancelled() => false,
            };
            if !queued {
                return;
            }
        }
    }

    async fn uni_loop(self, conn: Connection) {
        let remote = conn.remote_address();
        loop {
            let recv = tokio::select! {
                result = conn.accept_uni() => match result {
                    Ok(recv) => recv,
                    Err(e) => {
                        trace!(peer = %remote, error = %e, "framed packet loop ended");
                        return;
                    }
                },
                () = self.shutdown.cancelled() => return,
            };
            self.tracker.spawn(self.clone().handle_framed(recv, remote));
        }
    }

    /// Read one framed packet. Malformed or oversized frames are dropped and
    /// the stream stopped.
    async fn handle_framed(self, mut recv: RecvStream, from: SocketAddr) {
        let result = tokio::select! {
            result = read_framed(&mut recv) => result,
            () = self.shutdown.cancelled() => return,
        };

        match result {
            Ok(buf) => {
                self.push_packet(Packet::new(buf, from)).await;
            }
            Err(e) => {
                debug!(peer = %from, error = %e, "dropping framed packet");
                let _ = recv.stop(0u32.into());
            }
        }
    }

    /// Queue `packet`, giving up if the transport shuts down first.
    async fn push_packet(&self, packet: Packet) -> bool {
        tokio::select! {
            result = self.packets.send(packet) => result.is_ok(),
            () = self.shutdown.cancelled() => false,
        }
    }
}

/// Accept connections on `socket` until the endpoint closes or the transport
/// shuts down.
///
/// Each handshake runs in its own task so a slow peer cannot hold up the
/// listener. Handshake failures are logged and the loop keeps going.
pub async fn accept_loop(socket: QuicSocket, pool: Arc<ConnPool>, dispatcher: Dispatcher) {
    loop {
        let incoming = tokio::select! {
            incoming = socket.accept() => match incoming {
                Some(incoming) => incoming,
                None => break,
            },
            () = dispatcher.shutdown.cancelled() => break,
        };

        let remote = incoming.remote_address();
        let connecting = match incoming.accept() {
            Ok(connecting) => connecting,
            Err(e) => {
                if !dispatcher.shutdown.is_cancelled() {
                    warn!(peer = %remote, error = %e, "failed to accept connection");
                }
                continue;
            }
        };

        let pool = Arc::clone(&pool);
        let handler = dispatcher.clone();
        dispatcher.tracker.spawn(async move {
            let result = tokio::select! {
                result = connecting => result,
                () = handler.shutdown.cancelled() => return,
            };

            match result {
                Ok(conn) => {
                    debug!(
                        peer = %remote,
                        node = node_id_from_conn(&conn).as_deref().unwrap_or("?"),
                        "accepted connection"
                    );
                    pool.add_inbound(conn.clone());
                    handler.start(conn);
                }
                Err(e) => {
                    if !handler.shutdown.is_cancelled() {
                        warn!(peer = %remote, error = %e, "inbound handshake failed");
                    }
                }
            }
        });
    }
    debug!("accept loop stopped");
}
