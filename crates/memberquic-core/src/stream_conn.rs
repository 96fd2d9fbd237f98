//! Byte-stream view of one bidirectional QUIC stream.
//!
//! [`StreamConn`] is what the membership engine reads and writes for push/pull
//! state sync. It adds read and write deadlines on top of quinn's streams;
//! an expired deadline surfaces as [`io::ErrorKind::TimedOut`].

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use quinn::{RecvStream, SendStream};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Sleep;

/// An optional absolute deadline that can be polled.
#[derive(Debug, Default)]
struct Deadline {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Deadline {
    fn set(&mut self, at: Option<Instant>) {
        self.sleep = at.map(|at| Box::pin(tokio::time::sleep_until(at.into())));
    }

    /// `true` once the deadline has passed. Registers the waker otherwise.
    fn poll_expired(&mut self, cx: &mut Context<'_>) -> bool {
        match self.sleep.as_mut() {
            Some(sleep) => sleep.is_elapsed() || sleep.as_mut().poll(cx).is_ready(),
            None => false,
        }
    }
}

fn timed_out(op: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("{op} deadline exceeded"))
}

/// A bidirectional stream with local/remote addresses and deadlines.
#[derive(Debug)]
pub struct StreamConn {
    send: SendStream,
    recv: RecvStream,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    read_deadline: Deadline,
    write_deadline: Deadline,
}

impl StreamConn {
    pub fn new(
        send: SendStream,
        recv: RecvStream,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
    ) -> Self {
        Self {
            send,
            recv,
            local_addr,
            remote_addr,
            read_deadline: Deadline::default(),
            write_deadline: Deadline::default(),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Set both deadlines. `None` clears them; a time in the past makes the
    /// next read and write fail immediately.
    pub fn set_deadline(&mut self, at: Option<Instant>) {
        self.read_deadline.set(at);
        self.write_deadline.set(at);
    }

    pub fn set_read_deadline(&mut self, at: Option<Instant>) {
        self.read_deadline.set(at);
    }

    pub fn set_write_deadline(&mut self, at: Option<Instant>) {
        self.write_deadline.set(at);
    }

    /// Close both directions: finish our send half and stop reading.
    pub fn close(&mut self) {
        // Either half may already be closed by the peer.
        let _ = self.send.finish();
        let _ = self.recv.stop(0u32.into());
    }
}

impl AsyncRead for StreamConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.read_deadline.poll_expired(cx) {
            return Poll::Ready(Err(timed_out("read")));
        }
        AsyncRead::poll_read(Pin::new(&mut this.recv), cx, buf)
    }
}

impl AsyncWrite for StreamConn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.write_deadline.poll_expired(cx) {
            return Poll::Ready(Err(timed_out("write")));
        }
        AsyncWrite::poll_write(Pin::new(&mut this.send), cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.write_deadline.poll_expired(cx) {
            return Poll::Ready(Err(timed_out("write")));
        }
        AsyncWrite::poll_flush(Pin::new(&mut this.send), cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncWrite::poll_shutdown(Pin::new(&mut self.get_mut().send), cx)
    }
}
