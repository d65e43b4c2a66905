//! Framed TCP transport.
//!
//! Each frame travels as `u32 length | body` (big-endian). [`FramedConn`]
//! owns the socket and an internal read buffer; [`FramedConn::drain`] pulls
//! everything the OS has buffered without blocking, so a tick loop can poll
//! many connections and never stall on a slow peer. A peer that never sends
//! a complete frame simply yields no frames until it does.

use std::io;
use std::net::SocketAddr;

use anyhow::Context;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Upper bound on a frame body. A length prefix beyond this is a protocol
/// error and tears the connection down.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Result of one non-blocking drain pass over a connection.
#[derive(Debug, Default)]
pub struct Drain {
    /// Complete frame bodies, in arrival order.
    pub frames: Vec<Bytes>,
    /// The peer closed the connection. Frames received before the close are
    /// still present in `frames`.
    pub closed: bool,
}

/// A TCP connection with length-prefix framing.
#[derive(Debug)]
pub struct FramedConn {
    stream: TcpStream,
    rx: BytesMut,
}

impl FramedConn {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            rx: BytesMut::with_capacity(4096),
        }
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        Ok(Self::new(stream))
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Sends one frame: length prefix plus body.
    pub async fn send_frame(&mut self, body: &[u8]) -> anyhow::Result<()> {
        let mut buf = BytesMut::with_capacity(4 + body.len());
        buf.put_u32(body.len() as u32);
        buf.extend_from_slice(body);
        self.stream.write_all(&buf).await.context("tcp write")?;
        Ok(())
    }

    /// Reads whatever is available without blocking, then extracts every
    /// complete frame from the buffer. Partial frames stay buffered for the
    /// next pass.
    pub fn drain(&mut self) -> anyhow::Result<Drain> {
        let mut out = Drain::default();

        loop {
            match self.stream.try_read_buf(&mut self.rx) {
                Ok(0) => {
                    out.closed = true;
                    break;
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e).context("tcp read"),
            }
        }

        while let Some(frame) = self.extract_frame()? {
            out.frames.push(frame);
        }
        Ok(out)
    }

    /// Receives one frame, waiting for the peer. Used by clients and tests;
    /// the server core only ever drains.
    pub async fn recv_frame(&mut self) -> anyhow::Result<Bytes> {
        loop {
            if let Some(frame) = self.extract_frame()? {
                return Ok(frame);
            }
            let n = self
                .stream
                .read_buf(&mut self.rx)
                .await
                .context("tcp read")?;
            if n == 0 {
                anyhow::bail!("connection closed by peer");
            }
        }
    }

    /// [`FramedConn::recv_frame`] bounded by a timeout; `None` on timeout.
    pub async fn recv_frame_timeout(
        &mut self,
        timeout: std::time::Duration,
    ) -> anyhow::Result<Option<Bytes>> {
        match tokio::time::timeout(timeout, self.recv_frame()).await {
            Ok(frame) => frame.map(Some),
            Err(_) => Ok(None),
        }
    }

    fn extract_frame(&mut self) -> anyhow::Result<Option<Bytes>> {
        if self.rx.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([self.rx[0], self.rx[1], self.rx[2], self.rx[3]]) as usize;
        if len > MAX_FRAME_LEN {
            anyhow::bail!("frame length {} exceeds limit {}", len, MAX_FRAME_LEN);
        }
        if self.rx.len() < 4 + len {
            return Ok(None);
        }
        self.rx.advance(4);
        Ok(Some(self.rx.split_to(len).freeze()))
    }
}

/// Listening socket producing [`FramedConn`]s.
pub struct FrameListener {
    listener: TcpListener,
}

impl FrameListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(FramedConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        Ok((FramedConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    async fn loopback_pair() -> anyhow::Result<(FramedConn, FramedConn)> {
        let bind = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = FrameListener::bind(bind).await?;
        let addr = listener.local_addr()?;
        let client = FramedConn::connect(addr).await?;
        let (server_side, _) = listener.accept().await?;
        Ok((client, server_side))
    }

    #[tokio::test]
    async fn frames_survive_coalesced_writes() -> anyhow::Result<()> {
        let (mut client, mut server) = loopback_pair().await?;

        client.send_frame(b"first").await?;
        client.send_frame(b"second").await?;

        let a = server.recv_frame().await?;
        let b = server.recv_frame().await?;
        assert_eq!(&a[..], b"first");
        assert_eq!(&b[..], b"second");
        Ok(())
    }

    #[tokio::test]
    async fn drain_reports_peer_close() -> anyhow::Result<()> {
        let (mut client, mut server) = loopback_pair().await?;

        client.send_frame(b"bye").await?;
        drop(client);

        // Give the OS a moment to deliver data and FIN.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let drain = server.drain()?;
        assert_eq!(drain.frames.len(), 1);
        assert_eq!(&drain.frames[0][..], b"bye");
        assert!(drain.closed);
        Ok(())
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_an_error() -> anyhow::Result<()> {
        let bind = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = FrameListener::bind(bind).await?;
        let addr = listener.local_addr()?;

        let mut raw = TcpStream::connect(addr).await?;
        let (mut server, _) = listener.accept().await?;

        raw.write_all(&u32::MAX.to_be_bytes()).await?;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert!(server.drain().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn partial_frame_stays_buffered() -> anyhow::Result<()> {
        let bind = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = FrameListener::bind(bind).await?;
        let addr = listener.local_addr()?;

        let mut raw = TcpStream::connect(addr).await?;
        let (mut server, _) = listener.accept().await?;

        // Length prefix announcing 4 bytes, but only half the body arrives.
        raw.write_all(&4u32.to_be_bytes()).await?;
        raw.write_all(b"ab").await?;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(server.drain()?.frames.is_empty());

        raw.write_all(b"cd").await?;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let drain = server.drain()?;
        assert_eq!(drain.frames.len(), 1);
        assert_eq!(&drain.frames[0][..], b"abcd");
        Ok(())
    }
}
