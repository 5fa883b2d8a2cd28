//! Datagram channels the client talks through.
//!
//! The client never opens sockets itself: it asks a [Connector] for a boxed
//! [Channel]. [UdpConnector] is the real thing, [pipe] and [PipeConnector]
//! give an in-memory peer for tests.

use std::io::{self, ErrorKind};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use log::trace;
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// A connected, datagram-oriented duplex channel.
#[async_trait]
pub trait Channel: Send {
    /// Send one datagram.
    async fn send(&mut self, datagram: &[u8]) -> io::Result<()>;

    /// Receive one datagram into `buf`, returning how many bytes were written.
    /// Anything that does not fit is lost.
    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Throw away every datagram that is already waiting, without blocking.
    /// Returns how many were dropped.
    fn drain(&mut self) -> io::Result<usize> {
        Ok(0)
    }

    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Opens a [Channel] to an address.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, address: &str, timeout: Duration) -> io::Result<Box<dyn Channel>>;
}

#[async_trait]
impl Channel for UdpSocket {
    async fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        UdpSocket::send(self, datagram).await.map(|_| ())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        UdpSocket::recv(self, buf).await
    }

    fn drain(&mut self) -> io::Result<usize> {
        // contents are discarded, truncation does not matter
        let mut buf = [0u8; 64];
        let mut dropped = 0;
        loop {
            match self.try_recv(&mut buf) {
                Ok(_) => dropped += 1,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(dropped),
                Err(e) => return Err(e),
            }
        }
    }
}

/// Connects an ephemeral UDP socket to the target.
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpConnector;

impl UdpConnector {
    async fn open(address: &str) -> io::Result<UdpSocket> {
        let target = lookup_host(address)
            .await?
            .next()
            .ok_or_else(|| io::Error::new(ErrorKind::NotFound, "address did not resolve"))?;

        let local = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(target).await?;

        trace!("udp socket {} connected to {}", socket.local_addr()?, target);
        Ok(socket)
    }
}

#[async_trait]
impl Connector for UdpConnector {
    async fn connect(&self, address: &str, timeout: Duration) -> io::Result<Box<dyn Channel>> {
        match tokio::time::timeout(timeout, Self::open(address)).await {
            Ok(socket) => Ok(Box::new(socket?)),
            Err(_) => Err(io::Error::new(ErrorKind::TimedOut, "connect timed out")),
        }
    }
}

/// One end of an in-memory datagram pipe, see [pipe].
#[derive(Debug)]
pub struct MemoryChannel {
    tx: Option<UnboundedSender<Vec<u8>>>,
    rx: UnboundedReceiver<Vec<u8>>,
}

/// Create two connected in-memory channels. Whatever one end sends, the other
/// receives, one datagram at a time.
pub fn pipe() -> (MemoryChannel, MemoryChannel) {
    let (a_tx, b_rx) = unbounded_channel();
    let (b_tx, a_rx) = unbounded_channel();

    (
        MemoryChannel {
            tx: Some(a_tx),
            rx: a_rx,
        },
        MemoryChannel {
            tx: Some(b_tx),
            rx: b_rx,
        },
    )
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::from(ErrorKind::NotConnected))?;

        tx.send(datagram.to_vec())
            .map_err(|_| io::Error::from(ErrorKind::BrokenPipe))
    }

    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.tx.is_none() {
            return Err(ErrorKind::NotConnected.into());
        }

        let datagram = self
            .rx
            .recv()
            .await
            .ok_or_else(|| io::Error::from(ErrorKind::ConnectionReset))?;

        let n = datagram.len().min(buf.len());
        buf[..n].copy_from_slice(&datagram[..n]);
        Ok(n)
    }

    fn drain(&mut self) -> io::Result<usize> {
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        Ok(dropped)
    }

    async fn close(&mut self) -> io::Result<()> {
        self.tx = None;
        self.rx.close();
        Ok(())
    }
}

/// Hands out a single pre-built [MemoryChannel], whatever the address.
#[derive(Debug)]
pub struct PipeConnector {
    channel: Mutex<Option<MemoryChannel>>,
}

impl PipeConnector {
    pub fn new(channel: MemoryChannel) -> Self {
        PipeConnector {
            channel: Mutex::new(Some(channel)),
        }
    }
}

#[async_trait]
impl Connector for PipeConnector {
    async fn connect(&self, address: &str, _timeout: Duration) -> io::Result<Box<dyn Channel>> {
        let channel = self
            .channel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or_else(|| io::Error::from(ErrorKind::ConnectionRefused))?;

        trace!("handing out in-memory channel for {}", address);
        Ok(Box::new(channel))
    }
}
