//! In-memory transport.
//!
//! Lets session code run without sockets: the test side holds a
//! [`MemoryPeer`] that injects inbound frames and reads what the server wrote.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Frame, FrameSink, FrameSource, TransportError};

/// Read half handed to the session.
pub struct MemorySource {
    rx: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
}

/// Write half handed to the session.
pub struct MemorySink {
    tx: Option<mpsc::UnboundedSender<Frame>>,
    stalled: Arc<AtomicBool>,
}

/// The remote end of an in-memory transport.
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Result<Frame, TransportError>>>,
    outbound: mpsc::UnboundedReceiver<Frame>,
    stalled: Arc<AtomicBool>,
}

/// Create a connected transport and its peer.
pub fn pair() -> (MemorySink, MemorySource, MemoryPeer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let stalled = Arc::new(AtomicBool::new(false));
    (
        MemorySink {
            tx: Some(out_tx),
            stalled: Arc::clone(&stalled),
        },
        MemorySource { rx: in_rx },
        MemoryPeer {
            inbound: Some(in_tx),
            outbound: out_rx,
            stalled,
        },
    )
}

impl MemoryPeer {
    /// Deliver a frame to the server side. Returns `false` once it stopped reading.
    pub fn send(&self, frame: Frame) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(frame)).is_ok())
    }

    /// Send a text frame.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.send(Frame::Text(text.into()))
    }

    /// Make the next server read fail.
    pub fn fail_read(&self, error: TransportError) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(Err(error)).is_ok())
    }

    /// End the inbound stream, as if the peer hung up.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Stop reading, like a peer whose receive window is full: every server
    /// write, including the closing handshake, hangs from now on.
    pub fn stall_writes(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    /// Next frame the server wrote, or `None` once the server closed.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.outbound.recv().await
    }

    /// Next text frame the server wrote, skipping pings.
    pub async fn recv_text(&mut self) -> Option<String> {
        loop {
            match self.outbound.recv().await? {
                Frame::Text(text) => return Some(text),
                Frame::Ping(_) | Frame::Pong(_) => {}
                Frame::Binary(_) | Frame::Close => return None,
            }
        }
    }
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        self.rx.recv().await
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Frame::Close);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (mut sink, mut source, mut peer) = pair();
        assert!(peer.send_text("hello"));
        assert_eq!(source.recv().await.unwrap().unwrap(), Frame::Text("hello".into()));

        sink.send(Frame::Text("back".into())).await.unwrap();
        assert_eq!(peer.recv_text().await.as_deref(), Some("back"));
    }

    #[tokio::test]
    async fn hang_up_ends_stream() {
        let (_sink, mut source, mut peer) = pair();
        peer.hang_up();
        assert!(source.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_sink_never_completes() {
        let (mut sink, _source, peer) = pair();
        peer.stall_writes();
        let send = tokio::time::timeout(Duration::from_secs(60), sink.send(Frame::Close));
        assert!(send.await.is_err());
        let close = tokio::time::timeout(Duration::from_secs(60), sink.close());
        assert!(close.await.is_err());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_visible() {
        let (mut sink, _source, mut peer) = pair();
        sink.close().await;
        sink.close().await;
        assert_eq!(peer.recv().await, Some(Frame::Close));
        assert_eq!(peer.recv().await, None);
        assert!(sink.send(Frame::Text("late".into())).await.is_err());
    }
}
