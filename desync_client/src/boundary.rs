//! Network boundaries.
//!
//! Controllers run synchronously inside tick hooks, so sending must never
//! block. [`ChannelBoundary`] hands messages to an async forwarder over an
//! unbounded channel; [`RecordingBoundary`] keeps them in memory.

use desync_shared::net::{FramedConn, ServerboundMsg};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Outgoing side of the connection.
pub trait NetworkBoundary {
    fn send(&mut self, msg: ServerboundMsg);
}

impl<N: NetworkBoundary + ?Sized> NetworkBoundary for Box<N> {
    fn send(&mut self, msg: ServerboundMsg) {
        (**self).send(msg);
    }
}

/// Keeps every sent message, in order.
#[derive(Debug, Default)]
pub struct RecordingBoundary {
    sent: Vec<ServerboundMsg>,
}

impl RecordingBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> &[ServerboundMsg] {
        &self.sent
    }

    /// Removes and returns everything recorded so far.
    pub fn take(&mut self) -> Vec<ServerboundMsg> {
        std::mem::take(&mut self.sent)
    }
}

impl NetworkBoundary for RecordingBoundary {
    fn send(&mut self, msg: ServerboundMsg) {
        self.sent.push(msg);
    }
}

/// Queues messages for an async writer task.
#[derive(Debug)]
pub struct ChannelBoundary {
    tx: mpsc::UnboundedSender<ServerboundMsg>,
    dropped: u64,
}

impl ChannelBoundary {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerboundMsg>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, dropped: 0 }, rx)
    }

    /// Messages discarded because the writer had gone away.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl NetworkBoundary for ChannelBoundary {
    fn send(&mut self, msg: ServerboundMsg) {
        if self.tx.send(msg).is_err() {
            if self.dropped == 0 {
                warn!("Packet writer closed; dropping outgoing messages");
            }
            self.dropped += 1;
        }
    }
}

/// Writes queued messages to `conn` until every sender is dropped.
pub async fn forward(
    mut rx: mpsc::UnboundedReceiver<ServerboundMsg>,
    conn: &mut FramedConn,
) -> anyhow::Result<u64> {
    let mut forwarded = 0;
    while let Some(msg) = rx.recv().await {
        conn.send(&msg).await?;
        forwarded += 1;
    }
    debug!(forwarded, "Packet channel closed");
    Ok(forwarded)
}
