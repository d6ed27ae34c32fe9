//! Outbound channels from the gateway to connected clients.

use crate::error::GatewayError;
use crate::Result;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// A client's outbound byte channel.
///
/// Sends never block. Once closed, every send fails.
pub trait OutputChannel: Send + Sync {
    /// Queue one frame for delivery.
    fn send(&self, frame: &str) -> Result<()>;

    /// Close the channel, ending the client's stream.
    fn close(&self);
}

/// [`OutputChannel`] backed by an unbounded tokio channel.
pub struct ChannelOutput {
    tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl ChannelOutput {
    /// Create a channel and the receiver the HTTP stream reads from.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

impl OutputChannel for ChannelOutput {
    fn send(&self, frame: &str) -> Result<()> {
        let guard = self.tx.lock();
        let tx = guard
            .as_ref()
            .ok_or_else(|| GatewayError::ChannelClosed("output closed".to_string()))?;
        tx.send(frame.to_string())
            .map_err(|_| GatewayError::ChannelClosed("client stream dropped".to_string()))
    }

    fn close(&self) {
        self.tx.lock().take();
    }
}
