use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use convoflow_app::ports::{ChannelSender, DeliveryReceipt, OutgoingMessage};
use convoflow_domain::contact::Channel;
use convoflow_domain::error::ConvoFlowError;

/// Writes outbound messages to the log instead of a gateway.
///
/// Channels can be switched off to exercise delivery failures and retries.
#[derive(Debug, Default)]
pub struct LogChannelSender {
    sent: AtomicU64,
    offline: Mutex<HashSet<Channel>>,
}

impl LogChannelSender {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages reported delivered.
    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Reject every message on `channel` until switched back on.
    pub fn set_offline(&self, channel: Channel, offline: bool) {
        let mut channels = self.offline.lock().unwrap_or_else(|e| e.into_inner());
        if offline {
            channels.insert(channel);
        } else {
            channels.remove(&channel);
        }
    }

    fn is_offline(&self, channel: Channel) -> bool {
        self.offline
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&channel)
    }
}

impl ChannelSender for LogChannelSender {
    async fn send(&self, message: &OutgoingMessage) -> Result<DeliveryReceipt, ConvoFlowError> {
        if self.is_offline(message.channel) {
            tracing::warn!(channel = %message.channel, recipient = %message.recipient, "channel offline");
            return Ok(DeliveryReceipt::rejected(format!("{} is offline", message.channel)));
        }
        let n = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            channel = %message.channel,
            recipient = %message.recipient,
            media = message.media_url.as_deref().unwrap_or("-"),
            content = %message.content,
            "outbound message"
        );
        Ok(DeliveryReceipt::delivered(format!("console-{n}")))
    }
}
