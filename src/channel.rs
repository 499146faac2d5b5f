//! Outbound messaging port.
//!
//! The WhatsApp/Telegram adapters live outside this repository; the service
//! only needs a way to hand them a finished text reply.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Conversation channel a reply belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    WhatsApp,
    Telegram,
}

/// One text reply ready for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: Channel,
    /// Channel-specific recipient address (E.164 phone or Telegram chat id).
    pub recipient: String,
    pub body: String,
}

/// Delivery port implemented by the channel adapters.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send_text(&self, message: &OutboundMessage) -> anyhow::Result<()>;
}
