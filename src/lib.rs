//! Service layer of the loan-tracking bot.
//!
//! Wires the text-to-SQL query agent behind the bot's `answer_question`
//! boundary: permission check, rate limit, context assembly, agent run,
//! audit record - in that order. Channel adapters (WhatsApp/Telegram) are
//! external collaborators reached only through the `ChannelSender` port.

pub mod channel;
pub mod config;
pub mod permissions;
pub mod service;

pub use channel::{Channel, ChannelSender, OutboundMessage};
pub use config::BotConfig;
pub use permissions::{check_permission, ConfirmationPolicy, PermissionCheck, RiskLevel};
pub use service::BotService;
