//! Messaging channel interface.

use async_trait::async_trait;

use super::CollaboratorError;
use crate::session::{CallbackCommand, Notice};

/// Buttons attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Interactivity {
    #[default]
    None,
    /// The persistent main menu keyboard.
    MainMenu,
    /// Inline buttons, each carrying a callback command.
    Choices(Vec<CallbackCommand>),
}

/// One message to a user. The channel decides the wording.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub notice: Notice,
    pub interactivity: Interactivity,
}

impl OutboundMessage {
    pub fn new(notice: Notice) -> Self {
        Self {
            notice,
            interactivity: Interactivity::None,
        }
    }

    pub fn with_menu(notice: Notice) -> Self {
        Self {
            notice,
            interactivity: Interactivity::MainMenu,
        }
    }

    pub fn with_choices(notice: Notice, choices: Vec<CallbackCommand>) -> Self {
        Self {
            notice,
            interactivity: Interactivity::Choices(choices),
        }
    }
}

/// What happened to a sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The user blocked the bot or left the chat.
    Unreachable,
}

/// Delivers messages to users.
#[async_trait]
pub trait MessagingChannel: Send + Sync {
    async fn send(
        &self,
        external_id: i64,
        message: OutboundMessage,
    ) -> Result<DeliveryOutcome, CollaboratorError>;
}
