//! Telegram command bot: `/start`, `/open`, `/close`

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::actuator::{ActuatorClient, ActuatorCommand};
use crate::error::Result;
use crate::telegram::{TelegramClient, Update};

pub const HELP_TEXT: &str = "Selamat datang!\n\nPerintah:\n\
/start - Memulai bot\n\
/open - Membuka box\n\
/close - Menutup box";

/// Pause before polling again after a failed getUpdates
const POLL_ERROR_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Open,
    Close,
}

impl BotCommand {
    /// Parse the leading `/command` (optionally `/command@botname`) of a message
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.split_whitespace().next()?;
        let name = first.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);

        match name {
            "start" => Some(BotCommand::Start),
            "open" => Some(BotCommand::Open),
            "close" => Some(BotCommand::Close),
            _ => None,
        }
    }

    /// Actuator command driven by this bot command, if any
    pub fn actuator_command(&self) -> Option<ActuatorCommand> {
        match self {
            BotCommand::Start => None,
            BotCommand::Open => Some(ActuatorCommand::Open),
            BotCommand::Close => Some(ActuatorCommand::Close),
        }
    }

    /// Reply sent before the actuator is called
    pub fn acknowledgement(&self) -> &'static str {
        match self {
            BotCommand::Start => HELP_TEXT,
            BotCommand::Open => "Membuka box...",
            BotCommand::Close => "Menutup box...",
        }
    }
}

/// Final reply for an actuator call
pub fn status_reply(result: &Result<String>) -> String {
    match result {
        Ok(status) => format!("Status: {}", status.trim()),
        Err(_) => "Status: Error".to_string(),
    }
}

/// Long-polls the bot and runs commands against the actuator
pub struct CommandDispatcher {
    telegram: Arc<TelegramClient>,
    actuator: Arc<ActuatorClient>,
}

impl CommandDispatcher {
    pub fn new(telegram: Arc<TelegramClient>, actuator: Arc<ActuatorClient>) -> Self {
        Self { telegram, actuator }
    }

    /// Handle one command from `chat_id`
    pub async fn dispatch(&self, command: BotCommand, chat_id: &str) -> Result<()> {
        tracing::info!(?command, chat_id, "Bot command received");
        self.telegram
            .send_message(chat_id, command.acknowledgement())
            .await?;

        if let Some(actuator_command) = command.actuator_command() {
            let result = self.actuator.send(actuator_command).await;
            if let Err(e) = &result {
                tracing::warn!("Actuator {} failed: {}", actuator_command, e);
            }
            self.telegram
                .send_message(chat_id, &status_reply(&result))
                .await?;
        }
        Ok(())
    }

    pub async fn handle_update(&self, update: Update) {
        let Some(message) = update.message else {
            return;
        };
        let Some(command) = message.text.as_deref().and_then(BotCommand::parse) else {
            return;
        };
        let chat_id = message.chat.id.to_string();

        if let Err(e) = self.dispatch(command, &chat_id).await {
            tracing::warn!("Failed to answer {:?}: {}", command, e);
        }
    }

    /// Poll until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!("Telegram bot started");
        let mut offset = 0i64;

        loop {
            let polled = tokio::select! {
                _ = shutdown.cancelled() => break,
                polled = self.telegram.get_updates(offset) => polled,
            };

            match polled {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        self.handle_update(update).await;
                    }
                }
                Err(e) => {
                    tracing::warn!("Polling Telegram failed: {}", e);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(POLL_ERROR_DELAY) => {}
                    }
                }
            }
        }

        tracing::info!("Telegram bot stopped");
    }
}
