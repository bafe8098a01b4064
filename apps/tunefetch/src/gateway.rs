use async_trait::async_trait;
use std::path::Path;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile};
use thiserror::Error;

/// Chat transport failure. Logged at the orchestrator boundary; the request
/// is dropped rather than retried.
#[derive(Debug, Clone, Error)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// One keyboard option: the label shown to the user and the callback data
/// the transport sends back on selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
	pub label: String,
	pub data: String,
}

/// Outbound side of the chat transport. Inbound updates are wired up by the
/// dispatcher in `main`; everything the orchestrator sends goes through here.
#[async_trait]
pub trait DeliveryGateway: Send + Sync {
	async fn send_text(&self, chat: ChatId, text: &str) -> Result<(), DeliveryError>;
	async fn send_choices(&self, chat: ChatId, text: &str, choices: &[Choice]) -> Result<(), DeliveryError>;
	async fn send_audio(&self, chat: ChatId, file: &Path, caption: &str) -> Result<(), DeliveryError>;
}

pub struct TelegramGateway {
	bot: Bot,
}

impl TelegramGateway {
	#[must_use]
	pub fn new(bot: Bot) -> Self {
		Self { bot }
	}
}

#[async_trait]
impl DeliveryGateway for TelegramGateway {
	async fn send_text(&self, chat: ChatId, text: &str) -> Result<(), DeliveryError> {
		self.bot.send_message(chat, text).await.map_err(|error| DeliveryError(error.to_string()))?;
		Ok(())
	}

	async fn send_choices(&self, chat: ChatId, text: &str, choices: &[Choice]) -> Result<(), DeliveryError> {
		let rows: Vec<Vec<InlineKeyboardButton>> = choices
			.iter()
			.map(|choice| vec![InlineKeyboardButton::callback(choice.label.clone(), choice.data.clone())])
			.collect();

		self
			.bot
			.send_message(chat, text)
			.reply_markup(InlineKeyboardMarkup::new(rows))
			.await
			.map_err(|error| DeliveryError(error.to_string()))?;
		Ok(())
	}

	async fn send_audio(&self, chat: ChatId, file: &Path, caption: &str) -> Result<(), DeliveryError> {
		self
			.bot
			.send_audio(chat, InputFile::file(file.to_path_buf()))
			.caption(caption.to_string())
			.await
			.map_err(|error| DeliveryError(error.to_string()))?;
		Ok(())
	}
}
