//! Порт исходящих вызовов к Telegram.

use super::event::MessageTarget;
use super::keyboards::Keyboard;
use crate::error::{BotError, BotResult};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{CallbackQueryId, InlineKeyboardButton, InlineKeyboardMarkup, MessageId};
use tokio::sync::OnceCell;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: i64,
    pub username: Option<String>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_self_identity(&self) -> BotResult<BotIdentity>;

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> BotResult<()>;

    async fn edit_message(
        &self,
        target: MessageTarget,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> BotResult<()>;

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> BotResult<()>;
}

pub struct TelegramTransport {
    bot: Bot,
    identity: OnceCell<BotIdentity>,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self {
            bot,
            identity: OnceCell::new(),
        }
    }
}

fn transport_error(error: teloxide::RequestError) -> BotError {
    BotError::Transport(error.to_string())
}

fn to_markup(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    keyboard
        .rows
        .iter()
        .fold(InlineKeyboardMarkup::default(), |markup, row| {
            markup.append_row(
                row.iter()
                    .map(|button| {
                        InlineKeyboardButton::callback(button.label.clone(), button.data.clone())
                    })
                    .collect::<Vec<_>>(),
            )
        })
}

#[async_trait]
impl Transport for TelegramTransport {
    /// `getMe` выполняется до первого успеха, дальше значение берётся из памяти.
    async fn get_self_identity(&self) -> BotResult<BotIdentity> {
        let identity = self
            .identity
            .get_or_try_init(|| async {
                let me = self.bot.get_me().await.map_err(transport_error)?;
                Ok::<_, BotError>(BotIdentity {
                    id: me.user.id.0 as i64,
                    username: me.user.username.clone(),
                })
            })
            .await?;
        Ok(identity.clone())
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> BotResult<()> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(to_markup(keyboard));
        }
        request.await.map_err(transport_error)?;
        Ok(())
    }

    async fn edit_message(
        &self,
        target: MessageTarget,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> BotResult<()> {
        // Пустая разметка снимает старые кнопки с сообщения.
        let markup = keyboard.map(to_markup).unwrap_or_default();
        self.bot
            .edit_message_text(ChatId(target.chat_id), MessageId(target.message_id), text)
            .reply_markup(markup)
            .await
            .map_err(transport_error)?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> BotResult<()> {
        let mut request = self
            .bot
            .answer_callback_query(CallbackQueryId(callback_id.to_string()));
        if let Some(text) = text {
            request = request.text(text);
        }
        request.await.map_err(transport_error)?;
        Ok(())
    }
}
