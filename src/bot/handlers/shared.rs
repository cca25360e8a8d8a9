use crate::bot::event::MessageTarget;
use crate::bot::keyboards::Keyboard;
use crate::bot::transport::Transport;

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Ответное действие обработчика. Выполняется диспетчером через транспорт.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Send {
        chat_id: i64,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Edit {
        target: MessageTarget,
        text: String,
        keyboard: Option<Keyboard>,
    },
    AnswerCallback {
        callback_id: String,
        text: Option<String>,
    },
}

impl Effect {
    pub fn send(chat_id: i64, text: impl Into<String>) -> Self {
        Self::Send {
            chat_id,
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn send_with(chat_id: i64, text: impl Into<String>, keyboard: Option<Keyboard>) -> Self {
        Self::Send {
            chat_id,
            text: text.into(),
            keyboard,
        }
    }

    pub fn edit(target: MessageTarget, text: impl Into<String>, keyboard: Option<Keyboard>) -> Self {
        Self::Edit {
            target,
            text: text.into(),
            keyboard,
        }
    }

    pub fn answer(callback_id: &str, text: Option<&str>) -> Self {
        Self::AnswerCallback {
            callback_id: callback_id.to_string(),
            text: text.map(str::to_string),
        }
    }
}

/// Ошибки отправки только логируются, повторов нет.
pub async fn apply_effects(transport: &dyn Transport, effects: Vec<Effect>) {
    for effect in effects {
        let result = match &effect {
            Effect::Send {
                chat_id,
                text,
                keyboard,
            } => transport.send_message(*chat_id, text, keyboard.as_ref()).await,
            Effect::Edit {
                target,
                text,
                keyboard,
            } => transport.edit_message(*target, text, keyboard.as_ref()).await,
            Effect::AnswerCallback { callback_id, text } => {
                transport.answer_callback(callback_id, text.as_deref()).await
            }
        };
        if let Err(error) = result {
            tracing::warn!(effect = ?effect, error = %error, "Не удалось выполнить ответ");
        }
    }
}

pub fn build_bot_start_link(bot_username: &str, token: &str) -> String {
    let normalized = bot_username.trim_start_matches('@');
    format!(
        "https://t.me/{}?start={}",
        normalized,
        urlencoding::encode(token)
    )
}

pub fn parse_start_payload(raw: &str) -> Option<String> {
    let token = raw.split_whitespace().next()?.trim();
    let decoded = match urlencoding::decode(token) {
        Ok(value) => value.into_owned(),
        Err(_) => token.to_string(),
    };
    let normalized = decoded.trim().trim_matches('`').trim();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized.to_string())
    }
}
