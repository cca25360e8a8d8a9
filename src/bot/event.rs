//! Входящие события в виде, не зависящем от teloxide.

use crate::db::{ChatData, PersonData};
use teloxide::types::{CallbackQuery, Chat, Message, User};

/// Сообщение, которое можно отредактировать.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageTarget {
    pub chat_id: i64,
    pub message_id: i32,
}

#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub chat: ChatData,
    pub from: Option<PersonData>,
    pub text: Option<String>,
    /// Идентификаторы вступивших участников (`new_chat_members`).
    pub new_chat_members: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct CallbackEvent {
    pub id: String,
    pub from: PersonData,
    pub data: Option<String>,
    pub message: Option<MessageTarget>,
}

#[derive(Debug, Clone)]
pub enum InboundEvent {
    Message(MessageEvent),
    CallbackQuery(CallbackEvent),
}

pub fn person_from_user(user: &User) -> PersonData {
    let mut display_name = user.first_name.clone();
    if let Some(last_name) = user.last_name.as_deref()
        && !last_name.trim().is_empty()
    {
        display_name.push(' ');
        display_name.push_str(last_name);
    }
    PersonData {
        id: user.id.0 as i64,
        username: user.username.clone(),
        display_name,
    }
}

fn chat_data(chat: &Chat) -> ChatData {
    let kind = if chat.is_private() {
        "private"
    } else if chat.is_supergroup() {
        "supergroup"
    } else if chat.is_group() {
        "group"
    } else if chat.is_channel() {
        "channel"
    } else {
        "unknown"
    };
    ChatData {
        id: chat.id.0,
        kind: kind.to_string(),
        title: chat.title().map(str::to_string),
    }
}

impl From<&Message> for MessageEvent {
    fn from(msg: &Message) -> Self {
        Self {
            chat: chat_data(&msg.chat),
            from: msg.from.as_ref().map(person_from_user),
            text: msg.text().map(str::to_string),
            new_chat_members: msg
                .new_chat_members()
                .map(|users| users.iter().map(|user| user.id.0 as i64).collect())
                .unwrap_or_default(),
        }
    }
}

impl From<&CallbackQuery> for CallbackEvent {
    fn from(q: &CallbackQuery) -> Self {
        Self {
            id: q.id.0.clone(),
            from: person_from_user(&q.from),
            data: q.data.clone(),
            message: q.message.as_ref().map(|msg| MessageTarget {
                chat_id: msg.chat().id.0,
                message_id: msg.id().0,
            }),
        }
    }
}
