//! Поддельный транспорт и сборка состояния для тестов обработчиков.

use super::state::BotState;
use crate::bot::event::{CallbackEvent, InboundEvent, MessageEvent, MessageTarget};
use crate::bot::keyboards::Keyboard;
use crate::bot::transport::{BotIdentity, Transport};
use crate::config::{Config, TokenSeed};
use crate::db::{ChatData, Db, PersonData, open_temp};
use crate::error::{BotError, BotResult};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Message {
        chat_id: i64,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Edit {
        target: MessageTarget,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Answer {
        callback_id: String,
        text: Option<String>,
    },
}

pub struct RecordingTransport {
    identity: Option<BotIdentity>,
    sent: Mutex<Vec<Sent>>,
    failing_chats: Mutex<HashSet<i64>>,
}

impl RecordingTransport {
    pub async fn sent(&self) -> Vec<Sent> {
        self.sent.lock().await.clone()
    }

    pub async fn fail_chat(&self, chat_id: i64) {
        self.failing_chats.lock().await.insert(chat_id);
    }

    async fn check_chat(&self, chat_id: i64) -> BotResult<()> {
        if self.failing_chats.lock().await.contains(&chat_id) {
            return Err(BotError::Transport(format!("chat {} недоступен", chat_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn get_self_identity(&self) -> BotResult<BotIdentity> {
        self.identity
            .clone()
            .ok_or_else(|| BotError::Transport("getMe недоступен".to_string()))
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> BotResult<()> {
        self.check_chat(chat_id).await?;
        self.sent.lock().await.push(Sent::Message {
            chat_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn edit_message(
        &self,
        target: MessageTarget,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> BotResult<()> {
        self.check_chat(target.chat_id).await?;
        self.sent.lock().await.push(Sent::Edit {
            target,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> BotResult<()> {
        self.sent.lock().await.push(Sent::Answer {
            callback_id: callback_id.to_string(),
            text: text.map(str::to_string),
        });
        Ok(())
    }
}

pub struct TestState {
    pub _dir: tempfile::TempDir,
    pub db: Arc<Db>,
    pub state: BotState,
    pub transport: Arc<RecordingTransport>,
}

impl TestState {
    pub async fn seed_tokens(&self, values: &[&str]) {
        let seeds: Vec<TokenSeed> = values
            .iter()
            .map(|value| TokenSeed {
                value: value.to_string(),
                application: "igv".to_string(),
                expires_at: None,
            })
            .collect();
        self.state.tokens.seed(&seeds).await.unwrap();
    }

    pub async fn add_persons(&self, ids: &[i64]) {
        for id in ids {
            self.state.persons.upsert(&person(*id)).await.unwrap();
        }
    }
}

/// `bot_id = None` имитирует недоступный `getMe`.
pub async fn test_state(bot_id: Option<i64>) -> TestState {
    let (dir, db) = open_temp().await;
    let db = Arc::new(db);
    let transport = Arc::new(RecordingTransport {
        identity: bot_id.map(|id| BotIdentity {
            id,
            username: Some("igv_bot".to_string()),
        }),
        sent: Mutex::new(Vec::new()),
        failing_chats: Mutex::new(HashSet::new()),
    });
    let config = Arc::new(Config::parse("bot_token = \"123:test\"").unwrap());
    let state = BotState::new(config, db.clone(), transport.clone()).unwrap();
    TestState {
        _dir: dir,
        db,
        state,
        transport,
    }
}

pub fn person(id: i64) -> PersonData {
    PersonData {
        id,
        username: Some(format!("user{}", id)),
        display_name: format!("Person {}", id),
    }
}

fn chat(chat_id: i64) -> ChatData {
    ChatData {
        id: chat_id,
        kind: if chat_id > 0 { "private" } else { "group" }.to_string(),
        title: (chat_id < 0).then(|| "IGV".to_string()),
    }
}

pub fn message(chat_id: i64, person_id: i64, text: &str) -> InboundEvent {
    InboundEvent::Message(MessageEvent {
        chat: chat(chat_id),
        from: Some(person(person_id)),
        text: Some(text.to_string()),
        new_chat_members: Vec::new(),
    })
}

pub fn join(chat_id: i64, joined: &[i64]) -> InboundEvent {
    InboundEvent::Message(MessageEvent {
        chat: chat(chat_id),
        from: Some(person(1)),
        text: None,
        new_chat_members: joined.to_vec(),
    })
}

pub fn callback(person_id: i64, data: &str, target: MessageTarget) -> InboundEvent {
    InboundEvent::CallbackQuery(CallbackEvent {
        id: format!("cb-{}", person_id),
        from: person(person_id),
        data: Some(data.to_string()),
        message: Some(target),
    })
}
