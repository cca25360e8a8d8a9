use super::unix_now;
use crate::db::{Chat, ChatData, Db};
use crate::error::BotResult;
use crate::storage::Storage;
use std::sync::Arc;

pub struct ChatService {
    db: Arc<Db>,
    storage: Storage<i64, Chat>,
}

impl ChatService {
    pub fn new(db: Arc<Db>) -> Self {
        Self {
            db,
            storage: Storage::new(),
        }
    }

    pub async fn find_by_id(&self, id: i64) -> BotResult<Option<Chat>> {
        if let Some(chat) = self.storage.get(&id) {
            return Ok(Some(chat));
        }
        let chat = self.db.get_chat(id).await?;
        if let Some(chat) = &chat {
            self.storage.put(id, chat.clone());
        }
        Ok(chat)
    }

    /// Last write wins: повторный вызов просто обновляет тип и название.
    pub async fn upsert(&self, data: &ChatData) -> BotResult<Chat> {
        let chat = self.db.upsert_chat(data, unix_now()).await?;
        self.storage.put(chat.id, chat.clone());
        Ok(chat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_temp;

    #[tokio::test]
    async fn upsert_updates_title() {
        let (_dir, db) = open_temp().await;
        let service = ChatService::new(Arc::new(db));
        assert!(service.find_by_id(-100).await.unwrap().is_none());

        let data = ChatData {
            id: -100,
            kind: "group".to_string(),
            title: Some("Old".to_string()),
        };
        let created = service.upsert(&data).await.unwrap();
        let renamed = service
            .upsert(&ChatData {
                title: Some("New".to_string()),
                ..data
            })
            .await
            .unwrap();

        assert_eq!(created.created_at, renamed.created_at);
        assert_eq!(
            service.find_by_id(-100).await.unwrap().unwrap().title.as_deref(),
            Some("New")
        );
    }
}
