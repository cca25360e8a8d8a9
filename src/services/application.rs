use super::PersonService;
use super::unix_now;
use crate::db::{Application, ApplicationStatus, Db, Token};
use crate::error::{BotError, BotResult};
use crate::storage::Storage;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed(Application),
    AlreadyConfirmed(Application),
}

pub struct ApplicationService {
    db: Arc<Db>,
    storage: Storage<i64, Application>,
    persons: Arc<PersonService>,
}

impl ApplicationService {
    pub fn new(db: Arc<Db>, persons: Arc<PersonService>) -> Self {
        Self {
            db,
            storage: Storage::new(),
            persons,
        }
    }

    pub async fn find_by_id(&self, id: i64) -> BotResult<Option<Application>> {
        if let Some(application) = self.storage.get(&id) {
            return Ok(Some(application));
        }
        let application = self.db.get_application(id).await?;
        if let Some(application) = &application {
            self.storage.put(id, application.clone());
        }
        Ok(application)
    }

    pub async fn count(&self) -> BotResult<i64> {
        Ok(self.db.count_applications().await?)
    }

    /// Кладёт в кэш заявку, созданную при погашении токена.
    pub fn remember(&self, application: &Application) {
        self.storage.put(application.id, application.clone());
    }

    /// Идемпотентно: на один токен приходится ровно одна заявка.
    pub async fn create_or_get_for_person_and_token(
        &self,
        person_id: i64,
        token: &Token,
    ) -> BotResult<Application> {
        if self.persons.find_by_id(person_id).await?.is_none() {
            return Err(BotError::NotFound(format!("участник {}", person_id)));
        }

        let application = self
            .db
            .create_or_get_application(person_id, token, unix_now())
            .await?;
        if application.person_id != person_id {
            return Err(BotError::Conflict(format!(
                "токен {} привязан к другому участнику",
                token.id
            )));
        }
        self.remember(&application);
        Ok(application)
    }

    pub async fn confirm(&self, id: i64, person_id: i64) -> BotResult<Confirmation> {
        // Статус меняется только вперёд, поэтому значение из кэша безопасно.
        let Some(application) = self.find_by_id(id).await? else {
            return Err(BotError::NotFound(format!("заявка {}", id)));
        };
        if application.person_id != person_id {
            return Err(BotError::Conflict(format!(
                "заявка {} принадлежит другому участнику",
                id
            )));
        }
        if application.status == ApplicationStatus::Confirmed {
            self.remember(&application);
            return Ok(Confirmation::AlreadyConfirmed(application));
        }

        let changed = self
            .db
            .confirm_application(id, person_id, unix_now())
            .await?;
        let refreshed = self
            .db
            .get_application(id)
            .await?
            .ok_or_else(|| BotError::NotFound(format!("заявка {}", id)))?;
        self.remember(&refreshed);
        if changed {
            tracing::info!(application_id = id, person_id = person_id, "Application confirmed");
            Ok(Confirmation::Confirmed(refreshed))
        } else {
            Ok(Confirmation::AlreadyConfirmed(refreshed))
        }
    }
}
