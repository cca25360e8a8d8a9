//! Регистрация по токену: связывает участника, токен и заявку.

use super::{ApplicationService, PersonService, RedemptionStatus, TokenService};
use crate::db::{Application, PersonData, Token};
use crate::error::{BotError, BotResult, RejectReason};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// Токен погашен этим вызовом, заявка создана.
    Created(Application),
    /// Повторная доставка той же команды тем же участником.
    Existing(Application),
    Rejected(RejectReason),
}

pub struct UserDataService {
    applications: Arc<ApplicationService>,
    persons: Arc<PersonService>,
    tokens: Arc<TokenService>,
}

impl UserDataService {
    pub fn new(
        applications: Arc<ApplicationService>,
        persons: Arc<PersonService>,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            applications,
            persons,
            tokens,
        }
    }

    /// Отказ до любых записей. Владелец токена не меняется, поэтому отказ
    /// `AlreadyRedeemed` из кэша окончательный; остальные перепроверяются по репозиторию.
    async fn precheck(&self, token: &Token, person_id: i64) -> BotResult<Option<RejectReason>> {
        match TokenService::check(token, person_id) {
            Some(RedemptionStatus::Rejected(RejectReason::AlreadyRedeemed)) => {
                Ok(Some(RejectReason::AlreadyRedeemed))
            }
            Some(RedemptionStatus::Rejected(_)) => {
                let Some(fresh) = self.tokens.find_fresh(&token.value).await? else {
                    return Ok(Some(RejectReason::NotFound));
                };
                match TokenService::check(&fresh, person_id) {
                    Some(RedemptionStatus::Rejected(reason)) => Ok(Some(reason)),
                    _ => Ok(None),
                }
            }
            _ => Ok(None),
        }
    }

    /// При отказе участник и заявки не изменяются. Каждый шаг идемпотентен,
    /// поэтому повтор после сбоя на середине доводит регистрацию до конца.
    pub async fn register(&self, person: &PersonData, token_value: &str) -> BotResult<Registration> {
        let value = token_value.trim();
        if value.is_empty() {
            return Ok(Registration::Rejected(RejectReason::NotFound));
        }

        let Some(token) = self.tokens.find_by_value(value).await? else {
            tracing::info!(person_id = person.id, "Token not found");
            return Ok(Registration::Rejected(RejectReason::NotFound));
        };
        if let Some(reason) = self.precheck(&token, person.id).await? {
            tracing::info!(person_id = person.id, token_id = token.id, reason = %reason, "Token rejected");
            return Ok(Registration::Rejected(reason));
        }

        let redemption = self.tokens.redeem(value, person).await?;
        match redemption.status {
            RedemptionStatus::Redeemed => {
                let application = redemption.application.ok_or_else(|| {
                    BotError::NotFound(format!("заявка для токена {}", token.id))
                })?;
                // Участник уже записан транзакцией погашения; обновляем кэш.
                self.persons.upsert(person).await?;
                self.applications.remember(&application);
                Ok(Registration::Created(application))
            }
            RedemptionStatus::Validated => {
                self.persons.upsert(person).await?;
                let application = match redemption.application {
                    Some(application) => {
                        self.applications.remember(&application);
                        application
                    }
                    None => {
                        let token = redemption.token.unwrap_or(token);
                        self.applications
                            .create_or_get_for_person_and_token(person.id, &token)
                            .await?
                    }
                };
                tracing::info!(
                    person_id = person.id,
                    token_id = application.token_id,
                    application_id = application.id,
                    "Repeated redemption, returning existing application"
                );
                Ok(Registration::Existing(application))
            }
            RedemptionStatus::Rejected(reason) => {
                tracing::info!(person_id = person.id, token_id = token.id, reason = %reason, "Token rejected");
                Ok(Registration::Rejected(reason))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::TokenSeed;
    use crate::db::{Db, open_temp};

    pub(crate) struct Fixture {
        pub _dir: tempfile::TempDir,
        pub db: Arc<Db>,
        pub service: Arc<UserDataService>,
    }

    pub(crate) async fn fixture(tokens: &[&str]) -> Fixture {
        let (dir, db) = open_temp().await;
        let db = Arc::new(db);
        let persons = Arc::new(PersonService::new(db.clone()));
        let token_service = Arc::new(TokenService::new(db.clone()));
        let applications = Arc::new(ApplicationService::new(db.clone(), persons.clone()));
        let seeds: Vec<TokenSeed> = tokens
            .iter()
            .map(|value| TokenSeed {
                value: value.to_string(),
                application: "igv".to_string(),
                expires_at: None,
            })
            .collect();
        token_service.seed(&seeds).await.unwrap();
        Fixture {
            _dir: dir,
            db,
            service: Arc::new(UserDataService::new(applications, persons, token_service)),
        }
    }

    fn person(id: i64) -> PersonData {
        PersonData {
            id,
            username: Some(format!("user{}", id)),
            display_name: format!("Person {}", id),
        }
    }

    #[tokio::test]
    async fn repeated_registration_returns_same_application() {
        let fx = fixture(&["alpha"]).await;
        let first = fx.service.register(&person(1), "alpha").await.unwrap();
        let Registration::Created(created) = first else {
            panic!("expected a new application");
        };

        let second = fx.service.register(&person(1), " alpha ").await.unwrap();
        assert_eq!(second, Registration::Existing(created.clone()));

        let token = fx.db.get_token_by_value("alpha").await.unwrap().unwrap();
        assert_eq!(token.redeemed_by, Some(1));
        assert_eq!(fx.db.count_applications().await.unwrap(), 1);
        assert_eq!(created.person_id, 1);
    }

    #[tokio::test]
    async fn bogus_token_mutates_nothing() {
        let fx = fixture(&["alpha"]).await;
        let result = fx.service.register(&person(1), "bogus").await.unwrap();
        assert_eq!(result, Registration::Rejected(RejectReason::NotFound));
        assert_eq!(fx.db.count_persons().await.unwrap(), 0);
        assert_eq!(fx.db.count_applications().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn token_taken_by_other_person_is_rejected() {
        let fx = fixture(&["alpha"]).await;
        fx.service.register(&person(1), "alpha").await.unwrap();
        let result = fx.service.register(&person(2), "alpha").await.unwrap();
        assert_eq!(result, Registration::Rejected(RejectReason::AlreadyRedeemed));
        assert_eq!(fx.db.count_applications().await.unwrap(), 1);
        assert!(fx.db.get_person(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_registrations_from_different_persons() {
        let fx = fixture(&["shared"]).await;
        let mut handles = Vec::new();
        for id in 1..=6 {
            let service = fx.service.clone();
            handles.push(tokio::spawn(async move {
                service.register(&person(id), "shared").await.unwrap()
            }));
        }
        let mut created = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Registration::Created(_) => created += 1,
                Registration::Rejected(RejectReason::AlreadyRedeemed) => rejected += 1,
                other => panic!("unexpected outcome {:?}", other),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(rejected, 5);
        assert_eq!(fx.db.count_applications().await.unwrap(), 1);
        assert_eq!(fx.db.count_persons().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_token_is_rejected() {
        let fx = fixture(&[]).await;
        let result = fx.service.register(&person(1), "   ").await.unwrap();
        assert_eq!(result, Registration::Rejected(RejectReason::NotFound));
    }
}
