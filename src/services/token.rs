use super::unix_now;
use crate::config::TokenSeed;
use crate::db::{Application, Db, PersonData, RedeemWrite, Token, TokenState};
use crate::error::{BotResult, RejectReason};
use crate::storage::Storage;
use std::sync::Arc;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedemptionStatus {
    /// Токен уже погашен этим же участником, запись не выполнялась.
    Validated,
    /// Этот вызов погасил токен и создал заявку.
    Redeemed,
    Rejected(RejectReason),
}

#[derive(Debug, Clone)]
pub struct Redemption {
    pub status: RedemptionStatus,
    pub token: Option<Token>,
    pub application: Option<Application>,
}

impl Redemption {
    fn rejected(reason: RejectReason, token: Option<Token>) -> Self {
        Self {
            status: RedemptionStatus::Rejected(reason),
            token,
            application: None,
        }
    }
}

pub struct TokenService {
    db: Arc<Db>,
    storage: Storage<String, Token>,
}

/// Решение без записи; `None` означает, что токен свободен и можно гасить.
fn classify(token: &Token, person_id: i64, now: i64) -> Option<RedemptionStatus> {
    match token.state(now) {
        TokenState::Unredeemed => None,
        TokenState::Redeemed { person_id: owner } if owner == person_id => {
            Some(RedemptionStatus::Validated)
        }
        TokenState::Redeemed { .. } => {
            Some(RedemptionStatus::Rejected(RejectReason::AlreadyRedeemed))
        }
        TokenState::Expired => Some(RedemptionStatus::Rejected(RejectReason::Expired)),
    }
}

impl TokenService {
    pub fn new(db: Arc<Db>) -> Self {
        Self {
            db,
            storage: Storage::new(),
        }
    }

    pub async fn find_by_value(&self, value: &str) -> BotResult<Option<Token>> {
        let key = value.to_string();
        if let Some(token) = self.storage.get(&key) {
            return Ok(Some(token));
        }
        let token = self.db.get_token_by_value(value).await?;
        if let Some(token) = &token {
            self.storage.put(key, token.clone());
        }
        Ok(token)
    }

    /// Перечитывает токен из репозитория в обход кэша.
    pub async fn find_fresh(&self, value: &str) -> BotResult<Option<Token>> {
        let token = self.db.get_token_by_value(value).await?;
        match &token {
            Some(token) => self.storage.put(value.to_string(), token.clone()),
            None => self.storage.invalidate(&value.to_string()),
        }
        Ok(token)
    }

    /// Предварительная проверка токена для участника без записи.
    pub fn check(token: &Token, person_id: i64) -> Option<RedemptionStatus> {
        classify(token, person_id, unix_now())
    }

    /// Повторное погашение тем же участником возвращает его существующую заявку.
    async fn validated(&self, token: Token) -> BotResult<Redemption> {
        let application = self.db.get_application_by_token(token.id).await?;
        Ok(Redemption {
            status: RedemptionStatus::Validated,
            token: Some(token),
            application,
        })
    }

    /// Участник записывается в той же транзакции, что и погашение,
    /// поэтому при отказе он не появляется.
    pub async fn redeem(&self, value: &str, person: &PersonData) -> BotResult<Redemption> {
        let person_id = person.id;
        let now = unix_now();
        let Some(token) = self.find_by_value(value).await? else {
            return Ok(Redemption::rejected(RejectReason::NotFound, None));
        };

        // Владелец токена не меняется, поэтому погашенный токен из кэша
        // решает дело сразу. Истечение по кэшу перепроверит условная запись.
        match classify(&token, person_id, now) {
            Some(RedemptionStatus::Validated) => return self.validated(token).await,
            Some(RedemptionStatus::Rejected(RejectReason::AlreadyRedeemed)) => {
                return Ok(Redemption::rejected(
                    RejectReason::AlreadyRedeemed,
                    Some(token),
                ));
            }
            _ => {}
        }

        match self.db.redeem_token(&token, person, now).await? {
            RedeemWrite::Redeemed(application) => {
                let token = self.find_fresh(value).await?.unwrap_or(token);
                tracing::info!(
                    token_id = token.id,
                    person_id = person_id,
                    application_id = application.id,
                    "Token redeemed"
                );
                Ok(Redemption {
                    status: RedemptionStatus::Redeemed,
                    token: Some(token),
                    application: Some(application),
                })
            }
            RedeemWrite::Lost => {
                // Кэш мог отстать: решение принимаем по свежей строке.
                let Some(fresh) = self.find_fresh(value).await? else {
                    return Ok(Redemption::rejected(RejectReason::NotFound, None));
                };
                tracing::debug!(
                    token_id = fresh.id,
                    person_id = person_id,
                    redeemed_by = ?fresh.redeemed_by,
                    "Token redemption lost the race"
                );
                match classify(&fresh, person_id, now) {
                    Some(RedemptionStatus::Validated) => self.validated(fresh).await,
                    Some(RedemptionStatus::Rejected(reason)) => {
                        Ok(Redemption::rejected(reason, Some(fresh)))
                    }
                    Some(RedemptionStatus::Redeemed) | None => {
                        Ok(Redemption::rejected(RejectReason::AlreadyRedeemed, Some(fresh)))
                    }
                }
            }
        }
    }

    /// Создаёт токены из конфига, уже существующие пропускает.
    pub async fn seed(&self, seeds: &[TokenSeed]) -> BotResult<usize> {
        let now = unix_now();
        let mut inserted = 0;
        for seed in seeds {
            let value = seed.value.trim();
            if self
                .db
                .insert_token_if_missing(value, &seed.application, seed.expires_at, now)
                .await?
            {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    pub async fn count_unredeemed(&self) -> BotResult<i64> {
        Ok(self.db.count_unredeemed_tokens(unix_now()).await?)
    }

    pub async fn issue(&self, application: &str, ttl_days: Option<i64>) -> BotResult<Token> {
        let now = unix_now();
        let expires_at = ttl_days
            .and_then(|days| days.checked_mul(SECONDS_PER_DAY))
            .and_then(|ttl| now.checked_add(ttl));
        let token = self.db.create_token(application, expires_at, now).await?;
        self.storage.put(token.value.clone(), token.clone());
        Ok(token)
    }
}
