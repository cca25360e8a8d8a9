//! Фоновая сводка состояния: раз в `monitor.interval_secs` пишет в лог
//! число участников, заявок и непогашенных токенов.

use crate::bot::handlers::BotState;
use crate::error::BotResult;
use crate::services::{ApplicationService, PersonService, TokenService};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub persons: u32,
    pub applications: i64,
    pub unredeemed_tokens: i64,
}

pub struct Monitor {
    persons: Arc<PersonService>,
    applications: Arc<ApplicationService>,
    tokens: Arc<TokenService>,
    interval: Duration,
}

impl Monitor {
    pub fn from_state(state: &BotState) -> Self {
        Self {
            persons: state.persons.clone(),
            applications: state.applications.clone(),
            tokens: state.tokens.clone(),
            interval: Duration::from_secs(state.config.monitor.interval_secs),
        }
    }

    pub async fn tick(&self) -> BotResult<Snapshot> {
        let snapshot = Snapshot {
            persons: self.persons.count().await?,
            applications: self.applications.count().await?,
            unredeemed_tokens: self.tokens.count_unredeemed().await?,
        };
        tracing::info!(
            persons = snapshot.persons,
            applications = snapshot.applications,
            unredeemed_tokens = snapshot.unredeemed_tokens,
            "Monitor snapshot"
        );
        Ok(snapshot)
    }

    pub fn start(self) -> JoinHandle<()> {
        tracing::info!(interval_secs = self.interval.as_secs(), "Monitor started");
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            // Первый тик срабатывает сразу.
            interval.tick().await;

            loop {
                interval.tick().await;
                if let Err(error) = self.tick().await {
                    tracing::warn!(error = %error, "Не удалось собрать сводку монитора");
                }
            }
        })
    }
}
