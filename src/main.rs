//! igv-bot — Telegram-бот регистрации участников по одноразовым токенам.

mod bot;
mod config;
mod db;
mod error;
mod monitor;
mod services;
mod storage;

use bot::handlers::{BotState, build_bot_start_link, schema};
use bot::transport::{TelegramTransport, Transport};
use config::DeliveryMode;
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::dispatching::Dispatcher;
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks;

/// Создаёт токены из конфига и выпускает `tokens.generate` новых.
async fn prepare_tokens(state: &BotState, bot_username: Option<&str>) -> error::BotResult<()> {
    let tokens = &state.config.tokens;
    let inserted = state.tokens.seed(&tokens.seed).await?;
    tracing::info!(
        configured = tokens.seed.len(),
        inserted = inserted,
        "Tokens seeded"
    );

    for _ in 0..tokens.generate {
        let token = state
            .tokens
            .issue(&tokens.default_application, tokens.ttl_days)
            .await?;
        match bot_username {
            Some(username) => tracing::info!(
                token = %token.value,
                application = %token.application,
                expires_at = ?token.expires_at,
                link = %build_bot_start_link(username, &token.value),
                "Token issued"
            ),
            None => tracing::info!(
                token = %token.value,
                application = %token.application,
                expires_at = ?token.expires_at,
                "Token issued"
            ),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/etc/igv-bot.toml"));
    tracing::info!("Starting igv-bot with config {}", config_path.display());

    let config = Arc::new(config::Config::load(&config_path)?);
    let token = config.bot_token()?;
    tracing::info!(
        db_path = %config.db_path.display(),
        delivery = ?config.delivery.mode,
        max_count = config.selection.max_count,
        seeded_tokens = config.tokens.seed.len(),
        "Configuration loaded"
    );

    let db = Arc::new(db::Db::open(&config.db_path).await?);
    tracing::info!(
        persons = db.count_persons().await?,
        applications = db.count_applications().await?,
        "Database ready"
    );

    let bot = Bot::new(token);
    let transport = Arc::new(TelegramTransport::new(bot.clone()));
    let bot_username = match transport.get_self_identity().await {
        Ok(identity) => {
            tracing::info!(bot_id = identity.id, username = ?identity.username, "Bot identity resolved");
            identity.username
        }
        Err(error) => {
            tracing::warn!(
                error = %error,
                "Не удалось получить username бота через getMe"
            );
            None
        }
    };

    let state = BotState::new(config.clone(), db.clone(), transport)?;
    prepare_tokens(&state, bot_username.as_deref()).await?;
    let monitor_task = monitor::Monitor::from_state(&state).start();

    let mut dispatcher = Dispatcher::builder(bot.clone(), schema())
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build();
    tracing::info!("Dispatcher initialized, bot is ready");

    match config.delivery.mode {
        DeliveryMode::Polling => {
            tracing::info!("Receiving updates via long polling");
            dispatcher.dispatch().await;
        }
        DeliveryMode::Webhook => {
            let (Some(url), Some(addr)) = (config.delivery.url.as_deref(), config.delivery.listen_addr)
            else {
                return Err("delivery.url и delivery.listen_addr обязательны для webhook".into());
            };
            let url = url::Url::parse(url)?;
            tracing::info!(url = %url, listen_addr = %addr, "Receiving updates via webhook");
            let listener = webhooks::axum(bot, webhooks::Options::new(addr, url)).await?;
            dispatcher
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("Ошибка получения обновлений через webhook"),
                )
                .await;
        }
    }

    monitor_task.abort();
    db.close().await;
    tracing::info!("Bot stopped");
    Ok(())
}
