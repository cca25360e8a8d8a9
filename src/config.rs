//! Конфигурация бота из TOML-файла.

use anyhow::{Context, anyhow};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

const DEFAULT_TOKEN_ENV: &str = "TELEGRAM_API_TOKEN";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Токен бота прямо в конфиге. Если не задан, берётся из переменной `bot_token_env`.
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default = "default_token_env")]
    pub bot_token_env: String,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub tokens: TokensConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    #[default]
    Polling,
    Webhook,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub mode: DeliveryMode,
    /// Публичный URL вебхука (только для `webhook`).
    #[serde(default)]
    pub url: Option<String>,
    /// Адрес, на котором слушает встроенный HTTP-сервер (только для `webhook`).
    #[serde(default)]
    pub listen_addr: Option<SocketAddr>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectionConfig {
    /// Верхняя граница N для `/first`, `/last`, `/rand`.
    #[serde(default = "default_max_count")]
    pub max_count: u32,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_count: default_max_count(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokensConfig {
    #[serde(default)]
    pub seed: Vec<TokenSeed>,
    #[serde(default)]
    pub generate: u32,
    #[serde(default = "default_application")]
    pub default_application: String,
    #[serde(default)]
    pub ttl_days: Option<i64>,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            seed: Vec::new(),
            generate: 0,
            default_application: default_application(),
            ttl_days: None,
        }
    }
}

/// Периодическая сводка по участникам, заявкам и токенам в логе.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_interval")]
    pub interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_monitor_interval(),
        }
    }
}

/// Токен, заданный в конфиге и создаваемый при старте.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSeed {
    pub value: String,
    pub application: String,
    /// UNIX timestamp истечения; без него токен бессрочный.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/var/lib/igv-bot/igv-bot.db")
}

fn default_max_count() -> u32 {
    99
}

fn default_monitor_interval() -> u64 {
    300
}

fn default_application() -> String {
    "default".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, anyhow::Error> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Не удалось прочитать конфиг {}", path.display()))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, anyhow::Error> {
        let config: Config = toml::from_str(raw).context("Некорректный формат конфига")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.selection.max_count < 1 {
            return Err(anyhow!("selection.max_count должен быть >= 1"));
        }
        if self.monitor.interval_secs < 1 {
            return Err(anyhow!("monitor.interval_secs должен быть >= 1"));
        }
        if self.delivery.mode == DeliveryMode::Webhook
            && (self.delivery.url.is_none() || self.delivery.listen_addr.is_none())
        {
            return Err(anyhow!(
                "Для delivery.mode = \"webhook\" нужны delivery.url и delivery.listen_addr"
            ));
        }
        if let Some(days) = self.tokens.ttl_days
            && days < 1
        {
            return Err(anyhow!("tokens.ttl_days должен быть >= 1"));
        }
        for seed in &self.tokens.seed {
            if seed.value.trim().is_empty() {
                return Err(anyhow!("tokens.seed: пустое значение токена"));
            }
        }
        Ok(())
    }

    pub fn bot_token(&self) -> Result<String, anyhow::Error> {
        if let Some(token) = self.bot_token.as_deref()
            && !token.trim().is_empty()
        {
            return Ok(token.trim().to_string());
        }
        std::env::var(&self.bot_token_env)
            .ok()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "Токен бота не задан: укажите bot_token в конфиге или переменную {}",
                    self.bot_token_env
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::parse("bot_token = \"123:abc\"").unwrap();
        assert_eq!(config.delivery.mode, DeliveryMode::Polling);
        assert_eq!(config.selection.max_count, 99);
        assert_eq!(config.tokens.default_application, "default");
        assert_eq!(config.monitor.interval_secs, 300);
        assert_eq!(config.bot_token().unwrap(), "123:abc");
    }

    #[test]
    fn webhook_mode_requires_url_and_addr() {
        let err = Config::parse("[delivery]\nmode = \"webhook\"\n").unwrap_err();
        assert!(err.to_string().contains("webhook"));

        let config = Config::parse(
            "[delivery]\nmode = \"webhook\"\nurl = \"https://example.org/hook\"\nlisten_addr = \"127.0.0.1:8443\"\n",
        )
        .unwrap();
        assert_eq!(config.delivery.mode, DeliveryMode::Webhook);
    }

    #[test]
    fn parses_seeded_tokens() {
        let config = Config::parse(
            r#"
            [tokens]
            generate = 2
            ttl_days = 7

            [[tokens.seed]]
            value = "alpha"
            application = "igv-2026"

            [[tokens.seed]]
            value = "beta"
            application = "igv-2026"
            expires_at = 1900000000
            "#,
        )
        .unwrap();
        assert_eq!(config.tokens.seed.len(), 2);
        assert_eq!(config.tokens.seed[1].expires_at, Some(1_900_000_000));
        assert_eq!(config.tokens.generate, 2);
    }

    #[test]
    fn rejects_zero_selection_limit() {
        assert!(Config::parse("[selection]\nmax_count = 0\n").is_err());
    }

    #[test]
    fn monitor_interval_must_be_positive() {
        let config = Config::parse("[monitor]\ninterval_secs = 60\n").unwrap();
        assert_eq!(config.monitor.interval_secs, 60);
        assert!(Config::parse("[monitor]\ninterval_secs = 0\n").is_err());
    }

    #[test]
    fn missing_token_is_an_error() {
        let config = Config::parse("bot_token_env = \"IGV_BOT_TEST_TOKEN_THAT_IS_NOT_SET\"").unwrap();
        assert!(config.bot_token().is_err());
    }
}
