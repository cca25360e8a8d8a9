//! Ошибки обработки событий и бизнес-отказы.

use thiserror::Error;

/// Ошибки, которые может вернуть обработчик или сервис.
#[derive(Debug, Error)]
pub enum BotError {
    /// Некорректный аргумент команды. До обработчиков не доходит, отсекается роутером.
    #[error("Некорректный аргумент: {0}")]
    Validation(String),
    #[error("Не найдено: {0}")]
    NotFound(String),
    #[error("Конфликт: {0}")]
    Conflict(String),
    #[error("Ошибка транспорта: {0}")]
    Transport(String),
    #[error("Ошибка хранилища: {0}")]
    Upstream(#[from] sqlx::Error),
}

/// Причина отказа в погашении токена, показывается пользователю.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("Токен не найден")]
    NotFound,
    #[error("Срок действия токена истёк")]
    Expired,
    #[error("Токен уже использован другим пользователем")]
    AlreadyRedeemed,
}

pub type BotResult<T> = Result<T, BotError>;
