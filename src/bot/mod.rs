//! Telegram-часть: модель событий, транспорт, клавиатуры и обработчики.

pub mod event;
pub mod handlers;
pub mod keyboards;
pub mod transport;
