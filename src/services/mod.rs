//! Доменные сервисы: каждый оборачивает репозиторий (SQLite) и кэш.

pub mod application;
pub mod chat;
pub mod person;
pub mod token;
pub mod user_data;

pub use application::{ApplicationService, Confirmation};
pub use chat::ChatService;
pub use person::{PersonService, SelectionOrder};
pub use token::{RedemptionStatus, TokenService};
pub use user_data::{Registration, UserDataService};

pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
