use super::router::RouteTable;
use crate::bot::transport::Transport;
use crate::config::Config;
use crate::db::Db;
use crate::services::{
    ApplicationService, ChatService, PersonService, TokenService, UserDataService,
};
use std::sync::Arc;

/// Всё, что нужно обработчикам: сервисы, транспорт и таблица маршрутов.
#[derive(Clone)]
pub struct BotState {
    pub config: Arc<Config>,
    pub persons: Arc<PersonService>,
    pub chats: Arc<ChatService>,
    pub tokens: Arc<TokenService>,
    pub applications: Arc<ApplicationService>,
    pub user_data: Arc<UserDataService>,
    pub transport: Arc<dyn Transport>,
    pub routes: Arc<RouteTable>,
}

impl BotState {
    pub fn new(
        config: Arc<Config>,
        db: Arc<Db>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, regex::Error> {
        let persons = Arc::new(PersonService::new(db.clone()));
        let chats = Arc::new(ChatService::new(db.clone()));
        let tokens = Arc::new(TokenService::new(db.clone()));
        let applications = Arc::new(ApplicationService::new(db, persons.clone()));
        let user_data = Arc::new(UserDataService::new(
            applications.clone(),
            persons.clone(),
            tokens.clone(),
        ));
        let routes = Arc::new(RouteTable::new(config.selection.max_count)?);
        Ok(Self {
            config,
            persons,
            chats,
            tokens,
            applications,
            user_data,
            transport,
            routes,
        })
    }
}
