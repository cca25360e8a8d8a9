//! Классификация входящих событий и вызов обработчиков.

use super::shared::{apply_effects, parse_start_payload};
use super::state::BotState;
use super::{callbacks, commands, guard};
use crate::bot::event::{CallbackEvent, InboundEvent, MessageEvent};
use regex::{Captures, Regex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    NewChatMembers,
    Start,
    Token,
    First,
    Last,
    Rand,
    Help,
    CallbackQuery,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewChatMembers => "message:new_chat_members",
            Self::Start => "message:start",
            Self::Token => "message:token",
            Self::First => "message:first",
            Self::Last => "message:last",
            Self::Rand => "message:rand",
            Self::Help => "message:help",
            Self::CallbackQuery => "callback_query:*",
        }
    }
}

/// Текстовая команда с уже разобранными параметрами.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start { payload: Option<String> },
    Token { value: String },
    First { n: u32 },
    Last { n: u32 },
    Rand { n: u32 },
    Help,
}

impl Command {
    pub fn route(&self) -> Route {
        match self {
            Self::Start { .. } => Route::Start,
            Self::Token { .. } => Route::Token,
            Self::First { .. } => Route::First,
            Self::Last { .. } => Route::Last,
            Self::Rand { .. } => Route::Rand,
            Self::Help => Route::Help,
        }
    }
}

type ParseFn = fn(&Captures<'_>, u32) -> Option<Command>;

const TEXT_ROUTES: &[(&str, ParseFn)] = &[
    (r"^/start(?:@\w+)?(?:\s+(.*))?$", parse_start as ParseFn),
    (r"^/token(?:@\w+)?\s+(.+)$", parse_token as ParseFn),
    (r"^/first(?:@\w+)?\s+(\d+)$", parse_first as ParseFn),
    (r"^/last(?:@\w+)?\s+(\d+)$", parse_last as ParseFn),
    (r"^/rand(?:@\w+)?\s+(\d+)$", parse_rand as ParseFn),
    (r"^/help(?:@\w+)?(?:\s.*)?$", parse_help as ParseFn),
];

fn parse_count(caps: &Captures<'_>, max_count: u32) -> Option<u32> {
    caps.get(1)?
        .as_str()
        .parse::<u32>()
        .ok()
        .filter(|n| (1..=max_count).contains(n))
}

fn parse_start(caps: &Captures<'_>, _: u32) -> Option<Command> {
    let payload = caps.get(1).and_then(|raw| parse_start_payload(raw.as_str()));
    Some(Command::Start { payload })
}

fn parse_token(caps: &Captures<'_>, _: u32) -> Option<Command> {
    let value = caps.get(1)?.as_str().trim();
    (!value.is_empty()).then(|| Command::Token {
        value: value.to_string(),
    })
}

fn parse_first(caps: &Captures<'_>, max_count: u32) -> Option<Command> {
    parse_count(caps, max_count).map(|n| Command::First { n })
}

fn parse_last(caps: &Captures<'_>, max_count: u32) -> Option<Command> {
    parse_count(caps, max_count).map(|n| Command::Last { n })
}

fn parse_rand(caps: &Captures<'_>, max_count: u32) -> Option<Command> {
    parse_count(caps, max_count).map(|n| Command::Rand { n })
}

fn parse_help(_: &Captures<'_>, _: u32) -> Option<Command> {
    Some(Command::Help)
}

/// Событие после классификации: ровно один обработчик.
#[derive(Debug, Clone)]
pub enum Dispatch {
    Join(MessageEvent),
    Command(MessageEvent, Command),
    Callback(CallbackEvent),
}

impl Dispatch {
    pub fn route(&self) -> Route {
        match self {
            Self::Join(_) => Route::NewChatMembers,
            Self::Command(_, command) => command.route(),
            Self::Callback(_) => Route::CallbackQuery,
        }
    }

    fn chat_id(&self) -> Option<i64> {
        match self {
            Self::Join(event) | Self::Command(event, _) => Some(event.chat.id),
            Self::Callback(event) => event.message.map(|target| target.chat_id),
        }
    }
}

pub struct RouteTable {
    routes: Vec<(Regex, ParseFn)>,
    max_count: u32,
}

impl RouteTable {
    pub fn new(max_count: u32) -> Result<Self, regex::Error> {
        let routes = TEXT_ROUTES
            .iter()
            .map(|(pattern, parse)| Regex::new(pattern).map(|regex| (regex, *parse)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { routes, max_count })
    }

    /// Первый совпавший шаблон решает всё: если его параметры не разобрались,
    /// команда отбрасывается без ответа.
    pub fn match_text(&self, text: &str) -> Option<Command> {
        let text = text.trim();
        let (caps, parse) = self
            .routes
            .iter()
            .find_map(|(pattern, parse)| pattern.captures(text).map(|caps| (caps, parse)))?;
        parse(&caps, self.max_count)
    }

    pub fn classify(&self, event: InboundEvent) -> Option<Dispatch> {
        match event {
            InboundEvent::CallbackQuery(event) => Some(Dispatch::Callback(event)),
            InboundEvent::Message(event) if !event.new_chat_members.is_empty() => {
                Some(Dispatch::Join(event))
            }
            InboundEvent::Message(event) => {
                let command = self.match_text(event.text.as_deref()?)?;
                Some(Dispatch::Command(event, command))
            }
        }
    }
}

/// Обрабатывает одно событие. Ошибка обработчика логируется и дальше не уходит.
pub async fn dispatch(state: &BotState, event: InboundEvent) {
    let Some(dispatch) = state.routes.classify(event) else {
        return;
    };
    let route = dispatch.route();
    let chat_id = dispatch.chat_id();
    tracing::debug!(route = route.as_str(), chat_id = ?chat_id, "Routing event");

    let result = match dispatch {
        Dispatch::Join(event) => {
            if guard::bot_was_added(state.transport.as_ref(), &event.new_chat_members).await {
                commands::start(state, &event, None).await
            } else {
                Ok(Vec::new())
            }
        }
        Dispatch::Command(event, command) => commands::run(state, &event, command).await,
        Dispatch::Callback(event) => callbacks::handle(state, &event).await,
    };

    match result {
        Ok(effects) => apply_effects(state.transport.as_ref(), effects).await,
        Err(error) => {
            tracing::error!(
                route = route.as_str(),
                chat_id = ?chat_id,
                error = %error,
                "Обработчик завершился с ошибкой"
            );
        }
    }
}
