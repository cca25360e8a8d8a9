use super::format::{
    help_text, random_title, rejection_text, render_application, render_persons,
    selection_title, welcome_text,
};
use super::router::Command;
use super::shared::Effect;
use super::state::BotState;
use crate::bot::event::MessageEvent;
use crate::bot::keyboards;
use crate::db::ApplicationStatus;
use crate::error::{BotError, BotResult};
use crate::services::{Registration, SelectionOrder};

pub async fn run(state: &BotState, event: &MessageEvent, command: Command) -> BotResult<Vec<Effect>> {
    match command {
        Command::Start { payload } => start(state, event, payload.as_deref()).await,
        Command::Token { value } => token(state, event, &value).await,
        Command::First { n } => select(state, event, SelectionOrder::First, n).await,
        Command::Last { n } => select(state, event, SelectionOrder::Last, n).await,
        Command::Rand { n } => rand(state, event, n).await,
        Command::Help => Ok(vec![Effect::send(event.chat.id, help_text())]),
    }
}

/// Регистрирует чат и отправителя. Payload из deep-link обрабатывается как `/token`.
pub async fn start(
    state: &BotState,
    event: &MessageEvent,
    payload: Option<&str>,
) -> BotResult<Vec<Effect>> {
    let known = state.chats.find_by_id(event.chat.id).await?.is_some();
    let chat = state.chats.upsert(&event.chat).await?;
    if let Some(person) = &event.from {
        state.persons.upsert(person).await?;
    }
    tracing::info!(
        chat_id = chat.id,
        kind = %chat.kind,
        known = known,
        person_id = ?event.from.as_ref().map(|person| person.id),
        "Received /start"
    );

    let mut effects = vec![Effect::send(chat.id, welcome_text(known))];
    if let Some(payload) = payload {
        effects.extend(token(state, event, payload).await?);
    }
    Ok(effects)
}

pub async fn token(state: &BotState, event: &MessageEvent, value: &str) -> BotResult<Vec<Effect>> {
    let chat_id = event.chat.id;
    let Some(person) = &event.from else {
        tracing::warn!(chat_id = chat_id, "Received /token without sender");
        return Ok(Vec::new());
    };

    let registration = match state.user_data.register(person, value).await {
        Ok(registration) => registration,
        Err(error @ (BotError::NotFound(_) | BotError::Conflict(_))) => {
            tracing::warn!(person_id = person.id, error = %error, "Регистрация по токену не удалась");
            return Ok(vec![Effect::send(
                chat_id,
                "❌ Не удалось оформить заявку по этому токену.",
            )]);
        }
        Err(error) => {
            tracing::error!(person_id = person.id, error = %error, "Регистрация по токену прервана ошибкой хранилища");
            return Ok(vec![Effect::send(
                chat_id,
                "⚠️ Сервис временно недоступен, попробуйте позже.",
            )]);
        }
    };

    let effect = match registration {
        Registration::Created(application) => Effect::send_with(
            chat_id,
            format!("✅ Токен принят.\n\n{}", render_application(&application)),
            Some(keyboards::confirm_keyboard(application.id)),
        ),
        Registration::Existing(application) => {
            let keyboard = (application.status == ApplicationStatus::Submitted)
                .then(|| keyboards::confirm_keyboard(application.id));
            Effect::send_with(
                chat_id,
                format!(
                    "Вы уже зарегистрированы по этому токену.\n\n{}",
                    render_application(&application)
                ),
                keyboard,
            )
        }
        Registration::Rejected(reason) => Effect::send(chat_id, rejection_text(reason)),
    };
    Ok(vec![effect])
}

async fn select(
    state: &BotState,
    event: &MessageEvent,
    order: SelectionOrder,
    n: u32,
) -> BotResult<Vec<Effect>> {
    let persons = match order {
        SelectionOrder::First => state.persons.list_first(n).await?,
        SelectionOrder::Last => state.persons.list_last(n).await?,
    };
    let total = state.persons.count().await?;
    let text = render_persons(&selection_title(order, n, 0, total), &persons);
    let keyboard = keyboards::persons_page_keyboard(order, n, 0, total);
    Ok(vec![Effect::send_with(event.chat.id, text, keyboard)])
}

async fn rand(state: &BotState, event: &MessageEvent, n: u32) -> BotResult<Vec<Effect>> {
    let persons = state.persons.list_random(n).await?;
    let total = state.persons.count().await?;
    let text = render_persons(&random_title(n, total), &persons);
    let keyboard = (total > n).then(|| keyboards::reroll_keyboard(n));
    Ok(vec![Effect::send_with(event.chat.id, text, keyboard)])
}

#[cfg(test)]
mod tests {
    use crate::bot::handlers::router::dispatch;
    use crate::bot::handlers::testing::{Sent, message, test_state};
    use crate::bot::keyboards::Keyboard;

    fn texts(sent: &[Sent]) -> Vec<String> {
        sent.iter()
            .filter_map(|item| match item {
                Sent::Message { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn last_keyboard(sent: &[Sent]) -> Option<Keyboard> {
        match sent.last() {
            Some(Sent::Message { keyboard, .. }) => keyboard.clone(),
            _ => None,
        }
    }

    fn payloads(keyboard: &Keyboard) -> Vec<String> {
        keyboard
            .rows
            .iter()
            .flatten()
            .map(|button| button.data.clone())
            .collect()
    }

    #[tokio::test]
    async fn first_and_last_list_persons_in_creation_order() {
        let fx = test_state(Some(42)).await;
        fx.add_persons(&[1, 2, 3, 4]).await;

        dispatch(&fx.state, message(10, 1, "/first 3")).await;
        let sent = fx.transport.sent().await;
        let text = &texts(&sent)[0];
        assert!(text.contains("Person 1") && text.contains("Person 3"));
        assert!(!text.contains("Person 4"));
        assert_eq!(payloads(&last_keyboard(&sent).unwrap()), vec!["page:first:3:3"]);

        dispatch(&fx.state, message(10, 1, "/last 3")).await;
        let sent = fx.transport.sent().await;
        let text = &texts(&sent)[1];
        assert!(text.contains("Person 2") && text.contains("Person 4"));
        assert!(!text.contains("Person 1"));
        assert_eq!(payloads(&last_keyboard(&sent).unwrap()), vec!["page:last:3:3"]);
    }

    #[tokio::test]
    async fn rand_over_small_population_returns_everyone() {
        let fx = test_state(Some(42)).await;
        fx.add_persons(&[1, 2, 3, 4]).await;

        dispatch(&fx.state, message(10, 1, "/rand 10")).await;
        let sent = fx.transport.sent().await;
        let text = &texts(&sent)[0];
        for id in 1..=4 {
            assert_eq!(text.matches(&format!("Person {} ", id)).count(), 1);
        }
        assert!(last_keyboard(&sent).is_none());
    }

    #[tokio::test]
    async fn start_registers_chat_and_welcomes_back() {
        let fx = test_state(Some(42)).await;
        dispatch(&fx.state, message(-100, 1, "/start")).await;
        dispatch(&fx.state, message(-100, 1, "/start@igv_bot")).await;

        let texts = texts(&fx.transport.sent().await);
        assert_eq!(texts.len(), 2);
        assert!(texts[0].starts_with("Привет"));
        assert!(texts[1].starts_with("С возвращением"));
        assert!(fx.state.chats.find_by_id(-100).await.unwrap().is_some());
        assert!(fx.state.persons.find_by_id(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn token_workflow_replies_for_every_outcome() {
        let fx = test_state(Some(42)).await;
        fx.seed_tokens(&["alpha"]).await;

        dispatch(&fx.state, message(5, 5, "/token alpha")).await;
        let sent = fx.transport.sent().await;
        assert!(texts(&sent)[0].contains("Токен принят"));
        let confirm = payloads(&last_keyboard(&sent).unwrap());
        assert_eq!(confirm.len(), 1);
        assert!(confirm[0].starts_with("confirm:"));

        dispatch(&fx.state, message(5, 5, "/token alpha")).await;
        dispatch(&fx.state, message(6, 6, "/token alpha")).await;
        let texts = texts(&fx.transport.sent().await);
        assert!(texts[1].contains("уже зарегистрированы"));
        assert!(texts[2].contains("уже использован"));
        assert_eq!(fx.db.count_applications().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn bogus_token_is_rejected_without_mutations() {
        let fx = test_state(Some(42)).await;
        fx.seed_tokens(&["alpha"]).await;

        dispatch(&fx.state, message(7, 7, "/token bogus")).await;
        let texts = texts(&fx.transport.sent().await);
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("Токен не найден"));
        assert_eq!(fx.db.count_persons().await.unwrap(), 0);
        assert_eq!(fx.db.count_applications().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn token_reply_survives_storage_failure() {
        let fx = test_state(Some(42)).await;
        fx.seed_tokens(&["alpha"]).await;
        fx.db.close().await;

        dispatch(&fx.state, message(5, 5, "/token alpha")).await;
        let texts = texts(&fx.transport.sent().await);
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("попробуйте позже"));
    }

    #[tokio::test]
    async fn start_payload_runs_registration() {
        let fx = test_state(Some(42)).await;
        fx.seed_tokens(&["alpha"]).await;

        dispatch(&fx.state, message(5, 5, "/start alpha")).await;
        let texts = texts(&fx.transport.sent().await);
        assert_eq!(texts.len(), 2);
        assert!(texts[0].starts_with("Привет"));
        assert!(texts[1].contains("Токен принят"));
    }
}
