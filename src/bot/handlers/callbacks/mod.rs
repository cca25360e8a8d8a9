use super::format::{random_title, render_application, render_persons, selection_title};
use super::shared::Effect;
use super::state::BotState;
use crate::bot::event::CallbackEvent;
use crate::bot::keyboards;
use crate::error::{BotError, BotResult};
use crate::services::{Confirmation, SelectionOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Page {
        order: SelectionOrder,
        n: u32,
        offset: u32,
    },
    Reroll {
        n: u32,
    },
    Confirm {
        application_id: i64,
    },
}

fn invalid(data: &str) -> BotError {
    BotError::Validation(format!("некорректный callback payload {:?}", data))
}

fn parse_count(value: Option<&str>, max_count: u32) -> Option<u32> {
    value?
        .parse::<u32>()
        .ok()
        .filter(|n| (1..=max_count).contains(n))
}

impl CallbackAction {
    pub fn parse(data: &str, max_count: u32) -> BotResult<Self> {
        let mut parts = data.split(':');
        let action = match parts.next() {
            Some("page") => {
                let order = parts
                    .next()
                    .and_then(SelectionOrder::parse)
                    .ok_or_else(|| invalid(data))?;
                let n = parse_count(parts.next(), max_count).ok_or_else(|| invalid(data))?;
                let offset = parts
                    .next()
                    .and_then(|value| value.parse::<u32>().ok())
                    .ok_or_else(|| invalid(data))?;
                Self::Page { order, n, offset }
            }
            Some("rand") => Self::Reroll {
                n: parse_count(parts.next(), max_count).ok_or_else(|| invalid(data))?,
            },
            Some("confirm") => Self::Confirm {
                application_id: parts
                    .next()
                    .and_then(|value| value.parse::<i64>().ok())
                    .ok_or_else(|| invalid(data))?,
            },
            _ => return Err(invalid(data)),
        };
        if parts.next().is_some() {
            return Err(invalid(data));
        }
        Ok(action)
    }
}

pub async fn handle(state: &BotState, event: &CallbackEvent) -> BotResult<Vec<Effect>> {
    let Some(data) = event.data.as_deref() else {
        tracing::debug!(callback_id = %event.id, "Callback without data");
        return Ok(Vec::new());
    };
    let action = match CallbackAction::parse(data, state.config.selection.max_count) {
        Ok(action) => action,
        Err(error) => {
            tracing::warn!(person_id = event.from.id, error = %error, "Callback пропущен");
            return Ok(Vec::new());
        }
    };
    let Some(target) = event.message else {
        tracing::warn!(callback_id = %event.id, "Callback без сообщения");
        return Ok(vec![Effect::answer(&event.id, None)]);
    };

    match action {
        CallbackAction::Page { order, n, offset } => {
            let total = state.persons.count().await?;
            let persons = state.persons.list_window(order, offset, n).await?;
            let text = render_persons(&selection_title(order, n, offset, total), &persons);
            let keyboard = keyboards::persons_page_keyboard(order, n, offset, total);
            Ok(vec![
                Effect::answer(&event.id, None),
                Effect::edit(target, text, keyboard),
            ])
        }
        CallbackAction::Reroll { n } => {
            let persons = state.persons.list_random(n).await?;
            let total = state.persons.count().await?;
            let text = render_persons(&random_title(n, total), &persons);
            let keyboard = (total > n).then(|| keyboards::reroll_keyboard(n));
            Ok(vec![
                Effect::answer(&event.id, None),
                Effect::edit(target, text, keyboard),
            ])
        }
        CallbackAction::Confirm { application_id } => {
            match state.applications.confirm(application_id, event.from.id).await {
                Ok(Confirmation::Confirmed(application)) => Ok(vec![
                    Effect::answer(&event.id, Some("Заявка подтверждена")),
                    Effect::edit(target, render_application(&application), None),
                ]),
                Ok(Confirmation::AlreadyConfirmed(_)) => Ok(vec![Effect::answer(
                    &event.id,
                    Some("Заявка уже подтверждена"),
                )]),
                Err(error @ (BotError::NotFound(_) | BotError::Conflict(_))) => {
                    tracing::info!(
                        application_id = application_id,
                        person_id = event.from.id,
                        error = %error,
                        "Подтверждение заявки отклонено"
                    );
                    Ok(vec![Effect::answer(&event.id, Some("Эта заявка вам недоступна"))])
                }
                Err(error) => Err(error),
            }
        }
    }
}
