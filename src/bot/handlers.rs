//! Обработчики событий: маршрутизация, проверка вступления, команды и кнопки.

#[path = "handlers/callbacks/mod.rs"]
mod callbacks;
#[path = "handlers/commands/mod.rs"]
mod commands;
#[path = "handlers/format.rs"]
mod format;
#[path = "handlers/guard.rs"]
mod guard;
#[path = "handlers/router.rs"]
mod router;
#[path = "handlers/shared.rs"]
mod shared;
#[path = "handlers/state.rs"]
mod state;
#[cfg(test)]
#[path = "handlers/testing.rs"]
pub(crate) mod testing;

pub use router::dispatch;
pub use shared::build_bot_start_link;
pub use state::BotState;

use crate::bot::event::{CallbackEvent, InboundEvent, MessageEvent};
use shared::HandlerResult;
use teloxide::dispatching::DpHandlerDescription;
use teloxide::dptree;
use teloxide::prelude::*;

pub fn schema() -> dptree::Handler<
    'static,
    Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>,
    DpHandlerDescription,
> {
    dptree::entry()
        .branch(Update::filter_message().endpoint(on_message))
        .branch(Update::filter_callback_query().endpoint(on_callback_query))
}

async fn on_message(msg: Message, state: BotState) -> HandlerResult {
    dispatch(&state, InboundEvent::Message(MessageEvent::from(&msg))).await;
    Ok(())
}

async fn on_callback_query(q: CallbackQuery, state: BotState) -> HandlerResult {
    dispatch(&state, InboundEvent::CallbackQuery(CallbackEvent::from(&q))).await;
    Ok(())
}
