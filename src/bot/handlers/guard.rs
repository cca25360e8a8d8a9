use crate::bot::transport::Transport;

/// Проверяет, что среди вступивших есть сам бот. Ошибка `getMe` значит «не совпало».
pub async fn bot_was_added(transport: &dyn Transport, joined_ids: &[i64]) -> bool {
    if joined_ids.is_empty() {
        return false;
    }
    match transport.get_self_identity().await {
        Ok(identity) => joined_ids.contains(&identity.id),
        Err(error) => {
            tracing::warn!(
                error = %error,
                "Не удалось получить идентификатор бота, событие вступления пропущено"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::bot::handlers::router::dispatch;
    use crate::bot::handlers::testing::{Sent, join, test_state};

    #[tokio::test]
    async fn regular_members_joining_are_ignored() {
        let fx = test_state(Some(3)).await;
        dispatch(&fx.state, join(-100, &[1, 2])).await;
        assert!(fx.transport.sent().await.is_empty());
        assert!(fx.state.chats.find_by_id(-100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bot_joining_runs_start_once() {
        let fx = test_state(Some(3)).await;
        dispatch(&fx.state, join(-100, &[1, 3])).await;

        let sent = fx.transport.sent().await;
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], Sent::Message { chat_id: -100, .. }));
        assert!(fx.state.chats.find_by_id(-100).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn identity_failure_is_treated_as_no_match() {
        let fx = test_state(None).await;
        dispatch(&fx.state, join(-100, &[1, 3])).await;
        assert!(fx.transport.sent().await.is_empty());
    }
}
