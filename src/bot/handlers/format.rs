use crate::db::{Application, ApplicationStatus, Person};
use crate::error::RejectReason;
use crate::services::SelectionOrder;
use chrono::{DateTime, Local, Utc};

pub fn format_timestamp(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| {
            dt.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S %:z")
                .to_string()
        })
        .unwrap_or_else(|| format!("Некорректный timestamp: {}", ts))
}

pub fn person_display_name(person: &Person) -> String {
    match person.username.as_deref() {
        Some(username) => format!("{} (@{})", person.display_name, username),
        None => person.display_name.clone(),
    }
}

pub fn render_persons(title: &str, persons: &[Person]) -> String {
    if persons.is_empty() {
        return format!("{}\n\nПока никого нет.", title);
    }
    let lines: Vec<String> = persons
        .iter()
        .map(|person| format!("• {}", person_display_name(person)))
        .collect();
    format!("{}\n\n{}", title, lines.join("\n"))
}

pub fn selection_title(order: SelectionOrder, n: u32, offset: u32, total: u32) -> String {
    let label = match order {
        SelectionOrder::First => "Первые",
        SelectionOrder::Last => "Последние",
    };
    if offset == 0 {
        format!("👥 {} {} из {}", label, n, total)
    } else {
        format!("👥 {} {} из {}, пропущено {}", label, n, total, offset)
    }
}

pub fn random_title(n: u32, total: u32) -> String {
    format!("🎲 Случайные {} из {}", n.min(total), total)
}

fn status_label(status: ApplicationStatus) -> &'static str {
    match status {
        ApplicationStatus::Submitted => "отправлена",
        ApplicationStatus::Confirmed => "подтверждена",
    }
}

pub fn render_application(application: &Application) -> String {
    format!(
        "📋 Заявка #{}\n\
         Программа: {}\n\
         Статус: {}\n\
         Создана: {}",
        application.id,
        application.name,
        status_label(application.status),
        format_timestamp(application.created_at),
    )
}

pub fn rejection_text(reason: RejectReason) -> String {
    let hint = match reason {
        RejectReason::NotFound => "Проверьте код и попробуйте снова.",
        RejectReason::Expired => "Запросите новый токен у организаторов.",
        RejectReason::AlreadyRedeemed => "Один токен можно использовать только один раз.",
    };
    format!("❌ {}. {}", reason, hint)
}

pub fn welcome_text(known_chat: bool) -> String {
    let greeting = if known_chat {
        "С возвращением!"
    } else {
        "Привет! Я бот регистрации участников."
    };
    format!("{}\n\n{}", greeting, help_text())
}

pub fn help_text() -> &'static str {
    r#"Команды:
/start — приветствие и регистрация чата
/token <токен> — зарегистрироваться по токену
/first N — первые N участников
/last N — последние N участников
/rand N — N случайных участников
/help — эта справка"#
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: i64, username: Option<&str>) -> Person {
        Person {
            seq: id,
            id,
            username: username.map(str::to_string),
            display_name: format!("Person {}", id),
            created_at: 0,
        }
    }

    #[test]
    fn renders_persons_with_usernames() {
        let text = render_persons("title", &[person(1, Some("one")), person(2, None)]);
        assert_eq!(text, "title\n\n• Person 1 (@one)\n• Person 2");
        assert!(render_persons("title", &[]).contains("Пока никого нет"));
    }

    #[test]
    fn rejection_mentions_reason() {
        let text = rejection_text(RejectReason::AlreadyRedeemed);
        assert!(text.contains("уже использован"));
    }
}
