//! Inline-клавиатуры бота и формат их callback payload.

use crate::services::SelectionOrder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// Клавиатура без привязки к teloxide; транспорт переводит её в `InlineKeyboardMarkup`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn append_row(mut self, row: Vec<Button>) -> Self {
        if !row.is_empty() {
            self.rows.push(row);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn page_payload(order: SelectionOrder, n: u32, offset: u32) -> String {
    format!("page:{}:{}:{}", order.as_str(), n, offset)
}

pub fn reroll_payload(n: u32) -> String {
    format!("rand:{}", n)
}

pub fn confirm_payload(application_id: i64) -> String {
    format!("confirm:{}", application_id)
}

/// Кнопки листания окна из `n` участников. Для `Last` смещение считается с конца,
/// поэтому «раньше» увеличивает его.
pub fn persons_page_keyboard(order: SelectionOrder, n: u32, offset: u32, total: u32) -> Option<Keyboard> {
    let has_before = offset > 0;
    let has_after = offset.saturating_add(n) < total;
    let mut row = Vec::new();
    match order {
        SelectionOrder::First => {
            if has_before {
                row.push(Button::callback(
                    "◀️ Назад",
                    page_payload(order, n, offset.saturating_sub(n)),
                ));
            }
            if has_after {
                row.push(Button::callback("Вперёд ▶️", page_payload(order, n, offset + n)));
            }
        }
        SelectionOrder::Last => {
            if has_after {
                row.push(Button::callback("◀️ Раньше", page_payload(order, n, offset + n)));
            }
            if has_before {
                row.push(Button::callback(
                    "Позже ▶️",
                    page_payload(order, n, offset.saturating_sub(n)),
                ));
            }
        }
    }
    let keyboard = Keyboard::default().append_row(row);
    (!keyboard.is_empty()).then_some(keyboard)
}

pub fn reroll_keyboard(n: u32) -> Keyboard {
    Keyboard::default().append_row(vec![Button::callback("🎲 Ещё раз", reroll_payload(n))])
}

pub fn confirm_keyboard(application_id: i64) -> Keyboard {
    Keyboard::default().append_row(vec![Button::callback(
        "✅ Подтвердить заявку",
        confirm_payload(application_id),
    )])
}
