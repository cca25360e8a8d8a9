use super::unix_now;
use crate::db::{Db, Person, PersonData};
use crate::error::BotResult;
use crate::storage::Storage;
use rand::seq::IndexedRandom;
use std::sync::Arc;

/// Направление выборки участников относительно порядка появления.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOrder {
    First,
    Last,
}

impl SelectionOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Last => "last",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "first" => Some(Self::First),
            "last" => Some(Self::Last),
            _ => None,
        }
    }
}

pub struct PersonService {
    db: Arc<Db>,
    storage: Storage<i64, Person>,
}

impl PersonService {
    pub fn new(db: Arc<Db>) -> Self {
        Self {
            db,
            storage: Storage::new(),
        }
    }

    pub async fn find_by_id(&self, id: i64) -> BotResult<Option<Person>> {
        if let Some(person) = self.storage.get(&id) {
            return Ok(Some(person));
        }
        let person = self.db.get_person(id).await?;
        if let Some(person) = &person {
            self.storage.put(id, person.clone());
        }
        Ok(person)
    }

    pub async fn upsert(&self, data: &PersonData) -> BotResult<Person> {
        let person = self.db.upsert_person(data, unix_now()).await?;
        self.storage.put(person.id, person.clone());
        Ok(person)
    }

    pub async fn list_first(&self, n: u32) -> BotResult<Vec<Person>> {
        self.list_window(SelectionOrder::First, 0, n).await
    }

    pub async fn list_last(&self, n: u32) -> BotResult<Vec<Person>> {
        self.list_window(SelectionOrder::Last, 0, n).await
    }

    /// Окно из `n` участников, пропустив `offset` с начала (`First`) или с конца (`Last`).
    /// Результат всегда в порядке появления.
    pub async fn list_window(
        &self,
        order: SelectionOrder,
        offset: u32,
        n: u32,
    ) -> BotResult<Vec<Person>> {
        let ascending = order == SelectionOrder::First;
        let mut persons = self
            .db
            .list_persons(ascending, i64::from(offset), i64::from(n))
            .await?;
        if !ascending {
            persons.reverse();
        }
        Ok(persons)
    }

    /// `n` случайных участников без повторов; если участников меньше, возвращает всех.
    pub async fn list_random(&self, n: u32) -> BotResult<Vec<Person>> {
        let all = self.db.list_all_persons().await?;
        let amount = usize::try_from(n).unwrap_or(usize::MAX);
        Ok(all
            .choose_multiple(&mut rand::rng(), amount)
            .cloned()
            .collect())
    }

    pub async fn count(&self) -> BotResult<u32> {
        let total = self.db.count_persons().await?;
        Ok(u32::try_from(total).unwrap_or(u32::MAX))
    }
}
