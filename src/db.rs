//! SQLite-слой: участники, чаты, токены и заявки.

use rand::distr::{Alphanumeric, SampleString};
use sqlx::FromRow;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

const TOKEN_LENGTH: usize = 10;
const TOKEN_INSERT_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Person {
    /// Порядковый номер появления, задаёт порядок для /first и /last.
    pub seq: i64,
    pub id: i64,
    pub username: Option<String>,
    pub display_name: String,
    pub created_at: i64,
}

/// Данные участника из входящего события.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonData {
    pub id: i64,
    pub username: Option<String>,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Chat {
    pub id: i64,
    pub kind: String,
    pub title: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatData {
    pub id: i64,
    pub kind: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Token {
    pub id: i64,
    pub value: String,
    /// Заявка, которую открывает этот токен.
    pub application: String,
    pub created_at: i64,
    pub expires_at: Option<i64>,
    pub redeemed_by: Option<i64>,
    pub redeemed_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Unredeemed,
    Redeemed { person_id: i64 },
    Expired,
}

impl Token {
    /// Погашенный токен остаётся погашенным и после истечения срока.
    pub fn state(&self, now: i64) -> TokenState {
        if let Some(person_id) = self.redeemed_by {
            return TokenState::Redeemed { person_id };
        }
        if self.expires_at.is_some_and(|expires_at| expires_at <= now) {
            return TokenState::Expired;
        }
        TokenState::Unredeemed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationStatus {
    Submitted,
    Confirmed,
}

impl ApplicationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => STATUS_SUBMITTED,
            Self::Confirmed => STATUS_CONFIRMED,
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = sqlx::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            STATUS_SUBMITTED => Ok(Self::Submitted),
            STATUS_CONFIRMED => Ok(Self::Confirmed),
            other => Err(sqlx::Error::Decode(
                format!("unknown application status: {}", other).into(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    pub id: i64,
    pub person_id: i64,
    pub token_id: i64,
    pub name: String,
    pub status: ApplicationStatus,
    pub created_at: i64,
}

#[derive(FromRow)]
struct ApplicationRow {
    id: i64,
    person_id: i64,
    token_id: i64,
    name: String,
    status: String,
    created_at: i64,
}

impl TryFrom<ApplicationRow> for Application {
    type Error = sqlx::Error;

    fn try_from(row: ApplicationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            person_id: row.person_id,
            token_id: row.token_id,
            name: row.name,
            status: row.status.parse()?,
            created_at: row.created_at,
        })
    }
}

/// Результат условной записи при погашении токена.
#[derive(Debug)]
pub enum RedeemWrite {
    /// Эта попытка погасила токен и создала заявку.
    Redeemed(Application),
    /// Токен уже погашен, истёк или исчез к моменту записи.
    Lost,
}

const STATUS_SUBMITTED: &str = "submitted";
const STATUS_CONFIRMED: &str = "confirmed";

const UPSERT_PERSON_SQL: &str =
    "INSERT INTO persons (id, username, display_name, created_at, updated_at)
     VALUES (?, ?, ?, ?, ?)
     ON CONFLICT(id) DO UPDATE SET
         username = excluded.username,
         display_name = excluded.display_name,
         updated_at = excluded.updated_at";

const PERSON_COLUMNS: &str = "seq, id, username, display_name, created_at";
const TOKEN_COLUMNS: &str =
    "id, value, application, created_at, expires_at, redeemed_by, redeemed_at";
const APPLICATION_COLUMNS: &str = "id, person_id, token_id, name, status, created_at";

pub struct Db {
    pool: SqlitePool,
}

impl Db {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| anyhow::anyhow!("Не удалось создать директорию для БД: {}", e))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(opts)
            .await
            .map_err(|e| anyhow::anyhow!("Не удалось подключиться к SQLite: {}", e))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Закрывает пул; последующие запросы вернут `PoolClosed`.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(&self) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS persons (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id INTEGER NOT NULL UNIQUE,
                username TEXT,
                display_name TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS chats (
                id INTEGER PRIMARY KEY,
                kind TEXT NOT NULL,
                title TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!("Миграция persons/chats: {}", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tokens (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                value TEXT NOT NULL UNIQUE,
                application TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER,
                redeemed_by INTEGER,
                redeemed_at INTEGER
            );
            CREATE TABLE IF NOT EXISTS applications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                person_id INTEGER NOT NULL,
                token_id INTEGER NOT NULL UNIQUE REFERENCES tokens(id),
                name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'submitted',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_applications_person ON applications(person_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!("Миграция tokens/applications: {}", e))?;

        Ok(())
    }

    pub async fn upsert_person(&self, person: &PersonData, now: i64) -> Result<Person, sqlx::Error> {
        sqlx::query(UPSERT_PERSON_SQL)
            .bind(person.id)
            .bind(person.username.as_deref())
            .bind(&person.display_name)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

        self.get_person(person.id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_person(&self, id: i64) -> Result<Option<Person>, sqlx::Error> {
        sqlx::query_as::<_, Person>(&format!(
            "SELECT {} FROM persons WHERE id = ?",
            PERSON_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Окно участников в порядке появления (`ascending`) или в обратном.
    pub async fn list_persons(
        &self,
        ascending: bool,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Person>, sqlx::Error> {
        let order = if ascending { "ASC" } else { "DESC" };
        sqlx::query_as::<_, Person>(&format!(
            "SELECT {} FROM persons ORDER BY seq {} LIMIT ? OFFSET ?",
            PERSON_COLUMNS, order
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn list_all_persons(&self) -> Result<Vec<Person>, sqlx::Error> {
        sqlx::query_as::<_, Person>(&format!(
            "SELECT {} FROM persons ORDER BY seq ASC",
            PERSON_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
    }

    pub async fn count_persons(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM persons")
            .fetch_one(&self.pool)
            .await
    }

    pub async fn upsert_chat(&self, chat: &ChatData, now: i64) -> Result<Chat, sqlx::Error> {
        sqlx::query(
            "INSERT INTO chats (id, kind, title, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 kind = excluded.kind,
                 title = excluded.title,
                 updated_at = excluded.updated_at",
        )
        .bind(chat.id)
        .bind(&chat.kind)
        .bind(chat.title.as_deref())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_chat(chat.id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_chat(&self, id: i64) -> Result<Option<Chat>, sqlx::Error> {
        sqlx::query_as::<_, Chat>("SELECT id, kind, title, created_at FROM chats WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_token_by_value(&self, value: &str) -> Result<Option<Token>, sqlx::Error> {
        sqlx::query_as::<_, Token>(&format!(
            "SELECT {} FROM tokens WHERE value = ?",
            TOKEN_COLUMNS
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await
    }

    /// Вставляет токен, если такого значения ещё нет. Возвращает `true`, если вставили.
    pub async fn insert_token_if_missing(
        &self,
        value: &str,
        application: &str,
        expires_at: Option<i64>,
        now: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO tokens (value, application, created_at, expires_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(value) DO NOTHING",
        )
        .bind(value)
        .bind(application)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    fn generate_token_value() -> String {
        Alphanumeric.sample_string(&mut rand::rng(), TOKEN_LENGTH)
    }

    /// Выпускает токен со случайным значением, повторяя попытку при коллизии.
    pub async fn create_token(
        &self,
        application: &str,
        expires_at: Option<i64>,
        now: i64,
    ) -> Result<Token, sqlx::Error> {
        for _ in 0..TOKEN_INSERT_ATTEMPTS {
            let value = Self::generate_token_value();
            if self
                .insert_token_if_missing(&value, application, expires_at, now)
                .await?
            {
                return self
                    .get_token_by_value(&value)
                    .await?
                    .ok_or(sqlx::Error::RowNotFound);
            }
        }
        Err(sqlx::Error::Protocol(
            "Не удалось сгенерировать уникальный токен".to_string(),
        ))
    }

    /// Гасит токен, записывает участника и создаёт заявку в одной транзакции.
    ///
    /// Условие `redeemed_by IS NULL` в UPDATE работает как compare-and-swap:
    /// из нескольких одновременных вызовов строку изменит ровно один.
    /// Проигравшие ничего не записывают, в том числе участника.
    pub async fn redeem_token(
        &self,
        token: &Token,
        person: &PersonData,
        now: i64,
    ) -> Result<RedeemWrite, sqlx::Error> {
        let person_id = person.id;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE tokens
             SET redeemed_by = ?, redeemed_at = ?
             WHERE id = ?
               AND redeemed_by IS NULL
               AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(person_id)
        .bind(now)
        .bind(token.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(RedeemWrite::Lost);
        }

        sqlx::query(UPSERT_PERSON_SQL)
            .bind(person_id)
            .bind(person.username.as_deref())
            .bind(&person.display_name)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO applications (person_id, token_id, name, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(token_id) DO NOTHING",
        )
        .bind(person_id)
        .bind(token.id)
        .bind(&token.application)
        .bind(STATUS_SUBMITTED)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, ApplicationRow>(&format!(
            "SELECT {} FROM applications WHERE token_id = ?",
            APPLICATION_COLUMNS
        ))
        .bind(token.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(RedeemWrite::Redeemed(row.try_into()?))
    }

    /// Создаёт заявку для пары (участник, токен) или возвращает существующую.
    pub async fn create_or_get_application(
        &self,
        person_id: i64,
        token: &Token,
        now: i64,
    ) -> Result<Application, sqlx::Error> {
        sqlx::query(
            "INSERT INTO applications (person_id, token_id, name, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(token_id) DO NOTHING",
        )
        .bind(person_id)
        .bind(token.id)
        .bind(&token.application)
        .bind(STATUS_SUBMITTED)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_application_by_token(token.id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_application(&self, id: i64) -> Result<Option<Application>, sqlx::Error> {
        let row = sqlx::query_as::<_, ApplicationRow>(&format!(
            "SELECT {} FROM applications WHERE id = ?",
            APPLICATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Application::try_from).transpose()
    }

    pub async fn get_application_by_token(
        &self,
        token_id: i64,
    ) -> Result<Option<Application>, sqlx::Error> {
        let row = sqlx::query_as::<_, ApplicationRow>(&format!(
            "SELECT {} FROM applications WHERE token_id = ?",
            APPLICATION_COLUMNS
        ))
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Application::try_from).transpose()
    }

    /// Переводит заявку владельца из `submitted` в `confirmed`.
    pub async fn confirm_application(
        &self,
        id: i64,
        person_id: i64,
        now: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE applications SET status = ?, updated_at = ?
             WHERE id = ? AND person_id = ? AND status = ?",
        )
        .bind(STATUS_CONFIRMED)
        .bind(now)
        .bind(id)
        .bind(person_id)
        .bind(STATUS_SUBMITTED)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Непогашенные и не истёкшие к моменту `now` токены.
    pub async fn count_unredeemed_tokens(&self, now: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tokens
             WHERE redeemed_by IS NULL AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn count_applications(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM applications")
            .fetch_one(&self.pool)
            .await
    }
}

#[cfg(test)]
pub(crate) async fn open_temp() -> (tempfile::TempDir, Db) {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let db = Db::open(dir.path().join("igv-bot.db"))
        .await
        .expect("failed to open db");
    (dir, db)
}
