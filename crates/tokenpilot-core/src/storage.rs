//! Storage layer for identities, sessions, chats and the message log
//!
//! Provides a persistent implementation on SQLite. Uniqueness of a session per
//! platform account and of the active chat per session is enforced by the
//! schema, so racing writers converge on the same rows.

use crate::models::{
    Chat, ChatStatus, NewMessage, Platform, PlatformUpdate, ResolvedContext, Session, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// SQLite driver error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Blocking storage task failed to complete
    #[error("Storage task failed: {0}")]
    Join(String),
    /// Connection mutex was poisoned by a panicking holder
    #[error("Storage lock poisoned")]
    Poisoned,
    /// The store was closed by the lifecycle
    #[error("Storage is closed")]
    Closed,
    /// A row expected to exist was not found
    #[error("Record not found: {0}")]
    NotFound(String),
}

/// Interface for the identity/session/chat store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Find the session bound to a platform account
    async fn find_session(
        &self,
        platform: Platform,
        platform_user_id: i64,
    ) -> Result<Option<Session>, StorageError>;

    /// Refresh the mutable profile fields of a session and its identity
    async fn touch_session(
        &self,
        session_id: i64,
        update: &PlatformUpdate,
        at: DateTime<Utc>,
    ) -> Result<(User, Session), StorageError>;

    /// Most recently active chat of a session
    async fn find_active_chat(&self, session_id: i64) -> Result<Option<Chat>, StorageError>;

    /// Bump `last_message_at` of a chat and mark it active
    async fn touch_chat(&self, chat_id: i64, at: DateTime<Utc>) -> Result<Chat, StorageError>;

    /// Create the active chat of a session, or return the one a concurrent writer created
    async fn create_chat(
        &self,
        session: &Session,
        title: &str,
        at: DateTime<Utc>,
    ) -> Result<Chat, StorageError>;

    /// Atomically create-or-update the identity, session and initial chat
    async fn create_identity_bundle(
        &self,
        update: &PlatformUpdate,
        at: DateTime<Utc>,
    ) -> Result<ResolvedContext, StorageError>;

    /// Append a message to a chat's log
    async fn record_message(
        &self,
        chat: &Chat,
        message: &NewMessage,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// `structuredData` of the newest assistant message in a chat
    async fn latest_structured_data(
        &self,
        chat_id: i64,
    ) -> Result<Option<serde_json::Value>, StorageError>;

    /// Check that the store is reachable
    async fn check_connection(&self) -> Result<(), StorageError>;

    /// Release the underlying connection
    async fn close(&self);
}

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        firstname TEXT NOT NULL,
        lastname TEXT,
        nicename TEXT NOT NULL,
        language TEXT,
        status TEXT NOT NULL DEFAULT 'active',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        platform TEXT NOT NULL,
        platform_user_id INTEGER NOT NULL,
        platform_username TEXT,
        first_name TEXT NOT NULL,
        last_name TEXT,
        language_code TEXT,
        is_premium INTEGER NOT NULL DEFAULT 0,
        chat_id INTEGER NOT NULL,
        chat_type TEXT NOT NULL,
        chat_title TEXT,
        last_interaction TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active',
        UNIQUE(platform, platform_user_id)
    );

    CREATE TABLE IF NOT EXISTS chats (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        session_id INTEGER NOT NULL REFERENCES sessions(id),
        platform TEXT NOT NULL,
        title TEXT NOT NULL,
        last_message_at TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active'
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_chats_one_active
    ON chats(session_id) WHERE status = 'active';

    CREATE INDEX IF NOT EXISTS idx_chats_session_recent
    ON chats(session_id, status, last_message_at);

    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        chat_id INTEGER NOT NULL REFERENCES chats(id),
        user_id INTEGER NOT NULL REFERENCES users(id),
        role TEXT NOT NULL,
        status TEXT NOT NULL,
        content TEXT NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id, role);
";

const USER_COLUMNS: &str = "id, username, firstname, lastname, nicename, language, status";
const SESSION_COLUMNS: &str = "id, user_id, platform, platform_user_id, platform_username, \
     first_name, last_name, language_code, is_premium, chat_id, chat_type, chat_title, \
     last_interaction, status";
const CHAT_COLUMNS: &str = "id, user_id, session_id, platform, title, last_message_at, status";

/// SQLite-backed store.
///
/// One connection behind a mutex; every call runs on the blocking pool.
/// Cloning shares the connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteStore {
    /// Open (or create) a database file and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// database cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if path.as_os_str() == ":memory:" {
            return Self::open_in_memory();
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        info!(path = %path.display(), "SQLite store opened");
        Self::with_schema(conn)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::with_schema(Connection::open_in_memory()?)
    }

    fn with_schema(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn call<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StorageError::Poisoned)?;
            let conn = guard.as_mut().ok_or(StorageError::Closed)?;
            f(conn)
        })
        .await
        .map_err(|e| StorageError::Join(e.to_string()))?
    }

    /// Number of chats of a session in the given status.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count_chats(
        &self,
        session_id: i64,
        status: ChatStatus,
    ) -> Result<i64, StorageError> {
        self.call(move |conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM chats WHERE session_id = ?1 AND status = ?2",
                params![session_id, status.as_str()],
                |row| row.get(0),
            )?)
        })
        .await
    }

    /// Archive a chat so the next update opens a new thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn archive_chat(&self, chat_id: i64) -> Result<(), StorageError> {
        self.call(move |conn| {
            conn.execute(
                "UPDATE chats SET status = 'archived' WHERE id = ?1",
                params![chat_id],
            )?;
            Ok(())
        })
        .await
    }
}

fn parse_text<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::<dyn std::error::Error + Send + Sync>::from(e),
        )
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        firstname: row.get(2)?,
        lastname: row.get(3)?,
        nicename: row.get(4)?,
        language: row.get(5)?,
        status: parse_text(row, 6)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        user_id: row.get(1)?,
        platform: parse_text(row, 2)?,
        platform_user_id: row.get(3)?,
        platform_username: row.get(4)?,
        first_name: row.get(5)?,
        last_name: row.get(6)?,
        language_code: row.get(7)?,
        is_premium: row.get(8)?,
        chat_id: row.get(9)?,
        chat_type: row.get(10)?,
        chat_title: row.get(11)?,
        last_interaction: row.get(12)?,
        status: parse_text(row, 13)?,
    })
}

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: row.get(0)?,
        user_id: row.get(1)?,
        session_id: row.get(2)?,
        platform: parse_text(row, 3)?,
        title: row.get(4)?,
        last_message_at: row.get(5)?,
        status: parse_text(row, 6)?,
    })
}

fn select_user(conn: &Connection, user_id: i64) -> Result<User, StorageError> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![user_id],
        user_from_row,
    )
    .optional()?
    .ok_or_else(|| StorageError::NotFound(format!("user {user_id}")))
}

fn select_session_by_account(
    conn: &Connection,
    platform: Platform,
    platform_user_id: i64,
) -> Result<Option<Session>, StorageError> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE platform = ?1 AND platform_user_id = ?2"
            ),
            params![platform.as_str(), platform_user_id],
            session_from_row,
        )
        .optional()?)
}

fn select_session(conn: &Connection, session_id: i64) -> Result<Session, StorageError> {
    conn.query_row(
        &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
        params![session_id],
        session_from_row,
    )
    .optional()?
    .ok_or_else(|| StorageError::NotFound(format!("session {session_id}")))
}

fn select_active_chat(conn: &Connection, session_id: i64) -> Result<Option<Chat>, StorageError> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {CHAT_COLUMNS} FROM chats WHERE session_id = ?1 AND status = 'active' \
                 ORDER BY last_message_at DESC, id DESC LIMIT 1"
            ),
            params![session_id],
            chat_from_row,
        )
        .optional()?)
}

/// Insert the active chat unless one already exists, then read it back.
fn insert_or_get_active_chat(
    conn: &Connection,
    session: &Session,
    title: &str,
    at: DateTime<Utc>,
) -> Result<Chat, StorageError> {
    let inserted = conn.execute(
        "INSERT INTO chats (user_id, session_id, platform, title, last_message_at, status)
         VALUES (?1, ?2, ?3, ?4, ?5, 'active')
         ON CONFLICT DO NOTHING",
        params![
            session.user_id,
            session.id,
            session.platform.as_str(),
            title,
            at
        ],
    )?;
    if inserted == 0 {
        debug!(session_id = session.id, "Active chat already present, reusing it");
    }
    select_active_chat(conn, session.id)?
        .ok_or_else(|| StorageError::NotFound(format!("active chat of session {}", session.id)))
}

fn upsert_user(conn: &Connection, update: &PlatformUpdate, at: DateTime<Utc>) -> Result<User, StorageError> {
    let username = update.identity_key();
    conn.execute(
        "INSERT INTO users (username, firstname, lastname, nicename, language, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6, ?6)
         ON CONFLICT(username) DO UPDATE SET
            firstname = excluded.firstname,
            lastname = excluded.lastname,
            nicename = excluded.nicename,
            language = excluded.language,
            status = 'active',
            updated_at = excluded.updated_at",
        params![
            username,
            update.display_first_name(),
            update.last_name,
            update.nicename(),
            update.language_code,
            at
        ],
    )?;
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
        params![username],
        user_from_row,
    )
    .optional()?
    .ok_or_else(|| StorageError::NotFound(format!("user {username}")))
}

fn upsert_session(
    conn: &Connection,
    user_id: i64,
    update: &PlatformUpdate,
    at: DateTime<Utc>,
) -> Result<Session, StorageError> {
    conn.execute(
        "INSERT INTO sessions (user_id, platform, platform_user_id, platform_username, first_name,
                               last_name, language_code, is_premium, chat_id, chat_type, chat_title,
                               last_interaction, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 'active')
         ON CONFLICT(platform, platform_user_id) DO UPDATE SET
            platform_username = excluded.platform_username,
            first_name = excluded.first_name,
            last_name = excluded.last_name,
            language_code = excluded.language_code,
            is_premium = excluded.is_premium,
            chat_id = excluded.chat_id,
            chat_type = excluded.chat_type,
            chat_title = excluded.chat_title,
            last_interaction = excluded.last_interaction,
            status = 'active'",
        params![
            user_id,
            update.platform.as_str(),
            update.platform_user_id,
            update.username,
            update.display_first_name(),
            update.last_name,
            update.language_code,
            update.is_premium,
            update.chat_id,
            update.chat_type,
            update.chat_title,
            at
        ],
    )?;
    select_session_by_account(conn, update.platform, update.platform_user_id)?.ok_or_else(|| {
        StorageError::NotFound(format!(
            "session {}:{}",
            update.platform, update.platform_user_id
        ))
    })
}

#[async_trait]
impl IdentityStore for SqliteStore {
    async fn find_session(
        &self,
        platform: Platform,
        platform_user_id: i64,
    ) -> Result<Option<Session>, StorageError> {
        self.call(move |conn| select_session_by_account(conn, platform, platform_user_id))
            .await
    }

    async fn touch_session(
        &self,
        session_id: i64,
        update: &PlatformUpdate,
        at: DateTime<Utc>,
    ) -> Result<(User, Session), StorageError> {
        let update = update.clone();
        self.call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "UPDATE sessions SET
                    platform_username = ?2, first_name = ?3, last_name = ?4, language_code = ?5,
                    is_premium = ?6, chat_id = ?7, chat_type = ?8, chat_title = ?9,
                    last_interaction = ?10, status = 'active'
                 WHERE id = ?1",
                params![
                    session_id,
                    update.username,
                    update.display_first_name(),
                    update.last_name,
                    update.language_code,
                    update.is_premium,
                    update.chat_id,
                    update.chat_type,
                    update.chat_title,
                    at
                ],
            )?;
            let session = select_session(&tx, session_id)?;
            tx.execute(
                "UPDATE users SET firstname = ?2, lastname = ?3, nicename = ?4, language = ?5,
                    status = 'active', updated_at = ?6
                 WHERE id = ?1",
                params![
                    session.user_id,
                    update.display_first_name(),
                    update.last_name,
                    update.nicename(),
                    update.language_code,
                    at
                ],
            )?;
            let user = select_user(&tx, session.user_id)?;
            tx.commit()?;
            Ok((user, session))
        })
        .await
    }

    async fn find_active_chat(&self, session_id: i64) -> Result<Option<Chat>, StorageError> {
        self.call(move |conn| select_active_chat(conn, session_id)).await
    }

    async fn touch_chat(&self, chat_id: i64, at: DateTime<Utc>) -> Result<Chat, StorageError> {
        self.call(move |conn| {
            conn.execute(
                "UPDATE chats SET last_message_at = ?2, status = 'active' WHERE id = ?1",
                params![chat_id, at],
            )?;
            conn.query_row(
                &format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = ?1"),
                params![chat_id],
                chat_from_row,
            )
            .optional()?
            .ok_or_else(|| StorageError::NotFound(format!("chat {chat_id}")))
        })
        .await
    }

    async fn create_chat(
        &self,
        session: &Session,
        title: &str,
        at: DateTime<Utc>,
    ) -> Result<Chat, StorageError> {
        let session = session.clone();
        let title = title.to_string();
        self.call(move |conn| insert_or_get_active_chat(conn, &session, &title, at))
            .await
    }

    async fn create_identity_bundle(
        &self,
        update: &PlatformUpdate,
        at: DateTime<Utc>,
    ) -> Result<ResolvedContext, StorageError> {
        let update = update.clone();
        self.call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let user = upsert_user(&tx, &update, at)?;
            let session = upsert_session(&tx, user.id, &update, at)?;
            // A concurrent winner may own the session; report its identity.
            let user = if session.user_id == user.id {
                user
            } else {
                warn!(
                    session_id = session.id,
                    "Session already bound to another identity, keeping existing binding"
                );
                select_user(&tx, session.user_id)?
            };
            let chat = insert_or_get_active_chat(&tx, &session, &update.chat_title_or_default(), at)?;
            tx.commit()?;
            Ok(ResolvedContext {
                user,
                session,
                chat,
            })
        })
        .await
    }

    async fn record_message(
        &self,
        chat: &Chat,
        message: &NewMessage,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let chat_id = chat.id;
        let user_id = chat.user_id;
        let role = message.role.as_str();
        let status = message.status.clone();
        let content = message.content.clone();
        let metadata = serde_json::to_string(&message.metadata)?;
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO messages (chat_id, user_id, role, status, content, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![chat_id, user_id, role, status, content, metadata, at],
            )?;
            conn.execute(
                "UPDATE chats SET last_message_at = ?2 WHERE id = ?1",
                params![chat_id, at],
            )?;
            Ok(())
        })
        .await
    }

    async fn latest_structured_data(
        &self,
        chat_id: i64,
    ) -> Result<Option<serde_json::Value>, StorageError> {
        let raw: Option<String> = self
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT json_extract(metadata, '$.structuredData') FROM messages
                         WHERE chat_id = ?1 AND role = 'assistant'
                           AND json_type(metadata, '$.structuredData') IN ('object', 'array')
                         ORDER BY id DESC LIMIT 1",
                        params![chat_id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;
        raw.map(|s| serde_json::from_str(&s).map_err(StorageError::from))
            .transpose()
    }

    async fn check_connection(&self) -> Result<(), StorageError> {
        self.call(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    async fn close(&self) {
        let conn = Arc::clone(&self.conn);
        let closed = tokio::task::spawn_blocking(move || {
            let taken = match conn.lock() {
                Ok(mut guard) => guard.take(),
                Err(_) => None,
            };
            if let Some(conn) = taken {
                if let Err((_, e)) = conn.close() {
                    warn!(error = %e, "SQLite close reported an error");
                }
            }
        })
        .await;
        match closed {
            Ok(()) => info!("SQLite store closed"),
            Err(e) => warn!(error = %e, "SQLite close task failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageRole;
    use serde_json::json;

    fn update(user_id: i64) -> PlatformUpdate {
        PlatformUpdate {
            platform: Platform::Telegram,
            platform_user_id: user_id,
            username: Some(format!("user{user_id}")),
            first_name: "Alice".to_string(),
            last_name: Some("Doe".to_string()),
            language_code: Some("en".to_string()),
            is_premium: false,
            chat_id: user_id,
            chat_type: "private".to_string(),
            chat_title: None,
        }
    }

    #[tokio::test]
    async fn bundle_creates_all_three_rows() -> Result<(), StorageError> {
        let store = SqliteStore::open_in_memory()?;
        let ctx = store.create_identity_bundle(&update(7), Utc::now()).await?;

        assert_eq!(ctx.user.username, "telegram_7");
        assert_eq!(ctx.session.platform_username.as_deref(), Some("user7"));
        assert_eq!(ctx.user.nicename, "Alice Doe");
        assert_eq!(ctx.session.user_id, ctx.user.id);
        assert_eq!(ctx.chat.session_id, ctx.session.id);
        assert_eq!(ctx.chat.status, ChatStatus::Active);
        Ok(())
    }

    #[tokio::test]
    async fn bundle_twice_converges_on_same_rows() -> Result<(), StorageError> {
        let store = SqliteStore::open_in_memory()?;
        let first = store.create_identity_bundle(&update(7), Utc::now()).await?;
        let second = store.create_identity_bundle(&update(7), Utc::now()).await?;

        assert_eq!(first.user.id, second.user.id);
        assert_eq!(first.session.id, second.session.id);
        assert_eq!(first.chat.id, second.chat.id);
        assert_eq!(store.count_chats(first.session.id, ChatStatus::Active).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn create_chat_reuses_existing_active_chat() -> Result<(), StorageError> {
        let store = SqliteStore::open_in_memory()?;
        let ctx = store.create_identity_bundle(&update(9), Utc::now()).await?;

        let again = store.create_chat(&ctx.session, "other", Utc::now()).await?;
        assert_eq!(again.id, ctx.chat.id);

        store.archive_chat(ctx.chat.id).await?;
        let fresh = store.create_chat(&ctx.session, "fresh", Utc::now()).await?;
        assert_ne!(fresh.id, ctx.chat.id);
        assert_eq!(fresh.title, "fresh");
        assert_eq!(store.count_chats(ctx.session.id, ChatStatus::Active).await?, 1);
        assert_eq!(store.count_chats(ctx.session.id, ChatStatus::Archived).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn touch_session_refreshes_profile() -> Result<(), StorageError> {
        let store = SqliteStore::open_in_memory()?;
        let ctx = store.create_identity_bundle(&update(3), Utc::now()).await?;

        let mut changed = update(3);
        changed.first_name = "Alicia".to_string();
        changed.language_code = Some("es".to_string());
        changed.is_premium = true;

        let (user, session) = store.touch_session(ctx.session.id, &changed, Utc::now()).await?;
        assert_eq!(user.id, ctx.user.id);
        assert_eq!(user.firstname, "Alicia");
        assert_eq!(user.language.as_deref(), Some("es"));
        assert!(session.is_premium);
        assert_eq!(session.first_name, "Alicia");
        Ok(())
    }

    #[tokio::test]
    async fn latest_structured_data_skips_plain_answers() -> Result<(), StorageError> {
        let store = SqliteStore::open_in_memory()?;
        let ctx = store.create_identity_bundle(&update(5), Utc::now()).await?;
        assert!(store.latest_structured_data(ctx.chat.id).await?.is_none());

        let with_data = NewMessage {
            role: MessageRole::Assistant,
            status: "completed".to_string(),
            content: "Here".to_string(),
            metadata: json!({ "structuredData": { "token": { "symbol": "SOL" } } }),
        };
        let plain = NewMessage {
            role: MessageRole::Assistant,
            status: "completed".to_string(),
            content: "Hi".to_string(),
            metadata: json!({}),
        };
        store.record_message(&ctx.chat, &with_data, Utc::now()).await?;
        store.record_message(&ctx.chat, &plain, Utc::now()).await?;

        let data = store.latest_structured_data(ctx.chat.id).await?;
        assert_eq!(data, Some(json!({ "token": { "symbol": "SOL" } })));
        Ok(())
    }

    #[tokio::test]
    async fn closed_store_rejects_calls() -> Result<(), StorageError> {
        let store = SqliteStore::open_in_memory()?;
        store.check_connection().await?;
        store.close().await;
        assert!(matches!(
            store.check_connection().await,
            Err(StorageError::Closed)
        ));
        Ok(())
    }
}
