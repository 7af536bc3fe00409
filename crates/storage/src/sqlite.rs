//! SQLite storage backend.
//!
//! Uses a single SQLite database file with four tables:
//! - `users` — accounts
//! - `companions` — personas, FK to users
//! - `messages` — chat turns, FK to companions with `ON DELETE CASCADE`
//! - `knowledge_files` — uploaded documents, FK to companions with cascade
//!
//! Messages carry an integer rowid alias (`iid`) so same-timestamp turns
//! still replay in insertion order.

use async_trait::async_trait;
use chrono::Utc;
use kindred_core::companion::{Companion, CompanionUpdate, NewCompanion};
use kindred_core::error::StorageError;
use kindred_core::knowledge::{FileStatus, KnowledgeFile, NewKnowledgeFile};
use kindred_core::message::{ChatMessage, MessageOrder, NewMessage, Role};
use kindred_core::storage::Storage;
use kindred_core::user::{NewUser, User};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// A production SQLite store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store from a connection string or file path.
    ///
    /// The database and all tables/indexes are created automatically.
    pub async fn new(path: &str) -> Result<Self, StorageError> {
        Self::with_max_connections(path, 4).await
    }

    /// An in-process ephemeral database. Single connection, so every query
    /// sees the same `:memory:` instance — useful for tests.
    pub async fn in_memory() -> Result<Self, StorageError> {
        Self::with_max_connections(":memory:", 1).await
    }

    async fn with_max_connections(path: &str, max: u32) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StorageError::Connection(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(max)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Run schema migrations — creates tables and indexes.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id              TEXT PRIMARY KEY,
                email           TEXT UNIQUE NOT NULL,
                hashed_password TEXT NOT NULL,
                nickname        TEXT,
                avatar_url      TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("users table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS companions (
                id           TEXT PRIMARY KEY,
                owner_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name         TEXT NOT NULL,
                description  TEXT NOT NULL,
                instructions TEXT NOT NULL,
                seed         TEXT NOT NULL,
                avatar_url   TEXT,
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("companions table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_companions_owner ON companions(owner_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::MigrationFailed(format!("companions index: {e}")))?;

        // iid keeps same-timestamp messages in insertion order on replay.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                iid          INTEGER PRIMARY KEY AUTOINCREMENT,
                id           TEXT UNIQUE NOT NULL,
                companion_id TEXT NOT NULL REFERENCES companions(id) ON DELETE CASCADE,
                user_id      TEXT NOT NULL REFERENCES users(id),
                role         TEXT NOT NULL,
                content      TEXT NOT NULL,
                created_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_scope
             ON messages(companion_id, user_id, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("messages index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS knowledge_files (
                id            TEXT PRIMARY KEY,
                companion_id  TEXT NOT NULL REFERENCES companions(id) ON DELETE CASCADE,
                file_name     TEXT NOT NULL,
                file_path     TEXT NOT NULL,
                status        TEXT NOT NULL DEFAULT 'UPLOADED',
                error_message TEXT,
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("knowledge_files table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_knowledge_files_companion
             ON knowledge_files(companion_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("knowledge_files index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn parse_uuid(raw: &str, column: &str) -> Result<Uuid, StorageError> {
        Uuid::parse_str(raw)
            .map_err(|e| StorageError::QueryFailed(format!("{column} column: {e}")))
    }

    fn parse_timestamp(raw: &str) -> chrono::DateTime<Utc> {
        chrono::DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, StorageError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StorageError::QueryFailed(format!("id column: {e}")))?;
        let email: String = row
            .try_get("email")
            .map_err(|e| StorageError::QueryFailed(format!("email column: {e}")))?;
        let hashed_password: String = row
            .try_get("hashed_password")
            .map_err(|e| StorageError::QueryFailed(format!("hashed_password column: {e}")))?;
        let nickname: Option<String> = row
            .try_get("nickname")
            .map_err(|e| StorageError::QueryFailed(format!("nickname column: {e}")))?;
        let avatar_url: Option<String> = row
            .try_get("avatar_url")
            .map_err(|e| StorageError::QueryFailed(format!("avatar_url column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StorageError::QueryFailed(format!("created_at column: {e}")))?;
        let updated_at: String = row
            .try_get("updated_at")
            .map_err(|e| StorageError::QueryFailed(format!("updated_at column: {e}")))?;

        Ok(User {
            id: Self::parse_uuid(&id, "id")?,
            email,
            hashed_password,
            nickname,
            avatar_url,
            created_at: Self::parse_timestamp(&created_at),
            updated_at: Self::parse_timestamp(&updated_at),
        })
    }

    fn row_to_companion(row: &sqlx::sqlite::SqliteRow) -> Result<Companion, StorageError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StorageError::QueryFailed(format!("id column: {e}")))?;
        let owner_id: String = row
            .try_get("owner_id")
            .map_err(|e| StorageError::QueryFailed(format!("owner_id column: {e}")))?;
        let name: String = row
            .try_get("name")
            .map_err(|e| StorageError::QueryFailed(format!("name column: {e}")))?;
        let description: String = row
            .try_get("description")
            .map_err(|e| StorageError::QueryFailed(format!("description column: {e}")))?;
        let instructions: String = row
            .try_get("instructions")
            .map_err(|e| StorageError::QueryFailed(format!("instructions column: {e}")))?;
        let seed: String = row
            .try_get("seed")
            .map_err(|e| StorageError::QueryFailed(format!("seed column: {e}")))?;
        let avatar_url: Option<String> = row
            .try_get("avatar_url")
            .map_err(|e| StorageError::QueryFailed(format!("avatar_url column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StorageError::QueryFailed(format!("created_at column: {e}")))?;
        let updated_at: String = row
            .try_get("updated_at")
            .map_err(|e| StorageError::QueryFailed(format!("updated_at column: {e}")))?;

        Ok(Companion {
            id: Self::parse_uuid(&id, "id")?,
            owner_id: Self::parse_uuid(&owner_id, "owner_id")?,
            name,
            description,
            instructions,
            seed,
            avatar_url,
            created_at: Self::parse_timestamp(&created_at),
            updated_at: Self::parse_timestamp(&updated_at),
        })
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<ChatMessage, StorageError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StorageError::QueryFailed(format!("id column: {e}")))?;
        let companion_id: String = row
            .try_get("companion_id")
            .map_err(|e| StorageError::QueryFailed(format!("companion_id column: {e}")))?;
        let user_id: String = row
            .try_get("user_id")
            .map_err(|e| StorageError::QueryFailed(format!("user_id column: {e}")))?;
        let role: String = row
            .try_get("role")
            .map_err(|e| StorageError::QueryFailed(format!("role column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| StorageError::QueryFailed(format!("content column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StorageError::QueryFailed(format!("created_at column: {e}")))?;

        Ok(ChatMessage {
            id: Self::parse_uuid(&id, "id")?,
            companion_id: Self::parse_uuid(&companion_id, "companion_id")?,
            user_id: Self::parse_uuid(&user_id, "user_id")?,
            role: Role::parse(&role)
                .ok_or_else(|| StorageError::QueryFailed(format!("unknown role '{role}'")))?,
            content,
            created_at: Self::parse_timestamp(&created_at),
        })
    }

    fn row_to_knowledge_file(row: &sqlx::sqlite::SqliteRow) -> Result<KnowledgeFile, StorageError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StorageError::QueryFailed(format!("id column: {e}")))?;
        let companion_id: String = row
            .try_get("companion_id")
            .map_err(|e| StorageError::QueryFailed(format!("companion_id column: {e}")))?;
        let file_name: String = row
            .try_get("file_name")
            .map_err(|e| StorageError::QueryFailed(format!("file_name column: {e}")))?;
        let file_path: String = row
            .try_get("file_path")
            .map_err(|e| StorageError::QueryFailed(format!("file_path column: {e}")))?;
        let status: String = row
            .try_get("status")
            .map_err(|e| StorageError::QueryFailed(format!("status column: {e}")))?;
        let error_message: Option<String> = row
            .try_get("error_message")
            .map_err(|e| StorageError::QueryFailed(format!("error_message column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StorageError::QueryFailed(format!("created_at column: {e}")))?;
        let updated_at: String = row
            .try_get("updated_at")
            .map_err(|e| StorageError::QueryFailed(format!("updated_at column: {e}")))?;

        Ok(KnowledgeFile {
            id: Self::parse_uuid(&id, "id")?,
            companion_id: Self::parse_uuid(&companion_id, "companion_id")?,
            file_name,
            file_path,
            status: FileStatus::parse(&status)
                .ok_or_else(|| StorageError::QueryFailed(format!("unknown status '{status}'")))?,
            error_message,
            created_at: Self::parse_timestamp(&created_at),
            updated_at: Self::parse_timestamp(&updated_at),
        })
    }
}

#[async_trait]
impl Storage for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    // --- Users ---

    async fn create_user(&self, user: NewUser) -> Result<User, StorageError> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO users (id, email, hashed_password, nickname, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
        )
        .bind(id.to_string())
        .bind(&user.email)
        .bind(&user.hashed_password)
        .bind(&user.nickname)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("insert user: {e}")))?;

        self.get_user(id)
            .await?
            .ok_or_else(|| StorageError::QueryFailed("inserted user missing".into()))
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StorageError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("get user: {e}")))?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("get user by email: {e}")))?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    // --- Companions ---

    async fn create_companion(
        &self,
        owner_id: Uuid,
        companion: NewCompanion,
    ) -> Result<Companion, StorageError> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO companions
                (id, owner_id, name, description, instructions, seed, avatar_url,
                 created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            "#,
        )
        .bind(id.to_string())
        .bind(owner_id.to_string())
        .bind(&companion.name)
        .bind(&companion.description)
        .bind(&companion.instructions)
        .bind(&companion.seed)
        .bind(&companion.avatar_url)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("insert companion: {e}")))?;

        self.get_companion(id)
            .await?
            .ok_or_else(|| StorageError::QueryFailed("inserted companion missing".into()))
    }

    async fn get_companion(&self, id: Uuid) -> Result<Option<Companion>, StorageError> {
        let row = sqlx::query("SELECT * FROM companions WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("get companion: {e}")))?;

        row.as_ref().map(Self::row_to_companion).transpose()
    }

    async fn list_companions_by_owner(
        &self,
        owner_id: Uuid,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<Companion>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM companions WHERE owner_id = ?1
             ORDER BY created_at ASC LIMIT ?2 OFFSET ?3",
        )
        .bind(owner_id.to_string())
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("list companions: {e}")))?;

        rows.iter().map(Self::row_to_companion).collect()
    }

    async fn update_companion(
        &self,
        id: Uuid,
        update: CompanionUpdate,
    ) -> Result<Option<Companion>, StorageError> {
        let Some(mut companion) = self.get_companion(id).await? else {
            return Ok(None);
        };

        if let Some(name) = update.name {
            companion.name = name;
        }
        if let Some(description) = update.description {
            companion.description = description;
        }
        if let Some(instructions) = update.instructions {
            companion.instructions = instructions;
        }
        if let Some(seed) = update.seed {
            companion.seed = seed;
        }
        if let Some(avatar_url) = update.avatar_url {
            companion.avatar_url = Some(avatar_url);
        }

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            UPDATE companions
            SET name = ?2, description = ?3, instructions = ?4, seed = ?5,
                avatar_url = ?6, updated_at = ?7
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(&companion.name)
        .bind(&companion.description)
        .bind(&companion.instructions)
        .bind(&companion.seed)
        .bind(&companion.avatar_url)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("update companion: {e}")))?;

        self.get_companion(id).await
    }

    async fn delete_companion(&self, id: Uuid) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM companions WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("delete companion: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    // --- Messages ---

    async fn create_message(&self, message: NewMessage) -> Result<ChatMessage, StorageError> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO messages (id, companion_id, user_id, role, content, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(id.to_string())
        .bind(message.companion_id.to_string())
        .bind(message.user_id.to_string())
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("insert message: {e}")))?;

        Ok(ChatMessage {
            id,
            companion_id: message.companion_id,
            user_id: message.user_id,
            role: message.role,
            content: message.content,
            created_at,
        })
    }

    async fn list_messages(
        &self,
        companion_id: Uuid,
        user_id: Uuid,
        order: MessageOrder,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, StorageError> {
        let sql = match order {
            MessageOrder::OldestFirst => {
                "SELECT * FROM messages
                 WHERE companion_id = ?1 AND user_id = ?2
                 ORDER BY created_at ASC, iid ASC LIMIT ?3 OFFSET ?4"
            }
            MessageOrder::NewestFirst => {
                "SELECT * FROM messages
                 WHERE companion_id = ?1 AND user_id = ?2
                 ORDER BY created_at DESC, iid DESC LIMIT ?3 OFFSET ?4"
            }
        };

        let rows = sqlx::query(sql)
            .bind(companion_id.to_string())
            .bind(user_id.to_string())
            .bind(limit)
            .bind(skip)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("list messages: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    // --- Knowledge files ---

    async fn create_knowledge_file(
        &self,
        file: NewKnowledgeFile,
    ) -> Result<KnowledgeFile, StorageError> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO knowledge_files
                (id, companion_id, file_name, file_path, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            "#,
        )
        .bind(file.id.to_string())
        .bind(file.companion_id.to_string())
        .bind(&file.file_name)
        .bind(&file.file_path)
        .bind(FileStatus::Uploaded.as_str())
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("insert knowledge file: {e}")))?;

        self.get_knowledge_file(file.id)
            .await?
            .ok_or_else(|| StorageError::QueryFailed("inserted knowledge file missing".into()))
    }

    async fn get_knowledge_file(&self, id: Uuid) -> Result<Option<KnowledgeFile>, StorageError> {
        let row = sqlx::query("SELECT * FROM knowledge_files WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("get knowledge file: {e}")))?;

        row.as_ref().map(Self::row_to_knowledge_file).transpose()
    }

    async fn list_knowledge_files(
        &self,
        companion_id: Uuid,
    ) -> Result<Vec<KnowledgeFile>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM knowledge_files WHERE companion_id = ?1 ORDER BY created_at ASC",
        )
        .bind(companion_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("list knowledge files: {e}")))?;

        rows.iter().map(Self::row_to_knowledge_file).collect()
    }

    async fn update_file_status(
        &self,
        id: Uuid,
        status: FileStatus,
        error_message: Option<&str>,
    ) -> Result<Option<KnowledgeFile>, StorageError> {
        let Some(current) = self.get_knowledge_file(id).await? else {
            return Ok(None);
        };

        if !current.status.can_transition_to(status) {
            return Err(StorageError::InvalidTransition {
                from: current.status.to_string(),
                to: status.to_string(),
            });
        }

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE knowledge_files SET status = ?2, error_message = ?3, updated_at = ?4
             WHERE id = ?1",
        )
        .bind(id.to_string())
        .bind(status.as_str())
        .bind(error_message)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("update file status: {e}")))?;

        self.get_knowledge_file(id).await
    }

    async fn delete_knowledge_file(&self, id: Uuid) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM knowledge_files WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("delete knowledge file: {e}")))?;

        Ok(result.rows_affected() > 0)
    }
}
