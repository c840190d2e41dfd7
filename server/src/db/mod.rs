/// Database layer for persistent storage.
/// Handles all database operations for users, direct messages, and reports.

pub mod init;
pub mod models;

use chrono::{DateTime, Duration, Utc};
use models::{ConversationSummary, Message, Report, User};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::Arc;
use tokio::sync::Mutex;

pub type DbPool = Arc<Mutex<Connection>>;

/// A user counts as online if they made an authenticated request this recently
pub const ONLINE_WINDOW_SECONDS: i64 = 300;

/// Maximum number of users returned by a search
pub const SEARCH_LIMIT: i64 = 20;

const USER_COLUMNS: &str = "id, name, email, role, is_active, last_seen_at, created_at";
const MESSAGE_COLUMNS: &str = "id, sender_id, recipient_id, content, created_at, is_read";

/// Create a connection pool (simplified for single-threaded SQLite)
pub fn create_pool(db_path: &str) -> SqliteResult<DbPool> {
    let conn = Connection::open(db_path)?;
    init::initialize_database(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Create an in-memory database for testing
#[cfg(any(test, feature = "test_utils"))]
pub fn create_test_pool() -> DbPool {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory DB");
    init::initialize_database(&conn).expect("Failed to initialize DB");
    Arc::new(Mutex::new(conn))
}

fn user_from_row(row: &Row<'_>) -> SqliteResult<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role: row.get(3)?,
        is_active: row.get(4)?,
        last_seen_at: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn message_from_row(row: &Row<'_>) -> SqliteResult<Message> {
    Ok(Message {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        recipient_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        is_read: row.get(5)?,
    })
}

fn is_online(user: &User, now: DateTime<Utc>) -> bool {
    if !user.is_active {
        return false;
    }
    user.last_seen_at
        .as_deref()
        .and_then(|seen| DateTime::parse_from_rfc3339(seen).ok())
        .map(|seen| now - seen.with_timezone(&Utc) <= Duration::seconds(ONLINE_WINDOW_SECONDS))
        .unwrap_or(false)
}

/// Database operations
pub struct Database;

impl Database {
    /// Register a new user, optionally with a caller-chosen id
    pub async fn register_user(
        pool: &DbPool,
        id: Option<i64>,
        name: &str,
        email: &str,
        role: &str,
    ) -> SqliteResult<User> {
        let conn = pool.lock().await;
        let created_at = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO users (id, name, email, role, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, name, email, role, &created_at],
        )?;
        let user_id = conn.last_insert_rowid();

        let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
        conn.query_row(&sql, params![user_id], user_from_row)
    }

    /// Get user by ID
    pub async fn get_user(pool: &DbPool, user_id: i64) -> SqliteResult<Option<User>> {
        let conn = pool.lock().await;
        let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
        conn.query_row(&sql, params![user_id], user_from_row).optional()
    }

    /// Record that a user just made a request (drives the online flag)
    pub async fn touch_user(pool: &DbPool, user_id: i64) -> SqliteResult<()> {
        let conn = pool.lock().await;
        conn.execute(
            "UPDATE users SET last_seen_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), user_id],
        )?;
        Ok(())
    }

    /// Store a direct message
    pub async fn store_message(
        pool: &DbPool,
        sender_id: i64,
        recipient_id: i64,
        content: &str,
    ) -> SqliteResult<Message> {
        let conn = pool.lock().await;
        let created_at = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO messages (sender_id, recipient_id, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![sender_id, recipient_id, content, &created_at],
        )?;
        let message_id = conn.last_insert_rowid();

        let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
        conn.query_row(&sql, params![message_id], message_from_row)
    }

    /// Full history between two users, oldest first
    pub async fn get_thread(pool: &DbPool, me: i64, other: i64) -> SqliteResult<Vec<Message>> {
        let conn = pool.lock().await;
        let sql = format!(
            "SELECT {} FROM messages \
             WHERE (sender_id = ?1 AND recipient_id = ?2) OR (sender_id = ?2 AND recipient_id = ?1) \
             ORDER BY id ASC",
            MESSAGE_COLUMNS
        );

        let mut stmt = conn.prepare(&sql)?;
        let messages = stmt
            .query_map(params![me, other], message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(messages)
    }

    /// Mark everything `other` sent to `me` as read; returns the number of rows touched
    pub async fn mark_thread_read(pool: &DbPool, me: i64, other: i64) -> SqliteResult<usize> {
        let conn = pool.lock().await;
        conn.execute(
            "UPDATE messages SET is_read = 1 WHERE recipient_id = ?1 AND sender_id = ?2 AND is_read = 0",
            params![me, other],
        )
    }

    /// One summary per counterpart the user has exchanged messages with, most recent first
    pub async fn list_conversations(pool: &DbPool, me: i64) -> SqliteResult<Vec<ConversationSummary>> {
        let conn = pool.lock().await;
        let now = Utc::now();

        let mut stmt = conn.prepare(
            "SELECT other_id, MAX(id) AS last_id FROM ( \
                 SELECT CASE WHEN sender_id = ?1 THEN recipient_id ELSE sender_id END AS other_id, id \
                 FROM messages WHERE sender_id = ?1 OR recipient_id = ?1 \
             ) GROUP BY other_id ORDER BY last_id DESC",
        )?;
        let rows = stmt
            .query_map(params![me], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let user_sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
        let message_sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);

        let mut summaries = Vec::with_capacity(rows.len());
        for (other_id, last_id) in rows {
            let other = conn
                .query_row(&user_sql, params![other_id], user_from_row)
                .optional()?;
            let last = conn.query_row(&message_sql, params![last_id], message_from_row)?;
            let unread_count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE recipient_id = ?1 AND sender_id = ?2 AND is_read = 0",
                params![me, other_id],
                |row| row.get(0),
            )?;

            summaries.push(ConversationSummary {
                other_user_id: other_id,
                other_user_name: other
                    .as_ref()
                    .map(|u| u.name.clone())
                    .unwrap_or_else(|| format!("User {}", other_id)),
                last_message: last.content,
                last_message_time: last.created_at,
                unread_count,
                online: other.as_ref().map(|u| is_online(u, now)).unwrap_or(false),
            });
        }

        Ok(summaries)
    }

    /// Case-insensitive name/email search, excluding the caller
    pub async fn search_users(pool: &DbPool, me: i64, query: &str) -> SqliteResult<Vec<User>> {
        let conn = pool.lock().await;
        let pattern = format!("%{}%", query.to_lowercase());
        let sql = format!(
            "SELECT {} FROM users \
             WHERE (LOWER(name) LIKE ?1 OR LOWER(email) LIKE ?1) AND id != ?2 \
             ORDER BY name ASC LIMIT ?3",
            USER_COLUMNS
        );

        let mut stmt = conn.prepare(&sql)?;
        let users = stmt
            .query_map(params![pattern, me, SEARCH_LIMIT], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(users)
    }

    /// Record a report filed by `reporter_id` against `reported_user_id`
    pub async fn store_report(
        pool: &DbPool,
        reporter_id: i64,
        reported_user_id: i64,
        reason: Option<&str>,
    ) -> SqliteResult<Report> {
        let conn = pool.lock().await;
        let created_at = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO reports (reporter_id, reported_user_id, reason, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![reporter_id, reported_user_id, reason, &created_at],
        )?;

        Ok(Report {
            id: conn.last_insert_rowid(),
            reporter_id,
            reported_user_id,
            reason: reason.map(str::to_string),
            created_at,
        })
    }

    /// Number of reports filed against a user
    pub async fn count_reports(pool: &DbPool, reported_user_id: i64) -> SqliteResult<i64> {
        let conn = pool.lock().await;
        conn.query_row(
            "SELECT COUNT(*) FROM reports WHERE reported_user_id = ?1",
            params![reported_user_id],
            |row| row.get(0),
        )
    }
}
