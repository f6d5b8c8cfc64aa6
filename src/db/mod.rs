use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use thiserror::Error;

use self::models::{InboxMessage, Mailbox, SentMessage, User};

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("filesystem: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Config(String),
}

pub mod migrations;
pub mod models;
pub mod schema;

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub total_users: i64,
    pub total_inbox: i64,
    pub total_sent: i64,
}

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        let mut db = Self {
            conn,
            path: path.to_path_buf(),
        };
        db.initialize()?;
        Ok(db)
    }

    pub fn initialize(&mut self) -> Result<(), DbError> {
        migrations::migrate(&self.conn)
            .map_err(|e| DbError::Config(format!("migration failed: {e}")))
    }

    pub fn default_db_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir()
            .ok_or_else(|| DbError::Config("failed to determine home directory".to_string()))?;
        Ok(home.join(".maildeck").join("maildeck.db"))
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert-or-update a local account keyed on email; returns the user id.
    pub fn upsert_user(
        &self,
        email: &str,
        name: &str,
        avatar_url: Option<&str>,
    ) -> Result<i64, DbError> {
        self.conn.execute(
            r#"
            INSERT INTO users (email, name, avatar_url)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(email) DO UPDATE SET
                name = excluded.name,
                avatar_url = COALESCE(excluded.avatar_url, users.avatar_url),
                updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
            "#,
            params![email, name, avatar_url],
        )?;

        let id = self
            .conn
            .query_row("SELECT id FROM users WHERE email = ?1", [email], |row| {
                row.get(0)
            })?;
        Ok(id)
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>, DbError> {
        let user = self
            .conn
            .query_row(
                "SELECT id, email, name, avatar_url, created_at FROM users WHERE id = ?1",
                [id],
                User::from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn list_users(&self) -> Result<Vec<User>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, email, name, avatar_url, created_at FROM users ORDER BY email ASC",
        )?;
        let users = stmt
            .query_map([], User::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// Existence check the sync engine uses to skip already-imported messages.
    pub fn message_exists(
        &self,
        mailbox: Mailbox,
        gmail_id: &str,
        owner_id: i64,
    ) -> Result<bool, DbError> {
        let sql = match mailbox {
            Mailbox::Inbox => "SELECT 1 FROM emails WHERE gmail_id = ?1 AND user_id = ?2 LIMIT 1",
            Mailbox::Sent => {
                "SELECT 1 FROM sent_emails WHERE gmail_id = ?1 AND sender_id = ?2 LIMIT 1"
            }
        };
        let found: Option<i64> = self
            .conn
            .query_row(sql, params![gmail_id, owner_id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// Idempotent insert: a row with the same (gmail_id, user_id) already present
    /// leaves the table untouched and is not an error. Concurrent sync runs rely
    /// on this, not on the preceding existence check.
    pub fn insert_inbox_message(&self, message: &InboxMessage) -> Result<(), DbError> {
        self.conn.execute(
            r#"
            INSERT INTO emails (
                gmail_id, user_id, subject, sender_name, sender_email, body,
                received_at, is_read, has_attachments, is_visible
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(gmail_id, user_id) DO NOTHING
            "#,
            params![
                message.gmail_id,
                message.user_id,
                message.subject,
                message.sender_name,
                message.sender_email,
                message.body,
                message.received_at,
                message.is_read,
                message.has_attachments,
                message.is_visible,
            ],
        )?;
        Ok(())
    }

    /// Idempotent insert for the sent table, keyed on (gmail_id, sender_id).
    pub fn insert_sent_message(&self, message: &SentMessage) -> Result<(), DbError> {
        self.conn.execute(
            r#"
            INSERT INTO sent_emails (
                gmail_id, sender_id, subject, recipient_name, recipient_email, body, sent_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(gmail_id, sender_id) DO NOTHING
            "#,
            params![
                message.gmail_id,
                message.sender_id,
                message.subject,
                message.recipient_name,
                message.recipient_email,
                message.body,
                message.sent_at,
            ],
        )?;
        Ok(())
    }

    pub fn list_inbox(&self, user_id: i64, limit: usize) -> Result<Vec<InboxMessage>, DbError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT gmail_id, user_id, subject, sender_name, sender_email, body,
                   received_at, is_read, has_attachments, is_visible
            FROM emails
            WHERE user_id = ?1 AND is_visible = true
            ORDER BY received_at DESC
            LIMIT ?2
            "#,
        )?;
        let messages = stmt
            .query_map(params![user_id, limit as i64], InboxMessage::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    pub fn list_sent(&self, sender_id: i64, limit: usize) -> Result<Vec<SentMessage>, DbError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT gmail_id, sender_id, subject, recipient_name, recipient_email, body, sent_at
            FROM sent_emails
            WHERE sender_id = ?1
            ORDER BY sent_at DESC
            LIMIT ?2
            "#,
        )?;
        let messages = stmt
            .query_map(params![sender_id, limit as i64], SentMessage::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    pub fn get_inbox_message(
        &self,
        gmail_id: &str,
        user_id: i64,
    ) -> Result<Option<InboxMessage>, DbError> {
        let message = self
            .conn
            .query_row(
                r#"
                SELECT gmail_id, user_id, subject, sender_name, sender_email, body,
                       received_at, is_read, has_attachments, is_visible
                FROM emails
                WHERE gmail_id = ?1 AND user_id = ?2
                "#,
                params![gmail_id, user_id],
                InboxMessage::from_row,
            )
            .optional()?;
        Ok(message)
    }

    pub fn get_sent_message(
        &self,
        gmail_id: &str,
        sender_id: i64,
    ) -> Result<Option<SentMessage>, DbError> {
        let message = self
            .conn
            .query_row(
                r#"
                SELECT gmail_id, sender_id, subject, recipient_name, recipient_email, body, sent_at
                FROM sent_emails
                WHERE gmail_id = ?1 AND sender_id = ?2
                "#,
                params![gmail_id, sender_id],
                SentMessage::from_row,
            )
            .optional()?;
        Ok(message)
    }

    /// Returns the number of rows updated (0 when the message is unknown).
    pub fn mark_inbox_read(&self, gmail_id: &str, user_id: i64) -> Result<usize, DbError> {
        let updated = self.conn.execute(
            "UPDATE emails SET is_read = true WHERE gmail_id = ?1 AND user_id = ?2",
            params![gmail_id, user_id],
        )?;
        Ok(updated)
    }

    /// Soft delete: the row stays in place so a later sync still sees it and
    /// does not re-import the message.
    pub fn hide_inbox_message(&self, gmail_id: &str, user_id: i64) -> Result<usize, DbError> {
        let updated = self.conn.execute(
            "UPDATE emails SET is_visible = false WHERE gmail_id = ?1 AND user_id = ?2",
            params![gmail_id, user_id],
        )?;
        Ok(updated)
    }

    pub fn get_stats(&self) -> Result<DatabaseStats, DbError> {
        let total_users: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        let total_inbox: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM emails", [], |row| row.get(0))?;
        let total_sent: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM sent_emails", [], |row| row.get(0))?;

        Ok(DatabaseStats {
            total_users,
            total_inbox,
            total_sent,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use uuid::Uuid;

    use super::models::{InboxMessage, Mailbox};
    use super::Database;

    fn temp_db_path() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("maildeck-db-test-{}.db", Uuid::new_v4()));
        path
    }

    fn inbox_message(gmail_id: &str, user_id: i64) -> InboxMessage {
        InboxMessage {
            gmail_id: gmail_id.to_string(),
            user_id,
            subject: "Kickoff".to_string(),
            sender_name: "Alice".to_string(),
            sender_email: "alice@example.com".to_string(),
            body: "See you tomorrow".to_string(),
            received_at: "2026-02-01T12:00:00+00:00".to_string(),
            is_read: false,
            has_attachments: false,
            is_visible: true,
        }
    }

    #[test]
    fn insert_is_idempotent_on_duplicate_key() {
        let path = temp_db_path();
        let db = Database::open(&path).expect("open db");
        let user_id = db
            .upsert_user("owner@example.com", "Owner", None)
            .expect("upsert user");

        let original = inbox_message("msg-1", user_id);
        db.insert_inbox_message(&original).expect("first insert");

        let mut duplicate = original.clone();
        duplicate.subject = "Overwritten subject".to_string();
        db.insert_inbox_message(&duplicate)
            .expect("duplicate insert is a no-op");

        let stored = db
            .get_inbox_message("msg-1", user_id)
            .expect("get message")
            .expect("message exists");
        assert_eq!(stored.subject, "Kickoff");

        let listed = db.list_inbox(user_id, 50).expect("list inbox");
        assert_eq!(listed.len(), 1);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn message_exists_is_scoped_per_mailbox_and_owner() {
        let path = temp_db_path();
        let db = Database::open(&path).expect("open db");
        let user_id = db
            .upsert_user("owner@example.com", "Owner", None)
            .expect("upsert user");
        let other_id = db
            .upsert_user("other@example.com", "Other", None)
            .expect("upsert other user");

        db.insert_inbox_message(&inbox_message("msg-1", user_id))
            .expect("insert");

        assert!(db
            .message_exists(Mailbox::Inbox, "msg-1", user_id)
            .expect("exists check"));
        assert!(!db
            .message_exists(Mailbox::Inbox, "msg-1", other_id)
            .expect("other owner check"));
        assert!(!db
            .message_exists(Mailbox::Sent, "msg-1", user_id)
            .expect("sent table check"));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn upsert_user_keeps_id_stable() {
        let path = temp_db_path();
        let db = Database::open(&path).expect("open db");

        let first = db
            .upsert_user("owner@example.com", "Owner", None)
            .expect("first upsert");
        let second = db
            .upsert_user("owner@example.com", "Renamed Owner", Some("http://a/p.png"))
            .expect("second upsert");

        assert_eq!(first, second);
        let user = db
            .get_user(first)
            .expect("get user")
            .expect("user exists");
        assert_eq!(user.name, "Renamed Owner");
        assert_eq!(db.list_users().expect("list users").len(), 1);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn hidden_messages_are_filtered_from_listing() {
        let path = temp_db_path();
        let db = Database::open(&path).expect("open db");
        let user_id = db
            .upsert_user("owner@example.com", "Owner", None)
            .expect("upsert user");

        db.insert_inbox_message(&inbox_message("msg-1", user_id))
            .expect("insert");
        db.insert_inbox_message(&inbox_message("msg-2", user_id))
            .expect("insert");

        let hidden = db
            .hide_inbox_message("msg-1", user_id)
            .expect("hide message");
        assert_eq!(hidden, 1);

        let listed = db.list_inbox(user_id, 50).expect("list inbox");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].gmail_id, "msg-2");

        // The hidden row must still block re-import.
        assert!(db
            .message_exists(Mailbox::Inbox, "msg-1", user_id)
            .expect("exists check"));
        let _ = std::fs::remove_file(path);
    }
}
