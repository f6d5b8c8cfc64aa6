use std::fmt::{Display, Formatter};
use std::str::FromStr;

use rusqlite::{Result as SqlResult, Row};
use serde::{Deserialize, Serialize};

/// Remote mailbox partition a message was imported from. Each variant maps to
/// its own table: inbox rows land in `emails`, sent rows in `sent_emails`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mailbox {
    Inbox,
    Sent,
}

impl Display for Mailbox {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inbox => write!(f, "inbox"),
            Self::Sent => write!(f, "sent"),
        }
    }
}

impl FromStr for Mailbox {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inbox" => Ok(Self::Inbox),
            "sent" => Ok(Self::Sent),
            other => Err(format!("invalid mailbox: {other}")),
        }
    }
}

/// Local dashboard account. Imports are always keyed on `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub created_at: Option<String>,
}

/// Row in the `emails` table. Unique on (gmail_id, user_id); `is_read` and
/// `is_visible` are mutated by the read/archive operations, never by sync.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InboxMessage {
    pub gmail_id: String,
    pub user_id: i64,
    pub subject: String,
    pub sender_name: String,
    pub sender_email: String,
    pub body: String,
    pub received_at: String,
    pub is_read: bool,
    pub has_attachments: bool,
    pub is_visible: bool,
}

/// Row in the `sent_emails` table. Unique on (gmail_id, sender_id).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentMessage {
    pub gmail_id: String,
    pub sender_id: i64,
    pub subject: String,
    pub recipient_name: String,
    pub recipient_email: String,
    pub body: String,
    pub sent_at: String,
}

impl User {
    pub fn from_row(row: &Row<'_>) -> SqlResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            email: row.get("email")?,
            name: row.get("name")?,
            avatar_url: row.get("avatar_url")?,
            created_at: row.get("created_at")?,
        })
    }
}

impl InboxMessage {
    pub fn from_row(row: &Row<'_>) -> SqlResult<Self> {
        Ok(Self {
            gmail_id: row.get("gmail_id")?,
            user_id: row.get("user_id")?,
            subject: row.get("subject")?,
            sender_name: row.get("sender_name")?,
            sender_email: row.get("sender_email")?,
            body: row.get("body")?,
            received_at: row.get("received_at")?,
            is_read: row.get("is_read")?,
            has_attachments: row.get("has_attachments")?,
            is_visible: row.get("is_visible")?,
        })
    }
}

impl SentMessage {
    pub fn from_row(row: &Row<'_>) -> SqlResult<Self> {
        Ok(Self {
            gmail_id: row.get("gmail_id")?,
            sender_id: row.get("sender_id")?,
            subject: row.get("subject")?,
            recipient_name: row.get("recipient_name")?,
            recipient_email: row.get("recipient_email")?,
            body: row.get("body")?,
            sent_at: row.get("sent_at")?,
        })
    }
}
