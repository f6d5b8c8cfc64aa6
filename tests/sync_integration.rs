use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use maildeck::db::models::{InboxMessage, Mailbox};
use maildeck::db::Database;
use maildeck::gmail::{GmailMessage, MailSource, MessagePage};
use maildeck::sync::{sync_account, sync_mailbox, DEFAULT_IMPORT_CAP};

fn temp_db_path() -> PathBuf {
    std::env::temp_dir().join(format!("maildeck-sync-it-{}.db", Uuid::new_v4()))
}

fn gmail_message(id: &str, subject: &str, from: &str, unread: bool) -> GmailMessage {
    let labels = if unread {
        json!(["INBOX", "UNREAD"])
    } else {
        json!(["INBOX"])
    };
    serde_json::from_value(json!({
        "id": id,
        "labelIds": labels,
        "internalDate": "1735732800000",
        "payload": {
            "mimeType": "multipart/alternative",
            "headers": [
                { "name": "Subject", "value": subject },
                { "name": "From", "value": from },
                { "name": "To", "value": from },
                { "name": "Date", "value": "Wed, 01 Jan 2026 12:00:00 +0000" }
            ],
            "body": { "size": 0 },
            "parts": [
                { "mimeType": "text/plain", "body": { "data": "aGVsbG8" } }
            ]
        }
    }))
    .expect("build gmail message")
}

/// In-memory stand-in for the Gmail API: serves paginated listings per query
/// and counts detail fetches so tests can assert skips never re-fetch.
struct FakeSource {
    inbox: Vec<GmailMessage>,
    sent: Vec<GmailMessage>,
    fail_detail_for: Option<String>,
    detail_fetches: RefCell<HashMap<String, usize>>,
}

impl FakeSource {
    fn new(inbox: Vec<GmailMessage>, sent: Vec<GmailMessage>) -> Self {
        Self {
            inbox,
            sent,
            fail_detail_for: None,
            detail_fetches: RefCell::new(HashMap::new()),
        }
    }

    fn detail_fetch_count(&self, id: &str) -> usize {
        self.detail_fetches.borrow().get(id).copied().unwrap_or(0)
    }

    fn mailbox_for_query(&self, query: &str) -> &[GmailMessage] {
        match query {
            "in:inbox" => &self.inbox,
            "in:sent" => &self.sent,
            other => panic!("unexpected listing query: {other}"),
        }
    }
}

#[async_trait(?Send)]
impl MailSource for FakeSource {
    async fn list_messages(
        &self,
        _token: &str,
        query: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<MessagePage> {
        let messages = self.mailbox_for_query(query);
        let offset: usize = page_token.map(|t| t.parse().expect("numeric token")).unwrap_or(0);
        let end = (offset + page_size).min(messages.len());
        let ids = messages[offset..end]
            .iter()
            .map(|m| m.id.clone())
            .collect();
        let next_page_token = (end < messages.len()).then(|| end.to_string());
        Ok(MessagePage {
            ids,
            next_page_token,
        })
    }

    async fn get_message(&self, _token: &str, message_id: &str) -> Result<GmailMessage> {
        *self
            .detail_fetches
            .borrow_mut()
            .entry(message_id.to_string())
            .or_insert(0) += 1;

        if self.fail_detail_for.as_deref() == Some(message_id) {
            return Err(anyhow!("simulated transport failure for {message_id}"));
        }

        self.inbox
            .iter()
            .chain(self.sent.iter())
            .find(|m| m.id == message_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown message id: {message_id}"))
    }
}

#[tokio::test]
async fn repeated_sync_imports_each_message_once() {
    let path = temp_db_path();
    let db = Database::open(&path).expect("open db");
    let user_id = db
        .upsert_user("owner@example.com", "Owner", None)
        .expect("upsert user");

    let source = FakeSource::new(
        vec![
            gmail_message("in-1", "First", "Alice <alice@example.com>", true),
            gmail_message("in-2", "Second", "Bob <bob@example.com>", false),
            gmail_message("in-3", "Third", "carol@example.com", false),
        ],
        vec![gmail_message("out-1", "Reply", "Alice <alice@example.com>", false)],
    );

    let first = sync_account(&source, &db, "token", user_id, DEFAULT_IMPORT_CAP)
        .await
        .expect("first sync");
    assert_eq!(first.inbox.imported, 3);
    assert_eq!(first.sent.imported, 1);

    let second = sync_account(&source, &db, "token", user_id, DEFAULT_IMPORT_CAP)
        .await
        .expect("second sync");
    assert_eq!(second.inbox.imported, 0);
    assert_eq!(second.inbox.skipped, 3);
    assert_eq!(second.sent.imported, 0);
    assert_eq!(second.sent.skipped, 1);

    assert_eq!(db.list_inbox(user_id, 50).expect("list inbox").len(), 3);
    assert_eq!(db.list_sent(user_id, 50).expect("list sent").len(), 1);
    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn import_cap_is_respected_across_pages() {
    let path = temp_db_path();
    let db = Database::open(&path).expect("open db");
    let user_id = db
        .upsert_user("owner@example.com", "Owner", None)
        .expect("upsert user");

    // 25 unseen messages, internal page size is 10, so a cap of 15 has to
    // advance pagination past the first page and stop mid-second-page.
    let inbox: Vec<GmailMessage> = (0..25)
        .map(|i| {
            gmail_message(
                &format!("in-{i:02}"),
                &format!("Message {i}"),
                "alice@example.com",
                false,
            )
        })
        .collect();
    let source = FakeSource::new(inbox, vec![]);

    let report = sync_mailbox(&source, &db, "token", user_id, Mailbox::Inbox, 15)
        .await
        .expect("sync inbox");
    assert_eq!(report.imported, 15);

    let stored = db.list_inbox(user_id, 50).expect("list inbox");
    assert_eq!(stored.len(), 15);
    // Listing order: the first 15 ids were imported, nothing beyond the cap.
    assert!(db
        .message_exists(Mailbox::Inbox, "in-14", user_id)
        .expect("exists in-14"));
    assert!(!db
        .message_exists(Mailbox::Inbox, "in-15", user_id)
        .expect("exists in-15"));
    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn preseeded_message_is_skipped_without_refetch_or_mutation() {
    let path = temp_db_path();
    let db = Database::open(&path).expect("open db");
    let user_id = db
        .upsert_user("owner@example.com", "Owner", None)
        .expect("upsert user");

    db.insert_inbox_message(&InboxMessage {
        gmail_id: "in-2".to_string(),
        user_id,
        subject: "Seeded subject".to_string(),
        sender_name: "Seeded".to_string(),
        sender_email: "seeded@example.com".to_string(),
        body: "seeded body".to_string(),
        received_at: "2026-01-15T08:00:00+00:00".to_string(),
        is_read: true,
        has_attachments: false,
        is_visible: true,
    })
    .expect("pre-seed row");

    let source = FakeSource::new(
        vec![
            gmail_message("in-1", "First", "alice@example.com", false),
            gmail_message("in-2", "Remote subject", "bob@example.com", true),
            gmail_message("in-3", "Third", "carol@example.com", false),
        ],
        vec![],
    );

    let report = sync_mailbox(&source, &db, "token", user_id, Mailbox::Inbox, 10)
        .await
        .expect("sync inbox");
    assert_eq!(report.imported, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(source.detail_fetch_count("in-2"), 0);
    assert_eq!(source.detail_fetch_count("in-1"), 1);

    let seeded = db
        .get_inbox_message("in-2", user_id)
        .expect("get seeded")
        .expect("seeded row exists");
    assert_eq!(seeded.subject, "Seeded subject");
    assert!(seeded.is_read);
    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn inbox_sync_never_touches_sent_table() {
    let path = temp_db_path();
    let db = Database::open(&path).expect("open db");
    let user_id = db
        .upsert_user("owner@example.com", "Owner", None)
        .expect("upsert user");

    let source = FakeSource::new(
        vec![gmail_message("in-1", "First", "alice@example.com", false)],
        vec![gmail_message("out-1", "Reply", "bob@example.com", false)],
    );

    sync_mailbox(&source, &db, "token", user_id, Mailbox::Inbox, 10)
        .await
        .expect("sync inbox only");
    assert_eq!(db.list_sent(user_id, 50).expect("list sent").len(), 0);

    sync_mailbox(&source, &db, "token", user_id, Mailbox::Sent, 10)
        .await
        .expect("sync sent only");
    assert_eq!(db.list_inbox(user_id, 50).expect("list inbox").len(), 1);
    assert_eq!(db.list_sent(user_id, 50).expect("list sent").len(), 1);
    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn detail_fetch_failure_aborts_the_mailbox_run() {
    let path = temp_db_path();
    let db = Database::open(&path).expect("open db");
    let user_id = db
        .upsert_user("owner@example.com", "Owner", None)
        .expect("upsert user");

    let mut source = FakeSource::new(
        vec![
            gmail_message("in-1", "First", "alice@example.com", false),
            gmail_message("in-2", "Second", "bob@example.com", false),
            gmail_message("in-3", "Third", "carol@example.com", false),
        ],
        vec![],
    );
    source.fail_detail_for = Some("in-2".to_string());

    let result = sync_mailbox(&source, &db, "token", user_id, Mailbox::Inbox, 10).await;
    assert!(result.is_err());

    // Work before the failure stays persisted; nothing at or past it does.
    assert!(db
        .message_exists(Mailbox::Inbox, "in-1", user_id)
        .expect("exists in-1"));
    assert!(!db
        .message_exists(Mailbox::Inbox, "in-2", user_id)
        .expect("exists in-2"));
    assert!(!db
        .message_exists(Mailbox::Inbox, "in-3", user_id)
        .expect("exists in-3"));
    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn empty_mailbox_is_normal_termination() {
    let path = temp_db_path();
    let db = Database::open(&path).expect("open db");
    let user_id = db
        .upsert_user("owner@example.com", "Owner", None)
        .expect("upsert user");

    let source = FakeSource::new(vec![], vec![]);
    let report = sync_account(&source, &db, "token", user_id, DEFAULT_IMPORT_CAP)
        .await
        .expect("sync empty mailbox");
    assert_eq!(report.inbox.imported, 0);
    assert_eq!(report.sent.imported, 0);
    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn account_sync_applies_caller_cap_to_both_mailboxes() {
    let path = temp_db_path();
    let db = Database::open(&path).expect("open db");
    let user_id = db
        .upsert_user("owner@example.com", "Owner", None)
        .expect("upsert user");

    let source = FakeSource::new(
        vec![
            gmail_message("in-1", "First", "alice@example.com", false),
            gmail_message("in-2", "Second", "bob@example.com", false),
            gmail_message("in-3", "Third", "carol@example.com", false),
        ],
        vec![
            gmail_message("out-1", "Reply", "alice@example.com", false),
            gmail_message("out-2", "Reply two", "bob@example.com", false),
        ],
    );

    let report = sync_account(&source, &db, "token", user_id, 1)
        .await
        .expect("sync with cap 1");
    assert_eq!(report.inbox.imported, 1);
    assert_eq!(report.sent.imported, 1);
    assert_eq!(db.list_inbox(user_id, 50).expect("list inbox").len(), 1);
    assert_eq!(db.list_sent(user_id, 50).expect("list sent").len(), 1);
    let _ = std::fs::remove_file(path);
}
