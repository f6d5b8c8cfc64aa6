//! Gmail incremental import.
//!
//! One `sync_mailbox` call walks the remote listing for a single mailbox,
//! newest first, skipping anything already persisted and importing at most
//! `max_to_import` new messages. Pagination state is plain local loop state;
//! dedup safety rests on the store's conflict-free insert, so overlapping runs
//! for the same user can never produce duplicate rows.

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::db::models::{InboxMessage, Mailbox, SentMessage};
use crate::db::Database;
use crate::gmail::{GmailMessage, GmailPayload, MailSource};

/// Cap on newly persisted messages per mailbox per run.
pub const DEFAULT_IMPORT_CAP: usize = 10;

const LIST_PAGE_SIZE: usize = 10;
const DEFAULT_SUBJECT: &str = "(No subject)";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MailboxReport {
    pub imported: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub inbox: MailboxReport,
    pub sent: MailboxReport,
}

/// Import both mailboxes for one user, inbox first. The mailboxes touch
/// disjoint tables; a failure in either aborts the run and propagates to the
/// caller, which logs it without blocking the rest of the login flow.
pub async fn sync_account(
    source: &dyn MailSource,
    db: &Database,
    access_token: &str,
    user_id: i64,
    max_per_mailbox: usize,
) -> Result<SyncReport> {
    let inbox = sync_mailbox(
        source,
        db,
        access_token,
        user_id,
        Mailbox::Inbox,
        max_per_mailbox,
    )
    .await
    .context("import inbox messages")?;

    let sent = sync_mailbox(
        source,
        db,
        access_token,
        user_id,
        Mailbox::Sent,
        max_per_mailbox,
    )
    .await
    .context("import sent messages")?;

    Ok(SyncReport { inbox, sent })
}

/// Paginated import of one mailbox. Already-persisted messages are skipped
/// without a detail fetch and never count toward the cap; pagination continues
/// until the cap is met or the listing runs out.
pub async fn sync_mailbox(
    source: &dyn MailSource,
    db: &Database,
    access_token: &str,
    user_id: i64,
    mailbox: Mailbox,
    max_to_import: usize,
) -> Result<MailboxReport> {
    info!(user_id, mailbox = %mailbox, cap = max_to_import, "starting gmail import");

    let mut report = MailboxReport::default();
    if max_to_import == 0 {
        return Ok(report);
    }

    let mut page_token: Option<String> = None;
    loop {
        let page = source
            .list_messages(
                access_token,
                list_query(mailbox),
                LIST_PAGE_SIZE,
                page_token.as_deref(),
            )
            .await
            .with_context(|| format!("list {mailbox} messages"))?;

        // Empty or exhausted listing is normal termination, not an error.
        if page.ids.is_empty() {
            break;
        }

        for gmail_id in &page.ids {
            if db.message_exists(mailbox, gmail_id, user_id)? {
                debug!(%gmail_id, "already imported, skipping");
                report.skipped += 1;
                continue;
            }

            let message = source
                .get_message(access_token, gmail_id)
                .await
                .with_context(|| format!("fetch message {gmail_id}"))?;
            store_message(db, user_id, mailbox, &message)
                .with_context(|| format!("persist message {gmail_id}"))?;

            report.imported += 1;
            if report.imported == max_to_import {
                break;
            }
        }

        if report.imported == max_to_import {
            break;
        }
        page_token = page.next_page_token;
        if page_token.is_none() {
            break;
        }
    }

    info!(
        user_id,
        mailbox = %mailbox,
        imported = report.imported,
        skipped = report.skipped,
        "gmail import finished"
    );
    Ok(report)
}

fn list_query(mailbox: Mailbox) -> &'static str {
    match mailbox {
        Mailbox::Inbox => "in:inbox",
        Mailbox::Sent => "in:sent",
    }
}

fn store_message(
    db: &Database,
    user_id: i64,
    mailbox: Mailbox,
    message: &GmailMessage,
) -> Result<()> {
    match mailbox {
        Mailbox::Inbox => db.insert_inbox_message(&normalize_inbox(message, user_id))?,
        Mailbox::Sent => db.insert_sent_message(&normalize_sent(message, user_id))?,
    }
    Ok(())
}

/// Map a full inbox message onto its relational row. Missing pieces degrade to
/// documented defaults instead of failing the import.
pub fn normalize_inbox(message: &GmailMessage, user_id: i64) -> InboxMessage {
    let (sender_name, sender_email) = counterparty(message, "From");

    InboxMessage {
        gmail_id: message.id.clone(),
        user_id,
        subject: subject(message),
        sender_name,
        sender_email,
        body: extract_body_text(&message.payload),
        received_at: message_timestamp(message),
        is_read: !has_label(message, "UNREAD"),
        has_attachments: payload_has_attachments(&message.payload),
        is_visible: true,
    }
}

/// Sent-mailbox counterpart of [`normalize_inbox`]; the counterparty comes
/// from the `To` header and read state does not apply.
pub fn normalize_sent(message: &GmailMessage, sender_id: i64) -> SentMessage {
    let (recipient_name, recipient_email) = counterparty(message, "To");

    SentMessage {
        gmail_id: message.id.clone(),
        sender_id,
        subject: subject(message),
        recipient_name,
        recipient_email,
        body: extract_body_text(&message.payload),
        sent_at: message_timestamp(message),
    }
}

fn subject(message: &GmailMessage) -> String {
    header_value(&message.payload, "Subject").unwrap_or_else(|| DEFAULT_SUBJECT.to_string())
}

fn counterparty(message: &GmailMessage, header: &str) -> (String, String) {
    let raw = header_value(&message.payload, header).unwrap_or_default();
    parse_counterparty(&raw)
}

fn has_label(message: &GmailMessage, label: &str) -> bool {
    message
        .label_ids
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|l| l == label)
}

/// First header whose name matches, case-insensitive. Header names are not
/// guaranteed unique; first match wins.
fn header_value(payload: &GmailPayload, name: &str) -> Option<String> {
    payload
        .headers
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
}

/// Parse a `Display Name <address>` header. Quotes around the display name are
/// stripped; a value without the angle-bracket form is used verbatim as both
/// name and address.
pub fn parse_counterparty(raw: &str) -> (String, String) {
    let raw = raw.trim();
    if let (Some(start), Some(end)) = (raw.rfind('<'), raw.rfind('>')) {
        if start < end {
            let address = raw[start + 1..end].trim().to_string();
            let name = raw[..start].trim().trim_matches('"').trim().to_string();
            return (name, address);
        }
    }
    (raw.to_string(), raw.to_string())
}

/// Body text for a message: the first `text/plain` part when the payload is
/// multipart, the flat body when there are no parts, empty string otherwise.
/// Undecodable data also degrades to empty rather than failing the message.
pub fn extract_body_text(payload: &GmailPayload) -> String {
    if let Some(parts) = &payload.parts {
        return parts
            .iter()
            .find(|part| {
                part.mime_type
                    .as_deref()
                    .is_some_and(|m| m.eq_ignore_ascii_case("text/plain"))
            })
            .and_then(|part| part.body.as_ref())
            .and_then(|body| body.data.as_deref())
            .and_then(decode_body_data)
            .unwrap_or_default();
    }

    payload
        .body
        .as_ref()
        .and_then(|body| body.data.as_deref())
        .and_then(decode_body_data)
        .unwrap_or_default()
}

fn decode_body_data(data: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(data).ok()?;
    String::from_utf8(bytes).ok()
}

/// Best-effort message timestamp, RFC 3339. The `Date` header is authoritative
/// when it parses as RFC 2822; otherwise `internalDate` millis, otherwise the
/// Unix epoch sentinel. A bad date never drops the message.
pub fn message_timestamp(message: &GmailMessage) -> String {
    header_value(&message.payload, "Date")
        .and_then(|raw| DateTime::parse_from_rfc2822(&raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            message
                .internal_date
                .as_deref()
                .and_then(|ms| ms.parse::<i64>().ok())
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        })
        .unwrap_or(DateTime::UNIX_EPOCH)
        .to_rfc3339()
}

fn payload_has_attachments(payload: &GmailPayload) -> bool {
    if let Some(filename) = &payload.filename {
        if !filename.is_empty() {
            return true;
        }
    }
    if let Some(parts) = &payload.parts {
        for part in parts {
            if payload_has_attachments(part) {
                return true;
            }
        }
    }
    false
}
