use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const REDACTED_BODY_MAX_LEN: usize = 200;

/// One page of message references from a mailbox listing. An exhausted or
/// empty mailbox yields an empty `ids` with no continuation token.
#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Remote mail provider seam. The sync engine only ever talks to this trait,
/// so tests can drive it with an in-memory mailbox instead of the live API.
#[async_trait(?Send)]
pub trait MailSource {
    /// List message ids matching `query` (`"in:inbox"` / `"in:sent"`), at most
    /// `page_size` per page, continuing from an opaque `page_token`.
    async fn list_messages(
        &self,
        token: &str,
        query: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<MessagePage>;

    /// Fetch the full message payload for one id.
    async fn get_message(&self, token: &str, message_id: &str) -> Result<GmailMessage>;
}

/// Thin Gmail REST client. Requests carry the caller's bearer token and a
/// bounded timeout; any transport or non-2xx outcome is surfaced as an error
/// with a redacted response body. No retry happens at this level.
#[derive(Debug, Clone)]
pub struct GmailClient {
    client: Client,
}

impl GmailClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("build gmail http client")?;
        Ok(Self { client })
    }

    async fn fetch(&self, token: &str, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .header("accept", "application/json")
            .send()
            .await
            .with_context(|| format!("gmail api request: {url}"))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("read gmail api response body")?;
        if !status.is_success() {
            return Err(anyhow!(
                "gmail api request failed: status={} body={}",
                status,
                redact_response_body(&body)
            ));
        }

        Ok(body)
    }
}

#[async_trait(?Send)]
impl MailSource for GmailClient {
    async fn list_messages(
        &self,
        token: &str,
        query: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<MessagePage> {
        let mut url = format!("{GMAIL_API_BASE}/users/me/messages?q={query}&maxResults={page_size}");
        if let Some(pt) = page_token {
            url.push_str(&format!("&pageToken={pt}"));
        }

        let body = self.fetch(token, &url).await?;
        let list: GmailMessageList =
            serde_json::from_str(&body).context("decode gmail message list")?;

        Ok(MessagePage {
            ids: list
                .messages
                .unwrap_or_default()
                .into_iter()
                .map(|stub| stub.id)
                .collect(),
            next_page_token: list.next_page_token,
        })
    }

    async fn get_message(&self, token: &str, message_id: &str) -> Result<GmailMessage> {
        let url = format!("{GMAIL_API_BASE}/users/me/messages/{message_id}?format=full");
        let body = self.fetch(token, &url).await?;
        serde_json::from_str(&body).context("decode gmail message")
    }
}

fn redact_response_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= REDACTED_BODY_MAX_LEN {
        return trimmed.to_string();
    }
    // Back off to a char boundary so the cut never splits a multibyte char.
    let mut cut = REDACTED_BODY_MAX_LEN;
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…[truncated {} bytes]", &trimmed[..cut], trimmed.len())
}

// --- Gmail API response types ---
// Fields mirror the API contract; not every deserialized field is read.

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessageList {
    messages: Option<Vec<GmailMessageRef>>,
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessageRef {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    pub id: String,
    pub label_ids: Option<Vec<String>>,
    pub internal_date: Option<String>,
    pub payload: GmailPayload,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailPayload {
    pub mime_type: Option<String>,
    pub headers: Option<Vec<GmailHeader>>,
    pub body: Option<GmailBody>,
    pub parts: Option<Vec<GmailPayload>>,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GmailHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailBody {
    pub size: Option<u64>,
    pub data: Option<String>,
}
