//! Gmail REST provider.
//!
//! Labels are the reference container. Filing a message adds the reference
//! label and removes `INBOX` in one `modify` call.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::MailboxError;
use crate::mailbox::auth::AccessToken;
use crate::mailbox::retry::RetryPolicy;
use crate::mailbox::{
    MailboxProvider, MessagePage, MessageRef, ScanQuery, error_for_status, network_error,
};
use crate::pipeline::types::{Message, Source};

/// Gmail API root for the authenticated user.
pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Largest page Gmail returns for `messages.list`.
pub const PAGE_SIZE: u32 = 100;

/// System label removed when a message is filed.
const INBOX_LABEL: &str = "INBOX";

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LabelList {
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
struct Label {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageStub>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    #[serde(default)]
    thread_id: String,
    #[serde(default)]
    snippet: String,
    payload: Option<Payload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<Payload>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct PartBody {
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thread {
    #[serde(default)]
    messages: Vec<MessageStub>,
}

// ── Provider ────────────────────────────────────────────────────────

/// Gmail mailbox provider.
pub struct GmailProvider {
    client: reqwest::Client,
    base_url: String,
    token: AccessToken,
    retry: RetryPolicy,
}

impl GmailProvider {
    pub fn new(token: AccessToken) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: GMAIL_API_BASE.to_string(),
            token,
            retry: RetryPolicy::default(),
        }
    }

    /// Point at a different API root (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, MailboxError> {
        self.retry
            .run(operation, move || async move {
                let resp = self
                    .client
                    .get(self.url(path))
                    .header(AUTHORIZATION, self.token.bearer())
                    .query(query)
                    .send()
                    .await
                    .map_err(network_error(Source::Gmail))?;
                error_for_status(Source::Gmail, operation, resp)
                    .await?
                    .json::<T>()
                    .await
                    .map_err(network_error(Source::Gmail))
            })
            .await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, MailboxError> {
        self.retry
            .run(operation, move || async move {
                let resp = self
                    .client
                    .post(self.url(path))
                    .header(AUTHORIZATION, self.token.bearer())
                    .json(body)
                    .send()
                    .await
                    .map_err(network_error(Source::Gmail))?;
                error_for_status(Source::Gmail, operation, resp)
                    .await?
                    .json::<T>()
                    .await
                    .map_err(network_error(Source::Gmail))
            })
            .await
    }

    async fn find_label(&self, name: &str) -> Result<Option<String>, MailboxError> {
        let list: LabelList = self.get_json("labels.list", "labels", &[]).await?;
        Ok(list
            .labels
            .into_iter()
            .find(|label| label.name == name)
            .map(|label| label.id))
    }
}

#[async_trait]
impl MailboxProvider for GmailProvider {
    fn source(&self) -> Source {
        Source::Gmail
    }

    async fn ensure_container(&self, name: &str) -> Result<String, MailboxError> {
        if let Some(id) = self.find_label(name).await? {
            debug!(label = %name, id = %id, "Reference label exists");
            return Ok(id);
        }

        let body = serde_json::json!({
            "name": name,
            "labelListVisibility": "labelShow",
            "messageListVisibility": "show",
        });
        match self.post_json::<Label>("labels.create", "labels", &body).await {
            Ok(label) => {
                info!(label = %name, id = %label.id, "Created reference label");
                Ok(label.id)
            }
            // Someone created it between our list and create.
            Err(MailboxError::Status { status: 409, .. }) => {
                self.find_label(name)
                    .await?
                    .ok_or_else(|| MailboxError::InvalidResponse {
                        provider: Source::Gmail.to_string(),
                        reason: format!("label '{name}' conflicts but is not listed"),
                    })
            }
            Err(e) => Err(e),
        }
    }

    async fn list_page(
        &self,
        query: &ScanQuery,
        page_token: Option<&str>,
    ) -> Result<MessagePage, MailboxError> {
        let mut params = vec![("maxResults", PAGE_SIZE.to_string())];
        let q = build_query(query);
        if !q.is_empty() {
            params.push(("q", q));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let list: MessageList = self.get_json("messages.list", "messages", &params).await?;
        debug!(
            count = list.messages.len(),
            has_next = list.next_page_token.is_some(),
            "Listed Gmail page"
        );

        Ok(MessagePage {
            messages: list
                .messages
                .into_iter()
                .map(|stub| MessageRef::new(stub.id))
                .collect(),
            next_page_token: list.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn get_message(&self, id: &str) -> Result<Message, MailboxError> {
        let raw: GmailMessage = self
            .get_json(
                "messages.get",
                &format!("messages/{id}"),
                &[("format", "full".to_string())],
            )
            .await?;
        Ok(convert_message(raw))
    }

    async fn thread_message_count(&self, thread_id: &str) -> Result<Option<usize>, MailboxError> {
        let thread: Thread = self
            .get_json(
                "threads.get",
                &format!("threads/{thread_id}"),
                &[("format", "minimal".to_string())],
            )
            .await?;
        Ok(Some(thread.messages.len()))
    }

    async fn file_message(&self, id: &str, container_id: &str) -> Result<(), MailboxError> {
        let body = serde_json::json!({
            "addLabelIds": [container_id],
            "removeLabelIds": [INBOX_LABEL],
        });
        let _: serde_json::Value = self
            .post_json("messages.modify", &format!("messages/{id}/modify"), &body)
            .await?;
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Build the Gmail search string for a scan.
pub fn build_query(query: &ScanQuery) -> String {
    match query.keywords.as_deref() {
        Some(keywords) if !keywords.is_empty() => {
            let terms: Vec<String> = keywords
                .iter()
                .map(|k| {
                    if k.contains(char::is_whitespace) {
                        format!("\"{k}\"")
                    } else {
                        k.clone()
                    }
                })
                .collect();
            format!("({})", terms.join(" OR "))
        }
        _ => String::new(),
    }
}

fn convert_message(raw: GmailMessage) -> Message {
    let payload = raw.payload.unwrap_or_default();
    let header = |name: &str| {
        payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.clone())
            .unwrap_or_default()
    };

    Message {
        subject: header("Subject"),
        sender: header("From"),
        date: header("Date"),
        body: find_plain_text(&payload),
        id: raw.id,
        thread_id: raw.thread_id,
        snippet: raw.snippet,
    }
}

/// First `text/plain` part, depth first.
fn find_plain_text(part: &Payload) -> Option<String> {
    if part.mime_type.eq_ignore_ascii_case("text/plain")
        && let Some(text) = part
            .body
            .as_ref()
            .and_then(|b| b.data.as_deref())
            .and_then(decode_base64url)
    {
        return Some(text);
    }
    part.parts.iter().find_map(find_plain_text)
}

fn decode_base64url(data: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_without_keywords_is_empty() {
        assert_eq!(build_query(&ScanQuery::default()), "");
        assert_eq!(build_query(&ScanQuery::new(Some(vec![]))), "");
    }

    #[test]
    fn query_quotes_phrases() {
        let query = ScanQuery::new(Some(vec![
            "thank you".into(),
            "testimonial".into(),
            "great work".into(),
        ]));
        assert_eq!(
            build_query(&query),
            "(\"thank you\" OR testimonial OR \"great work\")"
        );
    }

    #[test]
    fn query_never_uses_label_proxy() {
        let query = ScanQuery::new(Some(vec!["recommend".into()]));
        assert!(!build_query(&query).contains("has:userlabels"));
    }

    fn encode(text: &str) -> String {
        URL_SAFE_NO_PAD.encode(text)
    }

    #[test]
    fn converts_full_message() {
        let raw: GmailMessage = serde_json::from_value(serde_json::json!({
            "id": "18c1",
            "threadId": "18c0",
            "snippet": "This was wonderful",
            "payload": {
                "mimeType": "multipart/alternative",
                "headers": [
                    {"name": "Subject", "value": "Thank you!"},
                    {"name": "From", "value": "Client <client@company.com>"},
                    {"name": "Date", "value": "Mon, 6 Jan 2025 10:00:00 +0000"}
                ],
                "parts": [
                    {"mimeType": "text/html", "body": {"data": encode("<p>html</p>")}},
                    {"mimeType": "text/plain", "body": {"data": encode("This was wonderful, highly recommend")}}
                ]
            }
        }))
        .unwrap();

        let msg = convert_message(raw);
        assert_eq!(msg.id, "18c1");
        assert_eq!(msg.thread_id, "18c0");
        assert_eq!(msg.subject, "Thank you!");
        assert_eq!(msg.sender, "Client <client@company.com>");
        assert_eq!(msg.date, "Mon, 6 Jan 2025 10:00:00 +0000");
        assert_eq!(msg.body.as_deref(), Some("This was wonderful, highly recommend"));
    }

    #[test]
    fn missing_headers_become_empty() {
        let raw: GmailMessage = serde_json::from_value(serde_json::json!({
            "id": "1",
            "threadId": "1",
            "snippet": "hi"
        }))
        .unwrap();
        let msg = convert_message(raw);
        assert_eq!(msg.subject, "");
        assert_eq!(msg.sender, "");
        assert!(msg.body.is_none());
        assert_eq!(msg.classification_text(), "hi");
    }

    #[test]
    fn decodes_padded_and_unpadded_base64url() {
        assert_eq!(decode_base64url("aGk").as_deref(), Some("hi"));
        assert_eq!(decode_base64url("aGk=").as_deref(), Some("hi"));
        assert!(decode_base64url("***").is_none());
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let provider =
            GmailProvider::new(AccessToken::new("t")).with_base_url("http://127.0.0.1:1/api/");
        assert_eq!(provider.url("labels"), "http://127.0.0.1:1/api/labels");
    }
}
