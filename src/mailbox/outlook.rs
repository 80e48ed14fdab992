//! Outlook provider over Microsoft Graph.
//!
//! Folders are the reference container and filing is a `move`. The listing
//! is a single bounded keyword search (at most [`MAX_RESULTS`] messages) that
//! already carries full detail. The search always runs: when the scan query
//! has no keywords the provider falls back to [`KEYWORDS`]. Graph offers no
//! cheap reply count here, so the reply filter is not available on this path.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::KEYWORDS;
use crate::error::MailboxError;
use crate::mailbox::auth::AccessToken;
use crate::mailbox::retry::RetryPolicy;
use crate::mailbox::{
    MailboxProvider, MessagePage, MessageRef, ScanQuery, error_for_status, network_error,
};
use crate::pipeline::types::{Message, Source};

/// Graph API root for the signed-in user.
pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0/me";

/// Messages processed per scan.
pub const MAX_RESULTS: usize = 50;

const MESSAGE_FIELDS: &str = "id,conversationId,subject,from,receivedDateTime,bodyPreview";

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MailFolder {
    id: String,
    #[serde(default)]
    display_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    id: String,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    from: Option<Recipient>,
    #[serde(default)]
    received_date_time: Option<String>,
    #[serde(default)]
    body_preview: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Recipient {
    email_address: EmailAddress,
}

#[derive(Debug, Default, Deserialize)]
struct EmailAddress {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

// ── Provider ────────────────────────────────────────────────────────

/// Outlook mailbox provider.
pub struct OutlookProvider {
    client: reqwest::Client,
    base_url: String,
    token: AccessToken,
    retry: RetryPolicy,
    /// Search terms used when the scan query carries none.
    default_keywords: Vec<String>,
}

impl OutlookProvider {
    pub fn new(token: AccessToken) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: GRAPH_API_BASE.to_string(),
            token,
            retry: RetryPolicy::default(),
            default_keywords: KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Replace the fallback search terms. An empty list lists the inbox instead.
    pub fn with_default_keywords(mut self, keywords: Vec<String>) -> Self {
        self.default_keywords = keywords;
        self
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

    async fn find_folder(&self, name: &str) -> Result<Option<String>, MailboxError> {
        let folders: Collection<MailFolder> = self
            .get_json("mailFolders.list", "mailFolders", &[("$top", "250".to_string())])
            .await?;

        // Graph folder names are unique ignoring case.
        let wanted = name.to_lowercase();
        Ok(folders
            .value
            .into_iter()
            .find(|f| f.display_name.to_lowercase() == wanted)
            .map(|f| f.id))
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
                    .map_err(network_error(Source::Outlook))?;
                error_for_status(Source::Outlook, operation, resp)
                    .await?
                    .json::<T>()
                    .await
                    .map_err(network_error(Source::Outlook))
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
                    .map_err(network_error(Source::Outlook))?;
                error_for_status(Source::Outlook, operation, resp)
                    .await?
                    .json::<T>()
                    .await
                    .map_err(network_error(Source::Outlook))
            })
            .await
    }
}

#[async_trait]
impl MailboxProvider for OutlookProvider {
    fn source(&self) -> Source {
        Source::Outlook
    }

    async fn ensure_container(&self, name: &str) -> Result<String, MailboxError> {
        if let Some(id) = self.find_folder(name).await? {
            debug!(folder = %name, id = %id, "Reference folder exists");
            return Ok(id);
        }

        let body = serde_json::json!({ "displayName": name });
        match self
            .post_json::<MailFolder>("mailFolders.create", "mailFolders", &body)
            .await
        {
            Ok(folder) => {
                info!(folder = %name, id = %folder.id, "Created reference folder");
                Ok(folder.id)
            }
            // A retried create whose first attempt went through.
            Err(MailboxError::Status { status: 409, .. }) => {
                self.find_folder(name)
                    .await?
                    .ok_or_else(|| MailboxError::InvalidResponse {
                        provider: Source::Outlook.to_string(),
                        reason: format!("folder '{name}' conflicts but is not listed"),
                    })
            }
            Err(e) => Err(e),
        }
    }

    async fn list_page(
        &self,
        query: &ScanQuery,
        _page_token: Option<&str>,
    ) -> Result<MessagePage, MailboxError> {
        let mut params = vec![
            ("$top", MAX_RESULTS.to_string()),
            ("$select", MESSAGE_FIELDS.to_string()),
        ];
        let keywords = match query.keywords.as_deref() {
            Some(keywords) if !keywords.is_empty() => keywords,
            _ => self.default_keywords.as_slice(),
        };
        let path = match build_search(keywords) {
            Some(search) => {
                params.push(("$search", search));
                "messages"
            }
            None => "mailFolders/inbox/messages",
        };

        let list: Collection<GraphMessage> = self.get_json("messages.list", path, &params).await?;
        debug!(count = list.value.len(), "Listed Outlook messages");

        Ok(MessagePage {
            messages: list
                .value
                .into_iter()
                .take(MAX_RESULTS)
                .map(|m| MessageRef::detailed(convert_message(m)))
                .collect(),
            next_page_token: None,
        })
    }

    async fn get_message(&self, id: &str) -> Result<Message, MailboxError> {
        let raw: GraphMessage = self
            .get_json(
                "messages.get",
                &format!("messages/{id}"),
                &[("$select", MESSAGE_FIELDS.to_string())],
            )
            .await?;
        Ok(convert_message(raw))
    }

    async fn thread_message_count(&self, _thread_id: &str) -> Result<Option<usize>, MailboxError> {
        Ok(None)
    }

    async fn file_message(&self, id: &str, container_id: &str) -> Result<(), MailboxError> {
        let body = serde_json::json!({ "destinationId": container_id });
        let _: serde_json::Value = self
            .post_json("messages.move", &format!("messages/{id}/move"), &body)
            .await?;
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Build the `$search` value: one quoted KQL expression of escaped, quoted
/// keywords joined with OR, e.g. `"\"thank you\" OR \"endorse\""`.
pub fn build_search(keywords: &[String]) -> Option<String> {
    if keywords.is_empty() {
        return None;
    }
    let terms = keywords
        .iter()
        .map(|k| format!(r#"\"{}\""#, k.replace(['"', '\\'], "")))
        .collect::<Vec<_>>()
        .join(" OR ");
    Some(format!("\"{terms}\""))
}

/// `Name <address>`, or whichever half is present.
fn format_sender(from: Option<Recipient>) -> String {
    let addr = from.map(|r| r.email_address).unwrap_or_default();
    let name = addr.name.filter(|s| !s.trim().is_empty());
    let address = addr.address.filter(|s| !s.trim().is_empty());
    match (name, address) {
        (Some(name), Some(address)) => format!("{name} <{address}>"),
        (Some(only), None) | (None, Some(only)) => only,
        (None, None) => String::new(),
    }
}

fn convert_message(raw: GraphMessage) -> Message {
    Message {
        thread_id: raw.conversation_id.unwrap_or_default(),
        subject: raw.subject.unwrap_or_default(),
        sender: format_sender(raw.from),
        date: raw.received_date_time.unwrap_or_default(),
        snippet: raw.body_preview.unwrap_or_default(),
        body: None,
        id: raw.id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_wraps_escaped_keywords() {
        let keywords = vec!["thank you".to_string(), "endorse".to_string()];
        assert_eq!(
            build_search(&keywords).as_deref(),
            Some(r#""\"thank you\" OR \"endorse\"""#)
        );
    }

    #[test]
    fn search_drops_quotes_inside_keywords() {
        let keywords = vec![r#"say "hi""#.to_string()];
        assert_eq!(build_search(&keywords).as_deref(), Some(r#""\"say hi\"""#));
    }

    #[test]
    fn empty_keyword_list_has_no_search() {
        assert!(build_search(&[]).is_none());
    }

    #[test]
    fn converts_graph_message() {
        let raw: GraphMessage = serde_json::from_value(serde_json::json!({
            "id": "AAMk1",
            "conversationId": "conv-1",
            "subject": "Thank you!",
            "from": {"emailAddress": {"name": "Client", "address": "client@company.com"}},
            "receivedDateTime": "2025-01-06T10:00:00Z",
            "bodyPreview": "Highly recommend"
        }))
        .unwrap();

        let msg = convert_message(raw);
        assert_eq!(msg.id, "AAMk1");
        assert_eq!(msg.thread_id, "conv-1");
        assert_eq!(msg.sender, "Client <client@company.com>");
        assert_eq!(msg.date, "2025-01-06T10:00:00Z");
        assert_eq!(msg.classification_text(), "Highly recommend");
    }

    #[test]
    fn sender_keeps_address_for_block_list() {
        let raw: GraphMessage = serde_json::from_value(serde_json::json!({
            "id": "x",
            "from": {"emailAddress": {"name": "Weekly Digest", "address": "digest@news.example.com"}}
        }))
        .unwrap();
        let msg = convert_message(raw);
        assert!(msg.sender.contains("@news.example.com"));
        assert_eq!(msg.subject, "");
    }

    #[test]
    fn sender_with_only_one_half() {
        let only_name = Recipient {
            email_address: EmailAddress {
                name: Some("Client".into()),
                address: None,
            },
        };
        assert_eq!(format_sender(Some(only_name)), "Client");
        assert_eq!(format_sender(None), "");
    }
}
