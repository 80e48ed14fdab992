//! Remote mailbox providers.
//!
//! Both Gmail and Outlook are driven through [`MailboxProvider`], so the
//! scan pipeline has a single orchestration path and tests can use fakes.

pub mod auth;
pub mod gmail;
pub mod outlook;
pub(crate) mod retry;

pub use auth::AccessToken;
pub use gmail::GmailProvider;
pub use outlook::OutlookProvider;
pub use retry::RetryPolicy;

use async_trait::async_trait;

use crate::error::MailboxError;
use crate::pipeline::types::{Message, Source};

/// What to ask the provider for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanQuery {
    /// Keywords OR-ed together; `None` lists everything.
    pub keywords: Option<Vec<String>>,
}

impl ScanQuery {
    pub fn new(keywords: Option<Vec<String>>) -> Self {
        Self { keywords }
    }
}

/// A listed message, with full detail when the listing already carried it.
#[derive(Debug, Clone)]
pub struct MessageRef {
    pub id: String,
    pub detail: Option<Message>,
}

impl MessageRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            detail: None,
        }
    }

    pub fn detailed(message: Message) -> Self {
        Self {
            id: message.id.clone(),
            detail: Some(message),
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    pub messages: Vec<MessageRef>,
    /// Token for the next page; `None` ends the scan.
    pub next_page_token: Option<String>,
}

/// Capability set shared by all mailbox backends.
#[async_trait]
pub trait MailboxProvider: Send + Sync {
    /// Which mailbox this is.
    fn source(&self) -> Source;

    /// Look up the reference label/folder by name, creating it if missing.
    ///
    /// Calling this repeatedly with the same name returns the same id and
    /// never creates a second container.
    async fn ensure_container(&self, name: &str) -> Result<String, MailboxError>;

    /// Fetch one page of messages matching `query`.
    async fn list_page(
        &self,
        query: &ScanQuery,
        page_token: Option<&str>,
    ) -> Result<MessagePage, MailboxError>;

    /// Fetch full message detail.
    async fn get_message(&self, id: &str) -> Result<Message, MailboxError>;

    /// Number of messages in a thread, or `None` if the provider can't tell.
    async fn thread_message_count(&self, thread_id: &str) -> Result<Option<usize>, MailboxError>;

    /// Move/tag a message into the reference container.
    async fn file_message(&self, id: &str, container_id: &str) -> Result<(), MailboxError>;
}

/// Map a non-success HTTP response to a `MailboxError`.
pub(crate) async fn error_for_status(
    provider: Source,
    operation: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, MailboxError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(crate::error::AuthError::Rejected {
            provider: provider.to_string(),
        }
        .into());
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(std::time::Duration::from_secs);
        return Err(MailboxError::RateLimited {
            provider: provider.to_string(),
            retry_after,
        });
    }

    let body: String = resp
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(300)
        .collect();
    Err(MailboxError::Status {
        provider: provider.to_string(),
        operation: operation.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// Map a reqwest transport failure to a `MailboxError`.
pub(crate) fn network_error(provider: Source) -> impl Fn(reqwest::Error) -> MailboxError {
    move |e| {
        if e.is_decode() {
            MailboxError::InvalidResponse {
                provider: provider.to_string(),
                reason: e.to_string(),
            }
        } else {
            MailboxError::Network {
                provider: provider.to_string(),
                reason: e.to_string(),
            }
        }
    }
}
