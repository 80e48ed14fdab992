//! Shared types for the scan pipeline.

use serde::{Deserialize, Serialize};

// ── Source ──────────────────────────────────────────────────────────

/// Which mailbox a message or result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    Gmail,
    Outlook,
}

impl Source {
    /// Lowercase name for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Gmail => "gmail",
            Self::Outlook => "outlook",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ── Message ─────────────────────────────────────────────────────────

/// A message as fetched from a mailbox provider.
///
/// Never mutated by the pipeline; remote changes are issued by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Provider message id.
    pub id: String,
    /// Provider thread/conversation id.
    pub thread_id: String,
    pub subject: String,
    /// `From` header, or `Name <address>` for providers that split it.
    pub sender: String,
    /// Date as the provider reported it.
    pub date: String,
    /// Short preview text.
    pub snippet: String,
    /// Decoded plain-text body, when the provider returned one.
    pub body: Option<String>,
}

impl Message {
    /// Text handed to the classifier: the body if present, else the snippet.
    pub fn classification_text(&self) -> &str {
        match self.body.as_deref() {
            Some(body) if !body.trim().is_empty() => body,
            _ => &self.snippet,
        }
    }
}

// ── Result record ───────────────────────────────────────────────────

/// One accepted testimonial, as emitted in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub source: Source,
    pub sender: String,
    pub subject: String,
    pub date: String,
    /// Raw classifier output.
    #[serde(rename = "reason")]
    pub rationale: String,
}

impl ResultRecord {
    pub fn new(source: Source, message: &Message, rationale: String) -> Self {
        Self {
            source,
            sender: message.sender.clone(),
            subject: message.subject.clone(),
            date: message.date.clone(),
            rationale,
        }
    }
}

// ── Run summary ─────────────────────────────────────────────────────

/// Counters for one provider run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Messages pulled from the listing.
    pub scanned: usize,
    /// Dropped by the sender block-list.
    pub filtered_sender: usize,
    /// Dropped because the thread had no reply.
    pub filtered_thread: usize,
    /// Messages that got a verdict.
    pub classified: usize,
    /// Positive verdicts (filed and recorded).
    pub matched: usize,
    /// Ids of messages whose classification failed; never filed.
    pub classification_failures: Vec<String>,
    /// The run stopped early on a cancellation request.
    pub cancelled: bool,
}

/// Outcome of scanning one provider.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub source: Source,
    /// Accepted testimonials in discovery order.
    pub records: Vec<ResultRecord>,
    pub summary: RunSummary,
}
