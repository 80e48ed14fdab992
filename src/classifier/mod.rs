//! Testimonial classification.
//!
//! The pipeline only sees the [`Classifier`] trait. The default backend is
//! [`ProcessClassifier`], which pipes a prompt into a local model runner
//! (`ollama run llama3`) and reads a free-text YES/NO answer back.

pub mod process;

pub use process::ProcessClassifier;

use async_trait::async_trait;

use crate::error::ClassificationError;

/// Maximum body characters embedded in the prompt.
pub const MAX_BODY_CHARS: usize = 1200;

/// Binary decision plus the model's explanation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub is_match: bool,
    /// Full raw model output.
    pub rationale: String,
}

/// Decides whether a message is a genuine client testimonial.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Classify one message. Errors are never a negative verdict.
    async fn classify(&self, subject: &str, body: &str) -> Result<Verdict, ClassificationError>;
}

/// Truncate a body to [`MAX_BODY_CHARS`] characters.
pub fn truncate_body(body: &str) -> &str {
    match body.char_indices().nth(MAX_BODY_CHARS) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Build the classification prompt.
pub fn build_prompt(subject: &str, body: &str) -> String {
    format!(
        "You are filtering emails to detect **genuine client praise or testimonials** \
         — not marketing spam or automated messages.\n\n\
         Only respond YES if the message:\n\
         - Is written by a real person (not a company bot or promotion)\n\
         - Contains meaningful appreciation, recommendation, or reference to working with the user\n\
         - Could reasonably be quoted or summarized as client praise\n\n\
         Subject: {subject}\n\
         Body:\n\
         {body}\n\n\
         Answer with YES or NO and a short explanation.\n",
        body = truncate_body(body),
    )
}

/// Parse raw model output into a verdict.
///
/// Any case-insensitive `YES` makes a match, even next to a `NO`.
pub fn parse_verdict(raw: &str) -> Verdict {
    let output = raw.trim();
    Verdict {
        is_match: output.to_uppercase().contains("YES"),
        rationale: output.to_string(),
    }
}
