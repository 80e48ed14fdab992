//! Scan pipeline: walks a mailbox and files genuine testimonials.
//!
//! Per provider:
//! 1. Ensure the reference container exists
//! 2. Page through the listing
//! 3. For each message: sender rules → reply filter → classifier
//! 4. On a match, file the message and record it
//!
//! Everything runs in discovery order, one message at a time, so provider
//! mutations happen in the same order the messages were listed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{Instrument, debug, info, info_span, warn};

use crate::classifier::Classifier;
use crate::error::MailboxError;
use crate::mailbox::{MailboxProvider, MessageRef, ScanQuery};
use crate::pipeline::rules::SenderRules;
use crate::pipeline::types::{ResultRecord, RunSummary, ScanOutcome, Source};

/// What happened to a single message.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Disposition {
    BlockedSender,
    NoReply,
    NotMatched,
    ClassificationFailed(String),
    Filed(ResultRecord),
}

/// Results of scanning every configured provider.
#[derive(Debug, Default)]
pub struct RunResults {
    /// Completed scans, in provider order.
    pub outcomes: Vec<ScanOutcome>,
    /// Providers whose scan aborted; their partial records are dropped.
    pub failures: Vec<(Source, MailboxError)>,
}

impl RunResults {
    /// All accepted testimonials in discovery order.
    pub fn records(&self) -> Vec<ResultRecord> {
        self.outcomes
            .iter()
            .flat_map(|o| o.records.iter().cloned())
            .collect()
    }

    pub fn cancelled(&self) -> bool {
        self.outcomes.iter().any(|o| o.summary.cancelled)
    }
}

/// What a Ctrl-C should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// First signal: stop after the current message and keep the results.
    Cancel,
    /// Repeated signal: exit immediately.
    Abort,
}

/// Record an interrupt on the shared cancel flag.
pub fn on_interrupt(cancel: &AtomicBool) -> Interrupt {
    if cancel.swap(true, Ordering::Relaxed) {
        Interrupt::Abort
    } else {
        Interrupt::Cancel
    }
}

/// Drives the scan over one or more mailbox providers.
pub struct ScanPipeline {
    classifier: Arc<dyn Classifier>,
    rules: SenderRules,
    reference_name: String,
    only_with_replies: bool,
    cancel: Arc<AtomicBool>,
}

impl ScanPipeline {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        rules: SenderRules,
        reference_name: impl Into<String>,
        only_with_replies: bool,
    ) -> Self {
        Self {
            classifier,
            rules,
            reference_name: reference_name.into(),
            only_with_replies,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a cancellation flag, checked between messages.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Scan each provider in order.
    ///
    /// A provider failure is recorded and the next provider still runs.
    /// Cancellation stops the remaining providers.
    pub async fn run(
        &self,
        providers: &[Box<dyn MailboxProvider>],
        query: &ScanQuery,
    ) -> RunResults {
        let mut results = RunResults::default();

        for provider in providers {
            if self.is_cancelled() {
                info!(source = %provider.source(), "Cancelled, skipping provider");
                break;
            }

            match self.scan(provider.as_ref(), query).await {
                Ok(outcome) => results.outcomes.push(outcome),
                Err(e) => {
                    warn!(source = %provider.source(), error = %e, "Scan aborted");
                    results.failures.push((provider.source(), e));
                }
            }
        }

        results
    }

    /// Scan a single provider until it runs out of pages.
    pub async fn scan(
        &self,
        provider: &dyn MailboxProvider,
        query: &ScanQuery,
    ) -> Result<ScanOutcome, MailboxError> {
        let source = provider.source();
        let span = info_span!("scan", source = %source);
        self.scan_inner(provider, query).instrument(span).await
    }

    async fn scan_inner(
        &self,
        provider: &dyn MailboxProvider,
        query: &ScanQuery,
    ) -> Result<ScanOutcome, MailboxError> {
        let source = provider.source();
        let container_id = provider.ensure_container(&self.reference_name).await?;
        info!(container = %self.reference_name, id = %container_id, "Scanning mailbox");

        let mut records = Vec::new();
        let mut summary = RunSummary::default();
        let mut page_token: Option<String> = None;
        let mut reply_filter_warned = false;

        'pages: loop {
            let page = provider.list_page(query, page_token.as_deref()).await?;
            if page.messages.is_empty() {
                break;
            }

            for entry in page.messages {
                if self.is_cancelled() {
                    summary.cancelled = true;
                    break 'pages;
                }
                summary.scanned += 1;

                let disposition = self
                    .process(provider, &container_id, entry, &mut reply_filter_warned)
                    .await?;
                match disposition {
                    Disposition::BlockedSender => summary.filtered_sender += 1,
                    Disposition::NoReply => summary.filtered_thread += 1,
                    Disposition::NotMatched => summary.classified += 1,
                    Disposition::ClassificationFailed(id) => {
                        summary.classification_failures.push(id)
                    }
                    Disposition::Filed(record) => {
                        summary.classified += 1;
                        summary.matched += 1;
                        records.push(record);
                    }
                }
            }

            match page.next_page_token {
                Some(next) if page_token.as_deref() == Some(next.as_str()) => {
                    warn!(token = %next, "Provider repeated its page token, stopping");
                    break;
                }
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        log_summary(source, &summary);

        Ok(ScanOutcome {
            source,
            records,
            summary,
        })
    }

    /// Run one message through filters, classifier and mutation.
    async fn process(
        &self,
        provider: &dyn MailboxProvider,
        container_id: &str,
        entry: MessageRef,
        reply_filter_warned: &mut bool,
    ) -> Result<Disposition, MailboxError> {
        let message = match entry.detail {
            Some(message) => message,
            None => provider.get_message(&entry.id).await?,
        };

        if let Some(marker) = self.rules.blocked_by(&message.sender) {
            debug!(id = %message.id, sender = %message.sender, marker, "Skipping bulk sender");
            return Ok(Disposition::BlockedSender);
        }

        if self.only_with_replies {
            match provider.thread_message_count(&message.thread_id).await? {
                Some(count) if count <= 1 => {
                    debug!(id = %message.id, thread = %message.thread_id, "Skipping thread without replies");
                    return Ok(Disposition::NoReply);
                }
                Some(_) => {}
                None if !*reply_filter_warned => {
                    warn!("Provider cannot count thread replies; reply filter not applied");
                    *reply_filter_warned = true;
                }
                None => {}
            }
        }

        let verdict = match self
            .classifier
            .classify(&message.subject, message.classification_text())
            .await
        {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(
                    id = %message.id,
                    classifier = self.classifier.name(),
                    error = %e,
                    "Classification failed, message left untouched"
                );
                return Ok(Disposition::ClassificationFailed(message.id));
            }
        };

        if !verdict.is_match {
            debug!(id = %message.id, subject = %message.subject, "Not a testimonial");
            return Ok(Disposition::NotMatched);
        }

        provider.file_message(&message.id, container_id).await?;
        info!(
            id = %message.id,
            sender = %message.sender,
            subject = %message.subject,
            "Filed testimonial"
        );

        Ok(Disposition::Filed(ResultRecord::new(
            provider.source(),
            &message,
            verdict.rationale,
        )))
    }
}

fn log_summary(source: Source, summary: &RunSummary) {
    info!(
        source = %source,
        scanned = summary.scanned,
        filtered_sender = summary.filtered_sender,
        filtered_thread = summary.filtered_thread,
        classified = summary.classified,
        matched = summary.matched,
        cancelled = summary.cancelled,
        "Scan complete"
    );
    if !summary.classification_failures.is_empty() {
        warn!(
            source = %source,
            count = summary.classification_failures.len(),
            ids = ?summary.classification_failures,
            "Messages left unclassified and unfiled"
        );
    }
}
