//! Pre-classification sender rules.
//!
//! Runs before the classifier to skip obvious bulk mail:
//! - noreply/no-reply senders
//! - newsletter and mailer domains (`@news`, `@email.`, `@mailer.`)
//!
//! A message rejected here never reaches the classifier.

use regex::Regex;
use tracing::debug;

/// Sender address markers that identify bulk or automated mail.
pub const BLOCKED_SENDER_MARKERS: &[&str] =
    &["no-reply", "noreply", "@news", "@email.", "@mailer."];

/// A single sender block rule with a compiled regex.
#[derive(Debug, Clone)]
pub struct SenderRule {
    /// The marker as configured.
    pub pattern: String,
    /// Case-insensitive literal match.
    pub regex: Regex,
}

/// Sender block-list applied before classification.
#[derive(Debug, Clone)]
pub struct SenderRules {
    rules: Vec<SenderRule>,
}

impl SenderRules {
    /// Rules for the default bulk-mail markers.
    pub fn default_rules() -> Self {
        let mut rules = Self::empty();
        for marker in BLOCKED_SENDER_MARKERS {
            rules.add_marker(marker);
        }
        rules
    }

    /// Create an empty rule set (for testing).
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Block senders containing `marker` anywhere, ignoring case.
    pub fn add_marker(&mut self, marker: &str) {
        let regex = Regex::new(&format!("(?i){}", regex::escape(marker)))
            .unwrap_or_else(|_| unreachable!("escaped literal is always a valid regex"));
        self.rules.push(SenderRule {
            pattern: marker.to_string(),
            regex,
        });
    }

    /// Returns the matching marker if the sender is blocked.
    pub fn blocked_by(&self, sender: &str) -> Option<&str> {
        let rule = self.rules.iter().find(|r| r.regex.is_match(sender))?;
        debug!(sender = %sender, rule = %rule.pattern, "Sender matched block rule");
        Some(&rule.pattern)
    }

    #[cfg(test)]
    fn is_blocked(&self, sender: &str) -> bool {
        self.blocked_by(sender).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_noreply_variants() {
        let rules = SenderRules::default_rules();
        assert!(rules.is_blocked("noreply@company.com"));
        assert!(rules.is_blocked("Service <no-reply@service.io>"));
        assert!(rules.is_blocked("NoReply@Shop.COM"));
    }

    #[test]
    fn blocks_bulk_domains() {
        let rules = SenderRules::default_rules();
        assert!(rules.is_blocked("sender@news.example.com"));
        assert!(rules.is_blocked("Deals <offers@email.store.com>"));
        assert!(rules.is_blocked("updates@MAILER.vendor.net"));
    }

    #[test]
    fn reports_matching_marker() {
        let rules = SenderRules::default_rules();
        assert_eq!(rules.blocked_by("sender@news.example.com"), Some("@news"));
    }

    #[test]
    fn passes_through_real_people() {
        let rules = SenderRules::default_rules();
        assert!(!rules.is_blocked("client@company.com"));
        assert!(!rules.is_blocked("Jane Doe <jane@brightnews.com>"));
        assert!(!rules.is_blocked("emailer@agency.com"));
    }

    #[test]
    fn every_marker_blocks_regardless_of_case() {
        let rules = SenderRules::default_rules();
        for marker in BLOCKED_SENDER_MARKERS {
            let upper = format!("x{}y.com", marker.to_uppercase());
            assert!(rules.is_blocked(&upper), "{upper} should be blocked");
        }
    }

    #[test]
    fn markers_are_literals_not_patterns() {
        let mut rules = SenderRules::empty();
        rules.add_marker("@a.b");
        assert!(rules.is_blocked("x@a.b"));
        assert!(!rules.is_blocked("x@aXb"));
    }

    #[test]
    fn empty_rules_pass_everything() {
        assert!(!SenderRules::empty().is_blocked("noreply@company.com"));
    }
}
