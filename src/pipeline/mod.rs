//! Testimonial scan pipeline.
//!
//! Every message from any mailbox flows through:
//! 1. `MailboxProvider::list_page()`: provider-specific I/O
//! 2. `SenderRules::blocked_by()`: cheap sender pattern matching (no model)
//! 3. Reply filter: thread message count, where the provider can tell
//! 4. `Classifier::classify()`: model verdict
//! 5. `MailboxProvider::file_message()`: only on a positive verdict
//!
//! Nothing is filed without a positive verdict.

pub mod processor;
pub mod rules;
pub mod types;
