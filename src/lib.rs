//! Testimonial scan: find client testimonials in a mailbox, file them under
//! a reference label and write a JSON report.

pub mod classifier;
pub mod config;
pub mod error;
pub mod mailbox;
pub mod pipeline;
pub mod report;
