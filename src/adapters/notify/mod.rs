//! Notification sinks.
//!
//! Every sink implements the fire-and-forget [`Notifier`] port; slow
//! delivery runs on a background worker fed by an unbounded channel.
//!
//! [`Notifier`]: crate::ports::notifier::Notifier

pub mod journal;
pub mod log;
pub mod webhook;

pub use journal::JournalNotifier;
pub use log::LogNotifier;
pub use webhook::{WebhookConfig, WebhookNotifier};
