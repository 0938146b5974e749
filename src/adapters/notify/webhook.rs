//! Webhook Notifier - Discord-compatible Alerts
//!
//! Posts one embed per event worth a human's attention: degraded
//! cycles, non-complete rounds, failed hops, and every critical event.
//! Routine events are dropped before they reach the worker.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::domain::report::RoundStatus;
use crate::domain::types::SubmissionOutcome;
use crate::error::Severity;
use crate::ports::notifier::{Event, Notifier};

const COLOR_WARNING: u32 = 0x00F1_C40F;
const COLOR_CRITICAL: u32 = 0x00E7_4C3C;
const COLOR_INFO: u32 = 0x0034_98DB;

/// Webhook configuration.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Webhook URL.
    pub url: String,
    /// Display name on posts.
    pub username: String,
    /// Per-post timeout; a hung endpoint must not stall the worker.
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    username: String,
    embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
struct Embed {
    title: String,
    description: String,
    color: u32,
    timestamp: String,
}

/// Notifier posting alerts to a webhook.
pub struct WebhookNotifier {
    sender: mpsc::UnboundedSender<Event>,
}

impl WebhookNotifier {
    /// Create the notifier and spawn its delivery worker.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: WebhookConfig) -> Result<Self> {
        let http = webhook_client(&config)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(webhook_worker(config, http, receiver));
        Ok(Self { sender })
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, event: Event) {
        if format_embed(&event).is_none() {
            return;
        }
        if self.sender.send(event).is_err() {
            warn!("Webhook notifier channel closed");
        }
    }
}

fn webhook_client(config: &WebhookConfig) -> Result<Client> {
    anyhow::ensure!(!config.timeout.is_zero(), "webhook timeout must be non-zero");
    Client::builder()
        .timeout(config.timeout)
        .build()
        .context("Failed to build webhook client")
}

async fn webhook_worker(
    config: WebhookConfig,
    http: Client,
    mut receiver: mpsc::UnboundedReceiver<Event>,
) {
    info!("Webhook notifier started");

    while let Some(event) = receiver.recv().await {
        let Some(embed) = format_embed(&event) else {
            continue;
        };
        let payload = WebhookPayload {
            username: config.username.clone(),
            embeds: vec![embed],
        };
        match http.post(&config.url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                error!(status = %response.status(), "Webhook rejected notification");
            }
            Err(e) => error!(error = %e, "Failed to post webhook notification"),
        }
    }

    warn!("Webhook notifier worker shutting down");
}

/// Render an event as an embed, or `None` when it is not alert-worthy.
fn format_embed(event: &Event) -> Option<Embed> {
    let (title, description, color) = match event {
        Event::AsymmetricExposure { session, detail } => (
            format!("Unhedged exposure on {session}"),
            detail.clone(),
            COLOR_CRITICAL,
        ),
        Event::RoundCompleted(report) if report.status != RoundStatus::Complete => {
            let color = if event.severity() == Severity::Critical {
                COLOR_CRITICAL
            } else {
                COLOR_WARNING
            };
            (
                format!("Round {:?} on {}", report.status, report.session),
                join_errors(report.errors.iter().map(ToString::to_string)),
                color,
            )
        }
        Event::CycleCompleted(report) if !report.errors.is_empty() => (
            format!("Cycle issues on {}", report.session),
            join_errors(report.errors.iter().map(ToString::to_string)),
            COLOR_WARNING,
        ),
        Event::SwapCompleted(report)
            if !matches!(report.outcome, Some(SubmissionOutcome::Confirmed(_))) =>
        {
            (
                format!("Swap {} -> {} not confirmed", report.input, report.output),
                join_errors(report.errors.iter().map(ToString::to_string)),
                COLOR_WARNING,
            )
        }
        Event::SessionStopped { session, cycles } => (
            format!("Session {session} stopped"),
            format!("{cycles} cycles completed"),
            COLOR_INFO,
        ),
        _ => return None,
    };

    Some(Embed {
        title,
        description,
        color,
        timestamp: Utc::now().to_rfc3339(),
    })
}

fn join_errors(errors: impl Iterator<Item = String>) -> String {
    let text = errors.collect::<Vec<_>>().join("\n");
    if text.is_empty() {
        "no detail".to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::report::CycleReport;
    use crate::error::ReconcileError;

    #[test]
    fn test_clean_cycle_is_not_posted() {
        let report = CycleReport::begin("book-a", Utc::now());
        assert!(format_embed(&Event::CycleCompleted(report)).is_none());
    }

    #[test]
    fn test_cycle_with_errors_is_posted() {
        let mut report = CycleReport::begin("book-a", Utc::now());
        report.errors.push(ReconcileError::AdapterUnavailable {
            attempts: 5,
            last_error: "timeout".into(),
        });
        let embed = format_embed(&Event::CycleCompleted(report)).unwrap();
        assert_eq!(embed.color, COLOR_WARNING);
        assert!(embed.title.contains("book-a"));
    }

    #[test]
    fn test_client_requires_a_timeout() {
        let mut config = WebhookConfig {
            url: "http://hooks.local/x".into(),
            username: "bot".into(),
            timeout: Duration::from_secs(5),
        };
        assert!(webhook_client(&config).is_ok());

        config.timeout = Duration::ZERO;
        let err = webhook_client(&config).err().unwrap();
        assert!(err.to_string().contains("non-zero"));
    }

    #[test]
    fn test_exposure_is_critical_color() {
        let embed = format_embed(&Event::AsymmetricExposure {
            session: "pair".into(),
            detail: "short leg failed".into(),
        })
        .unwrap();
        assert_eq!(embed.color, COLOR_CRITICAL);
        assert_eq!(embed.description, "short leg failed");
    }
}
