//! Log Notifier - Events as Structured Log Lines

use tracing::{error, info, warn};

use crate::domain::report::RoundStatus;
use crate::error::Severity;
use crate::ports::notifier::{Event, Notifier};

/// Writes every event to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: Event) {
        if event.severity() == Severity::Critical {
            let detail = serde_json::to_string(&event).unwrap_or_default();
            error!(session = %event.session(), %detail, "Critical session event");
            return;
        }

        match &event {
            Event::SessionStarted { session, kind } => {
                info!(%session, %kind, "Session started");
            }
            Event::SessionStopped { session, cycles } => {
                info!(%session, cycles, "Session stopped");
            }
            Event::CycleCompleted(report) => {
                let errors = report.errors.iter().map(|e| e.kind()).collect::<Vec<_>>();
                if errors.is_empty() {
                    info!(
                        session = %report.session,
                        actions = report.actions_taken.len(),
                        buy = report.counts_after_intent.buy,
                        sell = report.counts_after_intent.sell,
                        "Cycle completed"
                    );
                } else {
                    warn!(
                        session = %report.session,
                        actions = report.actions_taken.len(),
                        ?errors,
                        "Cycle completed with issues"
                    );
                }
            }
            Event::RoundCompleted(report) => {
                if report.status == RoundStatus::Complete {
                    info!(session = %report.session, kind = ?report.kind, "Round completed");
                } else {
                    warn!(session = %report.session, status = ?report.status, "Round degraded");
                }
            }
            Event::SwapCompleted(report) => {
                info!(
                    session = %report.session,
                    input = %report.input,
                    output = %report.output,
                    in_amount = report.in_amount,
                    observed_out = ?report.observed_out,
                    "Swap hop completed"
                );
            }
            Event::AsymmetricExposure { session, detail } => {
                error!(%session, %detail, "Asymmetric exposure");
            }
        }
    }
}
