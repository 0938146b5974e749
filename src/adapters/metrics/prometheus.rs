//! Prometheus Metrics Registry - Reconciliation Observability
//!
//! Registers and exposes Prometheus metrics for Grafana dashboards.
//! Metrics are fed from session events through the `Notifier` port, so
//! the loop itself never touches the registry.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use tracing::{info, instrument};

use crate::domain::report::{LegPhase, RoundStatus};
use crate::domain::types::SubmissionOutcome;
use crate::ports::notifier::{Event, Notifier};
use crate::usecases::scheduler::StopSignal;

/// Centralized Prometheus metrics.
///
/// All metrics follow the naming convention `venue_reconciler_*` and
/// carry a `session` label.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Completed cycles, rounds, and hops.
    pub cycles: IntCounterVec,
    /// Issued actions by kind and outcome.
    pub actions: IntCounterVec,
    /// Reported issues by error kind.
    pub issues: IntCounterVec,
    /// Projected commitment count per side after the last cycle.
    pub commitments: IntGaugeVec,
    /// Wall time of one cycle (seconds).
    pub cycle_duration: HistogramVec,
    /// Unhedged paired-leg exposure (1 = exposed).
    pub asymmetric_exposure: IntGaugeVec,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    ///
    /// # Errors
    /// Returns error if a metric cannot be created or registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let cycles = IntCounterVec::new(
            Opts::new("venue_reconciler_cycles_total", "Completed session cycles"),
            &["session", "kind"],
        )?;

        let actions = IntCounterVec::new(
            Opts::new(
                "venue_reconciler_actions_total",
                "Actions issued, by kind and submission outcome",
            ),
            &["session", "action", "outcome"],
        )?;

        let issues = IntCounterVec::new(
            Opts::new("venue_reconciler_issues_total", "Reported cycle issues"),
            &["session", "kind"],
        )?;

        let commitments = IntGaugeVec::new(
            Opts::new(
                "venue_reconciler_commitments",
                "Projected open commitments per side after the last cycle",
            ),
            &["session", "side"],
        )?;

        let cycle_duration = HistogramVec::new(
            HistogramOpts::new(
                "venue_reconciler_cycle_duration_seconds",
                "Wall time of one cycle in seconds",
            )
            .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 1800.0]),
            &["session"],
        )?;

        let asymmetric_exposure = IntGaugeVec::new(
            Opts::new(
                "venue_reconciler_asymmetric_exposure",
                "Whether a paired-leg session is unhedged (1=yes, 0=no)",
            ),
            &["session"],
        )?;

        registry.register(Box::new(cycles.clone()))?;
        registry.register(Box::new(actions.clone()))?;
        registry.register(Box::new(issues.clone()))?;
        registry.register(Box::new(commitments.clone()))?;
        registry.register(Box::new(cycle_duration.clone()))?;
        registry.register(Box::new(asymmetric_exposure.clone()))?;

        Ok(Self {
            registry,
            cycles,
            actions,
            issues,
            commitments,
            cycle_duration,
            asymmetric_exposure,
        })
    }

    /// Render all metrics in the text exposition format.
    ///
    /// # Errors
    /// Returns error if encoding fails.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Serve Prometheus metrics on the configured bind address.
    ///
    /// # Errors
    /// Returns error if the listener cannot bind or the server fails.
    #[instrument(skip(self, stop))]
    pub async fn serve(self: Arc<Self>, bind_address: String, stop: StopSignal) -> anyhow::Result<()> {
        let metrics = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics);
                async move {
                    match metrics.render() {
                        Ok(body) => (StatusCode::OK, body),
                        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { stop.wait().await })
            .await?;

        Ok(())
    }

    fn record_outcome(&self, session: &str, action: &str, outcome: &SubmissionOutcome) {
        self.actions
            .with_label_values(&[session, action, outcome.label()])
            .inc();
    }
}

const fn phase_label(phase: LegPhase) -> &'static str {
    match phase {
        LegPhase::Open => "leg_open",
        LegPhase::CancelResting => "leg_cancel_resting",
        LegPhase::Close => "leg_close",
    }
}

#[allow(clippy::cast_precision_loss)]
fn seconds_between(start: chrono::DateTime<chrono::Utc>, end: chrono::DateTime<chrono::Utc>) -> f64 {
    (end - start).num_milliseconds().max(0) as f64 / 1_000.0
}

impl Notifier for MetricsRegistry {
    fn notify(&self, event: Event) {
        match &event {
            Event::CycleCompleted(report) => {
                let session = report.session.as_str();
                self.cycles.with_label_values(&[session, "book"]).inc();
                self.cycle_duration
                    .with_label_values(&[session])
                    .observe(seconds_between(report.started_at, report.finished_at));
                for record in &report.actions_taken {
                    self.record_outcome(session, record.action.kind(), &record.outcome);
                }
                for error in &report.errors {
                    self.issues.with_label_values(&[session, error.kind()]).inc();
                }
                if !report.adapter_unavailable() {
                    let counts = report.counts_after_intent;
                    self.commitments
                        .with_label_values(&[session, "buy"])
                        .set(i64::try_from(counts.buy).unwrap_or(i64::MAX));
                    self.commitments
                        .with_label_values(&[session, "sell"])
                        .set(i64::try_from(counts.sell).unwrap_or(i64::MAX));
                }
            }
            Event::RoundCompleted(report) => {
                let session = report.session.as_str();
                self.cycles.with_label_values(&[session, "pair"]).inc();
                self.cycle_duration
                    .with_label_values(&[session])
                    .observe(seconds_between(report.started_at, report.finished_at));
                for leg in &report.legs {
                    self.record_outcome(session, phase_label(leg.phase), &leg.outcome);
                }
                for error in &report.errors {
                    self.issues.with_label_values(&[session, error.kind()]).inc();
                }
                let exposed = report.status == RoundStatus::AsymmetricLegFailure;
                self.asymmetric_exposure
                    .with_label_values(&[session])
                    .set(i64::from(exposed));
            }
            Event::SwapCompleted(report) => {
                let session = report.session.as_str();
                self.cycles.with_label_values(&[session, "rotation"]).inc();
                if let Some(outcome) = &report.outcome {
                    self.record_outcome(session, "swap", outcome);
                }
                for error in &report.errors {
                    self.issues.with_label_values(&[session, error.kind()]).inc();
                }
            }
            Event::AsymmetricExposure { session, .. } => {
                self.asymmetric_exposure.with_label_values(&[session]).set(1);
            }
            Event::SessionStarted { .. } | Event::SessionStopped { .. } => {}
        }
    }
}
