//! Health Check Server - Liveness and Readiness Probes
//!
//! Exposes /live and /ready endpoints via axum 0.7 for container
//! health checks. Readiness drops while any session's venue is
//! unreachable and once shutdown has begun.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tracing::{info, instrument};

use crate::ports::notifier::{Event, Notifier};
use crate::usecases::scheduler::StopSignal;

/// Shared health state polled by readiness probes.
#[derive(Debug, Default)]
pub struct HealthState {
    /// Set once the process starts draining sessions.
    shutting_down: AtomicBool,
    /// Sessions whose last cycle could not observe their venue.
    unavailable: Mutex<BTreeSet<String>>,
}

impl HealthState {
    /// Create a new health state (ready by default).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the process as draining.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::Relaxed);
    }

    /// Sessions currently failing to observe their venue.
    #[must_use]
    pub fn unavailable_sessions(&self) -> Vec<String> {
        self.unavailable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Check if the system is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        !self.shutting_down.load(Ordering::Relaxed)
            && self
                .unavailable
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_empty()
    }

    fn set_available(&self, session: &str, available: bool) {
        let mut unavailable = self.unavailable.lock().unwrap_or_else(PoisonError::into_inner);
        if available {
            unavailable.remove(session);
        } else {
            unavailable.insert(session.to_string());
        }
    }
}

impl Notifier for HealthState {
    fn notify(&self, event: Event) {
        match &event {
            Event::CycleCompleted(report) => {
                self.set_available(&report.session, !report.adapter_unavailable());
            }
            Event::RoundCompleted(report) => {
                let unavailable = report.errors.iter().any(|e| e.kind() == "adapter_unavailable");
                self.set_available(&report.session, !unavailable);
            }
            Event::SwapCompleted(report) => {
                let unavailable = report.errors.iter().any(|e| e.kind() == "adapter_unavailable");
                self.set_available(&report.session, !unavailable);
            }
            Event::SessionStopped { session, .. } => self.set_available(session, true),
            Event::SessionStarted { .. } | Event::AsymmetricExposure { .. } => {}
        }
    }
}

/// Axum-based health check HTTP server.
pub struct HealthServer {
    /// Health state shared with the notifier registry.
    state: Arc<HealthState>,
    /// Bind port (default 8080 from config).
    port: u16,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(state: Arc<HealthState>, port: u16) -> Self {
        Self { state, port }
    }

    /// Serve until the stop signal fires.
    ///
    /// # Errors
    /// Returns error if the listener cannot bind or the server fails.
    #[instrument(skip(self, stop))]
    pub async fn run(self, stop: StopSignal) -> anyhow::Result<()> {
        let app = Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .with_state(Arc::clone(&self.state));

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(address = %addr, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { stop.wait().await })
            .await?;

        Ok(())
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness probe: 200 only while every venue is reachable.
    async fn readiness(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
        if state.is_ready() {
            (StatusCode::OK, "READY".to_string())
        } else {
            let sessions = state.unavailable_sessions().join(",");
            (StatusCode::SERVICE_UNAVAILABLE, format!("NOT READY {sessions}"))
        }
    }
}
