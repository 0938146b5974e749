//! Session Loop - Run Cycles Until Stopped
//!
//! Every session kind (order book, paired legs, swap rotation) plugs
//! into one loop through [`CycleRunner`]. The loop checks the stop
//! signal at the top of each cycle and again before each cooldown; a
//! cycle in flight always runs to completion.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::domain::types::TargetState;
use crate::ports::notifier::{Event, Notifier};
use crate::ports::venue::VenueAdapter;
use crate::usecases::coordinator::PairedLegCoordinator;
use crate::usecases::engine::ReconciliationEngine;
use crate::usecases::rotation::SwapRotation;
use crate::usecases::scheduler::{CooldownKind, CooldownScheduler, StopSignal};

/// One unit of recurring work.
#[async_trait]
pub trait CycleRunner: Send + Sync {
  /// Session name.
  fn name(&self) -> &str;

  /// Session kind label for logs.
  fn kind(&self) -> &'static str;

  /// Run one cycle and return the events it produced.
  async fn run_cycle(&self) -> Vec<Event>;
}

/// Order-book reconciliation bound to one venue and target.
pub struct BookSession {
  engine: ReconciliationEngine,
  adapter: Arc<dyn VenueAdapter>,
  target: TargetState,
}

impl BookSession {
  #[must_use]
  pub fn new(engine: ReconciliationEngine, adapter: Arc<dyn VenueAdapter>, target: TargetState) -> Self {
    Self {
      engine,
      adapter,
      target,
    }
  }
}

#[async_trait]
impl CycleRunner for BookSession {
  fn name(&self) -> &str {
    self.engine.session()
  }

  fn kind(&self) -> &'static str {
    "book"
  }

  async fn run_cycle(&self) -> Vec<Event> {
    let report = self
      .engine
      .reconcile_cycle(self.adapter.as_ref(), &self.target)
      .await;
    vec![Event::CycleCompleted(report)]
  }
}

#[async_trait]
impl CycleRunner for PairedLegCoordinator {
  fn name(&self) -> &str {
    self.session()
  }

  fn kind(&self) -> &'static str {
    "pair"
  }

  async fn run_cycle(&self) -> Vec<Event> {
    let report = self.run_round().await;
    let mut events = Vec::with_capacity(2);
    if report.is_critical() {
      let detail = report
        .errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
      events.push(Event::AsymmetricExposure {
        session: report.session.clone(),
        detail,
      });
    }
    events.insert(0, Event::RoundCompleted(report));
    events
  }
}

#[async_trait]
impl CycleRunner for SwapRotation {
  fn name(&self) -> &str {
    self.session()
  }

  fn kind(&self) -> &'static str {
    "rotation"
  }

  async fn run_cycle(&self) -> Vec<Event> {
    vec![Event::SwapCompleted(self.run_hop().await)]
  }
}

/// Drives a runner with cooldowns until the stop signal fires.
pub struct SessionLoop {
  runner: Arc<dyn CycleRunner>,
  scheduler: Arc<CooldownScheduler>,
  notifier: Arc<dyn Notifier>,
  stop: StopSignal,
}

impl SessionLoop {
  #[must_use]
  pub fn new(
    runner: Arc<dyn CycleRunner>,
    scheduler: Arc<CooldownScheduler>,
    notifier: Arc<dyn Notifier>,
    stop: StopSignal,
  ) -> Self {
    Self {
      runner,
      scheduler,
      notifier,
      stop,
    }
  }

  /// Run until stopped, or until `max_cycles` cycles have completed.
  ///
  /// Returns the number of completed cycles.
  #[instrument(skip(self), fields(session = %self.runner.name(), kind = self.runner.kind()))]
  pub async fn run(&self, max_cycles: Option<u64>) -> u64 {
    let session = self.runner.name().to_string();
    self.notifier.notify(Event::SessionStarted {
      session: session.clone(),
      kind: self.runner.kind().to_string(),
    });
    info!("Session started");

    let mut cycles = 0u64;
    loop {
      if self.stop.is_stopped() || max_cycles.is_some_and(|max| cycles >= max) {
        break;
      }

      for event in self.runner.run_cycle().await {
        self.notifier.notify(event);
      }
      cycles += 1;

      if self.stop.is_stopped() || max_cycles.is_some_and(|max| cycles >= max) {
        break;
      }
      if !self
        .scheduler
        .cooldown(CooldownKind::InterCycle, &self.stop)
        .await
      {
        break;
      }
    }

    info!(cycles, "Session stopped");
    self.notifier.notify(Event::SessionStopped { session, cycles });
    cycles
  }
}

/// Wait for every spawned session to finish its current cycle, however
/// long in-flight submissions take, unless `abandon` resolves first.
///
/// Returns `true` when every session finished.
pub async fn drain_sessions<F>(handles: Vec<JoinHandle<()>>, abandon: F) -> bool
where
  F: Future<Output = ()>,
{
  let count = handles.len();
  let drain = async {
    for handle in handles {
      if let Err(e) = handle.await {
        error!(error = %e, "Session task panicked");
      }
    }
  };

  tokio::select! {
    () = drain => {
      info!(sessions = count, "All sessions drained");
      true
    }
    () = abandon => {
      warn!(sessions = count, "Drain abandoned with sessions still in flight");
      false
    }
  }
}
