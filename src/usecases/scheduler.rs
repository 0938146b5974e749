//! Cooldown Scheduler - Randomized Delays, Clock, and Stop Signal
//!
//! Sessions never call `tokio::time::sleep` directly. Every wait goes
//! through an injectable [`Clock`], and every cooldown is drawn uniformly
//! from a kind-specific window so concurrent sessions do not fall into
//! lockstep against the same venue.
//!
//! Tests swap in [`RecordingClock`], which records requested sleeps and
//! returns immediately, so many simulated cycles run without real time.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tracing::debug;

// ────────────────────────────────────────────
// Clock
// ────────────────────────────────────────────

/// Source of time for sessions.
#[async_trait]
pub trait Clock: Send + Sync + 'static {
  /// Current wall-clock time.
  fn now(&self) -> DateTime<Utc>;

  /// Suspend for `duration`.
  async fn sleep(&self, duration: Duration);
}

/// Production clock backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }

  async fn sleep(&self, duration: Duration) {
    tokio::time::sleep(duration).await;
  }
}

/// Virtual clock that records sleeps and advances instantly.
#[derive(Debug)]
pub struct RecordingClock {
  state: Mutex<RecordingState>,
}

#[derive(Debug)]
struct RecordingState {
  now: DateTime<Utc>,
  sleeps: Vec<Duration>,
}

impl RecordingClock {
  /// Start the virtual clock at the current wall-clock time.
  #[must_use]
  pub fn new() -> Self {
    Self {
      state: Mutex::new(RecordingState {
        now: Utc::now(),
        sleeps: Vec::new(),
      }),
    }
  }

  /// Every sleep requested so far, in order.
  #[must_use]
  pub fn sleeps(&self) -> Vec<Duration> {
    self.lock().sleeps.clone()
  }

  /// Sum of every requested sleep.
  #[must_use]
  pub fn total_slept(&self) -> Duration {
    self.lock().sleeps.iter().sum()
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, RecordingState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl Default for RecordingClock {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Clock for RecordingClock {
  fn now(&self) -> DateTime<Utc> {
    self.lock().now
  }

  async fn sleep(&self, duration: Duration) {
    {
      let mut state = self.lock();
      state.sleeps.push(duration);
      state.now += chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
    }
    tokio::task::yield_now().await;
  }
}

// ────────────────────────────────────────────
// Stop signal
// ────────────────────────────────────────────

/// Sender half of the external stop signal.
#[derive(Debug)]
pub struct StopHandle {
  tx: watch::Sender<bool>,
}

impl StopHandle {
  /// Ask every session holding a matching [`StopSignal`] to stop.
  pub fn stop(&self) {
    let _ = self.tx.send(true);
  }

  /// A fresh receiver for another session.
  #[must_use]
  pub fn signal(&self) -> StopSignal {
    StopSignal {
      rx: self.tx.subscribe(),
    }
  }
}

/// Receiver half of the external stop signal, checked by session loops.
#[derive(Debug, Clone)]
pub struct StopSignal {
  rx: watch::Receiver<bool>,
}

impl StopSignal {
  /// A signal that can never fire.
  #[must_use]
  pub fn never() -> Self {
    let (_tx, rx) = watch::channel(false);
    Self { rx }
  }

  /// Whether a stop has been requested.
  #[must_use]
  pub fn is_stopped(&self) -> bool {
    *self.rx.borrow()
  }

  /// Resolve once a stop is requested. Never resolves if the handle
  /// was dropped without stopping.
  pub async fn wait(&self) {
    let mut rx = self.rx.clone();
    loop {
      if *rx.borrow_and_update() {
        return;
      }
      if rx.changed().await.is_err() {
        std::future::pending::<()>().await;
      }
    }
  }
}

/// Create a connected stop handle and signal.
#[must_use]
pub fn stop_pair() -> (StopHandle, StopSignal) {
  let (tx, rx) = watch::channel(false);
  (StopHandle { tx }, StopSignal { rx })
}

// ────────────────────────────────────────────
// Cooldowns
// ────────────────────────────────────────────

/// Kinds of randomized waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownKind {
  /// Between reconciliation cycles.
  InterCycle,
  /// Between dependent steps of a multi-step sequence (paired-leg hold).
  InterLeg,
  /// After a batch of closes, before re-observing.
  Settle,
}

/// Inclusive delay window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
  pub min: Duration,
  pub max: Duration,
}

impl Window {
  /// Window from whole seconds.
  #[must_use]
  pub const fn secs(min: u64, max: u64) -> Self {
    Self {
      min: Duration::from_secs(min),
      max: Duration::from_secs(max),
    }
  }
}

/// Windows for each cooldown kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownWindows {
  pub inter_cycle: Window,
  pub inter_leg: Window,
  pub settle: Window,
}

impl Default for CooldownWindows {
  fn default() -> Self {
    Self {
      inter_cycle: Window::secs(420, 600),
      inter_leg: Window::secs(420, 600),
      settle: Window::secs(10, 10),
    }
  }
}

impl CooldownWindows {
  const fn window(&self, kind: CooldownKind) -> Window {
    match kind {
      CooldownKind::InterCycle => self.inter_cycle,
      CooldownKind::InterLeg => self.inter_leg,
      CooldownKind::Settle => self.settle,
    }
  }
}

/// Draws randomized delays and sleeps them on the injected clock.
pub struct CooldownScheduler {
  /// Per-kind windows.
  windows: CooldownWindows,
  /// Jitter source.
  rng: Mutex<StdRng>,
  /// Clock all sleeps go through.
  clock: Arc<dyn Clock>,
}

impl CooldownScheduler {
  /// Scheduler seeded from OS entropy.
  #[must_use]
  pub fn new(windows: CooldownWindows, clock: Arc<dyn Clock>) -> Self {
    Self {
      windows,
      rng: Mutex::new(StdRng::from_entropy()),
      clock,
    }
  }

  /// Deterministic scheduler for tests.
  #[must_use]
  pub fn with_seed(windows: CooldownWindows, clock: Arc<dyn Clock>, seed: u64) -> Self {
    Self {
      windows,
      rng: Mutex::new(StdRng::seed_from_u64(seed)),
      clock,
    }
  }

  /// The clock this scheduler sleeps on.
  #[must_use]
  pub fn clock(&self) -> Arc<dyn Clock> {
    Arc::clone(&self.clock)
  }

  /// Draw the next delay for `kind`, uniform over its window.
  pub fn next_delay(&self, kind: CooldownKind) -> Duration {
    let window = self.windows.window(kind);
    if window.max <= window.min {
      return window.min;
    }
    let min_ms = u64::try_from(window.min.as_millis()).unwrap_or(u64::MAX);
    let max_ms = u64::try_from(window.max.as_millis()).unwrap_or(u64::MAX);
    let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
    Duration::from_millis(rng.gen_range(min_ms..=max_ms))
  }

  /// Sleep a drawn delay unless `stop` fires first.
  ///
  /// Returns `false` when interrupted by the stop signal.
  pub async fn cooldown(&self, kind: CooldownKind, stop: &StopSignal) -> bool {
    if stop.is_stopped() {
      return false;
    }
    let delay = self.next_delay(kind);
    debug!(kind = ?kind, delay_secs = delay.as_secs(), "Cooling down");
    tokio::select! {
      biased;
      () = stop.wait() => false,
      () = self.clock.sleep(delay) => true,
    }
  }

  /// Sleep a drawn delay, ignoring the stop signal.
  pub async fn pause(&self, kind: CooldownKind) {
    let delay = self.next_delay(kind);
    self.clock.sleep(delay).await;
  }
}
