//! Notifier Port - Terminal Event Delivery
//!
//! Sessions hand every terminal report to a notifier. Delivery is
//! fire-and-forget: `notify` returns immediately and a failing sink can
//! never influence the reconciliation loop.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::report::{CycleReport, RoundReport, SwapReport};
use crate::error::Severity;

/// Events emitted by sessions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
  /// A session loop started.
  SessionStarted { session: String, kind: String },
  /// An order-book reconciliation cycle finished.
  CycleCompleted(CycleReport),
  /// A paired-leg round finished.
  RoundCompleted(RoundReport),
  /// A paired-leg round left one side unhedged.
  AsymmetricExposure { session: String, detail: String },
  /// A swap-rotation hop finished.
  SwapCompleted(SwapReport),
  /// A session loop observed the stop signal and exited.
  SessionStopped { session: String, cycles: u64 },
}

impl Event {
  /// Session the event belongs to.
  #[must_use]
  pub fn session(&self) -> &str {
    match self {
      Self::SessionStarted { session, .. }
      | Self::AsymmetricExposure { session, .. }
      | Self::SessionStopped { session, .. } => session,
      Self::CycleCompleted(r) => &r.session,
      Self::RoundCompleted(r) => &r.session,
      Self::SwapCompleted(r) => &r.session,
    }
  }

  /// Routing severity.
  #[must_use]
  pub fn severity(&self) -> Severity {
    match self {
      Self::AsymmetricExposure { .. } => Severity::Critical,
      Self::RoundCompleted(r) if r.is_critical() => Severity::Critical,
      _ => Severity::Warning,
    }
  }
}

/// Trait for notification handlers.
///
/// Implementations must return quickly; slow delivery (HTTP, disk) is
/// spawned onto the runtime.
pub trait Notifier: Send + Sync {
  /// Handle an event.
  fn notify(&self, event: Event);
}

/// Fans every event out to all registered notifiers.
#[derive(Default, Clone)]
pub struct NotifierRegistry {
  notifiers: Vec<Arc<dyn Notifier>>,
}

impl NotifierRegistry {
  /// Create an empty registry.
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a notifier.
  pub fn register(&mut self, notifier: Arc<dyn Notifier>) {
    self.notifiers.push(notifier);
  }

  /// Number of registered notifiers.
  #[must_use]
  pub fn len(&self) -> usize {
    self.notifiers.len()
  }

  /// Whether no notifier is registered.
  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.notifiers.is_empty()
  }
}

impl Notifier for NotifierRegistry {
  fn notify(&self, event: Event) {
    for notifier in &self.notifiers {
      notifier.notify(event.clone());
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Mutex;

  #[derive(Default)]
  struct Collecting(Mutex<Vec<String>>);

  impl Notifier for Collecting {
    fn notify(&self, event: Event) {
      self.0.lock().unwrap().push(event.session().to_string());
    }
  }

  #[test]
  fn test_registry_fans_out() {
    let a = Arc::new(Collecting::default());
    let b = Arc::new(Collecting::default());
    let mut registry = NotifierRegistry::new();
    registry.register(a.clone());
    registry.register(b.clone());

    registry.notify(Event::SessionStopped {
      session: "s1".into(),
      cycles: 3,
    });

    assert_eq!(registry.len(), 2);
    assert_eq!(a.0.lock().unwrap().as_slice(), ["s1"]);
    assert_eq!(b.0.lock().unwrap().as_slice(), ["s1"]);
  }

  #[test]
  fn test_asymmetric_exposure_is_critical() {
    let event = Event::AsymmetricExposure {
      session: "pair".into(),
      detail: "long open, short flat".into(),
    };
    assert_eq!(event.severity(), Severity::Critical);
  }
}
