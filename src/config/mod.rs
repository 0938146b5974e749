//! Configuration Module - TOML-based Session Configuration
//!
//! Loads and validates configuration from `config.toml`. Credentials
//! never live here; they come from environment variables. The file is
//! read once at startup and every session receives an immutable copy,
//! so changing a target means starting a new session.

pub mod loader;

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::planner::{PricingPolicy, RefreshMode, SellMode};
use crate::domain::types::Layout;
use crate::usecases::retry::FetchPolicy;
use crate::usecases::scheduler::{CooldownWindows, Window};
use crate::usecases::submitter::SubmitterConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Process identity and logging.
  pub bot: BotConfig,
  /// Ledger connection and validity window.
  #[serde(default)]
  pub ledger: LedgerConfig,
  /// Engine retry and action budgets.
  #[serde(default)]
  pub engine: EngineConfig,
  /// Randomized delay windows.
  #[serde(default)]
  pub cooldown: CooldownConfig,
  /// Venue HTTP endpoints and pacing.
  #[serde(default)]
  pub venue: VenueConfig,
  /// Notification sinks.
  #[serde(default)]
  pub notify: NotifyConfig,
  /// Metrics and health endpoints.
  #[serde(default)]
  pub metrics: MetricsConfig,
  /// Order-book reconciliation sessions.
  #[serde(default)]
  pub books: Vec<BookSessionConfig>,
  /// Delta-neutral paired-leg sessions.
  #[serde(default)]
  pub pairs: Vec<PairSessionConfig>,
  /// Swap-rotation sessions.
  #[serde(default)]
  pub rotations: Vec<RotationSessionConfig>,
}

impl AppConfig {
  /// Total number of configured sessions.
  #[must_use]
  pub fn session_count(&self) -> usize {
    self.books.len() + self.pairs.len() + self.rotations.len()
  }
}

/// Process identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
  /// Human-readable instance name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// `json` for structured output, anything else for human-readable.
  #[serde(default = "default_log_format")]
  pub log_format: String,
  /// Run every session against the in-memory paper exchange.
  #[serde(default)]
  pub dry_run: bool,
}

/// Ledger connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
  /// JSON-RPC endpoint.
  #[serde(default)]
  pub rpc_url: String,
  /// Request timeout (milliseconds).
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
  /// Blocks an intent stays valid after its broadcast reference height.
  #[serde(default = "default_validity_window")]
  pub validity_window_blocks: u64,
  /// Delay between confirmation polls (milliseconds).
  #[serde(default = "default_poll_interval_ms")]
  pub poll_interval_ms: u64,
  /// Consecutive status errors before an outcome becomes unknown.
  #[serde(default = "default_max_status_errors")]
  pub max_status_errors: u32,
}

impl Default for LedgerConfig {
  fn default() -> Self {
    Self {
      rpc_url: String::new(),
      timeout_ms: default_timeout_ms(),
      validity_window_blocks: default_validity_window(),
      poll_interval_ms: default_poll_interval_ms(),
      max_status_errors: default_max_status_errors(),
    }
  }
}

impl LedgerConfig {
  /// Submitter tuning derived from this section.
  #[must_use]
  pub const fn submitter(&self) -> SubmitterConfig {
    SubmitterConfig {
      validity_window_blocks: self.validity_window_blocks,
      poll_interval: Duration::from_millis(self.poll_interval_ms),
      max_status_errors: self.max_status_errors,
    }
  }
}

/// Engine configuration shared by every session.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
  /// Attempts per venue read before `AdapterUnavailable`.
  #[serde(default = "default_fetch_attempts")]
  pub fetch_attempts: u32,
  /// Fixed delay between read attempts (milliseconds).
  #[serde(default = "default_fetch_retry_delay_ms")]
  pub fetch_retry_delay_ms: u64,
  /// Maximum actions issued per cycle.
  #[serde(default = "default_max_actions")]
  pub max_actions_per_cycle: u64,
  /// Refresh behavior for balanced sides.
  #[serde(default)]
  pub refresh_mode: RefreshMode,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      fetch_attempts: default_fetch_attempts(),
      fetch_retry_delay_ms: default_fetch_retry_delay_ms(),
      max_actions_per_cycle: default_max_actions(),
      refresh_mode: RefreshMode::default(),
    }
  }
}

impl EngineConfig {
  /// Read retry budget.
  #[must_use]
  pub const fn fetch(&self) -> FetchPolicy {
    FetchPolicy {
      attempts: self.fetch_attempts,
      delay: Duration::from_millis(self.fetch_retry_delay_ms),
    }
  }
}

/// Inclusive delay window in seconds.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WindowConfig {
  pub min_secs: u64,
  pub max_secs: u64,
}

impl From<WindowConfig> for Window {
  fn from(w: WindowConfig) -> Self {
    Self::secs(w.min_secs, w.max_secs)
  }
}

/// Cooldown windows.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CooldownConfig {
  /// Between reconciliation cycles.
  #[serde(default = "default_inter_cycle")]
  pub inter_cycle: WindowConfig,
  /// Hold between opening and closing paired legs.
  #[serde(default = "default_inter_leg")]
  pub inter_leg: WindowConfig,
  /// Wait after closes before verifying.
  #[serde(default = "default_settle")]
  pub settle: WindowConfig,
}

impl Default for CooldownConfig {
  fn default() -> Self {
    Self {
      inter_cycle: default_inter_cycle(),
      inter_leg: default_inter_leg(),
      settle: default_settle(),
    }
  }
}

impl CooldownConfig {
  /// Scheduler windows.
  #[must_use]
  pub fn windows(&self) -> CooldownWindows {
    CooldownWindows {
      inter_cycle: self.inter_cycle.into(),
      inter_leg: self.inter_leg.into(),
      settle: self.settle.into(),
    }
  }
}

/// Venue HTTP configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
  /// REST base URL.
  #[serde(default)]
  pub base_url: String,
  /// Request timeout (milliseconds).
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
  /// Minimum spacing between venue requests (milliseconds).
  #[serde(default = "default_min_request_interval_ms")]
  pub min_request_interval_ms: u64,
  /// Retries on 429 / 5xx.
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  /// External signing service URL.
  #[serde(default)]
  pub signer_url: String,
}

impl Default for VenueConfig {
  fn default() -> Self {
    Self {
      base_url: String::new(),
      timeout_ms: default_timeout_ms(),
      min_request_interval_ms: default_min_request_interval_ms(),
      max_retries: default_max_retries(),
      signer_url: String::new(),
    }
  }
}

/// Notification sink configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyConfig {
  /// Discord-compatible webhook URL.
  pub webhook_url: Option<String>,
  /// Display name on webhook posts.
  #[serde(default = "default_webhook_username")]
  pub username: String,
  /// Per-post timeout in milliseconds.
  #[serde(default = "default_webhook_timeout_ms")]
  pub webhook_timeout_ms: u64,
  /// Directory for the JSONL event journal.
  pub journal_dir: Option<String>,
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

/// One order-book reconciliation session.
#[derive(Debug, Clone, Deserialize)]
pub struct BookSessionConfig {
  /// Session name.
  pub name: String,
  /// Venue market / collection identifier.
  pub market: String,
  /// Account whose commitments are reconciled.
  pub owner: String,
  /// Total units, split evenly between sides.
  pub target_total: u64,
  #[serde(default = "default_buy_layout")]
  pub buy_layout: Layout,
  #[serde(default)]
  pub sell_layout: Layout,
  /// Fraction below the reference bid for buy-side commitments.
  #[serde(default)]
  pub buy_offset: Decimal,
  /// Fraction away from the reference ask for sell-side commitments.
  #[serde(default)]
  pub sell_offset: Decimal,
  #[serde(default)]
  pub sell_mode: SellMode,
}

impl BookSessionConfig {
  /// Pricing policy of this session.
  #[must_use]
  pub const fn pricing(&self) -> PricingPolicy {
    PricingPolicy {
      buy_offset: self.buy_offset,
      sell_offset: self.sell_offset,
      sell_mode: self.sell_mode,
    }
  }
}

/// One delta-neutral paired-leg session.
#[derive(Debug, Clone, Deserialize)]
pub struct PairSessionConfig {
  pub name: String,
  /// Perp market both legs trade.
  pub market: String,
  pub long_account: String,
  pub short_account: String,
  /// Total size, split evenly between the legs.
  pub total_amount: Decimal,
  #[serde(default = "default_price_offset")]
  pub price_offset: Decimal,
  #[serde(default = "default_close_offset")]
  pub close_offset: Decimal,
}

/// One swap-rotation session.
#[derive(Debug, Clone, Deserialize)]
pub struct RotationSessionConfig {
  pub name: String,
  pub owner: String,
  /// Closed route of asset ids.
  pub route: Vec<String>,
  /// Base units of the first asset swapped on the first hop.
  pub initial_amount: u64,
  #[serde(default = "default_slippage_bps")]
  pub slippage_bps: u16,
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_log_format() -> String {
  "json".to_string()
}

fn default_true() -> bool {
  true
}

fn default_timeout_ms() -> u64 {
  30_000
}

fn default_validity_window() -> u64 {
  150
}

fn default_poll_interval_ms() -> u64 {
  2_000
}

fn default_max_status_errors() -> u32 {
  10
}

fn default_fetch_attempts() -> u32 {
  5
}

fn default_fetch_retry_delay_ms() -> u64 {
  3_000
}

fn default_max_actions() -> u64 {
  20
}

fn default_inter_cycle() -> WindowConfig {
  WindowConfig {
    min_secs: 420,
    max_secs: 600,
  }
}

fn default_inter_leg() -> WindowConfig {
  WindowConfig {
    min_secs: 420,
    max_secs: 600,
  }
}

fn default_settle() -> WindowConfig {
  WindowConfig {
    min_secs: 10,
    max_secs: 10,
  }
}

fn default_min_request_interval_ms() -> u64 {
  1_500
}

fn default_max_retries() -> u32 {
  3
}

fn default_webhook_username() -> String {
  "venue-reconciler".to_string()
}

fn default_webhook_timeout_ms() -> u64 {
  10_000
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}

fn default_buy_layout() -> Layout {
  Layout::Pooled
}

fn default_price_offset() -> Decimal {
  Decimal::new(1, 2)
}

fn default_close_offset() -> Decimal {
  Decimal::new(2, 2)
}

fn default_slippage_bps() -> u16 {
  50
}
