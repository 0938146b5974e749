//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::info;

use super::{AppConfig, WindowConfig};

/// Environment variable overriding the config file path.
pub const CONFIG_PATH_ENV: &str = "RECONCILER_CONFIG";

/// Config path from the environment, falling back to `config.toml`.
#[must_use]
pub fn config_path() -> String {
  std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string())
}

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    books = config.books.len(),
    pairs = config.pairs.len(),
    rotations = config.rotations.len(),
    dry_run = config.bot.dry_run,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration text.
///
/// # Errors
/// Returns error on TOML syntax errors or failed validation.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig =
    toml::from_str(content).with_context(|| "Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

fn validate_window(name: &str, window: WindowConfig) -> Result<()> {
  anyhow::ensure!(
    window.min_secs <= window.max_secs,
    "cooldown.{name} min_secs ({}) must not exceed max_secs ({})",
    window.min_secs,
    window.max_secs
  );
  Ok(())
}

fn validate_fraction(what: &str, value: Decimal) -> Result<()> {
  anyhow::ensure!(
    value >= Decimal::ZERO && value < Decimal::ONE,
    "{what} must be in [0, 1), got {value}"
  );
  Ok(())
}

/// Validate all configuration parameters.
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    config.session_count() > 0,
    "At least one session ([[books]], [[pairs]] or [[rotations]]) must be configured"
  );

  // Engine
  anyhow::ensure!(
    config.engine.fetch_attempts >= 1,
    "engine.fetch_attempts must be at least 1"
  );
  anyhow::ensure!(
    config.engine.max_actions_per_cycle >= 1,
    "engine.max_actions_per_cycle must be at least 1"
  );

  // Cooldowns
  validate_window("inter_cycle", config.cooldown.inter_cycle)?;
  validate_window("inter_leg", config.cooldown.inter_leg)?;
  validate_window("settle", config.cooldown.settle)?;

  // Live endpoints
  if !config.bot.dry_run {
    anyhow::ensure!(
      !config.ledger.rpc_url.is_empty(),
      "ledger.rpc_url must not be empty outside dry-run"
    );
    anyhow::ensure!(
      !config.venue.base_url.is_empty(),
      "venue.base_url must not be empty outside dry-run"
    );
    anyhow::ensure!(
      !config.venue.signer_url.is_empty(),
      "venue.signer_url must not be empty outside dry-run"
    );
    anyhow::ensure!(
      config.venue.min_request_interval_ms > 0,
      "venue.min_request_interval_ms must be positive"
    );
  }
  if config.notify.webhook_url.is_some() {
    anyhow::ensure!(
      config.notify.webhook_timeout_ms > 0,
      "notify.webhook_timeout_ms must be positive"
    );
  }
  anyhow::ensure!(
    config.ledger.max_status_errors >= 1,
    "ledger.max_status_errors must be at least 1"
  );

  for book in &config.books {
    anyhow::ensure!(!book.market.is_empty(), "Book {} has empty market", book.name);
    anyhow::ensure!(
      book.target_total > 0 && book.target_total % 2 == 0,
      "Book {} target_total must be a positive even number, got {}",
      book.name,
      book.target_total
    );
    validate_fraction(&format!("Book {} buy_offset", book.name), book.buy_offset)?;
    validate_fraction(&format!("Book {} sell_offset", book.name), book.sell_offset)?;
  }

  for pair in &config.pairs {
    anyhow::ensure!(
      pair.long_account != pair.short_account,
      "Pair {} must use two distinct accounts",
      pair.name
    );
    anyhow::ensure!(
      pair.total_amount > Decimal::ZERO,
      "Pair {} total_amount must be positive",
      pair.name
    );
    validate_fraction(&format!("Pair {} price_offset", pair.name), pair.price_offset)?;
    validate_fraction(&format!("Pair {} close_offset", pair.name), pair.close_offset)?;
  }

  for rotation in &config.rotations {
    anyhow::ensure!(
      rotation.route.len() >= 2,
      "Rotation {} route needs at least two assets",
      rotation.name
    );
    anyhow::ensure!(
      rotation.initial_amount > 0,
      "Rotation {} initial_amount must be positive",
      rotation.name
    );
  }

  let mut names: Vec<&str> = config
    .books
    .iter()
    .map(|b| b.name.as_str())
    .chain(config.pairs.iter().map(|p| p.name.as_str()))
    .chain(config.rotations.iter().map(|r| r.name.as_str()))
    .collect();
  names.sort_unstable();
  let total = names.len();
  names.dedup();
  anyhow::ensure!(names.len() == total, "Session names must be unique");

  Ok(())
}
