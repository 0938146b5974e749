//! Venue Reconciler - Entry Point
//!
//! Initializes configuration, logging, ledger and venue connections,
//! and one session loop per configured session. Runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON or human-readable)
//! 3. Stop signal shared by every task
//! 4. Notifier registry (log, webhook, journal, metrics, health)
//! 5. Spawn metrics and health servers
//! 6. Ledger + venue connections (paper exchange in dry-run)
//! 7. Spawn one session loop per book, pair, and rotation
//! 8. Wait for SIGINT → stop → drain sessions (a second SIGINT forces exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use venue_reconciler::adapters::http::{VenueAuth, VenueClientConfig, VenueHttpClient};
use venue_reconciler::adapters::ledger::JsonRpcLedger;
use venue_reconciler::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use venue_reconciler::adapters::notify::{JournalNotifier, LogNotifier, WebhookConfig, WebhookNotifier};
use venue_reconciler::adapters::paper::PaperExchange;
use venue_reconciler::adapters::signer::RemoteSigner;
use venue_reconciler::adapters::venue::{RestBookVenue, RestPerpLeg, RestSwapVenue};
use venue_reconciler::config::{self, AppConfig, BookSessionConfig, PairSessionConfig, RotationSessionConfig};
use venue_reconciler::domain::types::{PairTarget, TargetState};
use venue_reconciler::ports::ledger::LedgerClient;
use venue_reconciler::ports::notifier::{Notifier, NotifierRegistry};
use venue_reconciler::ports::perp::PerpLeg;
use venue_reconciler::ports::signer::IntentSigner;
use venue_reconciler::ports::swap::SwapVenue;
use venue_reconciler::ports::venue::VenueAdapter;
use venue_reconciler::usecases::coordinator::{PairPolicy, PairedLegCoordinator};
use venue_reconciler::usecases::engine::{BookPolicy, ReconciliationEngine};
use venue_reconciler::usecases::rotation::{RotationPlan, SwapRotation};
use venue_reconciler::usecases::scheduler::{stop_pair, Clock, CooldownScheduler, StopSignal, TokioClock};
use venue_reconciler::usecases::session::{drain_sessions, BookSession, CycleRunner, SessionLoop};
use venue_reconciler::usecases::submitter::TransactionSubmitter;

/// Live connections shared by every session.
struct LiveStack {
    ledger: Arc<dyn LedgerClient>,
    client: Arc<VenueHttpClient>,
    signer: Arc<dyn IntentSigner>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config = config::loader::load_config(&config::loader::config_path())
        .context("Failed to load configuration")?;

    // ── 2. Initialize logging ───────────────────────────────
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.bot.log_level));
    if config.bot.log_format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!(
        name = %config.bot.name,
        version = env!("CARGO_PKG_VERSION"),
        dry_run = config.bot.dry_run,
        books = config.books.len(),
        pairs = config.pairs.len(),
        rotations = config.rotations.len(),
        "Starting venue reconciler"
    );

    // ── 3. Stop signal ──────────────────────────────────────
    let (stop_handle, stop) = stop_pair();

    // ── 4. Notification sinks ───────────────────────────────
    let health = Arc::new(HealthState::new());
    let mut registry = NotifierRegistry::new();
    registry.register(Arc::new(LogNotifier));
    registry.register(Arc::clone(&health) as Arc<dyn Notifier>);

    if let Some(url) = &config.notify.webhook_url {
        let webhook = WebhookNotifier::new(WebhookConfig {
            url: url.clone(),
            username: config.notify.username.clone(),
            timeout: Duration::from_millis(config.notify.webhook_timeout_ms),
        })
        .context("Failed to create webhook notifier")?;
        registry.register(Arc::new(webhook));
    }
    if let Some(dir) = &config.notify.journal_dir {
        let journal = JournalNotifier::new(dir)
            .await
            .context("Failed to open event journal")?;
        registry.register(Arc::new(journal));
    }

    // ── 5. Metrics and health servers ───────────────────────
    let mut servers: Vec<JoinHandle<()>> = Vec::new();
    if config.metrics.enabled {
        let metrics = Arc::new(MetricsRegistry::new().context("Failed to create metrics")?);
        registry.register(Arc::clone(&metrics) as Arc<dyn Notifier>);
        let bind = config.metrics.bind_address.clone();
        let metrics_stop = stop.clone();
        servers.push(tokio::spawn(async move {
            if let Err(e) = metrics.serve(bind, metrics_stop).await {
                error!(error = %e, "Metrics server failed");
            }
        }));
    }
    let health_server = HealthServer::new(Arc::clone(&health), config.metrics.health_port);
    let health_stop = stop.clone();
    servers.push(tokio::spawn(async move {
        if let Err(e) = health_server.run(health_stop).await {
            error!(error = %e, "Health server failed");
        }
    }));

    let notifier: Arc<dyn Notifier> = Arc::new(registry);

    // ── 6. Ledger and venue connections ─────────────────────
    let live = if config.bot.dry_run {
        warn!("Dry-run mode: every session runs against an in-memory paper exchange");
        None
    } else {
        Some(connect_live(&config)?)
    };

    // ── 7. Spawn session loops ──────────────────────────────
    let clock: Arc<dyn Clock> = Arc::new(TokioClock);
    let mut sessions = Vec::new();

    for book in &config.books {
        let runner = book_runner(&config, book, live.as_ref(), &clock);
        sessions.push(spawn_session(&config, runner, &clock, &notifier, &stop));
    }
    for pair in &config.pairs {
        let scheduler = Arc::new(CooldownScheduler::new(config.cooldown.windows(), Arc::clone(&clock)));
        let runner = pair_runner(&config, pair, live.as_ref(), &clock, &scheduler, &stop);
        sessions.push(spawn_loop(runner, scheduler, &notifier, &stop));
    }
    for rotation in &config.rotations {
        let runner = rotation_runner(&config, rotation, live.as_ref(), &clock)?;
        sessions.push(spawn_session(&config, runner, &clock, &notifier, &stop));
    }

    info!(sessions = sessions.len(), "All sessions spawned");

    // ── 8. Wait for SIGINT, then drain ──────────────────────
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for SIGINT");
    }
    info!("SIGINT received, stopping sessions after their current cycle");

    health.begin_shutdown();
    stop_handle.stop();

    // Only a second SIGINT abandons in-flight submissions.
    let second_sigint = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    drain_sessions(sessions, second_sigint).await;

    for server in servers {
        server.abort();
    }

    info!("Shutdown complete");
    Ok(())
}

/// Connect the shared ledger, venue client, and signer.
fn connect_live(config: &AppConfig) -> Result<LiveStack> {
    let ledger = JsonRpcLedger::new(
        config.ledger.rpc_url.clone(),
        Duration::from_millis(config.ledger.timeout_ms),
    )
    .context("Failed to create ledger client")?;

    let auth = match VenueAuth::from_env() {
        Ok(auth) => Some(Arc::new(auth)),
        Err(e) => {
            warn!(error = %e, "Venue credentials missing, sending unauthenticated requests");
            None
        }
    };
    let client = VenueHttpClient::new(
        auth,
        VenueClientConfig {
            base_url: config.venue.base_url.clone(),
            timeout: Duration::from_millis(config.venue.timeout_ms),
            min_request_interval: Duration::from_millis(config.venue.min_request_interval_ms),
            max_retries: config.venue.max_retries,
            ..VenueClientConfig::default()
        },
    )
    .context("Failed to create venue client")?;

    let signer = RemoteSigner::new(
        config.venue.signer_url.clone(),
        Duration::from_millis(config.venue.timeout_ms),
    )
    .context("Failed to create signer client")?;

    Ok(LiveStack {
        ledger: Arc::new(ledger),
        client: Arc::new(client),
        signer: Arc::new(signer),
    })
}

fn book_runner(
    config: &AppConfig,
    book: &BookSessionConfig,
    live: Option<&LiveStack>,
    clock: &Arc<dyn Clock>,
) -> Arc<dyn CycleRunner> {
    let (adapter, ledger): (Arc<dyn VenueAdapter>, Arc<dyn LedgerClient>) = match live {
        Some(live) => (
            Arc::new(RestBookVenue::new(
                Arc::clone(&live.client),
                Arc::clone(&live.signer),
                book.market.clone(),
                book.owner.clone(),
            )) as Arc<dyn VenueAdapter>,
            Arc::clone(&live.ledger),
        ),
        None => {
            let paper = Arc::new(PaperExchange::new(book.owner.clone()));
            paper.set_quote(Decimal::ONE, Decimal::new(105, 2));
            paper.add_inventory(usize::try_from(book.target_total / 2).unwrap_or(0));
            (Arc::clone(&paper) as Arc<dyn VenueAdapter>, paper as Arc<dyn LedgerClient>)
        }
    };

    let submitter = Arc::new(TransactionSubmitter::new(
        ledger,
        Arc::clone(clock),
        config.ledger.submitter(),
    ));
    let policy = BookPolicy {
        buy_layout: book.buy_layout,
        sell_layout: book.sell_layout,
        pricing: book.pricing(),
        refresh_mode: config.engine.refresh_mode,
        max_actions_per_cycle: config.engine.max_actions_per_cycle,
        fetch: config.engine.fetch(),
    };
    let engine = ReconciliationEngine::new(book.name.clone(), submitter, Arc::clone(clock), policy);
    Arc::new(BookSession::new(
        engine,
        adapter,
        TargetState::balanced(book.target_total),
    ))
}

fn pair_runner(
    config: &AppConfig,
    pair: &PairSessionConfig,
    live: Option<&LiveStack>,
    clock: &Arc<dyn Clock>,
    scheduler: &Arc<CooldownScheduler>,
    stop: &StopSignal,
) -> Arc<dyn CycleRunner> {
    let (long, short, ledger): (Arc<dyn PerpLeg>, Arc<dyn PerpLeg>, Arc<dyn LedgerClient>) = match live {
        Some(live) => (
            Arc::new(RestPerpLeg::new(
                Arc::clone(&live.client),
                Arc::clone(&live.signer),
                pair.market.clone(),
                pair.long_account.clone(),
            )) as Arc<dyn PerpLeg>,
            Arc::new(RestPerpLeg::new(
                Arc::clone(&live.client),
                Arc::clone(&live.signer),
                pair.market.clone(),
                pair.short_account.clone(),
            )) as Arc<dyn PerpLeg>,
            Arc::clone(&live.ledger),
        ),
        None => {
            let paper = Arc::new(PaperExchange::new(pair.name.clone()));
            paper.set_perp_market(pair.market.clone(), Decimal::ONE_HUNDRED);
            (
                Arc::new(paper.perp_leg(pair.long_account.clone())) as Arc<dyn PerpLeg>,
                Arc::new(paper.perp_leg(pair.short_account.clone())) as Arc<dyn PerpLeg>,
                paper as Arc<dyn LedgerClient>,
            )
        }
    };

    let submitter = Arc::new(TransactionSubmitter::new(
        ledger,
        Arc::clone(clock),
        config.ledger.submitter(),
    ));
    let policy = PairPolicy {
        price_offset: pair.price_offset,
        close_offset: pair.close_offset,
        fetch: config.engine.fetch(),
    };
    Arc::new(PairedLegCoordinator::new(
        pair.name.clone(),
        long,
        short,
        submitter,
        Arc::clone(scheduler),
        stop.clone(),
        PairTarget::balanced(pair.total_amount),
        policy,
    ))
}

fn rotation_runner(
    config: &AppConfig,
    rotation: &RotationSessionConfig,
    live: Option<&LiveStack>,
    clock: &Arc<dyn Clock>,
) -> Result<Arc<dyn CycleRunner>> {
    let (venue, ledger): (Arc<dyn SwapVenue>, Arc<dyn LedgerClient>) = match live {
        Some(live) => (
            Arc::new(RestSwapVenue::new(
                Arc::clone(&live.client),
                Arc::clone(&live.signer),
                rotation.owner.clone(),
            )) as Arc<dyn SwapVenue>,
            Arc::clone(&live.ledger),
        ),
        None => {
            let paper = Arc::new(PaperExchange::new(rotation.owner.clone()));
            paper.set_balance(&rotation.route[0], rotation.initial_amount);
            for (i, input) in rotation.route.iter().enumerate() {
                let output = &rotation.route[(i + 1) % rotation.route.len()];
                paper.set_rate(input, output, Decimal::ONE);
            }
            (Arc::clone(&paper) as Arc<dyn SwapVenue>, paper as Arc<dyn LedgerClient>)
        }
    };

    let submitter = Arc::new(TransactionSubmitter::new(
        ledger,
        Arc::clone(clock),
        config.ledger.submitter(),
    ));
    let plan = RotationPlan {
        route: rotation.route.clone(),
        initial_amount: rotation.initial_amount,
        slippage_bps: rotation.slippage_bps,
        fetch: config.engine.fetch(),
    };
    let runner = SwapRotation::new(rotation.name.clone(), venue, submitter, Arc::clone(clock), plan)
        .with_context(|| format!("Invalid rotation {}", rotation.name))?;
    Ok(Arc::new(runner))
}

/// Spawn a session loop with its own cooldown scheduler.
fn spawn_session(
    config: &AppConfig,
    runner: Arc<dyn CycleRunner>,
    clock: &Arc<dyn Clock>,
    notifier: &Arc<dyn Notifier>,
    stop: &StopSignal,
) -> JoinHandle<()> {
    let scheduler = Arc::new(CooldownScheduler::new(config.cooldown.windows(), Arc::clone(clock)));
    spawn_loop(runner, scheduler, notifier, stop)
}

fn spawn_loop(
    runner: Arc<dyn CycleRunner>,
    scheduler: Arc<CooldownScheduler>,
    notifier: &Arc<dyn Notifier>,
    stop: &StopSignal,
) -> JoinHandle<()> {
    let session = SessionLoop::new(runner, scheduler, Arc::clone(notifier), stop.clone());
    tokio::spawn(async move {
        session.run(None).await;
    })
}
