mod behavior;
mod config;
mod db;
mod errors;
mod ledger;
mod llm_client;
mod matching;
mod models;
mod orchestrator;
mod state;
mod surface;
mod walker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, LedgerBackend};
use crate::errors::RunError;
use crate::ledger::{CsvLedger, Ledger, PgLedger};
use crate::orchestrator::{Orchestrator, RunSummary};
use crate::state::AppState;
use crate::surface::{BrowserOptions, WebDriverSession};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().map_err(|e| RunError::Config(format!("{e:#}")))?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting applier v{}", env!("CARGO_PKG_VERSION"));

    match run(config).await {
        Ok(summary) => {
            info!("Done: {} applied, {} failed", summary.applied, summary.failed);
            Ok(())
        }
        Err(e) => {
            error!(code = e.code(), "Run aborted: {e}");
            Err(e.into())
        }
    }
}

async fn run(config: Config) -> Result<RunSummary, RunError> {
    let ledger: Arc<dyn Ledger> = match &config.ledger {
        LedgerBackend::Csv(path) => Arc::new(CsvLedger::open(path.clone()).await?),
        LedgerBackend::Postgres(url) => Arc::new(PgLedger::connect(url).await?),
    };
    info!(
        "Ledger backend: {} ({} applications recorded)",
        ledger.backend(),
        ledger.count().await?
    );

    let state = AppState::new(config, ledger)?;
    info!("Match scoring: {:?}", state.scorer.mode());

    let config = &state.config;
    let options = BrowserOptions::with_random_agent(config.headless);
    let mut session = WebDriverSession::start(&config.webdriver_url, &options).await?;
    info!("Browser session started ({})", options.user_agent);

    let base_url = config.board_base_url.clone();
    let cookies_path = config.session_cookies_path.clone();

    let stop = Arc::new(AtomicBool::new(false));
    tokio::spawn({
        let stop = stop.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing the current listing");
                stop.store(true, Ordering::SeqCst);
            }
        }
    });

    let orchestrator = Orchestrator::new(state).with_stop_flag(stop);
    let result = async {
        let loaded = session
            .load_cookies(&base_url, &cookies_path)
            .await
            .map_err(|e| RunError::Authentication(format!("could not load session cookies: {e}")))?;
        info!("Loaded {loaded} session cookies");
        orchestrator.run(&mut session).await
    }
    .await;

    if let Err(e) = session.quit().await {
        warn!("Could not close browser session: {e}");
    }
    result
}
