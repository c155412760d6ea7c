//! Run lifecycle: verify the session, walk the search results, report.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::behavior::{BehaviorSimulator, InteractionKind};
use crate::errors::RunError;
use crate::state::AppState;
use crate::surface::{AutomationSurface, BoardSearch, ListingSource, UiElement};
use crate::walker::{ListingReport, ListingWalker, StopReason, WalkContext};

const LOGIN_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Offsets applied to `BEHAVIOR_SEED` so each simulator draws its own sequence.
const WALK_STREAM: u64 = 0;
const SEARCH_STREAM: u64 = 1;
const SESSION_STREAM: u64 = 2;

fn stream_seed(seed: Option<u64>, stream: u64) -> Option<u64> {
    seed.map(|s| s.wrapping_add(stream))
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub discovered: u32,
    pub skipped_duplicate: u32,
    pub skipped_no_match: u32,
    pub applied: u32,
    pub failed: u32,
    pub ledger_conflicts: u32,
    pub ledger_write_failures: u32,
    pub stop_reason: StopReason,
    /// Ledger size after the run; `None` if it could not be read.
    pub ledger_total: Option<u64>,
    pub listings: Vec<ListingReport>,
}

pub struct Orchestrator {
    state: AppState,
    stop: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Full run against the board's search results.
    pub async fn run(&self, surface: &mut dyn AutomationSurface) -> Result<RunSummary, RunError> {
        let config = &self.state.config;
        let queries = config.search.queries();
        info!(
            "Searching {} queries (remote only: {})",
            queries.len(),
            config.search.remote_only
        );
        let mut source = BoardSearch::new(
            &config.board_base_url,
            &queries,
            config.search.min_salary,
            config.search.max_pages,
            self.state.selectors.clone(),
            BehaviorSimulator::from_seed_option(stream_seed(config.behavior_seed, SEARCH_STREAM)),
        );
        self.run_with_source(surface, &mut source).await
    }

    /// Same as `run`, with the listings supplied by the caller.
    pub async fn run_with_source(
        &self,
        surface: &mut dyn AutomationSurface,
        source: &mut dyn ListingSource,
    ) -> Result<RunSummary, RunError> {
        self.verify_session(surface).await?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!("Run {run_id} started");

        let config = &self.state.config;
        let ctx = WalkContext {
            ledger: self.state.ledger.as_ref(),
            scorer: &self.state.scorer,
            selectors: &self.state.selectors,
            policy: config.reapply_policy,
            budget: config.search.budget(),
        };
        let simulator =
            BehaviorSimulator::from_seed_option(stream_seed(config.behavior_seed, WALK_STREAM));
        let result = ListingWalker::new(ctx, surface, simulator)
            .with_stop_flag(self.stop.clone())
            .walk(source)
            .await;

        let ledger_total = match self.state.ledger.count().await {
            Ok(total) => Some(total),
            Err(e) => {
                warn!("Could not count ledger rows: {e}");
                None
            }
        };

        let stats = result.stats;
        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            discovered: stats.discovered,
            skipped_duplicate: stats.skipped_duplicate,
            skipped_no_match: stats.skipped_no_match,
            applied: stats.applied,
            failed: stats.failed,
            ledger_conflicts: stats.ledger_conflicts,
            ledger_write_failures: stats.ledger_write_failures,
            stop_reason: result.stop_reason,
            ledger_total,
            listings: result.listings,
        };

        log_summary(&summary);
        if let Some(path) = &config.report_path {
            write_report(path, &summary).await;
        }
        Ok(summary)
    }

    /// Fails fast unless the board shows the logged-in account link.
    async fn verify_session(&self, surface: &mut dyn AutomationSurface) -> Result<(), RunError> {
        let base_url = &self.state.config.board_base_url;
        surface
            .navigate(base_url)
            .await
            .map_err(|e| RunError::Authentication(format!("could not open {base_url}: {e}")))?;

        let mut simulator = BehaviorSimulator::from_seed_option(stream_seed(
            self.state.config.behavior_seed,
            SESSION_STREAM,
        ));
        tokio::time::sleep(simulator.delay(InteractionKind::PageLoad)).await;

        let logged_in = surface
            .wait_for(
                &self.state.selectors.present(UiElement::AccountLink),
                LOGIN_CHECK_TIMEOUT,
            )
            .await
            .map_err(|e| RunError::Authentication(e.to_string()))?;
        if !logged_in {
            return Err(RunError::Authentication(
                "session is not logged in; export fresh cookies to SESSION_COOKIES_PATH".into(),
            ));
        }
        info!("Session is authenticated");
        Ok(())
    }
}

fn log_summary(summary: &RunSummary) {
    info!(
        "Run {} finished ({:?}): discovered={} duplicate={} no_match={} applied={} failed={}",
        summary.run_id,
        summary.stop_reason,
        summary.discovered,
        summary.skipped_duplicate,
        summary.skipped_no_match,
        summary.applied,
        summary.failed,
    );
    if summary.ledger_conflicts > 0 || summary.ledger_write_failures > 0 {
        warn!(
            "Ledger conflicts: {}, write failures: {}",
            summary.ledger_conflicts, summary.ledger_write_failures
        );
    }
    if let Some(total) = summary.ledger_total {
        info!("Ledger now holds {total} applications");
    }
}

async fn write_report(path: &Path, summary: &RunSummary) {
    let json = match serde_json::to_vec_pretty(summary) {
        Ok(json) => json,
        Err(e) => {
            warn!("Could not serialize run report: {e}");
            return;
        }
    };
    match tokio::fs::write(path, json).await {
        Ok(()) => info!("Run report written to {}", path.display()),
        Err(e) => warn!("Could not write run report to {}: {e}", path.display()),
    }
}
