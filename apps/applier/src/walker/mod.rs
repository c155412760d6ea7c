//! Listing Walker: the per-listing state machine.
//!
//! ```text
//! Discovered -> Deduped -> Scored -> Skipped
//!                                 -> Applying -> Applied | ApplyFailed
//! ```
//!
//! One listing at a time, each one reaching a terminal state before the
//! budget is checked again. Nothing that goes wrong with a single listing
//! ends the walk.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use serde::Serialize;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::behavior::{BehaviorSimulator, InteractionKind, Point, Viewport};
use crate::ledger::{Ledger, RecordOutcome, ReapplyPolicy};
use crate::matching::MatchScorer;
use crate::models::Listing;
use crate::surface::{
    AutomationSurface, ElementHandle, ListingSource, SelectorRegistry, SurfaceError, UiElement,
};

pub mod budget;

pub use budget::{RunBudget, StopReason};

const SEND_BUTTON_TIMEOUT: Duration = Duration::from_secs(10);
const SUCCESS_TIMEOUT: Duration = Duration::from_secs(15);
/// Reading scroll stops here on long pages; the apply button sits near the top.
const MAX_SCROLL_PX: u32 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingState {
    Discovered,
    Deduped,
    Scored,
    Skipped,
    Applying,
    Applied,
    ApplyFailed,
}

/// What became of the ledger write after a confirmed application.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerWrite {
    Inserted,
    Updated,
    /// Another writer recorded the URL first.
    Conflict,
    Failed(String),
}

impl From<RecordOutcome> for LedgerWrite {
    fn from(outcome: RecordOutcome) -> Self {
        match outcome {
            RecordOutcome::Inserted => LedgerWrite::Inserted,
            RecordOutcome::Updated => LedgerWrite::Updated,
            RecordOutcome::AlreadyRecorded => LedgerWrite::Conflict,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ListingOutcome {
    SkippedDuplicate,
    SkippedNoMatch { confidence: u8, reason: String },
    Applied { confidence: u8, ledger: LedgerWrite },
    ApplyFailed { reason: String },
}

impl ListingOutcome {
    pub fn state(&self) -> ListingState {
        match self {
            ListingOutcome::SkippedDuplicate | ListingOutcome::SkippedNoMatch { .. } => {
                ListingState::Skipped
            }
            ListingOutcome::Applied { .. } => ListingState::Applied,
            ListingOutcome::ApplyFailed { .. } => ListingState::ApplyFailed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingReport {
    pub url: String,
    pub title: String,
    #[serde(flatten)]
    pub outcome: ListingOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WalkStats {
    pub discovered: u32,
    pub skipped_duplicate: u32,
    pub skipped_no_match: u32,
    pub applied: u32,
    pub failed: u32,
    pub ledger_conflicts: u32,
    pub ledger_write_failures: u32,
}

impl WalkStats {
    fn count(&mut self, outcome: &ListingOutcome) {
        match outcome {
            ListingOutcome::SkippedDuplicate => self.skipped_duplicate += 1,
            ListingOutcome::SkippedNoMatch { .. } => self.skipped_no_match += 1,
            ListingOutcome::ApplyFailed { .. } => self.failed += 1,
            ListingOutcome::Applied { ledger, .. } => {
                self.applied += 1;
                match ledger {
                    LedgerWrite::Conflict => self.ledger_conflicts += 1,
                    LedgerWrite::Failed(_) => self.ledger_write_failures += 1,
                    LedgerWrite::Inserted | LedgerWrite::Updated => {}
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct WalkResult {
    pub stats: WalkStats,
    pub listings: Vec<ListingReport>,
    pub stop_reason: StopReason,
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("page says this listing was already applied to")]
    AlreadyAppliedBanner,

    #[error("{0} not found")]
    MissingElement(UiElement),

    #[error("no success indicator after sending")]
    Unconfirmed,

    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

/// Everything the walker reads but does not own.
pub struct WalkContext<'a> {
    pub ledger: &'a dyn Ledger,
    pub scorer: &'a MatchScorer,
    pub selectors: &'a SelectorRegistry,
    pub policy: ReapplyPolicy,
    pub budget: RunBudget,
}

pub struct ListingWalker<'a> {
    ctx: WalkContext<'a>,
    surface: &'a mut dyn AutomationSurface,
    simulator: BehaviorSimulator,
    stop: Arc<AtomicBool>,
    pointer: Point,
    seen: HashSet<String>,
}

impl<'a> ListingWalker<'a> {
    pub fn new(
        ctx: WalkContext<'a>,
        surface: &'a mut dyn AutomationSurface,
        simulator: BehaviorSimulator,
    ) -> Self {
        Self {
            ctx,
            surface,
            simulator,
            stop: Arc::new(AtomicBool::new(false)),
            pointer: Viewport::default().center(),
            seen: HashSet::new(),
        }
    }

    /// Flag checked between listings; set it to stop the walk gracefully.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub async fn walk(&mut self, source: &mut dyn ListingSource) -> WalkResult {
        let started = Instant::now();
        let mut stats = WalkStats::default();
        let mut listings = Vec::new();

        let stop_reason = loop {
            if let Some(reason) = self.ctx.budget.check(
                stats.applied,
                stats.discovered,
                started,
                self.stop.load(Ordering::SeqCst),
            ) {
                break reason;
            }

            let listing = match source.next_listing(&mut *self.surface).await {
                Ok(Some(listing)) => listing,
                Ok(None) => break StopReason::Exhausted,
                Err(e) => {
                    error!("Listing source failed: {e}");
                    break StopReason::SourceError;
                }
            };

            // Same listing under a second query.
            if !self.seen.insert(listing.url.clone()) {
                debug!("Already seen this run: {}", listing.url);
                continue;
            }
            stats.discovered += 1;

            let span = info_span!("listing", url = %listing.url);
            let outcome = self.process(&listing).instrument(span).await;

            debug!("{:?}", outcome.state());
            stats.count(&outcome);
            let pause = outcome != ListingOutcome::SkippedDuplicate;
            listings.push(ListingReport {
                url: listing.url,
                title: listing.title,
                outcome,
            });

            if pause {
                sleep(self.simulator.delay(InteractionKind::BetweenListings)).await;
            }
        };

        info!("Walk stopped: {stop_reason:?}");
        WalkResult {
            stats,
            listings,
            stop_reason,
        }
    }

    async fn process(&mut self, listing: &Listing) -> ListingOutcome {
        debug!("{:?}: {}", ListingState::Discovered, listing.title);
        let ledger = self.ctx.ledger;

        let eligible = match ledger.is_eligible(&listing.url, self.ctx.policy).await {
            Ok(eligible) => eligible,
            Err(e) => {
                warn!("Ledger lookup failed: {e}");
                return ListingOutcome::ApplyFailed {
                    reason: format!("ledger lookup failed: {e}"),
                };
            }
        };
        if !eligible {
            info!("Skipped: already applied");
            return ListingOutcome::SkippedDuplicate;
        }
        let reapply = match ledger.exists(&listing.url).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!("Ledger lookup failed: {e}");
                return ListingOutcome::ApplyFailed {
                    reason: format!("ledger lookup failed: {e}"),
                };
            }
        };
        debug!("{:?} (reapply: {reapply})", ListingState::Deduped);

        let mut page_open = false;
        let listing = if listing.has_description() {
            listing.clone()
        } else {
            match self.open_and_read(listing).await {
                Ok(detailed) => {
                    page_open = true;
                    detailed
                }
                Err(e) => {
                    warn!("Could not open listing: {e}");
                    return ListingOutcome::ApplyFailed {
                        reason: e.to_string(),
                    };
                }
            }
        };

        let decision = self.ctx.scorer.score(&listing).await;
        debug!(
            "{:?}: apply={} confidence={} source={:?}",
            ListingState::Scored,
            decision.should_apply,
            decision.confidence,
            decision.source
        );
        if !decision.should_apply {
            info!(
                "Skipped: {} (confidence {})",
                decision.reason, decision.confidence
            );
            return ListingOutcome::SkippedNoMatch {
                confidence: decision.confidence,
                reason: decision.reason,
            };
        }

        debug!("{:?}", ListingState::Applying);
        if let Err(e) = self.apply(&listing, page_open, reapply).await {
            warn!("Apply failed: {e}");
            return ListingOutcome::ApplyFailed {
                reason: e.to_string(),
            };
        }

        let today = Local::now().date_naive();
        let write = match ledger
            .record(
                &listing.url,
                &listing.title,
                &listing.company,
                today,
                self.ctx.policy,
            )
            .await
        {
            Ok(RecordOutcome::AlreadyRecorded) => {
                info!("Ledger already had this URL (another writer got there first)");
                LedgerWrite::Conflict
            }
            Ok(outcome) => LedgerWrite::from(outcome),
            Err(e) => {
                error!("Applied but could not record in ledger: {e}");
                LedgerWrite::Failed(e.to_string())
            }
        };

        info!(
            "Applied: {} (confidence {})",
            listing.title, decision.confidence
        );
        ListingOutcome::Applied {
            confidence: decision.confidence,
            ledger: write,
        }
    }

    /// Opens the listing page and fills in description and company.
    async fn open_and_read(&mut self, listing: &Listing) -> Result<Listing, SurfaceError> {
        self.surface.navigate(&listing.url).await?;
        sleep(self.simulator.delay(InteractionKind::PageLoad)).await;

        let mut description = String::new();
        for element in [UiElement::Description, UiElement::DescriptionFallback] {
            if let Some(el) = self.locate(element).await? {
                description = self.surface.read_text(&el).await?;
                if !description.trim().is_empty() {
                    break;
                }
            }
        }

        let company = if listing.company.is_empty() {
            match self.locate(UiElement::Company).await? {
                Some(el) => self.surface.read_text(&el).await?.trim().to_string(),
                None => String::new(),
            }
        } else {
            listing.company.clone()
        };

        Ok(listing.with_details(company, description.trim().to_string()))
    }

    async fn apply(
        &mut self,
        listing: &Listing,
        page_open: bool,
        reapply: bool,
    ) -> Result<(), ApplyError> {
        if !page_open {
            self.surface.navigate(&listing.url).await?;
            sleep(self.simulator.delay(InteractionKind::PageLoad)).await;
        }

        // Read, letting the pointer drift.
        let reading = self
            .simulator
            .reading_delay(listing.description_text.chars().count());
        let viewport = self.surface.viewport().await?;
        let idle = self.simulator.wander_target(viewport);
        self.move_pointer(idle).await?;
        sleep(reading).await;

        let height = self.surface.scrollable_height().await?.min(MAX_SCROLL_PX);
        for step in self.simulator.scroll_plan(height) {
            self.surface.scroll_by(i64::from(step.delta)).await?;
            sleep(step.pause).await;
        }

        if !reapply && self.locate(UiElement::AlreadyAppliedBanner).await?.is_some() {
            return Err(ApplyError::AlreadyAppliedBanner);
        }

        sleep(self.simulator.delay(InteractionKind::Deliberation)).await;

        let (primary, fallback) = if reapply {
            (UiElement::ReapplyButton, UiElement::ApplyButton)
        } else {
            (UiElement::ApplyButton, UiElement::ReapplyButton)
        };
        let button = match self.locate(primary).await? {
            Some(button) => button,
            None => self
                .locate(fallback)
                .await?
                .ok_or(ApplyError::MissingElement(primary))?,
        };
        self.human_click(&button).await?;

        let send_visible = self
            .surface
            .wait_for(&self.ctx.selectors.present(UiElement::SendButton), SEND_BUTTON_TIMEOUT)
            .await?;
        if !send_visible {
            return Err(ApplyError::MissingElement(UiElement::SendButton));
        }
        let send = self
            .locate(UiElement::SendButton)
            .await?
            .ok_or(ApplyError::MissingElement(UiElement::SendButton))?;
        self.human_click(&send).await?;
        sleep(self.simulator.delay(InteractionKind::PageLoad)).await;

        for optional in [UiElement::ConfirmReapplyButton, UiElement::DismissDialogButton] {
            if let Some(el) = self.locate(optional).await? {
                debug!("Clicking {optional}");
                self.human_click(&el).await?;
                sleep(self.simulator.delay(InteractionKind::PageLoad)).await;
            }
        }

        let confirmed = self
            .surface
            .wait_for(&self.ctx.selectors.success_condition(), SUCCESS_TIMEOUT)
            .await?;
        if !confirmed {
            return Err(ApplyError::Unconfirmed);
        }
        Ok(())
    }

    async fn locate(&mut self, element: UiElement) -> Result<Option<ElementHandle>, SurfaceError> {
        self.surface.locate(self.ctx.selectors.selector(element)).await
    }

    /// Scroll into view, glide to a jittered point inside it, pause, click.
    async fn human_click(&mut self, element: &ElementHandle) -> Result<(), SurfaceError> {
        self.surface.scroll_into_view(element).await?;
        sleep(self.simulator.delay(InteractionKind::ScrollPause)).await;

        if let Some(bounds) = self.surface.element_bounds(element).await? {
            let target = self.simulator.click_point(bounds);
            self.move_pointer(target).await?;
        }
        sleep(self.simulator.delay(InteractionKind::BeforeClick)).await;
        self.surface.click(element).await
    }

    async fn move_pointer(&mut self, target: Point) -> Result<(), SurfaceError> {
        let path = self.simulator.pointer_path(self.pointer, target);
        let step = self.simulator.delay(InteractionKind::PointerStep);
        self.surface.move_pointer_through(&path, step).await?;
        self.pointer = target;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{CsvLedger, LedgerError};
    use crate::matching::KeywordRules;
    use crate::models::ApplicationRecord;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use crate::surface::fake::{FakeElement, ScriptedSurface, StaticListings};
    use crate::surface::Selector;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        ledger: CsvLedger,
        scorer: MatchScorer,
        selectors: SelectorRegistry,
        surface: ScriptedSurface,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let ledger = CsvLedger::open(dir.path().join("ledger.csv")).await.unwrap();
        let scorer = MatchScorer::keyword_only(
            KeywordRules::new(vec!["sales".to_string()], vec![]),
            90,
        );
        Fixture {
            _dir: dir,
            ledger,
            scorer,
            selectors: SelectorRegistry::work_ua(),
            surface: ScriptedSurface::new(),
        }
    }

    fn listing(id: u32, title: &str) -> Listing {
        Listing::stub(format!("https://www.work.ua/jobs/{id}/"), title)
            .with_details("Acme".to_string(), "Selling things to businesses".to_string())
    }

    async fn walk(f: &mut Fixture, budget: RunBudget, listings: Vec<Listing>) -> WalkResult {
        let ctx = WalkContext {
            ledger: &f.ledger,
            scorer: &f.scorer,
            selectors: &f.selectors,
            policy: ReapplyPolicy::AfterDays(60),
            budget,
        };
        let mut source = StaticListings::new(listings);
        let mut walker = ListingWalker::new(ctx, &mut f.surface, BehaviorSimulator::seeded(7));
        walker.walk(&mut source).await
    }

    /// Ledger whose lookups and writes behave as scripted.
    struct ScriptedLedger {
        lookup_fails: bool,
        /// `None` makes every write fail.
        write: Option<RecordOutcome>,
    }

    #[async_trait]
    impl Ledger for ScriptedLedger {
        fn backend(&self) -> &'static str {
            "scripted"
        }

        async fn get(&self, _url: &str) -> Result<Option<ApplicationRecord>, LedgerError> {
            if self.lookup_fails {
                return Err(LedgerError::Task("connection reset".into()));
            }
            Ok(None)
        }

        async fn record(
            &self,
            _url: &str,
            _title: &str,
            _company: &str,
            _date_applied: NaiveDate,
            _policy: ReapplyPolicy,
        ) -> Result<RecordOutcome, LedgerError> {
            self.write
                .ok_or_else(|| LedgerError::Task("disk full".into()))
        }

        async fn count(&self) -> Result<u64, LedgerError> {
            Ok(0)
        }
    }

    async fn walk_with_ledger(
        f: &mut Fixture,
        ledger: &dyn Ledger,
        listings: Vec<Listing>,
    ) -> WalkResult {
        let ctx = WalkContext {
            ledger,
            scorer: &f.scorer,
            selectors: &f.selectors,
            policy: ReapplyPolicy::AfterDays(60),
            budget: RunBudget::default(),
        };
        let mut source = StaticListings::new(listings);
        let mut walker = ListingWalker::new(ctx, &mut f.surface, BehaviorSimulator::seeded(7));
        walker.walk(&mut source).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_ledger_conflict_after_apply_counts_as_applied() {
        let mut f = fixture().await;
        let sel = f.selectors.clone();
        let a = listing(1, "Sales manager");
        f.surface.applicable_listing(&sel, &a.url, "desc");
        let ledger = ScriptedLedger {
            lookup_fails: false,
            write: Some(RecordOutcome::AlreadyRecorded),
        };

        let result = walk_with_ledger(&mut f, &ledger, vec![a]).await;

        assert_eq!(result.stats.applied, 1);
        assert_eq!(result.stats.ledger_conflicts, 1);
        assert_eq!(result.stats.ledger_write_failures, 0);
        assert!(matches!(
            result.listings[0].outcome,
            ListingOutcome::Applied {
                ledger: LedgerWrite::Conflict,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ledger_write_failure_after_apply_is_counted() {
        let mut f = fixture().await;
        let sel = f.selectors.clone();
        let a = listing(1, "Sales manager");
        f.surface.applicable_listing(&sel, &a.url, "desc");
        let ledger = ScriptedLedger {
            lookup_fails: false,
            write: None,
        };

        let result = walk_with_ledger(&mut f, &ledger, vec![a]).await;

        assert_eq!(result.stats.applied, 1);
        assert_eq!(result.stats.failed, 0);
        assert_eq!(result.stats.ledger_write_failures, 1);
        match &result.listings[0].outcome {
            ListingOutcome::Applied {
                ledger: LedgerWrite::Failed(reason),
                ..
            } => assert!(reason.contains("disk full")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ledger_lookup_failure_fails_listing_without_browsing() {
        let mut f = fixture().await;
        let sel = f.selectors.clone();
        let (a, b) = (listing(1, "Sales A"), listing(2, "Sales B"));
        f.surface.applicable_listing(&sel, &a.url, "desc");
        f.surface.applicable_listing(&sel, &b.url, "desc");
        let ledger = ScriptedLedger {
            lookup_fails: true,
            write: Some(RecordOutcome::Inserted),
        };

        let result = walk_with_ledger(&mut f, &ledger, vec![a, b]).await;

        assert_eq!(result.stats.discovered, 2);
        assert_eq!(result.stats.failed, 2);
        assert_eq!(result.stats.applied, 0);
        assert!(f.surface.navigations.is_empty());
        assert_eq!(result.stop_reason, StopReason::Exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_page_scroll_is_capped() {
        let mut f = fixture().await;
        let sel = f.selectors.clone();
        let a = listing(1, "Sales manager");
        f.surface.applicable_listing(&sel, &a.url, "desc");
        f.surface.page_height = 12_000;

        let result = walk(&mut f, RunBudget::default(), vec![a]).await;

        assert_eq!(result.stats.applied, 1);
        assert_eq!(f.surface.scrolled, i64::from(MAX_SCROLL_PX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_of_one_never_reaches_second_listing() {
        let mut f = fixture().await;
        let (sel, a, b) = (f.selectors.clone(), listing(1, "Sales A"), listing(2, "Sales B"));
        f.surface.applicable_listing(&sel, &a.url, "desc");
        f.surface.applicable_listing(&sel, &b.url, "desc");

        let budget = RunBudget {
            max_applications: 1,
            ..RunBudget::default()
        };
        let result = walk(&mut f, budget, vec![a.clone(), b.clone()]).await;

        assert_eq!(result.stats.applied, 1);
        assert_eq!(result.stats.discovered, 1);
        assert_eq!(result.stop_reason, StopReason::ApplicationBudget);
        assert!(!f.surface.navigated_to(&b.url));
        assert!(f.ledger.exists(&a.url).await.unwrap());
        assert!(!f.ledger.exists(&b.url).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_apply_clicks_apply_then_send() {
        let mut f = fixture().await;
        let sel = f.selectors.clone();
        let a = listing(1, "Sales manager");
        f.surface.applicable_listing(&sel, &a.url, "desc");

        let result = walk(&mut f, RunBudget::default(), vec![a.clone()]).await;

        assert_eq!(result.stats.applied, 1);
        assert_eq!(result.stop_reason, StopReason::Exhausted);
        let clicked: Vec<&Selector> = f.surface.clicks.iter().map(|(_, s)| s).collect();
        assert_eq!(clicked.len(), 2);
        assert_eq!(clicked[0], sel.selector(UiElement::ApplyButton));
        assert_eq!(clicked[1], sel.selector(UiElement::SendButton));
        assert!(f.surface.pointer_points > 0);
        assert!(f.surface.scrolled > 0);
        assert!(matches!(
            result.listings[0].outcome,
            ListingOutcome::Applied {
                ledger: LedgerWrite::Inserted,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_banner_fails_first_time_application() {
        let mut f = fixture().await;
        let sel = f.selectors.clone();
        let a = listing(1, "Sales manager");
        f.surface.page(
            &a.url,
            &[
                FakeElement::new(sel.selector(UiElement::AlreadyAppliedBanner), "Ви вже відгукалися"),
                FakeElement::new(sel.selector(UiElement::ApplyButton), "Відгукнутися"),
            ],
        );

        let result = walk(&mut f, RunBudget::default(), vec![a.clone()]).await;

        assert_eq!(result.stats.failed, 1);
        assert!(f.surface.clicks.is_empty());
        assert_eq!(f.ledger.count().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_send_button_is_a_failure_and_not_recorded() {
        let mut f = fixture().await;
        let sel = f.selectors.clone();
        let a = listing(1, "Sales manager");
        f.surface.page(
            &a.url,
            &[FakeElement::new(sel.selector(UiElement::ApplyButton), "Відгукнутися")],
        );

        let result = walk(&mut f, RunBudget::default(), vec![a.clone()]).await;

        assert_eq!(result.stats.failed, 1);
        match &result.listings[0].outcome {
            ListingOutcome::ApplyFailed { reason } => assert!(reason.contains("send button")),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(!f.ledger.exists(&a.url).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_error_is_per_listing() {
        let mut f = fixture().await;
        let sel = f.selectors.clone();
        let (a, b) = (listing(1, "Sales A"), listing(2, "Sales B"));
        f.surface.fail_navigation(&a.url);
        f.surface.applicable_listing(&sel, &b.url, "desc");

        let result = walk(&mut f, RunBudget::default(), vec![a, b]).await;

        assert_eq!(result.stats.failed, 1);
        assert_eq!(result.stats.applied, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reapply_after_cooldown_uses_review_button_and_updates_row() {
        let mut f = fixture().await;
        let sel = f.selectors.clone();
        let a = listing(1, "Sales manager");
        let old = Local::now().date_naive() - ChronoDuration::days(90);
        f.ledger
            .record(&a.url, "Sales manager", "Acme", old, ReapplyPolicy::AfterDays(60))
            .await
            .unwrap();

        let sent = format!("{}sent/", a.url);
        let dialog = format!("{}apply/", a.url);
        f.surface.page(
            &a.url,
            &[
                FakeElement::new(sel.selector(UiElement::AlreadyAppliedBanner), "Ви вже відгукалися"),
                FakeElement::new(sel.selector(UiElement::ReapplyButton), "Переглянути резюме")
                    .navigates_to(&dialog),
            ],
        );
        f.surface.page(
            &dialog,
            &[FakeElement::new(sel.selector(UiElement::SendButton), "Надіслати").navigates_to(&sent)],
        );
        f.surface.page(&sent, &[]);

        let result = walk(&mut f, RunBudget::default(), vec![a.clone()]).await;

        assert_eq!(result.stats.applied, 1);
        let row = f.ledger.get(&a.url).await.unwrap().unwrap();
        assert_eq!(row.date_applied, Local::now().date_naive());
        assert!(row.updated_at.is_some());
        assert_eq!(f.ledger.count().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_description_is_read_from_page_before_scoring() {
        let mut f = fixture().await;
        let sel = f.selectors.clone();
        // Title alone says nothing; the page description has the keyword.
        let stub = Listing::stub("https://www.work.ua/jobs/5/", "Manager");
        f.surface.page(
            &stub.url,
            &[FakeElement::new(sel.selector(UiElement::Description), "B2B sales, remote")],
        );
        f.scorer = MatchScorer::keyword_only(
            KeywordRules::new(vec!["sales".to_string()], vec![]),
            50,
        );

        let result = walk(&mut f, RunBudget::default(), vec![stub.clone()]).await;

        // Description-only hit: 60 > 50, so it tries to apply (and fails: no button).
        assert_eq!(result.stats.skipped_no_match, 0);
        assert_eq!(result.stats.failed, 1);
        assert_eq!(
            f.surface.navigations.iter().filter(|u| **u == stub.url).count(),
            1,
            "the open page is reused for applying"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_url_is_counted_once() {
        let mut f = fixture().await;
        let a = listing(1, "Accountant");
        let result = walk(&mut f, RunBudget::default(), vec![a.clone(), a]).await;
        assert_eq!(result.stats.discovered, 1);
        assert_eq!(result.stats.skipped_no_match, 1);
        assert_eq!(result.listings.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_flag_halts_before_next_listing() {
        let mut f = fixture().await;
        let ctx = WalkContext {
            ledger: &f.ledger,
            scorer: &f.scorer,
            selectors: &f.selectors,
            policy: ReapplyPolicy::Never,
            budget: RunBudget::default(),
        };
        let stop = Arc::new(AtomicBool::new(true));
        let mut source = StaticListings::new(vec![listing(1, "Sales")]);
        let mut walker = ListingWalker::new(ctx, &mut f.surface, BehaviorSimulator::seeded(1))
            .with_stop_flag(stop);
        let result = walker.walk(&mut source).await;
        assert_eq!(result.stop_reason, StopReason::Interrupted);
        assert_eq!(result.stats.discovered, 0);
    }
}
