//! Human-behaviour simulation: delays, pointer paths and scroll plans.
//!
//! Everything here is a pure function of its inputs and the simulator's RNG.
//! Seed it (`BEHAVIOR_SEED`) to make a run's pacing reproducible.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub mod motion;
pub mod scroll;

pub use motion::{Bounds, Point, Viewport};
pub use scroll::ScrollStep;

const KEYSTROKE_HESITATION_CHANCE: f64 = 0.1;
const CHARS_PER_WORD: f64 = 5.0;
const MIN_READING_SECS: f64 = 1.0;
const MAX_READING_SECS: f64 = 10.0;

/// What the simulated user is about to do; each kind has its own delay range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    PageLoad,
    BeforeClick,
    Deliberation,
    ScrollPause,
    PointerStep,
    Keystroke,
    BetweenListings,
    /// Reading a page of unknown length. Prefer `reading_delay` when the
    /// text is known.
    Reading,
}

impl InteractionKind {
    /// Uniform range in seconds.
    fn range(self) -> (f64, f64) {
        match self {
            InteractionKind::PageLoad => (1.0, 3.0),
            InteractionKind::BeforeClick => (0.1, 0.3),
            InteractionKind::Deliberation => (1.0, 2.5),
            InteractionKind::ScrollPause => (0.1, 0.3),
            InteractionKind::PointerStep => (0.01, 0.03),
            InteractionKind::Keystroke => (0.05, 0.15),
            InteractionKind::BetweenListings => (2.0, 4.0),
            InteractionKind::Reading => (2.0, 8.0),
        }
    }
}

pub struct BehaviorSimulator<R = StdRng> {
    rng: R,
}

impl BehaviorSimulator<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Seeded when `seed` is set, otherwise from OS entropy.
    pub fn from_seed_option(seed: Option<u64>) -> Self {
        seed.map(Self::seeded).unwrap_or_else(Self::from_entropy)
    }
}

impl<R: Rng> BehaviorSimulator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    pub fn delay(&mut self, kind: InteractionKind) -> Duration {
        let (lo, hi) = kind.range();
        let mut secs = self.rng.gen_range(lo..hi);
        if kind == InteractionKind::Keystroke && self.rng.gen_bool(KEYSTROKE_HESITATION_CHANCE) {
            secs += self.rng.gen_range(0.2..0.5);
        }
        Duration::from_secs_f64(secs)
    }

    /// Time to "read" `text_len` characters, clamped to 1–10 s.
    pub fn reading_delay(&mut self, text_len: usize) -> Duration {
        let words = text_len as f64 / CHARS_PER_WORD;
        let secs = words * self.rng.gen_range(0.2..0.3);
        Duration::from_secs_f64(secs.clamp(MIN_READING_SECS, MAX_READING_SECS))
    }

    pub fn pointer_path(&mut self, start: Point, end: Point) -> Vec<Point> {
        motion::pointer_path(&mut self.rng, start, end)
    }

    pub fn scroll_plan(&mut self, content_height: u32) -> Vec<ScrollStep> {
        scroll::scroll_plan(&mut self.rng, content_height)
    }

    pub fn click_point(&mut self, bounds: Bounds) -> Point {
        motion::click_point(&mut self.rng, bounds)
    }

    pub fn wander_target(&mut self, viewport: Viewport) -> Point {
        motion::wander_target(&mut self.rng, viewport)
    }
}
