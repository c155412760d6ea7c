use std::time::Duration;

use rand::Rng;

const MIN_DELTA_PX: u32 = 120;
const MAX_DELTA_PX: u32 = 480;
/// Share of pauses that are a longer "reading" stop.
const LONG_PAUSE_CHANCE: f64 = 0.2;

/// One wheel movement followed by a pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollStep {
    pub delta: u32,
    pub pause: Duration,
}

/// Splits `content_height` into variable positive deltas that sum to it
/// exactly. Height 0 gives an empty plan.
pub fn scroll_plan<R: Rng + ?Sized>(rng: &mut R, content_height: u32) -> Vec<ScrollStep> {
    let mut remaining = content_height;
    let mut plan = Vec::new();

    while remaining > 0 {
        let delta = rng.gen_range(MIN_DELTA_PX..=MAX_DELTA_PX).min(remaining);
        remaining -= delta;

        let pause = if rng.gen_bool(LONG_PAUSE_CHANCE) {
            rng.gen_range(0.5..1.5)
        } else {
            rng.gen_range(0.1..0.3)
        };
        plan.push(ScrollStep {
            delta,
            pause: Duration::from_secs_f64(pause),
        });
    }

    plan
}
