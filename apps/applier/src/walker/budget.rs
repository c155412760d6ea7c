use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Limits for one run. Checked between listings only.
#[derive(Debug, Clone, Copy)]
pub struct RunBudget {
    pub max_applications: u32,
    /// Distinct listings to look at before stopping.
    pub max_listings: u32,
    pub time_limit: Option<Duration>,
}

impl Default for RunBudget {
    fn default() -> Self {
        Self {
            max_applications: 10,
            max_listings: 500,
            time_limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The listing source ran dry.
    Exhausted,
    ApplicationBudget,
    ListingCap,
    TimeLimit,
    Interrupted,
    /// The listing source failed in a way it could not skip past.
    SourceError,
}

impl RunBudget {
    /// Why the walk must stop before taking another listing, if it must.
    pub fn check(
        &self,
        applied: u32,
        discovered: u32,
        started: Instant,
        interrupted: bool,
    ) -> Option<StopReason> {
        if interrupted {
            Some(StopReason::Interrupted)
        } else if applied >= self.max_applications {
            Some(StopReason::ApplicationBudget)
        } else if discovered >= self.max_listings {
            Some(StopReason::ListingCap)
        } else if self.time_limit.is_some_and(|limit| started.elapsed() >= limit) {
            Some(StopReason::TimeLimit)
        } else {
            None
        }
    }
}
