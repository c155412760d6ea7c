//! Browser automation surface.
//!
//! The walker and orchestrator only ever talk to `AutomationSurface`. The
//! WebDriver client in `webdriver.rs` is the production implementation;
//! tests drive a scripted in-memory page model instead.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use crate::behavior::{Bounds, Point, Viewport};

pub mod search;
pub mod selectors;
pub mod webdriver;

#[cfg(test)]
pub(crate) mod fake;

pub use search::{BoardSearch, ListingSource};
pub use selectors::{SelectorRegistry, UiElement};
pub use webdriver::{BrowserOptions, WebDriverSession};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Locator {
    Css,
    XPath,
}

/// Opaque element descriptor. The core passes these through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selector {
    pub strategy: Locator,
    pub value: String,
}

impl Selector {
    pub fn css(value: impl Into<String>) -> Self {
        Self {
            strategy: Locator::Css,
            value: value.into(),
        }
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self {
            strategy: Locator::XPath,
            value: value.into(),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.strategy {
            Locator::Css => write!(f, "css={}", self.value),
            Locator::XPath => write!(f, "xpath={}", self.value),
        }
    }
}

/// Reference to a located element, valid until the next navigation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub String);

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    ElementPresent(Selector),
    UrlContains(String),
    AnyOf(Vec<Condition>),
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("HTTP error talking to the browser driver: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Driver error {error}: {message}")]
    Driver { error: String, message: String },

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Element is no longer attached to the page")]
    StaleElement,

    #[error("Unexpected driver response: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait AutomationSurface: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), SurfaceError>;

    async fn current_url(&mut self) -> Result<String, SurfaceError>;

    async fn locate(&mut self, selector: &Selector) -> Result<Option<ElementHandle>, SurfaceError>;

    async fn locate_all(&mut self, selector: &Selector) -> Result<Vec<ElementHandle>, SurfaceError>;

    async fn click(&mut self, element: &ElementHandle) -> Result<(), SurfaceError>;

    /// Moves the pointer through `points` in order, `step` apart.
    async fn move_pointer_through(
        &mut self,
        points: &[Point],
        step: Duration,
    ) -> Result<(), SurfaceError>;

    async fn scroll_by(&mut self, delta: i64) -> Result<(), SurfaceError>;

    async fn scroll_into_view(&mut self, element: &ElementHandle) -> Result<(), SurfaceError>;

    async fn read_text(&mut self, element: &ElementHandle) -> Result<String, SurfaceError>;

    async fn read_attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, SurfaceError>;

    /// `None` when the element has no layout box.
    async fn element_bounds(&mut self, element: &ElementHandle)
        -> Result<Option<Bounds>, SurfaceError>;

    async fn scrollable_height(&mut self) -> Result<u32, SurfaceError>;

    async fn viewport(&mut self) -> Result<Viewport, SurfaceError>;

    /// Polls `condition` until it holds or `timeout` elapses.
    async fn wait_for(
        &mut self,
        condition: &Condition,
        timeout: Duration,
    ) -> Result<bool, SurfaceError> {
        let deadline = Instant::now() + timeout;
        let mut leaves = Vec::new();
        flatten(condition, &mut leaves);

        loop {
            for leaf in &leaves {
                let holds = match leaf {
                    Condition::ElementPresent(selector) => self.locate(selector).await?.is_some(),
                    Condition::UrlContains(fragment) => {
                        self.current_url().await?.contains(fragment.as_str())
                    }
                    Condition::AnyOf(_) => false,
                };
                if holds {
                    return Ok(true);
                }
            }

            if Instant::now() >= deadline {
                debug!("Timed out after {:?} waiting for {:?}", timeout, condition);
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

fn flatten<'a>(condition: &'a Condition, out: &mut Vec<&'a Condition>) {
    match condition {
        Condition::AnyOf(inner) => inner.iter().for_each(|c| flatten(c, out)),
        leaf => out.push(leaf),
    }
}

#[cfg(test)]
mod tests {
    use super::fake::ScriptedSurface;
    use super::*;

    #[test]
    fn test_selector_display() {
        assert_eq!(Selector::css("main").to_string(), "css=main");
        assert_eq!(Selector::xpath("//a").to_string(), "xpath=//a");
    }

    #[test]
    fn test_flatten_nested_any_of() {
        let cond = Condition::AnyOf(vec![
            Condition::UrlContains("/sent/".into()),
            Condition::AnyOf(vec![Condition::ElementPresent(Selector::css(".ok"))]),
        ]);
        let mut leaves = Vec::new();
        flatten(&cond, &mut leaves);
        assert_eq!(leaves.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_times_out_when_condition_never_holds() {
        let mut surface = ScriptedSurface::new();
        surface.page("https://example.test/", &[]);
        surface.navigate("https://example.test/").await.unwrap();

        let started = Instant::now();
        let found = surface
            .wait_for(
                &Condition::ElementPresent(Selector::css("#missing")),
                Duration::from_secs(2),
            )
            .await
            .unwrap();
        assert!(!found);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_url_fragment() {
        let mut surface = ScriptedSurface::new();
        surface.page("https://example.test/jobs/1/sent/", &[]);
        surface
            .navigate("https://example.test/jobs/1/sent/")
            .await
            .unwrap();
        let found = surface
            .wait_for(&Condition::UrlContains("/sent/".into()), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(found);
    }
}
