//! Scripted in-memory surface for walker, search and orchestrator tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;

use crate::behavior::{Bounds, Point, Viewport};
use crate::models::Listing;
use crate::surface::search::ListingSource;
use crate::surface::selectors::{SelectorRegistry, UiElement};
use crate::surface::{AutomationSurface, ElementHandle, Selector, SurfaceError};

#[derive(Debug, Clone)]
pub struct FakeElement {
    pub selector: Selector,
    pub text: String,
    pub attributes: HashMap<String, String>,
    pub bounds: Bounds,
    /// Clicking loads this URL.
    pub navigates_to: Option<String>,
}

impl FakeElement {
    pub fn new(selector: &Selector, text: &str) -> Self {
        Self {
            selector: selector.clone(),
            text: text.to_string(),
            attributes: HashMap::new(),
            bounds: Bounds {
                x: 400.0,
                y: 300.0,
                width: 160.0,
                height: 40.0,
            },
            navigates_to: None,
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn navigates_to(mut self, url: &str) -> Self {
        self.navigates_to = Some(url.to_string());
        self
    }
}

pub struct ScriptedSurface {
    pages: HashMap<String, Vec<FakeElement>>,
    failing: HashSet<String>,
    current: Option<String>,
    handles: Vec<(String, usize)>,
    pub navigations: Vec<String>,
    pub clicks: Vec<(String, Selector)>,
    pub pointer_points: usize,
    pub scrolled: i64,
    pub page_height: u32,
}

impl Default for ScriptedSurface {
    fn default() -> Self {
        Self {
            pages: HashMap::new(),
            failing: HashSet::new(),
            current: None,
            handles: Vec::new(),
            navigations: Vec::new(),
            clicks: Vec::new(),
            pointer_points: 0,
            scrolled: 0,
            page_height: 1800,
        }
    }
}

impl ScriptedSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&mut self, url: &str, elements: &[FakeElement]) {
        self.pages.insert(url.to_string(), elements.to_vec());
    }

    pub fn fail_navigation(&mut self, url: &str) {
        self.failing.insert(url.to_string());
    }

    pub fn navigated_to(&self, url: &str) -> bool {
        self.navigations.iter().any(|u| u == url)
    }

    /// Home page with the logged-in account link.
    pub fn logged_in_home(&mut self, registry: &SelectorRegistry, base_url: &str) {
        self.page(
            base_url,
            &[FakeElement::new(
                registry.selector(UiElement::AccountLink),
                "Мій розділ",
            )],
        );
    }

    /// Listing page whose apply flow succeeds:
    /// apply -> `{url}apply/` (send button) -> `{url}sent/`.
    pub fn applicable_listing(&mut self, registry: &SelectorRegistry, url: &str, description: &str) {
        let dialog = format!("{url}apply/");
        let sent = format!("{url}sent/");
        self.page(
            url,
            &[
                FakeElement::new(registry.selector(UiElement::Description), description),
                FakeElement::new(registry.selector(UiElement::ApplyButton), "Відгукнутися")
                    .navigates_to(&dialog),
            ],
        );
        self.page(
            &dialog,
            &[FakeElement::new(registry.selector(UiElement::SendButton), "Надіслати")
                .navigates_to(&sent)],
        );
        self.page(&sent, &[]);
    }

    fn element(&self, handle: &ElementHandle) -> Result<&FakeElement, SurfaceError> {
        let index: usize = handle.0.parse().map_err(|_| SurfaceError::StaleElement)?;
        let (url, idx) = self.handles.get(index).ok_or(SurfaceError::StaleElement)?;
        if self.current.as_deref() != Some(url.as_str()) {
            return Err(SurfaceError::StaleElement);
        }
        self.pages
            .get(url)
            .and_then(|els| els.get(*idx))
            .ok_or(SurfaceError::StaleElement)
    }

    fn matching(&self, selector: &Selector) -> Vec<(String, usize)> {
        let Some(url) = self.current.clone() else {
            return Vec::new();
        };
        self.pages
            .get(&url)
            .map(|els| {
                els.iter()
                    .enumerate()
                    .filter(|(_, el)| &el.selector == selector)
                    .map(|(idx, _)| (url.clone(), idx))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn handle_for(&mut self, entry: (String, usize)) -> ElementHandle {
        self.handles.push(entry);
        ElementHandle((self.handles.len() - 1).to_string())
    }

    fn load(&mut self, url: &str) {
        self.current = Some(url.to_string());
    }
}

#[async_trait]
impl AutomationSurface for ScriptedSurface {
    async fn navigate(&mut self, url: &str) -> Result<(), SurfaceError> {
        self.navigations.push(url.to_string());
        if self.failing.contains(url) {
            return Err(SurfaceError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_CONNECTION_RESET".to_string(),
            });
        }
        self.load(url);
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, SurfaceError> {
        Ok(self.current.clone().unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn locate(&mut self, selector: &Selector) -> Result<Option<ElementHandle>, SurfaceError> {
        Ok(self
            .matching(selector)
            .into_iter()
            .next()
            .map(|entry| self.handle_for(entry)))
    }

    async fn locate_all(&mut self, selector: &Selector) -> Result<Vec<ElementHandle>, SurfaceError> {
        let entries = self.matching(selector);
        Ok(entries.into_iter().map(|e| self.handle_for(e)).collect())
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), SurfaceError> {
        let (selector, target) = {
            let el = self.element(element)?;
            (el.selector.clone(), el.navigates_to.clone())
        };
        let page = self.current.clone().unwrap_or_default();
        self.clicks.push((page, selector));
        if let Some(url) = target {
            self.load(&url);
        }
        Ok(())
    }

    async fn move_pointer_through(
        &mut self,
        points: &[Point],
        step: Duration,
    ) -> Result<(), SurfaceError> {
        self.pointer_points += points.len();
        tokio::time::sleep(step * points.len() as u32).await;
        Ok(())
    }

    async fn scroll_by(&mut self, delta: i64) -> Result<(), SurfaceError> {
        self.scrolled += delta;
        Ok(())
    }

    async fn scroll_into_view(&mut self, element: &ElementHandle) -> Result<(), SurfaceError> {
        self.element(element).map(|_| ())
    }

    async fn read_text(&mut self, element: &ElementHandle) -> Result<String, SurfaceError> {
        Ok(self.element(element)?.text.clone())
    }

    async fn read_attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, SurfaceError> {
        Ok(self.element(element)?.attributes.get(name).cloned())
    }

    async fn element_bounds(
        &mut self,
        element: &ElementHandle,
    ) -> Result<Option<Bounds>, SurfaceError> {
        Ok(Some(self.element(element)?.bounds))
    }

    async fn scrollable_height(&mut self) -> Result<u32, SurfaceError> {
        Ok(self.page_height)
    }

    async fn viewport(&mut self) -> Result<Viewport, SurfaceError> {
        Ok(Viewport::default())
    }
}

/// Listing source over a fixed list.
pub struct StaticListings(pub VecDeque<Listing>);

impl StaticListings {
    pub fn new(listings: Vec<Listing>) -> Self {
        Self(listings.into())
    }
}

#[async_trait]
impl ListingSource for StaticListings {
    async fn next_listing(
        &mut self,
        _surface: &mut dyn AutomationSurface,
    ) -> Result<Option<Listing>, SurfaceError> {
        Ok(self.0.pop_front())
    }
}
