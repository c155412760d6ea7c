use std::collections::VecDeque;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::behavior::{BehaviorSimulator, InteractionKind};
use crate::models::Listing;
use crate::surface::selectors::{SelectorRegistry, UiElement};
use crate::surface::{AutomationSurface, SurfaceError};

/// Lazy sequence of candidate listings. The surface is lent per call so the
/// walker can keep using it between pulls.
#[async_trait]
pub trait ListingSource: Send {
    async fn next_listing(
        &mut self,
        surface: &mut dyn AutomationSurface,
    ) -> Result<Option<Listing>, SurfaceError>;
}

/// What to search for, already split into board queries.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub keyword: String,
    /// `None` searches remote listings.
    pub location: Option<String>,
}

impl SearchQuery {
    /// One query per keyword, either remote or once per location.
    pub fn expand(keywords: &[String], locations: &[String], remote_only: bool) -> Vec<Self> {
        let mut queries = Vec::new();
        for keyword in keywords {
            if remote_only || locations.is_empty() {
                queries.push(SearchQuery {
                    keyword: keyword.clone(),
                    location: None,
                });
            } else {
                for location in locations {
                    queries.push(SearchQuery {
                        keyword: keyword.clone(),
                        location: Some(location.clone()),
                    });
                }
            }
        }
        queries
    }

    /// First results page, e.g. `https://www.work.ua/jobs-remote-менеджер+з+продажу/`.
    pub fn url(&self, base_url: &str, min_salary: Option<u32>) -> String {
        let slug = |s: &str| s.trim().to_lowercase().replace(' ', "+");
        let area = self
            .location
            .as_deref()
            .map(slug)
            .unwrap_or_else(|| "remote".to_string());
        let mut url = format!(
            "{}/jobs-{}-{}/",
            base_url.trim_end_matches('/'),
            area,
            slug(&self.keyword)
        );
        if let Some(salary) = min_salary {
            url.push_str(&format!("?salaryfrom={salary}"));
        }
        url
    }
}

/// Adds `page=N` to a results URL. Page 1 is the URL itself.
fn page_url(first_page: &str, page: u32) -> String {
    if page <= 1 {
        first_page.to_string()
    } else if first_page.contains('?') {
        format!("{first_page}&page={page}")
    } else {
        format!("{first_page}?page={page}")
    }
}

/// Makes a result `href` absolute.
fn resolve(base_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            href.trim_start_matches('/')
        )
    }
}

/// Paged search over the board's result pages. A page is only loaded once
/// the listings from the previous one have been consumed.
pub struct BoardSearch {
    base_url: String,
    queries: VecDeque<String>,
    /// First-page URL of the query in progress and the next page number.
    current: Option<(String, u32)>,
    max_pages: u32,
    buffer: VecDeque<Listing>,
    registry: SelectorRegistry,
    simulator: BehaviorSimulator,
}

impl BoardSearch {
    pub fn new(
        base_url: &str,
        queries: &[SearchQuery],
        min_salary: Option<u32>,
        max_pages: u32,
        registry: SelectorRegistry,
        simulator: BehaviorSimulator,
    ) -> Self {
        Self {
            base_url: base_url.to_string(),
            queries: queries.iter().map(|q| q.url(base_url, min_salary)).collect(),
            current: None,
            max_pages: max_pages.max(1),
            buffer: VecDeque::new(),
            registry,
            simulator,
        }
    }

    fn next_page(&mut self) -> Option<(String, u32)> {
        if self.current.is_none() {
            let first = self.queries.pop_front()?;
            info!("Searching {first}");
            self.current = Some((first, 1));
        }
        self.current.clone()
    }

    async fn load_page(
        &mut self,
        surface: &mut dyn AutomationSurface,
        first_page: &str,
        page: u32,
    ) -> Result<(), SurfaceError> {
        let url = page_url(first_page, page);
        debug!("Loading results page {page}: {url}");
        surface.navigate(&url).await?;
        tokio::time::sleep(self.simulator.delay(InteractionKind::PageLoad)).await;

        let links = surface
            .locate_all(self.registry.selector(UiElement::ResultLink))
            .await?;
        let mut found = 0usize;
        for link in &links {
            let Some(href) = surface.read_attribute(link, "href").await? else {
                continue;
            };
            if !href.contains("/jobs/") {
                continue;
            }
            let title = surface.read_text(link).await?;
            self.buffer
                .push_back(Listing::stub(resolve(&self.base_url, &href), title.trim()));
            found += 1;
        }
        debug!("Page {page} gave {found} listings");

        let has_next = surface
            .locate(self.registry.selector(UiElement::NextPage))
            .await?
            .is_some();

        self.current = if found > 0 && has_next && page < self.max_pages {
            Some((first_page.to_string(), page + 1))
        } else {
            None
        };
        Ok(())
    }
}

#[async_trait]
impl ListingSource for BoardSearch {
    async fn next_listing(
        &mut self,
        surface: &mut dyn AutomationSurface,
    ) -> Result<Option<Listing>, SurfaceError> {
        loop {
            if let Some(listing) = self.buffer.pop_front() {
                return Ok(Some(listing));
            }
            let Some((first_page, page)) = self.next_page() else {
                return Ok(None);
            };
            if let Err(e) = self.load_page(surface, &first_page, page).await {
                // One broken query shouldn't end the whole search.
                warn!("Results page {page} of {first_page} failed: {e}");
                self.current = None;
            }
        }
    }
}
