use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A job posting as seen on the board. Values are never mutated after they
/// are fetched; enriching one (e.g. with the description read from the
/// listing page) produces a new `Listing`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub url: String,
    pub title: String,
    pub company: String,
    pub description_text: String,
    pub posted_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub salary: Option<String>,
}

impl Listing {
    /// A listing known only from a search results page.
    pub fn stub(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            company: String::new(),
            description_text: String::new(),
            posted_date: None,
            location: None,
            salary: None,
        }
    }

    pub fn with_details(&self, company: String, description_text: String) -> Self {
        Self {
            company,
            description_text,
            ..self.clone()
        }
    }

    pub fn has_description(&self) -> bool {
        !self.description_text.trim().is_empty()
    }
}
