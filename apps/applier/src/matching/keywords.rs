use crate::models::Listing;

/// Title hit.
const TITLE_STRENGTH: f32 = 1.0;
/// Description-only hit.
const DESCRIPTION_STRENGTH: f32 = 0.6;

/// Cheap-path rules: search keywords and exclusion keywords, matched
/// case-insensitively as substrings of the listing's title and description.
#[derive(Debug, Clone, Default)]
pub struct KeywordRules {
    keywords: Vec<String>,
    exclusions: Vec<String>,
}

/// Outcome of the cheap path for one listing.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordSignal {
    pub confidence: u8,
    /// 100 or 0, or an exclusion hit. Inconclusive signals may be refined by
    /// the language model.
    pub conclusive: bool,
    pub reason: String,
}

impl KeywordRules {
    pub fn new(keywords: Vec<String>, exclusions: Vec<String>) -> Self {
        let normalize = |list: Vec<String>| {
            list.into_iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect()
        };
        Self {
            keywords: normalize(keywords),
            exclusions: normalize(exclusions),
        }
    }

    /// `None` when no keywords are configured and no exclusion matched.
    pub fn evaluate(&self, listing: &Listing) -> Option<KeywordSignal> {
        let title = listing.title.to_lowercase();
        let description = listing.description_text.to_lowercase();

        if let Some(hit) = self
            .exclusions
            .iter()
            .find(|ex| title.contains(ex.as_str()) || description.contains(ex.as_str()))
        {
            return Some(KeywordSignal {
                confidence: 0,
                conclusive: true,
                reason: format!("excluded keyword \"{hit}\""),
            });
        }

        if self.keywords.is_empty() {
            return None;
        }

        let mut in_title = Vec::new();
        let mut in_description = Vec::new();
        let mut total = 0.0_f32;

        for keyword in &self.keywords {
            if title.contains(keyword.as_str()) {
                total += TITLE_STRENGTH;
                in_title.push(keyword.as_str());
            } else if description.contains(keyword.as_str()) {
                total += DESCRIPTION_STRENGTH;
                in_description.push(keyword.as_str());
            }
        }

        let confidence = ((total / self.keywords.len() as f32) * 100.0).round() as u8;
        let conclusive = confidence == 100 || confidence == 0;

        let reason = if in_title.is_empty() && in_description.is_empty() {
            "no search keyword found".to_string()
        } else {
            let mut parts = Vec::new();
            if !in_title.is_empty() {
                parts.push(format!("title: {}", in_title.join(", ")));
            }
            if !in_description.is_empty() {
                parts.push(format!("description: {}", in_description.join(", ")));
            }
            format!("keywords matched ({})", parts.join("; "))
        };

        Some(KeywordSignal {
            confidence,
            conclusive,
            reason,
        })
    }
}
