use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::ledger::ReapplyPolicy;
use crate::llm_client::DEFAULT_MODEL;
use crate::matching::{KeywordRules, ScoringMode};
use crate::surface::search::SearchQuery;
use crate::walker::RunBudget;

/// Application configuration loaded from environment variables.
/// Every problem is collected and reported at once, before any browsing.
#[derive(Debug, Clone)]
pub struct Config {
    pub search: SearchConfig,
    /// Present only when `USE_LLM_SCORING` is on.
    pub llm: Option<LlmSettings>,
    pub reapply_policy: ReapplyPolicy,
    pub ledger: LedgerBackend,
    pub webdriver_url: String,
    pub session_cookies_path: PathBuf,
    pub headless: bool,
    pub board_base_url: String,
    pub behavior_seed: Option<u64>,
    pub report_path: Option<PathBuf>,
    pub rust_log: String,
}

/// Per-run search criteria. Built once, never mutated mid-run.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub keywords: Vec<String>,
    pub exclusions: Vec<String>,
    pub locations: Vec<String>,
    pub remote_only: bool,
    pub min_salary: Option<u32>,
    pub max_applications: u32,
    pub max_listings: u32,
    pub max_pages: u32,
    pub time_limit: Option<Duration>,
    /// Apply only above this (0-100).
    pub min_match_confidence: u8,
    pub scoring_mode: ScoringMode,
}

impl SearchConfig {
    pub fn budget(&self) -> RunBudget {
        RunBudget {
            max_applications: self.max_applications,
            max_listings: self.max_listings,
            time_limit: self.time_limit,
        }
    }

    pub fn queries(&self) -> Vec<SearchQuery> {
        SearchQuery::expand(&self.keywords, &self.locations, self.remote_only)
    }

    pub fn keyword_rules(&self) -> KeywordRules {
        KeywordRules::new(self.keywords.clone(), self.exclusions.clone())
    }
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub model: String,
    pub preference: PreferenceSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreferenceSource {
    Text(String),
    /// Plain text, or a PDF résumé.
    File(PathBuf),
}

impl PreferenceSource {
    pub fn load(&self) -> Result<String> {
        let text = match self {
            PreferenceSource::Text(text) => text.clone(),
            PreferenceSource::File(path) if is_pdf(path) => pdf_extract::extract_text(path)
                .with_context(|| format!("Failed to extract text from {}", path.display()))?,
            PreferenceSource::File(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
        };
        let text = text.trim().to_string();
        if text.is_empty() {
            bail!("Preference statement is empty");
        }
        Ok(text)
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerBackend {
    Csv(PathBuf),
    Postgres(String),
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests need not touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env = EnvReader {
            lookup,
            errors: Vec::new(),
        };

        let keywords = env.list("SEARCH_KEYWORDS");
        if keywords.is_empty() {
            env.error("SEARCH_KEYWORDS is required");
        }
        let remote_only = env.flag("REMOTE_ONLY", false);
        let locations = env.list("LOCATIONS");
        if !remote_only && locations.is_empty() {
            env.error("LOCATIONS is required unless REMOTE_ONLY=true");
        }

        let max_applications = env.number("MAX_APPLICATIONS", 10u32);
        if max_applications == 0 {
            env.error("MAX_APPLICATIONS must be at least 1");
        }
        let min_match_confidence = env.number("MIN_MATCH_PROBABILITY", 90u8);
        if min_match_confidence > 100 {
            env.error("MIN_MATCH_PROBABILITY must be between 0 and 100");
        }
        let time_limit = match env.optional_number::<u64>("RUN_TIME_LIMIT_MINUTES") {
            None | Some(0) => None,
            Some(minutes) => match minutes.checked_mul(60) {
                Some(secs) => Some(Duration::from_secs(secs)),
                None => {
                    env.error(format!("RUN_TIME_LIMIT_MINUTES is too large: {minutes}"));
                    None
                }
            },
        };
        let min_salary = env.optional_number::<u32>("MIN_SALARY").filter(|s| *s > 0);

        let use_llm = env.flag("USE_LLM_SCORING", false);
        let scoring_mode = match env.get("LLM_SCORING_MODE").as_deref() {
            _ if !use_llm => ScoringMode::KeywordOnly,
            None | Some("fallback") => ScoringMode::LanguageModelFallback,
            Some("always") => ScoringMode::LanguageModelAlways,
            Some(other) => {
                env.error(format!(
                    "LLM_SCORING_MODE must be 'fallback' or 'always', got '{other}'"
                ));
                ScoringMode::LanguageModelFallback
            }
        };

        let llm = if use_llm {
            let api_key = env.required("ANTHROPIC_API_KEY");
            let preference = match (env.get("PREFERENCE_TEXT"), env.get("PREFERENCE_PATH")) {
                (Some(text), _) => Some(PreferenceSource::Text(text)),
                (None, Some(path)) => {
                    let path = PathBuf::from(path);
                    if !path.exists() {
                        env.error(format!("PREFERENCE_PATH {} does not exist", path.display()));
                    }
                    Some(PreferenceSource::File(path))
                }
                (None, None) => {
                    env.error("PREFERENCE_TEXT or PREFERENCE_PATH is required when USE_LLM_SCORING=true");
                    None
                }
            };
            match (api_key, preference) {
                (Some(api_key), Some(preference)) => Some(LlmSettings {
                    api_key,
                    model: env.get("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                    preference,
                }),
                _ => None,
            }
        } else {
            None
        };

        let reapply_policy = match env.get("REAPPLY_COOLDOWN_DAYS") {
            None => ReapplyPolicy::default(),
            Some(v) if v.eq_ignore_ascii_case("never") => ReapplyPolicy::Never,
            Some(v) => match v.parse::<u32>() {
                Ok(days) => ReapplyPolicy::AfterDays(days),
                Err(_) => {
                    env.error(format!(
                        "REAPPLY_COOLDOWN_DAYS must be 'never' or a number of days, got '{v}'"
                    ));
                    ReapplyPolicy::default()
                }
            },
        };

        let ledger = match env.get("LEDGER_BACKEND").as_deref() {
            None | Some("csv") => LedgerBackend::Csv(PathBuf::from(
                env.get("LEDGER_CSV_PATH")
                    .unwrap_or_else(|| "applied_jobs.csv".to_string()),
            )),
            Some("postgres") => {
                LedgerBackend::Postgres(env.required("DATABASE_URL").unwrap_or_default())
            }
            Some(other) => {
                env.error(format!(
                    "LEDGER_BACKEND must be 'csv' or 'postgres', got '{other}'"
                ));
                LedgerBackend::Csv(PathBuf::from("applied_jobs.csv"))
            }
        };

        let session_cookies_path = env
            .required("SESSION_COOKIES_PATH")
            .map(PathBuf::from)
            .unwrap_or_default();
        if !session_cookies_path.as_os_str().is_empty() && !session_cookies_path.exists() {
            env.error(format!(
                "SESSION_COOKIES_PATH {} does not exist",
                session_cookies_path.display()
            ));
        }

        let config = Config {
            search: SearchConfig {
                keywords,
                exclusions: env.list("EXCLUDE_KEYWORDS"),
                locations,
                remote_only,
                min_salary,
                max_applications,
                max_listings: env.number("MAX_LISTINGS", 500u32),
                max_pages: env.number("MAX_SEARCH_PAGES", 50u32),
                time_limit,
                min_match_confidence,
                scoring_mode,
            },
            llm,
            reapply_policy,
            ledger,
            webdriver_url: env
                .get("WEBDRIVER_URL")
                .unwrap_or_else(|| "http://localhost:9515".to_string()),
            session_cookies_path,
            headless: env.flag("HEADLESS", false),
            board_base_url: env
                .get("BOARD_BASE_URL")
                .unwrap_or_else(|| "https://www.work.ua".to_string()),
            behavior_seed: env.optional_number("BEHAVIOR_SEED"),
            report_path: env.get("REPORT_PATH").map(PathBuf::from),
            rust_log: env.get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        };

        if !env.errors.is_empty() {
            bail!("Configuration errors:\n  - {}", env.errors.join("\n  - "));
        }
        Ok(config)
    }
}

/// Reads typed values through a lookup, collecting problems instead of
/// stopping at the first one.
struct EnvReader<F> {
    lookup: F,
    errors: Vec<String>,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Trimmed value; empty counts as unset.
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&mut self, key: &str) -> Option<String> {
        let value = self.get(key);
        if value.is_none() {
            self.error(format!("Required environment variable '{key}' is not set"));
        }
        value
    }

    fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(',')
                    .map(|item| item.trim().to_string())
                    .filter(|item| !item.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn flag(&mut self, key: &str, default: bool) -> bool {
        match self.get(key).map(|v| v.to_lowercase()).as_deref() {
            None => default,
            Some("true" | "1" | "yes") => true,
            Some("false" | "0" | "no") => false,
            Some(other) => {
                self.error(format!("{key} must be true or false, got '{other}'"));
                default
            }
        }
    }

    fn optional_number<T: FromStr>(&mut self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match raw.parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                self.error(format!("{key} must be a non-negative number, got '{raw}'"));
                None
            }
        }
    }

    fn number<T: FromStr>(&mut self, key: &str, default: T) -> T {
        self.optional_number(key).unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    fn cookies() -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "[]").unwrap();
        file
    }

    #[test]
    fn test_minimal_remote_config_uses_defaults() {
        let cookie_file = cookies();
        let config = load(&[
            ("SEARCH_KEYWORDS", "менеджер з продажу, sales"),
            ("REMOTE_ONLY", "true"),
            ("SESSION_COOKIES_PATH", cookie_file.path().to_str().unwrap()),
        ])
        .unwrap();

        assert_eq!(config.search.keywords, vec!["менеджер з продажу", "sales"]);
        assert_eq!(config.search.max_applications, 10);
        assert_eq!(config.search.max_listings, 500);
        assert_eq!(config.search.min_match_confidence, 90);
        assert_eq!(config.search.scoring_mode, ScoringMode::KeywordOnly);
        assert_eq!(config.reapply_policy, ReapplyPolicy::AfterDays(60));
        assert_eq!(
            config.ledger,
            LedgerBackend::Csv(PathBuf::from("applied_jobs.csv"))
        );
        assert_eq!(config.webdriver_url, "http://localhost:9515");
        assert!(config.llm.is_none());
        assert_eq!(config.search.queries().len(), 2);
    }

    #[test]
    fn test_all_errors_are_reported_together() {
        let err = load(&[
            ("MIN_MATCH_PROBABILITY", "150"),
            ("LEDGER_BACKEND", "postgres"),
            ("USE_LLM_SCORING", "true"),
        ])
        .unwrap_err()
        .to_string();

        assert!(err.contains("SEARCH_KEYWORDS"));
        assert!(err.contains("LOCATIONS"));
        assert!(err.contains("MIN_MATCH_PROBABILITY"));
        assert!(err.contains("DATABASE_URL"));
        assert!(err.contains("ANTHROPIC_API_KEY"));
        assert!(err.contains("PREFERENCE_TEXT"));
        assert!(err.contains("SESSION_COOKIES_PATH"));
    }

    #[test]
    fn test_missing_cookie_file_is_rejected() {
        let err = load(&[
            ("SEARCH_KEYWORDS", "rust"),
            ("REMOTE_ONLY", "true"),
            ("SESSION_COOKIES_PATH", "/definitely/not/here.json"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_llm_settings_and_policy() {
        let cookie_file = cookies();
        let config = load(&[
            ("SEARCH_KEYWORDS", "rust"),
            ("LOCATIONS", "kyiv,lviv"),
            ("SESSION_COOKIES_PATH", cookie_file.path().to_str().unwrap()),
            ("USE_LLM_SCORING", "true"),
            ("LLM_SCORING_MODE", "always"),
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("PREFERENCE_TEXT", "Remote backend roles"),
            ("REAPPLY_COOLDOWN_DAYS", "never"),
            ("RUN_TIME_LIMIT_MINUTES", "30"),
        ])
        .unwrap();

        let llm = config.llm.unwrap();
        assert_eq!(llm.model, DEFAULT_MODEL);
        assert_eq!(
            llm.preference,
            PreferenceSource::Text("Remote backend roles".to_string())
        );
        assert_eq!(
            config.search.scoring_mode,
            ScoringMode::LanguageModelAlways
        );
        assert_eq!(config.reapply_policy, ReapplyPolicy::Never);
        assert_eq!(config.search.time_limit, Some(Duration::from_secs(1800)));
        assert_eq!(config.search.queries().len(), 2);
    }

    #[test]
    fn test_bad_values_are_named() {
        let cookie_file = cookies();
        let err = load(&[
            ("SEARCH_KEYWORDS", "rust"),
            ("REMOTE_ONLY", "maybe"),
            ("MAX_APPLICATIONS", "ten"),
            ("REAPPLY_COOLDOWN_DAYS", "soon"),
            ("SESSION_COOKIES_PATH", cookie_file.path().to_str().unwrap()),
        ])
        .unwrap_err()
        .to_string();
        assert!(err.contains("REMOTE_ONLY"));
        assert!(err.contains("MAX_APPLICATIONS"));
        assert!(err.contains("REAPPLY_COOLDOWN_DAYS"));
    }

    #[test]
    fn test_huge_time_limit_is_a_config_error() {
        let cookie_file = cookies();
        let err = load(&[
            ("SEARCH_KEYWORDS", "rust"),
            ("REMOTE_ONLY", "true"),
            ("RUN_TIME_LIMIT_MINUTES", &u64::MAX.to_string()),
            ("SESSION_COOKIES_PATH", cookie_file.path().to_str().unwrap()),
        ])
        .unwrap_err()
        .to_string();
        assert!(err.contains("RUN_TIME_LIMIT_MINUTES is too large"));
    }

    #[test]
    fn test_preference_file_is_loaded_and_trimmed() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "  Sales roles in Kyiv \n").unwrap();
        let source = PreferenceSource::File(file.path().to_path_buf());
        assert_eq!(source.load().unwrap(), "Sales roles in Kyiv");
        assert!(PreferenceSource::Text("   ".into()).load().is_err());
    }

    #[test]
    fn test_pdf_detection_is_case_insensitive() {
        assert!(is_pdf(Path::new("cv.PDF")));
        assert!(!is_pdf(Path::new("cv.txt")));
    }
}
