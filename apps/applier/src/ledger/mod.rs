//! Application ledger: one row per listing URL ever applied to.
//!
//! `Ledger` is the only capability the walker and orchestrator see. Two
//! backends implement it: `CsvLedger` (flat file) and `PgLedger`
//! (PostgreSQL), chosen once at startup from `LEDGER_BACKEND`.
//!
//! Uniqueness of `url` is the backend's job (primary key plus conditional
//! update in Postgres, a read-modify-write under an OS file lock in the CSV
//! store), never the caller's. That holds across processes sharing a ledger.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDate};
use serde::Serialize;
use thiserror::Error;

use crate::models::ApplicationRecord;

pub mod csv_store;
pub mod postgres;

pub use csv_store::CsvLedger;
pub use postgres::PgLedger;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Ledger task failed: {0}")]
    Task(String),
}

/// Result of `Ledger::record`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    Inserted,
    /// The URL already had a row (reapply); it was updated in place.
    Updated,
    /// The URL already has a row inside the reapply window (usually another
    /// writer got there first). Nothing was written; treated as "already
    /// applied", not as an error.
    AlreadyRecorded,
}

/// When a URL that is already in the ledger may be applied to again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapplyPolicy {
    Never,
    /// Eligible again once `date_applied` is strictly older than
    /// `today - days`.
    AfterDays(u32),
}

impl Default for ReapplyPolicy {
    fn default() -> Self {
        ReapplyPolicy::AfterDays(60)
    }
}

impl ReapplyPolicy {
    /// Rows applied strictly before this date may be applied to again.
    pub fn cutoff(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            ReapplyPolicy::Never => None,
            ReapplyPolicy::AfterDays(days) => {
                today.checked_sub_signed(Duration::days(i64::from(*days)))
            }
        }
    }

    pub fn allows(&self, date_applied: NaiveDate, today: NaiveDate) -> bool {
        self.cutoff(today).is_some_and(|cutoff| date_applied < cutoff)
    }
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Short backend name for logs ("csv" | "postgres").
    fn backend(&self) -> &'static str;

    async fn get(&self, url: &str) -> Result<Option<ApplicationRecord>, LedgerError>;

    /// Inserts the row for `url`, or updates it in place when `policy`
    /// allows a reapply as of `date_applied`. Otherwise leaves the row alone
    /// and returns `AlreadyRecorded`. The check and the write are atomic.
    ///
    /// Inserts set `created_at`; updates set `updated_at` and keep
    /// `created_at`. Empty `title`/`company` never overwrite stored values.
    async fn record(
        &self,
        url: &str,
        title: &str,
        company: &str,
        date_applied: NaiveDate,
        policy: ReapplyPolicy,
    ) -> Result<RecordOutcome, LedgerError>;

    /// Number of distinct URLs in the ledger.
    async fn count(&self) -> Result<u64, LedgerError>;

    async fn exists(&self, url: &str) -> Result<bool, LedgerError> {
        Ok(self.get(url).await?.is_some())
    }

    async fn is_eligible(&self, url: &str, policy: ReapplyPolicy) -> Result<bool, LedgerError> {
        self.is_eligible_on(url, policy, Local::now().date_naive())
            .await
    }

    async fn is_eligible_on(
        &self,
        url: &str,
        policy: ReapplyPolicy,
        today: NaiveDate,
    ) -> Result<bool, LedgerError> {
        Ok(match self.get(url).await? {
            None => true,
            Some(record) => policy.allows(record.date_applied, today),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_within_cooldown_is_not_allowed() {
        let policy = ReapplyPolicy::AfterDays(60);
        assert!(!policy.allows(date(2024, 5, 1), date(2024, 6, 1)));
    }

    #[test]
    fn test_boundary_day_is_not_allowed() {
        // Exactly `days` ago is not "older than" the window.
        let policy = ReapplyPolicy::AfterDays(30);
        assert!(!policy.allows(date(2024, 5, 2), date(2024, 6, 1)));
        assert!(policy.allows(date(2024, 5, 1), date(2024, 6, 1)));
    }

    #[test]
    fn test_never_policy_blocks_old_rows() {
        assert!(!ReapplyPolicy::Never.allows(date(2010, 1, 1), date(2024, 6, 1)));
    }

    #[test]
    fn test_cutoff_date() {
        assert_eq!(
            ReapplyPolicy::AfterDays(30).cutoff(date(2024, 6, 1)),
            Some(date(2024, 5, 2))
        );
        assert_eq!(ReapplyPolicy::Never.cutoff(date(2024, 6, 1)), None);
    }

    #[test]
    fn test_default_policy_is_sixty_days() {
        assert_eq!(ReapplyPolicy::default(), ReapplyPolicy::AfterDays(60));
    }
}
