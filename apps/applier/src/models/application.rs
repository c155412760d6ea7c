use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One ledger row. `url` is the unique key; field order matches the CSV
/// header and the `applications` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ApplicationRecord {
    pub url: String,
    pub date_applied: NaiveDate,
    pub title: String,
    pub company: String,
    pub created_at: DateTime<Utc>,
    /// Empty until the row is updated in place by a reapply.
    pub updated_at: Option<DateTime<Utc>>,
}
