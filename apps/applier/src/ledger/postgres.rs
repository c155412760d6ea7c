use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::debug;

use crate::db;
use crate::ledger::{Ledger, LedgerError, RecordOutcome, ReapplyPolicy};
use crate::models::ApplicationRecord;

/// Ledger backed by the `applications` table. `url` is the primary key and
/// reapplies are a single conditional `UPDATE`, so two writers for one URL
/// can never both succeed, whichever process they run in.
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub async fn connect(database_url: &str) -> Result<Self, LedgerError> {
        let pool = db::create_pool(database_url).await?;
        db::ensure_schema(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl Ledger for PgLedger {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn get(&self, url: &str) -> Result<Option<ApplicationRecord>, LedgerError> {
        let record = sqlx::query_as::<_, ApplicationRecord>(
            r#"
            SELECT url, date_applied, title, company, created_at, updated_at
            FROM applications
            WHERE url = $1
            "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn record(
        &self,
        url: &str,
        title: &str,
        company: &str,
        date_applied: NaiveDate,
        policy: ReapplyPolicy,
    ) -> Result<RecordOutcome, LedgerError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO applications (url, date_applied, title, company)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (url) DO NOTHING
            "#,
        )
        .bind(url)
        .bind(date_applied)
        .bind(title)
        .bind(company)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() > 0 {
            debug!("Ledger insert {url} ({date_applied})");
            return Ok(RecordOutcome::Inserted);
        }

        let Some(cutoff) = policy.cutoff(date_applied) else {
            debug!("Ledger already has {url}; reapply disabled");
            return Ok(RecordOutcome::AlreadyRecorded);
        };

        // The cooldown is re-checked by the row filter, not by an earlier read.
        let updated = sqlx::query(
            r#"
            UPDATE applications
            SET date_applied = $2,
                title = COALESCE(NULLIF($3, ''), title),
                company = COALESCE(NULLIF($4, ''), company),
                updated_at = NOW()
            WHERE url = $1 AND date_applied < $5
            "#,
        )
        .bind(url)
        .bind(date_applied)
        .bind(title)
        .bind(company)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            debug!("Ledger already has {url} inside the reapply window");
            return Ok(RecordOutcome::AlreadyRecorded);
        }

        debug!("Ledger update {url} ({date_applied})");
        Ok(RecordOutcome::Updated)
    }

    async fn count(&self) -> Result<u64, LedgerError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM applications")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}
