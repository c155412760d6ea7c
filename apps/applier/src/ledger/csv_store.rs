use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use fd_lock::RwLock;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::ledger::{Ledger, LedgerError, RecordOutcome, ReapplyPolicy};
use crate::models::ApplicationRecord;

const HEADER: [&str; 6] = [
    "url",
    "date_applied",
    "title",
    "company",
    "created_at",
    "updated_at",
];

/// Flat-file ledger. Every write takes an exclusive lock on `<path>.lock`,
/// re-reads the file, applies the change and replaces the file through a
/// temp file + rename, so readers never see a half-written ledger and
/// writers in other processes never overwrite each other's rows.
///
/// The lock lives on a sibling file because the rename swaps the ledger's
/// inode on every write.
pub struct CsvLedger {
    path: PathBuf,
    /// Keeps same-process writers from parking several blocking threads on
    /// the file lock.
    write_lock: Mutex<()>,
}

impl CsvLedger {
    /// Opens (creating with a header if missing) and reads the ledger once, so a
    /// broken file fails at startup rather than mid-run.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let rows = blocking({
            let path = path.clone();
            move || {
                if let Some(parent) = parent_dir(&path) {
                    std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
                }
                with_file_lock(&path, || ensure_file(&path))?;
                read_rows(&path)
            }
        })
        .await?;

        info!(
            "CSV ledger ready at {} ({} applications)",
            path.display(),
            rows.len()
        );

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Ledger for CsvLedger {
    fn backend(&self) -> &'static str {
        "csv"
    }

    async fn get(&self, url: &str) -> Result<Option<ApplicationRecord>, LedgerError> {
        let path = self.path.clone();
        let url = url.to_string();
        blocking(move || Ok(read_rows(&path)?.into_iter().find(|r| r.url == url))).await
    }

    async fn record(
        &self,
        url: &str,
        title: &str,
        company: &str,
        date_applied: NaiveDate,
        policy: ReapplyPolicy,
    ) -> Result<RecordOutcome, LedgerError> {
        let _guard = self.write_lock.lock().await;

        let path = self.path.clone();
        let url = url.to_string();
        let title = title.to_string();
        let company = company.to_string();

        blocking(move || {
            with_file_lock(&path, || {
                let mut rows = read_rows(&path)?;
                let now = Utc::now();

                let outcome = match rows.iter_mut().find(|r| r.url == url) {
                    Some(existing) if policy.allows(existing.date_applied, date_applied) => {
                        debug!(
                            "Ledger update {}: {} -> {}",
                            url, existing.date_applied, date_applied
                        );
                        existing.date_applied = date_applied;
                        if !title.is_empty() {
                            existing.title = title;
                        }
                        if !company.is_empty() {
                            existing.company = company;
                        }
                        existing.updated_at = Some(now);
                        RecordOutcome::Updated
                    }
                    Some(existing) => {
                        debug!(
                            "Ledger already has {url} from {}, leaving it",
                            existing.date_applied
                        );
                        return Ok(RecordOutcome::AlreadyRecorded);
                    }
                    None => {
                        debug!("Ledger insert {url} ({date_applied})");
                        rows.push(ApplicationRecord {
                            url,
                            date_applied,
                            title,
                            company,
                            created_at: now,
                            updated_at: None,
                        });
                        RecordOutcome::Inserted
                    }
                };

                write_rows(&path, &rows)?;
                Ok(outcome)
            })
        })
        .await
    }

    async fn count(&self) -> Result<u64, LedgerError> {
        let path = self.path.clone();
        blocking(move || Ok(read_rows(&path)?.len() as u64)).await
    }
}

/// Runs file I/O on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, LedgerError>
where
    F: FnOnce() -> Result<T, LedgerError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| LedgerError::Task(e.to_string()))?
}

fn io_error(path: &Path, source: std::io::Error) -> LedgerError {
    LedgerError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

/// Runs `f` holding an exclusive OS lock on `<path>.lock`. Blocks until
/// other holders, in this process or another, release it.
fn with_file_lock<T>(
    path: &Path,
    f: impl FnOnce() -> Result<T, LedgerError>,
) -> Result<T, LedgerError> {
    let lock_path = lock_path(path);
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| io_error(&lock_path, e))?;
    let mut lock = RwLock::new(file);
    let _held = lock.write().map_err(|e| io_error(&lock_path, e))?;
    f()
}

fn ensure_file(path: &Path) -> Result<(), LedgerError> {
    if path.exists() {
        return Ok(());
    }
    write_rows(path, &[])?;
    info!("Created new ledger file {}", path.display());
    Ok(())
}

fn read_rows(path: &Path) -> Result<Vec<ApplicationRecord>, LedgerError> {
    let file = File::open(path).map_err(|e| io_error(path, e))?;
    let mut reader = csv::Reader::from_reader(file);
    reader
        .deserialize::<ApplicationRecord>()
        .map(|row| row.map_err(LedgerError::from))
        .collect()
}

fn write_rows(path: &Path, rows: &[ApplicationRecord]) -> Result<(), LedgerError> {
    let dir = parent_dir(path).unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| io_error(dir, e))?;
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(&mut tmp);
        writer.write_record(HEADER)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush().map_err(|e| io_error(path, e))?;
    }
    tmp.persist(path).map_err(|e| io_error(path, e.error))?;
    Ok(())
}

fn parent_dir(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}
