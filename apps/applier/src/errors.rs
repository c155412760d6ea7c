use thiserror::Error;

use crate::ledger::LedgerError;
use crate::surface::SurfaceError;

/// Run-level error type. Only these abort a run; anything that goes wrong
/// with a single listing is classified by the walker and counted in the
/// run summary instead.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Ledger unavailable: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Browser session error: {0}")]
    Surface(#[from] SurfaceError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RunError {
    /// Stable machine-readable code, logged alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            RunError::Config(_) => "CONFIG_ERROR",
            RunError::Authentication(_) => "AUTHENTICATION_ERROR",
            RunError::Ledger(_) => "LEDGER_UNAVAILABLE",
            RunError::Surface(_) => "BROWSER_ERROR",
            RunError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
