#![forbid(unsafe_code)]

use rg_core::model::TrialStatus;
use rusqlite::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("unknown id")]
    UnknownId,
    #[error("{kind} not found ({specifier})")]
    NotFound {
        kind: &'static str,
        specifier: String,
    },
    #[error("conflict: {0}")]
    Conflict(&'static str),
    #[error("trial cannot move from {} to {}", from.as_str(), to.as_str())]
    InvalidTransition { from: TrialStatus, to: TrialStatus },
}

impl StoreError {
    /// A concurrent writer held the database; the whole operation was rolled
    /// back and may be retried as-is.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Sql(rusqlite::Error::SqliteFailure(code, _)) => matches!(
                code.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

impl From<rg_core::reconcile::TransitionError> for StoreError {
    fn from(value: rg_core::reconcile::TransitionError) -> Self {
        Self::InvalidTransition {
            from: value.from,
            to: value.to,
        }
    }
}
