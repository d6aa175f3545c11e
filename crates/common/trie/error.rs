use ledger_rlp::error::RLPDecodeError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrieError {
    #[error(transparent)]
    RLPDecode(#[from] RLPDecodeError),
    #[error("Inconsistent internal tree structure")]
    InconsistentTree,
    #[error("Root node not found in the database")]
    RootNotFound,
    #[error("Lock is poisoned")]
    LockError,
    #[error("Database error: {0}")]
    DbError(String),
}
