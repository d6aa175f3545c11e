use ethereum_types::H256;
use ledger_rlp::error::RLPDecodeError;
use ledger_trie::TrieError;
use thiserror::Error;

/// Errors deferred by a [`StateObject`](crate::StateObject).
///
/// `Clone` is required because the first deferred error is kept in the
/// object and returned again by every subsequent commit attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Failed to open storage trie at root {root:#x}: {source}")]
    TrieInit { root: H256, source: TrieError },
    #[error("Failed to load code {code_hash:#x}: {source}")]
    CodeLoad { code_hash: H256, source: TrieError },
    #[error("Code with hash {0:#x} not found")]
    MissingCode(H256),
    #[error(transparent)]
    Decode(#[from] RLPDecodeError),
    #[error(transparent)]
    Trie(#[from] TrieError),
}
