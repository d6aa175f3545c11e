//! Per-account mutable state layer.
//!
//! A [`StateObject`] wraps one account's record, buffers reads and writes in
//! memory while a transition executes, and reconciles them into the account's
//! storage trie on commit. Backend failures during execution are deferred
//! into a sticky per-object error that surfaces at commit time.

pub mod account;
pub mod error;
pub mod state_object;

pub use account::{AccountState, EMPTY_CODE_HASH, EMPTY_STORAGE_ROOT};
pub use error::StateError;
pub use state_object::{StateObject, StorageCache};
