use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use ethereum_types::H256;

use crate::error::TrieError;

/// Flat hash-keyed node store backing a [`Trie`](crate::Trie).
///
/// The same store holds trie nodes, key preimages and contract code, all
/// addressed by a 32 byte digest.
pub trait TrieDB: Send + Sync {
    fn get(&self, key: H256) -> Result<Option<Vec<u8>>, TrieError>;
    fn put_batch(&self, key_values: Vec<(H256, Vec<u8>)>) -> Result<(), TrieError>;
    fn put(&self, key: H256, value: Vec<u8>) -> Result<(), TrieError> {
        self.put_batch(vec![(key, value)])
    }
}

/// InMemory implementation for the TrieDB trait, with get and put operations.
#[derive(Default)]
pub struct InMemoryTrieDB {
    inner: Arc<Mutex<BTreeMap<H256, Vec<u8>>>>,
}

impl InMemoryTrieDB {
    pub const fn new(map: Arc<Mutex<BTreeMap<H256, Vec<u8>>>>) -> Self {
        Self { inner: map }
    }

    pub fn new_empty() -> Self {
        Self::default()
    }
}

impl TrieDB for InMemoryTrieDB {
    fn get(&self, key: H256) -> Result<Option<Vec<u8>>, TrieError> {
        Ok(self
            .inner
            .lock()
            .map_err(|_| TrieError::LockError)?
            .get(&key)
            .cloned())
    }

    fn put_batch(&self, key_values: Vec<(H256, Vec<u8>)>) -> Result<(), TrieError> {
        let mut db = self.inner.lock().map_err(|_| TrieError::LockError)?;
        for (key, value) in key_values {
            db.insert(key, value);
        }
        Ok(())
    }
}
