use std::collections::BTreeMap;
use std::sync::Arc;

use ethereum_types::H256;

use crate::db::TrieDB;
use crate::error::TrieError;
use crate::trie_iter::TrieIterator;
use crate::{Trie, ValueRLP, keccak};

/// Domain separator for preimage entries in the flat store.
const PREIMAGE_PREFIX: &[u8] = b"secure-key-";

/// Key-hashed wrapper around [`Trie`].
///
/// Every key is mapped to its Keccak-256 digest before touching the
/// underlying trie, bounding path depth and decoupling the tree shape from
/// key contents. The original keys are recorded as preimages so iteration
/// results can be mapped back; preimages persist alongside the nodes on
/// [`commit_to`](SecureTrie::commit_to).
#[derive(Clone)]
pub struct SecureTrie {
    trie: Trie,
    db: Arc<dyn TrieDB>,
    /// Preimages of the keys hashed since the last commit.
    preimages: BTreeMap<H256, Vec<u8>>,
}

impl SecureTrie {
    /// Creates an empty key-hashed trie backed by the given database.
    pub fn new(db: Arc<dyn TrieDB>) -> Self {
        Self {
            trie: Trie::new(db.clone()),
            db,
            preimages: BTreeMap::new(),
        }
    }

    /// Opens a key-hashed trie at a previously committed root.
    pub fn open(db: Arc<dyn TrieDB>, root: H256) -> Result<Self, TrieError> {
        Ok(Self {
            trie: Trie::open(db.clone(), root)?,
            db,
            preimages: BTreeMap::new(),
        })
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<ValueRLP>, TrieError> {
        self.trie.get(&hash_key(key))
    }

    pub fn insert(&mut self, key: &[u8], value: ValueRLP) -> Result<(), TrieError> {
        let hashed = keccak(key);
        self.preimages.insert(hashed, key.to_vec());
        self.trie.insert(hashed.as_bytes().to_vec(), value)
    }

    pub fn remove(&mut self, key: &[u8]) -> Result<(), TrieError> {
        self.trie.remove(&hash_key(key))
    }

    /// Returns the root digest. Pure, never touches the database.
    pub fn hash(&self) -> H256 {
        self.trie.hash()
    }

    /// Recovers the original key for a hashed path, from the in-memory
    /// preimages or the committed ones in the database.
    pub fn get_key(&self, hashed: H256) -> Result<Option<Vec<u8>>, TrieError> {
        if let Some(key) = self.preimages.get(&hashed) {
            return Ok(Some(key.clone()));
        }
        self.db.get(preimage_db_key(hashed))
    }

    /// Persists the pending nodes and preimages as batches, and returns the
    /// root digest.
    pub fn commit_to(&mut self, db: &dyn TrieDB) -> Result<H256, TrieError> {
        let preimage_batch = self
            .preimages
            .iter()
            .map(|(hashed, key)| (preimage_db_key(*hashed), key.clone()))
            .collect::<Vec<_>>();
        db.put_batch(preimage_batch)?;
        self.preimages.clear();
        self.trie.commit_to(db)
    }

    /// Iterates over the stored entries as (hashed key, value) pairs,
    /// ordered by hashed key.
    pub fn iter(&self) -> SecureTrieIterator<'_> {
        SecureTrieIterator {
            inner: self.trie.iter(),
        }
    }
}

/// Iterator over a [`SecureTrie`]'s entries by hashed key.
pub struct SecureTrieIterator<'a> {
    inner: TrieIterator<'a>,
}

impl SecureTrieIterator<'_> {
    /// The failure that cut the iteration short, if any.
    pub fn take_error(&mut self) -> Option<TrieError> {
        self.inner.take_error()
    }
}

impl Iterator for SecureTrieIterator<'_> {
    type Item = (H256, ValueRLP);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (path, value) = self.inner.next()?;
            if path.len() == 32 {
                return Some((H256::from_slice(&path), value));
            }
        }
    }
}

fn hash_key(key: &[u8]) -> Vec<u8> {
    keccak(key).as_bytes().to_vec()
}

fn preimage_db_key(hashed: H256) -> H256 {
    keccak([PREIMAGE_PREFIX, hashed.as_bytes()].concat())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{EMPTY_TRIE_HASH, InMemoryTrieDB};

    fn new_secure() -> SecureTrie {
        SecureTrie::new(Arc::new(InMemoryTrieDB::new_empty()))
    }

    #[test]
    fn insert_get_remove() {
        let mut trie = new_secure();
        trie.insert(b"first", b"one".to_vec()).unwrap();
        trie.insert(b"second", b"two".to_vec()).unwrap();

        assert_eq!(trie.get(b"first").unwrap(), Some(b"one".to_vec()));
        assert_eq!(trie.get(b"second").unwrap(), Some(b"two".to_vec()));
        assert_eq!(trie.get(b"third").unwrap(), None);

        trie.remove(b"first").unwrap();
        trie.remove(b"second").unwrap();
        assert_eq!(trie.hash(), *EMPTY_TRIE_HASH);
    }

    #[test]
    fn preimages_survive_commit() {
        let db = Arc::new(InMemoryTrieDB::new_empty());
        let mut trie = SecureTrie::new(db.clone());
        trie.insert(b"some key", b"some value".to_vec()).unwrap();
        let hashed = keccak(b"some key");

        assert_eq!(trie.get_key(hashed).unwrap(), Some(b"some key".to_vec()));

        let root = trie.commit_to(db.as_ref()).unwrap();
        let reopened = SecureTrie::open(db, root).unwrap();
        assert_eq!(reopened.get_key(hashed).unwrap(), Some(b"some key".to_vec()));
        assert_eq!(reopened.get_key(H256::zero()).unwrap(), None);
    }

    #[test]
    fn iterates_hashed_entries() {
        let mut trie = new_secure();
        trie.insert(b"a", b"1".to_vec()).unwrap();
        trie.insert(b"b", b"2".to_vec()).unwrap();

        let entries: Vec<_> = trie.iter().collect();
        assert_eq!(entries.len(), 2);
        assert!(entries.contains(&(keccak(b"a"), b"1".to_vec())));
        assert!(entries.contains(&(keccak(b"b"), b"2".to_vec())));
        // ascending hashed-key order
        assert!(entries[0].0 < entries[1].0);
    }
}
