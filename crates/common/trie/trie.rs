pub mod db;
pub mod error;
pub mod node;
mod secure;
mod trie_iter;

use std::collections::HashMap;
use std::sync::Arc;

use ethereum_types::H256;
use ledger_rlp::constants::RLP_NULL;
use ledger_rlp::decode::RLPDecode;
use ledger_rlp::encode::RLPEncode;
use sha3::{Digest, Keccak256};

pub use self::db::{InMemoryTrieDB, TrieDB};
pub use self::error::TrieError;
pub use self::node::Node;
pub use self::secure::{SecureTrie, SecureTrieIterator};
pub use self::trie_iter::TrieIterator;

use self::node::bytes_to_nibbles;

/// RLP-encoded trie path.
pub type PathRLP = Vec<u8>;
/// RLP-encoded trie value.
pub type ValueRLP = Vec<u8>;

lazy_static::lazy_static! {
    // Hash value for an empty trie, equal to keccak(RLP_NULL)
    pub static ref EMPTY_TRIE_HASH: H256 = H256(Keccak256::digest([RLP_NULL]).into());
}

/// Computes the Keccak-256 digest of the given data.
pub fn keccak(data: impl AsRef<[u8]>) -> H256 {
    H256(Keccak256::digest(data.as_ref()).into())
}

/// Content-addressed radix-16 trie over nibble paths.
///
/// Nodes are stored by the Keccak-256 digest of their RLP encoding, one
/// node per nibble of the path with no compression. The tree shape is a
/// pure function of the key set, so the root digest does not depend on the
/// order in which keys were inserted or removed.
///
/// Mutations build replacement nodes in an in-memory overlay; nothing
/// reaches the backing [`TrieDB`] until [`commit_to`](Trie::commit_to).
#[derive(Clone)]
pub struct Trie {
    db: Arc<dyn TrieDB>,
    root: Option<H256>,
    /// Nodes created since the last commit, keyed by their digest.
    pending: HashMap<H256, Node>,
}

impl Trie {
    /// Creates an empty trie backed by the given database.
    pub fn new(db: Arc<dyn TrieDB>) -> Self {
        Self {
            db,
            root: None,
            pending: HashMap::new(),
        }
    }

    /// Opens a trie at a previously committed root.
    /// Fails with [`TrieError::RootNotFound`] if the root node is not in the
    /// database. A zero or empty-trie root opens an empty trie.
    pub fn open(db: Arc<dyn TrieDB>, root: H256) -> Result<Self, TrieError> {
        let mut trie = Self::new(db);
        if root != H256::zero() && root != *EMPTY_TRIE_HASH {
            if trie.db.get(root)?.is_none() {
                return Err(TrieError::RootNotFound);
            }
            trie.root = Some(root);
        }
        Ok(trie)
    }

    /// Returns the root digest of the trie. Pure, never touches the database.
    pub fn hash(&self) -> H256 {
        self.root.unwrap_or(*EMPTY_TRIE_HASH)
    }

    /// Retrieves the value stored under the given path, if any.
    pub fn get(&self, path: &PathRLP) -> Result<Option<ValueRLP>, TrieError> {
        let mut current = match self.root {
            Some(root) => self.get_node(root)?,
            None => return Ok(None),
        };
        for nibble in bytes_to_nibbles(path) {
            current = match current.child(nibble) {
                Some(child) => self.get_node(child)?,
                None => return Ok(None),
            };
        }
        Ok(current.value)
    }

    /// Stores a value under the given path, overwriting any previous value.
    /// An empty value removes the path instead, keeping the tree shape
    /// canonical.
    pub fn insert(&mut self, path: PathRLP, value: ValueRLP) -> Result<(), TrieError> {
        if value.is_empty() {
            return self.remove(&path);
        }
        let nibbles = bytes_to_nibbles(&path);
        let new_root = self.insert_at(self.root, &nibbles, value)?;
        self.root = Some(new_root);
        Ok(())
    }

    /// Removes the value stored under the given path. Removing an absent
    /// path is a no-op.
    pub fn remove(&mut self, path: &PathRLP) -> Result<(), TrieError> {
        let Some(root) = self.root else {
            return Ok(());
        };
        let nibbles = bytes_to_nibbles(path);
        self.root = self.remove_at(root, &nibbles)?;
        Ok(())
    }

    /// Persists every node created since the trie was opened or last
    /// committed as a single batch, and returns the root digest.
    pub fn commit_to(&mut self, db: &dyn TrieDB) -> Result<H256, TrieError> {
        let batch = self
            .pending
            .iter()
            .map(|(hash, node)| (*hash, node.encode_to_vec()))
            .collect::<Vec<_>>();
        db.put_batch(batch)?;
        self.pending.clear();
        Ok(self.hash())
    }

    /// Returns an iterator over the stored (path, value) pairs, ordered by
    /// path bytes.
    pub fn iter(&self) -> TrieIterator<'_> {
        TrieIterator::new(self, self.root)
    }

    fn insert_at(
        &mut self,
        node_hash: Option<H256>,
        path: &[u8],
        value: ValueRLP,
    ) -> Result<H256, TrieError> {
        let mut node = match node_hash {
            Some(hash) => self.get_node(hash)?,
            None => Node::default(),
        };
        match path {
            [] => node.value = Some(value),
            [nibble, rest @ ..] => {
                let child = self.insert_at(node.child(*nibble), rest, value)?;
                node.choices[*nibble as usize] = Some(child);
            }
        }
        Ok(self.store_node(node))
    }

    /// Removes a path below the given node, rebuilding the spine above it.
    /// Returns the replacement node digest, or `None` if the node became
    /// empty and vanished.
    fn remove_at(&mut self, node_hash: H256, path: &[u8]) -> Result<Option<H256>, TrieError> {
        let mut node = self.get_node(node_hash)?;
        match path {
            [] => node.value = None,
            [nibble, rest @ ..] => match node.child(*nibble) {
                // absent path, nothing to do
                None => return Ok(Some(node_hash)),
                Some(child) => {
                    node.choices[*nibble as usize] = self.remove_at(child, rest)?;
                }
            },
        }
        if node.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.store_node(node)))
        }
    }

    /// Fetches a node from the overlay or the database.
    /// A dangling reference means the tree is corrupted.
    fn get_node(&self, node_hash: H256) -> Result<Node, TrieError> {
        if let Some(node) = self.pending.get(&node_hash) {
            return Ok(node.clone());
        }
        match self.db.get(node_hash)? {
            Some(encoded) => Ok(Node::decode(&encoded)?),
            None => Err(TrieError::InconsistentTree),
        }
    }

    fn store_node(&mut self, node: Node) -> H256 {
        let hash = keccak(node.encode_to_vec());
        self.pending.insert(hash, node);
        hash
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use proptest::collection::{btree_map, vec};
    use proptest::prelude::*;

    fn new_trie() -> Trie {
        Trie::new(Arc::new(InMemoryTrieDB::new_empty()))
    }

    #[test]
    fn empty_trie_hash_matches_known_value() {
        assert_eq!(
            *EMPTY_TRIE_HASH,
            H256(hex!(
                "56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421"
            ))
        );
        assert_eq!(new_trie().hash(), *EMPTY_TRIE_HASH);
    }

    #[test]
    fn insert_and_get() {
        let mut trie = new_trie();
        trie.insert(b"horse".to_vec(), b"stallion".to_vec()).unwrap();
        trie.insert(b"dog".to_vec(), b"puppy".to_vec()).unwrap();

        assert_eq!(trie.get(&b"horse".to_vec()).unwrap(), Some(b"stallion".to_vec()));
        assert_eq!(trie.get(&b"dog".to_vec()).unwrap(), Some(b"puppy".to_vec()));
        assert_eq!(trie.get(&b"cat".to_vec()).unwrap(), None);
    }

    #[test]
    fn insert_overwrites() {
        let mut trie = new_trie();
        trie.insert(b"key".to_vec(), b"one".to_vec()).unwrap();
        trie.insert(b"key".to_vec(), b"two".to_vec()).unwrap();
        assert_eq!(trie.get(&b"key".to_vec()).unwrap(), Some(b"two".to_vec()));
    }

    #[test]
    fn prefix_keys_do_not_clash() {
        let mut trie = new_trie();
        trie.insert(b"do".to_vec(), b"verb".to_vec()).unwrap();
        trie.insert(b"dog".to_vec(), b"puppy".to_vec()).unwrap();
        assert_eq!(trie.get(&b"do".to_vec()).unwrap(), Some(b"verb".to_vec()));
        assert_eq!(trie.get(&b"dog".to_vec()).unwrap(), Some(b"puppy".to_vec()));
    }

    #[test]
    fn remove_restores_prior_root() {
        let mut trie = new_trie();
        trie.insert(b"a".to_vec(), b"1".to_vec()).unwrap();
        let root_before = trie.hash();
        trie.insert(b"b".to_vec(), b"2".to_vec()).unwrap();
        assert_ne!(trie.hash(), root_before);
        trie.remove(&b"b".to_vec()).unwrap();
        assert_eq!(trie.hash(), root_before);
    }

    #[test]
    fn remove_last_key_restores_empty_root() {
        let mut trie = new_trie();
        trie.insert(b"a".to_vec(), b"1".to_vec()).unwrap();
        trie.remove(&b"a".to_vec()).unwrap();
        assert_eq!(trie.hash(), *EMPTY_TRIE_HASH);
    }

    #[test]
    fn insert_empty_value_removes_key() {
        let mut trie = new_trie();
        trie.insert(b"a".to_vec(), b"1".to_vec()).unwrap();
        trie.insert(b"a".to_vec(), vec![]).unwrap();
        assert_eq!(trie.get(&b"a".to_vec()).unwrap(), None);
        assert_eq!(trie.hash(), *EMPTY_TRIE_HASH);
    }

    #[test]
    fn root_is_insertion_order_independent() {
        let mut forward = new_trie();
        let mut backward = new_trie();
        let entries: Vec<(Vec<u8>, Vec<u8>)> = (0u8..32)
            .map(|i| (vec![i, i.wrapping_mul(7)], vec![i + 1]))
            .collect();
        for (path, value) in &entries {
            forward.insert(path.clone(), value.clone()).unwrap();
        }
        for (path, value) in entries.iter().rev() {
            backward.insert(path.clone(), value.clone()).unwrap();
        }
        assert_eq!(forward.hash(), backward.hash());
    }

    #[test]
    fn commit_and_reopen() {
        let db = Arc::new(InMemoryTrieDB::new_empty());
        let mut trie = Trie::new(db.clone());
        trie.insert(b"alpha".to_vec(), b"1".to_vec()).unwrap();
        trie.insert(b"beta".to_vec(), b"2".to_vec()).unwrap();
        let root = trie.commit_to(db.as_ref()).unwrap();

        let reopened = Trie::open(db, root).unwrap();
        assert_eq!(reopened.hash(), root);
        assert_eq!(reopened.get(&b"alpha".to_vec()).unwrap(), Some(b"1".to_vec()));
        assert_eq!(reopened.get(&b"beta".to_vec()).unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn open_unknown_root_fails() {
        let db = Arc::new(InMemoryTrieDB::new_empty());
        let result = Trie::open(db, H256::repeat_byte(0xaa));
        assert_eq!(result.err(), Some(TrieError::RootNotFound));
    }

    #[test]
    fn open_empty_roots() {
        let db = Arc::new(InMemoryTrieDB::new_empty());
        assert_eq!(Trie::open(db.clone(), H256::zero()).unwrap().hash(), *EMPTY_TRIE_HASH);
        assert_eq!(Trie::open(db, *EMPTY_TRIE_HASH).unwrap().hash(), *EMPTY_TRIE_HASH);
    }

    #[test]
    fn uncommitted_writes_do_not_reach_db() {
        let db = Arc::new(InMemoryTrieDB::new_empty());
        let mut trie = Trie::new(db.clone());
        trie.insert(b"key".to_vec(), b"value".to_vec()).unwrap();
        let root = trie.hash();
        assert!(db.get(root).unwrap().is_none());

        trie.commit_to(db.as_ref()).unwrap();
        assert!(db.get(root).unwrap().is_some());
    }

    #[test]
    fn iteration_reports_missing_nodes() {
        let db = Arc::new(InMemoryTrieDB::new_empty());
        let mut trie = Trie::new(db.clone());
        trie.insert(b"alpha".to_vec(), b"1".to_vec()).unwrap();
        trie.insert(b"beta".to_vec(), b"2".to_vec()).unwrap();
        let root = trie.commit_to(db.as_ref()).unwrap();

        // a store holding only the root node cannot serve the children
        let partial = Arc::new(InMemoryTrieDB::new_empty());
        partial.put(root, db.get(root).unwrap().unwrap()).unwrap();
        let reopened = Trie::open(partial, root).unwrap();

        let mut entries = reopened.iter();
        assert_eq!(entries.next(), None);
        assert_eq!(entries.take_error(), Some(TrieError::InconsistentTree));
        // the error is handed over once
        assert_eq!(entries.take_error(), None);
    }

    #[test]
    fn iterates_in_path_order() {
        let mut trie = new_trie();
        let mut entries = vec![
            (b"dog".to_vec(), b"puppy".to_vec()),
            (b"cat".to_vec(), b"kitten".to_vec()),
            (b"doge".to_vec(), b"coin".to_vec()),
            (b"ant".to_vec(), b"hill".to_vec()),
        ];
        for (path, value) in &entries {
            trie.insert(path.clone(), value.clone()).unwrap();
        }
        entries.sort();
        let collected: Vec<_> = trie.iter().collect();
        assert_eq!(collected, entries);
    }

    proptest! {
        #[test]
        fn proptest_get_after_insert(data in btree_map(vec(any::<u8>(), 1..16), vec(any::<u8>(), 1..32), 1..64)) {
            let mut trie = new_trie();
            for (path, value) in &data {
                trie.insert(path.clone(), value.clone()).unwrap();
            }
            for (path, value) in &data {
                prop_assert_eq!(trie.get(path).unwrap(), Some(value.clone()));
            }
        }

        #[test]
        fn proptest_remove_half(data in btree_map(vec(any::<u8>(), 1..16), vec(any::<u8>(), 1..32), 2..64)) {
            let mut trie = new_trie();
            for (path, value) in &data {
                trie.insert(path.clone(), value.clone()).unwrap();
            }
            let keep: Vec<_> = data.iter().step_by(2).collect();
            let drop: Vec<_> = data.iter().skip(1).step_by(2).collect();
            for &(path, _) in &drop {
                trie.remove(path).unwrap();
            }
            for &(path, value) in &keep {
                prop_assert_eq!(trie.get(path).unwrap(), Some(value.clone()));
            }
            for &(path, _) in &drop {
                prop_assert_eq!(trie.get(path).unwrap(), None);
            }

            // a trie that never saw the removed keys has the same root
            let mut fresh = new_trie();
            for &(path, value) in &keep {
                fresh.insert(path.clone(), value.clone()).unwrap();
            }
            prop_assert_eq!(trie.hash(), fresh.hash());
        }
    }
}
