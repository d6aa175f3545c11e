use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use ledger_rlp::{
    decode::{RLPDecode, decode_bytes, static_left_pad},
    encode::RLPEncode,
    error::RLPDecodeError,
};
use ledger_trie::{SecureTrie, TrieDB, TrieError, keccak};
use tracing::{debug, trace};

use crate::account::{AccountState, EMPTY_CODE_HASH};
use crate::error::StateError;

/// Write-through cache of one account's storage slots.
///
/// Absence of a key means "unknown, consult the trie". A zero-valued entry
/// is an explicit pending deletion. Ordered so that flushes and iteration
/// are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageCache(BTreeMap<H256, H256>);

impl StorageCache {
    pub fn get(&self, key: &H256) -> Option<H256> {
        self.0.get(key).copied()
    }

    pub fn insert(&mut self, key: H256, value: H256) {
        self.0.insert(key, value);
    }

    pub fn contains_key(&self, key: &H256) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (H256, H256)> + '_ {
        self.0.iter().map(|(key, value)| (*key, *value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One account's in-progress mutable state.
///
/// Execution logic reads and writes through the object; nothing reaches the
/// backing trie until [`update_root`](StateObject::update_root) folds the
/// cached writes in and [`commit_trie`](StateObject::commit_trie) persists
/// the result. Backend failures on the read path are deferred: the first
/// one is remembered and returned at commit time, and reads keep serving
/// from the cache meanwhile.
///
/// Single writer per object. The backing store handle is shared, the
/// object itself is never locked.
pub struct StateObject {
    address: Address,
    account: AccountState,
    /// Lazily loaded contract code.
    code: Option<Bytes>,
    /// Lazily opened storage trie, bound to `account.storage_root`.
    trie: Option<SecureTrie>,
    storage: StorageCache,
    dirty: bool,
    dirty_code: bool,
    marked_for_removal: bool,
    deleted: bool,
    /// First backend failure observed by this object, kept until commit.
    first_error: Option<StateError>,
}

impl StateObject {
    pub fn new(address: Address, account: AccountState) -> Self {
        Self {
            address,
            account,
            code: None,
            trie: None,
            storage: StorageCache::default(),
            dirty: false,
            dirty_code: false,
            marked_for_removal: false,
            deleted: false,
            first_error: None,
        }
    }

    /// Rebuilds an object from its RLP encoded account record, as stored in
    /// the global state trie.
    pub fn decode(address: Address, encoded: &[u8]) -> Result<Self, StateError> {
        let account = AccountState::decode(encoded)?;
        Ok(Self::new(address, account))
    }

    /// Retrieves a storage slot, preferring the cache over the trie.
    /// An absent slot reads as zero. Only non-zero values are cached on the
    /// read path, so a later write of zero still registers as a deletion.
    pub fn get_state(&mut self, db: &Arc<dyn TrieDB>, key: H256) -> H256 {
        if let Some(value) = self.storage.get(&key) {
            return value;
        }
        let trie = self.storage_trie(db);
        let encoded = match trie.get(key.as_bytes()) {
            Ok(Some(encoded)) => encoded,
            Ok(None) => return H256::zero(),
            Err(source) => {
                self.set_error(source.into());
                return H256::zero();
            }
        };
        let value = match decode_storage_value(&encoded) {
            Ok(value) => value,
            Err(source) => {
                self.set_error(source.into());
                return H256::zero();
            }
        };
        if !value.is_zero() {
            self.storage.insert(key, value);
        }
        value
    }

    /// Writes a storage slot into the cache. Zero marks the slot for
    /// deletion. The trie is not touched.
    pub fn set_state(&mut self, key: H256, value: H256) {
        self.storage.insert(key, value);
        self.dirty = true;
    }

    pub fn balance(&self) -> U256 {
        self.account.balance
    }

    pub fn set_balance(&mut self, balance: U256) {
        trace!(account = %self.address, old = %self.account.balance, new = %balance, "balance change");
        self.account.balance = balance;
        self.dirty = true;
    }

    pub fn add_balance(&mut self, amount: U256) {
        self.set_balance(self.account.balance.saturating_add(amount));
    }

    pub fn sub_balance(&mut self, amount: U256) {
        self.set_balance(self.account.balance.saturating_sub(amount));
    }

    pub fn nonce(&self) -> u64 {
        self.account.nonce
    }

    pub fn set_nonce(&mut self, nonce: u64) {
        self.account.nonce = nonce;
        self.dirty = true;
    }

    /// Returns the account's code, loading it from the backing store by
    /// hash on first use. A load failure is deferred and reads as empty
    /// code.
    pub fn code(&mut self, db: &Arc<dyn TrieDB>) -> Bytes {
        if let Some(code) = &self.code {
            return code.clone();
        }
        if self.account.code_hash == EMPTY_CODE_HASH {
            let code = Bytes::new();
            self.code = Some(code.clone());
            return code;
        }
        let code = match db.get(self.account.code_hash) {
            Ok(Some(bytes)) => Bytes::from(bytes),
            Ok(None) => {
                self.set_error(StateError::MissingCode(self.account.code_hash));
                Bytes::new()
            }
            Err(source) => {
                self.set_error(StateError::CodeLoad {
                    code_hash: self.account.code_hash,
                    source,
                });
                Bytes::new()
            }
        };
        self.code = Some(code.clone());
        code
    }

    /// Returns the code size, computing it at most once per object.
    pub fn code_size(&mut self, db: &Arc<dyn TrieDB>) -> usize {
        if let Some(size) = self.account.code_size.get() {
            return *size;
        }
        let size = self.code(db).len();
        *self.account.code_size.get_or_init(|| size)
    }

    /// Replaces the account's code, rehashing and resizing accordingly.
    pub fn set_code(&mut self, code: Bytes) {
        self.account.code_hash = keccak(code.as_ref());
        self.account.code_size = OnceCell::from(code.len());
        self.code = Some(code);
        self.dirty = true;
        self.dirty_code = true;
    }

    /// Flags the account for removal at the end of the transition. Reads
    /// and writes remain permitted until then.
    pub fn mark_for_removal(&mut self) {
        trace!(account = %self.address, "marked for removal");
        self.marked_for_removal = true;
        self.dirty = true;
    }

    /// Folds every cached slot into the storage trie (zero values delete
    /// their slot) and recomputes `storage_root`. Nothing is persisted.
    pub fn update_root(&mut self, db: &Arc<dyn TrieDB>) {
        self.flush_storage(db);
        if let Some(trie) = &self.trie {
            self.account.storage_root = trie.hash();
        }
    }

    /// Folds the cached writes in and persists the trie through `writer`.
    /// If any backend failure was deferred since the object was created,
    /// the commit fails with that first error and `storage_root` keeps its
    /// stale value as the failure signal.
    pub fn commit_trie(
        &mut self,
        db: &Arc<dyn TrieDB>,
        writer: &dyn TrieDB,
    ) -> Result<H256, StateError> {
        self.flush_storage(db);
        if let Some(err) = &self.first_error {
            return Err(err.clone());
        }
        let trie = self.storage_trie(db);
        let root = trie.commit_to(writer)?;
        self.account.storage_root = root;
        Ok(root)
    }

    /// Produces an independent snapshot of the object. The two objects
    /// share only the refcounted code bytes and the backing store handle;
    /// caches, flags, the deferred error and the trie overlay are copied.
    pub fn copy(&self) -> Self {
        Self {
            address: self.address,
            account: self.account.clone(),
            code: self.code.clone(),
            trie: self.trie.clone(),
            storage: self.storage.clone(),
            dirty: self.dirty,
            dirty_code: self.dirty_code,
            marked_for_removal: self.marked_for_removal,
            deleted: self.deleted,
            first_error: self.first_error.clone(),
        }
    }

    /// Visits every storage slot exactly once: cached entries first
    /// (pending zero-valued deletions included), then committed slots not
    /// shadowed by the cache, in trie order. Backend failures are deferred
    /// and the affected slots skipped.
    pub fn for_each_storage<F>(&mut self, db: &Arc<dyn TrieDB>, mut visit: F)
    where
        F: FnMut(H256, H256),
    {
        for (key, value) in self.storage.iter() {
            visit(key, value);
        }
        self.storage_trie(db);
        let Some(trie) = self.trie.take() else {
            return;
        };
        let mut entries = trie.iter();
        while let Some((hashed, encoded)) = entries.next() {
            let key = match trie.get_key(hashed) {
                Ok(Some(bytes)) if bytes.len() == 32 => H256::from_slice(&bytes),
                // no preimage, the slot cannot be mapped back to its key
                Ok(_) => continue,
                Err(source) => {
                    self.set_error(source.into());
                    continue;
                }
            };
            if self.storage.contains_key(&key) {
                continue;
            }
            match decode_storage_value(&encoded) {
                Ok(value) => visit(key, value),
                Err(source) => self.set_error(source.into()),
            }
        }
        if let Some(source) = entries.take_error() {
            self.set_error(source.into());
        }
        self.trie = Some(trie);
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn account(&self) -> &AccountState {
        &self.account
    }

    pub fn code_hash(&self) -> H256 {
        self.account.code_hash
    }

    pub fn storage_root(&self) -> H256 {
        self.account.storage_root
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_code_dirty(&self) -> bool {
        self.dirty_code
    }

    pub fn is_marked_for_removal(&self) -> bool {
        self.marked_for_removal
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Records that the account was removed from the global trie.
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    /// The first backend failure deferred by this object, if any.
    pub fn first_error(&self) -> Option<&StateError> {
        self.first_error.as_ref()
    }

    /// Opens the storage trie at the account's root on first use. If the
    /// root cannot be opened the object binds an empty trie and defers the
    /// error, keeping the read and write paths usable.
    fn storage_trie(&mut self, db: &Arc<dyn TrieDB>) -> &mut SecureTrie {
        if self.trie.is_none() {
            let trie = match SecureTrie::open(db.clone(), self.account.storage_root) {
                Ok(trie) => trie,
                Err(source) => {
                    self.set_error(StateError::TrieInit {
                        root: self.account.storage_root,
                        source,
                    });
                    SecureTrie::new(db.clone())
                }
            };
            self.trie = Some(trie);
        }
        self.trie.get_or_insert_with(|| SecureTrie::new(db.clone()))
    }

    fn flush_storage(&mut self, db: &Arc<dyn TrieDB>) {
        self.storage_trie(db);
        let Some(mut trie) = self.trie.take() else {
            return;
        };
        let mut flush_error: Option<TrieError> = None;
        for (key, value) in self.storage.iter() {
            let result = if value.is_zero() {
                trie.remove(key.as_bytes())
            } else {
                trie.insert(key.as_bytes(), encode_storage_value(value))
            };
            if let Err(source) = result {
                flush_error.get_or_insert(source);
            }
        }
        self.trie = Some(trie);
        if let Some(source) = flush_error {
            self.set_error(source.into());
        }
    }

    /// First failure wins; later ones are dropped.
    fn set_error(&mut self, err: StateError) {
        if self.first_error.is_none() {
            debug!(account = %self.address, error = %err, "deferring state error");
            self.first_error = Some(err);
        }
    }
}

impl RLPEncode for StateObject {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        self.account.encode(buf);
    }
}

/// Storage values are stored as their minimal big-endian byte string,
/// leading zeros stripped.
fn encode_storage_value(value: H256) -> Vec<u8> {
    let start = value
        .as_bytes()
        .iter()
        .position(|&byte| byte != 0)
        .unwrap_or(32);
    value.as_bytes()[start..].encode_to_vec()
}

fn decode_storage_value(encoded: &[u8]) -> Result<H256, RLPDecodeError> {
    let (bytes, rest) = decode_bytes(encoded)?;
    if !rest.is_empty() {
        return Err(RLPDecodeError::InvalidLength);
    }
    Ok(H256(static_left_pad::<32>(bytes)?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn storage_value_codec_strips_and_restores() {
        let value = H256::from_low_u64_be(0x0400);
        let encoded = encode_storage_value(value);
        assert_eq!(encoded, vec![0x82, 0x04, 0x00]);
        assert_eq!(decode_storage_value(&encoded).unwrap(), value);

        let full = H256::repeat_byte(0xff);
        assert_eq!(decode_storage_value(&encode_storage_value(full)).unwrap(), full);
    }

    #[test]
    fn storage_value_decode_rejects_padded_form() {
        // 33 bytes cannot left-pad into a 32 byte digest
        let mut oversized = vec![0xa1, 0x01];
        oversized.extend(std::iter::repeat_n(0xab, 32));
        assert!(decode_storage_value(&oversized).is_err());
    }

    #[test]
    fn storage_cache_overwrites_and_iterates_in_order() {
        let mut cache = StorageCache::default();
        cache.insert(H256::repeat_byte(0x02), H256::from_low_u64_be(2));
        cache.insert(H256::repeat_byte(0x01), H256::from_low_u64_be(1));
        cache.insert(H256::repeat_byte(0x02), H256::from_low_u64_be(20));

        assert_eq!(cache.len(), 2);
        let entries: Vec<_> = cache.iter().collect();
        assert_eq!(entries[0], (H256::repeat_byte(0x01), H256::from_low_u64_be(1)));
        assert_eq!(entries[1], (H256::repeat_byte(0x02), H256::from_low_u64_be(20)));
    }
}
