use std::cell::OnceCell;

use ethereum_types::{H256, U256};
use hex_literal::hex;
use ledger_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

/// Keccak-256 digest of the empty byte string.
pub const EMPTY_CODE_HASH: H256 = H256(hex!(
    "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
));

/// Root digest of the empty storage trie.
pub const EMPTY_STORAGE_ROOT: H256 = H256(hex!(
    "56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421"
));

/// The persisted record of one account: what is stored under the account's
/// slot in the global state trie. Code and storage are stored out of line
/// and referenced by digest.
#[derive(Debug, Clone)]
pub struct AccountState {
    pub nonce: u64,
    pub balance: U256,
    pub storage_root: H256,
    pub code_hash: H256,
    /// Size of the account's code, computed at most once per instance.
    /// Derived from the loaded code, skipped by the codec.
    pub(crate) code_size: OnceCell<usize>,
}

impl AccountState {
    /// Builds a record, normalizing the zero digest to the canonical empty
    /// code hash and empty storage root.
    pub fn new(nonce: u64, balance: U256, storage_root: H256, code_hash: H256) -> Self {
        Self {
            nonce,
            balance,
            storage_root: if storage_root.is_zero() {
                EMPTY_STORAGE_ROOT
            } else {
                storage_root
            },
            code_hash: if code_hash.is_zero() {
                EMPTY_CODE_HASH
            } else {
                code_hash
            },
            code_size: OnceCell::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance.is_zero() && self.code_hash == EMPTY_CODE_HASH
    }

    pub fn has_code(&self) -> bool {
        self.code_hash != EMPTY_CODE_HASH
    }
}

impl Default for AccountState {
    fn default() -> Self {
        Self::new(0, U256::zero(), EMPTY_STORAGE_ROOT, EMPTY_CODE_HASH)
    }
}

// The code size cell is derived data, not part of the record's identity.
impl PartialEq for AccountState {
    fn eq(&self, other: &Self) -> bool {
        self.nonce == other.nonce
            && self.balance == other.balance
            && self.storage_root == other.storage_root
            && self.code_hash == other.code_hash
    }
}

impl Eq for AccountState {}

impl RLPEncode for AccountState {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.nonce)
            .encode_field(&self.balance)
            .encode_field(&self.storage_root)
            .encode_field(&self.code_hash)
            .finish();
    }
}

impl RLPDecode for AccountState {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (balance, decoder) = decoder.decode_field("balance")?;
        let (storage_root, decoder) = decoder.decode_field("storage_root")?;
        let (code_hash, decoder) = decoder.decode_field("code_hash")?;
        let state = AccountState {
            nonce,
            balance,
            storage_root,
            code_hash,
            code_size: OnceCell::new(),
        };
        Ok((state, decoder.finish()?))
    }
}
