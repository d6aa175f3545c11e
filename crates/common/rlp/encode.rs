use bytes::{BufMut, Bytes};
use ethereum_types::{Address, H256, U256};

use super::constants::RLP_NULL;

/// Trait for encoding a value in RLP format into a buffer.
/// See <https://ethereum.org/en/developers/docs/data-structures-and-encoding/rlp/>
/// for the encoding rules.
pub trait RLPEncode {
    fn encode(&self, buf: &mut dyn BufMut);

    fn length(&self) -> usize {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf.len()
    }

    fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

/// Writes the list prefix for a payload of the given length.
pub fn encode_length(payload_len: usize, buf: &mut dyn BufMut) {
    if payload_len < 56 {
        buf.put_u8(0xc0 + payload_len as u8);
    } else {
        let be_bytes = payload_len.to_be_bytes();
        let start = be_bytes
            .iter()
            .position(|&byte| byte != 0)
            .unwrap_or(be_bytes.len() - 1);
        buf.put_u8(0xf7 + (be_bytes.len() - start) as u8);
        buf.put_slice(&be_bytes[start..]);
    }
}

/// Encodes a big-endian byte slice as an RLP integer, stripping leading zeros.
fn encode_integer_be(be_bytes: &[u8], buf: &mut dyn BufMut) {
    let start = be_bytes
        .iter()
        .position(|&byte| byte != 0)
        .unwrap_or(be_bytes.len());
    let trimmed = &be_bytes[start..];
    match trimmed {
        // zero is encoded as the empty string
        [] => buf.put_u8(RLP_NULL),
        // a single byte below 0x80 is its own encoding
        [byte] if *byte < RLP_NULL => buf.put_u8(*byte),
        _ => {
            buf.put_u8(RLP_NULL + trimmed.len() as u8);
            buf.put_slice(trimmed);
        }
    }
}

impl RLPEncode for bool {
    fn encode(&self, buf: &mut dyn BufMut) {
        if *self {
            buf.put_u8(0x01);
        } else {
            buf.put_u8(RLP_NULL);
        }
    }

    fn length(&self) -> usize {
        1
    }
}

impl RLPEncode for u8 {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_integer_be(&self.to_be_bytes(), buf);
    }
}

impl RLPEncode for u16 {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_integer_be(&self.to_be_bytes(), buf);
    }
}

impl RLPEncode for u32 {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_integer_be(&self.to_be_bytes(), buf);
    }
}

impl RLPEncode for u64 {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_integer_be(&self.to_be_bytes(), buf);
    }
}

impl RLPEncode for usize {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_integer_be(&self.to_be_bytes(), buf);
    }
}

impl RLPEncode for [u8] {
    fn encode(&self, buf: &mut dyn BufMut) {
        if self.len() == 1 && self[0] < RLP_NULL {
            buf.put_u8(self[0]);
            return;
        }
        if self.len() < 56 {
            buf.put_u8(RLP_NULL + self.len() as u8);
        } else {
            let be_bytes = self.len().to_be_bytes();
            let start = be_bytes
                .iter()
                .position(|&byte| byte != 0)
                .unwrap_or(be_bytes.len() - 1);
            buf.put_u8(0xb7 + (be_bytes.len() - start) as u8);
            buf.put_slice(&be_bytes[start..]);
        }
        buf.put_slice(self);
    }
}

impl<const N: usize> RLPEncode for [u8; N] {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_slice().encode(buf);
    }
}

impl RLPEncode for str {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_bytes().encode(buf);
    }
}

impl RLPEncode for String {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_bytes().encode(buf);
    }
}

impl RLPEncode for Bytes {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_ref().encode(buf);
    }
}

impl<T: RLPEncode> RLPEncode for Vec<T> {
    fn encode(&self, buf: &mut dyn BufMut) {
        let payload_len: usize = self.iter().map(|item| item.length()).sum();
        encode_length(payload_len, buf);
        for item in self {
            item.encode(buf);
        }
    }
}

impl<T: RLPEncode> RLPEncode for &T {
    fn encode(&self, buf: &mut dyn BufMut) {
        (*self).encode(buf);
    }

    fn length(&self) -> usize {
        (*self).length()
    }
}

// encoding for Ethereum types

impl RLPEncode for H256 {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_bytes().encode(buf);
    }
}

impl RLPEncode for Address {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_bytes().encode(buf);
    }
}

impl RLPEncode for U256 {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_integer_be(&self.to_big_endian(), buf);
    }
}
