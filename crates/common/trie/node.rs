use ethereum_types::H256;
use ledger_rlp::{
    decode::{RLPDecode, decode_bytes, decode_rlp_item},
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::Encoder,
};

/// A radix-16 trie node.
///
/// Every node carries sixteen optional child references, one per nibble, and
/// an optional value for the path ending at the node. Paths are never
/// compressed, so the encoding needs no path fragment: a node is fully
/// described by its children and value. Children are referenced by the
/// Keccak-256 digest of their encoding.
///
/// Serialized as a 17 item RLP list: sixteen child slots followed by the
/// value slot, each a byte string where the empty string means "absent".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    pub choices: [Option<H256>; 16],
    pub value: Option<Vec<u8>>,
}

impl Node {
    pub fn child(&self, nibble: u8) -> Option<H256> {
        self.choices.get(nibble as usize).copied().flatten()
    }

    /// A node with no children and no value has no reason to exist.
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.choices.iter().all(Option::is_none)
    }
}

impl RLPEncode for Node {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        let mut encoder = Encoder::new(buf);
        for choice in &self.choices {
            encoder = match choice {
                Some(child) => encoder.encode_bytes(child.as_bytes()),
                None => encoder.encode_bytes(&[]),
            };
        }
        match &self.value {
            Some(value) => encoder.encode_bytes(value),
            None => encoder.encode_bytes(&[]),
        }
        .finish();
    }
}

impl RLPDecode for Node {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, mut payload, rest) = decode_rlp_item(rlp)?;
        if !is_list {
            return Err(RLPDecodeError::UnexpectedString);
        }
        let mut items = Vec::with_capacity(17);
        while !payload.is_empty() {
            let (item, remaining) = decode_bytes(payload)?;
            items.push(item);
            payload = remaining;
        }
        let [choices @ .., value] = items.as_slice() else {
            return Err(RLPDecodeError::MalformedData);
        };
        if choices.len() != 16 {
            return Err(RLPDecodeError::MalformedData);
        }
        let mut node = Node::default();
        for (slot, item) in node.choices.iter_mut().zip(choices) {
            *slot = match item.len() {
                0 => None,
                32 => Some(H256::from_slice(item)),
                _ => return Err(RLPDecodeError::MalformedData),
            };
        }
        node.value = (!value.is_empty()).then(|| value.to_vec());
        Ok((node, rest))
    }
}

/// Expands a byte path into one nibble per element, high nibble first.
pub fn bytes_to_nibbles(bytes: &[u8]) -> Vec<u8> {
    let mut nibbles = Vec::with_capacity(bytes.len() * 2);
    for byte in bytes {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0f);
    }
    nibbles
}

/// Packs an even-length nibble path back into bytes.
pub fn nibbles_to_bytes(nibbles: &[u8]) -> Vec<u8> {
    nibbles
        .chunks_exact(2)
        .map(|pair| (pair[0] << 4) | pair[1])
        .collect()
}
