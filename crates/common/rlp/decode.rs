use bytes::Bytes;
use ethereum_types::{Address, H256, U256};

use super::{
    constants::{RLP_EMPTY_LIST, RLP_NULL},
    error::RLPDecodeError,
};

/// Trait for decoding a value from an RLP encoded slice.
/// Implementors only need to provide [`decode_unfinished`](RLPDecode::decode_unfinished),
/// which returns the decoded value along with the bytes remaining after it.
pub trait RLPDecode: Sized {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError>;

    fn decode(rlp: &[u8]) -> Result<Self, RLPDecodeError> {
        let (decoded, remaining) = Self::decode_unfinished(rlp)?;
        if !remaining.is_empty() {
            return Err(RLPDecodeError::InvalidLength);
        }
        Ok(decoded)
    }
}

/// Splits off the first RLP item of the given slice.
/// Returns whether the item is a list, its payload (without the prefix) and
/// the remaining bytes after the item.
pub fn decode_rlp_item(data: &[u8]) -> Result<(bool, &[u8], &[u8]), RLPDecodeError> {
    let first_byte = *data.first().ok_or(RLPDecodeError::InvalidLength)?;
    match first_byte {
        // single byte, its own encoding
        0x00..=0x7f => Ok((false, &data[..1], &data[1..])),
        // short string
        0x80..=0xb7 => {
            let length = (first_byte - 0x80) as usize;
            split_payload(data, 1, length, false)
        }
        // long string
        0xb8..=0xbf => {
            let length_size = (first_byte - 0xb7) as usize;
            let length = decode_payload_length(data, length_size)?;
            split_payload(data, 1 + length_size, length, false)
        }
        // short list
        RLP_EMPTY_LIST..=0xf7 => {
            let length = (first_byte - RLP_EMPTY_LIST) as usize;
            split_payload(data, 1, length, true)
        }
        // long list
        0xf8..=0xff => {
            let length_size = (first_byte - 0xf7) as usize;
            let length = decode_payload_length(data, length_size)?;
            split_payload(data, 1 + length_size, length, true)
        }
    }
}

fn decode_payload_length(data: &[u8], length_size: usize) -> Result<usize, RLPDecodeError> {
    let length_bytes = data
        .get(1..1 + length_size)
        .ok_or(RLPDecodeError::InvalidLength)?;
    Ok(usize::from_be_bytes(static_left_pad(length_bytes)?))
}

fn split_payload(
    data: &[u8],
    offset: usize,
    length: usize,
    is_list: bool,
) -> Result<(bool, &[u8], &[u8]), RLPDecodeError> {
    let end = offset.checked_add(length).ok_or(RLPDecodeError::InvalidLength)?;
    let payload = data.get(offset..end).ok_or(RLPDecodeError::InvalidLength)?;
    Ok((is_list, payload, &data[end..]))
}

/// Decodes the payload of an RLP string item, rejecting lists.
pub fn decode_bytes(data: &[u8]) -> Result<(&[u8], &[u8]), RLPDecodeError> {
    let (is_list, payload, rest) = decode_rlp_item(data)?;
    if is_list {
        return Err(RLPDecodeError::UnexpectedList);
    }
    Ok((payload, rest))
}

/// Pads a byte slice with zeros on the left up to a fixed width.
/// Leading zero bytes in the input are a canonicality error.
pub fn static_left_pad<const N: usize>(data: &[u8]) -> Result<[u8; N], RLPDecodeError> {
    let mut padded = [0; N];
    if data.is_empty() {
        return Ok(padded);
    }
    if data[0] == 0 {
        return Err(RLPDecodeError::MalformedData);
    }
    if data.len() > N {
        return Err(RLPDecodeError::InvalidLength);
    }
    padded[N - data.len()..].copy_from_slice(data);
    Ok(padded)
}

impl RLPDecode for bool {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let first_byte = *rlp.first().ok_or(RLPDecodeError::InvalidLength)?;
        let value = match first_byte {
            RLP_NULL => false,
            0x01 => true,
            _ => return Err(RLPDecodeError::MalformedData),
        };
        Ok((value, &rlp[1..]))
    }
}

impl RLPDecode for u8 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        let padded = static_left_pad::<1>(bytes)?;
        Ok((padded[0], rest))
    }
}

impl RLPDecode for u16 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        Ok((u16::from_be_bytes(static_left_pad(bytes)?), rest))
    }
}

impl RLPDecode for u32 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        Ok((u32::from_be_bytes(static_left_pad(bytes)?), rest))
    }
}

impl RLPDecode for u64 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        Ok((u64::from_be_bytes(static_left_pad(bytes)?), rest))
    }
}

impl RLPDecode for usize {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        Ok((usize::from_be_bytes(static_left_pad(bytes)?), rest))
    }
}

impl<const N: usize> RLPDecode for [u8; N] {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        let value = bytes.try_into().map_err(|_| RLPDecodeError::InvalidLength)?;
        Ok((value, rest))
    }
}

impl RLPDecode for String {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        let value = String::from_utf8(bytes.to_vec()).map_err(|_| RLPDecodeError::MalformedData)?;
        Ok((value, rest))
    }
}

impl RLPDecode for Bytes {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        Ok((Bytes::copy_from_slice(bytes), rest))
    }
}

impl<T: RLPDecode> RLPDecode for Vec<T> {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, payload, rest) = decode_rlp_item(rlp)?;
        if !is_list {
            return Err(RLPDecodeError::UnexpectedString);
        }
        let mut items = Vec::new();
        let mut remaining = payload;
        while !remaining.is_empty() {
            let (item, rest_of_list) = T::decode_unfinished(remaining)?;
            items.push(item);
            remaining = rest_of_list;
        }
        Ok((items, rest))
    }
}

// decoding for Ethereum types

impl RLPDecode for H256 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        if bytes.len() != 32 {
            return Err(RLPDecodeError::InvalidLength);
        }
        Ok((H256::from_slice(bytes), rest))
    }
}

impl RLPDecode for Address {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        if bytes.len() != 20 {
            return Err(RLPDecodeError::InvalidLength);
        }
        Ok((Address::from_slice(bytes), rest))
    }
}

impl RLPDecode for U256 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        let padded: [u8; 32] = static_left_pad(bytes)?;
        Ok((U256::from_big_endian(&padded), rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::RLPEncode;

    #[test]
    fn decode_integers() {
        assert_eq!(u64::decode(&[0x80]).unwrap(), 0);
        assert_eq!(u8::decode(&[0x07]).unwrap(), 7);
        assert_eq!(u16::decode(&[0x82, 0x04, 0x00]).unwrap(), 1024);
        assert_eq!(u64::decode(&[0x84, 0xff, 0xff, 0xff, 0xff]).unwrap(), 0xffffffff);
    }

    #[test]
    fn decode_rejects_leading_zeros() {
        // 1024 must encode as [0x82, 0x04, 0x00]; a zero-padded form is invalid
        assert_eq!(
            u64::decode(&[0x83, 0x00, 0x04, 0x00]),
            Err(RLPDecodeError::MalformedData)
        );
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        assert_eq!(u8::decode(&[0x07, 0x07]), Err(RLPDecodeError::InvalidLength));
    }

    #[test]
    fn decode_strings() {
        assert_eq!(
            String::decode(&[0x83, b'd', b'o', b'g']).unwrap(),
            "dog".to_string()
        );
        assert_eq!(String::decode(&[0x80]).unwrap(), "".to_string());
    }

    #[test]
    fn decode_lists() {
        let list: Vec<String> =
            Vec::decode(&[0xc8, 0x83, b'c', b'a', b't', 0x83, b'd', b'o', b'g']).unwrap();
        assert_eq!(list, vec!["cat".to_string(), "dog".to_string()]);
        let empty: Vec<String> = Vec::decode(&[0xc0]).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn roundtrip_ethereum_types() {
        let hash = H256::repeat_byte(0xab);
        assert_eq!(H256::decode(&hash.encode_to_vec()).unwrap(), hash);

        let address = Address::repeat_byte(0x11);
        assert_eq!(Address::decode(&address.encode_to_vec()).unwrap(), address);

        for value in [U256::zero(), U256::from(127), U256::from(1u64 << 35), U256::MAX] {
            assert_eq!(U256::decode(&value.encode_to_vec()).unwrap(), value);
        }
    }

    #[test]
    fn roundtrip_bytes() {
        let bytes = Bytes::from_static(b"some arbitrary payload with more than 55 bytes in it....");
        assert_eq!(Bytes::decode(&bytes.encode_to_vec()).unwrap(), bytes);
    }
}
