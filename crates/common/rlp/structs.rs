use bytes::BufMut;

use super::{
    decode::{RLPDecode, decode_rlp_item},
    encode::{RLPEncode, encode_length},
    error::RLPDecodeError,
};

/// # Struct encoding helper
///
/// Encodes a struct as an RLP list, with the fields as its items in the
/// order they are passed to [`Encoder::encode_field`]. Fields are buffered
/// until [`finish`](Encoder::finish) writes the list prefix and payload.
#[must_use = "`Encoder` must be consumed with `finish` to perform the encoding"]
pub struct Encoder<'a> {
    buf: &'a mut dyn BufMut,
    temp_buf: Vec<u8>,
}

// NOTE: BufMut doesn't implement Debug, so we can't derive Debug for Encoder.
impl core::fmt::Debug for Encoder<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Encoder")
            .field("buf", &"...")
            .field("temp_buf", &self.temp_buf)
            .finish()
    }
}

impl<'a> Encoder<'a> {
    /// Creates a new encoder that writes to the given buffer.
    pub fn new(buf: &'a mut dyn BufMut) -> Self {
        Self {
            buf,
            temp_buf: Default::default(),
        }
    }

    /// Stores a field to be encoded.
    pub fn encode_field<T: RLPEncode>(mut self, value: &T) -> Self {
        <T as RLPEncode>::encode(value, &mut self.temp_buf);
        self
    }

    /// Stores a field to be encoded as a byte string.
    /// Used to bypass the conflicting implementations between Vec<T> and Vec<u8>.
    pub fn encode_bytes(mut self, value: &[u8]) -> Self {
        <[u8] as RLPEncode>::encode(value, &mut self.temp_buf);
        self
    }

    /// Finishes encoding the struct and writes the result to the buffer.
    pub fn finish(self) {
        encode_length(self.temp_buf.len(), self.buf);
        self.buf.put_slice(&self.temp_buf);
    }
}

/// # Struct decoding helper
///
/// Decodes a struct from an RLP list, with the fields expected in the
/// order they are passed to [`Decoder::decode_field`].
#[derive(Debug)]
#[must_use = "`Decoder` must be consumed with `finish` to perform decoding checks"]
pub struct Decoder<'a> {
    payload: &'a [u8],
    remaining: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self, RLPDecodeError> {
        match decode_rlp_item(buf)? {
            (true, payload, remaining) => Ok(Self { payload, remaining }),
            (false, _, _) => Err(RLPDecodeError::UnexpectedString),
        }
    }

    pub fn decode_field<T: RLPDecode>(self, name: &str) -> Result<(T, Self), RLPDecodeError> {
        let (field, rest) = <T as RLPDecode>::decode_unfinished(self.payload)
            .map_err(|err| field_decode_error::<T>(name, err))?;
        let updated_self = Self {
            payload: rest,
            ..self
        };
        Ok((field, updated_self))
    }

    /// Finishes decoding the struct and returns the remaining bytes after the item.
    /// If the item's payload is not empty, returns an error.
    pub const fn finish(self) -> Result<&'a [u8], RLPDecodeError> {
        if self.payload.is_empty() {
            Ok(self.remaining)
        } else {
            Err(RLPDecodeError::MalformedData)
        }
    }

    /// Returns true if all of the item's payload has been consumed.
    pub const fn is_done(&self) -> bool {
        self.payload.is_empty()
    }
}

fn field_decode_error<T>(field_name: &str, err: RLPDecodeError) -> RLPDecodeError {
    let typ = std::any::type_name::<T>();
    let err_msg = format!("Error decoding field '{field_name}' of type {typ}: {err}");
    RLPDecodeError::Custom(err_msg)
}

#[cfg(test)]
mod tests {
    use super::{Decoder, Encoder};
    use crate::error::RLPDecodeError;

    #[derive(Debug, PartialEq, Eq)]
    struct Simple {
        pub a: u8,
        pub b: u16,
    }

    #[test]
    fn encode_simple_struct() {
        let input = Simple { a: 61, b: 75 };
        let mut buf = Vec::new();

        Encoder::new(&mut buf)
            .encode_field(&input.a)
            .encode_field(&input.b)
            .finish();

        assert_eq!(buf, vec![0xc2, 61, 75]);
    }

    #[test]
    fn decode_simple_struct() {
        let buf = [0xc2, 61, 75];
        let decoder = Decoder::new(&buf).unwrap();
        let (a, decoder) = decoder.decode_field::<u8>("a").unwrap();
        let (b, decoder) = decoder.decode_field::<u16>("b").unwrap();
        assert!(decoder.is_done());
        let rest = decoder.finish().unwrap();

        assert!(rest.is_empty());
        assert_eq!(Simple { a, b }, Simple { a: 61, b: 75 });
    }

    #[test]
    fn decode_fails_on_leftover_fields() {
        let buf = [0xc3, 61, 75, 1];
        let decoder = Decoder::new(&buf).unwrap();
        let (_, decoder) = decoder.decode_field::<u8>("a").unwrap();
        let (_, decoder) = decoder.decode_field::<u16>("b").unwrap();
        assert_eq!(decoder.finish(), Err(RLPDecodeError::MalformedData));
    }

    #[test]
    fn decode_rejects_strings() {
        let buf = [0x83, b'a', b'b', b'c'];
        assert!(matches!(
            Decoder::new(&buf),
            Err(RLPDecodeError::UnexpectedString)
        ));
    }
}
