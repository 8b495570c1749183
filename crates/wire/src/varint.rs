//! Varint encoding and decoding functions.
//!
//! We use Protobuf's [Base-128 varint] encoding.
//!
//! Unsigned integers are split into 7-bit chunks, with the least significant
//! chunk first. Each chunk is placed in the low 7 bits of a byte.
//! Non-terminal bytes have the high bit set; the final byte has it zeroed.
//!
//! Sequence lengths on this channel are expected to fit into one or two
//! bytes most of the time, so the implementation is not optimized for
//! larger integers.
//!
//! [Base-128 varint]: https://protobuf.dev/programming-guides/encoding/#varints

use crate::buf::{BufReader, BufWriter, DecodeError};

#[inline]
pub fn encode_varint(mut value: usize, out: &mut impl BufWriter) {
    loop {
        if value < 0x80 {
            out.put_u8(value as u8);
            break;
        } else {
            out.put_u8(((value & 0x7f) | 0x80) as u8);
            value >>= 7;
        }
    }
}

#[inline]
pub fn decode_varint<'a>(reader: &mut impl BufReader<'a>) -> Result<usize, DecodeError> {
    let mut result: usize = 0;
    let mut shift = 0;
    loop {
        let byte = reader.get_u8()?;
        if shift >= usize::BITS {
            return Err(DecodeError::VarintOverflow);
        }
        if (byte & 0x80) == 0 {
            result |= (byte as usize) << shift;
            return Ok(result);
        } else {
            result |= ((byte & 0x7f) as usize) << shift;
        }
        shift += 7;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn varint_roundtrip(val in any::<usize>()) {
            let mut buf = Vec::new();
            encode_varint(val, &mut buf);
            prop_assert_eq!(val, decode_varint(&mut buf.as_slice()).unwrap());
        }
    }

    #[test]
    fn one_byte_for_small_values() {
        let mut buf = Vec::new();
        encode_varint(0x7f, &mut buf);
        assert_eq!(buf.len(), 1);
    }
}
