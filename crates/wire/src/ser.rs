//! The `Encode`/`Decode` traits and their impls for everything that may
//! appear inside a message payload: reals, unsigned integers, booleans,
//! dimensionful quantities, tokens, tagged options and homogeneous
//! sequences.

use crate::buf::{BufReader, BufWriter, DecodeError};
use crate::varint::{decode_varint, encode_varint};
use oneloop_units::{
    Energy, FilterParamsToken, GrowthParamsToken, InverseEnergy, InverseEnergy2, InverseEnergy3,
    IrResumToken, IrToken, KToken, LinearPkToken, LoopParamsToken, ModelToken, UvToken,
    XyParamsToken, ZToken,
};

pub trait Encode {
    fn encode(&self, out: &mut impl BufWriter);

    /// Convenience wrapper serialising into a fresh buffer.
    fn encoded(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

pub trait Decode: Sized {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError>;

    /// Decode from a complete buffer, requiring every byte to be consumed.
    fn from_slice(mut bytes: &[u8]) -> Result<Self, DecodeError> {
        let value = Self::decode(&mut bytes)?;
        if !bytes.is_empty() {
            return Err(DecodeError::BufferLength {
                expected: 0,
                given: bytes.len(),
            });
        }
        Ok(value)
    }
}

macro_rules! impl_prim {
    ($ty:ty, $put:ident, $get:ident) => {
        impl Encode for $ty {
            #[inline]
            fn encode(&self, out: &mut impl BufWriter) {
                out.$put(*self);
            }
        }
        impl Decode for $ty {
            #[inline]
            fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
                reader.$get()
            }
        }
    };
}

impl_prim!(u8, put_u8, get_u8);
impl_prim!(u16, put_u16, get_u16);
impl_prim!(u32, put_u32, get_u32);
impl_prim!(u64, put_u64, get_u64);
impl_prim!(f64, put_f64, get_f64);

impl Encode for bool {
    #[inline]
    fn encode(&self, out: &mut impl BufWriter) {
        out.put_u8(*self as u8);
    }
}

impl Decode for bool {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        match reader.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(DecodeError::InvalidTag { tag, kind: "bool" }),
        }
    }
}

macro_rules! impl_quantity {
    ($ty:ty) => {
        impl Encode for $ty {
            #[inline]
            fn encode(&self, out: &mut impl BufWriter) {
                out.put_f64(self.raw());
            }
        }
        impl Decode for $ty {
            #[inline]
            fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
                Ok(<$ty>::new(reader.get_f64()?))
            }
        }
    };
}

impl_quantity!(Energy);
impl_quantity!(InverseEnergy);
impl_quantity!(InverseEnergy2);
impl_quantity!(InverseEnergy3);

macro_rules! impl_token {
    ($ty:ty) => {
        impl Encode for $ty {
            #[inline]
            fn encode(&self, out: &mut impl BufWriter) {
                out.put_u32(self.id());
            }
        }
        impl Decode for $ty {
            #[inline]
            fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
                Ok(<$ty>::new(reader.get_u32()?))
            }
        }
    };
}

impl_token!(ModelToken);
impl_token!(ZToken);
impl_token!(KToken);
impl_token!(UvToken);
impl_token!(IrToken);
impl_token!(IrResumToken);
impl_token!(LinearPkToken);
impl_token!(FilterParamsToken);
impl_token!(GrowthParamsToken);
impl_token!(LoopParamsToken);
impl_token!(XyParamsToken);

// Tagged option: one byte for presence, then the value.
impl<T: Encode> Encode for Option<T> {
    fn encode(&self, out: &mut impl BufWriter) {
        match self {
            None => out.put_u8(0),
            Some(value) => {
                out.put_u8(1);
                value.encode(out);
            }
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        match reader.get_u8()? {
            0 => Ok(None),
            1 => Ok(Some(T::decode(reader)?)),
            tag => Err(DecodeError::InvalidTag {
                tag,
                kind: "option",
            }),
        }
    }
}

// Homogeneous sequence: varint length followed by the elements.
impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, out: &mut impl BufWriter) {
        encode_varint(self.len(), out);
        for item in self {
            item.encode(out);
        }
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        let len = decode_varint(reader)?;
        // Sanity bound: no element is smaller than one byte, so a length
        // exceeding the remaining buffer is corrupt.
        if len > reader.remaining() {
            return Err(DecodeError::BufferLength {
                expected: len,
                given: reader.remaining(),
            });
        }
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(T::decode(reader)?);
        }
        Ok(items)
    }
}

impl<A: Encode, B: Encode> Encode for (A, B) {
    fn encode(&self, out: &mut impl BufWriter) {
        self.0.encode(out);
        self.1.encode(out);
    }
}

impl<A: Decode, B: Decode> Decode for (A, B) {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        Ok((A::decode(reader)?, B::decode(reader)?))
    }
}

impl Encode for String {
    fn encode(&self, out: &mut impl BufWriter) {
        encode_varint(self.len(), out);
        out.put_slice(self.as_bytes());
    }
}

impl Decode for String {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        let len = decode_varint(reader)?;
        let bytes = reader.get_slice(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidTag {
            tag: 0,
            kind: "utf-8 string",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roundtrip<T: Encode + Decode + PartialEq + std::fmt::Debug>(value: T) {
        let bytes = value.encoded();
        assert_eq!(T::from_slice(&bytes).unwrap(), value);
    }

    #[test]
    fn options_are_tagged() {
        roundtrip(Option::<f64>::None);
        roundtrip(Some(2.25f64));
        assert_eq!(Option::<f64>::None.encoded(), vec![0]);
    }

    #[test]
    fn tokens_roundtrip() {
        roundtrip(KToken::new(41));
        roundtrip(Some(LinearPkToken::new(7)));
        roundtrip(Option::<LinearPkToken>::None);
    }

    #[test]
    fn bad_option_tag_is_an_error() {
        let err = Option::<u32>::from_slice(&[2, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidTag { tag: 2, .. }));
    }

    #[test]
    fn trailing_bytes_are_an_error() {
        assert!(u8::from_slice(&[1, 2]).is_err());
    }

    proptest! {
        #[test]
        fn sequences_roundtrip(values in proptest::collection::vec(any::<f64>(), 0..64)) {
            let bytes = values.encoded();
            let decoded = Vec::<f64>::from_slice(&bytes).unwrap();
            prop_assert_eq!(decoded.len(), values.len());
            for (a, b) in decoded.iter().zip(&values) {
                prop_assert!(a.to_bits() == b.to_bits());
            }
        }

        #[test]
        fn pairs_roundtrip(a in any::<u32>(), b in any::<u64>()) {
            let bytes = (a, b).encoded();
            prop_assert_eq!(<(u32, u64)>::from_slice(&bytes).unwrap(), (a, b));
        }
    }
}
