//! Byte-buffer access used by the codec.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("buffer has insufficient data: expected {expected} bytes, {given} remain")]
    BufferLength { expected: usize, given: usize },
    #[error("unknown tag {tag:#04x} for {kind}")]
    InvalidTag { tag: u8, kind: &'static str },
    #[error("varint is too large for usize")]
    VarintOverflow,
    #[error("frame of {0} bytes exceeds the maximum message size")]
    OversizeFrame(u32),
}

/// Sink for encoded bytes.
pub trait BufWriter {
    fn put_slice(&mut self, slice: &[u8]);

    #[inline]
    fn put_u8(&mut self, val: u8) {
        self.put_slice(&[val]);
    }

    #[inline]
    fn put_u16(&mut self, val: u16) {
        self.put_slice(&val.to_le_bytes());
    }

    #[inline]
    fn put_u32(&mut self, val: u32) {
        self.put_slice(&val.to_le_bytes());
    }

    #[inline]
    fn put_u64(&mut self, val: u64) {
        self.put_slice(&val.to_le_bytes());
    }

    #[inline]
    fn put_f64(&mut self, val: f64) {
        self.put_slice(&val.to_le_bytes());
    }
}

impl BufWriter for Vec<u8> {
    #[inline]
    fn put_slice(&mut self, slice: &[u8]) {
        self.extend_from_slice(slice);
    }
}

/// Source of encoded bytes. Implemented for `&[u8]`, advancing the slice
/// as data is consumed.
pub trait BufReader<'de> {
    fn get_slice(&mut self, size: usize) -> Result<&'de [u8], DecodeError>;

    fn remaining(&self) -> usize;

    #[inline]
    fn get_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let slice = self.get_slice(N)?;
        let mut arr = [0u8; N];
        arr.copy_from_slice(slice);
        Ok(arr)
    }

    #[inline]
    fn get_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.get_array::<1>()?[0])
    }

    #[inline]
    fn get_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.get_array()?))
    }

    #[inline]
    fn get_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.get_array()?))
    }

    #[inline]
    fn get_u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.get_array()?))
    }

    #[inline]
    fn get_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.get_array()?))
    }
}

impl<'de> BufReader<'de> for &'de [u8] {
    fn get_slice(&mut self, size: usize) -> Result<&'de [u8], DecodeError> {
        if self.len() < size {
            return Err(DecodeError::BufferLength {
                expected: size,
                given: self.len(),
            });
        }
        let (taken, rest) = self.split_at(size);
        *self = rest;
        Ok(taken)
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_reader_advances() {
        let data = [1u8, 2, 3, 4, 5];
        let mut reader = &data[..];
        assert_eq!(reader.get_u8().unwrap(), 1);
        assert_eq!(reader.get_slice(2).unwrap(), &[2, 3]);
        assert_eq!(reader.remaining(), 2);
        assert!(reader.get_slice(3).is_err());
    }

    #[test]
    fn primitives_roundtrip() {
        let mut buf = Vec::new();
        buf.put_u32(0xdead_beef);
        buf.put_f64(-1.5);
        let mut reader = buf.as_slice();
        assert_eq!(reader.get_u32().unwrap(), 0xdead_beef);
        assert_eq!(reader.get_f64().unwrap(), -1.5);
        assert_eq!(reader.remaining(), 0);
    }
}
