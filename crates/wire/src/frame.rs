//! Length-prefixed framing over arbitrary byte streams.
//!
//! Each frame is a little-endian `u32` length followed by that many bytes
//! of encoded payload. A clean EOF *before* the length prefix yields
//! `Ok(None)`, so a closed channel is distinguishable from a truncated
//! frame (which is an error).

use std::io::{self, Read, Write};

use crate::buf::DecodeError;

/// Upper bound on a single frame. The largest payloads on this channel
/// are filtered spectrum tables of a few thousand samples, far below
/// this; anything bigger indicates a corrupt or hostile peer.
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// Write one frame. Flushes the stream so a blocking peer makes progress.
pub fn write_frame<W: Write>(mut out: W, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
    out.write_all(&len.to_le_bytes())?;
    out.write_all(payload)?;
    out.flush()
}

/// Read one frame, or `None` on clean EOF.
pub fn read_frame<R: Read>(mut input: R) -> io::Result<Option<Vec<u8>>> {
    let mut len_bytes = [0u8; 4];
    match input.read_exact(&mut len_bytes) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_le_bytes(len_bytes);
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            DecodeError::OversizeFrame(len),
        ));
    }
    let mut payload = vec![0u8; len as usize];
    input.read_exact(&mut payload)?;
    Ok(Some(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_roundtrip() {
        let mut stream = Vec::new();
        write_frame(&mut stream, b"hello").unwrap();
        write_frame(&mut stream, b"").unwrap();

        let mut cursor = stream.as_slice();
        assert_eq!(read_frame(&mut cursor).unwrap().unwrap(), b"hello");
        assert_eq!(read_frame(&mut cursor).unwrap().unwrap(), b"");
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let mut stream = Vec::new();
        write_frame(&mut stream, b"hello").unwrap();
        stream.truncate(stream.len() - 2);

        let mut cursor = stream.as_slice();
        assert!(read_frame(&mut cursor).is_err());
    }

    #[test]
    fn oversize_frame_is_rejected() {
        let stream = (MAX_FRAME_LEN + 1).to_le_bytes();
        assert!(read_frame(&mut stream.as_slice()).is_err());
    }
}
