//! Wire format for the master/worker control channel.
//!
//! The channel carries integer-tagged variant messages whose payloads are
//! serialised by a small self-describing format: little-endian primitives,
//! Base-128 varint sequence lengths, and one-byte tags for options and
//! message variants. The format supports exactly what the pipeline ships
//! over the wire — reals, integer tokens, tagged options and homogeneous
//! sequences — and nothing else.
//!
//! Framing is a `u32` little-endian length prefix per message, so a
//! receiver can pull whole frames off a byte stream before decoding.

pub mod buf;
pub mod frame;
pub mod ser;
mod varint;

pub use buf::{BufReader, BufWriter, DecodeError};
pub use frame::{read_frame, write_frame};
pub use ser::{Decode, Encode};
pub use varint::{decode_varint, encode_varint};
