//! Transport primitives for the native protocol.
//!
//! Everything that crosses the wire is built from a handful of encodings: single bytes and
//! booleans, little-endian fixed-width integers and floats, LEB128 variable-length integers
//! (used for every length, count and message tag), and length-prefixed strings.
//!
//! [`WireRead`] and [`WireWrite`] provide these encodings over in-memory buffers, and
//! [`Transport`] provides them over a blocking duplex stream, optionally wrapping spans of
//! the stream in compressed frames.

pub use compression::*;
pub use memory::*;
pub use read::*;
pub use transport::*;
pub use write::*;

mod compression;
mod memory;
mod read;
mod transport;
mod write;

/// The maximum number of bytes a LEB128-encoded `u64` can occupy.
pub const MAX_VARINT_LEN: usize = 10;
