//! Compressed frames.
//!
//! A compressed span of the stream is a sequence of self-contained frames:
//!
//! ```text
//! +-----------+--------+-----------------+-------------------+---------+
//! | checksum  | method | compressed size | decompressed size | payload |
//! +-----------+--------+-----------------+-------------------+---------+
//!   16 bytes    1 byte    u32 LE             u32 LE
//! ```
//!
//! The checksum is CityHash128 (v1.0.2) over everything after it. The compressed size counts
//! the 9 header bytes plus the payload.

use std::fmt::{Display, Formatter};

use colwire_error::{ColwireResult, colwire_bail, colwire_err};

/// Bytes occupied by the frame checksum.
pub const CHECKSUM_SIZE: usize = 16;
/// Bytes occupied by the method and the two sizes.
pub const FRAME_HEADER_SIZE: usize = 9;
/// The largest amount of uncompressed data placed in a single frame.
pub const MAX_FRAME_SIZE: usize = 1 << 20;
/// Frames declaring a larger compressed or decompressed size are rejected.
pub const MAX_ACCEPTED_FRAME_SIZE: usize = 1 << 30;
/// An LZ4 block never expands by more than this factor.
const LZ4_MAX_RATIO: usize = 255;

/// How the payload of a frame is encoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    /// The payload is stored as-is.
    None,
    /// The payload is an LZ4 block.
    #[default]
    Lz4,
}

impl CompressionMethod {
    /// The method byte written into the frame header.
    pub fn byte(&self) -> u8 {
        match self {
            Self::None => 0x02,
            Self::Lz4 => 0x82,
        }
    }

    /// Resolve a method byte read from a frame header.
    pub fn from_byte(byte: u8) -> ColwireResult<Self> {
        match byte {
            0x02 => Ok(Self::None),
            0x82 => Ok(Self::Lz4),
            other => Err(colwire_err!(Compression: "unknown compression method 0x{:02x}", other)),
        }
    }
}

impl Display for CompressionMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Lz4 => write!(f, "lz4"),
        }
    }
}

fn checksum(data: &[u8]) -> u128 {
    let hash = cityhash_rs::cityhash_102_128(data);
    hash.rotate_left(64)
}

/// Encode `data` into a single frame.
pub fn encode_frame(method: CompressionMethod, data: &[u8]) -> ColwireResult<Vec<u8>> {
    let payload = match method {
        CompressionMethod::None => data.to_vec(),
        CompressionMethod::Lz4 => lz4_flex::block::compress(data),
    };
    let compressed_size = u32::try_from(FRAME_HEADER_SIZE + payload.len())
        .map_err(|_| colwire_err!(Compression: "frame of {} bytes is too large", payload.len()))?;
    let decompressed_size = u32::try_from(data.len())
        .map_err(|_| colwire_err!(Compression: "frame of {} bytes is too large", data.len()))?;

    let mut frame = Vec::with_capacity(CHECKSUM_SIZE + FRAME_HEADER_SIZE + payload.len());
    frame.extend_from_slice(&[0u8; CHECKSUM_SIZE]);
    frame.push(method.byte());
    frame.extend_from_slice(&compressed_size.to_le_bytes());
    frame.extend_from_slice(&decompressed_size.to_le_bytes());
    frame.extend_from_slice(&payload);

    let sum = checksum(&frame[CHECKSUM_SIZE..]);
    frame[..CHECKSUM_SIZE].copy_from_slice(&sum.to_le_bytes());
    Ok(frame)
}

/// The total length of a frame, given its first `CHECKSUM_SIZE + FRAME_HEADER_SIZE` bytes.
pub fn frame_len(head: &[u8; CHECKSUM_SIZE + FRAME_HEADER_SIZE]) -> ColwireResult<usize> {
    let mut size = [0u8; 4];
    size.copy_from_slice(&head[CHECKSUM_SIZE + 1..CHECKSUM_SIZE + 5]);
    let compressed_size = u32::from_le_bytes(size) as usize;
    if compressed_size < FRAME_HEADER_SIZE {
        colwire_bail!(Compression: "compressed size {} is smaller than the frame header", compressed_size);
    }
    if compressed_size > MAX_ACCEPTED_FRAME_SIZE {
        colwire_bail!(
            Compression: "compressed size {} exceeds the limit of {} bytes",
            compressed_size,
            MAX_ACCEPTED_FRAME_SIZE
        );
    }
    Ok(CHECKSUM_SIZE + compressed_size)
}

/// Verify and decode a complete frame, returning the decompressed bytes.
pub fn decode_frame(frame: &[u8]) -> ColwireResult<Vec<u8>> {
    if frame.len() < CHECKSUM_SIZE + FRAME_HEADER_SIZE {
        colwire_bail!(Compression: "frame of {} bytes is truncated", frame.len());
    }
    let mut expected = [0u8; CHECKSUM_SIZE];
    expected.copy_from_slice(&frame[..CHECKSUM_SIZE]);
    let expected = u128::from_le_bytes(expected);
    let body = &frame[CHECKSUM_SIZE..];
    if checksum(body) != expected {
        colwire_bail!(Compression: "checksum mismatch in compressed frame");
    }

    let method = CompressionMethod::from_byte(body[0])?;
    let mut size = [0u8; 4];
    size.copy_from_slice(&body[5..9]);
    let decompressed_size = u32::from_le_bytes(size) as usize;
    let payload = &body[FRAME_HEADER_SIZE..];
    if decompressed_size > MAX_ACCEPTED_FRAME_SIZE {
        colwire_bail!(
            Compression: "decompressed size {} exceeds the limit of {} bytes",
            decompressed_size,
            MAX_ACCEPTED_FRAME_SIZE
        );
    }
    if method == CompressionMethod::Lz4
        && decompressed_size > payload.len().saturating_mul(LZ4_MAX_RATIO)
    {
        colwire_bail!(
            Compression: "{} LZ4 bytes cannot decompress to the declared {} bytes",
            payload.len(),
            decompressed_size
        );
    }

    let data = match method {
        CompressionMethod::None => payload.to_vec(),
        CompressionMethod::Lz4 => lz4_flex::block::decompress(payload, decompressed_size)
            .map_err(|e| colwire_err!(Compression: "invalid LZ4 block: {}", e))?,
    };
    if data.len() != decompressed_size {
        colwire_bail!(
            Compression: "frame decompressed to {} bytes, header declared {}",
            data.len(),
            decompressed_size
        );
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use colwire_error::ErrorCode;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(CompressionMethod::None)]
    #[case(CompressionMethod::Lz4)]
    fn frames_decode(#[case] method: CompressionMethod) {
        let data = b"abcabcabcabcabcabcabcabc, some more text".repeat(16);
        let frame = encode_frame(method, &data).unwrap();

        let mut head = [0u8; CHECKSUM_SIZE + FRAME_HEADER_SIZE];
        head.copy_from_slice(&frame[..CHECKSUM_SIZE + FRAME_HEADER_SIZE]);
        assert_eq!(frame_len(&head).unwrap(), frame.len());
        assert_eq!(frame[CHECKSUM_SIZE], method.byte());
        assert_eq!(decode_frame(&frame).unwrap(), data);
    }

    #[test]
    fn corrupt_frame_is_rejected() {
        let mut frame = encode_frame(CompressionMethod::Lz4, b"payload payload payload").unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xff;
        assert_eq!(decode_frame(&frame).unwrap_err().code(), ErrorCode::Compression);
    }

    #[test]
    fn oversized_compressed_size_is_rejected() {
        let mut head = [0u8; CHECKSUM_SIZE + FRAME_HEADER_SIZE];
        head[CHECKSUM_SIZE] = CompressionMethod::Lz4.byte();
        head[CHECKSUM_SIZE + 1..CHECKSUM_SIZE + 5].copy_from_slice(&u32::MAX.to_le_bytes());
        assert_eq!(frame_len(&head).unwrap_err().code(), ErrorCode::Compression);
    }

    #[rstest]
    #[case::over_the_limit(u32::MAX)]
    #[case::over_the_lz4_ratio(1 << 20)]
    fn oversized_decompressed_size_is_rejected(#[case] declared: u32) {
        let mut frame = encode_frame(CompressionMethod::Lz4, b"abc").unwrap();
        frame[CHECKSUM_SIZE + 5..CHECKSUM_SIZE + 9].copy_from_slice(&declared.to_le_bytes());
        let sum = checksum(&frame[CHECKSUM_SIZE..]);
        frame[..CHECKSUM_SIZE].copy_from_slice(&sum.to_le_bytes());
        assert_eq!(decode_frame(&frame).unwrap_err().code(), ErrorCode::Compression);
    }

    #[test]
    fn unknown_method() {
        assert!(CompressionMethod::from_byte(0x90).is_err());
    }
}
