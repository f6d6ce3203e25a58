use std::io;

use bytes::Buf;
use colwire_error::{ColwireResult, colwire_bail, colwire_err};
use paste::paste;

use crate::MAX_VARINT_LEN;

/// Length-prefixed data is read in pieces of at most this size, so the buffer only grows as
/// bytes actually arrive.
const READ_CHUNK_SIZE: usize = 64 * 1024;

macro_rules! read_le {
    ($($T:ty),*) => {
        paste! {
            $(
                #[doc = "Read a little-endian `" $T "`."]
                fn [<read_ $T>](&mut self) -> ColwireResult<$T> {
                    let mut bytes = [0u8; std::mem::size_of::<$T>()];
                    self.read_exact_bytes(&mut bytes)?;
                    Ok(<$T>::from_le_bytes(bytes))
                }
            )*
        }
    };
}

/// The read half of the transport primitives.
///
/// Implementors only provide [`WireRead::read_exact_bytes`], every other encoding is layered on
/// top of it. A short read is always a fatal [`io::ErrorKind::UnexpectedEof`] error.
pub trait WireRead {
    /// Fill `buf` completely from the stream.
    fn read_exact_bytes(&mut self, buf: &mut [u8]) -> ColwireResult<()>;

    /// Read a single byte.
    fn read_u8(&mut self) -> ColwireResult<u8> {
        let mut byte = [0u8; 1];
        self.read_exact_bytes(&mut byte)?;
        Ok(byte[0])
    }

    /// Read a one-byte boolean, any non-zero byte is `true`.
    fn read_bool(&mut self) -> ColwireResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    read_le!(i8, u16, i16, u32, i32, u64, i64, u128, i128, f32, f64);

    /// Read an unsigned LEB128 variable-length integer.
    fn read_varint(&mut self) -> ColwireResult<u64> {
        let mut value = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.read_u8()?;
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        colwire_bail!(Protocol: "varint is longer than {} bytes", MAX_VARINT_LEN)
    }

    /// Read a varint that is used as a length or count.
    fn read_length(&mut self) -> ColwireResult<usize> {
        let length = self.read_varint()?;
        usize::try_from(length).map_err(|_| colwire_err!(Protocol: "length {} does not fit in memory", length))
    }

    /// Read exactly `len` raw bytes.
    fn read_bytes(&mut self, len: usize) -> ColwireResult<Vec<u8>> {
        let mut bytes = Vec::with_capacity(len.min(READ_CHUNK_SIZE));
        while bytes.len() < len {
            let start = bytes.len();
            bytes.resize(start + (len - start).min(READ_CHUNK_SIZE), 0);
            self.read_exact_bytes(&mut bytes[start..])?;
        }
        Ok(bytes)
    }

    /// Read a varint length followed by that many raw bytes.
    fn read_binary(&mut self) -> ColwireResult<Vec<u8>> {
        let len = self.read_length()?;
        self.read_bytes(len)
    }

    /// Read a varint length followed by that many bytes of UTF-8 text.
    fn read_string(&mut self) -> ColwireResult<String> {
        let bytes = self.read_binary()?;
        String::from_utf8(bytes).map_err(|e| colwire_err!(Protocol: "string is not valid UTF-8: {}", e))
    }
}

impl<B: Buf> WireRead for B {
    fn read_exact_bytes(&mut self, buf: &mut [u8]) -> ColwireResult<()> {
        if self.remaining() < buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "needed {} bytes but only {} remain",
                    buf.len(),
                    self.remaining()
                ),
            )
            .into());
        }
        self.copy_to_slice(buf);
        Ok(())
    }
}
