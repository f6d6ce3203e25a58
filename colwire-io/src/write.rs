use bytes::BufMut;
use colwire_error::ColwireResult;
use paste::paste;

use crate::MAX_VARINT_LEN;

macro_rules! write_le {
    ($($T:ty),*) => {
        paste! {
            $(
                #[doc = "Write a little-endian `" $T "`."]
                fn [<write_ $T>](&mut self, value: $T) -> ColwireResult<()> {
                    self.write_all_bytes(&value.to_le_bytes())
                }
            )*
        }
    };
}

/// The write half of the transport primitives.
pub trait WireWrite {
    /// Append all of `bytes` to the output.
    fn write_all_bytes(&mut self, bytes: &[u8]) -> ColwireResult<()>;

    /// Write a single byte.
    fn write_u8(&mut self, value: u8) -> ColwireResult<()> {
        self.write_all_bytes(&[value])
    }

    /// Write a one-byte boolean.
    fn write_bool(&mut self, value: bool) -> ColwireResult<()> {
        self.write_u8(u8::from(value))
    }

    write_le!(i8, u16, i16, u32, i32, u64, i64, u128, i128, f32, f64);

    /// Write an unsigned LEB128 variable-length integer.
    fn write_varint(&mut self, mut value: u64) -> ColwireResult<()> {
        let mut bytes = [0u8; MAX_VARINT_LEN];
        let mut len = 0;
        loop {
            #[allow(clippy::cast_possible_truncation)]
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                bytes[len] = byte;
                len += 1;
                break;
            }
            bytes[len] = byte | 0x80;
            len += 1;
        }
        self.write_all_bytes(&bytes[..len])
    }

    /// Write a length or count as a varint.
    fn write_length(&mut self, length: usize) -> ColwireResult<()> {
        self.write_varint(length as u64)
    }

    /// Write a varint length followed by the raw bytes.
    fn write_binary(&mut self, bytes: &[u8]) -> ColwireResult<()> {
        self.write_length(bytes.len())?;
        self.write_all_bytes(bytes)
    }

    /// Write a varint length followed by the UTF-8 bytes of `value`.
    fn write_string(&mut self, value: &str) -> ColwireResult<()> {
        self.write_binary(value.as_bytes())
    }
}

impl<B: BufMut> WireWrite for B {
    fn write_all_bytes(&mut self, bytes: &[u8]) -> ColwireResult<()> {
        self.put_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use rstest::rstest;

    use super::*;
    use crate::WireRead;

    #[rstest]
    #[case(0, &[0x00])]
    #[case(1, &[0x01])]
    #[case(300, &[0xac, 0x02])]
    #[case(u64::MAX, &[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01])]
    fn varint_bytes(#[case] value: u64, #[case] expected: &[u8]) {
        let mut out = Vec::new();
        out.write_varint(value).unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn primitives_read_back() {
        let mut out = BytesMut::new();
        out.write_bool(true).unwrap();
        out.write_i8(i8::MIN).unwrap();
        out.write_u64(u64::MAX).unwrap();
        out.write_i128(i128::MIN).unwrap();
        out.write_f64(-0.5).unwrap();
        out.write_string("héllo").unwrap();

        let mut input = out.freeze();
        assert!(input.read_bool().unwrap());
        assert_eq!(input.read_i8().unwrap(), i8::MIN);
        assert_eq!(input.read_u64().unwrap(), u64::MAX);
        assert_eq!(input.read_i128().unwrap(), i128::MIN);
        assert_eq!(input.read_f64().unwrap(), -0.5);
        assert_eq!(input.read_string().unwrap(), "héllo");
    }
}
