use std::io::{self, Read, Write};

use bytes::{Buf, Bytes, BytesMut};
use colwire_error::{ColwireResult, colwire_bail};

use crate::{
    CHECKSUM_SIZE, CompressionMethod, FRAME_HEADER_SIZE, MAX_FRAME_SIZE, WireRead, WireWrite,
    decode_frame, encode_frame, frame_len,
};

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Buffered native-protocol transport over a blocking duplex stream.
///
/// Writes are buffered until [`Transport::flush`]. When the session negotiated compression,
/// callers bracket the spans that must be compressed (data blocks) with
/// [`Transport::begin_compressed`] and [`Transport::end_compressed`]; everything outside such a
/// span, and everything inside one when compression is off, travels as plain bytes.
pub struct Transport<S> {
    stream: S,
    compression: Option<CompressionMethod>,
    in_span: bool,
    read_buf: BytesMut,
    write_buf: BytesMut,
    decompressed: Bytes,
    pending: BytesMut,
}

impl<S: Read + Write> Transport<S> {
    /// Wrap a stream without compression.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            compression: None,
            in_span: false,
            read_buf: BytesMut::new(),
            write_buf: BytesMut::new(),
            decompressed: Bytes::new(),
            pending: BytesMut::new(),
        }
    }

    /// Compress data spans with the given method.
    pub fn with_compression(mut self, method: Option<CompressionMethod>) -> Self {
        self.compression = method;
        self
    }

    /// The compression applied to data spans, if any.
    pub fn compression(&self) -> Option<CompressionMethod> {
        self.compression
    }

    /// Whether a compressed span is currently open.
    pub fn in_compressed_span(&self) -> bool {
        self.in_span
    }

    /// Open a compressed span. Does nothing when the session is uncompressed.
    pub fn begin_compressed(&mut self) -> ColwireResult<()> {
        if self.compression.is_none() {
            return Ok(());
        }
        if self.in_span {
            colwire_bail!("a compressed span is already open");
        }
        self.in_span = true;
        Ok(())
    }

    /// Close the current compressed span, framing any buffered output.
    pub fn end_compressed(&mut self) -> ColwireResult<()> {
        if !self.in_span {
            return Ok(());
        }
        self.emit_frames()?;
        if !self.decompressed.is_empty() {
            log::warn!(
                "Discarding {} unread bytes at the end of a compressed span",
                self.decompressed.len()
            );
            self.decompressed = Bytes::new();
        }
        self.in_span = false;
        Ok(())
    }

    /// Run `f` inside a compressed span.
    pub fn compressed<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> ColwireResult<T>,
    ) -> ColwireResult<T> {
        self.begin_compressed()?;
        let result = f(self);
        let ended = self.end_compressed();
        let value = result?;
        ended?;
        Ok(value)
    }

    /// Send all buffered output to the stream.
    pub fn flush(&mut self) -> ColwireResult<()> {
        if self.in_span {
            self.emit_frames()?;
        }
        if !self.write_buf.is_empty() {
            self.stream.write_all(&self.write_buf)?;
            self.write_buf.clear();
        }
        self.stream.flush()?;
        Ok(())
    }

    /// A reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// A mutable reference to the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Unwrap the underlying stream, dropping any unflushed output.
    pub fn into_inner(self) -> S {
        self.stream
    }

    fn emit_frames(&mut self) -> ColwireResult<()> {
        let Some(method) = self.compression else {
            return Ok(());
        };
        while !self.pending.is_empty() {
            let chunk = self.pending.split_to(self.pending.len().min(MAX_FRAME_SIZE));
            let frame = encode_frame(method, &chunk)?;
            log::trace!(
                "Framed {} bytes into a {} byte {} frame",
                chunk.len(),
                frame.len(),
                method
            );
            self.write_buf.extend_from_slice(&frame);
        }
        Ok(())
    }

    fn read_raw(&mut self, buf: &mut [u8]) -> ColwireResult<()> {
        let mut filled = 0;
        while filled < buf.len() {
            if self.read_buf.is_empty() {
                self.read_buf.resize(READ_CHUNK_SIZE, 0);
                let n = loop {
                    match self.stream.read(&mut self.read_buf) {
                        Ok(n) => break n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            self.read_buf.clear();
                            return Err(e.into());
                        }
                    }
                };
                self.read_buf.truncate(n);
                if n == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!(
                            "connection closed after {} of {} bytes",
                            filled,
                            buf.len()
                        ),
                    )
                    .into());
                }
            }
            let n = (buf.len() - filled).min(self.read_buf.len());
            buf[filled..filled + n].copy_from_slice(&self.read_buf[..n]);
            self.read_buf.advance(n);
            filled += n;
        }
        Ok(())
    }

    fn read_frame(&mut self) -> ColwireResult<()> {
        let mut head = [0u8; CHECKSUM_SIZE + FRAME_HEADER_SIZE];
        self.read_raw(&mut head)?;
        let len = frame_len(&head)?;
        let mut frame = Vec::with_capacity(len.min(READ_CHUNK_SIZE));
        frame.extend_from_slice(&head);
        while frame.len() < len {
            let start = frame.len();
            frame.resize(start + (len - start).min(READ_CHUNK_SIZE), 0);
            self.read_raw(&mut frame[start..])?;
        }
        self.decompressed = Bytes::from(decode_frame(&frame)?);
        Ok(())
    }
}

impl<S: Read + Write> WireRead for Transport<S> {
    fn read_exact_bytes(&mut self, buf: &mut [u8]) -> ColwireResult<()> {
        if !self.in_span {
            return self.read_raw(buf);
        }
        let mut filled = 0;
        while filled < buf.len() {
            if self.decompressed.is_empty() {
                self.read_frame()?;
            }
            let n = (buf.len() - filled).min(self.decompressed.len());
            self.decompressed.copy_to_slice(&mut buf[filled..filled + n]);
            filled += n;
        }
        Ok(())
    }
}

impl<S: Read + Write> WireWrite for Transport<S> {
    fn write_all_bytes(&mut self, bytes: &[u8]) -> ColwireResult<()> {
        if self.in_span {
            self.pending.extend_from_slice(bytes);
            if self.pending.len() >= MAX_FRAME_SIZE {
                self.emit_frames()?;
            }
        } else {
            self.write_buf.extend_from_slice(bytes);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use colwire_error::ErrorCode;

    use super::*;
    use crate::{MAX_ACCEPTED_FRAME_SIZE, MemoryStream};

    #[test]
    fn plain_round_trip() {
        let mut transport = Transport::new(MemoryStream::default());
        transport.write_varint(300).unwrap();
        transport.write_string("query").unwrap();
        transport.flush().unwrap();

        let written = transport.into_inner().written().to_vec();
        let mut transport = Transport::new(MemoryStream::new(written));
        assert_eq!(transport.read_varint().unwrap(), 300);
        assert_eq!(transport.read_string().unwrap(), "query");
    }

    #[test]
    fn compressed_span_is_framed() {
        let mut transport =
            Transport::new(MemoryStream::default()).with_compression(Some(CompressionMethod::Lz4));
        transport.write_varint(1).unwrap();
        transport
            .compressed(|t| {
                for i in 0..1000u32 {
                    t.write_u32(i % 7)?;
                }
                Ok(())
            })
            .unwrap();
        transport.write_varint(5).unwrap();
        transport.flush().unwrap();

        let written = transport.into_inner().written().to_vec();
        // One tag byte, one frame, one tag byte.
        assert_eq!(written[CHECKSUM_SIZE + 1], CompressionMethod::Lz4.byte());
        assert!(written.len() < 4000);

        let mut transport = Transport::new(MemoryStream::new(written))
            .with_compression(Some(CompressionMethod::Lz4));
        assert_eq!(transport.read_varint().unwrap(), 1);
        transport.begin_compressed().unwrap();
        for i in 0..1000u32 {
            assert_eq!(transport.read_u32().unwrap(), i % 7);
        }
        transport.end_compressed().unwrap();
        assert_eq!(transport.read_varint().unwrap(), 5);
    }

    #[test]
    fn span_without_compression_is_plain() {
        let mut transport = Transport::new(MemoryStream::default());
        transport.begin_compressed().unwrap();
        assert!(!transport.in_compressed_span());
        transport.write_u8(7).unwrap();
        transport.end_compressed().unwrap();
        transport.flush().unwrap();
        assert_eq!(transport.get_ref().written(), &[7]);
    }

    #[test]
    fn truncated_frame_is_an_io_error() {
        let mut head = vec![0u8; CHECKSUM_SIZE + FRAME_HEADER_SIZE];
        head[CHECKSUM_SIZE] = CompressionMethod::Lz4.byte();
        let declared = u32::try_from(MAX_ACCEPTED_FRAME_SIZE).unwrap();
        head[CHECKSUM_SIZE + 1..CHECKSUM_SIZE + 5].copy_from_slice(&declared.to_le_bytes());
        head.extend_from_slice(b"short");

        let mut transport =
            Transport::new(MemoryStream::new(head)).with_compression(Some(CompressionMethod::Lz4));
        transport.begin_compressed().unwrap();
        assert_eq!(transport.read_u8().unwrap_err().code(), ErrorCode::Io);
    }

    #[test]
    fn eof_is_an_io_error() {
        let mut transport = Transport::new(MemoryStream::new(vec![0x01, 0x02]));
        assert_eq!(transport.read_u32().unwrap_err().code(), ErrorCode::Io);
    }
}
