use std::io::{self, Read, Write};

use bytes::{Buf, Bytes, BytesMut};

/// An in-memory duplex stream.
///
/// Reads are served from a scripted input buffer and writes are collected for inspection, which
/// makes it possible to replay a recorded server conversation against a [`crate::Transport`].
#[derive(Debug, Default, Clone)]
pub struct MemoryStream {
    input: Bytes,
    written: BytesMut,
}

impl MemoryStream {
    /// Create a stream whose reads return `input`, followed by end-of-file.
    pub fn new(input: impl Into<Bytes>) -> Self {
        Self {
            input: input.into(),
            written: BytesMut::new(),
        }
    }

    /// Append more bytes for subsequent reads.
    pub fn extend_input(&mut self, more: &[u8]) {
        let mut input = BytesMut::from(self.input.as_ref());
        input.extend_from_slice(more);
        self.input = input.freeze();
    }

    /// Everything written to the stream so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Take everything written so far, leaving the written buffer empty.
    pub fn take_written(&mut self) -> Bytes {
        self.written.split().freeze()
    }

    /// The number of input bytes not yet read.
    pub fn remaining_input(&self) -> usize {
        self.input.remaining()
    }
}

impl Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.input.remaining());
        self.input.copy_to_slice(&mut buf[..n]);
        Ok(n)
    }
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
