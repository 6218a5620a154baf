//! Blocking `Read` view over a [`SharedInputBuffer`].

use crate::shared_buffer::SharedInputBuffer;

use std::io::{self, Read};
use std::sync::Arc;

/// Handed to classic consumers as their content source.
///
/// Reads block the calling thread until bytes arrive, the stream ends
/// (`Ok(0)`) or the buffer is aborted (`ConnectionAborted`).
pub struct ContentInputStream {
    buffer: Arc<SharedInputBuffer>,
    eof: bool,
}

impl ContentInputStream {
    pub fn new(buffer: Arc<SharedInputBuffer>) -> Self {
        Self { buffer, eof: false }
    }

    /// Bytes readable without blocking.
    pub fn available(&self) -> usize {
        self.buffer.length()
    }

    /// Read and discard everything up to end of stream.
    pub fn drain(&mut self) -> io::Result<u64> {
        io::copy(self, &mut io::sink())
    }
}

impl Read for ContentInputStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.eof {
            // Abort after end of stream still surfaces
            if self.buffer.is_aborted() {
                return Err(io::Error::new(io::ErrorKind::ConnectionAborted, "Aborted"));
            }
            return Ok(0);
        }
        let n = self.buffer.read(buf)?;
        if n == 0 {
            self.eof = true;
        }
        Ok(n)
    }
}
