//! Fixed-capacity byte buffer
//!
//! `ByteBuffer` is the accumulator every request and response passes through.
//! Its capacity is fixed at creation and the write cursor (`offset`) can never
//! move past it: writes that do not fit are refused whole and leave the
//! existing contents untouched.

use bytes::Bytes;
use std::fmt;
use std::io::{self, Read};
use thiserror::Error;

/// Default capacity for request buffers
pub const DEFAULT_CAPACITY: usize = 4096;

/// Largest single read performed by `read_from`
const READ_CHUNK: usize = 4096;

/// Errors raised by buffer operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    /// The backing storage could not be allocated
    #[error("Out of memory")]
    OutOfMemory,

    /// The write would move the offset past the capacity
    #[error("Buffer overflow: {requested} bytes requested, {remaining} remaining")]
    Overflow {
        /// Bytes the write needed
        requested: usize,
        /// Bytes left before the capacity is reached
        remaining: usize,
    },
}

/// Growable, offset-tracked byte accumulator with a hard capacity
#[derive(Clone, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl ByteBuffer {
    /// Allocate a buffer able to hold exactly `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Result<Self, BufferError> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| BufferError::OutOfMemory)?;

        Ok(Self { data, capacity })
    }

    /// Current write offset (number of bytes written)
    pub fn offset(&self) -> usize {
        self.data.len()
    }

    /// Capacity fixed at creation
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes that can still be written
    pub fn remaining(&self) -> usize {
        self.capacity - self.data.len()
    }

    /// Whether nothing has been written yet
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the offset has reached the capacity
    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    /// The written region
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Append raw bytes at the current offset
    pub fn append_bytes(&mut self, bytes: &[u8]) -> Result<usize, BufferError> {
        if bytes.len() > self.remaining() {
            return Err(BufferError::Overflow {
                requested: bytes.len(),
                remaining: self.remaining(),
            });
        }

        self.data.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    /// Append formatted text at the current offset
    ///
    /// The text is rendered first and only copied in when it fits, so a
    /// refused write never leaves a truncated fragment behind.
    ///
    /// ```
    /// use pmap::buffer::ByteBuffer;
    ///
    /// let mut buffer = ByteBuffer::with_capacity(32).unwrap();
    /// buffer.append_fmt(format_args!("Host: {}:{}\r\n", "10.0.0.1", 80)).unwrap();
    /// assert_eq!(buffer.as_slice(), b"Host: 10.0.0.1:80\r\n");
    /// ```
    pub fn append_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<usize, BufferError> {
        match args.as_str() {
            Some(literal) => self.append_bytes(literal.as_bytes()),
            None => self.append_bytes(fmt::format(args).as_bytes()),
        }
    }

    /// Copy the written region of `src` to the current offset of `self`
    pub fn append_buffer(&mut self, src: &ByteBuffer) -> Result<usize, BufferError> {
        self.append_bytes(src.as_slice())
    }

    /// Read once from `reader` into the unwritten region
    ///
    /// At most `READ_CHUNK` bytes are taken per call. Returns the number of
    /// bytes read; `Ok(0)` means either the reader is exhausted or the buffer
    /// is full.
    pub fn read_from<R: Read>(&mut self, reader: &mut R) -> io::Result<usize> {
        if self.is_full() {
            return Ok(0);
        }

        let mut chunk = [0u8; READ_CHUNK];
        let limit = self.remaining().min(READ_CHUNK);

        let n = reader.read(&mut chunk[..limit])?;
        self.data.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    /// Written region decoded as text, replacing invalid UTF-8
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    /// Hand the written region over as immutable shared bytes
    pub fn freeze(self) -> Bytes {
        Bytes::from(self.data)
    }
}

impl fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("offset", &self.offset())
            .field("capacity", &self.capacity)
            .finish()
    }
}
