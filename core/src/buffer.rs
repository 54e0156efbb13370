//! Fixed-size connection buffers and the outbound buffer pool.
//!
//! Every connection owns a `RecvQueue` for its lifetime. `SendQueue`s
//! are scarcer: a connection only holds one while it has unsent bytes,
//! and returns it to the `BufferPool` once drained.

use std::fmt;
use std::io;

use crate::{Error, Result};

/// Inbound buffer. Bytes accumulate until a full line is available;
/// a full buffer with no line terminator is a protocol violation the
/// caller handles by dropping the connection.
pub struct RecvQueue {
    data: Box<[u8]>,
    len: usize,
}

impl RecvQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Free space at the tail, as a writable slice.
    pub fn space(&mut self) -> &mut [u8] {
        &mut self.data[self.len..]
    }

    /// Marks `n` bytes of the space slice as filled.
    pub fn advance(&mut self, n: usize) {
        debug_assert!(self.len + n <= self.data.len());
        self.len += n;
    }

    pub fn is_full(&self) -> bool {
        self.len == self.data.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Extracts the next complete line, without its terminator.
    ///
    /// Lines end at `\n`; a preceding `\r` is stripped. Remaining bytes
    /// are compacted to the front of the buffer.
    pub fn next_line(&mut self) -> Option<String> {
        let nl = self.data[..self.len].iter().position(|&b| b == b'\n')?;
        let mut end = nl;
        if end > 0 && self.data[end - 1] == b'\r' {
            end -= 1;
        }
        let line = String::from_utf8_lossy(&self.data[..end]).into_owned();
        self.data.copy_within(nl + 1..self.len, 0);
        self.len -= nl + 1;
        Some(line)
    }
}

impl fmt::Debug for RecvQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecvQueue")
            .field("len", &self.len)
            .field("capacity", &self.data.len())
            .finish()
    }
}

/// Outbound buffer. Fixed capacity; an append that does not fit fails
/// whole, which the caller treats as the client falling too far behind.
pub struct SendQueue {
    data: Box<[u8]>,
    len: usize,
}

impl SendQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if self.len + bytes.len() > self.data.len() {
            return Err(Error::SendQueueFull);
        }
        self.data[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    /// Writes queued bytes through `write` until everything is out or
    /// the sink stops accepting. Unsent bytes are compacted to the
    /// front. Returns the number of bytes written.
    pub fn drain<F>(&mut self, mut write: F) -> io::Result<usize>
    where
        F: FnMut(&[u8]) -> io::Result<usize>,
    {
        let mut sent = 0;
        while sent < self.len {
            match write(&self.data[sent..self.len]) {
                Ok(0) => break,
                Ok(n) => sent += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    self.data.copy_within(sent..self.len, 0);
                    self.len -= sent;
                    return Err(e);
                }
            }
        }
        self.data.copy_within(sent..self.len, 0);
        self.len -= sent;
        Ok(sent)
    }

    pub fn reset(&mut self) {
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for SendQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendQueue")
            .field("len", &self.len)
            .field("capacity", &self.data.len())
            .finish()
    }
}

/// Free list of send queues. Released queues above the ceiling are
/// dropped instead of retained.
pub struct BufferPool {
    free: Vec<SendQueue>,
    buf_capacity: usize,
    ceiling: usize,
}

impl BufferPool {
    pub fn new(buf_capacity: usize, prewarm: usize, ceiling: usize) -> Self {
        let mut free = Vec::with_capacity(prewarm);
        for _ in 0..prewarm {
            free.push(SendQueue::new(buf_capacity));
        }
        Self {
            free,
            buf_capacity,
            ceiling,
        }
    }

    pub fn acquire(&mut self) -> SendQueue {
        match self.free.pop() {
            Some(mut q) => {
                q.reset();
                q
            }
            None => SendQueue::new(self.buf_capacity),
        }
    }

    pub fn release(&mut self, queue: SendQueue) {
        if self.free.len() < self.ceiling {
            self.free.push(queue);
        }
    }

    /// Number of queues currently idle in the pool.
    pub fn idle(&self) -> usize {
        self.free.len()
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("idle", &self.free.len())
            .field("ceiling", &self.ceiling)
            .finish()
    }
}
