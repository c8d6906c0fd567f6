//! Circular byte buffer over caller-supplied storage
//!
//! One slot is always kept free so that `head == tail` means empty and
//! `head + 1 == tail` means full: a buffer over `N` bytes holds at most
//! `N - 1` of them.
//!
//! The UART engine writes from interrupt context and reads from task
//! context. Both sides only move their own index, which is what lets the
//! engine skip a lock as long as one transfer per direction is in flight.

/// Fixed-capacity circular byte buffer
#[derive(Debug)]
pub struct RingBuffer<'d> {
    buf: &'d mut [u8],
    /// Next slot to write
    head: usize,
    /// Next slot to read
    tail: usize,
}

impl<'d> RingBuffer<'d> {
    /// Wrap `buf` as an empty ring buffer
    pub fn new(buf: &'d mut [u8]) -> Self {
        Self {
            buf,
            head: 0,
            tail: 0,
        }
    }

    /// Maximum number of bytes the buffer can hold
    pub fn capacity(&self) -> usize {
        self.buf.len().saturating_sub(1)
    }

    /// Bytes currently held
    pub fn len(&self) -> usize {
        if self.head >= self.tail {
            self.head - self.tail
        } else {
            self.buf.len() - self.tail + self.head
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Space left before the buffer is full
    pub fn free(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Append a byte; returns false (and drops the byte) when full
    pub fn push(&mut self, byte: u8) -> bool {
        if self.is_full() {
            return false;
        }
        self.buf[self.head] = byte;
        self.head = self.next(self.head);
        true
    }

    /// Remove the oldest byte
    pub fn pop(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let byte = self.buf[self.tail];
        self.tail = self.next(self.tail);
        Some(byte)
    }

    /// Move as many bytes as fit into `out`, oldest first
    ///
    /// Returns the number of bytes copied.
    pub fn pop_into(&mut self, out: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < out.len() {
            match self.pop() {
                Some(byte) => {
                    out[copied] = byte;
                    copied += 1;
                }
                None => break,
            }
        }
        copied
    }

    /// Discard all buffered bytes
    pub fn clear(&mut self) {
        self.tail = self.head;
    }

    fn next(&self, index: usize) -> usize {
        (index + 1) % self.buf.len()
    }
}
