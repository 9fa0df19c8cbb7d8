//! # Decode Ring Buffer
//!
//! Bounded circular buffer of interleaved f32 samples sitting between a
//! codec's decode call and `read_frames`.
//!
//! ## Design
//!
//! - **Capacity**: fixed at creation, sized to one decode call's worst case
//! - **Full Policy**: writes never overwrite unread samples; the excess is
//!   reported back to the caller
//! - **Ownership**: owned by a single reader, no sharing between threads
//!
//! ## Usage
//!
//! ```rust
//! use core_reader::codec::ring_buffer::RingBuffer;
//!
//! // Room for one 4096-frame stereo packet
//! let mut buffer = RingBuffer::new(4096 * 2);
//!
//! let samples = vec![0.1f32, -0.1, 0.2, -0.2];
//! assert_eq!(buffer.write(&samples), 4);
//!
//! let mut output = vec![0.0f32; 1024];
//! let read = buffer.read(&mut output);
//! assert_eq!(read, 4);
//! ```

/// Fixed-capacity FIFO of samples.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    buffer: Vec<f32>,
    write_pos: usize,
    read_pos: usize,
    len: usize,
}

impl RingBuffer {
    /// Creates a buffer holding up to `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity],
            write_pos: 0,
            read_pos: 0,
            len: 0,
        }
    }

    /// Appends as many of `samples` as fit.
    ///
    /// Returns the number of samples actually written.
    pub fn write(&mut self, samples: &[f32]) -> usize {
        let to_write = samples.len().min(self.free_space());
        if to_write == 0 {
            return 0;
        }

        let capacity = self.capacity();
        let first = to_write.min(capacity - self.write_pos);
        self.buffer[self.write_pos..self.write_pos + first].copy_from_slice(&samples[..first]);
        self.buffer[..to_write - first].copy_from_slice(&samples[first..to_write]);

        self.write_pos = (self.write_pos + to_write) % capacity;
        self.len += to_write;
        to_write
    }

    /// Moves up to `output.len()` samples out of the buffer.
    ///
    /// Returns the number of samples actually read.
    pub fn read(&mut self, output: &mut [f32]) -> usize {
        let to_read = output.len().min(self.len);
        if to_read == 0 {
            return 0;
        }

        let capacity = self.capacity();
        let first = to_read.min(capacity - self.read_pos);
        output[..first].copy_from_slice(&self.buffer[self.read_pos..self.read_pos + first]);
        output[first..to_read].copy_from_slice(&self.buffer[..to_read - first]);

        self.read_pos = (self.read_pos + to_read) % capacity;
        self.len -= to_read;
        to_read
    }

    /// Drops up to `count` samples without copying them.
    pub fn discard(&mut self, count: usize) -> usize {
        let dropped = count.min(self.len);
        if dropped > 0 {
            self.read_pos = (self.read_pos + dropped) % self.capacity();
            self.len -= dropped;
        }
        dropped
    }

    /// Returns the number of samples currently available to read.
    pub fn available(&self) -> usize {
        self.len
    }

    /// Returns the number of samples that can be written.
    pub fn free_space(&self) -> usize {
        self.capacity() - self.len
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Forgets every buffered sample.
    pub fn clear(&mut self) {
        self.write_pos = 0;
        self.read_pos = 0;
        self.len = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }
}
