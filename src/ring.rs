//! The fixed-capacity block ring at the heart of the transport core.
//!
//! An [`AudioRing`] holds a sliding window of the most recent
//! `block_size * block_count` bytes written by a single broadcaster. Writes
//! are append-only and block-granular; reads are offset-addressed and never
//! block — a reader that has fallen out of the window is repositioned
//! rather than stalled.

/// A fixed-capacity, block-granular circular buffer.
///
/// All byte offsets used by this type are absolute: they count from the
/// first byte ever written, not from the start of the backing buffer.
pub struct AudioRing {
    buffer: Vec<u8>,
    block_size: usize,
    block_count: usize,
    base: u64,
    size: u64,
    pending: Vec<u8>,
}

impl AudioRing {
    /// Allocates a new ring of `block_size * block_count` zeroed bytes.
    ///
    /// `base` seeds both the base and size offsets, allowing a ring to be
    /// reattached at a known absolute offset during migration rather than
    /// always starting at zero.
    pub fn new(block_size: usize, block_count: usize, base: u64) -> Self {
        assert!(block_size > 0, "block_size must be non-zero");
        assert!(block_count > 0, "block_count must be non-zero");

        AudioRing {
            buffer: vec![0u8; block_size * block_count],
            block_size,
            block_count,
            base,
            size: base,
            pending: Vec::new(),
        }
    }

    /// Appends `chunk` to the stream, completing as many whole blocks as
    /// the combined pending tail and new bytes allow.
    ///
    /// Returns the number of whole blocks newly made visible to `read`.
    /// Callers use this to decide whether to re-drive hungry readers.
    pub fn write(&mut self, chunk: &[u8]) -> usize {
        self.pending.extend_from_slice(chunk);

        let mut blocks_written = 0;
        let capacity = self.capacity() as u64;

        while self.pending.len() >= self.block_size {
            let block: Vec<u8> = self.pending.drain(..self.block_size).collect();
            let start = (self.size % capacity) as usize;
            self.buffer[start..start + self.block_size].copy_from_slice(&block);

            self.size += self.block_size as u64;
            if self.size - self.base > capacity {
                self.base = self.size - capacity;
            }

            blocks_written += 1;
        }

        blocks_written
    }

    /// Reads the block covering `offset`, aligning down to the nearest
    /// block boundary first.
    ///
    /// Returns `(None, offset)` if no new whole block exists yet at that
    /// offset. If `offset` has fallen out of the window, the reader is
    /// repositioned to [`middle`][AudioRing::middle] and the block there is
    /// returned instead — the only place a reader's offset can move
    /// non-monotonically with respect to the original stream.
    pub fn read(&self, offset: u64) -> (Option<Vec<u8>>, u64) {
        let aligned = offset - (offset % self.block_size as u64);

        if aligned >= self.size {
            return (None, offset);
        }

        if aligned < self.base {
            let middle = self.middle();
            return (Some(self.block_at(middle)), middle + self.block_size as u64);
        }

        (Some(self.block_at(aligned)), aligned + self.block_size as u64)
    }

    fn block_at(&self, offset: u64) -> Vec<u8> {
        let start = (offset % self.capacity() as u64) as usize;
        self.buffer[start..start + self.block_size].to_vec()
    }

    /// Reassembles the current window in chronological order, followed by
    /// the not-yet-complete pending tail. Intended for tests and
    /// diagnostics, not the hot path.
    pub fn data(&self) -> Vec<u8> {
        let capacity = self.capacity();
        let window_len = (self.size - self.base) as usize;
        let start = (self.base % capacity as u64) as usize;

        let mut out = Vec::with_capacity(window_len + self.pending.len());
        if start + window_len <= capacity {
            out.extend_from_slice(&self.buffer[start..start + window_len]);
        } else {
            let first = capacity - start;
            out.extend_from_slice(&self.buffer[start..]);
            out.extend_from_slice(&self.buffer[..window_len - first]);
        }
        out.extend_from_slice(&self.pending);
        out
    }

    /// Absolute offset of the oldest byte currently held in the window.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Absolute offset one past the newest whole block written.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Block-aligned midpoint of the current window; the reposition target
    /// for an out-of-window reader.
    pub fn middle(&self) -> u64 {
        let window_blocks = (self.size - self.base) / self.block_size as u64;
        self.base + (window_blocks / 2) * self.block_size as u64
    }

    /// Bytes per block.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Blocks held by the window.
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Total window capacity in bytes, `block_size * block_count`.
    pub fn capacity(&self) -> usize {
        self.block_size * self.block_count
    }
}
