//! Models of the K1's programmable memories.
//!
//! Three wire protocols cover the five memories:
//!
//! | Model | Protocol per entry | Used for |
//! |-------|--------------------|----------|
//! | [`StepMemory`] | one setup word, then one write per entry | MM, TAT0, TAT1 |
//! | [`RmwMemory`] | setup + write + increment | AM |
//! | [`DirectMemory`] | position-implicit `{write-flag, payload}` | PAT |
//!
//! Contents are owned, zero-initialized arrays of fixed-width words. The
//! allocators establish single-writer-per-cell discipline; the memories only
//! enforce width and bounds.

use bytes::{BufMut, Bytes, BytesMut};
use kestrel_chip::layout::{opcode, WRITE_FLAG_BITS};
use kestrel_chip::MemoryId;
use tracing::debug;

use crate::bits;
use crate::error::{MapError, Result};

/// An ordered run of fixed-width programming words for one memory.
#[derive(Debug, Clone)]
pub struct ProgrammingStream {
    /// Memory this stream programs (a combined stream reports its first
    /// segment's memory).
    pub memory: MemoryId,
    /// Width of each word in bits.
    pub word_bits: u32,
    /// The words, in wire order.
    pub words: Vec<u64>,
}

impl ProgrammingStream {
    /// Number of words in the stream.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// True if the stream is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Append another stream, widening the word size to the larger of the two.
    #[must_use]
    pub fn concat(mut self, other: Self) -> Self {
        self.word_bits = self.word_bits.max(other.word_bits);
        self.words.extend_from_slice(&other.words);
        self
    }

    /// Serialize for the transport layer: each word little-endian in
    /// `ceil(word_bits / 8)` bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let stride = (self.word_bits as usize).div_ceil(8);
        let mut buf = BytesMut::with_capacity(self.words.len() * stride);
        for &word in &self.words {
            buf.put_slice(&word.to_le_bytes()[..stride]);
        }
        buf.freeze()
    }
}

/// Shared backing storage: a flat array of `word_bits`-wide words with an
/// optional 2-D interpretation (`rows` × `cols`; 1-D memories have one row).
#[derive(Debug)]
struct Cells {
    id: MemoryId,
    rows: usize,
    cols: usize,
    word_bits: u32,
    words: Vec<u64>,
}

impl Cells {
    fn new(id: MemoryId, rows: usize, cols: usize, word_bits: u32) -> Self {
        Self {
            id,
            rows,
            cols,
            word_bits,
            words: vec![0; rows * cols],
        }
    }

    fn len(&self) -> usize {
        self.words.len()
    }

    fn check_value(&self, value: u64) -> Result<()> {
        if self.word_bits < 64 && value >= (1u64 << self.word_bits) {
            return Err(MapError::overflow(value, self.word_bits));
        }
        Ok(())
    }

    fn assign_flat(&mut self, values: &[u64], start: usize) -> Result<()> {
        let end = start + values.len();
        if end > self.len() {
            return Err(MapError::capacity(self.id, end, self.len()));
        }
        for &v in values {
            self.check_value(v)?;
        }
        self.words[start..end].copy_from_slice(values);
        debug!(memory = self.id.name(), start, len = values.len(), "assigned");
        Ok(())
    }

    fn assign_2d(&mut self, block: &[Vec<u64>], row: usize, col: usize) -> Result<()> {
        for (r, line) in block.iter().enumerate() {
            if row + r >= self.rows || col + line.len() > self.cols {
                return Err(MapError::capacity(
                    self.id,
                    (row + r) * self.cols + col + line.len(),
                    self.len(),
                ));
            }
            for &v in line {
                self.check_value(v)?;
            }
            let base = (row + r) * self.cols + col;
            self.words[base..base + line.len()].copy_from_slice(line);
        }
        debug!(memory = self.id.name(), row, col, rows = block.len(), "assigned block");
        Ok(())
    }
}

/// Stepped memory: the address latch auto-increments after each write, so a
/// contiguous range programs as one setup word followed by plain writes.
#[derive(Debug)]
pub struct StepMemory {
    cells: Cells,
    addr_bits: u32,
}

impl StepMemory {
    /// Flat stepped memory of `len` words.
    #[must_use]
    pub fn new_1d(id: MemoryId, len: usize, word_bits: u32, addr_bits: u32) -> Self {
        Self {
            cells: Cells::new(id, 1, len, word_bits),
            addr_bits,
        }
    }

    /// 2-D stepped memory; flat addresses run row-major.
    #[must_use]
    pub fn new_2d(id: MemoryId, rows: usize, cols: usize, word_bits: u32, addr_bits: u32) -> Self {
        Self {
            cells: Cells::new(id, rows, cols, word_bits),
            addr_bits,
        }
    }

    /// Copy `values` in at flat offset `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is out of bounds or a value exceeds the
    /// word width.
    pub fn assign_1d(&mut self, values: &[u64], start: usize) -> Result<()> {
        self.cells.assign_flat(values, start)
    }

    /// Copy a block in at `(row, col)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the block leaves the array or a value exceeds the
    /// word width.
    pub fn assign_2d(&mut self, block: &[Vec<u64>], row: usize, col: usize) -> Result<()> {
        self.cells.assign_2d(block, row, col)
    }

    /// Current contents, flat row-major.
    #[must_use]
    pub fn words(&self) -> &[u64] {
        &self.cells.words
    }

    /// Programming stream for the whole memory.
    ///
    /// # Errors
    ///
    /// Returns an error if a word cannot be packed (programmer error: the
    /// widths come from the geometry).
    pub fn programming_stream(&self) -> Result<ProgrammingStream> {
        self.programming_stream_range(0, self.cells.len())
    }

    /// Programming stream for `len` entries starting at flat address `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is out of bounds or a word cannot be
    /// packed.
    pub fn programming_stream_range(&self, start: usize, len: usize) -> Result<ProgrammingStream> {
        if start + len > self.cells.len() {
            return Err(MapError::capacity(self.cells.id, start + len, self.cells.len()));
        }
        let payload_bits = self.addr_bits.max(self.cells.word_bits);
        let mut words = Vec::with_capacity(len + 1);
        words.push(bits::pack(&[(opcode::SET_ADDRESS, opcode::OP_BITS), (start as u64, payload_bits)])?);
        for &w in &self.cells.words[start..start + len] {
            words.push(bits::pack(&[(opcode::WRITE, opcode::OP_BITS), (w, payload_bits)])?);
        }
        Ok(ProgrammingStream {
            memory: self.cells.id,
            word_bits: opcode::OP_BITS + payload_bits,
            words,
        })
    }
}

/// Read-modify-write memory: the hardware only supports accumulate semantics,
/// so each logical write goes out as setup + write + increment.
#[derive(Debug)]
pub struct RmwMemory {
    cells: Cells,
    addr_bits: u32,
}

impl RmwMemory {
    /// Flat read-modify-write memory of `len` words.
    #[must_use]
    pub fn new(id: MemoryId, len: usize, word_bits: u32, addr_bits: u32) -> Self {
        Self {
            cells: Cells::new(id, 1, len, word_bits),
            addr_bits,
        }
    }

    /// Copy `values` in at offset `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is out of bounds or a value exceeds the
    /// word width.
    pub fn assign_1d(&mut self, values: &[u64], start: usize) -> Result<()> {
        self.cells.assign_flat(values, start)
    }

    /// Current contents.
    #[must_use]
    pub fn words(&self) -> &[u64] {
        &self.cells.words
    }

    /// Programming stream for the whole memory: three words per entry.
    ///
    /// # Errors
    ///
    /// Returns an error if a word cannot be packed.
    pub fn programming_stream(&self) -> Result<ProgrammingStream> {
        let payload_bits = self.addr_bits.max(self.cells.word_bits);
        let mut words = Vec::with_capacity(self.cells.len() * 3);
        for (addr, &w) in self.cells.words.iter().enumerate() {
            words.push(bits::pack(&[(opcode::SET_ADDRESS, opcode::OP_BITS), (addr as u64, payload_bits)])?);
            words.push(bits::pack(&[(opcode::WRITE, opcode::OP_BITS), (w, payload_bits)])?);
            words.push(bits::pack(&[(opcode::INCREMENT, opcode::OP_BITS), (0, payload_bits)])?);
        }
        Ok(ProgrammingStream {
            memory: self.cells.id,
            word_bits: opcode::OP_BITS + payload_bits,
            words,
        })
    }
}

/// Direct memory: every address is implied by stream position, so entries go
/// out in index order as `{write-flag, payload}` with no address field.
#[derive(Debug)]
pub struct DirectMemory {
    cells: Cells,
}

impl DirectMemory {
    /// Flat direct memory of `len` words.
    #[must_use]
    pub fn new(id: MemoryId, len: usize, word_bits: u32) -> Self {
        Self {
            cells: Cells::new(id, 1, len, word_bits),
        }
    }

    /// Copy `values` in at offset `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is out of bounds or a value exceeds the
    /// word width.
    pub fn assign_1d(&mut self, values: &[u64], start: usize) -> Result<()> {
        self.cells.assign_flat(values, start)
    }

    /// Current contents.
    #[must_use]
    pub fn words(&self) -> &[u64] {
        &self.cells.words
    }

    /// Programming stream: one word per entry, whole memory, index order.
    ///
    /// # Errors
    ///
    /// Returns an error if a word cannot be packed.
    pub fn programming_stream(&self) -> Result<ProgrammingStream> {
        let mut words = Vec::with_capacity(self.cells.len());
        for &w in &self.cells.words {
            words.push(bits::pack(&[(1, WRITE_FLAG_BITS), (w, self.cells.word_bits)])?);
        }
        Ok(ProgrammingStream {
            memory: self.cells.id,
            word_bits: WRITE_FLAG_BITS + self.cells.word_bits,
            words,
        })
    }
}
