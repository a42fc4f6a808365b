//! The allocation arena: one instance of every physical memory and its
//! allocator, derived from the chip geometry.
//!
//! A `Core` represents one chip's allocation state for one mapping run.
//! Every extent and word width comes from [`ChipGeometry`]; nothing here is
//! hardcoded. The mapping driver owns the phase protocol; the core's only
//! ordering rule is [`switch_mm_to_transform_mode`](Core::switch_mm_to_transform_mode),
//! called exactly once between decode-mode and transform-mode allocation.

use kestrel_chip::{ChipGeometry, MemoryId};
use tracing::info;

use crate::alloc::{BitmapAllocator, GridAllocator, SeqAllocator};
use crate::error::Result;
use crate::memory::{DirectMemory, ProgrammingStream, RmwMemory, StepMemory};

/// One chip's memories and allocation state.
#[derive(Debug)]
pub struct Core {
    geom: ChipGeometry,

    /// Main Memory weight table.
    pub mm: StepMemory,
    /// Main Memory allocator (decode bands / transform runs).
    pub mm_alloc: GridAllocator,

    /// Accumulator Memory.
    pub am: RmwMemory,
    /// Accumulator Memory allocator.
    pub am_alloc: SeqAllocator,

    /// Tag-Action Table 0 (input side).
    pub tat0: StepMemory,
    /// TAT0 allocator.
    pub tat0_alloc: SeqAllocator,

    /// Tag-Action Table 1 (output side).
    pub tat1: StepMemory,
    /// TAT1 allocator.
    pub tat1_alloc: SeqAllocator,

    /// Pool-Address Table.
    pub pat: DirectMemory,
    /// PAT occupancy (direct-mapped: pool index = entry address).
    pub pat_alloc: BitmapAllocator,

    /// Neuron array allocator, in unit-pools.
    pub nrn_alloc: SeqAllocator,
}

impl Core {
    /// Instantiate every memory and allocator from the geometry.
    #[must_use]
    pub fn new(geom: ChipGeometry) -> Self {
        Self {
            geom,
            mm: StepMemory::new_2d(
                MemoryId::MainMemory,
                geom.mm_height(),
                geom.mm_width(),
                geom.mm_word_bits(),
                geom.mm_addr_bits(),
            ),
            mm_alloc: GridAllocator::new(
                MemoryId::MainMemory,
                geom.mm_height(),
                geom.mm_width(),
                geom.pool_size(),
            ),
            am: RmwMemory::new(
                MemoryId::AccumulatorMemory,
                geom.am_size(),
                geom.am_word_bits(),
                geom.am_addr_bits,
            ),
            am_alloc: SeqAllocator::new(MemoryId::AccumulatorMemory, geom.am_size()),
            tat0: StepMemory::new_1d(
                MemoryId::TagActionTable0,
                geom.tat_size(),
                geom.tat_word_bits(),
                geom.tag_bits,
            ),
            tat0_alloc: SeqAllocator::new(MemoryId::TagActionTable0, geom.tat_size()),
            tat1: StepMemory::new_1d(
                MemoryId::TagActionTable1,
                geom.tat_size(),
                geom.tat_word_bits(),
                geom.tag_bits,
            ),
            tat1_alloc: SeqAllocator::new(MemoryId::TagActionTable1, geom.tat_size()),
            pat: DirectMemory::new(MemoryId::PoolAddressTable, geom.nrn_pools(), geom.pat_word_bits()),
            pat_alloc: BitmapAllocator::new(geom.nrn_pools()),
            nrn_alloc: SeqAllocator::new(MemoryId::NeuronArray, geom.nrn_pools()),
        }
    }

    /// The geometry this core was built from.
    #[must_use]
    pub const fn geometry(&self) -> &ChipGeometry {
        &self.geom
    }

    /// One-way switch of the Main Memory allocator from decode to transform
    /// layout. The driver calls this exactly once, after every decode-mode
    /// resource has allocated and before any transform-mode resource does.
    pub fn switch_mm_to_transform_mode(&mut self) {
        self.mm_alloc.switch_to_transform();
    }

    /// Programming streams for the whole chip, in wire order: Pool-Address
    /// Table, combined Accumulator + Main Memory, then the Tag-Action Tables.
    ///
    /// # Errors
    ///
    /// Returns an error only on programmer error (a stored word wider than
    /// its memory's field, which `assign` already rejects).
    pub fn programming_streams(&self) -> Result<Vec<ProgrammingStream>> {
        let streams = vec![
            self.pat.programming_stream()?,
            self.am.programming_stream()?.concat(self.mm.programming_stream()?),
            self.tat0.programming_stream()?,
            self.tat1.programming_stream()?,
        ];
        info!(
            words = streams.iter().map(ProgrammingStream::len).sum::<usize>(),
            "programming streams emitted"
        );
        Ok(streams)
    }
}
