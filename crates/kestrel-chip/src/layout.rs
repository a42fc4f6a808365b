//! Configuration-bus word layout: opcodes, entry type tags, memory ids.
//!
//! Every programming word is `{opcode, payload}` packed least-significant
//! field first. Stepped memories auto-increment their address latch after a
//! write, so a range programs as one address-setup word followed by one write
//! word per entry. The Accumulator Memory only supports accumulate semantics
//! and needs a three-word sequence per entry (setup, write, increment). The
//! Pool-Address Table has no address field at all — entries stream in index
//! order.

/// Configuration-bus opcodes (2 bits, low end of every programming word).
pub mod opcode {
    /// Opcode field width.
    pub const OP_BITS: u32 = 2;
    /// Latch the payload as the current address.
    pub const SET_ADDRESS: u64 = 0;
    /// Write the payload at the current address, then auto-increment.
    pub const WRITE: u64 = 1;
    /// Commit the pending read-modify-write cycle.
    pub const INCREMENT: u64 = 2;
    /// Read back the word at the current address.
    pub const READ: u64 = 3;
}

/// Tag-Action entry type tags (2 bits, packed after the stop bit).
pub mod entry_type {
    /// Accumulator-target entry: AM address + MM row/column.
    pub const ACCUMULATOR: u64 = 0;
    /// Neuron-tap entry: two (synapse address, sign) pairs.
    pub const NEURON: u64 = 1;
    /// Fan-out entry: tag + global route.
    pub const FANOUT: u64 = 2;
}

/// Global route values.
pub mod route {
    /// Tag resolves on-chip.
    pub const INTERNAL: u64 = 0;
    /// Tag leaves the chip for the host.
    pub const EXTERNAL: u64 = 1;
}

/// Direct-memory write flag width (Pool-Address Table words).
pub const WRITE_FLAG_BITS: u32 = 1;

/// The five programmable memories, in programming-stream order, plus the
/// neuron array (allocatable in pool units but not programmed over the bus).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryId {
    /// Pool-Address Table.
    PoolAddressTable,
    /// Accumulator Memory.
    AccumulatorMemory,
    /// Main Memory weight table.
    MainMemory,
    /// Tag-Action Table 0 (input side: accumulator-target and neuron-tap).
    TagActionTable0,
    /// Tag-Action Table 1 (output side: fan-out).
    TagActionTable1,
    /// Neuron array, allocated in unit-pools.
    NeuronArray,
}

impl MemoryId {
    /// Short name used in errors, dumps, and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PoolAddressTable  => "PAT",
            Self::AccumulatorMemory => "AM",
            Self::MainMemory        => "MM",
            Self::TagActionTable0   => "TAT0",
            Self::TagActionTable1   => "TAT1",
            Self::NeuronArray       => "NRN",
        }
    }
}

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcodes_fit_field() {
        for op in [opcode::SET_ADDRESS, opcode::WRITE, opcode::INCREMENT, opcode::READ] {
            assert!(op < (1 << opcode::OP_BITS));
        }
    }

    #[test]
    fn entry_types_fit_two_bits() {
        assert!(entry_type::ACCUMULATOR < 4);
        assert!(entry_type::NEURON < 4);
        assert!(entry_type::FANOUT < 4);
    }

    #[test]
    fn memory_names() {
        assert_eq!(MemoryId::MainMemory.name(), "MM");
        assert_eq!(MemoryId::PoolAddressTable.to_string(), "PAT");
    }
}
