//! Read-back verification.
//!
//! The transport layer (out of scope here) can read a programmed memory back
//! as an ordered word list; this module compares such a list against the
//! contents the engine computed. The engine's job ends at producing the
//! expected words — how they were fetched is the harness's business.

use kestrel_chip::MemoryId;

use crate::core::Core;
use crate::error::{MapError, Result};

/// The words the engine expects `memory` to hold after programming.
///
/// The neuron array holds no programmable words; its slice is empty.
#[must_use]
pub fn expected_words(core: &Core, memory: MemoryId) -> &[u64] {
    match memory {
        MemoryId::PoolAddressTable => core.pat.words(),
        MemoryId::AccumulatorMemory => core.am.words(),
        MemoryId::MainMemory => core.mm.words(),
        MemoryId::TagActionTable0 => core.tat0.words(),
        MemoryId::TagActionTable1 => core.tat1.words(),
        MemoryId::NeuronArray => &[],
    }
}

/// Compare a read-back word list against the engine's computed contents.
///
/// # Errors
///
/// Returns [`MapError::ReadbackMismatch`] naming the first differing
/// address; a short read mismatches at the first missing address.
pub fn check_readback(core: &Core, memory: MemoryId, readback: &[u64]) -> Result<()> {
    let expected = expected_words(core, memory);
    for (addr, &want) in expected.iter().enumerate() {
        let got = readback.get(addr).copied();
        if got != Some(want) {
            return Err(MapError::ReadbackMismatch {
                memory,
                addr,
                expected: want,
                got: got.unwrap_or(0),
            });
        }
    }
    Ok(())
}
