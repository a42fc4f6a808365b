//! Error types for mapping operations.

use kestrel_chip::MemoryId;
use thiserror::Error;

/// Result type alias for mapping operations.
pub type Result<T> = std::result::Result<T, MapError>;

/// Errors that can occur while mapping a network onto a chip.
///
/// Every variant is fatal for the whole mapping run — there is no partial
/// mapping and no automatic retry. Retrying with a smaller network is a
/// caller decision.
#[derive(Debug, Error)]
pub enum MapError {
    /// An allocator could not satisfy a request.
    #[error("{memory} capacity exceeded: requested {requested}, available {available}")]
    CapacityExceeded {
        /// Memory that ran out of space.
        memory: MemoryId,
        /// Units requested (words, cells, or pool units).
        requested: usize,
        /// Units still free.
        available: usize,
    },

    /// Two resources are connected but are not a permitted pair.
    #[error("cannot connect {from} to {to}")]
    ConnectionType {
        /// Kind of the source endpoint.
        from: &'static str,
        /// Kind of the destination endpoint.
        to: &'static str,
    },

    /// A resource has more outgoing connections than its fan-out policy allows.
    #[error("{resource} has {targets} outgoing connections but cannot fan out")]
    FanoutViolation {
        /// Offending resource.
        resource: String,
        /// Number of outgoing connections.
        targets: usize,
    },

    /// Two connected resources agree in kind but not in dimensionality.
    #[error("dimension mismatch on {from} -> {to}: {from} provides {provided}, {to} expects {expected}")]
    DimensionMismatch {
        /// Kind of the source endpoint.
        from: &'static str,
        /// Kind of the destination endpoint.
        to: &'static str,
        /// Dimensions the source provides.
        provided: usize,
        /// Dimensions the destination expects.
        expected: usize,
    },

    /// A field value exceeds its declared bit width.
    #[error("value {value:#x} does not fit a {width}-bit field")]
    Overflow {
        /// Value that overflowed.
        value: u64,
        /// Declared field width.
        width: u32,
    },

    /// Combined packed width exceeds the safe machine-word ceiling.
    #[error("packed width {total} bits exceeds the {max}-bit ceiling")]
    PackTooWide {
        /// Sum of requested field widths.
        total: u32,
        /// Ceiling (63).
        max: u32,
    },

    /// A decode-mode Main Memory request arrived after the transform switch.
    #[error("Main Memory is in transform mode; decode allocation is no longer permitted")]
    ModeViolation,

    /// Read-back verification found a word that differs from the computed contents.
    #[error("{memory} readback mismatch at {addr}: expected {expected:#x}, got {got:#x}")]
    ReadbackMismatch {
        /// Memory that was read back.
        memory: MemoryId,
        /// Entry address of the first mismatch.
        addr: usize,
        /// Word the engine computed.
        expected: u64,
        /// Word the chip returned.
        got: u64,
    },

    /// Context wrapper: which phase and resource a failure occurred in.
    #[error("mapping failed in {phase} phase at {resource}: {source}")]
    Phase {
        /// Phase that was executing.
        phase: &'static str,
        /// Resource being processed.
        resource: String,
        /// Underlying failure.
        #[source]
        source: Box<MapError>,
    },
}

impl MapError {
    /// Create a capacity-exceeded error.
    pub const fn capacity(memory: MemoryId, requested: usize, available: usize) -> Self {
        Self::CapacityExceeded {
            memory,
            requested,
            available,
        }
    }

    /// Create a field-overflow error.
    pub const fn overflow(value: u64, width: u32) -> Self {
        Self::Overflow { value, width }
    }

    /// Wrap an error with the phase and resource it occurred in.
    pub fn in_phase(phase: &'static str, resource: impl Into<String>, source: Self) -> Self {
        Self::Phase {
            phase,
            resource: resource.into(),
            source: Box::new(source),
        }
    }
}
