//! The resource graph: the units being mapped onto the chip.
//!
//! Resources form a directed graph mirroring the user's network topology.
//! Each variant carries the data its lifecycle phases produce; a field is
//! valid from the phase noted on it onward. The closed enum replaces the
//! original implementation's duck-typed phase dispatch: the mapping driver
//! matches over the variant set, and a variant with nothing to do in a phase
//! simply has no arm there.

use crate::alloc::MmMode;
use crate::quant::{QuantizedWeights, WeightMatrix};

/// Index of a resource within its [`Network`](crate::network::Network).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(pub(crate) usize);

/// Tap polarity: which sign the decoded value is injected with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    /// Positive injection.
    Excitatory,
    /// Negative injection.
    Inhibitory,
}

impl Sign {
    /// One-bit wire encoding.
    #[must_use]
    pub const fn encode(self) -> u64 {
        match self {
            Self::Excitatory => 0,
            Self::Inhibitory => 1,
        }
    }
}

/// A (synapse address, sign) pair describing one injection point.
#[derive(Debug, Clone, Copy)]
pub struct TapPoint {
    /// Synapse address within the neuron array.
    pub synapse: u64,
    /// Injection polarity.
    pub sign: Sign,
}

/// Pure input boundary: tags enter the chip here.
#[derive(Debug)]
pub struct Source {
    /// Dimensions this source drives.
    pub dims: usize,
    /// Global tag to send per dimension; valid after post-translate.
    pub out_tags: Vec<u64>,
}

/// Pure output boundary: claims process-unique external tags.
#[derive(Debug)]
pub struct Sink {
    /// Dimensions this sink receives.
    pub dims: usize,
    /// External global tags, increasing; valid after allocate.
    pub ext_tags: Vec<u64>,
}

/// A block of neurons, claimed from the array in whole unit-pools.
#[derive(Debug)]
pub struct Neurons {
    /// Neuron count requested.
    pub count: usize,
    /// Unit-pools needed; valid after pre-translate.
    pub pools: usize,
    /// First pool index; valid after allocate.
    pub base_pool: usize,
    /// Packed Pool-Address Table entries; valid after post-translate.
    pub pat_entries: Vec<u64>,
}

/// A weighted connection, laid out in Main Memory.
#[derive(Debug)]
pub struct Weights {
    /// The real-valued matrix: output dimensions × input units.
    pub matrix: WeightMatrix,
    /// Layout mode, resolved from the upstream kind at graph finalization.
    pub mode: Option<MmMode>,
    /// Quantized values and per-dimension thresholds; valid after pre-translate.
    pub quant: Option<QuantizedWeights>,
    /// Per-pool `(row, col)` block origins; decode mode, valid after early-allocate.
    pub decode_chunks: Vec<(usize, usize)>,
    /// Per-input-dimension flat run offsets; transform mode, valid after allocate.
    pub transform_runs: Vec<usize>,
}

/// A group of accumulator buckets, one Accumulator Memory slot per dimension.
#[derive(Debug)]
pub struct AccumulatorBuckets {
    /// Dimensions (= AM slots claimed).
    pub dims: usize,
    /// First AM address; valid after early-allocate.
    pub base: usize,
    /// Packed AM entries; valid after post-translate.
    pub entries: Vec<u64>,
}

/// Accumulator-target Tag-Action entries: one per input dimension of a
/// transform-mode weight block. Materialized by graph finalization, never
/// created directly.
#[derive(Debug)]
pub struct TatAccumulator {
    /// Input dimensions (= TAT0 entries claimed).
    pub in_dims: usize,
    /// First TAT0 address; valid after allocate.
    pub base: usize,
    /// Packed entries; valid after post-translate.
    pub entries: Vec<u64>,
}

/// Neuron-tap Tag-Action entries: each physical slot carries two logical
/// (synapse, sign) pairs.
#[derive(Debug)]
pub struct TatTapPoint {
    /// Tap lists, one per input dimension.
    pub taps: Vec<Vec<TapPoint>>,
    /// Physical slots per dimension (uniform stride); valid after pre-translate.
    pub slots_per_dim: usize,
    /// First TAT0 address; valid after allocate.
    pub base: usize,
    /// Packed entries; valid after post-translate.
    pub entries: Vec<u64>,
}

/// Fan-out Tag-Action entries: one per (dimension, target). Materialized by
/// graph finalization for any fan-capable resource with several targets.
#[derive(Debug)]
pub struct TatFanout {
    /// Upstream dimensions.
    pub dims: usize,
    /// First TAT1 address; valid after allocate.
    pub base: usize,
    /// Packed entries, grouped per dimension; valid after post-translate.
    pub entries: Vec<u64>,
}

/// The closed set of mappable resource variants.
#[derive(Debug)]
pub enum Resource {
    /// Input boundary.
    Source(Source),
    /// Output boundary.
    Sink(Sink),
    /// Neuron pool block.
    Neurons(Neurons),
    /// Weight matrix.
    Weights(Weights),
    /// Accumulator bucket group.
    AccumulatorBuckets(AccumulatorBuckets),
    /// Accumulator-target table entries (materialized).
    TatAccumulator(TatAccumulator),
    /// Neuron-tap table entries.
    TatTapPoint(TatTapPoint),
    /// Fan-out table entries (materialized).
    TatFanout(TatFanout),
}

impl Resource {
    /// Variant name for errors and logs.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Source(_) => "Source",
            Self::Sink(_) => "Sink",
            Self::Neurons(_) => "Neurons",
            Self::Weights(_) => "Weights",
            Self::AccumulatorBuckets(_) => "AccumulatorBuckets",
            Self::TatAccumulator(_) => "TatAccumulator",
            Self::TatTapPoint(_) => "TatTapPoint",
            Self::TatFanout(_) => "TatFanout",
        }
    }

    /// Whether the fan-out policy lets this resource drive several targets
    /// (through a materialized [`TatFanout`]).
    #[must_use]
    pub const fn can_fan_out(&self) -> bool {
        matches!(self, Self::Source(_) | Self::AccumulatorBuckets(_))
    }

    /// Dimensions this resource presents to a downstream consumer.
    #[must_use]
    pub fn out_dims(&self) -> usize {
        match self {
            Self::Source(s) => s.dims,
            Self::Sink(s) => s.dims,
            Self::Neurons(n) => n.count,
            Self::Weights(w) => w.matrix.rows(),
            Self::AccumulatorBuckets(b) => b.dims,
            Self::TatAccumulator(t) => t.in_dims,
            Self::TatTapPoint(t) => t.taps.len(),
            Self::TatFanout(f) => f.dims,
        }
    }
}
