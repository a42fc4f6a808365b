//! Resource-to-hardware mapping engine for the Kestrel K1.
//!
//! Takes an abstract network graph — neuron pools, weighted connections,
//! accumulator buckets, fan-outs, sources and sinks — and packs it into the
//! K1's fixed-size, fixed-width on-chip memories, producing exact bit-packed
//! programming streams for the configuration bus.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`bits`] | Fixed-width field packing, sign-magnitude helpers |
//! | [`memory`] | Memory models and their wire protocols |
//! | [`alloc`] | Bitmap, sequential, and grid allocators |
//! | [`core`] | The allocation arena derived from chip geometry |
//! | [`quant`] | Weight matrices and power-of-two quantization |
//! | [`resource`] | The mappable resource variants |
//! | [`network`] | Graph builder with eager validation |
//! | [`mapper`] | The phase-ordered mapping driver |
//! | [`dump`] | Pipe-delimited human-readable dumps |
//! | [`verify`] | Read-back comparison |
//!
//! # Quick start
//!
//! ```
//! use kestrel_chip::ChipGeometry;
//! use kestrel_map::{map, Core, Network, WeightMatrix};
//!
//! # fn main() -> kestrel_map::Result<()> {
//! let mut net = Network::new();
//! let nrn = net.add_neurons(64);
//! let w = net.add_weights(WeightMatrix::constant(2, 64, 0.05));
//! let acc = net.add_buckets(2);
//! let out = net.add_sink(2);
//! net.connect(nrn, w)?;
//! net.connect(w, acc)?;
//! net.connect(acc, out)?;
//!
//! let mut core = Core::new(ChipGeometry::K1);
//! let report = map(&mut net, &mut core)?;
//! assert_eq!(report.pools, 4);
//!
//! let streams = core.programming_streams()?;
//! assert_eq!(streams.len(), 4);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]

pub mod alloc;
pub mod bits;
pub mod core;
pub mod dump;
pub mod error;
pub mod mapper;
pub mod memory;
pub mod network;
pub mod quant;
pub mod resource;
pub mod verify;

pub use crate::core::Core;
pub use alloc::{BitmapAllocator, GridAllocator, MmMode, SeqAllocator};
pub use error::{MapError, Result};
pub use mapper::{map, MapReport};
pub use memory::{DirectMemory, ProgrammingStream, RmwMemory, StepMemory};
pub use network::Network;
pub use quant::{quantize, QuantizedWeights, WeightMatrix};
pub use resource::{Resource, ResourceId, Sign, TapPoint};
