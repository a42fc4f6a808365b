//! Silicon model for the Kestrel K1 neuromorphic core.
//!
//! This crate has **no dependencies** and **no hardware access** — it is a
//! pure model of the silicon: memory geometry, derived field widths, the
//! per-memory word layouts, and the configuration-bus opcode set.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`geometry`] | Chip geometry parameters and every width derived from them |
//! | [`layout`] | Config-bus opcodes, Tag-Action entry type tags, memory identifiers |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod geometry;
pub mod layout;

pub use geometry::ChipGeometry;
pub use layout::MemoryId;
