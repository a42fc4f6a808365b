//! Chip geometry parameters and derived field widths.
//!
//! The K1 exposes five programmable memories plus the neuron array. Every
//! sub-width the configuration bus uses — Tag-Action word width, Accumulator
//! word width, Pool-Address word width — is derived from the thirteen base
//! widths below via max/sum formulas, never stated independently. A derived
//! word is always wide enough to hold each variant's packed payload plus its
//! 1-bit stop flag and 2-bit entry type tag.
//!
//! ## Memory map
//!
//! | Memory | Shape | Word | Addressing |
//! |--------|-------|------|------------|
//! | Main Memory (MM) | `2^mm_y × 2^mm_x` | `weight_bits` | stepped |
//! | Accumulator Memory (AM) | `2^am_addr` | [`am_word_bits`](ChipGeometry::am_word_bits) | read-modify-write |
//! | Tag-Action Table 0/1 (TAT) | `2^tag` each | [`tat_word_bits`](ChipGeometry::tat_word_bits) | stepped |
//! | Pool-Address Table (PAT) | one per unit-pool | [`pat_word_bits`](ChipGeometry::pat_word_bits) | direct |
//! | Neuron array | `2^nrn_y × 2^nrn_x` | — | pool units |

/// Base bit widths of every hardware field, loaded once per chip.
///
/// Array extents are powers of two of the corresponding width, so the
/// geometry is fully described by widths alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipGeometry {
    /// Tag identifier width (addresses one Tag-Action Table).
    pub tag_bits: u32,
    /// Global route width (selects table / external destination).
    pub global_route_bits: u32,
    /// Count field width (bounds per-resource dimensionality).
    pub count_bits: u32,
    /// Tap-point synapse address width.
    pub tap_bits: u32,
    /// Neuron array Y address width.
    pub nrn_y_bits: u32,
    /// Neuron array X address width.
    pub nrn_x_bits: u32,
    /// Pool-size width; one unit-pool holds `2^pool_bits` neurons.
    pub pool_bits: u32,
    /// Accumulator Memory address width.
    pub am_addr_bits: u32,
    /// Main Memory row address width.
    pub mm_y_bits: u32,
    /// Main Memory column address width.
    pub mm_x_bits: u32,
    /// Signed weight field width.
    pub weight_bits: u32,
    /// Accumulator running-value field width.
    pub am_val_bits: u32,
    /// Accumulator threshold index width.
    pub thr_bits: u32,
}

impl ChipGeometry {
    /// K1 production geometry (4,096 neurons, 1024×64 Main Memory).
    pub const K1: Self = Self {
        tag_bits:          11,
        global_route_bits: 4,
        count_bits:        10,
        tap_bits:          12,
        nrn_y_bits:        6,
        nrn_x_bits:        6,
        pool_bits:         4,
        am_addr_bits:      10,
        mm_y_bits:         10,
        mm_x_bits:         6,
        weight_bits:       8,
        am_val_bits:       15,
        thr_bits:          3,
    };

    // ── Array extents ────────────────────────────────────────────────────────

    /// Neurons per unit-pool; also the Main-Memory decode band height.
    #[must_use]
    pub const fn pool_size(&self) -> usize {
        1 << self.pool_bits
    }

    /// Total neurons in the array.
    #[must_use]
    pub const fn nrn_count(&self) -> usize {
        1 << (self.nrn_y_bits + self.nrn_x_bits)
    }

    /// Neuron array capacity in unit-pools; also the Pool-Address Table size.
    #[must_use]
    pub const fn nrn_pools(&self) -> usize {
        self.nrn_count() / self.pool_size()
    }

    /// Main Memory rows.
    #[must_use]
    pub const fn mm_height(&self) -> usize {
        1 << self.mm_y_bits
    }

    /// Main Memory columns.
    #[must_use]
    pub const fn mm_width(&self) -> usize {
        1 << self.mm_x_bits
    }

    /// Accumulator Memory entries.
    #[must_use]
    pub const fn am_size(&self) -> usize {
        1 << self.am_addr_bits
    }

    /// Entries per Tag-Action Table.
    #[must_use]
    pub const fn tat_size(&self) -> usize {
        1 << self.tag_bits
    }

    // ── Derived word widths ──────────────────────────────────────────────────

    /// Accumulator-target payload: AM address + MM row/column address.
    #[must_use]
    pub const fn tat_acc_payload_bits(&self) -> u32 {
        self.am_addr_bits + self.mm_y_bits + self.mm_x_bits
    }

    /// Neuron-tap payload: two (synapse address, sign) pairs per slot.
    #[must_use]
    pub const fn tat_nrn_payload_bits(&self) -> u32 {
        2 * (self.tap_bits + 1)
    }

    /// Fan-out payload: tag + global route.
    #[must_use]
    pub const fn tat_fanout_payload_bits(&self) -> u32 {
        self.tag_bits + self.global_route_bits
    }

    /// Tag-Action word: stop bit, type tag, widest payload variant.
    #[must_use]
    pub const fn tat_word_bits(&self) -> u32 {
        let mut w = self.tat_acc_payload_bits();
        if self.tat_nrn_payload_bits() > w {
            w = self.tat_nrn_payload_bits();
        }
        if self.tat_fanout_payload_bits() > w {
            w = self.tat_fanout_payload_bits();
        }
        1 + 2 + w
    }

    /// Global tag width: local tag plus route bits. AM next-address pointers
    /// and external sink tags are global tags.
    #[must_use]
    pub const fn global_tag_bits(&self) -> u32 {
        self.tag_bits + self.global_route_bits
    }

    /// Accumulator word: running value, threshold index, stop, next address.
    #[must_use]
    pub const fn am_word_bits(&self) -> u32 {
        self.am_val_bits + self.thr_bits + 1 + self.global_tag_bits()
    }

    /// Pool-Address word: AM address, MM column base, MM row high bits.
    /// Row low bits are implied by the neuron's index within its pool.
    #[must_use]
    pub const fn pat_word_bits(&self) -> u32 {
        self.am_addr_bits + self.mm_x_bits + (self.mm_y_bits - self.pool_bits)
    }

    /// Main Memory word: one signed weight.
    #[must_use]
    pub const fn mm_word_bits(&self) -> u32 {
        self.weight_bits
    }

    /// Flat Main Memory address width.
    #[must_use]
    pub const fn mm_addr_bits(&self) -> u32 {
        self.mm_y_bits + self.mm_x_bits
    }

    /// Largest representable weight magnitude (sign-magnitude field).
    #[must_use]
    pub const fn weight_max(&self) -> u64 {
        (1 << (self.weight_bits - 1)) - 1
    }

    /// First external tag value: one past the on-chip tag space, so external
    /// tags always carry a nonzero route.
    #[must_use]
    pub const fn ext_tag_base(&self) -> u64 {
        1 << self.tag_bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn k1_extents() {
        let g = ChipGeometry::K1;
        assert_eq!(g.nrn_count(), 4096);
        assert_eq!(g.pool_size(), 16);
        assert_eq!(g.nrn_pools(), 256);
        assert_eq!(g.mm_height(), 1024);
        assert_eq!(g.mm_width(), 64);
        assert_eq!(g.am_size(), 1024);
        assert_eq!(g.tat_size(), 2048);
    }

    #[test]
    fn derived_word_holds_every_variant() {
        let g = ChipGeometry::K1;
        // Every payload plus stop and type must fit the derived word.
        assert!(g.tat_word_bits() >= 3 + g.tat_acc_payload_bits());
        assert!(g.tat_word_bits() >= 3 + g.tat_nrn_payload_bits());
        assert!(g.tat_word_bits() >= 3 + g.tat_fanout_payload_bits());
    }

    #[test]
    fn k1_word_widths() {
        let g = ChipGeometry::K1;
        assert_eq!(g.tat_acc_payload_bits(), 26);
        assert_eq!(g.tat_nrn_payload_bits(), 26);
        assert_eq!(g.tat_fanout_payload_bits(), 15);
        assert_eq!(g.tat_word_bits(), 29);
        assert_eq!(g.am_word_bits(), 34);
        assert_eq!(g.pat_word_bits(), 22);
    }

    #[test]
    fn pat_row_high_bits_cover_band_index() {
        let g = ChipGeometry::K1;
        // Band index range = mm_height / pool_size must fit the high-bit field.
        let bands = g.mm_height() / g.pool_size();
        assert_eq!(1 << (g.mm_y_bits - g.pool_bits), bands);
    }
}
