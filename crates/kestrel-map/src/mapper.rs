//! The mapping driver: runs the whole resource set through the phase
//! protocol against one [`Core`].
//!
//! Phases are barriers — every resource finishes a phase before any resource
//! starts the next — because allocation decisions depend on earlier phases
//! completing across the whole graph:
//!
//! 1. **pre-translate** — quantization, pool counts, tap slot counts.
//! 2. **early-allocate** — decode-mode Main Memory and Accumulator Memory.
//! 3. **allocate** — after the Main Memory mode switch: transform runs,
//!    Tag-Action entries, neuron pools + PAT slots, external sink tags.
//! 4. **post-translate** — packed entry contents that need targets' final
//!    addresses.
//! 5. **assign** — pure copy into the memories.
//!
//! Any failure is wrapped with the phase and resource it occurred in; phase
//! ordering mistakes are the most likely real-world failure mode, so the
//! context is half the diagnosis.

use kestrel_chip::layout::{entry_type, route};
use kestrel_chip::ChipGeometry;
use tracing::info;

use crate::alloc::MmMode;
use crate::bits;
use crate::core::Core;
use crate::error::{MapError, Result};
use crate::quant;
use crate::resource::{Resource, Sign, TapPoint};
use crate::network::Network;

const PRE_TRANSLATE: &str = "pre-translate";
const EARLY_ALLOCATE: &str = "early-allocate";
const ALLOCATE: &str = "allocate";
const POST_TRANSLATE: &str = "post-translate";
const ASSIGN: &str = "assign";

/// Totals from a completed mapping run.
#[derive(Debug, Clone)]
pub struct MapReport {
    /// Resources mapped, including materialized ones.
    pub resources: usize,
    /// Neuron array unit-pools claimed.
    pub pools: usize,
    /// Main Memory cells claimed.
    pub mm_cells: usize,
    /// Accumulator Memory entries claimed.
    pub am_entries: usize,
    /// TAT0 entries claimed.
    pub tat0_entries: usize,
    /// TAT1 entries claimed.
    pub tat1_entries: usize,
    /// External sink tags handed out.
    pub ext_tags: usize,
}

/// Per-run context. Owns the external tag counter so repeated runs never
/// leak state into each other.
struct MapRun {
    next_ext_tag: u64,
    ext_tag_limit: u64,
}

impl MapRun {
    fn new(geom: &ChipGeometry) -> Self {
        // External tags live one route step past the on-chip tag space.
        debug_assert_eq!(geom.ext_tag_base(), route::EXTERNAL << geom.tag_bits);
        Self {
            next_ext_tag: geom.ext_tag_base(),
            ext_tag_limit: 1 << geom.global_tag_bits(),
        }
    }

    fn alloc_ext_tag(&mut self, geom: &ChipGeometry) -> Result<u64> {
        if self.next_ext_tag >= self.ext_tag_limit {
            return Err(MapError::overflow(self.next_ext_tag, geom.global_tag_bits()));
        }
        let tag = self.next_ext_tag;
        self.next_ext_tag += 1;
        Ok(tag)
    }

    fn tags_used(&self, geom: &ChipGeometry) -> usize {
        usize::try_from(self.next_ext_tag - geom.ext_tag_base()).unwrap_or(0)
    }
}

/// Map `net` onto `core`. Consumes the network's freshness: a network maps
/// exactly once, and the core is specific to this run.
///
/// # Errors
///
/// Propagates the first failure, wrapped with the phase and resource that
/// triggered it. Allocation failure is fatal for the whole run.
pub fn map(net: &mut Network, core: &mut Core) -> Result<MapReport> {
    net.finalize()?;
    info!(resources = net.len(), "mapping run started");

    pre_translate(net, core)?;
    early_allocate(net, core)?;
    core.switch_mm_to_transform_mode();
    let mut run = MapRun::new(core.geometry());
    allocate(net, core, &mut run)?;
    post_translate(net, core)?;
    assign(net, core)?;

    let geom = core.geometry();
    let report = MapReport {
        resources: net.len(),
        pools: core.nrn_alloc.used(),
        mm_cells: core.mm_alloc.used(),
        am_entries: core.am_alloc.used(),
        tat0_entries: core.tat0_alloc.used(),
        tat1_entries: core.tat1_alloc.used(),
        ext_tags: run.tags_used(geom),
    };
    info!(
        pools = report.pools,
        mm_cells = report.mm_cells,
        am = report.am_entries,
        tat0 = report.tat0_entries,
        tat1 = report.tat1_entries,
        "mapping run complete"
    );
    Ok(report)
}

fn label(node: &Resource, index: usize) -> String {
    format!("{}#{index}", node.kind_name())
}

/// Phase 1: compute everything that needs no allocation.
fn pre_translate(net: &mut Network, core: &Core) -> Result<()> {
    info!(phase = PRE_TRANSLATE, "phase start");
    let geom = *core.geometry();
    let dim_limit = 1usize << geom.count_bits;

    for i in 0..net.nodes.len() {
        let node = &mut net.nodes[i];
        let name = label(node, i);
        let step = |node: &mut Resource| -> Result<()> {
            match node {
                Resource::Source(s) => check_dim_limit(s.dims, dim_limit),
                Resource::Sink(s) => check_dim_limit(s.dims, dim_limit),
                Resource::AccumulatorBuckets(b) => check_dim_limit(b.dims, dim_limit),
                Resource::Neurons(n) => {
                    check_dim_limit(n.count, dim_limit)?;
                    n.pools = n.count.div_ceil(geom.pool_size());
                    Ok(())
                }
                Resource::Weights(w) => {
                    w.quant = Some(quant::quantize(&w.matrix, geom.weight_max(), geom.thr_bits)?);
                    Ok(())
                }
                Resource::TatTapPoint(t) => {
                    for taps in &t.taps {
                        for tap in taps {
                            if tap.synapse >= 1 << geom.tap_bits {
                                return Err(MapError::overflow(tap.synapse, geom.tap_bits));
                            }
                        }
                    }
                    t.slots_per_dim = t
                        .taps
                        .iter()
                        .map(|taps| taps.len().div_ceil(2).max(1))
                        .max()
                        .unwrap_or(1);
                    Ok(())
                }
                Resource::TatAccumulator(_) | Resource::TatFanout(_) => Ok(()),
            }
        };
        step(node).map_err(|e| MapError::in_phase(PRE_TRANSLATE, name, e))?;
    }
    Ok(())
}

fn check_dim_limit(dims: usize, limit: usize) -> Result<()> {
    if dims >= limit {
        return Err(MapError::overflow(dims as u64, limit.trailing_zeros()));
    }
    Ok(())
}

/// Phase 2: decode-mode Main Memory and Accumulator Memory, before the
/// mode switch.
fn early_allocate(net: &mut Network, core: &mut Core) -> Result<()> {
    info!(phase = EARLY_ALLOCATE, "phase start");
    let pool_size = core.geometry().pool_size();

    for i in 0..net.nodes.len() {
        let node = &mut net.nodes[i];
        let name = label(node, i);
        let step = |node: &mut Resource, core: &mut Core| -> Result<()> {
            match node {
                Resource::Weights(w) if w.mode == Some(MmMode::Decode) => {
                    let chunks = w.matrix.cols().div_ceil(pool_size);
                    for _ in 0..chunks {
                        let origin = core.mm_alloc.alloc_decode_columns(w.matrix.rows())?;
                        w.decode_chunks.push(origin);
                    }
                    Ok(())
                }
                Resource::AccumulatorBuckets(b) => {
                    b.base = core.am_alloc.alloc(b.dims)?;
                    Ok(())
                }
                _ => Ok(()),
            }
        };
        step(node, core).map_err(|e| MapError::in_phase(EARLY_ALLOCATE, name, e))?;
    }
    Ok(())
}

/// Phase 3: everything else that claims space, after the mode switch.
fn allocate(net: &mut Network, core: &mut Core, run: &mut MapRun) -> Result<()> {
    info!(phase = ALLOCATE, "phase start");
    let geom = *core.geometry();

    for i in 0..net.nodes.len() {
        let targets_len = net.edges[i].len();
        let node = &mut net.nodes[i];
        let name = label(node, i);
        let step = |node: &mut Resource, core: &mut Core, run: &mut MapRun| -> Result<()> {
            match node {
                Resource::Weights(w) if w.mode == Some(MmMode::Transform) => {
                    for _ in 0..w.matrix.cols() {
                        w.transform_runs.push(core.mm_alloc.alloc_transform_row(w.matrix.rows())?);
                    }
                    Ok(())
                }
                Resource::TatAccumulator(t) => {
                    t.base = core.tat0_alloc.alloc(t.in_dims)?;
                    Ok(())
                }
                Resource::TatTapPoint(t) => {
                    t.base = core.tat0_alloc.alloc(t.taps.len() * t.slots_per_dim)?;
                    Ok(())
                }
                Resource::TatFanout(f) => {
                    f.base = core.tat1_alloc.alloc(f.dims * targets_len)?;
                    Ok(())
                }
                Resource::Neurons(n) => {
                    n.base_pool = core.nrn_alloc.alloc(n.pools)?;
                    // Direct-mapped PAT slots mirror the pool range.
                    if !core.pat_alloc.claim(n.base_pool, n.pools) {
                        return Err(MapError::capacity(
                            kestrel_chip::MemoryId::PoolAddressTable,
                            n.pools,
                            core.pat_alloc.free(),
                        ));
                    }
                    Ok(())
                }
                Resource::Sink(s) => {
                    for _ in 0..s.dims {
                        s.ext_tags.push(run.alloc_ext_tag(&geom)?);
                    }
                    Ok(())
                }
                _ => Ok(()),
            }
        };
        step(node, core, run).map_err(|e| MapError::in_phase(ALLOCATE, name, e))?;
    }
    Ok(())
}

/// What other resources need to know about a node after phase 3.
#[derive(Debug, Clone, Default)]
struct Snap {
    /// Global tag that reaches dimension `d` of this resource.
    in_tags: Vec<u64>,
    /// Buckets: first AM address.
    am_base: usize,
    /// Weights: per-dimension threshold indices.
    thr_idx: Vec<u64>,
    /// Weights (decode): per-pool block origins.
    decode_chunks: Vec<(usize, usize)>,
    /// Weights (transform): per-input-dimension flat runs.
    transform_runs: Vec<usize>,
    /// Weights: AM base of the downstream bucket group.
    target_am_base: usize,
}

fn snapshot(net: &Network, i: usize) -> Snap {
    let mut snap = Snap::default();
    match &net.nodes[i] {
        Resource::TatTapPoint(t) => {
            snap.in_tags = (0..t.taps.len())
                .map(|d| (t.base + d * t.slots_per_dim) as u64)
                .collect();
        }
        Resource::TatAccumulator(t) => {
            snap.in_tags = (0..t.in_dims).map(|d| (t.base + d) as u64).collect();
        }
        Resource::TatFanout(f) => {
            let per_dim = net.edges[i].len();
            snap.in_tags = (0..f.dims).map(|d| (f.base + d * per_dim) as u64).collect();
        }
        Resource::Sink(s) => {
            snap.in_tags = s.ext_tags.clone();
        }
        Resource::AccumulatorBuckets(b) => {
            snap.am_base = b.base;
        }
        Resource::Weights(w) => {
            if let Some(q) = &w.quant {
                snap.thr_idx = q.thr_idx.clone();
            }
            snap.decode_chunks = w.decode_chunks.clone();
            snap.transform_runs = w.transform_runs.clone();
            if let Some(&t) = net.edges[i].first() {
                if let Resource::AccumulatorBuckets(b) = &net.nodes[t] {
                    snap.target_am_base = b.base;
                }
            }
        }
        _ => {}
    }
    snap
}

/// Phase 4: packed entry contents that need targets' final addresses.
#[allow(clippy::too_many_lines)]
fn post_translate(net: &mut Network, core: &Core) -> Result<()> {
    info!(phase = POST_TRANSLATE, "phase start");
    let geom = *core.geometry();
    let snaps: Vec<Snap> = (0..net.nodes.len()).map(|i| snapshot(net, i)).collect();
    let upstream: Vec<Option<usize>> = (0..net.nodes.len()).map(|i| net.upstream_of(i)).collect();
    let targets: Vec<Vec<usize>> = net.edges.clone();

    for i in 0..net.nodes.len() {
        let node = &mut net.nodes[i];
        let name = label(node, i);
        let step = |node: &mut Resource| -> Result<()> {
            match node {
                Resource::Source(s) => {
                    // A source's output tags are its target's input addresses.
                    s.out_tags = snaps[targets[i][0]].in_tags.clone();
                    Ok(())
                }
                Resource::AccumulatorBuckets(b) => {
                    let thr = upstream[i]
                        .map(|u| snaps[u].thr_idx.clone())
                        .filter(|t| !t.is_empty())
                        .unwrap_or_else(|| vec![0; b.dims]);
                    // Terminal buckets accumulate but never route.
                    let next = targets[i]
                        .first()
                        .map_or(&[][..], |&t| snaps[t].in_tags.as_slice());
                    for d in 0..b.dims {
                        let stop = u64::from(d == b.dims - 1);
                        b.entries.push(bits::pack(&[
                            (0, geom.am_val_bits),
                            (thr[d], geom.thr_bits),
                            (stop, 1),
                            (next.get(d).copied().unwrap_or(0), geom.global_tag_bits()),
                        ])?);
                    }
                    Ok(())
                }
                Resource::TatAccumulator(t) => {
                    let w = &snaps[targets[i][0]];
                    for d in 0..t.in_dims {
                        let run = w.transform_runs[d];
                        let (row, col) = (run / geom.mm_width(), run % geom.mm_width());
                        t.entries.push(bits::pack(&[
                            (1, 1), // one entry per incoming tag: always stop
                            (entry_type::ACCUMULATOR, 2),
                            (w.target_am_base as u64, geom.am_addr_bits),
                            (col as u64, geom.mm_x_bits),
                            (row as u64, geom.mm_y_bits),
                        ])?);
                    }
                    Ok(())
                }
                Resource::TatTapPoint(t) => {
                    let pad = TapPoint { synapse: 0, sign: Sign::Excitatory };
                    for taps in &t.taps {
                        for slot in 0..t.slots_per_dim {
                            let a = taps.get(2 * slot).copied().unwrap_or(pad);
                            let b = taps.get(2 * slot + 1).copied().unwrap_or(pad);
                            let stop = u64::from(slot == t.slots_per_dim - 1);
                            t.entries.push(bits::pack(&[
                                (stop, 1),
                                (entry_type::NEURON, 2),
                                (a.synapse, geom.tap_bits),
                                (a.sign.encode(), 1),
                                (b.synapse, geom.tap_bits),
                                (b.sign.encode(), 1),
                            ])?);
                        }
                    }
                    Ok(())
                }
                Resource::TatFanout(f) => {
                    let tag_mask = (1u64 << geom.tag_bits) - 1;
                    for d in 0..f.dims {
                        for (t_idx, &t) in targets[i].iter().enumerate() {
                            let global = snaps[t].in_tags[d];
                            let stop = u64::from(t_idx == targets[i].len() - 1);
                            f.entries.push(bits::pack(&[
                                (stop, 1),
                                (entry_type::FANOUT, 2),
                                (global & tag_mask, geom.tag_bits),
                                (global >> geom.tag_bits, geom.global_route_bits),
                            ])?);
                        }
                    }
                    Ok(())
                }
                Resource::Neurons(n) => {
                    let w = &snaps[targets[i][0]];
                    for p in 0..n.pools {
                        let (row, col) = w.decode_chunks[p];
                        n.pat_entries.push(bits::pack(&[
                            (w.target_am_base as u64, geom.am_addr_bits),
                            (col as u64, geom.mm_x_bits),
                            ((row / geom.pool_size()) as u64, geom.mm_y_bits - geom.pool_bits),
                        ])?);
                    }
                    Ok(())
                }
                Resource::Sink(_) | Resource::Weights(_) => Ok(()),
            }
        };
        step(node).map_err(|e| MapError::in_phase(POST_TRANSLATE, name, e))?;
    }
    Ok(())
}

/// Phase 5: pure copy of already-computed contents into already-claimed
/// locations. Fails only on programmer error.
fn assign(net: &mut Network, core: &mut Core) -> Result<()> {
    info!(phase = ASSIGN, "phase start");
    let geom = *core.geometry();

    for i in 0..net.nodes.len() {
        let node = &mut net.nodes[i];
        let name = label(node, i);
        let step = |node: &mut Resource, core: &mut Core| -> Result<()> {
            match node {
                Resource::Neurons(n) => core.pat.assign_1d(&n.pat_entries, n.base_pool),
                Resource::AccumulatorBuckets(b) => core.am.assign_1d(&b.entries, b.base),
                Resource::TatAccumulator(t) => core.tat0.assign_1d(&t.entries, t.base),
                Resource::TatTapPoint(t) => core.tat0.assign_1d(&t.entries, t.base),
                Resource::TatFanout(f) => core.tat1.assign_1d(&f.entries, f.base),
                Resource::Weights(w) => {
                    let q = w.quant.as_ref().expect("quantized in pre-translate");
                    match w.mode {
                        Some(MmMode::Decode) => {
                            let pool_size = geom.pool_size();
                            for (p, &(row, col)) in w.decode_chunks.iter().enumerate() {
                                let first = p * pool_size;
                                let rows_used = pool_size.min(w.matrix.cols() - first);
                                let mut block = Vec::with_capacity(rows_used);
                                for n in 0..rows_used {
                                    let mut line = Vec::with_capacity(w.matrix.rows());
                                    for o in 0..w.matrix.rows() {
                                        line.push(bits::to_ones_complement(
                                            q.get(o, first + n),
                                            geom.weight_bits,
                                        )?);
                                    }
                                    block.push(line);
                                }
                                core.mm.assign_2d(&block, row, col)?;
                            }
                            Ok(())
                        }
                        Some(MmMode::Transform) => {
                            for (j, &run) in w.transform_runs.iter().enumerate() {
                                let mut values = Vec::with_capacity(w.matrix.rows());
                                for o in 0..w.matrix.rows() {
                                    values.push(bits::to_ones_complement(
                                        q.get(o, j),
                                        geom.weight_bits,
                                    )?);
                                }
                                core.mm.assign_1d(&values, run)?;
                            }
                            Ok(())
                        }
                        None => Ok(()),
                    }
                }
                Resource::Source(_) | Resource::Sink(_) => Ok(()),
            }
        };
        step(node, core).map_err(|e| MapError::in_phase(ASSIGN, name, e))?;
    }
    Ok(())
}
