//! End-to-end mapping scenarios against a small test geometry.

use kestrel_chip::{ChipGeometry, MemoryId};
use kestrel_map::{bits, map, verify, Core, MapError, Network, Resource, Sign, TapPoint, WeightMatrix};

/// Small geometry: 64 neurons in pools of 4, 16×16 Main Memory, 16-entry
/// Accumulator Memory, 64-entry Tag-Action Tables.
const MINI: ChipGeometry = ChipGeometry {
    tag_bits:          6,
    global_route_bits: 2,
    count_bits:        8,
    tap_bits:          6,
    nrn_y_bits:        4,
    nrn_x_bits:        2,
    pool_bits:         2,
    am_addr_bits:      4,
    mm_y_bits:         4,
    mm_x_bits:         4,
    weight_bits:       8,
    am_val_bits:       10,
    thr_bits:          3,
};

/// Scenario A: a decoded pool chain, Neurons -> Weights -> Buckets.
#[test]
fn decode_chain_lands_pools_chunks_and_buckets() {
    let mut net = Network::new();
    let nrn = net.add_neurons(40);
    // Row 0 all 0.5, row 1 all -0.25.
    let mut data = vec![0.5; 40];
    data.extend(vec![-0.25; 40]);
    let w = net.add_weights(WeightMatrix::new(2, 40, data));
    let acc = net.add_buckets(2);
    net.connect(nrn, w).unwrap();
    net.connect(w, acc).unwrap();

    let mut core = Core::new(MINI);
    let report = map(&mut net, &mut core).unwrap();

    // 40 neurons in pools of 4.
    assert_eq!(report.pools, 10);
    // 10 decode chunks of 4 rows × 2 columns.
    assert_eq!(report.mm_cells, 80);
    assert_eq!(report.am_entries, 2);

    // Chunks pack 8 per band (16 columns / width 2), then wrap.
    let Resource::Weights(w) = net.node(w) else { panic!() };
    assert_eq!(w.decode_chunks.len(), 10);
    assert_eq!(w.decode_chunks[0], (0, 0));
    assert_eq!(w.decode_chunks[1], (0, 2));
    assert_eq!(w.decode_chunks[7], (0, 14));
    assert_eq!(w.decode_chunks[8], (4, 0));
    assert_eq!(w.decode_chunks[9], (4, 2));

    // Both rows peak at 0.5 and 0.25: threshold saturates at index 7,
    // so 0.5 quantizes to 64 and -0.25 to -32.
    let q = w.quant.as_ref().unwrap();
    assert_eq!(q.thr_idx, vec![7, 7]);
    assert_eq!(q.get(0, 0), 64);
    assert_eq!(q.get(1, 0), -32);

    // Main Memory: each pool block is (neuron row, dimension column).
    let mm = core.mm.words();
    let width = MINI.mm_width();
    assert_eq!(mm[0], 64, "pool 0, neuron 0, dim 0");
    assert_eq!(
        bits::from_ones_complement(mm[1], MINI.weight_bits),
        -32,
        "pool 0, neuron 0, dim 1"
    );
    assert_eq!(mm[4 * width], 64, "pool 8 starts a new band at (4, 0)");

    // AM entries: stop only on the last dimension, next address zero
    // (terminal buckets), threshold index 7.
    let Resource::AccumulatorBuckets(acc) = net.node(acc) else { panic!() };
    let widths = [MINI.am_val_bits, MINI.thr_bits, 1, MINI.global_tag_bits()];
    let (f0, _) = bits::unpack(acc.entries[0], &widths).unwrap();
    let (f1, _) = bits::unpack(acc.entries[1], &widths).unwrap();
    assert_eq!(f0, vec![0, 7, 0, 0]);
    assert_eq!(f1, vec![0, 7, 1, 0]);
    assert_eq!(&core.am.words()[..2], &[acc.entries[0], acc.entries[1]]);
}

/// Scenario B: a full input-to-output chain with tap points and a sink.
#[test]
fn source_to_sink_chain_routes_tags() {
    let mut net = Network::new();
    let src = net.add_source(2);
    let taps = vec![
        vec![
            TapPoint { synapse: 3, sign: Sign::Excitatory },
            TapPoint { synapse: 5, sign: Sign::Inhibitory },
            TapPoint { synapse: 9, sign: Sign::Excitatory },
        ],
        vec![TapPoint { synapse: 2, sign: Sign::Inhibitory }],
    ];
    let tap = net.add_tap_point(taps);
    let nrn = net.add_neurons(40);
    let w = net.add_weights(WeightMatrix::constant(2, 40, 0.1));
    let acc = net.add_buckets(2);
    let out = net.add_sink(2);
    net.connect(src, tap).unwrap();
    net.connect(tap, nrn).unwrap();
    net.connect(nrn, w).unwrap();
    net.connect(w, acc).unwrap();
    net.connect(acc, out).unwrap();

    let mut core = Core::new(MINI);
    let report = map(&mut net, &mut core).unwrap();
    assert_eq!(report.ext_tags, 2);

    // Sink tags are globally unique and increasing, starting past the
    // on-chip tag space.
    let Resource::Sink(out) = net.node(out) else { panic!() };
    assert_eq!(out.ext_tags, vec![64, 65]);

    // The source's output tags are the tap point's input-tag addresses:
    // two slots per dimension (three taps round up to two slots).
    let Resource::TatTapPoint(tap) = net.node(tap) else { panic!() };
    assert_eq!(tap.slots_per_dim, 2);
    assert_eq!(tap.base, 0);
    let Resource::Source(src) = net.node(src) else { panic!() };
    assert_eq!(src.out_tags, vec![0, 2]);

    // Tap entries pack two (synapse, sign) pairs; stop on the last slot of
    // each dimension; odd counts pad with a zero pair.
    let widths = [1, 2, MINI.tap_bits, 1, MINI.tap_bits, 1];
    let (slot0, _) = bits::unpack(tap.entries[0], &widths).unwrap();
    assert_eq!(slot0, vec![0, 1, 3, 0, 5, 1]);
    let (slot1, _) = bits::unpack(tap.entries[1], &widths).unwrap();
    assert_eq!(slot1, vec![1, 1, 9, 0, 0, 0]);
    let (slot3, _) = bits::unpack(tap.entries[3], &widths).unwrap();
    assert_eq!(slot3, vec![1, 1, 0, 0, 0, 0], "dim 1 pads its second slot");

    // The bucket's next addresses are the sink's external tags.
    let Resource::AccumulatorBuckets(acc) = net.node(acc) else { panic!() };
    let am_widths = [MINI.am_val_bits, MINI.thr_bits, 1, MINI.global_tag_bits()];
    let (f0, _) = bits::unpack(acc.entries[0], &am_widths).unwrap();
    let (f1, _) = bits::unpack(acc.entries[1], &am_widths).unwrap();
    assert_eq!(f0[3], 64);
    assert_eq!(f1[3], 65);
}

/// Scenario C: buckets fanning out to two transform-weight stages.
#[test]
fn fanout_materializes_one_node_with_grouped_entries() {
    let mut net = Network::new();
    let acc = net.add_buckets(2);
    let wa = net.add_weights(WeightMatrix::constant(2, 2, 0.25));
    let wb = net.add_weights(WeightMatrix::constant(2, 2, -0.25));
    let ba = net.add_buckets(2);
    let bb = net.add_buckets(2);
    net.connect(acc, wa).unwrap();
    net.connect(acc, wb).unwrap();
    net.connect(wa, ba).unwrap();
    net.connect(wb, bb).unwrap();

    let mut core = Core::new(MINI);
    map(&mut net, &mut core).unwrap();

    // Exactly one fan-out node with dims × targets entries.
    let fanouts: Vec<&Resource> = net
        .resources()
        .map(|(_, r)| r)
        .filter(|r| matches!(r, Resource::TatFanout(_)))
        .collect();
    assert_eq!(fanouts.len(), 1);
    let Resource::TatFanout(f) = fanouts[0] else { panic!() };
    assert_eq!(f.entries.len(), 4, "2 dims × 2 targets");

    // Entries group per dimension, stop on the last target of each.
    let widths = [1, 2, MINI.tag_bits, MINI.global_route_bits];
    let unpacked: Vec<Vec<u64>> = f
        .entries
        .iter()
        .map(|&e| bits::unpack(e, &widths).unwrap().0)
        .collect();
    assert_eq!(unpacked[0][0], 0, "dim 0, first target: no stop");
    assert_eq!(unpacked[1][0], 1, "dim 0, last target: stop");
    assert_eq!(unpacked[2][0], 0);
    assert_eq!(unpacked[3][0], 1);

    // Each entry points at one original target's accumulator front: the
    // materialized entry groups sit at TAT0 addresses 0..2 and 2..4.
    assert_eq!(unpacked[0][2], 0, "dim 0 of first weights' front");
    assert_eq!(unpacked[1][2], 2, "dim 0 of second weights' front");
    assert_eq!(unpacked[2][2], 1);
    assert_eq!(unpacked[3][2], 3);
    // Internal routes.
    assert!(unpacked.iter().all(|f| f[3] == 0));

    // Transform runs: contiguous flat runs from the top of the grid, one
    // per input dimension.
    let Resource::Weights(wa) = net.node(wa) else { panic!() };
    let Resource::Weights(wb) = net.node(wb) else { panic!() };
    assert_eq!(wa.transform_runs, vec![0, 2]);
    assert_eq!(wb.transform_runs, vec![4, 6]);

    // Accumulator fronts carry the run address and the downstream AM base.
    let ta_widths = [1, 2, MINI.am_addr_bits, MINI.mm_x_bits, MINI.mm_y_bits];
    let fronts: Vec<&Resource> = net
        .resources()
        .map(|(_, r)| r)
        .filter(|r| matches!(r, Resource::TatAccumulator(_)))
        .collect();
    assert_eq!(fronts.len(), 2);
    let Resource::TatAccumulator(ta) = fronts[0] else { panic!() };
    let (f0, _) = bits::unpack(ta.entries[0], &ta_widths).unwrap();
    // stop, type=accumulator, AM base of ba (=2), col 0, row 0
    assert_eq!(f0, vec![1, 0, 2, 0, 0]);
    let (f1, _) = bits::unpack(ta.entries[1], &ta_widths).unwrap();
    assert_eq!(f1, vec![1, 0, 2, 2, 0], "second run starts at column 2");
}

#[test]
fn oversized_neuron_request_names_the_array_and_phase() {
    let mut net = Network::new();
    let nrn = net.add_neurons(100); // 25 pools, capacity is 16
    let w = net.add_weights(WeightMatrix::constant(1, 100, 0.1));
    let acc = net.add_buckets(1);
    net.connect(nrn, w).unwrap();
    net.connect(w, acc).unwrap();

    let mut core = Core::new(MINI);
    let err = map(&mut net, &mut core).unwrap_err();
    let MapError::Phase { phase, resource, source } = err else {
        panic!("expected phase context, got {err}");
    };
    assert_eq!(phase, "allocate");
    assert!(resource.starts_with("Neurons"));
    assert!(matches!(
        *source,
        MapError::CapacityExceeded { memory: MemoryId::NeuronArray, requested: 25, .. }
    ));
}

#[test]
fn repeated_runs_do_not_share_tag_state() {
    for _ in 0..2 {
        let mut net = Network::new();
        let acc = net.add_buckets(1);
        let out = net.add_sink(1);
        net.connect(acc, out).unwrap();
        let mut core = Core::new(MINI);
        map(&mut net, &mut core).unwrap();
        let Resource::Sink(out) = net.node(out) else { panic!() };
        // A fresh run starts the external tag counter over.
        assert_eq!(out.ext_tags, vec![64]);
    }
}

#[test]
fn readback_verifies_programmed_contents() {
    let mut net = Network::new();
    let nrn = net.add_neurons(8);
    let w = net.add_weights(WeightMatrix::constant(2, 8, 0.3));
    let acc = net.add_buckets(2);
    net.connect(nrn, w).unwrap();
    net.connect(w, acc).unwrap();

    let mut core = Core::new(MINI);
    map(&mut net, &mut core).unwrap();

    // A faithful device dump verifies; a corrupted word is named.
    for memory in [
        MemoryId::PoolAddressTable,
        MemoryId::AccumulatorMemory,
        MemoryId::MainMemory,
    ] {
        let dumped = verify::expected_words(&core, memory).to_vec();
        verify::check_readback(&core, memory, &dumped).unwrap();
    }
    let mut bad = verify::expected_words(&core, MemoryId::MainMemory).to_vec();
    bad[3] ^= 1;
    let err = verify::check_readback(&core, MemoryId::MainMemory, &bad).unwrap_err();
    assert!(matches!(err, MapError::ReadbackMismatch { addr: 3, .. }));
}

#[test]
fn programming_streams_cover_every_memory() {
    let mut net = Network::new();
    let nrn = net.add_neurons(8);
    let w = net.add_weights(WeightMatrix::constant(1, 8, 0.2));
    let acc = net.add_buckets(1);
    net.connect(nrn, w).unwrap();
    net.connect(w, acc).unwrap();

    let mut core = Core::new(MINI);
    map(&mut net, &mut core).unwrap();
    let streams = core.programming_streams().unwrap();
    assert_eq!(streams.len(), 4);
    // PAT: one word per pool, no address words.
    assert_eq!(streams[0].len(), MINI.nrn_pools());
    // Combined AM+MM: 3 words per AM entry, setup + one write per MM cell.
    assert_eq!(
        streams[1].len(),
        3 * MINI.am_size() + 1 + MINI.mm_height() * MINI.mm_width()
    );
    // Serialization: bytes per word = ceil(word_bits / 8).
    let s = &streams[0];
    assert_eq!(
        s.to_bytes().len(),
        s.len() * ((s.word_bits as usize).div_ceil(8))
    );
}
