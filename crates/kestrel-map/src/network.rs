//! Network builder: constructs the resource graph and validates it eagerly.
//!
//! Connection-type checking happens at [`Network::connect`] time, before any
//! allocation is attempted. [`Network::finalize`] (driven by the mapper)
//! performs the structural passes that need the whole graph: fan-out
//! materialization, transform-front insertion, and weight layout-mode
//! resolution.

use tracing::debug;

use crate::error::{MapError, Result};
use crate::quant::WeightMatrix;
use crate::resource::{
    AccumulatorBuckets, Neurons, Resource, ResourceId, Sink, Source, TapPoint, TatAccumulator,
    TatFanout, TatTapPoint, Weights,
};

/// The resource graph under construction.
#[derive(Debug, Default)]
pub struct Network {
    pub(crate) nodes: Vec<Resource>,
    pub(crate) edges: Vec<Vec<usize>>,
}

impl Network {
    /// Empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, resource: Resource) -> ResourceId {
        self.nodes.push(resource);
        self.edges.push(Vec::new());
        ResourceId(self.nodes.len() - 1)
    }

    /// Add an input boundary of `dims` dimensions.
    pub fn add_source(&mut self, dims: usize) -> ResourceId {
        self.push(Resource::Source(Source {
            dims,
            out_tags: Vec::new(),
        }))
    }

    /// Add an output boundary of `dims` dimensions.
    pub fn add_sink(&mut self, dims: usize) -> ResourceId {
        self.push(Resource::Sink(Sink {
            dims,
            ext_tags: Vec::new(),
        }))
    }

    /// Add a block of `count` neurons.
    pub fn add_neurons(&mut self, count: usize) -> ResourceId {
        self.push(Resource::Neurons(Neurons {
            count,
            pools: 0,
            base_pool: 0,
            pat_entries: Vec::new(),
        }))
    }

    /// Add a weighted connection.
    pub fn add_weights(&mut self, matrix: WeightMatrix) -> ResourceId {
        self.push(Resource::Weights(Weights {
            matrix,
            mode: None,
            quant: None,
            decode_chunks: Vec::new(),
            transform_runs: Vec::new(),
        }))
    }

    /// Add a group of accumulator buckets.
    pub fn add_buckets(&mut self, dims: usize) -> ResourceId {
        self.push(Resource::AccumulatorBuckets(AccumulatorBuckets {
            dims,
            base: 0,
            entries: Vec::new(),
        }))
    }

    /// Add neuron-tap entries, one tap list per input dimension.
    pub fn add_tap_point(&mut self, taps: Vec<Vec<TapPoint>>) -> ResourceId {
        self.push(Resource::TatTapPoint(TatTapPoint {
            taps,
            slots_per_dim: 0,
            base: 0,
            entries: Vec::new(),
        }))
    }

    /// Connect `from` to `to`, checking the pair is permitted and the
    /// dimensions agree.
    ///
    /// # Errors
    ///
    /// [`MapError::ConnectionType`] for a forbidden pair,
    /// [`MapError::DimensionMismatch`] for a permitted pair whose
    /// dimensionalities disagree.
    pub fn connect(&mut self, from: ResourceId, to: ResourceId) -> Result<()> {
        let (src, dst) = (&self.nodes[from.0], &self.nodes[to.0]);
        let pair_ok = matches!(
            (src, dst),
            (Resource::Source(_), Resource::TatTapPoint(_))
                | (Resource::Source(_), Resource::Weights(_))
                | (Resource::TatTapPoint(_), Resource::Neurons(_))
                | (Resource::Neurons(_), Resource::Weights(_))
                | (Resource::Weights(_), Resource::AccumulatorBuckets(_))
                | (Resource::AccumulatorBuckets(_), Resource::Weights(_))
                | (Resource::AccumulatorBuckets(_), Resource::Sink(_))
                | (Resource::AccumulatorBuckets(_), Resource::TatTapPoint(_))
        );
        if !pair_ok {
            return Err(MapError::ConnectionType {
                from: src.kind_name(),
                to: dst.kind_name(),
            });
        }
        check_dims(src, dst)?;
        self.edges[from.0].push(to.0);
        debug!(from = src.kind_name(), to = dst.kind_name(), "connected");
        Ok(())
    }

    /// Resource count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the network has no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Borrow a resource.
    #[must_use]
    pub fn node(&self, id: ResourceId) -> &Resource {
        &self.nodes[id.0]
    }

    /// Iterate over all resources, including materialized ones.
    pub fn resources(&self) -> impl Iterator<Item = (ResourceId, &Resource)> {
        self.nodes.iter().enumerate().map(|(i, r)| (ResourceId(i), r))
    }

    /// Targets of a resource, in connection order.
    #[must_use]
    pub fn targets(&self, id: ResourceId) -> &[usize] {
        &self.edges[id.0]
    }

    /// Single upstream of node `i`, if any.
    pub(crate) fn upstream_of(&self, i: usize) -> Option<usize> {
        self.edges
            .iter()
            .position(|targets| targets.contains(&i))
    }

    /// Structural finalization: out-degree checks, fan-out materialization,
    /// weight mode resolution, transform-front insertion.
    ///
    /// # Errors
    ///
    /// [`MapError::FanoutViolation`] for a multi-target resource that cannot
    /// fan out; [`MapError::ConnectionType`] for a resource left dangling.
    pub(crate) fn finalize(&mut self) -> Result<()> {
        self.check_dangling()?;
        self.materialize_fanouts()?;
        self.resolve_weight_modes();
        self.insert_transform_fronts();
        Ok(())
    }

    /// Resources that must drive something downstream but don't. Buckets may
    /// be terminal: their accumulated values just never route anywhere.
    fn check_dangling(&self) -> Result<()> {
        for (i, node) in self.nodes.iter().enumerate() {
            let needs_target = matches!(
                node,
                Resource::Source(_)
                    | Resource::Neurons(_)
                    | Resource::Weights(_)
                    | Resource::TatTapPoint(_)
            );
            if needs_target && self.edges[i].is_empty() {
                return Err(MapError::ConnectionType {
                    from: node.kind_name(),
                    to: "nothing",
                });
            }
            // Weights cannot resolve a layout mode without an upstream.
            if matches!(node, Resource::Weights(_)) && self.upstream_of(i).is_none() {
                return Err(MapError::ConnectionType {
                    from: "nothing",
                    to: node.kind_name(),
                });
            }
        }
        Ok(())
    }

    /// A resource with more than one target either materializes an explicit
    /// fan-out node or is a caller error.
    fn materialize_fanouts(&mut self) -> Result<()> {
        for i in 0..self.nodes.len() {
            if self.edges[i].len() <= 1 {
                continue;
            }
            if !self.nodes[i].can_fan_out() {
                return Err(MapError::FanoutViolation {
                    resource: self.nodes[i].kind_name().to_string(),
                    targets: self.edges[i].len(),
                });
            }
            let dims = self.nodes[i].out_dims();
            let fanout = self.push(Resource::TatFanout(TatFanout {
                dims,
                base: 0,
                entries: Vec::new(),
            }));
            let targets = std::mem::replace(&mut self.edges[i], vec![fanout.0]);
            debug!(
                resource = self.nodes[i].kind_name(),
                targets = targets.len(),
                "materialized fan-out"
            );
            self.edges[fanout.0] = targets;
        }
        Ok(())
    }

    /// Decode if fed by neurons, transform otherwise.
    fn resolve_weight_modes(&mut self) {
        use crate::alloc::MmMode;
        for i in 0..self.nodes.len() {
            let Some(up) = self.upstream_of(i) else { continue };
            let mode = match (&self.nodes[up], &self.nodes[i]) {
                (Resource::Neurons(_), Resource::Weights(_)) => Some(MmMode::Decode),
                (_, Resource::Weights(_)) => Some(MmMode::Transform),
                _ => None,
            };
            if let (Some(mode), Resource::Weights(w)) = (mode, &mut self.nodes[i]) {
                w.mode = Some(mode);
            }
        }
    }

    /// Every transform-mode weight block gets an accumulator-target entry
    /// group in front of it: the entries an arriving tag resolves through.
    fn insert_transform_fronts(&mut self) {
        use crate::alloc::MmMode;
        for i in 0..self.nodes.len() {
            let in_dims = match &self.nodes[i] {
                Resource::Weights(w) if w.mode == Some(MmMode::Transform) => w.matrix.cols(),
                _ => continue,
            };
            let front = self.push(Resource::TatAccumulator(TatAccumulator {
                in_dims,
                base: 0,
                entries: Vec::new(),
            }));
            if let Some(up) = self.upstream_of(i) {
                if up != front.0 {
                    for t in &mut self.edges[up] {
                        if *t == i {
                            *t = front.0;
                        }
                    }
                }
            }
            self.edges[front.0] = vec![i];
        }
    }
}

/// Dimension agreement for a permitted pair.
fn check_dims(src: &Resource, dst: &Resource) -> Result<()> {
    let (provided, expected) = match (src, dst) {
        (Resource::Source(s), Resource::TatTapPoint(t)) => (s.dims, t.taps.len()),
        (Resource::Source(s), Resource::Weights(w)) => (s.dims, w.matrix.cols()),
        (Resource::Neurons(n), Resource::Weights(w)) => (n.count, w.matrix.cols()),
        (Resource::Weights(w), Resource::AccumulatorBuckets(b)) => (w.matrix.rows(), b.dims),
        (Resource::AccumulatorBuckets(b), Resource::Weights(w)) => (b.dims, w.matrix.cols()),
        (Resource::AccumulatorBuckets(b), Resource::Sink(s)) => (b.dims, s.dims),
        (Resource::AccumulatorBuckets(b), Resource::TatTapPoint(t)) => (b.dims, t.taps.len()),
        _ => return Ok(()),
    };
    if provided == expected {
        Ok(())
    } else {
        Err(MapError::DimensionMismatch {
            from: src.kind_name(),
            to: dst.kind_name(),
            provided,
            expected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::MmMode;

    #[test]
    fn forbidden_pair_is_rejected_eagerly() {
        let mut net = Network::new();
        let n = net.add_neurons(16);
        let s = net.add_sink(1);
        let err = net.connect(n, s).unwrap_err();
        assert!(matches!(
            err,
            MapError::ConnectionType { from: "Neurons", to: "Sink" }
        ));
    }

    #[test]
    fn dimension_mismatch_is_rejected_eagerly() {
        let mut net = Network::new();
        let w = net.add_weights(WeightMatrix::constant(3, 8, 0.1));
        let b = net.add_buckets(2);
        let err = net.connect(w, b).unwrap_err();
        assert!(matches!(
            err,
            MapError::DimensionMismatch { provided: 3, expected: 2, .. }
        ));
    }

    #[test]
    fn multi_target_buckets_get_one_fanout() {
        let mut net = Network::new();
        let b = net.add_buckets(2);
        let wa = net.add_weights(WeightMatrix::constant(2, 2, 0.1));
        let wb = net.add_weights(WeightMatrix::constant(2, 2, 0.1));
        let ba = net.add_buckets(2);
        let bb = net.add_buckets(2);
        let sink = net.add_sink(2);
        net.connect(b, wa).unwrap();
        net.connect(b, wb).unwrap();
        net.connect(wa, ba).unwrap();
        net.connect(wb, bb).unwrap();
        net.connect(ba, sink).unwrap();
        // bb dangling would fail finalize; give it somewhere to go
        let sink2 = net.add_sink(2);
        net.connect(bb, sink2).unwrap();

        net.finalize().unwrap();
        let fanouts: Vec<_> = net
            .resources()
            .filter(|(_, r)| matches!(r, Resource::TatFanout(_)))
            .collect();
        assert_eq!(fanouts.len(), 1, "exactly one fan-out node");
        // The buckets now have a single target: the fan-out.
        assert_eq!(net.targets(b).len(), 1);
    }

    #[test]
    fn multi_target_weights_are_a_fanout_violation() {
        let mut net = Network::new();
        let w = net.add_weights(WeightMatrix::constant(2, 4, 0.1));
        let ba = net.add_buckets(2);
        let bb = net.add_buckets(2);
        let sink = net.add_sink(2);
        net.connect(w, ba).unwrap();
        net.connect(w, bb).unwrap();
        net.connect(ba, sink).unwrap();
        let sink2 = net.add_sink(2);
        net.connect(bb, sink2).unwrap();
        // Weights upstream so the graph is otherwise valid.
        let n = net.add_neurons(4);
        net.connect(n, w).unwrap();

        let err = net.finalize().unwrap_err();
        assert!(matches!(err, MapError::FanoutViolation { targets: 2, .. }));
    }

    #[test]
    fn weight_modes_resolve_from_upstream_kind() {
        let mut net = Network::new();
        let n = net.add_neurons(8);
        let wd = net.add_weights(WeightMatrix::constant(2, 8, 0.1));
        let b = net.add_buckets(2);
        let wt = net.add_weights(WeightMatrix::constant(2, 2, 0.1));
        let b2 = net.add_buckets(2);
        let sink = net.add_sink(2);
        net.connect(n, wd).unwrap();
        net.connect(wd, b).unwrap();
        net.connect(b, wt).unwrap();
        net.connect(wt, b2).unwrap();
        net.connect(b2, sink).unwrap();
        net.finalize().unwrap();

        let Resource::Weights(wd) = net.node(wd) else { panic!() };
        let Resource::Weights(wt) = net.node(wt) else { panic!() };
        assert_eq!(wd.mode, Some(MmMode::Decode));
        assert_eq!(wt.mode, Some(MmMode::Transform));
    }

    #[test]
    fn transform_weights_get_an_accumulator_front() {
        let mut net = Network::new();
        let b = net.add_buckets(3);
        let w = net.add_weights(WeightMatrix::constant(2, 3, 0.1));
        let b2 = net.add_buckets(2);
        let sink = net.add_sink(2);
        net.connect(b, w).unwrap();
        net.connect(w, b2).unwrap();
        net.connect(b2, sink).unwrap();
        net.finalize().unwrap();

        // b now routes through a TatAccumulator into w.
        let front = net.targets(b)[0];
        let Resource::TatAccumulator(ta) = &net.nodes[front] else {
            panic!("expected accumulator front, got {}", net.nodes[front].kind_name());
        };
        assert_eq!(ta.in_dims, 3);
        assert_eq!(net.edges[front], vec![w.0]);
    }

    #[test]
    fn dangling_weights_are_rejected() {
        let mut net = Network::new();
        let n = net.add_neurons(8);
        let w = net.add_weights(WeightMatrix::constant(2, 8, 0.1));
        net.connect(n, w).unwrap();
        let err = net.finalize().unwrap_err();
        assert!(matches!(
            err,
            MapError::ConnectionType { from: "Weights", to: "nothing" }
        ));
    }
}
