//! Position registry and derived neighbor sets (C7, expansion).
//!
//! The driver owns one `Topology` for the whole run. It is the single place distance
//! and propagation delay are computed, and the single place the neighbor predicate of
//! §3 is evaluated. Per the design note in spec.md §9, neighbor sets are *derived*
//! state: recomputed whenever a position changes, cached otherwise, so a static
//! scenario (the common case) builds its neighbor graph exactly once. Cache shape is
//! lifted from the teacher's `node_location.rs` (`RefCell<Option<...>>`).

use std::cell::RefCell;

use crate::units::{Position, Tick};

#[derive(Debug, Clone, Copy)]
pub struct NodeGeometry {
    pub pos: Position,
    pub radius: f64,
    pub transceive_range: f64,
}

#[derive(Debug)]
pub struct Topology {
    nodes: Vec<NodeGeometry>,
    neighbors: RefCell<Option<Vec<Vec<usize>>>>,
}

impl Topology {
    pub fn new(nodes: Vec<NodeGeometry>) -> Self {
        Topology {
            nodes,
            neighbors: RefCell::new(None),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn position(&self, id: usize) -> Position {
        self.nodes[id].pos
    }

    pub fn geometry(&self, id: usize) -> &NodeGeometry {
        &self.nodes[id]
    }

    /// Overwrites a node's position (e.g. under external mobility) and invalidates the
    /// cached neighbor graph, since §3's neighbor predicate depends on distance.
    pub fn set_position(&mut self, id: usize, pos: Position) {
        self.nodes[id].pos = pos;
        self.neighbors.borrow_mut().take();
    }

    pub fn propagation_delay(&self, a: usize, b: usize) -> Tick {
        self.nodes[a].pos.propagation_delay(self.nodes[b].pos)
    }

    /// Two nodes are neighbors iff `d(A,B) < transceive_range + 2*radius` (§3). The
    /// predicate is symmetric only when both nodes share the same range/radius, which
    /// every scenario in this crate assumes (radii and range are scenario-wide, not
    /// per-node, matching the original source's single `transceive_range` parameter).
    pub fn are_neighbors(&self, a: usize, b: usize) -> bool {
        if a == b {
            return false;
        }
        let geo_a = &self.nodes[a];
        let geo_b = &self.nodes[b];
        let threshold = geo_a.transceive_range + 2.0 * geo_a.radius;
        geo_a.pos.distance_to(geo_b.pos) < threshold.max(geo_b.transceive_range + 2.0 * geo_b.radius)
    }

    fn build_neighbors(&self) -> Vec<Vec<usize>> {
        (0..self.nodes.len())
            .map(|id| {
                (0..self.nodes.len())
                    .filter(|&other| other != id && self.are_neighbors(id, other))
                    .collect()
            })
            .collect()
    }

    /// Returns the (cached) neighbor ids of `id`.
    pub fn neighbors_of(&self, id: usize) -> impl Iterator<Item = usize> + '_ {
        if self.neighbors.borrow().is_none() {
            let built = self.build_neighbors();
            self.neighbors.borrow_mut().replace(built);
        }

        // RefCell borrow is dropped immediately after the clone so the returned
        // iterator does not hold a live borrow across the `impl Iterator` boundary.
        let row = self.neighbors.borrow().as_ref().unwrap()[id].clone();
        row.into_iter()
    }
}
