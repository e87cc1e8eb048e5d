//! Pathfinding bakes
//!
//! A bake precomputes, for every node of a graph held in target storage, the
//! parent array of a single-source search rooted at that node. Graph searches
//! are unbounded loops, which the target only tolerates if they yield often
//! enough, so the search is expressed as an algorithm body driven by a
//! generic per-node framework ([`bake`]) that inserts the yields.
//!
//! # Graph layout
//!
//! - `nodes`: array of positions (`[x, y, z]` arrays)
//! - `segments`: array of `[a, b]` node-index pairs, undirected
//! - `attributes`: one bitmask per segment; `0` is always traversable,
//!   otherwise the segment needs a bit in common with the enabled mask
//!
//! The result of a bake is a [`Bakemap`]: a copy of the graph it was baked
//! from next to the per-source parent arrays, so the paths stay meaningful
//! if the graph variables change afterwards.

mod bake;
mod dijkstra;

pub use bake::{bake, progress_term, BakeOutput, DEFAULT_YIELD_INTERVAL};
pub use dijkstra::Dijkstra;

use crate::backend::target::compiler::{CompileResult, Emitter};
use crate::backend::target::term::Term;

/// Parent value of nodes the search never reached
pub const NO_PARENT: f64 = -1.0;

/// Terms reading the graph arrays
#[derive(Debug, Clone, PartialEq)]
pub struct Pathmap {
    pub nodes: Term,
    pub segments: Term,
    pub attributes: Term,
}

impl Pathmap {
    pub fn new(nodes: Term, segments: Term, attributes: Term) -> Self {
        Self {
            nodes,
            segments,
            attributes,
        }
    }

    pub fn node_count(&self) -> Term {
        self.nodes.clone().count_of()
    }
}

/// Bake result, stored as `[nodes, segments, attributes, parents]`
#[derive(Debug, Clone, PartialEq)]
pub struct Bakemap {
    pub pathmap: Pathmap,
    /// `parents[source][node]`: the node before `node` on the shortest path
    /// from `source`, [`NO_PARENT`] when unreachable
    pub parents: Term,
}

impl Bakemap {
    pub const NODES: usize = 0;
    pub const SEGMENTS: usize = 1;
    pub const ATTRIBUTES: usize = 2;
    pub const PARENTS: usize = 3;

    pub fn new(pathmap: Pathmap, parents: Term) -> Self {
        Self { pathmap, parents }
    }

    /// Term building the stored object
    pub fn to_term(&self) -> Term {
        Term::Array(vec![
            self.pathmap.nodes.clone(),
            self.pathmap.segments.clone(),
            self.pathmap.attributes.clone(),
            self.parents.clone(),
        ])
    }
}

/// A single-source search expressed as one loop iteration per tick.
///
/// The framework emits, per source node:
///
/// ```text
/// init(source)
/// while loop_condition() {
///     tick()
///     <yield bookkeeping>
/// }
/// parents[source] = parents()
/// ```
pub trait BakeAlgorithm {
    /// Emit per-source initialisation
    fn init(&mut self, em: &mut Emitter<'_>, graph: &Pathmap, source: Term) -> CompileResult<()>;

    /// Term that holds while another tick is needed
    fn loop_condition(&self) -> Term;

    /// Emit one step of the search
    fn tick(&mut self, em: &mut Emitter<'_>, graph: &Pathmap, enabled: Term) -> CompileResult<()>;

    /// Nodes not yet settled; drives the progress term
    fn unvisited(&self) -> Term;

    /// Parent array for the current source
    fn parents(&self) -> Term;
}
