//! Dijkstra's algorithm as a bake body.
//!
//! One tick settles the closest reachable unvisited node and relaxes every
//! segment touching it. Distances of unreached nodes hold [`UNREACHED`].

use crate::backend::target::action::ModifyOp;
use crate::backend::target::compiler::{CompileResult, CountedLoop, Emitter};
use crate::backend::target::term::{BinOp, Term};
use crate::backend::target::vars::IndexReference;

use super::{BakeAlgorithm, Pathmap, NO_PARENT};

/// Distance sentinel for nodes not reached yet
pub const UNREACHED: f64 = 1.0e9;

#[derive(Debug)]
pub struct Dijkstra {
    current: IndexReference,
    distances: IndexReference,
    unvisited: IndexReference,
    parents: IndexReference,
    neighbor: IndexReference,
}

impl Dijkstra {
    pub fn new(em: &mut Emitter<'_>) -> CompileResult<Self> {
        Ok(Self {
            current: em.assign("dijkstra_current")?,
            distances: em.assign("dijkstra_distances")?,
            unvisited: em.assign("dijkstra_unvisited")?,
            parents: em.assign("dijkstra_parents")?,
            neighbor: em.assign("dijkstra_neighbor")?,
        })
    }

    fn distance_of(&self, node: Term) -> Term {
        self.distances.get().index(node)
    }

    fn reached(&self, node: Term) -> Term {
        Term::binary(BinOp::Ne, self.distance_of(node), Term::number(UNREACHED))
    }
}

fn eq(a: Term, b: Term) -> Term {
    Term::binary(BinOp::Eq, a, b)
}

fn and(a: Term, b: Term) -> Term {
    Term::binary(BinOp::And, a, b)
}

impl BakeAlgorithm for Dijkstra {
    fn init(&mut self, em: &mut Emitter<'_>, graph: &Pathmap, source: Term) -> CompileResult<()> {
        let is_source = eq(Term::ArrayIndex, source.clone());
        em.push(self.distances.set(graph.nodes.clone().mapped(Term::if_then_else(
            is_source.clone(),
            Term::number(0),
            Term::number(UNREACHED),
        ))));
        em.push(self.unvisited.set(graph.nodes.clone().mapped(Term::ArrayIndex)));
        em.push(self.parents.set(graph.nodes.clone().mapped(Term::if_then_else(
            is_source,
            source,
            Term::number(NO_PARENT),
        ))));
        Ok(())
    }

    fn loop_condition(&self) -> Term {
        self.unvisited.get().any(self.reached(Term::ArrayElement))
    }

    fn tick(&mut self, em: &mut Emitter<'_>, graph: &Pathmap, enabled: Term) -> CompileResult<()> {
        let current = self.current.get();
        let neighbor = self.neighbor.get();

        let closest = self
            .unvisited
            .get()
            .filtered(self.reached(Term::ArrayElement))
            .sorted(self.distance_of(Term::ArrayElement))
            .first();
        em.push(self.current.set(closest));

        let segments = CountedLoop::begin(em, "dijkstra_segment", graph.segments.clone().count_of())?;
        let segment = graph.segments.clone().index(segments.value());
        let (a, b) = (segment.clone().index(Term::number(0)), segment.index(Term::number(1)));
        em.push(self.neighbor.set(Term::if_then_else(
            eq(a.clone(), current.clone()),
            b.clone(),
            Term::if_then_else(eq(b, current.clone()), a, Term::number(NO_PARENT)),
        )));

        let attribute = graph.attributes.clone().index(segments.value());
        let usable = Term::binary(
            BinOp::Or,
            eq(attribute.clone(), Term::number(0)),
            Term::binary(
                BinOp::Ne,
                Term::binary(BinOp::BitAnd, attribute, enabled),
                Term::number(0),
            ),
        );
        let candidate = Term::binary(
            BinOp::Add,
            self.distance_of(current.clone()),
            Term::distance(
                graph.nodes.clone().index(current.clone()),
                graph.nodes.clone().index(neighbor.clone()),
            ),
        );
        let relax = and(
            and(
                Term::binary(BinOp::Ne, neighbor.clone(), Term::number(NO_PARENT)),
                usable,
            ),
            and(
                self.unvisited.get().contains(neighbor.clone()),
                Term::binary(BinOp::Lt, candidate.clone(), self.distance_of(neighbor.clone())),
            ),
        );

        let skip = em.seq.emit_conditional_skip(relax.negate());
        em.push(self.distances.set_at(neighbor.clone(), candidate));
        em.push(self.parents.set_at(neighbor, current.clone()));
        em.seq.bind_here(skip)?;
        segments.end(em)?;

        em.push(self.unvisited.modify(ModifyOp::RemoveByValue, current));
        Ok(())
    }

    fn unvisited(&self) -> Term {
        self.unvisited.get()
    }

    fn parents(&self) -> Term {
        self.parents.get()
    }
}
