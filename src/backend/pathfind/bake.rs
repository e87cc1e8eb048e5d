//! Per-node bake driver.
//!
//! Wraps a [`BakeAlgorithm`] in a counted loop over every source node and a
//! condition loop over the algorithm's ticks, counting ticks so that a `Wait`
//! runs once every `yield_interval` ticks. The wait guard is a fixed-length
//! skip over the single `Wait` action:
//!
//! ```text
//! modify bake_wait add 1
//! skip_if (bake_wait % 6) by 1
//! wait
//! ```

use tracing::debug;

use crate::backend::target::action::{Action, ModifyOp};
use crate::backend::target::compiler::{CompileResult, ConditionLoop, CountedLoop, Emitter, LocalVar};
use crate::backend::target::term::{BinOp, Term};
use crate::backend::target::vars::IndexReference;

use super::{BakeAlgorithm, Bakemap, Pathmap};

/// Ticks between yields unless configured otherwise
pub const DEFAULT_YIELD_INTERVAL: u32 = 6;

/// Terms exposed to the caller once the bake has been emitted
#[derive(Debug, Clone, PartialEq)]
pub struct BakeOutput {
    pub bakemap: Bakemap,
    /// Completion fraction in `[0, 1]`. A live expression over the bake's
    /// own state, so it can be sampled at any yield.
    pub progress: Term,
}

/// Storage owned by the driver
struct PathBakeState {
    wait_ticks: IndexReference,
    parents: IndexReference,
    enabled: IndexReference,
}

impl PathBakeState {
    fn new(em: &mut Emitter<'_>, enabled: Term) -> CompileResult<Self> {
        let state = Self {
            wait_ticks: em.assign("bake_wait")?,
            parents: em.assign("bake_parents")?,
            enabled: em.assign("bake_attributes")?,
        };
        em.push(state.wait_ticks.set(Term::number(0)));
        em.push(state.parents.set(Term::empty_array()));
        em.push(state.enabled.set(enabled));
        Ok(state)
    }
}

/// Completion fraction of a bake.
///
/// `node / n + (n - |unvisited|) / n²`, evaluated as a single division so the
/// final tick of the last node lands exactly on `1`.
pub fn progress_term(node: Term, node_count: Term, unvisited: Term) -> Term {
    let settled = Term::binary(BinOp::Sub, node_count.clone(), unvisited.count_of());
    let done = Term::binary(
        BinOp::Add,
        Term::binary(BinOp::Mul, node, node_count.clone()),
        settled,
    );
    let total = Term::binary(BinOp::Mul, node_count.clone(), node_count);
    Term::binary(
        BinOp::Min,
        Term::number(1),
        Term::binary(BinOp::Div, done, total),
    )
}

/// Emit a full bake of `graph` using `algorithm` for each source node.
///
/// When `snapshot` is given the progress value is written to it after every
/// tick.
pub fn bake<A: BakeAlgorithm>(
    em: &mut Emitter<'_>,
    graph: &Pathmap,
    enabled: Term,
    mut algorithm: A,
    snapshot: Option<&LocalVar>,
    yield_interval: u32,
) -> CompileResult<BakeOutput> {
    let yield_interval = yield_interval.max(1);
    debug!(yield_interval, start = em.seq.len(), "emitting bake");

    let state = PathBakeState::new(em, enabled)?;
    if let Some(snapshot) = snapshot {
        em.push(snapshot.set(Term::number(0)));
    }

    let nodes = CountedLoop::begin(em, "bake_node", graph.node_count())?;
    let progress_value = progress_term(nodes.value(), graph.node_count(), algorithm.unvisited());
    algorithm.init(em, graph, nodes.value())?;

    let search = ConditionLoop::begin(em, algorithm.loop_condition());
    algorithm.tick(em, graph, state.enabled.get())?;
    em.push(state.wait_ticks.modify(ModifyOp::Add, Term::number(1)));
    em.seq.emit_fixed_skip(
        Some(Term::binary(
            BinOp::Mod,
            state.wait_ticks.get(),
            Term::number(yield_interval),
        )),
        1,
    );
    em.push(Action::Wait);
    if let Some(snapshot) = snapshot {
        em.push(snapshot.set(progress_value.clone()));
    }
    search.end(em)?;

    em.push(state.parents.set_at(nodes.value(), algorithm.parents()));
    nodes.end(em)?;

    debug!(end = em.seq.len(), "bake emitted");
    Ok(BakeOutput {
        bakemap: Bakemap::new(graph.clone(), state.parents.get()),
        progress: progress_value,
    })
}
