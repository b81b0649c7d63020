use petgraph::algo::tarjan_scc;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use std::collections::{BTreeSet, HashSet};

use super::graph::{Breaks, EdgeKind, StepGraph, StepKey};
use super::{ExtraEdges, Plan};
use crate::error::{DiffError, Result};
use crate::model::ObjectId;

/// Builds the step graph, breaking every strongly connected component until none is left.
///
/// Within a component, constraints that caused an edge by being rendered inline are emitted as
/// separate steps first; failing that, edges through pass-through nodes are severed. A component
/// with neither is an error.
pub(super) fn break_cycles<'a>(
    plan: &Plan<'a>,
    old_extra: &ExtraEdges,
    new_extra: &ExtraEdges,
) -> Result<(StepGraph<'a>, BTreeSet<ObjectId>)> {
    let mut breaks = Breaks::default();
    loop {
        let steps = StepGraph::build(plan, old_extra, new_extra, &breaks)?;
        let components: Vec<Vec<NodeIndex>> = tarjan_scc(steps.graph())
            .into_iter()
            .filter(|component| component.len() > 1)
            .collect();
        if components.is_empty() {
            return Ok((steps, breaks.detached));
        }

        let mut progressed = false;
        for component in &components {
            let members: HashSet<NodeIndex> = component.iter().copied().collect();
            let inner: Vec<_> = component
                .iter()
                .flat_map(|node| steps.graph().edges(*node))
                .filter(|edge| members.contains(&edge.target()))
                .collect();

            let inline: Vec<ObjectId> = inner
                .iter()
                .filter_map(|edge| match edge.weight() {
                    EdgeKind::Inline(constraint) => Some(constraint.clone()),
                    _ => None,
                })
                .collect();
            if !inline.is_empty() {
                for constraint in inline {
                    if breaks.detached.insert(constraint.clone()) {
                        log::debug!("emitting {} separately to break a cycle", constraint);
                        progressed = true;
                    }
                }
                continue;
            }

            let soft: Vec<(StepKey, StepKey)> = inner
                .iter()
                .filter(|edge| *edge.weight() == EdgeKind::Soft)
                .map(|edge| {
                    (
                        steps.key(edge.source()).clone(),
                        steps.key(edge.target()).clone(),
                    )
                })
                .collect();
            if soft.is_empty() {
                return Err(unresolvable(&steps, component));
            }
            for edge in soft {
                log::debug!("severing {} -> {}", edge.0.id, edge.1.id);
                progressed |= breaks.severed.insert(edge);
            }
        }

        if !progressed {
            return Err(unresolvable(&steps, &components[0]));
        }
    }
}

fn unresolvable(steps: &StepGraph<'_>, component: &[NodeIndex]) -> DiffError {
    let objects = steps.participants(component.iter().copied());
    log::error!("unresolvable dependency cycle: {}", objects.join(", "));
    DiffError::UnresolvableCycle { objects }
}
