//! Plan expansion: refreshed dependents and children of recreated containers.

use std::collections::{HashSet, VecDeque};

use super::{ExtraEdges, ObjectState, Origin, Plan};
use crate::error::Result;
use crate::model::{DbObjType, ObjectId};

/// How a change propagates to the objects that depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// The old definition goes away; dependents must be dropped first.
    Removal,
    /// Altered in place; dependents may be re-validated without a drop.
    InPlace,
}

fn trigger_of(state: ObjectState) -> Option<Trigger> {
    match state {
        ObjectState::Drop | ObjectState::Recreate => Some(Trigger::Removal),
        ObjectState::AlterWithDep => Some(Trigger::InPlace),
        _ => None,
    }
}

/// Adds every object that must be refreshed, and the children of every recreated container,
/// until neither adds anything new.
pub(super) fn expand(plan: &mut Plan<'_>, extra: &ExtraEdges) -> Result<()> {
    let mut queue: VecDeque<(ObjectId, Trigger)> = plan
        .containers
        .iter()
        .filter_map(|container| {
            trigger_of(container.state).map(|trigger| (container.object.id.clone(), trigger))
        })
        .collect();
    let mut expanded = HashSet::new();
    loop {
        while let Some((id, trigger)) = queue.pop_front() {
            for dependent in dependents(plan, &id, extra) {
                if let Some(next) = refresh_dependent(plan, &dependent, trigger)? {
                    queue.push_back(next);
                }
            }
        }
        let added = recreate_children(plan, &mut expanded);
        if added.is_empty() {
            return Ok(());
        }
        queue.extend(added);
    }
}

/// Old-side dependents of `id` and of the sub-elements it owns, minus those sub-elements.
fn dependents(plan: &Plan<'_>, id: &ObjectId, extra: &ExtraEdges) -> Vec<ObjectId> {
    let mut sources = vec![id.clone()];
    sources.extend(
        plan.old
            .descendants(id)
            .into_iter()
            .map(|stmt| stmt.id.clone()),
    );
    let mut out: Vec<ObjectId> = Vec::new();
    for source in &sources {
        let found = plan
            .old
            .dependents(source)
            .iter()
            .chain(extra.dependents_of(source));
        for dependent in found {
            if dependent != id
                && !plan.old.is_descendant_of(dependent, id)
                && !out.contains(dependent)
            {
                out.push(dependent.clone());
            }
        }
    }
    out
}

/// Puts one dependent into the plan, or upgrades its state; returns it if it must propagate
/// further.
fn refresh_dependent(
    plan: &mut Plan<'_>,
    id: &ObjectId,
    trigger: Trigger,
) -> Result<Option<(ObjectId, Trigger)>> {
    if plan.dropped_with_table(id) || !plan.old.contains(id) {
        return Ok(None);
    }
    let generator = plan.new.dialect().generator();
    let in_place = match (trigger, plan.new.get(id)) {
        (Trigger::InPlace, Some(new_stmt)) => generator.refresh_in_place(new_stmt),
        _ => None,
    };

    if let Some(container) = plan.get_mut(id) {
        if !container.state.alters() || in_place.is_some() {
            return Ok(None);
        }
        log::debug!("{} upgraded from {} to RECREATE", id, container.state);
        container.state = ObjectState::Recreate;
        container.alter_sql.clear();
        return Ok(Some((id.clone(), Trigger::Removal)));
    }

    let next = match in_place {
        Some(sql) => {
            plan.push_derived(
                id.clone(),
                ObjectState::Alter,
                Origin::RefreshedInPlace,
                vec![sql],
            );
            (id.clone(), Trigger::InPlace)
        }
        None => {
            let state = if plan.new.contains(id) {
                ObjectState::Recreate
            } else {
                ObjectState::Drop
            };
            plan.push_derived(id.clone(), state, Origin::Refreshed, Vec::new());
            (id.clone(), Trigger::Removal)
        }
    };
    Ok(Some(next))
}

/// Brings the children of every recreated container into the plan: sub-elements are created
/// again, top-level children are recreated, and old children that no longer exist are dropped.
fn recreate_children(
    plan: &mut Plan<'_>,
    expanded: &mut HashSet<ObjectId>,
) -> Vec<(ObjectId, Trigger)> {
    let recreated: Vec<ObjectId> = plan
        .containers
        .iter()
        .filter(|container| container.state == ObjectState::Recreate)
        .map(|container| container.object.id.clone())
        .filter(|id| !expanded.contains(id))
        .collect();

    let mut added = Vec::new();
    for parent in recreated {
        let new_children: Vec<ObjectId> = plan
            .new
            .children(&parent)
            .filter(|child| child.kind() != DbObjType::Column)
            .map(|child| child.id.clone())
            .collect();
        for child in new_children {
            let sub_element = child.kind.is_sub_element();
            let existed = plan.old.contains(&child);
            match plan.get_mut(&child) {
                Some(container) => {
                    if sub_element && container.state != ObjectState::Create && existed {
                        container.state = ObjectState::Create;
                        container.alter_sql.clear();
                    } else if !sub_element && container.state.alters() {
                        container.state = ObjectState::Recreate;
                        container.alter_sql.clear();
                        added.push((child, Trigger::Removal));
                    }
                }
                None if sub_element => {
                    plan.push_derived(child, ObjectState::Create, Origin::RecreatedChild, Vec::new())
                }
                None if existed => {
                    plan.push_derived(
                        child.clone(),
                        ObjectState::Recreate,
                        Origin::RecreatedChild,
                        Vec::new(),
                    );
                    added.push((child, Trigger::Removal));
                }
                None => {
                    plan.push_derived(child, ObjectState::Create, Origin::RecreatedChild, Vec::new())
                }
            }
        }

        let removed: Vec<ObjectId> = plan
            .old
            .children(&parent)
            .filter(|child| !child.kind().is_sub_element() && !plan.new.contains(&child.id))
            .map(|child| child.id.clone())
            .filter(|id| plan.get(id).is_none())
            .collect();
        for child in removed {
            plan.push_derived(child.clone(), ObjectState::Drop, Origin::RecreatedChild, Vec::new());
            added.push((child, Trigger::Removal));
        }
        expanded.insert(parent);
    }
    added
}
