//! Dependency resolution and action ordering
//!
//! Given the flattened diff elements and both snapshots, the resolver
//!
//! 1. decides an [`ObjectState`] per object, asking the dialect whether a changed object can be
//!    altered in place;
//! 2. expands the plan with the objects that must be refreshed because something they depend on
//!    is dropped, recreated or altered with dependents, and with the children of recreated
//!    containers;
//! 3. builds a step graph (drop, create, alter and pass-through steps) whose edges mean "runs
//!    before", breaking cycles by emitting constraints as separate steps;
//! 4. sorts the graph topologically, breaking ties by selection order.

mod cycles;
mod graph;
mod refresh;

pub use graph::StepKind;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::dialect::AlterOutcome;
use crate::differ::DiffElement;
use crate::error::{DiffError, Result};
use crate::model::{ObjectId, Side, Snapshot, Statement};
use crate::utils::topsort::topo_sort;

/// Decided action for one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectState {
    Create,
    Drop,
    Alter,
    /// Drop of the old definition followed by creation of the new one.
    Recreate,
    /// In-place alter after which dependents must be refreshed.
    AlterWithDep,
    Nothing,
}

impl ObjectState {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectState::Create => "CREATE",
            ObjectState::Drop => "DROP",
            ObjectState::Alter => "ALTER",
            ObjectState::Recreate => "RECREATE",
            ObjectState::AlterWithDep => "ALTER_WITH_DEP",
            ObjectState::Nothing => "NOTHING",
        }
    }

    fn drops(self) -> bool {
        matches!(self, ObjectState::Drop | ObjectState::Recreate)
    }

    fn creates(self) -> bool {
        matches!(self, ObjectState::Create | ObjectState::Recreate)
    }

    fn alters(self) -> bool {
        matches!(self, ObjectState::Alter | ObjectState::AlterWithDep)
    }
}

impl fmt::Display for ObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical object: its old definition, its new definition, or both.
#[derive(Debug, Clone)]
pub struct DbObject<'a> {
    pub id: ObjectId,
    pub old: Option<&'a Statement>,
    pub new: Option<&'a Statement>,
}

/// Why an object is part of the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Selected,
    /// Dropped and, if still present, recreated because a dependency changed.
    Refreshed,
    /// Re-validated in place because a dependency was altered with dependents.
    RefreshedInPlace,
    /// Re-created because its container is recreated.
    RecreatedChild,
}

#[derive(Debug, Clone)]
pub struct ActionContainer<'a> {
    pub object: DbObject<'a>,
    pub state: ObjectState,
    pub origin: Origin,
    pub(crate) order: usize,
    pub(crate) alter_sql: Vec<String>,
}

impl ActionContainer<'_> {
    pub fn id(&self) -> &ObjectId {
        &self.object.id
    }

    pub fn is_refresh(&self) -> bool {
        matches!(self.origin, Origin::Refreshed | Origin::RefreshedInPlace)
    }
}

/// `dependent` requires `dependency`, in addition to what the snapshots know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyPair {
    pub dependent: ObjectId,
    pub dependency: ObjectId,
}

/// Caller-supplied dependency edges for each snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalDependencies {
    #[serde(default)]
    pub old: Vec<DependencyPair>,
    #[serde(default)]
    pub new: Vec<DependencyPair>,
}

impl AdditionalDependencies {
    pub fn is_empty(&self) -> bool {
        self.old.is_empty() && self.new.is_empty()
    }

    /// Every pair must name statements of the snapshot its side refers to.
    pub fn check(&self, old: &Snapshot, new: &Snapshot) -> Result<()> {
        let sides = [(&self.old, old, Side::Old), (&self.new, new, Side::New)];
        for (pairs, snapshot, side) in sides {
            for pair in pairs {
                for id in [&pair.dependent, &pair.dependency] {
                    if !snapshot.contains(id) {
                        return Err(DiffError::UnresolvedReference {
                            id: id.clone(),
                            side,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Dependency lookup over one side of the additional edges.
#[derive(Debug, Default)]
pub(crate) struct ExtraEdges {
    dependencies: HashMap<ObjectId, Vec<ObjectId>>,
    dependents: HashMap<ObjectId, Vec<ObjectId>>,
}

impl ExtraEdges {
    pub(crate) fn new(pairs: &[DependencyPair]) -> Self {
        let mut edges = ExtraEdges::default();
        for pair in pairs {
            edges
                .dependencies
                .entry(pair.dependent.clone())
                .or_default()
                .push(pair.dependency.clone());
            edges
                .dependents
                .entry(pair.dependency.clone())
                .or_default()
                .push(pair.dependent.clone());
        }
        edges
    }

    pub(crate) fn dependencies_of(&self, id: &ObjectId) -> &[ObjectId] {
        self.dependencies.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn dependents_of(&self, id: &ObjectId) -> &[ObjectId] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// The set of objects being migrated, in selection order.
pub(crate) struct Plan<'a> {
    pub old: &'a Snapshot,
    pub new: &'a Snapshot,
    pub containers: Vec<ActionContainer<'a>>,
    index: HashMap<ObjectId, usize>,
    next_order: usize,
}

impl<'a> Plan<'a> {
    fn new(old: &'a Snapshot, new: &'a Snapshot) -> Self {
        Plan {
            old,
            new,
            containers: Vec::new(),
            index: HashMap::new(),
            next_order: 0,
        }
    }

    pub(crate) fn get(&self, id: &ObjectId) -> Option<&ActionContainer<'a>> {
        self.index.get(id).map(|pos| &self.containers[*pos])
    }

    pub(crate) fn position(&self, id: &ObjectId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(crate) fn get_mut(&mut self, id: &ObjectId) -> Option<&mut ActionContainer<'a>> {
        match self.index.get(id) {
            Some(pos) => self.containers.get_mut(*pos),
            None => None,
        }
    }

    pub(crate) fn state_of(&self, id: &ObjectId) -> Option<ObjectState> {
        self.get(id).map(|container| container.state)
    }

    /// Adds an object discovered after selection; it sorts after every selected object.
    pub(crate) fn push_derived(
        &mut self,
        id: ObjectId,
        state: ObjectState,
        origin: Origin,
        alter_sql: Vec<String>,
    ) {
        let object = DbObject {
            old: self.old.get(&id),
            new: self.new.get(&id),
            id,
        };
        log::debug!("{} {} ({:?})", state, object.id, origin);
        let order = self.next_order;
        self.push(ActionContainer {
            object,
            state,
            origin,
            order,
            alter_sql,
        });
    }

    fn push(&mut self, container: ActionContainer<'a>) {
        self.next_order = self.next_order.max(container.order + 1);
        self.index
            .insert(container.object.id.clone(), self.containers.len());
        self.containers.push(container);
    }

    /// True if `id` is a sub-element whose table is dropped, taking `id` with it.
    pub(crate) fn dropped_with_table(&self, id: &ObjectId) -> bool {
        id.kind.is_sub_element()
            && self
                .state_of(&self.old.top_level_of(id))
                .is_some_and(ObjectState::drops)
    }

    /// True if `id` is a sub-element whose table is created, and `id` could be rendered by it.
    pub(crate) fn created_with_table(&self, id: &ObjectId) -> bool {
        id.kind.is_sub_element()
            && self
                .state_of(&self.new.top_level_of(id))
                .is_some_and(ObjectState::creates)
    }
}

/// Decides how one object is migrated.
pub fn decide(object: &DbObject<'_>, snapshot: &Snapshot) -> Result<(ObjectState, Vec<String>)> {
    let dialect = snapshot.dialect();
    dialect.check_supported(object.id.kind)?;
    match (object.old, object.new) {
        (None, Some(_)) => Ok((ObjectState::Create, Vec::new())),
        (Some(_), None) => Ok((ObjectState::Drop, Vec::new())),
        (Some(old), Some(new)) => {
            if old.body.kind() != new.body.kind() {
                return Err(DiffError::TypeMismatch {
                    id: object.id.clone(),
                    left: old.body.kind(),
                    right: new.body.kind(),
                });
            }
            if old.same_content(new) {
                return Ok((ObjectState::Nothing, Vec::new()));
            }
            Ok(match dialect.generator().alter(old, new, snapshot)? {
                AlterOutcome::Unchanged => (ObjectState::Nothing, Vec::new()),
                AlterOutcome::Alter(sql) => (ObjectState::Alter, sql),
                AlterOutcome::AlterWithDependents(sql) => (ObjectState::AlterWithDep, sql),
                AlterOutcome::Recreate => (ObjectState::Recreate, Vec::new()),
            })
        }
        (None, None) => Err(DiffError::UnresolvedReference {
            id: object.id.clone(),
            side: Side::New,
        }),
    }
}

/// One step of the final script.
#[derive(Debug, Clone)]
pub struct Action<'a> {
    pub step: StepKind,
    /// State decided for the object the step belongs to.
    pub state: ObjectState,
    /// Old definition for drops, new definition otherwise.
    pub statement: &'a Statement,
    pub refresh: bool,
    pub(crate) alter_sql: Vec<String>,
}

impl Action<'_> {
    pub fn id(&self) -> &ObjectId {
        &self.statement.id
    }

    pub fn alter_sql(&self) -> &[String] {
        &self.alter_sql
    }
}

/// Ordered outcome of resolution.
pub struct ResolvedActions<'a> {
    pub old: &'a Snapshot,
    pub new: &'a Snapshot,
    /// Every decided object, including refreshed ones, in plan order.
    pub containers: Vec<ActionContainer<'a>>,
    /// Steps in execution order.
    pub actions: Vec<Action<'a>>,
    /// Objects re-emitted because something they depend on changed.
    pub to_refresh: Vec<ObjectId>,
    /// Constraints emitted as their own steps instead of inline with their table.
    pub detached: BTreeSet<ObjectId>,
}

impl ResolvedActions<'_> {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Human readable plan: one `STEP STATE identity [refresh]` line per action, then the
    /// refreshed objects.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for action in &self.actions {
            out.push_str(&format!("{} {} {}", action.step, action.state, action.id()));
            if action.refresh {
                out.push_str(" [refresh]");
            }
            out.push('\n');
        }
        if !self.to_refresh.is_empty() {
            out.push_str("\nTo refresh:\n");
            for id in &self.to_refresh {
                out.push_str(&format!("  {}\n", id));
            }
        }
        out
    }
}

/// Resolves the selected elements into an ordered list of actions.
pub fn resolve<'a>(
    old: &'a Snapshot,
    new: &'a Snapshot,
    elements: &[DiffElement],
    additional: &AdditionalDependencies,
) -> Result<ResolvedActions<'a>> {
    additional.check(old, new)?;
    let mut plan = Plan::new(old, new);
    for (order, element) in elements.iter().enumerate() {
        if plan.get(&element.id).is_some() {
            continue;
        }
        let (old_stmt, new_stmt) = element.statements(old, new)?;
        let object = DbObject {
            id: element.id.clone(),
            old: old_stmt,
            new: new_stmt,
        };
        let (state, alter_sql) = decide(&object, new)?;
        log::debug!("{} {}", state, object.id);
        if state == ObjectState::Nothing {
            continue;
        }
        plan.push(ActionContainer {
            object,
            state,
            origin: Origin::Selected,
            order,
            alter_sql,
        });
    }

    if plan.containers.is_empty() {
        return Ok(ResolvedActions {
            old,
            new,
            containers: Vec::new(),
            actions: Vec::new(),
            to_refresh: Vec::new(),
            detached: BTreeSet::new(),
        });
    }

    let old_extra = ExtraEdges::new(&additional.old);
    let new_extra = ExtraEdges::new(&additional.new);
    refresh::expand(&mut plan, &old_extra)?;

    let (graph, detached) = cycles::break_cycles(&plan, &old_extra, &new_extra)?;
    let nodes = graph.priorities();
    let edges = graph.edge_list();
    let sorted = topo_sort(&nodes, &edges).map_err(|_| DiffError::UnresolvableCycle {
        objects: graph.participants(nodes.iter().map(|(node, _)| *node)),
    })?;

    let mut actions = Vec::new();
    for node in sorted {
        let step = graph.step(node);
        let state = match step.key.kind {
            StepKind::PassThrough => continue,
            StepKind::Create => ObjectState::Create,
            StepKind::Drop => ObjectState::Drop,
            StepKind::Alter => ObjectState::Alter,
        };
        let container = step.container.map(|pos| &plan.containers[pos]);
        let state = container.map_or(state, |container| container.state);
        actions.push(Action {
            step: step.key.kind,
            state,
            statement: step.statement,
            refresh: container.is_some_and(ActionContainer::is_refresh),
            alter_sql: match (container, step.key.kind) {
                (Some(container), StepKind::Alter) => container.alter_sql.clone(),
                _ => Vec::new(),
            },
        });
    }

    let to_refresh = plan
        .containers
        .iter()
        .filter(|container| container.is_refresh())
        .map(|container| container.object.id.clone())
        .collect();
    log::info!(
        "resolved {} objects into {} steps",
        plan.containers.len(),
        actions.len()
    );
    Ok(ResolvedActions {
        old,
        new,
        containers: plan.containers,
        actions,
        to_refresh,
        detached,
    })
}
