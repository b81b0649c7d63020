//! Step graph over the plan. Every node is one emitted step; an edge `a -> b` means `a` runs
//! before `b`.
//!
//! Columns, and constraints that are not detached, are rendered by their table's CREATE and go
//! away with their table's DROP, so they have no nodes of their own; their dependencies are
//! attached to the table's node instead. Pass-through nodes stand for unchanged objects of the
//! new snapshot that sit between two steps on a dependency path.

use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use super::{ExtraEdges, Plan};
use crate::error::Result;
use crate::model::{DbObjType, ObjectId, Side, Snapshot, Statement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StepKind {
    Drop,
    Create,
    Alter,
    PassThrough,
}

impl StepKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::Drop => "DROP",
            StepKind::Create => "CREATE",
            StepKind::Alter => "ALTER",
            StepKind::PassThrough => "PASS",
        }
    }

    /// Drops sort ahead of creations and alters whenever the graph leaves a choice.
    fn rank(self) -> u8 {
        match self {
            StepKind::Drop | StepKind::PassThrough => 0,
            StepKind::Create | StepKind::Alter => 1,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a step, stable across rebuilds of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct StepKey {
    pub kind: StepKind,
    pub id: ObjectId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EdgeKind {
    Hard,
    /// Exists because the named constraint is rendered inline with its table.
    Inline(ObjectId),
    /// Runs through a pass-through node.
    Soft,
}

#[derive(Debug)]
pub(crate) struct Step<'a> {
    pub key: StepKey,
    pub statement: &'a Statement,
    /// Position of the owning plan entry; `None` for pass-through and detached constraint steps
    /// added on behalf of their table.
    pub container: Option<usize>,
    pub order: usize,
}

/// Decisions taken so far to break cycles.
#[derive(Debug, Default)]
pub(crate) struct Breaks {
    pub detached: BTreeSet<ObjectId>,
    pub severed: HashSet<(StepKey, StepKey)>,
}

pub(crate) struct StepGraph<'a> {
    graph: DiGraph<Step<'a>, EdgeKind>,
    by_key: HashMap<StepKey, NodeIndex>,
}

impl<'a> StepGraph<'a> {
    pub(crate) fn build(
        plan: &Plan<'a>,
        old_extra: &ExtraEdges,
        new_extra: &ExtraEdges,
        breaks: &Breaks,
    ) -> Result<Self> {
        let mut builder = Builder {
            plan,
            old_extra,
            new_extra,
            breaks,
            steps: StepGraph {
                graph: DiGraph::new(),
                by_key: HashMap::new(),
            },
            drops_by_relation: HashMap::new(),
            pass_through: HashMap::new(),
            visiting: HashSet::new(),
        };
        builder.add_nodes()?;
        builder.add_edges()?;
        log::trace!(
            "step graph: {} nodes, {} edges",
            builder.steps.graph.node_count(),
            builder.steps.graph.edge_count()
        );
        Ok(builder.steps)
    }

    pub(crate) fn graph(&self) -> &DiGraph<Step<'a>, EdgeKind> {
        &self.graph
    }

    pub(crate) fn step(&self, node: NodeIndex) -> &Step<'a> {
        &self.graph[node]
    }

    pub(crate) fn key(&self, node: NodeIndex) -> &StepKey {
        &self.graph[node].key
    }

    /// Sort keys: drops first, then selection order.
    pub(crate) fn priorities(&self) -> Vec<(NodeIndex, (u8, usize))> {
        self.graph
            .node_indices()
            .map(|node| {
                let step = &self.graph[node];
                (node, (step.key.kind.rank(), step.order))
            })
            .collect()
    }

    pub(crate) fn edge_list(&self) -> Vec<(NodeIndex, NodeIndex)> {
        self.graph
            .raw_edges()
            .iter()
            .map(|edge| (edge.source(), edge.target()))
            .collect()
    }

    /// Sorted, de-duplicated names of the objects behind `nodes`.
    pub(crate) fn participants(&self, nodes: impl Iterator<Item = NodeIndex>) -> Vec<String> {
        let names: BTreeSet<String> = nodes.map(|node| self.key(node).id.to_string()).collect();
        names.into_iter().collect()
    }
}

struct Builder<'p, 'a> {
    plan: &'p Plan<'a>,
    old_extra: &'p ExtraEdges,
    new_extra: &'p ExtraEdges,
    breaks: &'p Breaks,
    steps: StepGraph<'a>,
    drops_by_relation: HashMap<(String, String), Vec<NodeIndex>>,
    pass_through: HashMap<ObjectId, Option<NodeIndex>>,
    visiting: HashSet<ObjectId>,
}

impl<'p, 'a> Builder<'p, 'a> {
    fn before(&self) -> &'a Snapshot {
        self.plan.old
    }

    fn after(&self) -> &'a Snapshot {
        self.plan.new
    }

    fn node(&self, kind: StepKind, id: &ObjectId) -> Option<NodeIndex> {
        self.steps
            .by_key
            .get(&StepKey {
                kind,
                id: id.clone(),
            })
            .copied()
    }

    fn detached(&self, id: &ObjectId) -> bool {
        self.breaks.detached.contains(id)
    }

    /// True if the sub-element is rendered by its table's CREATE or goes away with its DROP.
    fn travels_with_table(&self, id: &ObjectId) -> bool {
        match id.kind {
            DbObjType::Column => true,
            DbObjType::Constraint => !self.detached(id),
            _ => false,
        }
    }

    fn add_step(
        &mut self,
        kind: StepKind,
        statement: &'a Statement,
        container: Option<usize>,
        order: usize,
    ) -> NodeIndex {
        let key = StepKey {
            kind,
            id: statement.id.clone(),
        };
        let node = self.steps.graph.add_node(Step {
            key: key.clone(),
            statement,
            container,
            order,
        });
        self.steps.by_key.insert(key, node);
        node
    }

    fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, kind: EdgeKind) {
        if from == to {
            return;
        }
        if kind == EdgeKind::Soft {
            let pair = (
                self.steps.key(from).clone(),
                self.steps.key(to).clone(),
            );
            if self.breaks.severed.contains(&pair) {
                return;
            }
        }
        self.steps.graph.add_edge(from, to, kind);
    }

    fn add_nodes(&mut self) -> Result<()> {
        let plan = self.plan;
        for (pos, container) in plan.containers.iter().enumerate() {
            let id = container.id();
            let state = container.state;
            if state.drops() && !(plan.dropped_with_table(id) && self.travels_with_table(id)) {
                let statement = self.before().require(id, Side::Old)?;
                let node = self.add_step(StepKind::Drop, statement, Some(pos), container.order);
                if let Some((schema, name)) = id.relation_key() {
                    self.drops_by_relation
                        .entry((schema.to_string(), name.to_string()))
                        .or_default()
                        .push(node);
                }
            }
            let absorbed = plan.created_with_table(id) && self.travels_with_table(id);
            if state.creates() && !absorbed {
                let statement = self.after().require(id, Side::New)?;
                self.add_step(StepKind::Create, statement, Some(pos), container.order);
            }
            if state.alters() && !absorbed {
                let statement = self.after().require(id, Side::New)?;
                self.add_step(StepKind::Alter, statement, Some(pos), container.order);
            }
        }

        let detached: Vec<ObjectId> = self.breaks.detached.iter().cloned().collect();
        for id in detached {
            let position = plan.position(&id);
            if let Some(statement) = self.after().get(&id) {
                let table = self.node(StepKind::Create, &self.after().top_level_of(&id));
                if let (None, Some(table)) = (self.node(StepKind::Create, &id), table) {
                    let order = self.steps.step(table).order;
                    self.add_step(StepKind::Create, statement, position, order);
                }
            }
            if let Some(statement) = self.before().get(&id) {
                let table = self.node(StepKind::Drop, &self.before().top_level_of(&id));
                if let (None, Some(table)) = (self.node(StepKind::Drop, &id), table) {
                    let order = self.steps.step(table).order;
                    self.add_step(StepKind::Drop, statement, position, order);
                }
            }
        }
        Ok(())
    }

    fn add_edges(&mut self) -> Result<()> {
        let nodes: Vec<NodeIndex> = self.steps.graph.node_indices().collect();
        for node in nodes {
            let key = self.steps.key(node).clone();
            match key.kind {
                StepKind::Create | StepKind::Alter => self.creation_edges(node, &key)?,
                StepKind::Drop => self.drop_edges(node, &key)?,
                StepKind::PassThrough => {}
            }
        }
        Ok(())
    }

    /// Edges into a create or alter step: everything it needs must exist first.
    fn creation_edges(&mut self, node: NodeIndex, key: &StepKey) -> Result<()> {
        let new = self.after();
        let statement = new.require(&key.id, Side::New)?;
        let mut sources: Vec<(&'a Statement, Option<ObjectId>)> = vec![(statement, None)];
        if key.kind == StepKind::Create {
            for child in new.children(&key.id) {
                if self.travels_with_table(&child.id) {
                    let inline = (child.kind() == DbObjType::Constraint).then(|| child.id.clone());
                    sources.push((child, inline));
                }
            }
        }

        for (source, inline) in sources {
            let deps: Vec<ObjectId> = source
                .dependencies()
                .iter()
                .chain(self.new_extra.dependencies_of(&source.id))
                .cloned()
                .collect();
            for dep in deps {
                if dep == key.id || new.is_descendant_of(&dep, &key.id) {
                    continue;
                }
                let Some((target, kind)) = self.creation_target(&dep) else {
                    continue;
                };
                let kind = match (kind, &inline) {
                    (EdgeKind::Soft, _) => EdgeKind::Soft,
                    (_, Some(constraint)) => EdgeKind::Inline(constraint.clone()),
                    (kind, None) => kind,
                };
                self.add_edge(target, node, kind);
            }
        }

        match key.kind {
            StepKind::Create => {
                if let Some(parent) = self.parent_create(statement) {
                    self.add_edge(parent, node, EdgeKind::Hard);
                }
                if let Some(drop) = self.node(StepKind::Drop, &key.id) {
                    self.add_edge(drop, node, EdgeKind::Hard);
                }
                if let Some((schema, name)) = key.id.relation_key() {
                    let drops = self
                        .drops_by_relation
                        .get(&(schema.to_string(), name.to_string()))
                        .cloned()
                        .unwrap_or_default();
                    for drop in drops {
                        self.add_edge(drop, node, EdgeKind::Hard);
                    }
                }
            }
            StepKind::Alter => {
                // An alter that stops using an object must run before that object is dropped.
                if let Some(previous) = self.before().get(&key.id) {
                    let released: Vec<ObjectId> = previous
                        .dependencies()
                        .iter()
                        .chain(self.old_extra.dependencies_of(&key.id))
                        .filter(|dep| !statement.dependencies().contains(dep))
                        .cloned()
                        .collect();
                    for dep in released {
                        if let Some(target) = self.drop_target(&dep) {
                            self.add_edge(node, target, EdgeKind::Hard);
                        }
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn parent_create(&self, statement: &Statement) -> Option<NodeIndex> {
        statement
            .parent
            .as_ref()
            .and_then(|parent| self.node(StepKind::Create, parent))
    }

    /// Edges out of a drop step: it runs before the drop or alter of everything it used.
    fn drop_edges(&mut self, node: NodeIndex, key: &StepKey) -> Result<()> {
        let old = self.before();
        let statement = old.require(&key.id, Side::Old)?;
        let mut sources: Vec<(&'a Statement, Option<ObjectId>)> = vec![(statement, None)];
        if !key.id.kind.is_sub_element() {
            for child in old.children(&key.id) {
                if child.kind().is_sub_element() && self.travels_with_table(&child.id) {
                    let inline = (child.kind() == DbObjType::Constraint).then(|| child.id.clone());
                    sources.push((child, inline));
                }
            }
        }

        for (source, inline) in sources {
            let deps: Vec<ObjectId> = source
                .dependencies()
                .iter()
                .chain(self.old_extra.dependencies_of(&source.id))
                .cloned()
                .collect();
            for dep in deps {
                if dep == key.id || old.is_descendant_of(&dep, &key.id) {
                    continue;
                }
                let kind = inline.clone().map_or(EdgeKind::Hard, EdgeKind::Inline);
                if let Some(target) = self.drop_target(&dep) {
                    self.add_edge(node, target, kind.clone());
                }
                if let Some(target) = self.node(StepKind::Alter, &dep) {
                    self.add_edge(node, target, kind);
                }
            }
        }

        if let Some(parent) = &statement.parent {
            if let Some(target) = self.node(StepKind::Drop, parent) {
                self.add_edge(node, target, EdgeKind::Hard);
            }
        }
        Ok(())
    }

    /// Step that drops `id`, directly or together with its table.
    fn drop_target(&self, id: &ObjectId) -> Option<NodeIndex> {
        self.node(StepKind::Drop, id).or_else(|| {
            if id.kind.is_sub_element() && self.travels_with_table(id) {
                self.node(StepKind::Drop, &self.before().top_level_of(id))
            } else {
                None
            }
        })
    }

    /// Step after which `id` exists in its new form, if any step is involved at all.
    fn creation_target(&mut self, id: &ObjectId) -> Option<(NodeIndex, EdgeKind)> {
        if let Some(node) = self
            .node(StepKind::Create, id)
            .or_else(|| self.node(StepKind::Alter, id))
        {
            return Some((node, EdgeKind::Hard));
        }
        if id.kind.is_sub_element() && self.travels_with_table(id) {
            if let Some(table) = self.node(StepKind::Create, &self.after().top_level_of(id)) {
                let kind = match id.kind {
                    DbObjType::Constraint => EdgeKind::Inline(id.clone()),
                    _ => EdgeKind::Hard,
                };
                return Some((table, kind));
            }
        }
        self.pass_through(id).map(|node| (node, EdgeKind::Soft))
    }

    /// Pass-through node for an object no step touches, created only if one of its own
    /// dependencies leads to a step.
    fn pass_through(&mut self, id: &ObjectId) -> Option<NodeIndex> {
        if let Some(memo) = self.pass_through.get(id) {
            return *memo;
        }
        let statement = self.after().get(id)?;
        if !self.visiting.insert(id.clone()) {
            return None;
        }
        let deps: Vec<ObjectId> = statement
            .dependencies()
            .iter()
            .chain(self.new_extra.dependencies_of(id))
            .cloned()
            .collect();
        let mut targets = Vec::new();
        for dep in deps {
            if let Some((target, _)) = self.creation_target(&dep) {
                targets.push(target);
            }
        }
        self.visiting.remove(id);

        let result = if targets.is_empty() {
            None
        } else {
            let node = self.add_step(StepKind::PassThrough, statement, None, usize::MAX);
            for target in targets {
                self.add_edge(target, node, EdgeKind::Soft);
            }
            Some(node)
        };
        self.pass_through.insert(id.clone(), result);
        result
    }
}
