//! Side-by-side comparison of two snapshots.
//!
//! The differ walks both statement trees from their database roots and builds a tree of
//! [`DiffNode`]s over the union of both. Statements present on both sides are compared through
//! their precomputed hashes only. Columns are never diff nodes: they feed the element hash of
//! their table and are expanded again by the selection flattener.

use std::fmt;

use crate::error::{DiffError, Result};
use crate::model::{DbObjType, ObjectId, Side, Snapshot, Statement};

/// Which snapshots hold a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffSide {
    /// Only in the old snapshot; the statement is dropped.
    Left,
    /// Only in the new snapshot; the statement is added.
    Right,
    Both,
}

impl DiffSide {
    pub fn symbol(self) -> &'static str {
        match self {
            DiffSide::Left => "-",
            DiffSide::Right => "+",
            DiffSide::Both => "~",
        }
    }
}

/// A statement identity together with the side it lives on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiffElement {
    pub id: ObjectId,
    pub side: DiffSide,
}

impl DiffElement {
    pub fn new(id: ObjectId, side: DiffSide) -> Self {
        DiffElement { id, side }
    }

    /// Old and new statements of the element; fails if the element is absent from a snapshot
    /// its side says it lives in.
    pub fn statements<'a>(
        &self,
        old: &'a Snapshot,
        new: &'a Snapshot,
    ) -> Result<(Option<&'a Statement>, Option<&'a Statement>)> {
        let old_stmt = match self.side {
            DiffSide::Left | DiffSide::Both => Some(old.require(&self.id, Side::Old)?),
            DiffSide::Right => None,
        };
        let new_stmt = match self.side {
            DiffSide::Right | DiffSide::Both => Some(new.require(&self.id, Side::New)?),
            DiffSide::Left => None,
        };
        Ok((old_stmt, new_stmt))
    }
}

impl fmt::Display for DiffElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.side.symbol(), self.id)
    }
}

#[derive(Debug, Clone)]
pub struct DiffNode {
    pub element: DiffElement,
    /// For `Both`, whether the statement itself (or one of its columns) differs. Unchanged
    /// containers are kept only as parents of changed descendants.
    pub changed: bool,
    pub children: Vec<DiffNode>,
}

impl DiffNode {
    /// True if this node or any node below it is a difference.
    pub fn has_changes(&self) -> bool {
        self.is_difference() || self.children.iter().any(DiffNode::has_changes)
    }

    /// True if the node itself is added, removed or changed.
    pub fn is_difference(&self) -> bool {
        self.element.side != DiffSide::Both || self.changed
    }
}

/// Compares two snapshots and returns the diff tree rooted at the database.
pub fn diff_tree(old: &Snapshot, new: &Snapshot) -> Result<DiffNode> {
    if old.dialect() != new.dialect() {
        return Err(DiffError::DialectMismatch {
            old: old.dialect(),
            new: new.dialect(),
        });
    }
    let root = compare(old, new, old.root(), new.root())?;
    let node = root.unwrap_or_else(|| DiffNode {
        element: DiffElement::new(ObjectId::database(), DiffSide::Both),
        changed: false,
        children: Vec::new(),
    });
    log::debug!("diff tree has {} nodes", count(&node));
    Ok(node)
}

fn count(node: &DiffNode) -> usize {
    1 + node.children.iter().map(count).sum::<usize>()
}

/// Compares a statement present on both sides; `None` if the subtrees are identical.
fn compare(
    old: &Snapshot,
    new: &Snapshot,
    left: &Statement,
    right: &Statement,
) -> Result<Option<DiffNode>> {
    if left.body.kind() != right.body.kind() {
        return Err(DiffError::TypeMismatch {
            id: right.id.clone(),
            left: left.body.kind(),
            right: right.body.kind(),
        });
    }
    if left.tree_hash() == right.tree_hash() {
        return Ok(None);
    }

    let changed = left.element_hash() != right.element_hash();
    let mut children = Vec::new();
    for child in new.children(&right.id) {
        if child.kind() == DbObjType::Column {
            continue;
        }
        match old.get(&child.id) {
            Some(old_child) => {
                if let Some(node) = compare(old, new, old_child, child)? {
                    children.push(node);
                }
            }
            None => children.push(one_sided(new, child, DiffSide::Right)),
        }
    }
    for child in old.children(&left.id) {
        if child.kind() != DbObjType::Column && !new.contains(&child.id) {
            children.push(one_sided(old, child, DiffSide::Left));
        }
    }

    if !changed && children.is_empty() {
        return Ok(None);
    }
    Ok(Some(DiffNode {
        element: DiffElement::new(right.id.clone(), DiffSide::Both),
        changed,
        children,
    }))
}

/// A whole subtree that exists on one side only.
fn one_sided(snapshot: &Snapshot, stmt: &Statement, side: DiffSide) -> DiffNode {
    DiffNode {
        element: DiffElement::new(stmt.id.clone(), side),
        changed: true,
        children: snapshot
            .children(&stmt.id)
            .filter(|child| child.kind() != DbObjType::Column)
            .map(|child| one_sided(snapshot, child, side))
            .collect(),
    }
}
