//! Turns a diff tree into the flat, ordered list of elements to migrate.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::differ::{DiffElement, DiffNode, DiffSide};
use crate::error::Result;
use crate::model::{DbObjType, ObjectId, Snapshot};
use crate::utils::wildcard_regex;

/// Which diff elements the caller wants migrated.
#[derive(Debug, Clone, Default)]
pub enum Selection {
    #[default]
    All,
    /// Exactly these identities.
    Only(BTreeSet<ObjectId>),
    /// Elements whose qualified name matches any of the wildcard patterns.
    Matching(Vec<Regex>),
}

impl Selection {
    pub fn matching<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        if patterns.is_empty() {
            return Ok(Selection::All);
        }
        let patterns = patterns
            .iter()
            .map(|pattern| wildcard_regex(pattern.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Selection::Matching(patterns))
    }

    pub fn is_selected(&self, id: &ObjectId) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(ids) => ids.contains(id),
            Selection::Matching(patterns) => {
                let name = id.qualified_name();
                patterns.iter().any(|pattern| pattern.is_match(&name))
            }
        }
    }
}

/// Serialized form of an ignore rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreSpec {
    pub pattern: String,
    #[serde(default)]
    pub kinds: Vec<DbObjType>,
}

/// Excludes elements by qualified-name wildcard, optionally restricted to some object types.
#[derive(Debug, Clone)]
pub struct IgnoreRule {
    pattern: Regex,
    kinds: Vec<DbObjType>,
}

impl IgnoreRule {
    pub fn new(pattern: &str, kinds: Vec<DbObjType>) -> Result<Self> {
        Ok(IgnoreRule {
            pattern: wildcard_regex(pattern)?,
            kinds,
        })
    }

    pub fn from_spec(spec: &IgnoreSpec) -> Result<Self> {
        IgnoreRule::new(&spec.pattern, spec.kinds.clone())
    }

    pub fn matches(&self, id: &ObjectId) -> bool {
        (self.kinds.is_empty() || self.kinds.contains(&id.kind))
            && self.pattern.is_match(&id.qualified_name())
    }
}

/// Selection predicate, ignore list and allowed-type filter applied by [`flatten`].
#[derive(Debug, Clone, Default)]
pub struct SelectionFilter {
    pub selection: Selection,
    pub ignore: Vec<IgnoreRule>,
    /// `None` allows every type.
    pub allowed: Option<BTreeSet<DbObjType>>,
}

impl SelectionFilter {
    pub fn includes(&self, id: &ObjectId) -> bool {
        self.selection.is_selected(id)
            && !self.ignore.iter().any(|rule| rule.matches(id))
            && self
                .allowed
                .as_ref()
                .map_or(true, |allowed| allowed.contains(&id.kind))
    }
}

/// Flattens the diff tree in pre-order, keeping the differences the filter includes, then adds
/// one element per added, removed or changed column of every selected table present on both
/// sides.
pub fn flatten(
    tree: &DiffNode,
    old: &Snapshot,
    new: &Snapshot,
    filter: &SelectionFilter,
) -> Vec<DiffElement> {
    let mut elements = Vec::new();
    collect(tree, filter, &mut elements);

    let tables: Vec<ObjectId> = elements
        .iter()
        .filter(|element| element.side == DiffSide::Both && element.id.kind == DbObjType::Table)
        .map(|element| element.id.clone())
        .collect();
    for table in tables {
        elements.extend(column_changes(&table, old, new));
    }
    log::debug!("{} elements selected", elements.len());
    elements
}

fn collect(node: &DiffNode, filter: &SelectionFilter, out: &mut Vec<DiffElement>) {
    if node.is_difference() && filter.includes(&node.element.id) {
        out.push(node.element.clone());
    }
    for child in &node.children {
        collect(child, filter, out);
    }
}

fn column_changes(table: &ObjectId, old: &Snapshot, new: &Snapshot) -> Vec<DiffElement> {
    let mut changes = Vec::new();
    for column in new.columns(table) {
        match old.get(&column.id) {
            None => changes.push(DiffElement::new(column.id.clone(), DiffSide::Right)),
            Some(previous) if !previous.same_content(column) => {
                changes.push(DiffElement::new(column.id.clone(), DiffSide::Both))
            }
            Some(_) => {}
        }
    }
    for column in old.columns(table) {
        if !new.contains(&column.id) {
            changes.push(DiffElement::new(column.id.clone(), DiffSide::Left));
        }
    }
    changes
}
