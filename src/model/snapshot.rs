use indexmap::IndexMap;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use super::{ColumnDef, DbObjType, ObjectId, Side, StatementBody};
use crate::analysis::{self, AnalysisTask, QueryReferences};
use crate::dialect::Dialect;
use crate::error::{DiffError, Result};

/// SHA-256 digest over the semantically significant fields of a statement.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    fn finish(hasher: Sha256) -> Self {
        ContentHash(hasher.finalize().into())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &hex::encode(self.0)[..12])
    }
}

/// One schema object inside a snapshot.
#[derive(Debug, Clone)]
pub struct Statement {
    pub id: ObjectId,
    pub parent: Option<ObjectId>,
    pub owner: Option<String>,
    pub comment: Option<String>,
    pub body: StatementBody,
    children: Vec<ObjectId>,
    explicit_deps: Vec<ObjectId>,
    deps: Vec<ObjectId>,
    hash: ContentHash,
    element_hash: ContentHash,
    tree_hash: ContentHash,
}

impl Statement {
    fn new(id: ObjectId, parent: Option<ObjectId>, body: StatementBody) -> Self {
        Statement {
            id,
            parent,
            owner: None,
            comment: None,
            body,
            children: Vec::new(),
            explicit_deps: Vec::new(),
            deps: Vec::new(),
            hash: ContentHash::default(),
            element_hash: ContentHash::default(),
            tree_hash: ContentHash::default(),
        }
    }

    pub fn kind(&self) -> DbObjType {
        self.id.kind
    }

    /// Bare name as written in DDL (routine signatures stripped).
    pub fn name(&self) -> &str {
        self.id.bare_name()
    }

    pub fn children(&self) -> &[ObjectId] {
        &self.children
    }

    /// Every statement this one depends on, excluding its parent.
    pub fn dependencies(&self) -> &[ObjectId] {
        &self.deps
    }

    /// Hash over the statement's own fields.
    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    /// Own hash combined with the ordered hashes of the columns, which are compared as part of
    /// their table.
    pub fn element_hash(&self) -> ContentHash {
        self.element_hash
    }

    /// Element hash combined with the order-insensitive hashes of every other child subtree.
    pub fn tree_hash(&self) -> ContentHash {
        self.tree_hash
    }

    /// Structural equality of the statement's own fields.
    pub fn same_content(&self, other: &Statement) -> bool {
        self.hash == other.hash
            && self.body == other.body
            && self.owner == other.owner
            && self.comment == other.comment
    }

    pub fn column(&self) -> Option<&ColumnDef> {
        match &self.body {
            StatementBody::Column(column) => Some(column),
            _ => None,
        }
    }

    fn push_dependency(&mut self, dep: ObjectId) {
        if dep != self.id && !self.deps.contains(&dep) {
            self.deps.push(dep);
        }
    }

    fn compute_own_hash(&self) -> ContentHash {
        let mut hasher = Sha256::new();
        hasher.update(self.id.kind.keyword().as_bytes());
        // Plain data with string keys; serialization cannot fail.
        hasher.update(serde_json::to_vec(&self.body).unwrap_or_default());
        for (tag, value) in [("owner", &self.owner), ("comment", &self.comment)] {
            if let Some(value) = value {
                hasher.update(tag.as_bytes());
                hasher.update([0u8]);
                hasher.update(value.as_bytes());
                hasher.update([0u8]);
            }
        }
        ContentHash::finish(hasher)
    }
}

/// Case-insensitive name lookup over a set of statements.
pub(crate) struct NameIndex {
    by_name: HashMap<(DbObjType, String), Vec<ObjectId>>,
}

impl NameIndex {
    fn build<'a>(statements: impl Iterator<Item = &'a Statement>) -> Self {
        let mut by_name: HashMap<(DbObjType, String), Vec<ObjectId>> = HashMap::new();
        for stmt in statements {
            by_name
                .entry((stmt.kind(), stmt.name().to_ascii_lowercase()))
                .or_default()
                .push(stmt.id.clone());
        }
        NameIndex { by_name }
    }

    /// Resolves `[schema.]name` against the given kinds. Unqualified names prefer
    /// `default_schema`, then a unique match anywhere.
    pub(crate) fn resolve(
        &self,
        kinds: &[DbObjType],
        default_schema: Option<&str>,
        parts: &[String],
    ) -> Option<ObjectId> {
        let name = normalize_ident(parts.last()?);
        let schema = match parts.len() {
            0 | 1 => None,
            len => Some(normalize_ident(&parts[len - 2])),
        };
        let candidates: Vec<&ObjectId> = kinds
            .iter()
            .filter_map(|kind| self.by_name.get(&(*kind, name.to_ascii_lowercase())))
            .flatten()
            .collect();

        let in_schema = |wanted: &str| {
            candidates
                .iter()
                .find(|id| {
                    id.schema_name()
                        .is_some_and(|schema| schema.eq_ignore_ascii_case(wanted))
                })
                .map(|id| (*id).clone())
        };

        match (schema, default_schema) {
            (Some(schema), _) => in_schema(&schema),
            (None, Some(default)) => in_schema(default).or_else(|| match candidates.as_slice() {
                [only] => Some((*only).clone()),
                _ => None,
            }),
            (None, None) => match candidates.as_slice() {
                [only] => Some((*only).clone()),
                _ => None,
            },
        }
    }
}

/// Strips identifier quoting of any of the supported dialects.
pub(crate) fn normalize_ident(ident: &str) -> String {
    ident
        .trim()
        .trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']')
        .to_string()
}

fn sequence_reference_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"(?i)nextval\(\s*'([^']+)'").expect("valid nextval pattern"),
            Regex::new(r#"(?i)next\s+value\s+for\s+([\w\.\[\]"`]+)"#)
                .expect("valid next value pattern"),
        ]
    })
}

/// Mutable snapshot under construction.
///
/// Statements are added top-down (a parent before its children). Views and SQL-language
/// routines queue an analysis task when added; the queue must be drained before
/// [`SnapshotBuilder::build`] is called.
#[derive(Debug)]
pub struct SnapshotBuilder {
    dialect: Dialect,
    statements: IndexMap<ObjectId, Statement>,
    pending: Vec<AnalysisTask>,
}

impl SnapshotBuilder {
    pub fn new(dialect: Dialect) -> Self {
        let root = ObjectId::database();
        let mut statements = IndexMap::new();
        statements.insert(
            root.clone(),
            Statement::new(root, None, StatementBody::Database),
        );
        SnapshotBuilder {
            dialect,
            statements,
            pending: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn get(&self, id: &ObjectId) -> Option<&Statement> {
        self.statements.get(id)
    }

    /// Adds a statement named `name` under `parent` and returns its identity.
    pub fn add(
        &mut self,
        parent: &ObjectId,
        name: &str,
        body: StatementBody,
    ) -> Result<ObjectId> {
        let kind = body.kind();
        let id = parent.child(kind, &body.identity_name(name));
        let parent_kind = self
            .statements
            .get(parent)
            .map(Statement::kind)
            .ok_or_else(|| DiffError::MissingDependency {
                from: id.clone(),
                to: parent.clone(),
            })?;
        if !kind.can_be_child_of(parent_kind) {
            return Err(DiffError::InvalidHierarchy {
                parent: parent.clone(),
                child: id,
            });
        }
        if self.statements.contains_key(&id) {
            return Err(DiffError::DuplicateObject(id));
        }

        match &body {
            StatementBody::View(view) => self.pending.push(AnalysisTask {
                id: id.clone(),
                sql: view.query.clone(),
            }),
            StatementBody::Function(routine) | StatementBody::Procedure(routine)
                if routine
                    .language
                    .as_deref()
                    .is_some_and(|lang| lang.eq_ignore_ascii_case("sql")) =>
            {
                self.pending.push(AnalysisTask {
                    id: id.clone(),
                    sql: routine.body.clone(),
                })
            }
            _ => {}
        }

        if let Some(parent_stmt) = self.statements.get_mut(parent) {
            parent_stmt.children.push(id.clone());
        }
        self.statements
            .insert(id.clone(), Statement::new(id.clone(), Some(parent.clone()), body));
        Ok(id)
    }

    pub fn set_owner(&mut self, id: &ObjectId, owner: impl Into<String>) -> Result<()> {
        self.statement_mut(id)?.owner = Some(owner.into());
        Ok(())
    }

    pub fn set_comment(&mut self, id: &ObjectId, comment: impl Into<String>) -> Result<()> {
        self.statement_mut(id)?.comment = Some(comment.into());
        Ok(())
    }

    /// Declares a dependency the model cannot discover by itself.
    pub fn add_dependency(&mut self, id: &ObjectId, dependency: ObjectId) -> Result<()> {
        let stmt = self.statement_mut(id)?;
        if !stmt.explicit_deps.contains(&dependency) {
            stmt.explicit_deps.push(dependency);
        }
        Ok(())
    }

    fn statement_mut(&mut self, id: &ObjectId) -> Result<&mut Statement> {
        self.statements
            .get_mut(id)
            .ok_or_else(|| DiffError::MissingDependency {
                from: ObjectId::database(),
                to: id.clone(),
            })
    }

    pub fn pending_analysis(&self) -> usize {
        self.pending.len()
    }

    /// Runs every queued analysis task on the current thread.
    pub fn drain_analysis_blocking(&mut self) {
        let tasks = std::mem::take(&mut self.pending);
        let results = analysis::run_blocking(self.dialect, tasks);
        self.apply_references(results);
    }

    /// Runs every queued analysis task on the blocking worker pool and joins them.
    pub async fn drain_analysis(&mut self) -> Result<()> {
        let tasks = std::mem::take(&mut self.pending);
        let results = analysis::run_concurrent(self.dialect, tasks).await?;
        self.apply_references(results);
        Ok(())
    }

    fn apply_references(&mut self, results: Vec<(ObjectId, QueryReferences)>) {
        if results.is_empty() {
            return;
        }
        let index = NameIndex::build(self.statements.values());
        for (id, refs) in results {
            let resolved = analysis::resolve(&refs, &id, &index, &self.statements);
            log::debug!("{} references {} objects", id, resolved.len());
            if let Some(stmt) = self.statements.get_mut(&id) {
                for dep in resolved {
                    stmt.push_dependency(dep);
                }
            }
        }
    }

    /// Validates explicit dependencies, derives implicit ones, computes hashes and freezes the
    /// snapshot.
    pub fn build(mut self) -> Result<Snapshot> {
        if !self.pending.is_empty() {
            return Err(DiffError::PendingAnalysis(self.pending.len()));
        }

        for stmt in self.statements.values() {
            let referenced = match &stmt.body {
                StatementBody::Constraint(constraint) => constraint
                    .references
                    .as_ref()
                    .map(|target| ObjectId::table(&target.schema, &target.table)),
                _ => None,
            };
            for dep in stmt.explicit_deps.iter().chain(referenced.as_ref()) {
                if !self.statements.contains_key(dep) {
                    return Err(DiffError::MissingDependency {
                        from: stmt.id.clone(),
                        to: dep.clone(),
                    });
                }
            }
        }

        let index = NameIndex::build(self.statements.values());
        let derived: Vec<(ObjectId, Vec<ObjectId>)> = self
            .statements
            .values()
            .map(|stmt| (stmt.id.clone(), derive_dependencies(stmt, &self.statements, &index)))
            .collect();
        for (id, deps) in derived {
            if let Some(stmt) = self.statements.get_mut(&id) {
                let explicit = std::mem::take(&mut stmt.explicit_deps);
                for dep in explicit.iter().cloned().chain(deps) {
                    stmt.push_dependency(dep);
                }
                stmt.explicit_deps = explicit;
            }
        }

        // Children are always inserted after their parent, so reverse insertion order hashes
        // every child before its owner.
        let ids: Vec<ObjectId> = self.statements.keys().rev().cloned().collect();
        for id in &ids {
            let (hash, element_hash, tree_hash) = {
                let stmt = &self.statements[id];
                let hash = stmt.compute_own_hash();

                let mut element = Sha256::new();
                element.update(hash.0);
                let mut others: Vec<(String, ContentHash)> = Vec::new();
                for child_id in &stmt.children {
                    let child = &self.statements[child_id];
                    if child.kind() == DbObjType::Column {
                        element.update(child.id.name().as_bytes());
                        element.update(child.hash.0);
                    } else {
                        others.push((child.id.to_string(), child.tree_hash));
                    }
                }
                let element_hash = ContentHash::finish(element);

                others.sort();
                let mut tree = Sha256::new();
                tree.update(element_hash.0);
                for (name, child_hash) in &others {
                    tree.update(name.as_bytes());
                    tree.update(child_hash.0);
                }
                (hash, element_hash, ContentHash::finish(tree))
            };
            if let Some(stmt) = self.statements.get_mut(id) {
                stmt.hash = hash;
                stmt.element_hash = element_hash;
                stmt.tree_hash = tree_hash;
            }
        }

        let mut dependents: HashMap<ObjectId, Vec<ObjectId>> = HashMap::new();
        for stmt in self.statements.values() {
            for dep in &stmt.deps {
                dependents.entry(dep.clone()).or_default().push(stmt.id.clone());
            }
        }

        log::debug!(
            "built {} snapshot with {} statements",
            self.dialect,
            self.statements.len()
        );
        Ok(Snapshot {
            dialect: self.dialect,
            statements: self.statements,
            dependents,
        })
    }
}

/// Dependencies implied by typed fields of a statement.
fn derive_dependencies(
    stmt: &Statement,
    statements: &IndexMap<ObjectId, Statement>,
    index: &NameIndex,
) -> Vec<ObjectId> {
    let own_schema = stmt.id.schema_name();
    let mut deps = Vec::new();
    let resolve_type = |data_type: &str| -> Option<ObjectId> {
        let base = data_type.trim().trim_end_matches("[]");
        let base = base.split('(').next().unwrap_or(base).trim();
        let parts: Vec<String> = base.split('.').map(str::to_string).collect();
        index.resolve(&[DbObjType::Type], own_schema, &parts)
    };
    let column_of = |table: &ObjectId, name: &str| -> Option<ObjectId> {
        let id = table.child(DbObjType::Column, &normalize_ident(name));
        statements.contains_key(&id).then_some(id)
    };

    match &stmt.body {
        StatementBody::Column(column) => {
            deps.extend(resolve_type(&column.data_type));
            if let Some(default) = &column.default {
                for pattern in sequence_reference_patterns() {
                    for captures in pattern.captures_iter(default) {
                        let parts: Vec<String> =
                            captures[1].split('.').map(normalize_ident).collect();
                        deps.extend(index.resolve(&[DbObjType::Sequence], own_schema, &parts));
                    }
                }
            }
        }
        StatementBody::Constraint(constraint) => {
            if let Some(table) = &stmt.parent {
                deps.extend(
                    constraint
                        .columns
                        .iter()
                        .filter_map(|column| column_of(table, column)),
                );
            }
            if let Some(reference) = &constraint.references {
                // Presence of the target is checked in `build`.
                let target = ObjectId::table(&reference.schema, &reference.table);
                deps.extend(
                    reference
                        .columns
                        .iter()
                        .filter_map(|column| column_of(&target, column)),
                );
                deps.push(target);
            }
        }
        StatementBody::Index(index_def) => {
            if let Some(table) = &stmt.parent {
                for key in &index_def.columns {
                    let column = key
                        .trim()
                        .trim_end_matches(" DESC")
                        .trim_end_matches(" ASC")
                        .trim_end_matches(" desc")
                        .trim_end_matches(" asc");
                    deps.extend(column_of(table, column));
                }
            }
        }
        StatementBody::Trigger(trigger) => {
            if let Some(function) = &trigger.function {
                let name = function.split('(').next().unwrap_or(function);
                let parts: Vec<String> = name.split('.').map(str::to_string).collect();
                deps.extend(index.resolve(&[DbObjType::Function], own_schema, &parts));
            }
        }
        StatementBody::Function(routine) | StatementBody::Procedure(routine) => {
            for arg in &routine.arguments {
                deps.extend(resolve_type(&arg.data_type));
            }
            if let Some(returns) = &routine.returns {
                deps.extend(resolve_type(returns));
            }
        }
        StatementBody::Type(type_def) => {
            for attribute in &type_def.attributes {
                deps.extend(resolve_type(&attribute.data_type));
            }
            if let Some(base) = &type_def.base_type {
                deps.extend(resolve_type(base));
            }
        }
        _ => {}
    }
    deps
}

/// Immutable, fully analyzed schema tree.
#[derive(Debug)]
pub struct Snapshot {
    dialect: Dialect,
    statements: IndexMap<ObjectId, Statement>,
    dependents: HashMap<ObjectId, Vec<ObjectId>>,
}

impl Snapshot {
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn root(&self) -> &Statement {
        &self.statements[0]
    }

    pub fn get(&self, id: &ObjectId) -> Option<&Statement> {
        self.statements.get(id)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.statements.contains_key(id)
    }

    /// Lookup that treats absence as an internal-consistency fault.
    pub fn require(&self, id: &ObjectId, side: Side) -> Result<&Statement> {
        self.get(id).ok_or_else(|| DiffError::UnresolvedReference {
            id: id.clone(),
            side,
        })
    }

    /// Qualified lookup by container, name and type.
    pub fn find(&self, container: &ObjectId, name: &str, kind: DbObjType) -> Option<&Statement> {
        self.get(&container.child(kind, name)).or_else(|| {
            self.children(container)
                .find(|child| child.kind() == kind && child.name() == name)
        })
    }

    pub fn children<'a>(&'a self, id: &ObjectId) -> impl Iterator<Item = &'a Statement> + 'a {
        self.get(id)
            .map(|stmt| stmt.children.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(|child| self.statements.get(child))
    }

    /// Columns of a table in declaration order.
    pub fn columns<'a>(&'a self, table: &ObjectId) -> impl Iterator<Item = &'a Statement> + 'a {
        self.children(table)
            .filter(|child| child.kind() == DbObjType::Column)
    }

    /// Every statement below `id`, parents before children.
    pub fn descendants(&self, id: &ObjectId) -> Vec<&Statement> {
        let mut out = Vec::new();
        let mut stack: Vec<&Statement> = self.children(id).collect();
        stack.reverse();
        while let Some(stmt) = stack.pop() {
            out.push(stmt);
            let mut children: Vec<&Statement> = self.children(&stmt.id).collect();
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Statements whose dependency list names `id`.
    pub fn dependents(&self, id: &ObjectId) -> &[ObjectId] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nearest ancestor-or-self that is not a sub-element.
    pub fn top_level_of(&self, id: &ObjectId) -> ObjectId {
        let mut current = id.clone();
        while current.kind.is_sub_element() {
            match self.get(&current).and_then(|stmt| stmt.parent.clone()) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        current
    }

    /// True if `ancestor` owns `id` directly or transitively.
    pub fn is_descendant_of(&self, id: &ObjectId, ancestor: &ObjectId) -> bool {
        let mut current = self.get(id).and_then(|stmt| stmt.parent.as_ref());
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.get(parent).and_then(|stmt| stmt.parent.as_ref());
        }
        false
    }

    pub fn statements(&self) -> impl Iterator<Item = &Statement> {
        self.statements.values()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.len() <= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ConstraintDef, ConstraintType, ForeignKeyRef, SchemaDef, TableDef, ViewDef,
    };

    fn column(data_type: &str) -> StatementBody {
        StatementBody::Column(ColumnDef {
            data_type: data_type.to_string(),
            ..Default::default()
        })
    }

    fn base_builder() -> (SnapshotBuilder, ObjectId) {
        let mut builder = SnapshotBuilder::new(Dialect::Postgres);
        let schema = builder
            .add(
                &ObjectId::database(),
                "public",
                StatementBody::Schema(SchemaDef::default()),
            )
            .unwrap();
        (builder, schema)
    }

    #[test]
    fn test_rejects_invalid_hierarchy_and_duplicates() {
        let (mut builder, schema) = base_builder();
        let err = builder
            .add(&ObjectId::database(), "t", StatementBody::Table(TableDef::default()))
            .unwrap_err();
        assert!(matches!(err, DiffError::InvalidHierarchy { .. }));

        builder
            .add(&schema, "t", StatementBody::Table(TableDef::default()))
            .unwrap();
        let err = builder
            .add(&schema, "t", StatementBody::Table(TableDef::default()))
            .unwrap_err();
        assert!(matches!(err, DiffError::DuplicateObject(_)));
    }

    #[test]
    fn test_column_order_changes_table_hash_but_not_own_hash() {
        let build = |names: &[&str]| {
            let (mut builder, schema) = base_builder();
            let table = builder
                .add(&schema, "t", StatementBody::Table(TableDef::default()))
                .unwrap();
            for name in names {
                builder.add(&table, name, column("int")).unwrap();
            }
            builder.build().unwrap()
        };
        let first = build(&["a", "b"]);
        let second = build(&["b", "a"]);
        let table = ObjectId::table("public", "t");
        let (left, right) = (first.get(&table).unwrap(), second.get(&table).unwrap());
        assert_eq!(left.hash(), right.hash());
        assert!(left.same_content(right));
        assert_ne!(left.element_hash(), right.element_hash());
    }

    #[test]
    fn test_index_order_does_not_change_tree_hash() {
        let build = |names: &[&str]| {
            let (mut builder, schema) = base_builder();
            let table = builder
                .add(&schema, "t", StatementBody::Table(TableDef::default()))
                .unwrap();
            builder.add(&table, "a", column("int")).unwrap();
            for name in names {
                builder
                    .add(
                        &table,
                        name,
                        StatementBody::Index(crate::model::IndexDef {
                            columns: vec!["a".to_string()],
                            ..Default::default()
                        }),
                    )
                    .unwrap();
            }
            builder.build().unwrap()
        };
        let table = ObjectId::table("public", "t");
        assert_eq!(
            build(&["i1", "i2"]).get(&table).unwrap().tree_hash(),
            build(&["i2", "i1"]).get(&table).unwrap().tree_hash()
        );
    }

    #[test]
    fn test_derived_dependencies() {
        let (mut builder, schema) = base_builder();
        builder
            .add(
                &schema,
                "mood",
                StatementBody::Type(crate::model::TypeDef {
                    labels: vec!["happy".to_string()],
                    ..Default::default()
                }),
            )
            .unwrap();
        builder
            .add(
                &schema,
                "ids",
                StatementBody::Sequence(crate::model::SequenceDef::default()),
            )
            .unwrap();
        let parent = builder
            .add(&schema, "parent", StatementBody::Table(TableDef::default()))
            .unwrap();
        builder.add(&parent, "id", column("int")).unwrap();
        let child = builder
            .add(&schema, "child", StatementBody::Table(TableDef::default()))
            .unwrap();
        builder
            .add(
                &child,
                "id",
                StatementBody::Column(ColumnDef {
                    data_type: "bigint".to_string(),
                    default: Some("nextval('public.ids'::regclass)".to_string()),
                    ..Default::default()
                }),
            )
            .unwrap();
        builder.add(&child, "feeling", column("mood")).unwrap();
        builder.add(&child, "parent_id", column("int")).unwrap();
        builder
            .add(
                &child,
                "child_parent_fk",
                StatementBody::Constraint(ConstraintDef {
                    constraint_type: ConstraintType::ForeignKey,
                    columns: vec!["parent_id".to_string()],
                    expression: None,
                    references: Some(ForeignKeyRef {
                        schema: "public".to_string(),
                        table: "parent".to_string(),
                        columns: vec!["id".to_string()],
                        on_delete: None,
                        on_update: None,
                    }),
                }),
            )
            .unwrap();
        let snapshot = builder.build().unwrap();

        let id_col = snapshot.get(&ObjectId::column("public", "child", "id")).unwrap();
        assert_eq!(id_col.dependencies(), &[ObjectId::sequence("public", "ids")]);

        let feeling = snapshot
            .get(&ObjectId::column("public", "child", "feeling"))
            .unwrap();
        assert_eq!(feeling.dependencies(), &[ObjectId::user_type("public", "mood")]);

        let fk = snapshot
            .get(&ObjectId::constraint("public", "child", "child_parent_fk"))
            .unwrap();
        assert!(fk
            .dependencies()
            .contains(&ObjectId::table("public", "parent")));
        assert!(fk
            .dependencies()
            .contains(&ObjectId::column("public", "parent", "id")));
        assert!(snapshot
            .dependents(&ObjectId::table("public", "parent"))
            .contains(&fk.id));
    }

    #[test]
    fn test_build_requires_drained_analysis() {
        let (mut builder, schema) = base_builder();
        builder
            .add(
                &schema,
                "v",
                StatementBody::View(ViewDef {
                    query: "SELECT 1".to_string(),
                    ..Default::default()
                }),
            )
            .unwrap();
        assert_eq!(builder.pending_analysis(), 1);
        let err = builder.build().unwrap_err();
        assert!(matches!(err, DiffError::PendingAnalysis(1)));
    }

    #[test]
    fn test_explicit_dependency_must_exist() {
        let (mut builder, schema) = base_builder();
        let table = builder
            .add(&schema, "t", StatementBody::Table(TableDef::default()))
            .unwrap();
        builder
            .add_dependency(&table, ObjectId::table("public", "missing"))
            .unwrap();
        assert!(matches!(
            builder.build().unwrap_err(),
            DiffError::MissingDependency { .. }
        ));
    }

    #[test]
    fn test_foreign_key_target_must_exist() {
        let (mut builder, schema) = base_builder();
        let table = builder
            .add(&schema, "t", StatementBody::Table(TableDef::default()))
            .unwrap();
        builder.add(&table, "other_id", column("int")).unwrap();
        builder
            .add(
                &table,
                "t_other_fk",
                StatementBody::Constraint(ConstraintDef {
                    constraint_type: ConstraintType::ForeignKey,
                    columns: vec!["other_id".to_string()],
                    expression: None,
                    references: Some(ForeignKeyRef {
                        schema: "public".to_string(),
                        table: "other".to_string(),
                        columns: vec!["id".to_string()],
                        on_delete: None,
                        on_update: None,
                    }),
                }),
            )
            .unwrap();
        match builder.build().unwrap_err() {
            DiffError::MissingDependency { from, to } => {
                assert_eq!(from, ObjectId::constraint("public", "t", "t_other_fk"));
                assert_eq!(to, ObjectId::table("public", "other"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_descendants_and_top_level() {
        let (mut builder, schema) = base_builder();
        let table = builder
            .add(&schema, "t", StatementBody::Table(TableDef::default()))
            .unwrap();
        builder.add(&table, "a", column("int")).unwrap();
        let snapshot = builder.build().unwrap();
        let col = ObjectId::column("public", "t", "a");
        assert_eq!(snapshot.top_level_of(&col), table);
        assert!(snapshot.is_descendant_of(&col, &schema));
        let names: Vec<String> = snapshot
            .descendants(&schema)
            .iter()
            .map(|stmt| stmt.id.to_string())
            .collect();
        assert_eq!(names, vec!["TABLE public.t", "COLUMN public.t.a"]);
        assert!(snapshot.find(&table, "a", DbObjType::Column).is_some());
    }
}
