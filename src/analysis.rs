//! Dependency extraction from view queries and SQL routine bodies.
//!
//! Queries are parsed with `sqlparser` using the dialect of the snapshot and walked with a
//! [`Visitor`] that records every relation, column identifier and function call. Names are
//! resolved against the snapshot afterwards; anything that does not resolve (built-ins, objects
//! in other databases) is skipped with a warning.

use core::ops::ControlFlow;
use indexmap::IndexMap;
use sqlparser::ast::{
    Expr, ObjectName, Query, Select, SelectItem, SetExpr, TableFactor, Visit, Visitor,
};
use sqlparser::dialect::{ClickHouseDialect, Dialect as SqlDialect, MsSqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;
use std::collections::HashSet;
use tokio::task::JoinSet;

use crate::dialect::Dialect;
use crate::error::{DiffError, Result};
use crate::model::{normalize_ident, DbObjType, NameIndex, ObjectId, Statement};

/// A deferred unit of analysis queued while a snapshot is built.
#[derive(Debug, Clone)]
pub(crate) struct AnalysisTask {
    pub id: ObjectId,
    pub sql: String,
}

/// Names referenced by one query, as written.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueryReferences {
    pub relations: Vec<Vec<String>>,
    /// Relations whose full column list is projected with `*`.
    pub wildcard_relations: Vec<Vec<String>>,
    pub columns: Vec<String>,
    pub functions: Vec<Vec<String>>,
}

impl QueryReferences {
    fn push_unique(list: &mut Vec<Vec<String>>, name: Vec<String>) {
        if !list.contains(&name) {
            list.push(name);
        }
    }
}

fn object_name_parts(name: &ObjectName) -> Vec<String> {
    name.0.iter().map(|ident| ident.value.clone()).collect()
}

/// Visitor implementation collecting query references.
#[derive(Default)]
struct ReferenceVisitor {
    refs: QueryReferences,
    ctes: HashSet<String>,
}

impl ReferenceVisitor {
    fn visit_select(&mut self, select: &Select) {
        // alias or bare name -> full relation name
        let mut sources: Vec<(String, Vec<String>)> = Vec::new();
        for table in &select.from {
            let factors = std::iter::once(&table.relation)
                .chain(table.joins.iter().map(|join| &join.relation));
            for factor in factors {
                if let TableFactor::Table { name, alias, .. } = factor {
                    let parts = object_name_parts(name);
                    let key = match alias {
                        Some(alias) => alias.name.value.clone(),
                        None => parts.last().cloned().unwrap_or_default(),
                    };
                    sources.push((key.to_ascii_lowercase(), parts));
                }
            }
        }

        for item in &select.projection {
            match item {
                SelectItem::Wildcard(_) => {
                    for (_, parts) in &sources {
                        QueryReferences::push_unique(
                            &mut self.refs.wildcard_relations,
                            parts.clone(),
                        );
                    }
                }
                SelectItem::QualifiedWildcard(name, _) => {
                    let qualifier = object_name_parts(name);
                    let key = qualifier
                        .last()
                        .map(|last| last.to_ascii_lowercase())
                        .unwrap_or_default();
                    let parts = sources
                        .iter()
                        .find(|(alias, _)| *alias == key)
                        .map(|(_, parts)| parts.clone())
                        .unwrap_or(qualifier);
                    QueryReferences::push_unique(&mut self.refs.wildcard_relations, parts);
                }
                _ => {}
            }
        }
    }

    fn visit_set_expr(&mut self, body: &SetExpr) {
        match body {
            SetExpr::Select(select) => self.visit_select(select),
            SetExpr::SetOperation { left, right, .. } => {
                self.visit_set_expr(left);
                self.visit_set_expr(right);
            }
            _ => {}
        }
    }
}

impl Visitor for ReferenceVisitor {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.ctes.insert(cte.alias.name.value.to_ascii_lowercase());
            }
        }
        self.visit_set_expr(&query.body);
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        let parts = object_name_parts(relation);
        let is_cte = parts.len() == 1
            && self.ctes.contains(&parts[0].to_ascii_lowercase());
        if !is_cte {
            QueryReferences::push_unique(&mut self.refs.relations, parts);
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        match expr {
            Expr::Identifier(ident) => {
                if !self.refs.columns.contains(&ident.value) {
                    self.refs.columns.push(ident.value.clone());
                }
            }
            Expr::CompoundIdentifier(idents) => {
                if let Some(last) = idents.last() {
                    if !self.refs.columns.contains(&last.value) {
                        self.refs.columns.push(last.value.clone());
                    }
                }
            }
            Expr::Function(function) => {
                QueryReferences::push_unique(
                    &mut self.refs.functions,
                    object_name_parts(&function.name),
                );
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }
}

fn parser_dialect(dialect: Dialect) -> Box<dyn SqlDialect> {
    match dialect {
        Dialect::Postgres => Box::new(PostgreSqlDialect {}),
        Dialect::MsSql => Box::new(MsSqlDialect {}),
        Dialect::ClickHouse => Box::new(ClickHouseDialect {}),
    }
}

/// Parses `sql` and collects the names it references. Unparseable text yields no references.
pub fn extract_references(dialect: Dialect, sql: &str) -> QueryReferences {
    let parser_dialect = parser_dialect(dialect);
    let statements = match Parser::parse_sql(parser_dialect.as_ref(), sql) {
        Ok(statements) => statements,
        Err(err) => {
            log::warn!("Skipping dependency analysis of unparseable SQL: {}", err);
            return QueryReferences::default();
        }
    };
    let mut visitor = ReferenceVisitor::default();
    for statement in &statements {
        let _ = statement.visit(&mut visitor);
    }
    visitor.refs
}

/// Runs every task on the current thread.
pub(crate) fn run_blocking(
    dialect: Dialect,
    tasks: Vec<AnalysisTask>,
) -> Vec<(ObjectId, QueryReferences)> {
    let mut results: Vec<(ObjectId, QueryReferences)> = tasks
        .into_iter()
        .map(|task| {
            let refs = extract_references(dialect, &task.sql);
            (task.id, refs)
        })
        .collect();
    results.sort_by(|a, b| a.0.cmp(&b.0));
    results
}

/// Runs every task on the blocking pool and waits for all of them.
pub(crate) async fn run_concurrent(
    dialect: Dialect,
    tasks: Vec<AnalysisTask>,
) -> Result<Vec<(ObjectId, QueryReferences)>> {
    let mut set = JoinSet::new();
    for task in tasks {
        set.spawn_blocking(move || {
            let refs = extract_references(dialect, &task.sql);
            (task.id, refs)
        });
    }

    let mut results = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        let result = joined.map_err(|err| DiffError::Analysis(err.to_string()))?;
        results.push(result);
    }
    results.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(results)
}

fn columns_of<'a>(
    statements: &'a IndexMap<ObjectId, Statement>,
    relation: &ObjectId,
) -> Vec<&'a Statement> {
    statements
        .get(relation)
        .map(|stmt| stmt.children())
        .unwrap_or(&[])
        .iter()
        .filter_map(|child| statements.get(child))
        .filter(|child| child.kind() == DbObjType::Column)
        .collect()
}

/// Maps the references of `owner` onto statements of the snapshot under construction.
pub(crate) fn resolve(
    refs: &QueryReferences,
    owner: &ObjectId,
    index: &NameIndex,
    statements: &IndexMap<ObjectId, Statement>,
) -> Vec<ObjectId> {
    let schema = owner.schema_name();
    let relation_kinds = [DbObjType::Table, DbObjType::View];
    let mut resolved: Vec<ObjectId> = Vec::new();
    let push = |id: ObjectId, resolved: &mut Vec<ObjectId>| {
        if &id != owner && !resolved.contains(&id) {
            resolved.push(id);
        }
    };

    let mut relations = Vec::new();
    for parts in &refs.relations {
        let parts: Vec<String> = parts.iter().map(|part| normalize_ident(part)).collect();
        match index.resolve(&relation_kinds, schema, &parts) {
            Some(id) => {
                relations.push(id.clone());
                push(id, &mut resolved);
            }
            None => log::warn!("{}: unresolved relation {}", owner, parts.join(".")),
        }
    }

    for parts in &refs.wildcard_relations {
        let parts: Vec<String> = parts.iter().map(|part| normalize_ident(part)).collect();
        if let Some(relation) = index.resolve(&relation_kinds, schema, &parts) {
            for column in columns_of(statements, &relation) {
                push(column.id.clone(), &mut resolved);
            }
        }
    }

    for name in &refs.columns {
        for relation in &relations {
            for column in columns_of(statements, relation) {
                if column.name().eq_ignore_ascii_case(name) {
                    push(column.id.clone(), &mut resolved);
                }
            }
        }
    }

    for parts in &refs.functions {
        let parts: Vec<String> = parts.iter().map(|part| normalize_ident(part)).collect();
        match index.resolve(&[DbObjType::Function], schema, &parts) {
            Some(id) => push(id, &mut resolved),
            None => log::debug!("{}: function {} is not in the snapshot", owner, parts.join(".")),
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ColumnDef, RoutineDef, SchemaDef, SnapshotBuilder, StatementBody, TableDef, ViewDef,
    };

    #[test]
    fn test_extract_relations_and_columns() {
        let refs = extract_references(
            Dialect::Postgres,
            "SELECT o.id, upper(c.name) FROM public.orders o JOIN customers c ON c.id = o.customer_id",
        );
        assert_eq!(
            refs.relations,
            vec![
                vec!["public".to_string(), "orders".to_string()],
                vec!["customers".to_string()]
            ]
        );
        assert!(refs.columns.contains(&"customer_id".to_string()));
        assert!(refs.functions.contains(&vec!["upper".to_string()]));
        assert!(refs.wildcard_relations.is_empty());
    }

    #[test]
    fn test_extract_wildcards() {
        let refs = extract_references(
            Dialect::Postgres,
            "SELECT t.* FROM public.t AS t UNION ALL SELECT * FROM public.u",
        );
        assert_eq!(
            refs.wildcard_relations,
            vec![
                vec!["public".to_string(), "t".to_string()],
                vec!["public".to_string(), "u".to_string()]
            ]
        );
    }

    #[test]
    fn test_ctes_are_not_relations() {
        let refs = extract_references(
            Dialect::Postgres,
            "WITH recent AS (SELECT * FROM events) SELECT count(*) FROM recent",
        );
        assert_eq!(refs.relations, vec![vec!["events".to_string()]]);
    }

    #[test]
    fn test_unparseable_sql_has_no_references() {
        let refs = extract_references(Dialect::MsSql, "THIS IS NOT SQL (");
        assert_eq!(refs, QueryReferences::default());
    }

    fn builder_with_view(query: &str) -> SnapshotBuilder {
        let mut builder = SnapshotBuilder::new(Dialect::Postgres);
        let schema = builder
            .add(
                &ObjectId::database(),
                "public",
                StatementBody::Schema(SchemaDef::default()),
            )
            .unwrap();
        let table = builder
            .add(&schema, "t", StatementBody::Table(TableDef::default()))
            .unwrap();
        for name in ["a", "b"] {
            builder
                .add(
                    &table,
                    name,
                    StatementBody::Column(ColumnDef {
                        data_type: "int".to_string(),
                        ..Default::default()
                    }),
                )
                .unwrap();
        }
        builder
            .add(
                &schema,
                "total",
                StatementBody::Function(RoutineDef {
                    language: Some("sql".to_string()),
                    returns: Some("bigint".to_string()),
                    body: "SELECT count(*) FROM t".to_string(),
                    ..Default::default()
                }),
            )
            .unwrap();
        builder
            .add(
                &schema,
                "v",
                StatementBody::View(ViewDef {
                    query: query.to_string(),
                    ..Default::default()
                }),
            )
            .unwrap();
        builder
    }

    #[test]
    fn test_select_star_depends_on_every_column() {
        let mut builder = builder_with_view("SELECT * FROM t");
        builder.drain_analysis_blocking();
        let snapshot = builder.build().unwrap();
        let view = snapshot.get(&ObjectId::view("public", "v")).unwrap();
        assert_eq!(
            view.dependencies(),
            &[
                ObjectId::table("public", "t"),
                ObjectId::column("public", "t", "a"),
                ObjectId::column("public", "t", "b"),
            ]
        );
        let function = snapshot
            .get(&ObjectId::function("public", "total", &[]))
            .unwrap();
        assert_eq!(function.dependencies(), &[ObjectId::table("public", "t")]);
    }

    #[tokio::test]
    async fn test_concurrent_drain_matches_blocking_drain() {
        let query = "SELECT b, public.total() FROM public.t";
        let mut blocking = builder_with_view(query);
        blocking.drain_analysis_blocking();
        let mut concurrent = builder_with_view(query);
        concurrent.drain_analysis().await.unwrap();
        assert_eq!(concurrent.pending_analysis(), 0);

        let (blocking, concurrent) = (blocking.build().unwrap(), concurrent.build().unwrap());
        let id = ObjectId::view("public", "v");
        assert_eq!(
            blocking.get(&id).unwrap().dependencies(),
            concurrent.get(&id).unwrap().dependencies()
        );
        assert_eq!(
            concurrent.get(&id).unwrap().dependencies(),
            &[
                ObjectId::table("public", "t"),
                ObjectId::column("public", "t", "b"),
                ObjectId::function("public", "total", &[]),
            ]
        );
    }
}
