use std::collections::BTreeSet;

use super::{constraint_definition, AlterOutcome, AlterSql, Dialect, SqlGenerator};
use crate::error::{DiffError, Result};
use crate::model::{
    ColumnDef, DbObjType, ObjectId, RoutineDef, SequenceDef, Snapshot, Statement, StatementBody,
    TableDef, TriggerDef, TypeVariant, ViewDef,
};

const MS: Dialect = Dialect::MsSql;

fn q(ident: &str) -> String {
    MS.quote_ident(ident)
}

/// Unicode string literal.
fn n_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

pub struct MsSqlGenerator;

impl MsSqlGenerator {
    /// Defaults are created as named constraints so they can be replaced later.
    fn default_constraint_name(&self, column: &ObjectId) -> String {
        match column.path.as_slice() {
            [_, table, name] => format!("DF_{}_{}", table, name),
            _ => format!("DF_{}", column.name()),
        }
    }

    fn column_definition(&self, id: &ObjectId, column: &ColumnDef) -> String {
        let mut sql = format!("{} {}", q(id.name()), column.data_type);
        if let Some(collation) = &column.collation {
            sql.push_str(&format!(" COLLATE {}", collation));
        }
        sql.push_str(if column.not_null { " NOT NULL" } else { " NULL" });
        if let Some(default) = &column.default {
            sql.push_str(&format!(
                " CONSTRAINT {} DEFAULT {}",
                q(&self.default_constraint_name(id)),
                default
            ));
        }
        sql
    }

    /// `level0/level1/level2` arguments of the extended property procedures.
    fn property_levels(&self, stmt: &Statement) -> Option<String> {
        let level1 = match stmt.kind() {
            DbObjType::Table | DbObjType::Column => "TABLE",
            DbObjType::View => "VIEW",
            DbObjType::Function => "FUNCTION",
            DbObjType::Procedure => "PROCEDURE",
            _ => return None,
        };
        let path = &stmt.id.path;
        let mut levels = format!(
            "@level0type = N'SCHEMA', @level0name = {}, @level1type = N'{}', @level1name = {}",
            n_literal(path.first()?),
            level1,
            n_literal(stmt.id.path.get(1).map(|name| {
                name.split('(').next().unwrap_or(name)
            })?)
        );
        if stmt.kind() == DbObjType::Column {
            levels.push_str(&format!(
                ", @level2type = N'COLUMN', @level2name = {}",
                n_literal(stmt.name())
            ));
        }
        Some(levels)
    }

    fn comment_sql(&self, old: Option<&str>, stmt: &Statement) -> Option<String> {
        let levels = self.property_levels(stmt)?;
        Some(match (old, &stmt.comment) {
            (None, Some(comment)) => format!(
                "EXEC sys.sp_addextendedproperty @name = N'MS_Description', @value = {}, {}",
                n_literal(comment),
                levels
            ),
            (Some(_), Some(comment)) => format!(
                "EXEC sys.sp_updateextendedproperty @name = N'MS_Description', @value = {}, {}",
                n_literal(comment),
                levels
            ),
            (Some(_), None) => format!(
                "EXEC sys.sp_dropextendedproperty @name = N'MS_Description', {}",
                levels
            ),
            (None, None) => return None,
        })
    }

    fn owner_sql(&self, stmt: &Statement) -> Option<String> {
        let owner = stmt.owner.as_ref()?;
        let securable = match stmt.kind() {
            DbObjType::Schema => format!("SCHEMA::{}", MS.qualified(&stmt.id)),
            DbObjType::Role => format!("ROLE::{}", MS.qualified(&stmt.id)),
            DbObjType::Type => format!("TYPE::{}", MS.qualified(&stmt.id)),
            DbObjType::Table
            | DbObjType::View
            | DbObjType::Function
            | DbObjType::Procedure
            | DbObjType::Sequence => format!("OBJECT::{}", MS.qualified(&stmt.id)),
            _ => return None,
        };
        Some(format!("ALTER AUTHORIZATION ON {} TO {}", securable, q(owner)))
    }

    fn create_table(
        &self,
        stmt: &Statement,
        table: &TableDef,
        snapshot: &Snapshot,
        detached: &BTreeSet<ObjectId>,
        trailing: &mut Vec<String>,
    ) -> String {
        let mut lines = Vec::new();
        for child in snapshot.children(&stmt.id) {
            match &child.body {
                StatementBody::Column(column) => {
                    lines.push(format!("\t{}", self.column_definition(&child.id, column)));
                    trailing.extend(self.comment_sql(None, child));
                }
                StatementBody::Constraint(constraint) if !detached.contains(&child.id) => {
                    lines.push(format!(
                        "\tCONSTRAINT {} {}",
                        q(child.name()),
                        constraint_definition(MS, constraint)
                    ));
                }
                _ => {}
            }
        }
        let mut sql = format!(
            "CREATE TABLE {} (\n{}\n)",
            MS.qualified(&stmt.id),
            lines.join(",\n")
        );
        if let Some(filegroup) = &table.tablespace {
            sql.push_str(&format!(" ON {}", q(filegroup)));
        }
        if !table.options.is_empty() {
            sql.push_str(&format!(" WITH ({})", self.table_options(table)));
        }
        sql
    }

    fn table_options(&self, table: &TableDef) -> String {
        table
            .options
            .iter()
            .map(|(key, value)| format!("{} = {}", key.to_ascii_uppercase(), value))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn parameters(&self, routine: &RoutineDef) -> Vec<String> {
        routine
            .arguments
            .iter()
            .enumerate()
            .map(|(pos, arg)| {
                let name = arg
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("p{}", pos + 1));
                let name = if name.starts_with('@') {
                    name
                } else {
                    format!("@{}", name)
                };
                let mut sql = format!("{} {}", name, arg.data_type);
                if let Some(default) = &arg.default {
                    sql.push_str(&format!(" = {}", default));
                }
                sql
            })
            .collect()
    }

    /// Module definition text, starting with `verb` (`CREATE` or `ALTER`).
    fn module_sql(&self, verb: &str, stmt: &Statement) -> Option<String> {
        let name = MS.qualified(&stmt.id);
        let sql = match &stmt.body {
            StatementBody::View(view) => self.view_sql(verb, &name, view),
            StatementBody::Function(routine) => format!(
                "{} FUNCTION {}({})\nRETURNS {}\nAS\n{}",
                verb,
                name,
                self.parameters(routine).join(", "),
                routine.returns.as_deref().unwrap_or("int"),
                routine.body
            ),
            StatementBody::Procedure(routine) => {
                let params = self.parameters(routine);
                if params.is_empty() {
                    format!("{} PROCEDURE {}\nAS\n{}", verb, name, routine.body)
                } else {
                    format!(
                        "{} PROCEDURE {}\n\t{}\nAS\n{}",
                        verb,
                        name,
                        params.join(",\n\t"),
                        routine.body
                    )
                }
            }
            StatementBody::Trigger(trigger) => self.trigger_sql(verb, stmt, trigger),
            _ => return None,
        };
        Some(sql)
    }

    fn view_sql(&self, verb: &str, name: &str, view: &ViewDef) -> String {
        let mut sql = format!("{} VIEW {}", verb, name);
        if !view.columns.is_empty() {
            sql.push_str(&format!(" ({})", MS.quote_list(&view.columns)));
        }
        if view.materialized {
            sql.push_str(" WITH SCHEMABINDING");
        }
        sql.push_str(&format!("\nAS\n{}", view.query.trim_end_matches(';')));
        sql
    }

    fn trigger_sql(&self, verb: &str, stmt: &Statement, trigger: &TriggerDef) -> String {
        let schema = stmt.id.schema_name().unwrap_or("dbo");
        format!(
            "{} TRIGGER {}.{} ON {}\n{} {}\nAS\n{}",
            verb,
            q(schema),
            q(stmt.name()),
            MS.owning_table(&stmt.id),
            trigger.timing,
            trigger.events.join(", "),
            trigger.body.as_deref().unwrap_or("")
        )
    }

    fn sequence_sql(&self, stmt: &Statement, old: Option<&SequenceDef>, new: &SequenceDef) -> String {
        let changed = |f: fn(&SequenceDef) -> Option<i64>| old.map(f) != Some(f(new));
        let mut clauses = Vec::new();
        match old {
            None => {
                if let Some(data_type) = &new.data_type {
                    clauses.push(format!("AS {}", data_type));
                }
                if let Some(start) = new.start {
                    clauses.push(format!("START WITH {}", start));
                }
            }
            Some(_) => {
                if changed(|seq| seq.start) {
                    if let Some(start) = new.start {
                        clauses.push(format!("RESTART WITH {}", start));
                    }
                }
            }
        }
        if changed(|seq| seq.increment) {
            clauses.push(format!("INCREMENT BY {}", new.increment.unwrap_or(1)));
        }
        if changed(|seq| seq.min_value) {
            clauses.push(match new.min_value {
                Some(min) => format!("MINVALUE {}", min),
                None => "NO MINVALUE".to_string(),
            });
        }
        if changed(|seq| seq.max_value) {
            clauses.push(match new.max_value {
                Some(max) => format!("MAXVALUE {}", max),
                None => "NO MAXVALUE".to_string(),
            });
        }
        if changed(|seq| seq.cache) {
            clauses.push(match new.cache {
                Some(cache) => format!("CACHE {}", cache),
                None => "NO CACHE".to_string(),
            });
        }
        if old.map(|seq| seq.cycle) != Some(new.cycle) {
            clauses.push(if new.cycle { "CYCLE" } else { "NO CYCLE" }.to_string());
        }
        if clauses.is_empty() {
            return String::new();
        }
        format!(
            "{} SEQUENCE {} {}",
            if old.is_some() { "ALTER" } else { "CREATE" },
            MS.qualified(&stmt.id),
            clauses.join(" ")
        )
    }

    fn alter_column(&self, stmt: &Statement, old: &ColumnDef, new: &ColumnDef, sql: &mut AlterSql) {
        let table = MS.owning_table(&stmt.id);
        if old.data_type != new.data_type
            || old.not_null != new.not_null
            || old.collation != new.collation
        {
            let mut change = format!(
                "ALTER TABLE {} ALTER COLUMN {} {}",
                table,
                q(stmt.name()),
                new.data_type
            );
            if let Some(collation) = &new.collation {
                change.push_str(&format!(" COLLATE {}", collation));
            }
            change.push_str(if new.not_null { " NOT NULL" } else { " NULL" });
            sql.push_invalidating(change);
        }
        if old.default != new.default {
            let constraint = q(&self.default_constraint_name(&stmt.id));
            if old.default.is_some() {
                sql.push(format!("ALTER TABLE {} DROP CONSTRAINT {}", table, constraint));
            }
            if let Some(default) = &new.default {
                sql.push(format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} DEFAULT {} FOR {}",
                    table,
                    constraint,
                    default,
                    q(stmt.name())
                ));
            }
        }
    }
}

impl SqlGenerator for MsSqlGenerator {
    fn dialect(&self) -> Dialect {
        MS
    }

    fn create(
        &self,
        stmt: &Statement,
        snapshot: &Snapshot,
        detached: &BTreeSet<ObjectId>,
    ) -> Result<Vec<String>> {
        MS.check_supported(stmt.kind())?;
        let id = &stmt.id;
        let mut trailing = Vec::new();
        let main = match &stmt.body {
            StatementBody::Database => return Ok(Vec::new()),
            StatementBody::Schema(_) => format!("CREATE SCHEMA {}", MS.qualified(id)),
            StatementBody::Role(_) => format!("CREATE ROLE {}", MS.qualified(id)),
            StatementBody::Table(table) => {
                self.create_table(stmt, table, snapshot, detached, &mut trailing)
            }
            StatementBody::Column(column) => format!(
                "ALTER TABLE {} ADD {}",
                MS.owning_table(id),
                self.column_definition(id, column)
            ),
            StatementBody::Constraint(constraint) => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} {}",
                MS.owning_table(id),
                q(stmt.name()),
                constraint_definition(MS, constraint)
            ),
            StatementBody::Index(index) => {
                let mut sql = format!(
                    "CREATE {}{}INDEX {} ON {} ({})",
                    if index.unique { "UNIQUE " } else { "" },
                    index
                        .method
                        .as_deref()
                        .map(|method| format!("{} ", method.to_ascii_uppercase()))
                        .unwrap_or_default(),
                    q(stmt.name()),
                    MS.owning_table(id),
                    index.columns.join(", ")
                );
                if let Some(predicate) = &index.predicate {
                    sql.push_str(&format!(" WHERE {}", predicate));
                }
                if let Some(filegroup) = &index.tablespace {
                    sql.push_str(&format!(" ON {}", q(filegroup)));
                }
                sql
            }
            StatementBody::View(_)
            | StatementBody::Function(_)
            | StatementBody::Procedure(_)
            | StatementBody::Trigger(_) => self.module_sql("CREATE", stmt).unwrap_or_default(),
            StatementBody::Sequence(sequence) => {
                let sql = self.sequence_sql(stmt, None, sequence);
                if sql.is_empty() {
                    format!("CREATE SEQUENCE {}", MS.qualified(id))
                } else {
                    sql
                }
            }
            StatementBody::Type(def) => match def.variant {
                TypeVariant::Alias => format!(
                    "CREATE TYPE {} FROM {}{}",
                    MS.qualified(id),
                    def.base_type.as_deref().unwrap_or("nvarchar(max)"),
                    if def.not_null { " NOT NULL" } else { "" }
                ),
                TypeVariant::Composite => {
                    let attributes: Vec<String> = def
                        .attributes
                        .iter()
                        .map(|attr| format!("\t{} {}", q(&attr.name), attr.data_type))
                        .collect();
                    format!(
                        "CREATE TYPE {} AS TABLE (\n{}\n)",
                        MS.qualified(id),
                        attributes.join(",\n")
                    )
                }
                TypeVariant::Enum => {
                    return Err(DiffError::UnsupportedObjectType {
                        dialect: MS,
                        kind: DbObjType::Type,
                    })
                }
            },
            StatementBody::Policy(_) => {
                return Err(DiffError::UnsupportedObjectType {
                    dialect: MS,
                    kind: DbObjType::Policy,
                })
            }
        };

        let mut statements = vec![main];
        statements.extend(self.owner_sql(stmt));
        statements.extend(self.comment_sql(None, stmt));
        statements.extend(trailing);
        Ok(statements)
    }

    fn drop(&self, stmt: &Statement, _snapshot: &Snapshot) -> Result<Vec<String>> {
        MS.check_supported(stmt.kind())?;
        let id = &stmt.id;
        let name = MS.qualified(id);
        let statements = match &stmt.body {
            StatementBody::Database => Vec::new(),
            StatementBody::Column(column) => {
                let table = MS.owning_table(id);
                let mut statements = Vec::new();
                if column.default.is_some() {
                    statements.push(format!(
                        "ALTER TABLE {} DROP CONSTRAINT {}",
                        table,
                        q(&self.default_constraint_name(id))
                    ));
                }
                statements.push(format!("ALTER TABLE {} DROP COLUMN {}", table, name));
                statements
            }
            StatementBody::Constraint(_) => vec![format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                MS.owning_table(id),
                name
            )],
            StatementBody::Index(_) => {
                vec![format!("DROP INDEX {} ON {}", name, MS.owning_table(id))]
            }
            StatementBody::Trigger(_) => vec![format!(
                "DROP TRIGGER {}.{}",
                q(id.schema_name().unwrap_or("dbo")),
                name
            )],
            body => vec![format!("DROP {} {}", body.kind().keyword(), name)],
        };
        Ok(statements)
    }

    fn alter(&self, old: &Statement, new: &Statement, _snapshot: &Snapshot) -> Result<AlterOutcome> {
        MS.check_supported(new.kind())?;
        let mut sql = AlterSql::default();
        let alterable = match (&old.body, &new.body) {
            (StatementBody::Database, StatementBody::Database) => true,
            (StatementBody::Schema(a), StatementBody::Schema(b)) => a == b,
            (StatementBody::Role(a), StatementBody::Role(b)) => a == b,
            (StatementBody::Table(a), StatementBody::Table(b)) => {
                let options_removed = a.options.keys().any(|key| !b.options.contains_key(key));
                let mut same_layout = a.clone();
                same_layout.options = b.options.clone();
                if same_layout != *b || options_removed {
                    false
                } else {
                    if a.options != b.options {
                        sql.push(format!(
                            "ALTER TABLE {} SET ({})",
                            MS.qualified(&new.id),
                            self.table_options(b)
                        ));
                    }
                    true
                }
            }
            (StatementBody::Column(a), StatementBody::Column(b)) => {
                self.alter_column(new, a, b, &mut sql);
                true
            }
            (StatementBody::View(a), StatementBody::View(b)) => {
                if a.materialized != b.materialized {
                    false
                } else {
                    if a != b {
                        if let Some(text) = self.module_sql("ALTER", new) {
                            sql.push_invalidating(text);
                        }
                    }
                    true
                }
            }
            (StatementBody::Function(a), StatementBody::Function(b)) => {
                if a.language != b.language {
                    false
                } else {
                    if a != b {
                        if let Some(text) = self.module_sql("ALTER", new) {
                            sql.push_invalidating(text);
                        }
                    }
                    true
                }
            }
            (StatementBody::Procedure(a), StatementBody::Procedure(b)) => {
                if a != b {
                    sql.extend(self.module_sql("ALTER", new));
                }
                true
            }
            (StatementBody::Trigger(a), StatementBody::Trigger(b)) => {
                if a != b {
                    sql.extend(self.module_sql("ALTER", new));
                }
                true
            }
            (StatementBody::Sequence(a), StatementBody::Sequence(b)) => {
                if a.data_type != b.data_type {
                    false
                } else {
                    let text = self.sequence_sql(new, Some(a), b);
                    if !text.is_empty() {
                        sql.push(text);
                    }
                    true
                }
            }
            (StatementBody::Type(a), StatementBody::Type(b)) => a == b,
            _ => false,
        };
        if !alterable {
            return Ok(AlterOutcome::Recreate);
        }

        if old.owner != new.owner {
            sql.extend(self.owner_sql(new));
        }
        if old.comment != new.comment {
            sql.extend(self.comment_sql(old.comment.as_deref(), new));
        }
        Ok(sql.finish())
    }

    fn refresh_in_place(&self, stmt: &Statement) -> Option<String> {
        match stmt.kind() {
            DbObjType::View | DbObjType::Function | DbObjType::Procedure => Some(format!(
                "EXEC sys.sp_refreshsqlmodule {}",
                n_literal(&MS.qualified(&stmt.id))
            )),
            DbObjType::Trigger => Some(format!(
                "EXEC sys.sp_refreshsqlmodule {}",
                n_literal(&format!(
                    "{}.{}",
                    q(stmt.id.schema_name().unwrap_or("dbo")),
                    q(stmt.name())
                ))
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SchemaDef, SnapshotBuilder};

    fn snapshot_with(build: impl FnOnce(&mut SnapshotBuilder, &ObjectId)) -> Snapshot {
        let mut builder = SnapshotBuilder::new(Dialect::MsSql);
        let schema = builder
            .add(
                &ObjectId::database(),
                "dbo",
                StatementBody::Schema(SchemaDef::default()),
            )
            .unwrap();
        build(&mut builder, &schema);
        builder.drain_analysis_blocking();
        builder.build().unwrap()
    }

    fn table_with_column(column: ColumnDef) -> Snapshot {
        snapshot_with(|builder, schema| {
            let table = builder
                .add(schema, "t", StatementBody::Table(TableDef::default()))
                .unwrap();
            builder
                .add(&table, "a", StatementBody::Column(column))
                .unwrap();
        })
    }

    #[test]
    fn test_create_table_uses_named_defaults() {
        let snapshot = table_with_column(ColumnDef {
            data_type: "int".to_string(),
            not_null: true,
            default: Some("((0))".to_string()),
            collation: None,
        });
        let table = snapshot.get(&ObjectId::table("dbo", "t")).unwrap();
        let sql = MsSqlGenerator
            .create(table, &snapshot, &BTreeSet::new())
            .unwrap();
        assert_eq!(
            sql,
            vec!["CREATE TABLE [dbo].[t] (\n\t[a] int NOT NULL CONSTRAINT [DF_t_a] DEFAULT ((0))\n)"
                .to_string()]
        );

        let column = snapshot.get(&ObjectId::column("dbo", "t", "a")).unwrap();
        assert_eq!(
            MsSqlGenerator.drop(column, &snapshot).unwrap(),
            vec![
                "ALTER TABLE [dbo].[t] DROP CONSTRAINT [DF_t_a]".to_string(),
                "ALTER TABLE [dbo].[t] DROP COLUMN [a]".to_string(),
            ]
        );
    }

    #[test]
    fn test_column_nullability_invalidates_dependents() {
        let old = table_with_column(ColumnDef {
            data_type: "int".to_string(),
            ..Default::default()
        });
        let new = table_with_column(ColumnDef {
            data_type: "int".to_string(),
            not_null: true,
            ..Default::default()
        });
        let id = ObjectId::column("dbo", "t", "a");
        assert_eq!(
            MsSqlGenerator
                .alter(old.get(&id).unwrap(), new.get(&id).unwrap(), &new)
                .unwrap(),
            AlterOutcome::AlterWithDependents(vec![
                "ALTER TABLE [dbo].[t] ALTER COLUMN [a] int NOT NULL".to_string()
            ])
        );
    }

    #[test]
    fn test_view_change_alters_in_place() {
        let view = |query: &str| {
            let query = query.to_string();
            snapshot_with(move |builder, schema| {
                builder
                    .add(
                        schema,
                        "v",
                        StatementBody::View(ViewDef {
                            query,
                            ..Default::default()
                        }),
                    )
                    .unwrap();
            })
        };
        let (old, new) = (view("SELECT 1 AS x"), view("SELECT 2 AS x"));
        let id = ObjectId::view("dbo", "v");
        let stmt = new.get(&id).unwrap();
        assert_eq!(
            MsSqlGenerator.alter(old.get(&id).unwrap(), stmt, &new).unwrap(),
            AlterOutcome::AlterWithDependents(vec![
                "ALTER VIEW [dbo].[v]\nAS\nSELECT 2 AS x".to_string()
            ])
        );
        assert_eq!(
            MsSqlGenerator.refresh_in_place(stmt).unwrap(),
            "EXEC sys.sp_refreshsqlmodule N'[dbo].[v]'"
        );
    }

    #[test]
    fn test_comment_uses_extended_properties() {
        let commented = |comment: Option<&str>| {
            let comment = comment.map(str::to_string);
            snapshot_with(move |builder, schema| {
                let table = builder
                    .add(schema, "t", StatementBody::Table(TableDef::default()))
                    .unwrap();
                if let Some(comment) = comment {
                    builder.set_comment(&table, comment).unwrap();
                }
            })
        };
        let id = ObjectId::table("dbo", "t");
        let (old, new) = (commented(None), commented(Some("Customers")));
        assert_eq!(
            MsSqlGenerator
                .alter(old.get(&id).unwrap(), new.get(&id).unwrap(), &new)
                .unwrap(),
            AlterOutcome::Alter(vec![
                "EXEC sys.sp_addextendedproperty @name = N'MS_Description', @value = N'Customers', @level0type = N'SCHEMA', @level0name = N'dbo', @level1type = N'TABLE', @level1name = N't'"
                    .to_string()
            ])
        );
    }

    #[test]
    fn test_filegroup_change_recreates() {
        let on = |filegroup: Option<&str>| {
            let table = TableDef {
                tablespace: filegroup.map(str::to_string),
                ..Default::default()
            };
            snapshot_with(move |builder, schema| {
                builder.add(schema, "t", StatementBody::Table(table)).unwrap();
            })
        };
        let id = ObjectId::table("dbo", "t");
        let (old, new) = (on(None), on(Some("ARCHIVE")));
        assert_eq!(
            MsSqlGenerator
                .alter(old.get(&id).unwrap(), new.get(&id).unwrap(), &new)
                .unwrap(),
            AlterOutcome::Recreate
        );
    }

    #[test]
    fn test_policy_is_unsupported() {
        let snapshot = snapshot_with(|_, _| {});
        let schema = snapshot.get(&ObjectId::schema("dbo")).unwrap();
        let mut policy = schema.clone();
        policy.body = StatementBody::Policy(Default::default());
        policy.id = ObjectId::policy("dbo", "t", "p");
        assert!(matches!(
            MsSqlGenerator.create(&policy, &snapshot, &BTreeSet::new()),
            Err(DiffError::UnsupportedObjectType { .. })
        ));
    }
}
