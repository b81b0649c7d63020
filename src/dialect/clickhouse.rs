use std::collections::BTreeSet;

use super::{literal, AlterOutcome, AlterSql, Dialect, SqlGenerator};
use crate::error::{DiffError, Result};
use crate::model::{
    ColumnDef, ConstraintType, DbObjType, ObjectId, Snapshot, Statement, StatementBody, TableDef,
};

const CH: Dialect = Dialect::ClickHouse;

fn q(ident: &str) -> String {
    CH.quote_ident(ident)
}

pub struct ClickHouseGenerator;

impl ClickHouseGenerator {
    fn column_definition(&self, stmt: &Statement, column: &ColumnDef) -> String {
        let mut sql = format!("{} {}", q(stmt.name()), column.data_type);
        if let Some(collation) = &column.collation {
            sql.push_str(&format!(" COLLATE {}", collation));
        }
        if let Some(default) = &column.default {
            sql.push_str(&format!(" DEFAULT {}", default));
        }
        if let Some(comment) = &stmt.comment {
            sql.push_str(&format!(" COMMENT {}", literal(comment)));
        }
        sql
    }

    fn check_expression(&self, stmt: &Statement) -> Result<String> {
        match &stmt.body {
            StatementBody::Constraint(constraint)
                if constraint.constraint_type == ConstraintType::Check =>
            {
                Ok(constraint.expression.clone().unwrap_or_else(|| "1".to_string()))
            }
            _ => Err(DiffError::UnsupportedObjectType {
                dialect: CH,
                kind: DbObjType::Constraint,
            }),
        }
    }

    fn create_table(
        &self,
        stmt: &Statement,
        table: &TableDef,
        snapshot: &Snapshot,
        detached: &BTreeSet<ObjectId>,
    ) -> Result<String> {
        let mut lines = Vec::new();
        for child in snapshot.children(&stmt.id) {
            match &child.body {
                StatementBody::Column(column) => {
                    lines.push(format!("    {}", self.column_definition(child, column)));
                }
                StatementBody::Constraint(_) if !detached.contains(&child.id) => {
                    lines.push(format!(
                        "    CONSTRAINT {} CHECK {}",
                        q(child.name()),
                        self.check_expression(child)?
                    ));
                }
                _ => {}
            }
        }
        let engine = table.engine.as_deref().unwrap_or("MergeTree");
        let mut sql = format!(
            "CREATE TABLE {}\n(\n{}\n)\nENGINE = {}",
            CH.qualified(&stmt.id),
            lines.join(",\n"),
            engine
        );
        if let Some(partition) = &table.partition_by {
            sql.push_str(&format!("\nPARTITION BY {}", partition));
        }
        match &table.order_by {
            Some(order) => sql.push_str(&format!("\nORDER BY {}", order)),
            None if engine.contains("MergeTree") => sql.push_str("\nORDER BY tuple()"),
            None => {}
        }
        if let Some(ttl) = &table.ttl {
            sql.push_str(&format!("\nTTL {}", ttl));
        }
        if !table.options.is_empty() {
            let settings: Vec<String> = table
                .options
                .iter()
                .map(|(key, value)| format!("{} = {}", key, value))
                .collect();
            sql.push_str(&format!("\nSETTINGS {}", settings.join(", ")));
        }
        if let Some(comment) = &stmt.comment {
            sql.push_str(&format!("\nCOMMENT {}", literal(comment)));
        }
        Ok(sql)
    }

    fn function_sql(&self, verb: &str, stmt: &Statement, body: &str, params: &[String]) -> String {
        format!(
            "{} FUNCTION {} AS ({}) -> {}",
            verb,
            q(stmt.id.bare_name()),
            params.join(", "),
            body
        )
    }

    fn alter_table(&self, stmt: &Statement, old: &TableDef, new: &TableDef, sql: &mut AlterSql) -> bool {
        if old.engine != new.engine
            || old.order_by != new.order_by
            || old.partition_by != new.partition_by
            || old.tablespace != new.tablespace
            || old.unlogged != new.unlogged
        {
            return false;
        }
        let name = CH.qualified(&stmt.id);
        if old.ttl != new.ttl {
            sql.push(match &new.ttl {
                Some(ttl) => format!("ALTER TABLE {} MODIFY TTL {}", name, ttl),
                None => format!("ALTER TABLE {} REMOVE TTL", name),
            });
        }
        let modified: Vec<String> = new
            .options
            .iter()
            .filter(|(key, value)| old.options.get(*key) != Some(*value))
            .map(|(key, value)| format!("{} = {}", key, value))
            .collect();
        if !modified.is_empty() {
            sql.push(format!(
                "ALTER TABLE {} MODIFY SETTING {}",
                name,
                modified.join(", ")
            ));
        }
        let reset: Vec<&str> = old
            .options
            .keys()
            .filter(|key| !new.options.contains_key(*key))
            .map(String::as_str)
            .collect();
        if !reset.is_empty() {
            sql.push(format!("ALTER TABLE {} RESET SETTING {}", name, reset.join(", ")));
        }
        true
    }

    fn alter_column(&self, stmt: &Statement, old: &ColumnDef, new: &ColumnDef, sql: &mut AlterSql) -> bool {
        if old.collation != new.collation {
            return false;
        }
        let prefix = format!(
            "ALTER TABLE {} MODIFY COLUMN {}",
            CH.owning_table(&stmt.id),
            q(stmt.name())
        );
        if old.data_type != new.data_type || old.not_null != new.not_null {
            sql.push_invalidating(format!("{} {}", prefix, new.data_type));
        }
        if old.default != new.default {
            sql.push(match &new.default {
                Some(default) => format!("{} DEFAULT {}", prefix, default),
                None => format!("{} REMOVE DEFAULT", prefix),
            });
        }
        true
    }
}

impl SqlGenerator for ClickHouseGenerator {
    fn dialect(&self) -> Dialect {
        CH
    }

    fn create(
        &self,
        stmt: &Statement,
        snapshot: &Snapshot,
        detached: &BTreeSet<ObjectId>,
    ) -> Result<Vec<String>> {
        CH.check_supported(stmt.kind())?;
        let id = &stmt.id;
        let sql = match &stmt.body {
            StatementBody::Database => return Ok(Vec::new()),
            StatementBody::Schema(schema) => {
                let mut sql = format!("CREATE DATABASE {}", CH.qualified(id));
                if let Some(engine) = &schema.engine {
                    sql.push_str(&format!(" ENGINE = {}", engine));
                }
                if let Some(comment) = &stmt.comment {
                    sql.push_str(&format!(" COMMENT {}", literal(comment)));
                }
                sql
            }
            StatementBody::Role(role) => {
                let mut sql = format!("CREATE ROLE {}", CH.qualified(id));
                if !role.options.is_empty() {
                    sql.push_str(&format!(" SETTINGS {}", role.options.join(", ")));
                }
                sql
            }
            StatementBody::Table(table) => self.create_table(stmt, table, snapshot, detached)?,
            StatementBody::Column(column) => format!(
                "ALTER TABLE {} ADD COLUMN {}",
                CH.owning_table(id),
                self.column_definition(stmt, column)
            ),
            StatementBody::Constraint(_) => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} CHECK {}",
                CH.owning_table(id),
                q(stmt.name()),
                self.check_expression(stmt)?
            ),
            StatementBody::Index(index) => format!(
                "ALTER TABLE {} ADD INDEX {} ({}) TYPE {} GRANULARITY {}",
                CH.owning_table(id),
                q(stmt.name()),
                index.columns.join(", "),
                index.method.as_deref().unwrap_or("minmax"),
                index.granularity.unwrap_or(1)
            ),
            StatementBody::View(view) if view.materialized => {
                let mut sql = format!("CREATE MATERIALIZED VIEW {}", CH.qualified(id));
                if let Some(engine) = &view.engine {
                    sql.push_str(&format!("\nENGINE = {}", engine));
                }
                sql.push_str(&format!("\nAS {}", view.query.trim_end_matches(';')));
                sql
            }
            StatementBody::View(view) => format!(
                "CREATE VIEW {}\nAS {}",
                CH.qualified(id),
                view.query.trim_end_matches(';')
            ),
            StatementBody::Function(routine) => {
                let params: Vec<String> = routine
                    .arguments
                    .iter()
                    .filter_map(|arg| arg.name.clone())
                    .collect();
                self.function_sql("CREATE", stmt, &routine.body, &params)
            }
            body => {
                return Err(DiffError::UnsupportedObjectType {
                    dialect: CH,
                    kind: body.kind(),
                })
            }
        };
        Ok(vec![sql])
    }

    fn drop(&self, stmt: &Statement, _snapshot: &Snapshot) -> Result<Vec<String>> {
        CH.check_supported(stmt.kind())?;
        let id = &stmt.id;
        let sql = match stmt.kind() {
            DbObjType::Database => return Ok(Vec::new()),
            DbObjType::Schema => format!("DROP DATABASE {}", CH.qualified(id)),
            DbObjType::Role => format!("DROP ROLE {}", CH.qualified(id)),
            DbObjType::Table => format!("DROP TABLE {}", CH.qualified(id)),
            DbObjType::View => format!("DROP VIEW {}", CH.qualified(id)),
            DbObjType::Function => format!("DROP FUNCTION {}", q(id.bare_name())),
            kind => format!(
                "ALTER TABLE {} DROP {} {}",
                CH.owning_table(id),
                kind.keyword(),
                q(stmt.name())
            ),
        };
        Ok(vec![sql])
    }

    fn alter(&self, old: &Statement, new: &Statement, _snapshot: &Snapshot) -> Result<AlterOutcome> {
        CH.check_supported(new.kind())?;
        let mut sql = AlterSql::default();
        let alterable = match (&old.body, &new.body) {
            (StatementBody::Database, StatementBody::Database) => true,
            (StatementBody::Schema(a), StatementBody::Schema(b)) => {
                if a == b && old.comment != new.comment {
                    sql.push(format!(
                        "ALTER DATABASE {} MODIFY COMMENT {}",
                        CH.qualified(&new.id),
                        literal(new.comment.as_deref().unwrap_or(""))
                    ));
                }
                a == b
            }
            (StatementBody::Role(a), StatementBody::Role(b)) => {
                if a != b {
                    sql.push(format!(
                        "ALTER ROLE {} SETTINGS {}",
                        CH.qualified(&new.id),
                        if b.options.is_empty() {
                            "NONE".to_string()
                        } else {
                            b.options.join(", ")
                        }
                    ));
                }
                true
            }
            (StatementBody::Table(a), StatementBody::Table(b)) => {
                let alterable = self.alter_table(new, a, b, &mut sql);
                if alterable && old.comment != new.comment {
                    sql.push(format!(
                        "ALTER TABLE {} MODIFY COMMENT {}",
                        CH.qualified(&new.id),
                        literal(new.comment.as_deref().unwrap_or(""))
                    ));
                }
                alterable
            }
            (StatementBody::Column(a), StatementBody::Column(b)) => {
                let alterable = self.alter_column(new, a, b, &mut sql);
                if alterable && old.comment != new.comment {
                    sql.push(format!(
                        "ALTER TABLE {} COMMENT COLUMN {} {}",
                        CH.owning_table(&new.id),
                        q(new.name()),
                        literal(new.comment.as_deref().unwrap_or(""))
                    ));
                }
                alterable
            }
            (StatementBody::View(a), StatementBody::View(b)) => {
                if a.materialized || b.materialized {
                    a == b
                } else {
                    if a != b {
                        sql.push(format!(
                            "CREATE OR REPLACE VIEW {}\nAS {}",
                            CH.qualified(&new.id),
                            b.query.trim_end_matches(';')
                        ));
                    }
                    true
                }
            }
            (StatementBody::Function(a), StatementBody::Function(b)) => {
                if a != b {
                    let params: Vec<String> =
                        b.arguments.iter().filter_map(|arg| arg.name.clone()).collect();
                    sql.push(self.function_sql("CREATE OR REPLACE", new, &b.body, &params));
                }
                true
            }
            _ => false,
        };
        if alterable {
            Ok(sql.finish())
        } else {
            Ok(AlterOutcome::Recreate)
        }
    }
}
