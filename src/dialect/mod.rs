//! Dialect specific SQL generation
//!
//! Each supported database engine implements [`SqlGenerator`], which renders CREATE and DROP
//! statements for a [`Statement`] and decides how a changed statement can be migrated in place.
//! Generators are stateless unit structs reached through [`Dialect::generator`].

mod clickhouse;
mod mssql;
mod postgres;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{DiffError, Result};
use crate::model::{
    ConstraintDef, ConstraintType, DbObjType, ObjectId, RoutineDef, Snapshot, Statement,
};

pub use clickhouse::ClickHouseGenerator;
pub use mssql::MsSqlGenerator;
pub use postgres::PostgresGenerator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[serde(alias = "postgresql", alias = "pg")]
    Postgres,
    #[serde(alias = "ms")]
    MsSql,
    #[serde(alias = "ch")]
    ClickHouse,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Postgres => f.write_str("PostgreSQL"),
            Dialect::MsSql => f.write_str("MS SQL"),
            Dialect::ClickHouse => f.write_str("ClickHouse"),
        }
    }
}

impl Dialect {
    pub fn generator(self) -> &'static dyn SqlGenerator {
        match self {
            Dialect::Postgres => &PostgresGenerator,
            Dialect::MsSql => &MsSqlGenerator,
            Dialect::ClickHouse => &ClickHouseGenerator,
        }
    }

    /// Object types this dialect can model at all.
    pub fn supports(self, kind: DbObjType) -> bool {
        match self {
            Dialect::Postgres => true,
            Dialect::MsSql => kind != DbObjType::Policy,
            Dialect::ClickHouse => !matches!(
                kind,
                DbObjType::Sequence
                    | DbObjType::Trigger
                    | DbObjType::Type
                    | DbObjType::Procedure
                    | DbObjType::Policy
            ),
        }
    }

    pub(crate) fn check_supported(self, kind: DbObjType) -> Result<()> {
        if self.supports(kind) {
            Ok(())
        } else {
            Err(DiffError::UnsupportedObjectType {
                dialect: self,
                kind,
            })
        }
    }

    /// Statement terminator (`;`) or batch separator (`GO`).
    pub fn separator(self) -> &'static str {
        match self {
            Dialect::MsSql => "GO",
            Dialect::Postgres | Dialect::ClickHouse => ";",
        }
    }

    /// Whether the separator goes on its own line after the statement.
    pub fn separator_on_own_line(self) -> bool {
        self == Dialect::MsSql
    }

    pub fn quote_ident(self, ident: &str) -> String {
        match self {
            Dialect::Postgres => {
                if is_simple_ident(ident, false) && !is_pg_reserved(ident) {
                    ident.to_string()
                } else {
                    format!("\"{}\"", ident.replace('"', "\"\""))
                }
            }
            Dialect::MsSql => format!("[{}]", ident.replace(']', "]]")),
            Dialect::ClickHouse => {
                if is_simple_ident(ident, true) {
                    ident.to_string()
                } else {
                    format!("`{}`", ident.replace('`', "\\`"))
                }
            }
        }
    }

    /// Name used to address the statement in DDL: schema qualified for schema objects, bare
    /// for schemas, roles and sub-elements.
    pub fn qualified(self, id: &ObjectId) -> String {
        match id.kind {
            DbObjType::Database => String::new(),
            DbObjType::Schema | DbObjType::Role => self.quote_ident(id.name()),
            kind if kind.is_sub_element() => self.quote_ident(id.name()),
            _ => match id.schema_name() {
                Some(schema) => format!(
                    "{}.{}",
                    self.quote_ident(schema),
                    self.quote_ident(id.bare_name())
                ),
                None => self.quote_ident(id.bare_name()),
            },
        }
    }

    /// Schema-qualified name of the table owning a sub-element.
    pub fn owning_table(self, id: &ObjectId) -> String {
        match id.path.as_slice() {
            [schema, table, ..] => format!(
                "{}.{}",
                self.quote_ident(schema),
                self.quote_ident(table)
            ),
            _ => self.qualified(id),
        }
    }

    pub(crate) fn quote_list<S: AsRef<str>>(self, idents: &[S]) -> String {
        idents
            .iter()
            .map(|ident| self.quote_ident(ident.as_ref()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn is_simple_ident(ident: &str, allow_upper: bool) -> bool {
    let mut chars = ident.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c == '_' || c.is_ascii_lowercase() || (allow_upper && c.is_ascii_uppercase()));
    first_ok
        && chars.all(|c| {
            c == '_' || c.is_ascii_digit() || c.is_ascii_lowercase() || (allow_upper && c.is_ascii_uppercase())
        })
}

fn is_pg_reserved(ident: &str) -> bool {
    const RESERVED: &[&str] = &[
        "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "both", "case", "cast",
        "check", "collate", "column", "constraint", "create", "default", "desc", "distinct", "do",
        "else", "end", "except", "false", "for", "foreign", "from", "grant", "group", "having",
        "in", "into", "leading", "limit", "not", "null", "offset", "on", "only", "or", "order",
        "primary", "references", "select", "table", "then", "to", "true", "union", "unique",
        "user", "using", "when", "where", "with",
    ];
    RESERVED.contains(&ident)
}

/// Single-quoted string literal.
pub(crate) fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Constraint clause as it follows `CONSTRAINT name`.
pub(crate) fn constraint_definition(dialect: Dialect, constraint: &ConstraintDef) -> String {
    let columns = dialect.quote_list(&constraint.columns);
    match constraint.constraint_type {
        ConstraintType::PrimaryKey => format!("PRIMARY KEY ({})", columns),
        ConstraintType::Unique => format!("UNIQUE ({})", columns),
        ConstraintType::Check => format!(
            "CHECK ({})",
            constraint.expression.as_deref().unwrap_or("true")
        ),
        ConstraintType::ForeignKey => {
            let mut sql = format!("FOREIGN KEY ({})", columns);
            if let Some(reference) = &constraint.references {
                sql.push_str(&format!(
                    " REFERENCES {}.{} ({})",
                    dialect.quote_ident(&reference.schema),
                    dialect.quote_ident(&reference.table),
                    dialect.quote_list(&reference.columns)
                ));
                if let Some(action) = &reference.on_delete {
                    sql.push_str(&format!(" ON DELETE {}", action));
                }
                if let Some(action) = &reference.on_update {
                    sql.push_str(&format!(" ON UPDATE {}", action));
                }
            }
            sql
        }
    }
}

/// Argument types of a routine, in declaration order.
pub(crate) fn argument_types(routine: &RoutineDef) -> String {
    routine
        .arguments
        .iter()
        .map(|arg| arg.data_type.trim())
        .collect::<Vec<_>>()
        .join(", ")
}

/// How a changed statement can be migrated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlterOutcome {
    /// Nothing the dialect tracks has changed.
    Unchanged,
    /// In-place statements that bring the object to its new definition.
    Alter(Vec<String>),
    /// In-place statements after which dependents must be refreshed.
    AlterWithDependents(Vec<String>),
    /// At least one change cannot be applied in place.
    Recreate,
}

/// Collects alter statements for one object.
#[derive(Debug, Default)]
pub(crate) struct AlterSql {
    statements: Vec<String>,
    with_dependents: bool,
}

impl AlterSql {
    pub(crate) fn push(&mut self, sql: impl Into<String>) {
        self.statements.push(sql.into());
    }

    pub(crate) fn extend(&mut self, sql: impl IntoIterator<Item = String>) {
        self.statements.extend(sql);
    }

    /// Records a change after which dependents must be refreshed.
    pub(crate) fn push_invalidating(&mut self, sql: impl Into<String>) {
        self.with_dependents = true;
        self.push(sql);
    }

    pub(crate) fn finish(self) -> AlterOutcome {
        if self.statements.is_empty() {
            AlterOutcome::Unchanged
        } else if self.with_dependents {
            AlterOutcome::AlterWithDependents(self.statements)
        } else {
            AlterOutcome::Alter(self.statements)
        }
    }
}

/// Per-dialect SQL capabilities of the object model.
pub trait SqlGenerator: Sync {
    fn dialect(&self) -> Dialect;

    /// Statements creating `stmt`. Tables render their columns and every constraint not listed
    /// in `detached` inline.
    fn create(
        &self,
        stmt: &Statement,
        snapshot: &Snapshot,
        detached: &BTreeSet<ObjectId>,
    ) -> Result<Vec<String>>;

    /// Statements dropping `stmt`.
    fn drop(&self, stmt: &Statement, snapshot: &Snapshot) -> Result<Vec<String>>;

    /// Decides how `old` can be brought to `new`. Both sides share one identity.
    fn alter(&self, old: &Statement, new: &Statement, snapshot: &Snapshot)
        -> Result<AlterOutcome>;

    /// Statement re-validating `stmt` against its changed dependencies without recreating it.
    fn refresh_in_place(&self, _stmt: &Statement) -> Option<String> {
        None
    }
}
