//! Schema object model
//!
//! A snapshot is a tree of [`Statement`]s: the database root owns schemas and roles, schemas own
//! top-level objects (tables, views, routines, sequences, types) and tables own sub-elements
//! (columns, constraints, indexes, triggers, policies). Every statement is addressed by an
//! [`ObjectId`] made of its type tag and its qualified path.

mod body;
mod snapshot;

pub use body::*;
pub use snapshot::{ContentHash, Snapshot, SnapshotBuilder, Statement};
pub(crate) use snapshot::{normalize_ident, NameIndex};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DiffError;

/// The closed set of object types known to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbObjType {
    Database,
    Schema,
    Role,
    Table,
    Column,
    Constraint,
    Index,
    View,
    Function,
    Procedure,
    Trigger,
    Sequence,
    Type,
    Policy,
}

impl DbObjType {
    pub const ALL: [DbObjType; 14] = [
        DbObjType::Database,
        DbObjType::Schema,
        DbObjType::Role,
        DbObjType::Table,
        DbObjType::Column,
        DbObjType::Constraint,
        DbObjType::Index,
        DbObjType::View,
        DbObjType::Function,
        DbObjType::Procedure,
        DbObjType::Trigger,
        DbObjType::Sequence,
        DbObjType::Type,
        DbObjType::Policy,
    ];

    /// SQL keyword used in DDL for this type.
    pub fn keyword(self) -> &'static str {
        match self {
            DbObjType::Database => "DATABASE",
            DbObjType::Schema => "SCHEMA",
            DbObjType::Role => "ROLE",
            DbObjType::Table => "TABLE",
            DbObjType::Column => "COLUMN",
            DbObjType::Constraint => "CONSTRAINT",
            DbObjType::Index => "INDEX",
            DbObjType::View => "VIEW",
            DbObjType::Function => "FUNCTION",
            DbObjType::Procedure => "PROCEDURE",
            DbObjType::Trigger => "TRIGGER",
            DbObjType::Sequence => "SEQUENCE",
            DbObjType::Type => "TYPE",
            DbObjType::Policy => "POLICY",
        }
    }

    /// Sub-elements live inside a table (or materialized view) and are dropped with it.
    pub fn is_sub_element(self) -> bool {
        matches!(
            self,
            DbObjType::Column
                | DbObjType::Constraint
                | DbObjType::Index
                | DbObjType::Trigger
                | DbObjType::Policy
        )
    }

    /// Whether a statement of this type may be owned by a statement of type `parent`.
    pub fn can_be_child_of(self, parent: DbObjType) -> bool {
        match self {
            DbObjType::Database => false,
            DbObjType::Schema | DbObjType::Role => parent == DbObjType::Database,
            DbObjType::Table
            | DbObjType::View
            | DbObjType::Function
            | DbObjType::Procedure
            | DbObjType::Sequence
            | DbObjType::Type => parent == DbObjType::Schema,
            DbObjType::Column | DbObjType::Constraint | DbObjType::Policy => {
                parent == DbObjType::Table
            }
            DbObjType::Index | DbObjType::Trigger => {
                matches!(parent, DbObjType::Table | DbObjType::View)
            }
        }
    }

    /// Types sharing one name space per schema; a drop of one must precede the creation of
    /// another with the same name.
    fn is_relation(self) -> bool {
        matches!(
            self,
            DbObjType::Table | DbObjType::View | DbObjType::Sequence
        )
    }
}

impl fmt::Display for DbObjType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for DbObjType {
    type Err = DiffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        DbObjType::ALL
            .iter()
            .copied()
            .find(|kind| kind.keyword() == wanted)
            .ok_or_else(|| DiffError::UnknownObjectType(s.to_string()))
    }
}

/// Which snapshot a lookup is made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    Old,
    New,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Old => f.write_str("old"),
            Side::New => f.write_str("new"),
        }
    }
}

/// Stable identity of a statement: type tag plus qualified path.
///
/// The path is empty for the database root, `[schema]` for schemas, `[role]` for roles,
/// `[schema, name]` for top-level objects and `[schema, table, name]` for sub-elements.
/// Functions and procedures use their signature, `name(type, ...)`, as the last segment so
/// overloads stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    pub kind: DbObjType,
    pub path: Vec<String>,
}

impl ObjectId {
    pub fn new(kind: DbObjType, path: Vec<String>) -> Self {
        ObjectId { kind, path }
    }

    pub fn database() -> Self {
        ObjectId::new(DbObjType::Database, Vec::new())
    }

    pub fn schema(name: &str) -> Self {
        ObjectId::new(DbObjType::Schema, vec![name.to_string()])
    }

    pub fn role(name: &str) -> Self {
        ObjectId::new(DbObjType::Role, vec![name.to_string()])
    }

    pub fn table(schema: &str, name: &str) -> Self {
        ObjectId::top_level(DbObjType::Table, schema, name)
    }

    pub fn view(schema: &str, name: &str) -> Self {
        ObjectId::top_level(DbObjType::View, schema, name)
    }

    pub fn sequence(schema: &str, name: &str) -> Self {
        ObjectId::top_level(DbObjType::Sequence, schema, name)
    }

    pub fn user_type(schema: &str, name: &str) -> Self {
        ObjectId::top_level(DbObjType::Type, schema, name)
    }

    pub fn function(schema: &str, name: &str, arg_types: &[&str]) -> Self {
        ObjectId::top_level(DbObjType::Function, schema, &signature(name, arg_types))
    }

    pub fn procedure(schema: &str, name: &str, arg_types: &[&str]) -> Self {
        ObjectId::top_level(DbObjType::Procedure, schema, &signature(name, arg_types))
    }

    pub fn column(schema: &str, table: &str, name: &str) -> Self {
        ObjectId::sub_element(DbObjType::Column, schema, table, name)
    }

    pub fn constraint(schema: &str, table: &str, name: &str) -> Self {
        ObjectId::sub_element(DbObjType::Constraint, schema, table, name)
    }

    pub fn index(schema: &str, table: &str, name: &str) -> Self {
        ObjectId::sub_element(DbObjType::Index, schema, table, name)
    }

    pub fn trigger(schema: &str, table: &str, name: &str) -> Self {
        ObjectId::sub_element(DbObjType::Trigger, schema, table, name)
    }

    pub fn policy(schema: &str, table: &str, name: &str) -> Self {
        ObjectId::sub_element(DbObjType::Policy, schema, table, name)
    }

    fn top_level(kind: DbObjType, schema: &str, name: &str) -> Self {
        ObjectId::new(kind, vec![schema.to_string(), name.to_string()])
    }

    fn sub_element(kind: DbObjType, schema: &str, table: &str, name: &str) -> Self {
        ObjectId::new(
            kind,
            vec![schema.to_string(), table.to_string(), name.to_string()],
        )
    }

    /// Identity of a statement of type `kind` named `name` owned by `self`.
    pub fn child(&self, kind: DbObjType, name: &str) -> ObjectId {
        let mut path = self.path.clone();
        path.push(name.to_string());
        ObjectId::new(kind, path)
    }

    /// Last path segment; for routines this is the full signature.
    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or("")
    }

    /// Last path segment without a routine signature.
    pub fn bare_name(&self) -> &str {
        let name = self.name();
        match name.find('(') {
            Some(pos) if matches!(self.kind, DbObjType::Function | DbObjType::Procedure) => {
                &name[..pos]
            }
            _ => name,
        }
    }

    /// Schema this statement lives in, if any.
    pub fn schema_name(&self) -> Option<&str> {
        match self.kind {
            DbObjType::Database | DbObjType::Role => None,
            _ => self.path.first().map(String::as_str),
        }
    }

    /// Path of the owning container.
    pub fn container_path(&self) -> &[String] {
        match self.path.len() {
            0 => &[],
            len => &self.path[..len - 1],
        }
    }

    pub fn qualified_name(&self) -> String {
        self.path.join(".")
    }

    /// Key of the per-schema relation name space, used to order a drop before a creation that
    /// reuses the same name under another type.
    pub fn relation_key(&self) -> Option<(&str, &str)> {
        if self.kind.is_relation() && self.path.len() == 2 {
            Some((self.path[0].as_str(), self.path[1].as_str()))
        } else {
            None
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{} {}", self.kind, self.qualified_name())
        }
    }
}

/// Routine signature used as the identity segment of functions and procedures.
pub fn signature<S: AsRef<str>>(name: &str, arg_types: &[S]) -> String {
    let args: Vec<&str> = arg_types.iter().map(|arg| arg.as_ref().trim()).collect();
    format!("{}({})", name, args.join(", "))
}
