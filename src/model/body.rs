use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::DbObjType;

/// Type-specific content of a statement. Name, location, owner and comment live on the
/// statement itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatementBody {
    Database,
    Schema(SchemaDef),
    Role(RoleDef),
    Table(TableDef),
    Column(ColumnDef),
    Constraint(ConstraintDef),
    Index(IndexDef),
    View(ViewDef),
    Function(RoutineDef),
    Procedure(RoutineDef),
    Trigger(TriggerDef),
    Sequence(SequenceDef),
    Type(TypeDef),
    Policy(PolicyDef),
}

impl StatementBody {
    pub fn kind(&self) -> DbObjType {
        match self {
            StatementBody::Database => DbObjType::Database,
            StatementBody::Schema(_) => DbObjType::Schema,
            StatementBody::Role(_) => DbObjType::Role,
            StatementBody::Table(_) => DbObjType::Table,
            StatementBody::Column(_) => DbObjType::Column,
            StatementBody::Constraint(_) => DbObjType::Constraint,
            StatementBody::Index(_) => DbObjType::Index,
            StatementBody::View(_) => DbObjType::View,
            StatementBody::Function(_) => DbObjType::Function,
            StatementBody::Procedure(_) => DbObjType::Procedure,
            StatementBody::Trigger(_) => DbObjType::Trigger,
            StatementBody::Sequence(_) => DbObjType::Sequence,
            StatementBody::Type(_) => DbObjType::Type,
            StatementBody::Policy(_) => DbObjType::Policy,
        }
    }

    /// Name used as the identity segment: routines append their argument types.
    pub fn identity_name(&self, name: &str) -> String {
        match self {
            StatementBody::Function(routine) | StatementBody::Procedure(routine) => {
                let types: Vec<&str> = routine
                    .arguments
                    .iter()
                    .map(|arg| arg.data_type.as_str())
                    .collect();
                super::signature(name, &types)
            }
            _ => name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaDef {
    /// ClickHouse database engine.
    pub engine: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleDef {
    /// Role attributes (`LOGIN`, `CREATEDB`, ...) or ClickHouse settings (`max_memory_usage = 1`).
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableDef {
    /// Storage parameters (PostgreSQL `WITH (...)`, MS SQL `WITH (...)`, ClickHouse `SETTINGS`).
    pub options: BTreeMap<String, String>,
    /// PostgreSQL tablespace or MS SQL filegroup / partition scheme.
    pub tablespace: Option<String>,
    pub unlogged: bool,
    pub partition_by: Option<String>,
    /// ClickHouse table engine, e.g. `MergeTree`.
    pub engine: Option<String>,
    pub order_by: Option<String>,
    pub ttl: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnDef {
    #[serde(rename = "type")]
    pub data_type: String,
    pub not_null: bool,
    pub default: Option<String>,
    pub collation: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintType {
    PrimaryKey,
    Unique,
    Check,
    ForeignKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintDef {
    pub constraint_type: ConstraintType,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub references: Option<ForeignKeyRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub schema: String,
    pub table: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub on_delete: Option<String>,
    #[serde(default)]
    pub on_update: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexDef {
    /// Key columns or expressions, in order.
    pub columns: Vec<String>,
    pub unique: bool,
    /// PostgreSQL access method, MS SQL `CLUSTERED`/`NONCLUSTERED`, ClickHouse index type.
    pub method: Option<String>,
    pub predicate: Option<String>,
    pub tablespace: Option<String>,
    /// ClickHouse skip-index granularity.
    pub granularity: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewDef {
    pub query: String,
    pub materialized: bool,
    /// Explicit output column names.
    pub columns: Vec<String>,
    /// ClickHouse materialized view engine.
    pub engine: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineArg {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutineDef {
    pub arguments: Vec<RoutineArg>,
    pub returns: Option<String>,
    pub language: Option<String>,
    pub volatility: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerDef {
    /// `BEFORE`, `AFTER`, `INSTEAD OF`.
    pub timing: String,
    pub events: Vec<String>,
    pub for_each_row: bool,
    pub condition: Option<String>,
    /// PostgreSQL trigger function, as `schema.name`.
    pub function: Option<String>,
    /// MS SQL trigger body.
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceDef {
    pub data_type: Option<String>,
    pub start: Option<i64>,
    pub increment: Option<i64>,
    pub min_value: Option<i64>,
    pub max_value: Option<i64>,
    pub cache: Option<i64>,
    pub cycle: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeVariant {
    #[default]
    Enum,
    Composite,
    /// PostgreSQL domain or MS SQL alias type.
    Alias,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeAttribute {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeDef {
    pub variant: TypeVariant,
    pub labels: Vec<String>,
    pub attributes: Vec<TypeAttribute>,
    pub base_type: Option<String>,
    pub not_null: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyDef {
    /// `ALL`, `SELECT`, `INSERT`, `UPDATE`, `DELETE`.
    pub command: String,
    pub permissive: bool,
    pub roles: Vec<String>,
    pub using: Option<String>,
    pub with_check: Option<String>,
}

impl Default for PolicyDef {
    fn default() -> Self {
        PolicyDef {
            command: "ALL".to_string(),
            permissive: true,
            roles: Vec::new(),
            using: None,
            with_check: None,
        }
    }
}
