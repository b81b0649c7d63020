use std::collections::BTreeSet;

use super::{
    argument_types, constraint_definition, literal, AlterOutcome, AlterSql, Dialect, SqlGenerator,
};
use crate::error::Result;
use crate::model::{
    ColumnDef, DbObjType, ObjectId, PolicyDef, RoleDef, RoutineDef, SequenceDef, Snapshot,
    Statement, StatementBody, TableDef, TypeDef, TypeVariant,
};

const PG: Dialect = Dialect::Postgres;

/// Role attributes that have a `NO...` negation.
const NEGATABLE_ROLE_OPTIONS: &[&str] = &[
    "SUPERUSER",
    "CREATEDB",
    "CREATEROLE",
    "INHERIT",
    "LOGIN",
    "REPLICATION",
    "BYPASSRLS",
];

fn q(ident: &str) -> String {
    PG.quote_ident(ident)
}

pub struct PostgresGenerator;

impl PostgresGenerator {
    fn column_definition(&self, name: &str, column: &ColumnDef) -> String {
        let mut sql = format!("{} {}", q(name), column.data_type);
        if let Some(collation) = &column.collation {
            sql.push_str(&format!(" COLLATE {}", q(collation)));
        }
        if let Some(default) = &column.default {
            sql.push_str(&format!(" DEFAULT {}", default));
        }
        if column.not_null {
            sql.push_str(" NOT NULL");
        }
        sql
    }

    fn schema_qualified(&self, id: &ObjectId) -> String {
        match id.path.as_slice() {
            [schema, .., name] => format!("{}.{}", q(schema), q(name)),
            _ => PG.qualified(id),
        }
    }

    fn routine_signature(&self, stmt: &Statement, routine: &RoutineDef) -> String {
        format!("{}({})", PG.qualified(&stmt.id), argument_types(routine))
    }

    /// `KIND name` as used by `COMMENT ON` and `ALTER ... OWNER TO`.
    fn target(&self, stmt: &Statement) -> Option<String> {
        let id = &stmt.id;
        let target = match &stmt.body {
            StatementBody::Database => return None,
            StatementBody::Schema(_) => format!("SCHEMA {}", PG.qualified(id)),
            StatementBody::Role(_) => format!("ROLE {}", PG.qualified(id)),
            StatementBody::Table(_) => format!("TABLE {}", PG.qualified(id)),
            StatementBody::Column(_) => format!(
                "COLUMN {}.{}",
                PG.owning_table(id),
                q(id.name())
            ),
            StatementBody::Constraint(_) => format!(
                "CONSTRAINT {} ON {}",
                q(id.name()),
                PG.owning_table(id)
            ),
            StatementBody::Index(_) => format!("INDEX {}", self.schema_qualified(id)),
            StatementBody::View(view) if view.materialized => {
                format!("MATERIALIZED VIEW {}", PG.qualified(id))
            }
            StatementBody::View(_) => format!("VIEW {}", PG.qualified(id)),
            StatementBody::Function(routine) => {
                format!("FUNCTION {}", self.routine_signature(stmt, routine))
            }
            StatementBody::Procedure(routine) => {
                format!("PROCEDURE {}", self.routine_signature(stmt, routine))
            }
            StatementBody::Trigger(_) => format!(
                "TRIGGER {} ON {}",
                q(id.name()),
                PG.owning_table(id)
            ),
            StatementBody::Sequence(_) => format!("SEQUENCE {}", PG.qualified(id)),
            StatementBody::Type(def) if def.variant == TypeVariant::Alias => {
                format!("DOMAIN {}", PG.qualified(id))
            }
            StatementBody::Type(_) => format!("TYPE {}", PG.qualified(id)),
            StatementBody::Policy(_) => format!(
                "POLICY {} ON {}",
                q(id.name()),
                PG.owning_table(id)
            ),
        };
        Some(target)
    }

    fn owner_sql(&self, stmt: &Statement) -> Option<String> {
        let owner = stmt.owner.as_ref()?;
        match stmt.kind() {
            DbObjType::Schema
            | DbObjType::Table
            | DbObjType::View
            | DbObjType::Sequence
            | DbObjType::Function
            | DbObjType::Procedure
            | DbObjType::Type => self
                .target(stmt)
                .map(|target| format!("ALTER {} OWNER TO {}", target, q(owner))),
            _ => None,
        }
    }

    fn comment_sql(&self, stmt: &Statement) -> Option<String> {
        let target = self.target(stmt)?;
        Some(match &stmt.comment {
            Some(comment) => format!("COMMENT ON {} IS {}", target, literal(comment)),
            None => format!("COMMENT ON {} IS NULL", target),
        })
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
                    lines.push(format!("\t{}", self.column_definition(child.name(), column)));
                }
                StatementBody::Constraint(constraint) if !detached.contains(&child.id) => {
                    lines.push(format!(
                        "\tCONSTRAINT {} {}",
                        q(child.name()),
                        constraint_definition(PG, constraint)
                    ));
                }
                _ => continue,
            }
            if child.comment.is_some() {
                trailing.extend(self.comment_sql(child));
            }
        }

        let mut sql = format!(
            "CREATE {}TABLE {} (",
            if table.unlogged { "UNLOGGED " } else { "" },
            PG.qualified(&stmt.id)
        );
        if lines.is_empty() {
            sql.push(')');
        } else {
            sql.push_str(&format!("\n{}\n)", lines.join(",\n")));
        }
        if let Some(partition) = &table.partition_by {
            sql.push_str(&format!("\nPARTITION BY {}", partition));
        }
        if !table.options.is_empty() {
            let options: Vec<String> = table
                .options
                .iter()
                .map(|(key, value)| format!("{} = {}", key, value))
                .collect();
            sql.push_str(&format!("\nWITH ({})", options.join(", ")));
        }
        if let Some(tablespace) = &table.tablespace {
            sql.push_str(&format!("\nTABLESPACE {}", q(tablespace)));
        }
        sql
    }

    fn create_routine(&self, stmt: &Statement, routine: &RoutineDef, procedure: bool) -> String {
        let args: Vec<String> = routine
            .arguments
            .iter()
            .map(|arg| {
                let mut sql = match &arg.name {
                    Some(name) => format!("{} {}", q(name), arg.data_type),
                    None => arg.data_type.clone(),
                };
                if let Some(default) = &arg.default {
                    sql.push_str(&format!(" DEFAULT {}", default));
                }
                sql
            })
            .collect();
        let mut sql = format!(
            "CREATE OR REPLACE {} {}({})",
            if procedure { "PROCEDURE" } else { "FUNCTION" },
            PG.qualified(&stmt.id),
            args.join(", ")
        );
        if !procedure {
            sql.push_str(&format!(
                "\n    RETURNS {}",
                routine.returns.as_deref().unwrap_or("void")
            ));
        }
        sql.push_str(&format!(
            "\n    LANGUAGE {}",
            routine.language.as_deref().unwrap_or("sql")
        ));
        if let Some(volatility) = &routine.volatility {
            sql.push_str(&format!("\n    {}", volatility.to_ascii_uppercase()));
        }
        let tag = if routine.body.contains("$$") {
            "$function$"
        } else {
            "$$"
        };
        sql.push_str(&format!("\nAS {tag}{}{tag}", routine.body));
        sql
    }

    fn sequence_clauses(&self, old: Option<&SequenceDef>, new: &SequenceDef) -> Vec<String> {
        let changed = |f: fn(&SequenceDef) -> Option<i64>| old.map(f) != Some(f(new));
        let mut clauses = Vec::new();
        if old.map(|seq| &seq.data_type) != Some(&new.data_type) {
            if let Some(data_type) = &new.data_type {
                clauses.push(format!("AS {}", data_type));
            }
        }
        if changed(|seq| seq.start) {
            if let Some(start) = new.start {
                clauses.push(format!("START WITH {}", start));
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
            clauses.push(format!("CACHE {}", new.cache.unwrap_or(1)));
        }
        if old.map(|seq| seq.cycle) != Some(new.cycle) {
            clauses.push(if new.cycle { "CYCLE" } else { "NO CYCLE" }.to_string());
        }
        clauses
    }

    fn create_type(&self, stmt: &Statement, def: &TypeDef) -> String {
        let name = PG.qualified(&stmt.id);
        match def.variant {
            TypeVariant::Enum => {
                let labels: Vec<String> = def.labels.iter().map(|label| literal(label)).collect();
                format!("CREATE TYPE {} AS ENUM ({})", name, labels.join(", "))
            }
            TypeVariant::Composite => {
                let attributes: Vec<String> = def
                    .attributes
                    .iter()
                    .map(|attr| format!("{} {}", q(&attr.name), attr.data_type))
                    .collect();
                format!("CREATE TYPE {} AS ({})", name, attributes.join(", "))
            }
            TypeVariant::Alias => {
                let mut sql = format!(
                    "CREATE DOMAIN {} AS {}",
                    name,
                    def.base_type.as_deref().unwrap_or("text")
                );
                if def.not_null {
                    sql.push_str(" NOT NULL");
                }
                sql
            }
        }
    }

    fn policy_roles(&self, policy: &PolicyDef) -> String {
        if policy.roles.is_empty() {
            "PUBLIC".to_string()
        } else {
            PG.quote_list(&policy.roles)
        }
    }

    fn alter_role(&self, stmt: &Statement, old: &RoleDef, new: &RoleDef, sql: &mut AlterSql) -> bool {
        let normalize = |option: &String| option.trim().to_ascii_uppercase();
        let old_options: BTreeSet<String> = old.options.iter().map(normalize).collect();
        let new_options: BTreeSet<String> = new.options.iter().map(normalize).collect();
        let mut clauses: Vec<String> = new_options.difference(&old_options).cloned().collect();
        for removed in old_options.difference(&new_options) {
            if !NEGATABLE_ROLE_OPTIONS.contains(&removed.as_str()) {
                return false;
            }
            clauses.push(format!("NO{}", removed));
        }
        if !clauses.is_empty() {
            sql.push(format!(
                "ALTER ROLE {} WITH {}",
                PG.qualified(&stmt.id),
                clauses.join(" ")
            ));
        }
        true
    }

    fn alter_table(&self, stmt: &Statement, old: &TableDef, new: &TableDef, sql: &mut AlterSql) -> bool {
        if old.partition_by != new.partition_by
            || old.engine != new.engine
            || old.order_by != new.order_by
            || old.ttl != new.ttl
        {
            return false;
        }
        let name = PG.qualified(&stmt.id);
        if old.tablespace != new.tablespace {
            sql.push(format!(
                "ALTER TABLE {} SET TABLESPACE {}",
                name,
                q(new.tablespace.as_deref().unwrap_or("pg_default"))
            ));
        }
        if old.unlogged != new.unlogged {
            sql.push(format!(
                "ALTER TABLE {} SET {}",
                name,
                if new.unlogged { "UNLOGGED" } else { "LOGGED" }
            ));
        }
        let set: Vec<String> = new
            .options
            .iter()
            .filter(|(key, value)| old.options.get(*key) != Some(*value))
            .map(|(key, value)| format!("{} = {}", key, value))
            .collect();
        if !set.is_empty() {
            sql.push(format!("ALTER TABLE {} SET ({})", name, set.join(", ")));
        }
        let reset: Vec<&str> = old
            .options
            .keys()
            .filter(|key| !new.options.contains_key(*key))
            .map(String::as_str)
            .collect();
        if !reset.is_empty() {
            sql.push(format!("ALTER TABLE {} RESET ({})", name, reset.join(", ")));
        }
        true
    }

    fn alter_column(&self, stmt: &Statement, old: &ColumnDef, new: &ColumnDef, sql: &mut AlterSql) {
        let prefix = format!(
            "ALTER TABLE {} ALTER COLUMN {}",
            PG.owning_table(&stmt.id),
            q(stmt.name())
        );
        if old.data_type != new.data_type || old.collation != new.collation {
            let mut change = format!("{} TYPE {}", prefix, new.data_type);
            if let Some(collation) = &new.collation {
                change.push_str(&format!(" COLLATE {}", q(collation)));
            }
            if old.data_type != new.data_type {
                change.push_str(&format!(" USING {}::{}", q(stmt.name()), new.data_type));
            }
            sql.push_invalidating(change);
        }
        if old.default != new.default {
            sql.push(match &new.default {
                Some(default) => format!("{} SET DEFAULT {}", prefix, default),
                None => format!("{} DROP DEFAULT", prefix),
            });
        }
        if old.not_null != new.not_null {
            sql.push(format!(
                "{} {} NOT NULL",
                prefix,
                if new.not_null { "SET" } else { "DROP" }
            ));
        }
    }

    fn alter_enum(&self, stmt: &Statement, old: &TypeDef, new: &TypeDef, sql: &mut AlterSql) -> bool {
        // Existing labels must keep their relative order.
        let mut remaining = old.labels.iter().peekable();
        for label in &new.labels {
            if remaining.peek() == Some(&label) {
                remaining.next();
            }
        }
        if remaining.next().is_some() {
            return false;
        }
        let name = PG.qualified(&stmt.id);
        for (pos, label) in new.labels.iter().enumerate() {
            if old.labels.contains(label) {
                continue;
            }
            let next_existing = new.labels[pos + 1..]
                .iter()
                .find(|next| old.labels.contains(next));
            sql.push(match next_existing {
                Some(next) => format!(
                    "ALTER TYPE {} ADD VALUE {} BEFORE {}",
                    name,
                    literal(label),
                    literal(next)
                ),
                None => format!("ALTER TYPE {} ADD VALUE {}", name, literal(label)),
            });
        }
        true
    }

    fn alter_policy(&self, stmt: &Statement, old: &PolicyDef, new: &PolicyDef, sql: &mut AlterSql) -> bool {
        if old.command != new.command
            || old.permissive != new.permissive
            || (old.using.is_some() && new.using.is_none())
            || (old.with_check.is_some() && new.with_check.is_none())
        {
            return false;
        }
        let mut clauses = Vec::new();
        if old.roles != new.roles {
            clauses.push(format!("TO {}", self.policy_roles(new)));
        }
        if old.using != new.using {
            if let Some(using) = &new.using {
                clauses.push(format!("USING ({})", using));
            }
        }
        if old.with_check != new.with_check {
            if let Some(check) = &new.with_check {
                clauses.push(format!("WITH CHECK ({})", check));
            }
        }
        if !clauses.is_empty() {
            sql.push(format!(
                "ALTER POLICY {} ON {} {}",
                q(stmt.name()),
                PG.owning_table(&stmt.id),
                clauses.join(" ")
            ));
        }
        true
    }
}

impl SqlGenerator for PostgresGenerator {
    fn dialect(&self) -> Dialect {
        PG
    }

    fn create(
        &self,
        stmt: &Statement,
        snapshot: &Snapshot,
        detached: &BTreeSet<ObjectId>,
    ) -> Result<Vec<String>> {
        let id = &stmt.id;
        let mut trailing = Vec::new();
        let main = match &stmt.body {
            StatementBody::Database => return Ok(Vec::new()),
            StatementBody::Schema(_) => format!("CREATE SCHEMA {}", PG.qualified(id)),
            StatementBody::Role(role) => {
                let mut sql = format!("CREATE ROLE {}", PG.qualified(id));
                if !role.options.is_empty() {
                    sql.push_str(&format!(" WITH {}", role.options.join(" ")));
                }
                sql
            }
            StatementBody::Table(table) => {
                self.create_table(stmt, table, snapshot, detached, &mut trailing)
            }
            StatementBody::Column(column) => format!(
                "ALTER TABLE {} ADD COLUMN {}",
                PG.owning_table(id),
                self.column_definition(stmt.name(), column)
            ),
            StatementBody::Constraint(constraint) => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} {}",
                PG.owning_table(id),
                q(stmt.name()),
                constraint_definition(PG, constraint)
            ),
            StatementBody::Index(index) => {
                let mut sql = format!(
                    "CREATE {}INDEX {} ON {}",
                    if index.unique { "UNIQUE " } else { "" },
                    q(stmt.name()),
                    PG.owning_table(id)
                );
                if let Some(method) = &index.method {
                    sql.push_str(&format!(" USING {}", method));
                }
                sql.push_str(&format!(" ({})", index.columns.join(", ")));
                if let Some(tablespace) = &index.tablespace {
                    sql.push_str(&format!(" TABLESPACE {}", q(tablespace)));
                }
                if let Some(predicate) = &index.predicate {
                    sql.push_str(&format!(" WHERE {}", predicate));
                }
                sql
            }
            StatementBody::View(view) => {
                let mut sql = format!(
                    "CREATE {}VIEW {}",
                    if view.materialized { "MATERIALIZED " } else { "" },
                    PG.qualified(id)
                );
                if !view.columns.is_empty() {
                    sql.push_str(&format!(" ({})", PG.quote_list(&view.columns)));
                }
                sql.push_str(&format!(" AS\n{}", view.query.trim_end_matches(';')));
                sql
            }
            StatementBody::Function(routine) => self.create_routine(stmt, routine, false),
            StatementBody::Procedure(routine) => self.create_routine(stmt, routine, true),
            StatementBody::Trigger(trigger) => {
                let mut sql = format!(
                    "CREATE TRIGGER {} {} {} ON {} FOR EACH {}",
                    q(stmt.name()),
                    trigger.timing,
                    trigger.events.join(" OR "),
                    PG.owning_table(id),
                    if trigger.for_each_row { "ROW" } else { "STATEMENT" }
                );
                if let Some(condition) = &trigger.condition {
                    sql.push_str(&format!(" WHEN ({})", condition));
                }
                match (&trigger.function, &trigger.body) {
                    (Some(function), _) => {
                        let name: Vec<String> = function.split('.').map(q).collect();
                        sql.push_str(&format!(" EXECUTE FUNCTION {}()", name.join(".")));
                    }
                    (None, Some(body)) => sql.push_str(&format!(" {}", body)),
                    (None, None) => {}
                }
                sql
            }
            StatementBody::Sequence(sequence) => {
                let mut sql = format!("CREATE SEQUENCE {}", PG.qualified(id));
                for clause in self.sequence_clauses(None, sequence) {
                    if clause != "NO MINVALUE" && clause != "NO MAXVALUE" && clause != "NO CYCLE" {
                        sql.push_str(&format!("\n\t{}", clause));
                    }
                }
                sql
            }
            StatementBody::Type(def) => self.create_type(stmt, def),
            StatementBody::Policy(policy) => {
                let mut sql = format!(
                    "CREATE POLICY {} ON {}\n\tAS {}\n\tFOR {}\n\tTO {}",
                    q(stmt.name()),
                    PG.owning_table(id),
                    if policy.permissive { "PERMISSIVE" } else { "RESTRICTIVE" },
                    policy.command,
                    self.policy_roles(policy)
                );
                if let Some(using) = &policy.using {
                    sql.push_str(&format!("\n\tUSING ({})", using));
                }
                if let Some(check) = &policy.with_check {
                    sql.push_str(&format!("\n\tWITH CHECK ({})", check));
                }
                sql
            }
        };

        let mut statements = vec![main];
        statements.extend(self.owner_sql(stmt));
        if stmt.comment.is_some() {
            statements.extend(self.comment_sql(stmt));
        }
        statements.extend(trailing);
        Ok(statements)
    }

    fn drop(&self, stmt: &Statement, _snapshot: &Snapshot) -> Result<Vec<String>> {
        let id = &stmt.id;
        let sql = match &stmt.body {
            StatementBody::Database => return Ok(Vec::new()),
            StatementBody::Column(_) => format!(
                "ALTER TABLE {} DROP COLUMN {}",
                PG.owning_table(id),
                q(stmt.name())
            ),
            StatementBody::Constraint(_) => format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                PG.owning_table(id),
                q(stmt.name())
            ),
            _ => match self.target(stmt) {
                Some(target) => format!("DROP {}", target),
                None => return Ok(Vec::new()),
            },
        };
        Ok(vec![sql])
    }

    fn alter(&self, old: &Statement, new: &Statement, _snapshot: &Snapshot) -> Result<AlterOutcome> {
        let mut sql = AlterSql::default();
        let alterable = match (&old.body, &new.body) {
            (StatementBody::Database, StatementBody::Database) => true,
            (StatementBody::Schema(a), StatementBody::Schema(b)) => a == b,
            (StatementBody::Role(a), StatementBody::Role(b)) => self.alter_role(new, a, b, &mut sql),
            (StatementBody::Table(a), StatementBody::Table(b)) => {
                self.alter_table(new, a, b, &mut sql)
            }
            (StatementBody::Column(a), StatementBody::Column(b)) => {
                self.alter_column(new, a, b, &mut sql);
                true
            }
            (StatementBody::Constraint(a), StatementBody::Constraint(b)) => a == b,
            (StatementBody::Index(a), StatementBody::Index(b)) => {
                let mut same_key = a.clone();
                same_key.tablespace = b.tablespace.clone();
                if same_key != *b {
                    false
                } else {
                    if a.tablespace != b.tablespace {
                        sql.push(format!(
                            "ALTER INDEX {} SET TABLESPACE {}",
                            self.schema_qualified(&new.id),
                            q(b.tablespace.as_deref().unwrap_or("pg_default"))
                        ));
                    }
                    true
                }
            }
            (StatementBody::View(a), StatementBody::View(b)) => a == b,
            (StatementBody::Function(a), StatementBody::Function(b))
            | (StatementBody::Procedure(a), StatementBody::Procedure(b)) => {
                if a.returns != b.returns || a.arguments != b.arguments {
                    false
                } else {
                    if a.body != b.body || a.language != b.language || a.volatility != b.volatility {
                        sql.push(self.create_routine(
                            new,
                            b,
                            new.kind() == DbObjType::Procedure,
                        ));
                    }
                    true
                }
            }
            (StatementBody::Trigger(a), StatementBody::Trigger(b)) => a == b,
            (StatementBody::Sequence(a), StatementBody::Sequence(b)) => {
                let clauses = self.sequence_clauses(Some(a), b);
                if !clauses.is_empty() {
                    sql.push(format!(
                        "ALTER SEQUENCE {} {}",
                        PG.qualified(&new.id),
                        clauses.join(" ")
                    ));
                }
                true
            }
            (StatementBody::Type(a), StatementBody::Type(b)) => {
                if a.variant == TypeVariant::Enum && b.variant == TypeVariant::Enum {
                    self.alter_enum(new, a, b, &mut sql)
                } else {
                    a == b
                }
            }
            (StatementBody::Policy(a), StatementBody::Policy(b)) => {
                self.alter_policy(new, a, b, &mut sql)
            }
            _ => false,
        };
        if !alterable {
            return Ok(AlterOutcome::Recreate);
        }

        if old.owner != new.owner {
            sql.extend(self.owner_sql(new));
        }
        if old.comment != new.comment {
            sql.extend(self.comment_sql(new));
        }
        Ok(sql.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ConstraintDef, ConstraintType, ForeignKeyRef, SchemaDef, SnapshotBuilder, ViewDef,
    };

    fn snapshot_with(
        build: impl FnOnce(&mut SnapshotBuilder, &ObjectId),
    ) -> Snapshot {
        let mut builder = SnapshotBuilder::new(Dialect::Postgres);
        let schema = builder
            .add(
                &ObjectId::database(),
                "public",
                StatementBody::Schema(SchemaDef::default()),
            )
            .unwrap();
        build(&mut builder, &schema);
        builder.drain_analysis_blocking();
        builder.build().unwrap()
    }

    fn int_column(not_null: bool) -> StatementBody {
        StatementBody::Column(ColumnDef {
            data_type: "integer".to_string(),
            not_null,
            ..Default::default()
        })
    }

    fn no_detached() -> BTreeSet<ObjectId> {
        BTreeSet::new()
    }

    #[test]
    fn test_create_table_with_inline_constraints() {
        let snapshot = snapshot_with(|builder, schema| {
            let table = builder
                .add(schema, "orders", StatementBody::Table(TableDef::default()))
                .unwrap();
            builder.add(&table, "id", int_column(true)).unwrap();
            builder.add(&table, "customer_id", int_column(false)).unwrap();
            builder
                .add(
                    &table,
                    "orders_pkey",
                    StatementBody::Constraint(ConstraintDef {
                        constraint_type: ConstraintType::PrimaryKey,
                        columns: vec!["id".to_string()],
                        expression: None,
                        references: None,
                    }),
                )
                .unwrap();
            builder.set_comment(&table, "All orders").unwrap();
        });
        let table = snapshot.get(&ObjectId::table("public", "orders")).unwrap();
        let sql = PostgresGenerator
            .create(table, &snapshot, &no_detached())
            .unwrap();
        assert_eq!(
            sql[0],
            "CREATE TABLE public.orders (\n\tid integer NOT NULL,\n\tcustomer_id integer,\n\tCONSTRAINT orders_pkey PRIMARY KEY (id)\n)"
        );
        assert_eq!(sql[1], "COMMENT ON TABLE public.orders IS 'All orders'");

        let mut detached = BTreeSet::new();
        detached.insert(ObjectId::constraint("public", "orders", "orders_pkey"));
        let sql = PostgresGenerator.create(table, &snapshot, &detached).unwrap();
        assert!(!sql[0].contains("orders_pkey"));
    }

    #[test]
    fn test_add_and_drop_column() {
        let snapshot = snapshot_with(|builder, schema| {
            let table = builder
                .add(schema, "t", StatementBody::Table(TableDef::default()))
                .unwrap();
            builder.add(&table, "b", int_column(false)).unwrap();
        });
        let column = snapshot.get(&ObjectId::column("public", "t", "b")).unwrap();
        assert_eq!(
            PostgresGenerator
                .create(column, &snapshot, &no_detached())
                .unwrap(),
            vec!["ALTER TABLE public.t ADD COLUMN b integer".to_string()]
        );
        assert_eq!(
            PostgresGenerator.drop(column, &snapshot).unwrap(),
            vec!["ALTER TABLE public.t DROP COLUMN b".to_string()]
        );
    }

    #[test]
    fn test_column_type_change_invalidates_dependents() {
        let old = snapshot_with(|builder, schema| {
            let table = builder
                .add(schema, "t", StatementBody::Table(TableDef::default()))
                .unwrap();
            builder.add(&table, "a", int_column(false)).unwrap();
        });
        let new = snapshot_with(|builder, schema| {
            let table = builder
                .add(schema, "t", StatementBody::Table(TableDef::default()))
                .unwrap();
            builder
                .add(
                    &table,
                    "a",
                    StatementBody::Column(ColumnDef {
                        data_type: "bigint".to_string(),
                        not_null: true,
                        ..Default::default()
                    }),
                )
                .unwrap();
        });
        let id = ObjectId::column("public", "t", "a");
        let outcome = PostgresGenerator
            .alter(old.get(&id).unwrap(), new.get(&id).unwrap(), &new)
            .unwrap();
        assert_eq!(
            outcome,
            AlterOutcome::AlterWithDependents(vec![
                "ALTER TABLE public.t ALTER COLUMN a TYPE bigint USING a::bigint".to_string(),
                "ALTER TABLE public.t ALTER COLUMN a SET NOT NULL".to_string(),
            ])
        );
    }

    #[test]
    fn test_view_query_change_recreates() {
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
        let (old, new) = (view("SELECT 1"), view("SELECT 2"));
        let id = ObjectId::view("public", "v");
        assert_eq!(
            PostgresGenerator
                .alter(old.get(&id).unwrap(), new.get(&id).unwrap(), &new)
                .unwrap(),
            AlterOutcome::Recreate
        );
    }

    #[test]
    fn test_enum_labels() {
        let enum_type = |labels: &[&str]| {
            let labels: Vec<String> = labels.iter().map(|label| label.to_string()).collect();
            snapshot_with(move |builder, schema| {
                builder
                    .add(
                        schema,
                        "mood",
                        StatementBody::Type(TypeDef {
                            labels,
                            ..Default::default()
                        }),
                    )
                    .unwrap();
            })
        };
        let id = ObjectId::user_type("public", "mood");
        let old = enum_type(&["sad", "happy"]);

        let added = enum_type(&["sad", "ok", "happy", "ecstatic"]);
        assert_eq!(
            PostgresGenerator
                .alter(old.get(&id).unwrap(), added.get(&id).unwrap(), &added)
                .unwrap(),
            AlterOutcome::Alter(vec![
                "ALTER TYPE public.mood ADD VALUE 'ok' BEFORE 'happy'".to_string(),
                "ALTER TYPE public.mood ADD VALUE 'ecstatic'".to_string(),
            ])
        );

        let reordered = enum_type(&["happy", "sad"]);
        assert_eq!(
            PostgresGenerator
                .alter(old.get(&id).unwrap(), reordered.get(&id).unwrap(), &reordered)
                .unwrap(),
            AlterOutcome::Recreate
        );
    }

    #[test]
    fn test_function_body_change_is_create_or_replace() {
        let function = |body: &str| {
            let body = body.to_string();
            snapshot_with(move |builder, schema| {
                builder
                    .add(
                        schema,
                        "answer",
                        StatementBody::Function(RoutineDef {
                            returns: Some("integer".to_string()),
                            language: Some("plpgsql".to_string()),
                            body,
                            ..Default::default()
                        }),
                    )
                    .unwrap();
            })
        };
        let id = ObjectId::function("public", "answer", &[]);
        let (old, new) = (function("BEGIN RETURN 41; END"), function("BEGIN RETURN 42; END"));
        let outcome = PostgresGenerator
            .alter(old.get(&id).unwrap(), new.get(&id).unwrap(), &new)
            .unwrap();
        assert_eq!(
            outcome,
            AlterOutcome::Alter(vec![
                "CREATE OR REPLACE FUNCTION public.answer()\n    RETURNS integer\n    LANGUAGE plpgsql\nAS $$BEGIN RETURN 42; END$$"
                    .to_string()
            ])
        );
        assert_eq!(
            PostgresGenerator
                .drop(new.get(&id).unwrap(), &new)
                .unwrap(),
            vec!["DROP FUNCTION public.answer()".to_string()]
        );
    }

    #[test]
    fn test_foreign_key_constraint_sql() {
        let snapshot = snapshot_with(|builder, schema| {
            let parent = builder
                .add(schema, "parent", StatementBody::Table(TableDef::default()))
                .unwrap();
            builder.add(&parent, "id", int_column(true)).unwrap();
            let child = builder
                .add(schema, "child", StatementBody::Table(TableDef::default()))
                .unwrap();
            builder.add(&child, "parent_id", int_column(false)).unwrap();
            builder
                .add(
                    &child,
                    "child_fk",
                    StatementBody::Constraint(ConstraintDef {
                        constraint_type: ConstraintType::ForeignKey,
                        columns: vec!["parent_id".to_string()],
                        expression: None,
                        references: Some(ForeignKeyRef {
                            schema: "public".to_string(),
                            table: "parent".to_string(),
                            columns: vec!["id".to_string()],
                            on_delete: Some("CASCADE".to_string()),
                            on_update: None,
                        }),
                    }),
                )
                .unwrap();
        });
        let fk = snapshot
            .get(&ObjectId::constraint("public", "child", "child_fk"))
            .unwrap();
        assert_eq!(
            PostgresGenerator.create(fk, &snapshot, &no_detached()).unwrap(),
            vec![
                "ALTER TABLE public.child ADD CONSTRAINT child_fk FOREIGN KEY (parent_id) REFERENCES public.parent (id) ON DELETE CASCADE"
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_owner_change() {
        let owned = |owner: &str| {
            let owner = owner.to_string();
            snapshot_with(move |builder, schema| {
                let table = builder
                    .add(schema, "t", StatementBody::Table(TableDef::default()))
                    .unwrap();
                builder.set_owner(&table, owner).unwrap();
            })
        };
        let (old, new) = (owned("alice"), owned("bob"));
        let id = ObjectId::table("public", "t");
        assert_eq!(
            PostgresGenerator
                .alter(old.get(&id).unwrap(), new.get(&id).unwrap(), &new)
                .unwrap(),
            AlterOutcome::Alter(vec!["ALTER TABLE public.t OWNER TO bob".to_string()])
        );
    }
}
