use super::{Phase, ScriptBuffer};
use crate::error::Result;
use crate::resolver::{ResolvedActions, StepKind};

/// Renders every resolved action into the body of `buffer`, in order.
pub fn convert(resolved: &ResolvedActions<'_>, buffer: &mut ScriptBuffer) -> Result<()> {
    let generator = resolved.new.dialect().generator();
    for action in &resolved.actions {
        let statements = match action.step {
            StepKind::Create => {
                generator.create(action.statement, resolved.new, &resolved.detached)?
            }
            StepKind::Drop => generator.drop(action.statement, resolved.old)?,
            StepKind::Alter => action.alter_sql().to_vec(),
            StepKind::PassThrough => continue,
        };
        log::debug!(
            "{:?} {} ({}): {} statements",
            action.step,
            action.id(),
            action.state,
            statements.len()
        );
        for sql in statements {
            buffer.push(Phase::Body, sql);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::differ::diff_tree;
    use crate::model::{
        ColumnDef, ObjectId, SchemaDef, Snapshot, SnapshotBuilder, StatementBody, TableDef,
        ViewDef,
    };
    use crate::resolver::{resolve, AdditionalDependencies};
    use crate::selection::{flatten, SelectionFilter};

    fn snapshot(dialect: Dialect, schema: &str, columns: &[(&str, &str)], view: bool) -> Snapshot {
        let mut builder = SnapshotBuilder::new(dialect);
        let schema_id = builder
            .add(
                &ObjectId::database(),
                schema,
                StatementBody::Schema(SchemaDef::default()),
            )
            .unwrap();
        let table = builder
            .add(&schema_id, "t", StatementBody::Table(TableDef::default()))
            .unwrap();
        for (name, data_type) in columns {
            builder
                .add(
                    &table,
                    name,
                    StatementBody::Column(ColumnDef {
                        data_type: data_type.to_string(),
                        ..Default::default()
                    }),
                )
                .unwrap();
        }
        if view {
            builder
                .add(
                    &schema_id,
                    "v",
                    StatementBody::View(ViewDef {
                        query: format!("SELECT a FROM {}.t", schema),
                        ..Default::default()
                    }),
                )
                .unwrap();
        }
        builder.drain_analysis_blocking();
        builder.build().unwrap()
    }

    fn body(old: &Snapshot, new: &Snapshot) -> Vec<String> {
        let tree = diff_tree(old, new).unwrap();
        let elements = flatten(&tree, old, new, &SelectionFilter::default());
        let resolved = resolve(old, new, &elements, &AdditionalDependencies::default()).unwrap();
        let mut buffer = ScriptBuffer::new(new.dialect());
        convert(&resolved, &mut buffer).unwrap();
        buffer.statements(Phase::Body).map(str::to_string).collect()
    }

    #[test]
    fn test_added_column_is_one_alter() {
        let old = snapshot(Dialect::Postgres, "public", &[("a", "int")], false);
        let new = snapshot(Dialect::Postgres, "public", &[("a", "int"), ("b", "int")], false);
        assert_eq!(
            body(&old, &new),
            vec!["ALTER TABLE public.t ADD COLUMN b int"]
        );
    }

    #[test]
    fn test_dropped_table_takes_view_first() {
        let old = snapshot(Dialect::Postgres, "public", &[("a", "int")], true);
        let mut builder = SnapshotBuilder::new(Dialect::Postgres);
        builder
            .add(
                &ObjectId::database(),
                "public",
                StatementBody::Schema(SchemaDef::default()),
            )
            .unwrap();
        let new = builder.build().unwrap();
        assert_eq!(
            body(&old, &new),
            vec!["DROP VIEW public.v", "DROP TABLE public.t"]
        );
    }

    #[test]
    fn test_mssql_refreshes_dependent_view_in_place() {
        let old = snapshot(Dialect::MsSql, "dbo", &[("a", "int")], true);
        let new = snapshot(Dialect::MsSql, "dbo", &[("a", "bigint")], true);
        let statements = body(&old, &new);
        assert!(statements[0].starts_with("ALTER TABLE [dbo].[t] ALTER COLUMN [a] bigint"));
        assert_eq!(
            statements.last().map(String::as_str),
            Some("EXEC sys.sp_refreshsqlmodule N'[dbo].[v]'")
        );
    }
}
