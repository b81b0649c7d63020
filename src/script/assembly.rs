use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{convert, Phase, ScriptBuffer};
use crate::dialect::Dialect;
use crate::error::{DiffError, Result};
use crate::resolver::ResolvedActions;

/// Everything assembly needs besides the actions. Pre and post scripts hold SQL text that has
/// already been read, so assembly itself performs no I/O.
#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    pub transaction: bool,
    /// PostgreSQL only; `false` emits `SET check_function_bodies = false`.
    pub check_function_bodies: bool,
    pub pre: Vec<String>,
    pub post: Vec<String>,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        AssemblyOptions {
            transaction: true,
            check_function_bodies: true,
            pre: Vec::new(),
            post: Vec::new(),
        }
    }
}

/// Reads pre or post scripts. A directory contributes every `.sql` file below it, in file name
/// order.
pub fn read_scripts<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<String>> {
    let mut scripts = Vec::new();
    for path in paths {
        let path = path.as_ref();
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry.map_err(|err| {
                    let at = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| path.to_path_buf());
                    DiffError::io(at, err.into())
                })?;
                if entry.file_type().is_file()
                    && entry.path().extension().map_or(false, |ext| ext == "sql")
                {
                    scripts.push(read(entry.path())?);
                }
            }
        } else {
            scripts.push(read(path)?);
        }
    }
    log::debug!("read {} user scripts", scripts.len());
    Ok(scripts)
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|err| DiffError::io(PathBuf::from(path), err))
}

/// Builds the complete script: dialect preamble, transaction, pre scripts, the converted
/// actions, post scripts. An empty action set yields an empty buffer.
pub fn assemble(
    resolved: &ResolvedActions<'_>,
    options: &AssemblyOptions,
) -> Result<ScriptBuffer> {
    let dialect = resolved.new.dialect();
    let mut buffer = ScriptBuffer::new(dialect);
    if resolved.is_empty() {
        log::info!("no changes to migrate");
        return Ok(buffer);
    }

    match dialect {
        Dialect::Postgres => {
            buffer.push(Phase::Begin, "SET search_path = pg_catalog");
            if !options.check_function_bodies {
                buffer.push(Phase::Begin, "SET check_function_bodies = false");
            }
            if options.transaction {
                buffer.push(Phase::Begin, "START TRANSACTION");
            }
        }
        Dialect::MsSql => {
            buffer.push(Phase::Begin, "SET QUOTED_IDENTIFIER ON");
            buffer.push(Phase::Begin, "SET ANSI_NULLS ON");
            if options.transaction {
                buffer.push(Phase::Begin, "BEGIN TRANSACTION");
            }
        }
        Dialect::ClickHouse => {
            if options.transaction {
                log::debug!("ClickHouse has no DDL transactions; emitting without one");
            }
        }
    }
    for script in &options.pre {
        buffer.push_raw(Phase::Begin, script);
    }

    convert(resolved, &mut buffer)?;

    for script in &options.post {
        buffer.push_raw(Phase::End, script);
    }
    if options.transaction {
        match dialect {
            Dialect::Postgres => buffer.push(Phase::End, "COMMIT TRANSACTION"),
            Dialect::MsSql => buffer.push(Phase::End, "COMMIT"),
            Dialect::ClickHouse => {}
        }
    }
    log::info!(
        "assembled {} statements",
        buffer.statements(Phase::Body).count()
    );
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::differ::diff_tree;
    use crate::model::{
        ColumnDef, ObjectId, SchemaDef, Snapshot, SnapshotBuilder, StatementBody, TableDef,
    };
    use crate::resolver::{resolve, AdditionalDependencies};
    use crate::selection::{flatten, SelectionFilter};
    use std::io::Write;

    fn snapshot(dialect: Dialect, columns: &[&str]) -> Snapshot {
        let mut builder = SnapshotBuilder::new(dialect);
        let schema = builder
            .add(
                &ObjectId::database(),
                "app",
                StatementBody::Schema(SchemaDef::default()),
            )
            .unwrap();
        let table = builder
            .add(&schema, "t", StatementBody::Table(TableDef::default()))
            .unwrap();
        for column in columns {
            builder
                .add(
                    &table,
                    column,
                    StatementBody::Column(ColumnDef {
                        data_type: "Int32".to_string(),
                        ..Default::default()
                    }),
                )
                .unwrap();
        }
        builder.build().unwrap()
    }

    fn script(dialect: Dialect, options: &AssemblyOptions) -> String {
        let old = snapshot(dialect, &["a"]);
        let new = snapshot(dialect, &["a", "b"]);
        let tree = diff_tree(&old, &new).unwrap();
        let elements = flatten(&tree, &old, &new, &SelectionFilter::default());
        let resolved = resolve(&old, &new, &elements, &AdditionalDependencies::default()).unwrap();
        assemble(&resolved, options).unwrap().render()
    }

    #[test]
    fn test_postgres_script_is_wrapped() {
        let options = AssemblyOptions {
            check_function_bodies: false,
            pre: vec!["-- before\n".to_string()],
            post: vec!["-- after\n".to_string()],
            ..Default::default()
        };
        assert_eq!(
            script(Dialect::Postgres, &options),
            "SET search_path = pg_catalog;\n\
             SET check_function_bodies = false;\n\
             START TRANSACTION;\n\
             -- before\n\
             \n\
             ALTER TABLE app.t ADD COLUMN b Int32;\n\
             \n\
             -- after\n\
             COMMIT TRANSACTION;\n"
        );
    }

    #[test]
    fn test_mssql_script_uses_batches() {
        let rendered = script(Dialect::MsSql, &AssemblyOptions::default());
        assert!(rendered.starts_with("SET QUOTED_IDENTIFIER ON\nGO\nSET ANSI_NULLS ON\nGO\n"));
        assert!(rendered.contains("BEGIN TRANSACTION\nGO\n"));
        assert!(rendered.ends_with("COMMIT\nGO\n"));
    }

    #[test]
    fn test_clickhouse_script_has_no_transaction() {
        let rendered = script(Dialect::ClickHouse, &AssemblyOptions::default());
        assert!(!rendered.contains("TRANSACTION"));
        assert!(rendered.starts_with("ALTER TABLE app.t ADD COLUMN b Int32"));
    }

    #[test]
    fn test_no_changes_yield_empty_script() {
        let old = snapshot(Dialect::Postgres, &["a"]);
        let new = snapshot(Dialect::Postgres, &["a"]);
        let resolved = resolve(&old, &new, &[], &AdditionalDependencies::default()).unwrap();
        let buffer = assemble(&resolved, &AssemblyOptions::default()).unwrap();
        assert!(buffer.is_empty());
        assert_eq!(buffer.render(), "");
    }

    #[test]
    fn test_scripts_from_directory_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        for (name, body) in [("02_second.sql", "SELECT 2;"), ("01_first.sql", "SELECT 1;")] {
            let mut file = fs::File::create(dir.path().join(name)).unwrap();
            file.write_all(body.as_bytes()).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let scripts = read_scripts(&[dir.path()]).unwrap();
        assert_eq!(scripts, vec!["SELECT 1;", "SELECT 2;"]);
    }

    #[test]
    fn test_missing_script_is_an_io_error() {
        let err = read_scripts(&["/nonexistent/pre.sql"]).unwrap_err();
        assert!(matches!(err, DiffError::Io { .. }));
    }
}
