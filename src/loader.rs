//! Snapshot and dependency loading
//!
//! A snapshot file is a JSON document holding the dialect and the object tree:
//!
//! ```json
//! {
//!   "dialect": "postgres",
//!   "objects": [
//!     { "name": "public", "kind": "schema", "children": [
//!       { "name": "t", "kind": "table", "children": [
//!         { "name": "id", "kind": "column", "type": "integer", "not_null": true }
//!       ] }
//!     ] }
//!   ]
//! }
//! ```
//!
//! Every node carries its kind-specific fields next to `name` and `kind`, plus optional `owner`,
//! `comment`, `depends_on` and `children`. Query analysis queued while the tree is built is
//! drained before the snapshot is finalized.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::dialect::Dialect;
use crate::error::{DiffError, Result};
use crate::model::{ObjectId, Snapshot, SnapshotBuilder, StatementBody};
use crate::resolver::AdditionalDependencies;

#[derive(Debug, Deserialize)]
struct SnapshotDocument {
    dialect: Dialect,
    #[serde(default)]
    objects: Vec<ObjectNode>,
}

#[derive(Debug, Deserialize)]
struct ObjectNode {
    name: String,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    depends_on: Vec<ObjectId>,
    #[serde(default)]
    children: Vec<ObjectNode>,
    #[serde(flatten)]
    body: StatementBody,
}

/// Parses a snapshot document into a builder whose analysis tasks are still pending.
pub fn parse_snapshot(json: &str, origin: &Path) -> Result<SnapshotBuilder> {
    let document: SnapshotDocument =
        serde_json::from_str(json).map_err(|source| DiffError::Json {
            path: origin.to_path_buf(),
            source,
        })?;
    let mut builder = SnapshotBuilder::new(document.dialect);
    let mut explicit = Vec::new();
    add_nodes(
        &mut builder,
        &ObjectId::database(),
        document.objects,
        &mut explicit,
    )?;
    // Explicit dependencies may point forward in the document.
    for (id, dependencies) in explicit {
        for dependency in dependencies {
            builder.add_dependency(&id, dependency)?;
        }
    }
    log::debug!(
        "parsed {} with {} pending analysis tasks",
        origin.display(),
        builder.pending_analysis()
    );
    Ok(builder)
}

fn add_nodes(
    builder: &mut SnapshotBuilder,
    parent: &ObjectId,
    nodes: Vec<ObjectNode>,
    explicit: &mut Vec<(ObjectId, Vec<ObjectId>)>,
) -> Result<()> {
    for node in nodes {
        builder.dialect().check_supported(node.body.kind())?;
        let id = builder.add(parent, &node.name, node.body)?;
        if let Some(owner) = node.owner {
            builder.set_owner(&id, owner)?;
        }
        if let Some(comment) = node.comment {
            builder.set_comment(&id, comment)?;
        }
        if !node.depends_on.is_empty() {
            explicit.push((id.clone(), node.depends_on));
        }
        add_nodes(builder, &id, node.children, explicit)?;
    }
    Ok(())
}

/// Reads, analyzes and builds one snapshot.
pub async fn load_snapshot(path: impl AsRef<Path>) -> Result<Snapshot> {
    let path = path.as_ref();
    log::info!("loading snapshot {}", path.display());
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| DiffError::io(path, err))?;
    let mut builder = parse_snapshot(&json, path)?;
    builder.drain_analysis().await?;
    builder.build()
}

/// Synchronous counterpart of [`load_snapshot`] for callers without a runtime.
pub fn load_snapshot_blocking(path: impl AsRef<Path>) -> Result<Snapshot> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|err| DiffError::io(path, err))?;
    let mut builder = parse_snapshot(&json, path)?;
    builder.drain_analysis_blocking();
    builder.build()
}

/// Reads the additional dependency file; a missing path means no additional edges.
pub async fn load_dependencies(path: Option<&Path>) -> Result<AdditionalDependencies> {
    let Some(path) = path else {
        return Ok(AdditionalDependencies::default());
    };
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| DiffError::io(path, err))?;
    serde_json::from_str(&json).map_err(|source| DiffError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Locations of the inputs of one run.
#[derive(Debug, Clone)]
pub struct Inputs {
    pub old: PathBuf,
    pub new: PathBuf,
    pub dependencies: Option<PathBuf>,
}

/// Loads both snapshots and the additional dependencies concurrently.
pub async fn load_inputs(
    inputs: &Inputs,
) -> Result<(Snapshot, Snapshot, AdditionalDependencies)> {
    let (old, new, additional) = tokio::try_join!(
        load_snapshot(&inputs.old),
        load_snapshot(&inputs.new),
        load_dependencies(inputs.dependencies.as_deref()),
    )?;
    if old.dialect() != new.dialect() {
        return Err(DiffError::DialectMismatch {
            old: old.dialect(),
            new: new.dialect(),
        });
    }
    Ok((old, new, additional))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DbObjType;

    const DOCUMENT: &str = r#"{
        "dialect": "pg",
        "objects": [
            { "name": "app_owner", "kind": "role" },
            { "name": "public", "kind": "schema", "owner": "app_owner", "children": [
                { "name": "orders", "kind": "table", "comment": "all orders", "children": [
                    { "name": "id", "kind": "column", "type": "integer", "not_null": true },
                    { "name": "status", "kind": "column", "type": "status" },
                    { "name": "orders_pkey", "kind": "constraint",
                      "constraint_type": "primary_key", "columns": ["id"] }
                ] },
                { "name": "status", "kind": "type", "variant": "enum",
                  "labels": ["new", "paid"] },
                { "name": "open_orders", "kind": "view",
                  "query": "SELECT id FROM public.orders WHERE status = 'new'",
                  "depends_on": [{ "kind": "type", "path": ["public", "status"] }] }
            ] }
        ]
    }"#;

    #[test]
    fn test_parse_document() {
        let mut builder = parse_snapshot(DOCUMENT, Path::new("inline.json")).unwrap();
        assert_eq!(builder.dialect(), Dialect::Postgres);
        assert_eq!(builder.pending_analysis(), 1);
        builder.drain_analysis_blocking();
        let snapshot = builder.build().unwrap();

        let schema = snapshot.get(&ObjectId::schema("public")).unwrap();
        assert_eq!(schema.owner.as_deref(), Some("app_owner"));
        let orders = ObjectId::table("public", "orders");
        assert_eq!(
            snapshot.get(&orders).unwrap().comment.as_deref(),
            Some("all orders")
        );
        let status = snapshot
            .get(&ObjectId::column("public", "orders", "status"))
            .unwrap();
        assert!(status
            .dependencies()
            .contains(&ObjectId::user_type("public", "status")));

        let view = snapshot.get(&ObjectId::view("public", "open_orders")).unwrap();
        assert!(view.dependencies().contains(&orders));
        assert!(view
            .dependencies()
            .contains(&ObjectId::column("public", "orders", "id")));
        assert!(view
            .dependencies()
            .contains(&ObjectId::user_type("public", "status")));
    }

    #[test]
    fn test_unsupported_kind_is_rejected() {
        let json = r#"{ "dialect": "clickhouse", "objects": [
            { "name": "db", "kind": "schema", "children": [
                { "name": "s", "kind": "sequence" } ] } ] }"#;
        let err = parse_snapshot(json, Path::new("ch.json")).unwrap_err();
        assert!(matches!(
            err,
            DiffError::UnsupportedObjectType {
                kind: DbObjType::Sequence,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_json_names_the_file() {
        let err = parse_snapshot("{ \"dialect\": 3 }", Path::new("broken.json")).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }

    #[tokio::test]
    async fn test_load_inputs_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.json");
        let new = dir.path().join("new.json");
        let deps = dir.path().join("deps.json");
        std::fs::write(&old, r#"{ "dialect": "postgres", "objects": [] }"#).unwrap();
        std::fs::write(&new, DOCUMENT).unwrap();
        std::fs::write(
            &deps,
            r#"{ "new": [ { "dependent": { "kind": "view", "path": ["public", "open_orders"] },
                            "dependency": { "kind": "table", "path": ["public", "orders"] } } ] }"#,
        )
        .unwrap();

        let inputs = Inputs {
            old,
            new,
            dependencies: Some(deps),
        };
        let (old, new, additional) = load_inputs(&inputs).await.unwrap();
        assert!(old.is_empty());
        assert!(new.contains(&ObjectId::view("public", "open_orders")));
        assert!(additional.old.is_empty());
        assert_eq!(additional.new.len(), 1);
    }

    #[test]
    fn test_load_snapshot_without_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, DOCUMENT).unwrap();
        let snapshot = load_snapshot_blocking(&path).unwrap();
        let view = snapshot.get(&ObjectId::view("public", "open_orders")).unwrap();
        assert!(view
            .dependencies()
            .contains(&ObjectId::table("public", "orders")));
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_an_io_error() {
        let err = load_snapshot("/nonexistent/snapshot.json").await.unwrap_err();
        assert!(matches!(err, DiffError::Io { .. }));
    }
}
