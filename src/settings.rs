use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DiffError, Result};
use crate::model::DbObjType;
use crate::script::{read_scripts, AssemblyOptions};
use crate::selection::{IgnoreRule, IgnoreSpec, Selection, SelectionFilter};

/// Run settings, read from a JSON file. Every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffSettings {
    /// Wildcard patterns on qualified names; empty selects everything.
    pub select: Vec<String>,
    pub ignore: Vec<IgnoreSpec>,
    /// Object types that may be migrated; empty allows every type.
    pub allowed_types: Vec<DbObjType>,
    pub transaction: bool,
    pub pre: Vec<PathBuf>,
    pub post: Vec<PathBuf>,
    pub check_function_bodies: bool,
}

impl Default for DiffSettings {
    fn default() -> Self {
        DiffSettings {
            select: Vec::new(),
            ignore: Vec::new(),
            allowed_types: Vec::new(),
            transaction: true,
            pre: Vec::new(),
            post: Vec::new(),
            check_function_bodies: true,
        }
    }
}

impl DiffSettings {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|err| DiffError::io(path, err))?;
        let settings: DiffSettings =
            serde_json::from_str(&json).map_err(|source| DiffError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        log::debug!("loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn filter(&self) -> Result<SelectionFilter> {
        let ignore = self
            .ignore
            .iter()
            .map(IgnoreRule::from_spec)
            .collect::<Result<Vec<_>>>()?;
        let allowed = if self.allowed_types.is_empty() {
            None
        } else {
            Some(self.allowed_types.iter().copied().collect())
        };
        Ok(SelectionFilter {
            selection: Selection::matching(&self.select)?,
            ignore,
            allowed,
        })
    }

    /// Assembly options, with pre and post scripts read from disk.
    pub fn assembly_options(&self) -> Result<AssemblyOptions> {
        Ok(AssemblyOptions {
            transaction: self.transaction,
            check_function_bodies: self.check_function_bodies,
            pre: read_scripts(&self.pre)?,
            post: read_scripts(&self.post)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectId;

    #[test]
    fn test_defaults_from_empty_document() {
        let settings: DiffSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, DiffSettings::default());
        assert!(settings.transaction);
        assert!(settings.check_function_bodies);
    }

    #[test]
    fn test_filter_from_settings() {
        let settings: DiffSettings = serde_json::from_str(
            r#"{
                "select": ["public.*"],
                "ignore": [{ "pattern": "public.tmp_*", "kinds": ["table"] }],
                "allowed_types": ["table", "index"],
                "transaction": false
            }"#,
        )
        .unwrap();
        let filter = settings.filter().unwrap();
        assert!(filter.includes(&ObjectId::table("public", "orders")));
        assert!(!filter.includes(&ObjectId::table("public", "tmp_orders")));
        assert!(!filter.includes(&ObjectId::view("public", "v")));
        assert!(!filter.includes(&ObjectId::table("audit", "log")));
        assert!(!settings.assembly_options().unwrap().transaction);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let pre = dir.path().join("pre.sql");
        std::fs::write(&pre, "SELECT 1;").unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            format!(r#"{{ "pre": [{:?}], "check_function_bodies": false }}"#, pre),
        )
        .unwrap();

        let settings = DiffSettings::from_file(&path).unwrap();
        let options = settings.assembly_options().unwrap();
        assert_eq!(options.pre, vec!["SELECT 1;"]);
        assert!(!options.check_function_bodies);
    }
}
