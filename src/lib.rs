//! oxidiff: schema snapshot differ and migration script generator
//!
//! Two snapshots of a database schema (PostgreSQL, MS SQL or ClickHouse) are compared; the
//! selected differences are resolved into an ordered list of CREATE, DROP and ALTER steps that
//! respects object dependencies, and rendered as one migration script.
//!
//! ```no_run
//! use oxidiff::loader::Inputs;
//! use oxidiff::settings::DiffSettings;
//!
//! # async fn run() -> oxidiff::Result<()> {
//! let inputs = Inputs {
//!     old: "prod.json".into(),
//!     new: "dev.json".into(),
//!     dependencies: None,
//! };
//! let script = oxidiff::diff(&inputs, &DiffSettings::default()).await?;
//! println!("{}", script);
//! # Ok(())
//! # }
//! ```

mod analysis;
pub mod dialect;
pub mod differ;
pub mod error;
pub mod loader;
pub mod model;
pub mod resolver;
pub mod script;
pub mod selection;
pub mod settings;
pub mod utils;

pub use error::{DiffError, Result};

use crate::differ::diff_tree;
use crate::loader::{load_inputs, Inputs};
use crate::model::Snapshot;
use crate::resolver::{resolve, AdditionalDependencies, ResolvedActions};
use crate::script::{assemble, AssemblyOptions};
use crate::selection::{flatten, SelectionFilter};
use crate::settings::DiffSettings;

/// Diffs two built snapshots and resolves the selected differences into ordered actions.
pub fn plan<'a>(
    old: &'a Snapshot,
    new: &'a Snapshot,
    filter: &SelectionFilter,
    additional: &AdditionalDependencies,
) -> Result<ResolvedActions<'a>> {
    let tree = diff_tree(old, new)?;
    let elements = flatten(&tree, old, new, filter);
    log::info!("{} differences selected", elements.len());
    resolve(old, new, &elements, additional)
}

/// Full pipeline over two built snapshots; returns the rendered script, empty if nothing
/// changed.
pub fn generate_script(
    old: &Snapshot,
    new: &Snapshot,
    filter: &SelectionFilter,
    additional: &AdditionalDependencies,
    options: &AssemblyOptions,
) -> Result<String> {
    let resolved = plan(old, new, filter, additional)?;
    Ok(assemble(&resolved, options)?.render())
}

/// Loads the inputs and produces the migration script.
pub async fn diff(inputs: &Inputs, settings: &DiffSettings) -> Result<String> {
    let filter = settings.filter()?;
    // User scripts are read before anything is emitted.
    let options = settings.assembly_options()?;
    let (old, new, additional) = load_inputs(inputs).await?;
    generate_script(&old, &new, &filter, &additional, &options)
}

/// Loads the inputs and describes the ordered actions without rendering SQL.
pub async fn describe_plan(inputs: &Inputs, settings: &DiffSettings) -> Result<String> {
    let filter = settings.filter()?;
    let (old, new, additional) = load_inputs(inputs).await?;
    let resolved = plan(&old, &new, &filter, &additional)?;
    Ok(resolved.describe())
}
