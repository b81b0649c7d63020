//! Migration script output
//!
//! [`ScriptBuffer`] collects SQL statements tagged with the phase they belong to. The converter
//! fills the body from resolved actions; assembly adds the dialect preamble, transaction
//! wrapping and user scripts around it.

mod assembly;
mod converter;

pub use assembly::{assemble, read_scripts, AssemblyOptions};
pub use converter::convert;

use serde::Serialize;

use crate::dialect::Dialect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    Begin,
    Body,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptFragment {
    pub phase: Phase,
    pub sql: String,
    /// Emitted verbatim, without a separator; used for user scripts.
    #[serde(skip)]
    pub raw: bool,
}

/// Ordered statements of one migration script.
#[derive(Debug, Clone)]
pub struct ScriptBuffer {
    dialect: Dialect,
    fragments: Vec<ScriptFragment>,
}

impl ScriptBuffer {
    pub fn new(dialect: Dialect) -> Self {
        ScriptBuffer {
            dialect,
            fragments: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Appends one statement. A trailing separator is stripped; it is added back on rendering.
    pub fn push(&mut self, phase: Phase, sql: impl AsRef<str>) {
        let sql = sql.as_ref().trim();
        let sql = sql.strip_suffix(';').unwrap_or(sql).trim_end();
        if sql.is_empty() {
            return;
        }
        self.fragments.push(ScriptFragment {
            phase,
            sql: sql.to_string(),
            raw: false,
        });
    }

    /// Appends user-supplied SQL as is.
    pub fn push_raw(&mut self, phase: Phase, sql: impl AsRef<str>) {
        let sql = sql.as_ref().trim_end();
        if sql.trim().is_empty() {
            return;
        }
        self.fragments.push(ScriptFragment {
            phase,
            sql: sql.to_string(),
            raw: true,
        });
    }

    pub fn fragments(&self) -> &[ScriptFragment] {
        &self.fragments
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn statements(&self, phase: Phase) -> impl Iterator<Item = &str> {
        self.fragments
            .iter()
            .filter(move |fragment| fragment.phase == phase)
            .map(|fragment| fragment.sql.as_str())
    }

    /// Phases are emitted in order, fragments within a phase in insertion order.
    pub fn render(&self) -> String {
        let mut fragments: Vec<&ScriptFragment> = self.fragments.iter().collect();
        fragments.sort_by_key(|fragment| fragment.phase);

        let mut out = String::new();
        let mut previous: Option<Phase> = None;
        for fragment in fragments {
            if previous.is_some_and(|phase| phase != fragment.phase) {
                out.push('\n');
            }
            previous = Some(fragment.phase);
            out.push_str(&fragment.sql);
            if fragment.raw {
                out.push('\n');
            } else if self.dialect.separator_on_own_line() {
                out.push('\n');
                out.push_str(self.dialect.separator());
                out.push('\n');
            } else {
                out.push_str(self.dialect.separator());
                out.push('\n');
            }
        }
        out
    }
}
