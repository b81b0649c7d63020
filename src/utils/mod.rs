pub mod topsort;

use regex::{Regex, RegexBuilder};

use crate::error::{DiffError, Result};

/// Compiles a shell-style wildcard pattern into an anchored, case-insensitive regex.
///
/// `*` matches any run of characters (including dots), `?` matches a single character and every
/// other character matches itself.
///
/// # Example
///
/// ```
/// let pattern = oxidiff::utils::wildcard_regex("public.tmp_*").unwrap();
/// assert!(pattern.is_match("public.TMP_orders"));
/// assert!(!pattern.is_match("audit.tmp_orders"));
/// ```
pub fn wildcard_regex(pattern: &str) -> Result<Regex> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    for c in pattern.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            c => source.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    source.push('$');
    RegexBuilder::new(&source)
        .case_insensitive(true)
        .build()
        .map_err(|source| DiffError::Pattern {
            pattern: pattern.to_string(),
            source,
        })
}
