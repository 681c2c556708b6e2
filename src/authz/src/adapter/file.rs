//! File-backed rule store
//!
//! One rule per line, fields separated by commas:
//!
//! ```text
//! # ptype, v0, v1, ...
//! p, alice, data1, read
//! g, alice, data2_admin
//! ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::Adapter;
use crate::error::{AuthzError, Result};
use crate::types::PolicyRule;

/// Incremental add/remove are not persisted; the file is rewritten by
/// [`Adapter::save_policy`].
#[derive(Debug, Clone)]
pub struct FileAdapter {
    path: PathBuf,
}

impl FileAdapter {
    /// An empty path loads zero rules and cannot be saved.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_unset(&self) -> bool {
        self.path.as_os_str().is_empty()
    }
}

/// Parse rule lines, skipping blanks and `#` comments.
pub fn parse_rules(text: &str) -> Vec<PolicyRule> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split(',').map(|f| f.trim().to_string());
            let ptype = fields.next()?;
            let values: Vec<String> = fields.collect();
            (!values.is_empty()).then(|| PolicyRule::new(ptype, values))
        })
        .collect()
}

/// Render rules in the format read by [`parse_rules`].
pub fn format_rules(rules: &[PolicyRule]) -> String {
    let mut out = String::new();
    for rule in rules {
        out.push_str(&rule.ptype);
        for value in &rule.values {
            out.push_str(", ");
            out.push_str(value);
        }
        out.push('\n');
    }
    out
}

#[async_trait]
impl Adapter for FileAdapter {
    async fn load_rules(&self) -> Result<Vec<PolicyRule>> {
        if self.is_unset() {
            return Ok(Vec::new());
        }
        let text = tokio::fs::read_to_string(&self.path).await?;
        let rules = parse_rules(&text);
        debug!(path = %self.path.display(), count = rules.len(), "loaded rules from file");
        Ok(rules)
    }

    async fn save_policy(&self, rules: &[PolicyRule]) -> Result<()> {
        if self.is_unset() {
            return Err(AuthzError::InvalidInput("file adapter has no path to save to".to_string()));
        }
        tokio::fs::write(&self.path, format_rules(rules)).await?;
        debug!(path = %self.path.display(), count = rules.len(), "saved rules to file");
        Ok(())
    }

    async fn add_rule(&self, _rule: &PolicyRule) -> Result<()> {
        Ok(())
    }

    async fn remove_rule(&self, _rule: &PolicyRule) -> Result<()> {
        Ok(())
    }

    async fn remove_filtered(&self, _ptype: &str, _field_index: usize, _values: &[String]) -> Result<()> {
        Ok(())
    }
}
