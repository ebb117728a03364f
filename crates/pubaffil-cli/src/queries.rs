//! Batch query input.

use std::path::Path;

use pubaffil_common::{PubaffilError, Result};

/// Read one query per line, skipping blank lines and `#` comments.
pub fn load_queries(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        PubaffilError::config(format!("cannot read queries file {}: {e}", path.display()))
    })?;
    let queries: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect();
    if queries.is_empty() {
        return Err(PubaffilError::config(format!("no queries in {}", path.display())));
    }
    Ok(queries)
}

/// Trim queries given on the command line and reject blank ones.
pub fn clean_queries(queries: &[String]) -> Result<Vec<String>> {
    queries
        .iter()
        .map(|q| {
            let q = q.trim();
            if q.is_empty() {
                Err(PubaffilError::config("empty query"))
            } else {
                Ok(q.to_string())
            }
        })
        .collect()
}
