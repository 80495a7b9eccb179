//! SQL resource resolution
//!
//! Contracts name their SQL; a [`SqlResolver`] turns the name into text.
//! [`SqlDir`] reads `<dir>/<name>.sql` files, [`SqlMap`] serves SQL held in
//! memory (embedded with `include_str!`, or built in tests).

use crate::error::QueryError;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Given a name, return the SQL text.
pub trait SqlResolver: Send + Sync {
    /// Resolve `name` to SQL text.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::ResourceNotFound`] when no resource matches.
    fn resolve(&self, name: &str) -> Result<String, QueryError>;
}

/// Resource names are file stems: letters, digits, `_`, `-` and `.`, never a path.
fn validate_name(name: &str) -> Result<(), QueryError> {
    let re = Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]*$")
        .map_err(|e| QueryError::Config(format!("Invalid regex: {e}")))?;
    if re.is_match(name) && !name.contains("..") {
        Ok(())
    } else {
        Err(QueryError::ResourceNotFound(format!(
            "{name} (not a valid SQL resource name)"
        )))
    }
}

/// Directory of `<name>.sql` files
#[derive(Debug, Clone)]
pub struct SqlDir {
    dir: PathBuf,
}

impl SqlDir {
    /// Serve SQL files from `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory being served.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// List every resource name in the directory, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::ResourceNotFound`] if the directory cannot be read.
    pub fn discover(&self) -> Result<Vec<String>, QueryError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            QueryError::ResourceNotFound(format!(
                "failed to read SQL directory {}: {e}",
                self.dir.display()
            ))
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| QueryError::ResourceNotFound(format!("failed to read directory entry: {e}")))?
                .path();
            if path.extension().and_then(|s| s.to_str()) != Some("sql") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

impl SqlResolver for SqlDir {
    fn resolve(&self, name: &str) -> Result<String, QueryError> {
        validate_name(name)?;
        let path = self.dir.join(format!("{name}.sql"));
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => QueryError::ResourceNotFound(name.to_string()),
            _ => QueryError::ResourceNotFound(format!("{name} ({}: {e})", path.display())),
        })
    }
}

/// In-memory name to SQL map
#[derive(Debug, Clone, Default)]
pub struct SqlMap {
    sql: HashMap<String, String>,
}

impl SqlMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a resource.
    pub fn with(mut self, name: impl Into<String>, sql: impl Into<String>) -> Self {
        self.sql.insert(name.into(), sql.into());
        self
    }
}

impl SqlResolver for SqlMap {
    fn resolve(&self, name: &str) -> Result<String, QueryError> {
        self.sql
            .get(name)
            .cloned()
            .ok_or_else(|| QueryError::ResourceNotFound(name.to_string()))
    }
}
