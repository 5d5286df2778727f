//! Reference pointer-table lookup.
//!
//! A pointer table is tab-delimited text mapping a build key to an auxiliary
//! reference file:
//!
//! ```text
//! # comment
//! index<TAB>hg19<TAB>/data/hg19/sam_index/hg19.fa
//! ```
//!
//! Only records tagged `index` qualify; the first matching record wins.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SandboxError, SandboxResult};

/// Record-type tag of qualifying lines.
pub const INDEX_TAG: &str = "index";

/// File name of the sequence pointer table inside an index directory.
pub const SEQ_POINTER_TABLE: &str = "sam_fa_indices.loc";

const COMMENT_MARKER: char = '#';

/// Location of the sequence pointer table for an index directory.
pub fn pointer_table_path(index_dir: &Path) -> PathBuf {
    index_dir.join(SEQ_POINTER_TABLE)
}

/// Look up `build_key` in the table at `table`.
///
/// A table that does not exist resolves to `None`; other read failures are
/// configuration errors.
pub fn resolve(table: &Path, build_key: &str) -> SandboxResult<Option<PathBuf>> {
    let file = match File::open(table) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(SandboxError::configuration(format!(
                "cannot read pointer table {}: {e}",
                table.display()
            )))
        }
    };
    resolve_in(BufReader::new(file), build_key).map_err(|e| {
        SandboxError::configuration(format!(
            "cannot read pointer table {}: {e}",
            table.display()
        ))
    })
}

/// Scan a pointer table from any reader. Malformed lines are skipped.
pub fn resolve_in<R: BufRead>(reader: R, build_key: &str) -> std::io::Result<Option<PathBuf>> {
    for line in reader.lines() {
        let line = line?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() || line.starts_with(COMMENT_MARKER) {
            continue;
        }

        let mut fields = line.split('\t');
        let (Some(tag), Some(key), Some(path)) = (fields.next(), fields.next(), fields.next())
        else {
            debug!(event = "pointer_table.malformed_line", line = %line);
            continue;
        };
        if tag != INDEX_TAG || key != build_key {
            continue;
        }
        let path = path.trim();
        if path.is_empty() {
            continue;
        }
        return Ok(Some(PathBuf::from(path)));
    }
    Ok(None)
}

/// Request for an auxiliary reference file keyed by genome build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRequest {
    /// Directory holding the pointer table.
    pub index_dir: PathBuf,
    pub build_key: String,
    /// Caller-supplied reference that replaces the looked-up one.
    pub override_file: Option<PathBuf>,
}

impl ReferenceRequest {
    pub fn new(index_dir: impl Into<PathBuf>, build_key: impl Into<String>) -> Self {
        Self {
            index_dir: index_dir.into(),
            build_key: build_key.into(),
            override_file: None,
        }
    }

    pub fn with_override(mut self, file: impl Into<PathBuf>) -> Self {
        self.override_file = Some(file.into());
        self
    }

    pub fn table_path(&self) -> PathBuf {
        pointer_table_path(&self.index_dir)
    }

    /// Resolve through the pointer table, which must exist.
    ///
    /// Returns `Ok(None)` only when an override is present and the key has no
    /// entry; without an override a missing key is a configuration error.
    pub fn lookup(&self) -> SandboxResult<Option<PathBuf>> {
        let table = self.table_path();
        if !table.exists() {
            return Err(SandboxError::configuration(format!(
                "The required file ({}) does not exist.",
                table.display()
            )));
        }
        let found = resolve(&table, &self.build_key)?;
        if found.is_none() && self.override_file.is_none() {
            return Err(SandboxError::configuration(format!(
                "no sequence index registered for build {:?} in {}",
                self.build_key,
                table.display()
            )));
        }
        Ok(found)
    }
}
