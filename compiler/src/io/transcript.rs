//! JSON-lines transcript of compiled actions.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::core::types::ActionRecord;

/// Append one record as a single JSON line, creating the file if needed.
pub fn append_record(path: &Path, record: &ActionRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create transcript dir {}", parent.display()))?;
        }
    }
    let mut line = serde_json::to_string(record).context("serialize action record")?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open transcript {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("write transcript {}", path.display()))
}

/// Read every record from a transcript.
#[cfg(any(test, feature = "test-support"))]
pub fn read_records(path: &Path) -> Result<Vec<ActionRecord>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read transcript {}", path.display()))?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("parse {} line {}", path.display(), idx + 1))
        })
        .collect()
}
