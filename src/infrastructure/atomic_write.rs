//! Crash-safe file replacement
//!
//! Contents go to a temp file in the target directory, are fsynced, then
//! renamed over the target. Readers see either the old file or the new one.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::Builder;

/// Suffix of in-flight temp files; never a valid record name
pub const TEMP_SUFFIX: &str = ".tmp";

pub fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut temp = Builder::new().prefix(".").suffix(TEMP_SUFFIX).tempfile_in(dir)?;
    temp.write_all(contents)?;
    temp.flush()?;
    temp.as_file_mut().sync_all()?;
    temp.into_temp_path().persist(path).map_err(|e| e.error)
}
