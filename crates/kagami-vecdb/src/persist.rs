//! Crash-safe file replacement.
//!
//! Data is written to a temporary file in the destination directory,
//! flushed and fsynced, then renamed over the destination. Readers see
//! either the previous file or the new one, never a partial write.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use kagami_core::Result;
use tempfile::NamedTempFile;

/// Atomically replace `path` with whatever `write` produces.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
