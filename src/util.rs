//! # Utility Module
//!
//! Host probes and filesystem helpers shared by the library and the binary.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// Free physical memory in bytes, where the platform exposes it.
pub fn available_memory() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: sysconf only reads system configuration values.
        let (pages, page_size) = unsafe {
            (
                libc::sysconf(libc::_SC_AVPHYS_PAGES),
                libc::sysconf(libc::_SC_PAGESIZE),
            )
        };
        if pages <= 0 || page_size <= 0 {
            return None;
        }
        (pages as u64).checked_mul(page_size as u64)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Path of the JSON export for `source` inside `dir`, named
/// `<source file name>_mediainfo.json`. `dir` is created if missing.
pub fn export_path_in(dir: &Path, source: &Path) -> Result<PathBuf> {
    match std::fs::metadata(dir) {
        Ok(meta) if !meta.is_dir() => bail!("export path is not a directory: {}", dir.display()),
        Ok(_) => {}
        Err(_) => std::fs::create_dir_all(dir)
            .with_context(|| format!("creating export directory {}", dir.display()))?,
    }
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "media".to_string());
    Ok(dir.join(format!("{name}_mediainfo.json")))
}
