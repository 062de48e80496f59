use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::blob::Blob;

const FALLBACK_FILE_NAME: &str = "document.pdf";
const MAX_NAME_ATTEMPTS: usize = 1000;

/// Saves the blob's bytes, untouched, as `dir/<blob name>`. Existing files are
/// never replaced: a taken name becomes `name (1).ext`, `name (2).ext`, ...
pub fn write_blob(dir: &Path, blob: &Blob) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create directory {:?}", dir))?;
    let file_name = export_file_name(blob.name());

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {:?}", dir))?;
    tmp.write_all(blob.bytes())?;
    tmp.flush()?;

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let target = dir.join(numbered_file_name(&file_name, attempt));
        match tmp.persist_noclobber(&target) {
            Ok(_) => return Ok(target),
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                debug!(?target, "export name taken");
                tmp = err.file;
            }
            Err(err) => {
                return Err(err.error)
                    .with_context(|| format!("failed to move export into {:?}", target))
            }
        }
    }
    bail!("no free file name for {} in {:?}", file_name, dir)
}

/// Keeps only the final path component so a crafted name cannot escape `dir`.
fn export_file_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

fn numbered_file_name(name: &str, attempt: usize) -> String {
    if attempt == 0 {
        return name.to_string();
    }
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default();
    match path.extension() {
        Some(ext) => format!("{} ({}).{}", stem, attempt, ext.to_string_lossy()),
        None => format!("{} ({})", stem, attempt),
    }
}
