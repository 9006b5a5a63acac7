//! Selección de archivos a procesar a partir de un archivo o directorio.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::{DirEntry, WalkDir};

use crate::config::PipelineOptions;
use crate::error::PipelineError;

/// Devuelve las rutas de archivos regulares bajo `target`, ordenadas y sin
/// duplicados. Un archivo como destino se devuelve a sí mismo.
pub fn collect_targets(
    target: &Path,
    options: &PipelineOptions,
) -> Result<Vec<PathBuf>, PipelineError> {
    let metadata = fs::metadata(target).map_err(|source| PipelineError::Target {
        path: target.to_path_buf(),
        source,
    })?;

    if !metadata.is_dir() {
        return Ok(vec![target.to_path_buf()]);
    }

    let max_depth = if options.recursive { usize::MAX } else { 1 };
    let mut files: Vec<PathBuf> = WalkDir::new(target)
        .follow_links(options.follow_symlinks)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !(options.ignore_hidden && is_hidden(entry)))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(error) => {
                warn!(%error, "entrada inaccesible omitida");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(DirEntry::into_path)
        .collect();

    files.sort();
    files.dedup();
    Ok(files)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}
