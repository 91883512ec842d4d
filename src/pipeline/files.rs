//! Input image discovery.

use crate::error::Result;
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Collect image files from paths (files and directories).
///
/// Extensions are matched case-insensitively and given without the dot.
/// Non-existent paths are skipped with a warning. The result is sorted and
/// free of duplicates.
pub fn collect_image_files<S: AsRef<str>>(
    paths: &[PathBuf],
    extensions: &[S],
    recursive: bool,
) -> Result<Vec<PathBuf>> {
    let mut files = BTreeSet::new();

    for path in paths {
        if path.is_file() {
            if is_image_file(path, extensions) {
                files.insert(path.clone());
            }
        } else if path.is_dir() {
            collect_from_dir(path, extensions, recursive, &mut files)?;
        } else {
            warn!("Skipping non-existent path: {}", path.display());
        }
    }

    Ok(files.into_iter().collect())
}

fn collect_from_dir<S: AsRef<str>>(
    dir: &Path,
    extensions: &[S],
    recursive: bool,
    files: &mut BTreeSet<PathBuf>,
) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();

        if path.is_dir() {
            if recursive {
                collect_from_dir(&path, extensions, recursive, files)?;
            }
        } else if is_image_file(&path, extensions) {
            files.insert(path);
        }
    }

    Ok(())
}

fn is_image_file<S: AsRef<str>>(path: &Path, extensions: &[S]) -> bool {
    path.extension().is_some_and(|ext| {
        extensions
            .iter()
            .any(|e| ext.eq_ignore_ascii_case(OsStr::new(e.as_ref().trim_start_matches('.'))))
    })
}
