//! Input discovery: enumerate the PDFs of one batch.
//!
//! Deliberately non-recursive — the operator points the tool at one folder of
//! papers, and artifact subdirectories (`md/`, `imgs/`) often live underneath
//! it. The listing is sorted so sequential runs visit files in a stable
//! order; parallel runs re-sort results before reporting anyway.

use crate::error::BatchError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// List `*.pdf` files directly inside `input_dir`, sorted by file name.
///
/// A missing directory is the one condition that aborts an entire run
/// ([`BatchError::InputDirMissing`]); an existing-but-empty directory is a
/// valid empty batch.
pub fn discover_pdfs(input_dir: &Path) -> Result<Vec<PathBuf>, BatchError> {
    if !input_dir.is_dir() {
        return Err(BatchError::InputDirMissing {
            path: input_dir.to_path_buf(),
        });
    }

    let mut pdfs: Vec<PathBuf> = std::fs::read_dir(input_dir)
        .map_err(|e| BatchError::io(input_dir, e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                    .unwrap_or(false)
        })
        .collect();

    pdfs.sort();
    debug!("Discovered {} PDF file(s) in {}", pdfs.len(), input_dir.display());
    Ok(pdfs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_dir_is_fatal() {
        let err = discover_pdfs(Path::new("/no/such/dir")).unwrap_err();
        assert!(matches!(err, BatchError::InputDirMissing { .. }));
    }

    #[test]
    fn empty_dir_is_empty_batch() {
        let dir = TempDir::new().unwrap();
        assert!(discover_pdfs(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn finds_only_pdfs_sorted() {
        let dir = TempDir::new().unwrap();
        for name in ["b.pdf", "a.PDF", "notes.txt", "c.pdf"] {
            std::fs::write(dir.path().join(name), b"%PDF-1.4").unwrap();
        }
        std::fs::create_dir(dir.path().join("md")).unwrap();

        let found = discover_pdfs(dir.path()).unwrap();
        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.PDF", "b.pdf", "c.pdf"]);
    }

    #[test]
    fn does_not_recurse_into_subdirectories() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("nested");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("deep.pdf"), b"%PDF-1.4").unwrap();

        assert!(discover_pdfs(dir.path()).unwrap().is_empty());
    }
}
