//! Expansion of user-supplied files and folders into candidate paths.

use crate::domain::constants::SUPPORTED_EXTENSIONS;
use crate::infra::error::{SimulationError, SimulationResult};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Whether `path` has one of the extensions code integrity evaluates.
#[must_use]
pub fn is_supported(path: &Path) -> bool {
    path.extension().is_some_and(|ext| {
        let ext = format!(".{}", ext.to_string_lossy().to_ascii_lowercase());
        SUPPORTED_EXTENSIONS.contains(&ext.as_str())
    })
}

fn absolute(path: &Path) -> SimulationResult<PathBuf> {
    std::path::absolute(path).map_err(|e| {
        SimulationError::InvalidInput(format!("Cannot resolve {}: {e}", path.display()))
    })
}

/// Collect explicit `files` plus every supported file found recursively
/// under `folders`, as absolute paths in first-seen order without duplicates.
pub fn collect_files(files: &[PathBuf], folders: &[PathBuf]) -> SimulationResult<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut collected = Vec::new();

    for file in files {
        if !file.is_file() {
            return Err(SimulationError::InvalidInput(format!(
                "Not a file: {}",
                file.display()
            )));
        }
        let file = absolute(file)?;
        if seen.insert(file.clone()) {
            collected.push(file);
        }
    }

    for folder in folders {
        if !folder.is_dir() {
            return Err(SimulationError::InvalidInput(format!(
                "Not a folder: {}",
                folder.display()
            )));
        }
        let mut found = Vec::new();
        walk(&absolute(folder)?, &mut found);
        found.sort();
        for path in found {
            if seen.insert(path.clone()) {
                collected.push(path);
            }
        }
    }

    log::debug!("Collected {} candidate file(s)", collected.len());
    Ok(collected)
}

fn walk(dir: &Path, found: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Cannot read {}: {e}", dir.display());
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk(&path, found);
        } else if is_supported(&path) {
            found.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_and_dedupes() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("bin");
        fs::create_dir_all(&sub).unwrap();
        let exe = sub.join("App.EXE");
        let readme = dir.path().join("readme.txt");
        let script = dir.path().join("setup.ps1");
        fs::write(&exe, b"MZ").unwrap();
        fs::write(&readme, b"hi").unwrap();
        fs::write(&script, b"").unwrap();

        let files = collect_files(&[readme.clone(), exe.clone()], &[dir.path().to_path_buf()])
            .unwrap();
        assert_eq!(files, vec![readme, exe, script]);
    }

    #[test]
    fn relative_inputs_become_absolute_and_dedupe() {
        let files = collect_files(
            &[PathBuf::from("Cargo.toml"), PathBuf::from("./Cargo.toml")],
            &[],
        )
        .unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].is_absolute());
        assert_eq!(files[0], std::env::current_dir().unwrap().join("Cargo.toml"));
    }

    #[test]
    fn rejects_missing_inputs() {
        let result = collect_files(&[PathBuf::from("/no/such/file.exe")], &[]);
        assert!(matches!(result, Err(SimulationError::InvalidInput(_))));
    }
}
