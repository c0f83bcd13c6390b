//! Filesystem implementation of `ProjectScanner`.
//!
//! Walks the project tree on the blocking pool. Hidden entries and common
//! build/dependency directories are skipped, as are subdirectories that
//! cannot be read. Only an unreadable root fails the scan.

use std::path::Path;

use conductor_core::workflow::collaborators::{
    CollaboratorError, ProjectScan, ProjectScanner, ScanRequest, ScannedFile,
};

/// Directory names never descended into.
const SKIPPED_DIRS: &[&str] = &["target", "node_modules", "__pycache__", "venv", "dist", "build"];

#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemScanner;

impl FilesystemScanner {
    pub fn new() -> Self {
        Self
    }
}

impl ProjectScanner for FilesystemScanner {
    async fn scan(&self, request: &ScanRequest) -> Result<ProjectScan, CollaboratorError> {
        let request = request.clone();
        tokio::task::spawn_blocking(move || scan_blocking(&request))
            .await
            .map_err(|e| CollaboratorError(format!("scan task failed: {e}")))?
    }
}

fn scan_blocking(request: &ScanRequest) -> Result<ProjectScan, CollaboratorError> {
    let root = &request.root;
    if !root.is_dir() {
        return Err(CollaboratorError(format!(
            "project path '{}' is not a directory",
            root.display()
        )));
    }

    let mut files = Vec::new();
    walk(root, root, request, &mut files)
        .map_err(|e| CollaboratorError(format!("failed to scan '{}': {e}", root.display())))?;

    files.sort_by(|a: &ScannedFile, b: &ScannedFile| a.path.cmp(&b.path));
    if let Some(max) = request.max_files {
        files.truncate(max);
    }

    tracing::debug!(root = %root.display(), files = files.len(), "project scanned");
    Ok(ProjectScan { files })
}

fn walk(
    root: &Path,
    dir: &Path,
    request: &ScanRequest,
    files: &mut Vec<ScannedFile>,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }

        let file_type = entry.file_type()?;
        let path = entry.path();
        if file_type.is_dir() {
            if SKIPPED_DIRS.contains(&name.as_ref()) {
                continue;
            }
            if let Err(e) = walk(root, &path, request, files) {
                tracing::debug!(path = %path.display(), error = %e, "skipping unreadable directory");
            }
        } else if file_type.is_file() && matches_extension(&path, &request.extensions) {
            let relative = path.strip_prefix(root).unwrap_or(&path);
            let relative: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            files.push(ScannedFile {
                path: relative.join("/"),
                size_bytes: entry.metadata()?.len(),
            });
        }
    }
    Ok(())
}

fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| extensions.iter().any(|e| *e == ext))
}
