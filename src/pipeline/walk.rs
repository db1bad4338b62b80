use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

const SKIP_DIRS: &[&str] = &[
    "__pycache__",
    "node_modules",
    "site-packages",
    "venv",
];

/// Enumerates `.py` files under the configured roots, skipping hidden and
/// vendored directories. Sorted so runs visit files in a stable order.
pub fn walk_python_files(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for root in roots {
        for entry in WalkDir::new(root)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_skipped(entry))
        {
            match entry {
                Ok(entry) if entry.file_type().is_file() && is_python(entry.path()) => {
                    files.push(entry.into_path());
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(
                        target: "walk",
                        root = %root.display(),
                        error = %err,
                        "walk_entry_error"
                    );
                }
            }
        }
    }
    files.sort();
    files.dedup();
    files
}

fn is_python(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "py")
}

fn is_skipped(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIP_DIRS.contains(&name.as_ref())
}
