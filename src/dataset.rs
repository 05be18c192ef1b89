use std::path::{Path, PathBuf};

/// File types the analyst backend knows how to load
pub const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "xlsx", "xls", "json", "pdf"];

/// A dataset the user picked but that is not necessarily uploaded yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetFile {
    pub path: PathBuf,
    pub name: String,
}

impl DatasetFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self { path, name }
    }

    /// Unsupported files are still uploadable; the backend has the final word.
    pub fn is_supported(&self) -> bool {
        is_supported_path(&self.path)
    }
}

fn is_supported_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
