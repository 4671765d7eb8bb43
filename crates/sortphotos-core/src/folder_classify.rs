use std::collections::BTreeSet;
use std::path::Path;

/// Tooling and environment directories that never hold a photo library.
const EXCLUDED_DIR_NAMES: &[&str] = &[
    "venv",
    "env",
    "virtualenv",
    "__pycache__",
    "node_modules",
    "site-packages",
];

/// Check if a directory should be left out of the traversal: hidden
/// (dot-prefixed) directories and the tooling directories above.
pub fn is_excluded_dir(name: &str) -> bool {
    name.starts_with('.') || EXCLUDED_DIR_NAMES.contains(&name)
}

/// Case-insensitive allow-list of file extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionFilter {
    /// Lowercase, without the leading dot.
    extensions: BTreeSet<String>,
}

impl ExtensionFilter {
    /// Accepts `".JPG"`, `"jpg"`, `" .mov "`; blank entries are dropped.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|e| normalize_extension(e.as_ref()))
            .filter(|e| !e.is_empty())
            .collect();
        Self { extensions }
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn allows(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| self.extensions.contains(&e.to_string_lossy().to_lowercase()))
            .unwrap_or(false)
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim();
    ext.strip_prefix('.').unwrap_or(ext).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excluded_dirs() {
        assert!(is_excluded_dir(".git"));
        assert!(is_excluded_dir(".thumbnails"));
        assert!(is_excluded_dir("node_modules"));
        assert!(is_excluded_dir("__pycache__"));
        assert!(is_excluded_dir("site-packages"));
        assert!(!is_excluded_dir("2019 Rome"));
        assert!(!is_excluded_dir("environment"));
        assert!(!is_excluded_dir("Venv"));
    }

    #[test]
    fn test_extension_filter() {
        let filter = ExtensionFilter::new([".JPG", "jpeg", " .mov ", ""]);
        assert!(filter.allows(Path::new("/a/IMG_0001.jpg")));
        assert!(filter.allows(Path::new("/a/IMG_0001.JPG")));
        assert!(filter.allows(Path::new("clip.Mov")));
        assert!(!filter.allows(Path::new("notes.txt")));
        assert!(!filter.allows(Path::new("jpg")));
        assert_eq!(filter.extensions().collect::<Vec<_>>(), vec!["jpeg", "jpg", "mov"]);
    }

    #[test]
    fn test_blank_entries_leave_filter_empty() {
        assert!(ExtensionFilter::new(["", "  ", " . "]).is_empty());
        assert!(ExtensionFilter::new(Vec::<String>::new()).is_empty());
    }
}
