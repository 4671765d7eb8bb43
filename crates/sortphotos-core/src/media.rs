use std::path::{Path, PathBuf};

/// A candidate file found during traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    /// Absolute (or root-joined) source path
    pub path: PathBuf,
    /// Just the filename
    pub file_name: String,
    /// Containing directory relative to the source root, empty at the root
    pub relative_dir: PathBuf,
}

impl MediaFile {
    pub fn new(path: PathBuf, relative_dir: &Path) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            file_name,
            relative_dir: relative_dir.to_path_buf(),
        }
    }

    /// Text searched for a date: the path relative to the source root when
    /// `include_relative_path` is set (so `2016/12/31/a.jpg` can date a
    /// file), the bare filename otherwise.
    pub fn match_text(&self, include_relative_path: bool) -> String {
        if include_relative_path && !self.relative_dir.as_os_str().is_empty() {
            self.relative_dir
                .join(&self.file_name)
                .to_string_lossy()
                .into_owned()
        } else {
            self.file_name.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_text() {
        let file = MediaFile::new(
            PathBuf::from("/photos/2016/12/31/IMG_1.jpg"),
            Path::new("2016/12/31"),
        );
        assert_eq!(file.file_name, "IMG_1.jpg");
        assert_eq!(file.match_text(false), "IMG_1.jpg");
        assert_eq!(file.match_text(true), "2016/12/31/IMG_1.jpg");

        let top = MediaFile::new(PathBuf::from("/photos/IMG_2.jpg"), Path::new(""));
        assert_eq!(top.match_text(true), "IMG_2.jpg");
    }
}
