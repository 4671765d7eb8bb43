use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use chrono::NaiveDateTime;
use filetime::FileTime;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::dedup::DigestCell;
use crate::metadata::FileRecord;

/// Longest file name most filesystems accept.
pub const MAX_FILENAME_LEN: usize = 255;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    #[default]
    Move,
    Copy,
}

/// What happened to a file the engine was asked to place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Placed(PathBuf),
    /// Identical bytes already live at `existing`.
    Duplicate {
        existing: PathBuf,
        source_removed: bool,
    },
}

/// Writes files into `<root>/<YYYY-MM-DD>/` under collision-safe names.
#[derive(Debug, Clone)]
pub struct PlacementEngine {
    root: PathBuf,
    mode: TransferMode,
    include_relative_path: bool,
    delete_duplicates: bool,
}

impl PlacementEngine {
    pub fn new(root: impl Into<PathBuf>, mode: TransferMode) -> Self {
        Self {
            root: root.into(),
            mode,
            include_relative_path: false,
            delete_duplicates: false,
        }
    }

    /// Embed the source directory (relative to the source root) in new names.
    pub fn with_relative_path(mut self, include: bool) -> Self {
        self.include_relative_path = include;
        self
    }

    /// In move mode, delete a source whose exact content is already at its
    /// destination. Off by default: the source is left where it is.
    pub fn with_delete_duplicates(mut self, delete: bool) -> Self {
        self.delete_duplicates = delete;
        self
    }

    pub fn date_dir(&self, date: NaiveDateTime) -> PathBuf {
        self.root.join(date.format("%Y-%m-%d").to_string())
    }

    /// Place `source` under its date folder. `relative_dir` is the source's
    /// directory relative to the source root.
    pub fn place(
        &self,
        source: &Path,
        relative_dir: &Path,
        date: NaiveDateTime,
        record: Option<&FileRecord>,
    ) -> io::Result<Placement> {
        let original = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "source has no file name"))?;

        let relative = if self.include_relative_path {
            Some(flatten_relative_dir(relative_dir))
        } else {
            None
        };
        let name = destination_filename(date, record, relative.as_deref(), &original);

        let dir = self.date_dir(date);
        fs::create_dir_all(&dir)?;

        let mut source_digest = DigestCell::new(source)?;
        let mut counter = 0u32;
        loop {
            let candidate = if counter == 0 {
                dir.join(&name)
            } else {
                dir.join(suffixed(&name, counter))
            };

            match fs::symlink_metadata(&candidate) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    self.transfer(source, &candidate)?;
                    let verb = match self.mode {
                        TransferMode::Move => "Moved",
                        TransferMode::Copy => "Copied",
                    };
                    log::info!("{} {} -> {}", verb, source.display(), candidate.display());
                    return Ok(Placement::Placed(candidate));
                }
                Err(e) => return Err(e),
            }

            // Follows symlinks; a dangling link or a directory just takes the name.
            let holds_file = fs::metadata(&candidate).map(|m| m.is_file()).unwrap_or(false);
            if holds_file {
                if is_same_file(source, &candidate)? {
                    log::info!("Skipping {}: already in place", source.display());
                    return Ok(Placement::Duplicate {
                        existing: candidate,
                        source_removed: false,
                    });
                }

                if source_digest.matches(&candidate)? {
                    let remove = self.delete_duplicates && self.mode == TransferMode::Move;
                    if remove {
                        fs::remove_file(source)?;
                        log::info!(
                            "Removed {}: identical content already at {}",
                            source.display(),
                            candidate.display()
                        );
                    } else {
                        log::info!(
                            "Skipping {}: identical content already at {}",
                            source.display(),
                            candidate.display()
                        );
                    }
                    return Ok(Placement::Duplicate {
                        existing: candidate,
                        source_removed: remove,
                    });
                }
            }

            log::debug!("{} is taken by different content", candidate.display());
            counter += 1;
        }
    }

    fn transfer(&self, source: &Path, dest: &Path) -> io::Result<()> {
        match self.mode {
            TransferMode::Copy => copy_preserving(source, dest),
            TransferMode::Move => match fs::rename(source, dest) {
                Ok(()) => Ok(()),
                Err(rename_error) => {
                    // Typically a move across filesystems.
                    log::debug!(
                        "rename {} failed ({}), copying instead",
                        source.display(),
                        rename_error
                    );
                    copy_preserving(source, dest)?;
                    fs::remove_file(source)
                }
            },
        }
    }
}

fn is_same_file(a: &Path, b: &Path) -> io::Result<bool> {
    Ok(fs::canonicalize(a)? == fs::canonicalize(b)?)
}

/// Copy through a temporary name in the destination directory, carrying over
/// permissions (via `fs::copy`) and access/modification times.
fn copy_preserving(source: &Path, dest: &Path) -> io::Result<()> {
    let temp = dest.with_file_name(format!(".sortphotos-{}.partial", std::process::id()));
    let result = fs::copy(source, &temp)
        .and_then(|_| preserve_times(source, &temp))
        .and_then(|_| fs::rename(&temp, dest));
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

fn preserve_times(source: &Path, dest: &Path) -> io::Result<()> {
    let meta = fs::metadata(source)?;
    filetime::set_file_times(
        dest,
        FileTime::from_last_access_time(&meta),
        FileTime::from_last_modification_time(&meta),
    )
}

/// `a/b/c` -> `a_b_c`
fn flatten_relative_dir(dir: &Path) -> String {
    dir.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("_")
}

/// Build the sanitized destination name: date, optional `WxH`, duration,
/// codec and relative directory, then the original name, joined by `_`.
pub fn destination_filename(
    date: NaiveDateTime,
    record: Option<&FileRecord>,
    relative_dir: Option<&str>,
    original: &str,
) -> String {
    let mut parts = vec![date.format("%Y-%m-%d").to_string()];

    if let Some(r) = record {
        if let (Some(w), Some(h)) = (r.width, r.height) {
            parts.push(format!("{w}x{h}"));
        }
        if let Some(duration) = &r.duration {
            parts.push(duration.replace(':', "-"));
        }
        if let Some(codec) = &r.codec {
            parts.push(codec.replace('/', "-").replace(' ', "_"));
        }
    }
    if let Some(rel) = relative_dir.filter(|r| !r.is_empty()) {
        parts.push(rel.to_string());
    }
    parts.push(original.to_string());

    sanitize_filename(&parts.join("_"))
}

/// Keep `[A-Za-z0-9_.-]`, turn everything else into `_`, collapse `_` runs,
/// cap the length and trim `_` from both ends.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    // NFC first, so decomposed (macOS) and composed names come out the same.
    for c in name.nfc() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    truncate_keeping_extension(&out, MAX_FILENAME_LEN)
        .trim_matches('_')
        .to_string()
}

// Names are ASCII by the time they get here, so byte slicing is safe.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    }
}

fn truncate_keeping_extension(name: &str, max: usize) -> String {
    if name.len() <= max {
        return name.to_string();
    }
    let (stem, ext) = split_extension(name);
    if ext.len() >= max {
        return name[..max].to_string();
    }
    format!("{}{}", &stem[..max - ext.len()], ext)
}

/// `name_<n>.ext`, shortened if needed to stay within [`MAX_FILENAME_LEN`].
fn suffixed(name: &str, n: u32) -> String {
    let (stem, ext) = split_extension(name);
    let suffix = format!("_{n}");
    let room = MAX_FILENAME_LEN.saturating_sub(suffix.len() + ext.len());
    let stem = &stem[..stem.len().min(room)];
    format!("{stem}{suffix}{ext}")
}
