pub mod date;
pub mod dedup;
pub mod error;
pub mod folder_classify;
pub mod media;
pub mod metadata;
pub mod scan;
pub mod writer;

use std::cell::Cell;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::date::Resolution;
use crate::folder_classify::ExtensionFilter;
use crate::media::MediaFile;
use crate::metadata::cache::MetadataCache;
use crate::metadata::{FileRecord, MetadataTable};
use crate::scan::ScanDir;
use crate::writer::{Placement, PlacementEngine};

pub use error::{ConfigError, MetadataError};
pub use metadata::{MetadataSource, TagFilter};
pub use writer::TransferMode;

fn default_allowed_extensions() -> Vec<String> {
    [".jpg", ".jpeg", ".png", ".mp4", ".mov"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizeOptions {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Tag names (`DateTimeOriginal`) or full keys (`EXIF:DateTimeOriginal`)
    /// left out of date scanning.
    #[serde(default)]
    pub ignored_tags: Vec<String>,
    #[serde(default)]
    pub ignored_groups: Vec<String>,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default)]
    pub mode: TransferMode,
    #[serde(default)]
    pub include_relative_path: bool,
    #[serde(default)]
    pub delete_duplicates: bool,
    /// Where per-directory metadata artifacts are written, if anywhere.
    #[serde(default)]
    pub metadata_cache: Option<PathBuf>,
}

impl OrganizeOptions {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            ignored_tags: Vec::new(),
            ignored_groups: Vec::new(),
            allowed_extensions: default_allowed_extensions(),
            mode: TransferMode::default(),
            include_relative_path: false,
            delete_duplicates: false,
            metadata_cache: None,
        }
    }

    /// Reject configurations that cannot run, before any file is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.source.exists() {
            return Err(ConfigError::SourceMissing(self.source.clone()));
        }
        if !self.source.is_dir() {
            return Err(ConfigError::SourceNotDirectory(self.source.clone()));
        }
        if ExtensionFilter::new(&self.allowed_extensions).is_empty() {
            return Err(ConfigError::NoExtensions);
        }
        if let (Ok(src), Ok(dst)) = (fs::canonicalize(&self.source), fs::canonicalize(&self.destination)) {
            if src == dst {
                return Err(ConfigError::DestinationIsSource(self.destination.clone()));
            }
        }
        Ok(())
    }
}

/// Outcome for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementResult {
    Placed(PathBuf),
    SkippedDuplicate,
    SkippedNoDate,
    SkippedExtension,
    RejectedFuture(NaiveDateTime),
    Error(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizeSummary {
    pub placed: u64,
    pub duplicates: u64,
    pub no_date: u64,
    pub future_dated: u64,
    pub unsupported_extension: u64,
    pub errors: u64,
    pub directories_scanned: u64,
    pub metadata_failures: u64,
}

impl OrganizeSummary {
    pub fn record(&mut self, result: &PlacementResult) {
        match result {
            PlacementResult::Placed(_) => self.placed += 1,
            PlacementResult::SkippedDuplicate => self.duplicates += 1,
            PlacementResult::SkippedNoDate => self.no_date += 1,
            PlacementResult::SkippedExtension => self.unsupported_extension += 1,
            PlacementResult::RejectedFuture(_) => self.future_dated += 1,
            PlacementResult::Error(_) => self.errors += 1,
        }
    }

    pub fn skipped(&self) -> u64 {
        self.duplicates + self.no_date + self.future_dated + self.unsupported_extension
    }
}

/// Type alias for progress callback: (stage, current, total, message).
/// The callback may borrow local state for `'a`.
pub type ProgressCallback<'a> = dyn Fn(&str, u64, u64, &str) + 'a;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// Throttled progress reporter, emits at most every 200ms or on completion.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback<'a>,
    last_emit: Cell<Option<Instant>>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback<'a>) -> Self {
        Self {
            inner,
            last_emit: Cell::new(None),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = current + 1 >= total;
        if !is_done {
            if let Some(last) = self.last_emit.get() {
                if last.elapsed() < PROGRESS_INTERVAL {
                    return;
                }
            }
            self.last_emit.set(Some(Instant::now()));
        }
        (self.inner)(stage, current, total, message);
    }
}

/// Everything a directory pass needs, built once per run.
struct Run<'a> {
    extensions: ExtensionFilter,
    cache: MetadataCache<'a>,
    engine: PlacementEngine,
    include_relative_path: bool,
    now: NaiveDateTime,
}

/// Organize `options.source` into `options.destination`, reading metadata
/// through `source`.
pub fn organize(
    options: &OrganizeOptions,
    source: &dyn MetadataSource,
    progress_callback: &ProgressCallback<'_>,
) -> anyhow::Result<OrganizeSummary> {
    organize_at(options, source, progress_callback, Local::now().naive_local())
}

/// [`organize`] against a fixed clock.
pub fn organize_at(
    options: &OrganizeOptions,
    source: &dyn MetadataSource,
    progress_callback: &ProgressCallback<'_>,
    now: NaiveDateTime,
) -> anyhow::Result<OrganizeSummary> {
    options.validate()?;

    let source_root = fs::canonicalize(&options.source)
        .with_context(|| format!("cannot resolve {}", options.source.display()))?;
    fs::create_dir_all(&options.destination)
        .with_context(|| format!("cannot create {}", options.destination.display()))?;
    let destination_root = fs::canonicalize(&options.destination)
        .with_context(|| format!("cannot resolve {}", options.destination.display()))?;

    let run = Run {
        extensions: ExtensionFilter::new(&options.allowed_extensions),
        cache: MetadataCache::new(
            source,
            TagFilter::new(&options.ignored_tags, &options.ignored_groups),
            options.metadata_cache.clone(),
        ),
        engine: PlacementEngine::new(&destination_root, options.mode)
            .with_relative_path(options.include_relative_path)
            .with_delete_duplicates(options.delete_duplicates),
        include_relative_path: options.include_relative_path,
        now,
    };

    // An earlier run's output inside the source tree is not re-sorted.
    let exclude = destination_root
        .starts_with(&source_root)
        .then_some(destination_root.as_path());
    let dirs = scan::collect_directories(&source_root, exclude);

    let tp = ThrottledProgress::new(progress_callback);
    let total = dirs.len() as u64;
    let mut summary = OrganizeSummary::default();

    for (i, dir) in dirs.iter().enumerate() {
        tp.report("organize", i as u64, total, &dir.path.display().to_string());
        summary.directories_scanned += 1;
        process_directory(&run, dir, &mut summary);
    }

    log::info!(
        "Done: {} placed, {} skipped ({} duplicates, {} without date, {} future-dated, {} unsupported), {} errors",
        summary.placed,
        summary.skipped(),
        summary.duplicates,
        summary.no_date,
        summary.future_dated,
        summary.unsupported_extension,
        summary.errors
    );
    Ok(summary)
}

fn process_directory(run: &Run, dir: &ScanDir, summary: &mut OrganizeSummary) {
    let files = match scan::list_files(&dir.path) {
        Ok(files) => files,
        Err(e) => {
            log::error!("Cannot list {}: {}", dir.path.display(), e);
            summary.errors += 1;
            return;
        }
    };

    let mut eligible = Vec::with_capacity(files.len());
    for path in files {
        if run.extensions.allows(&path) {
            eligible.push(path);
        } else {
            log::debug!("Skipping {}: extension not allowed", path.display());
            summary.record(&PlacementResult::SkippedExtension);
        }
    }
    if eligible.is_empty() {
        return;
    }

    let table = match run.cache.load_directory(&dir.path, &eligible) {
        Ok(table) => table,
        Err(e) => {
            log::warn!(
                "Metadata unavailable for {}, using filenames only: {}",
                dir.path.display(),
                e
            );
            summary.metadata_failures += 1;
            MetadataTable::default()
        }
    };

    for path in eligible {
        let file = MediaFile::new(path, &dir.relative);
        let result = place_file(run, &file, table.get(&file.path));
        summary.record(&result);
    }
}

fn place_file(run: &Run, file: &MediaFile, record: Option<&FileRecord>) -> PlacementResult {
    let metadata_date = record.and_then(|r| r.date);
    let filename_date =
        date::guess::guess_date_at(&file.match_text(run.include_relative_path), run.now);

    match date::resolve(metadata_date, filename_date, run.now) {
        Resolution::Undated => {
            log::warn!("Skipping {}: no date found", file.path.display());
            PlacementResult::SkippedNoDate
        }
        Resolution::Future(date) => {
            log::warn!(
                "Rejecting {}: date {} is in the future",
                file.path.display(),
                date
            );
            PlacementResult::RejectedFuture(date)
        }
        Resolution::Dated { date, source } => {
            log::debug!("{}: {} ({:?})", file.path.display(), date, source);
            match run.engine.place(&file.path, &file.relative_dir, date, record) {
                Ok(Placement::Placed(path)) => PlacementResult::Placed(path),
                Ok(Placement::Duplicate { .. }) => PlacementResult::SkippedDuplicate,
                Err(e) => {
                    log::error!("Failed to place {}: {}", file.path.display(), e);
                    PlacementResult::Error(e.to_string())
                }
            }
        }
    }
}
