pub mod cache;
pub mod exif;
pub mod exiftool;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MetadataError;

/// Normalized metadata of one file, built once per directory scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub file_name: String,
    /// Earliest date found among the scanned tags
    pub date: Option<NaiveDateTime>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration: Option<String>,
    pub codec: Option<String>,
}

/// Records of one directory, keyed by absolute file path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataTable {
    records: BTreeMap<PathBuf, FileRecord>,
}

impl MetadataTable {
    pub fn insert(&mut self, record: FileRecord) {
        self.records.insert(record.path.clone(), record);
    }

    pub fn get(&self, path: &Path) -> Option<&FileRecord> {
        self.records.get(path)
    }

    pub fn date_for(&self, path: &Path) -> Option<NaiveDateTime> {
        self.get(path).and_then(|r| r.date)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Something that can describe every file of a directory in one batch call.
pub trait MetadataSource {
    /// Extract records for `files`, all of which live directly in `dir`.
    fn extract(
        &self,
        dir: &Path,
        files: &[PathBuf],
        filter: &TagFilter,
    ) -> Result<MetadataTable, MetadataError>;
}

/// Tags and groups excluded from date scanning.
#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    ignored_tags: HashSet<String>,
    ignored_groups: HashSet<String>,
}

impl TagFilter {
    pub fn new<T, G>(tags: T, groups: G) -> Self
    where
        T: IntoIterator,
        T::Item: AsRef<str>,
        G: IntoIterator,
        G::Item: AsRef<str>,
    {
        Self {
            ignored_tags: tags.into_iter().map(|t| t.as_ref().trim().to_string()).collect(),
            ignored_groups: groups.into_iter().map(|g| g.as_ref().trim().to_string()).collect(),
        }
    }

    /// A tag is skipped when its full key or bare name is ignored, or its group is.
    pub fn skips(&self, key: &str) -> bool {
        let (group, name) = split_tag_key(key);
        self.ignored_tags.contains(key.trim())
            || self.ignored_tags.contains(name)
            || (!group.is_empty() && self.ignored_groups.contains(group))
    }
}

/// Split `"Group:TagName"` or `"Group TagName"` into its group and name.
pub fn split_tag_key(key: &str) -> (&str, &str) {
    let key = key.trim();
    match key.find([':', ' ']) {
        Some(i) => (key[..i].trim(), key[i + 1..].trim()),
        None => ("", key),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Width,
    Height,
    Duration,
    Codec,
}

/// Tags whose values fill the typed fields of a record. Earlier entries win
/// over later ones for the same field.
const RECOGNIZED_TAGS: &[(&str, Field)] = &[
    ("ImageWidth", Field::Width),
    ("ExifImageWidth", Field::Width),
    ("PixelXDimension", Field::Width),
    ("SourceImageWidth", Field::Width),
    ("ImageHeight", Field::Height),
    ("ExifImageHeight", Field::Height),
    ("PixelYDimension", Field::Height),
    ("SourceImageHeight", Field::Height),
    ("Duration", Field::Duration),
    ("MediaDuration", Field::Duration),
    ("TrackDuration", Field::Duration),
    ("CompressorID", Field::Codec),
    ("VideoCodec", Field::Codec),
    ("CodecID", Field::Codec),
    ("CompressorName", Field::Codec),
];

/// Names of the tags that carry dimensions, duration or codec.
pub fn recognized_tag_names() -> impl Iterator<Item = &'static str> {
    RECOGNIZED_TAGS.iter().map(|(name, _)| *name)
}

fn classify(name: &str) -> Option<(Field, usize)> {
    RECOGNIZED_TAGS
        .iter()
        .position(|(tag, _)| *tag == name)
        .map(|rank| (RECOGNIZED_TAGS[rank].1, rank))
}

/// Tag/value pairs reported for one file, before normalization.
#[derive(Debug, Clone)]
pub struct RawEntry {
    pub path: PathBuf,
    pub tags: Vec<(String, Value)>,
}

#[derive(Default)]
struct FieldPicks {
    picks: Vec<(Field, usize, String)>,
}

impl FieldPicks {
    fn offer(&mut self, field: Field, rank: usize, text: String) {
        match self.picks.iter_mut().find(|(f, _, _)| *f == field) {
            Some(slot) if rank < slot.1 => *slot = (field, rank, text),
            Some(_) => {}
            None => self.picks.push((field, rank, text)),
        }
    }

    fn take(&self, field: Field) -> Option<String> {
        self.picks
            .iter()
            .find(|(f, _, _)| *f == field)
            .map(|(_, _, text)| text.clone())
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reduce the raw tags of one file to a record: the earliest parseable date
/// among the non-ignored string tags, plus the recognized fields.
pub fn normalize(entry: &RawEntry, filter: &TagFilter) -> FileRecord {
    let mut earliest: Option<NaiveDateTime> = None;
    let mut picks = FieldPicks::default();

    for (key, value) in &entry.tags {
        let (_, name) = split_tag_key(key);
        if let Some((field, rank)) = classify(name) {
            if let Some(text) = value_text(value) {
                picks.offer(field, rank, text);
            }
            continue;
        }

        let Value::String(text) = value else {
            continue;
        };
        if filter.skips(key) {
            continue;
        }
        if let Some(dt) = parse_metadata_date(text) {
            earliest = Some(earliest.map_or(dt, |e| e.min(dt)));
        }
    }

    let file_name = entry
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    FileRecord {
        path: entry.path.clone(),
        file_name,
        date: earliest,
        width: picks.take(Field::Width).and_then(|w| w.parse().ok()),
        height: picks.take(Field::Height).and_then(|h| h.parse().ok()),
        duration: picks.take(Field::Duration),
        codec: picks.take(Field::Codec),
    }
}

/// Normalize every entry into a table.
pub fn build_table<I>(entries: I, filter: &TagFilter) -> MetadataTable
where
    I: IntoIterator<Item = RawEntry>,
{
    let mut table = MetadataTable::default();
    for entry in entries {
        table.insert(normalize(&entry, filter));
    }
    table
}

// Offsets are dropped by keeping the wall-clock time as written.
const ZONED_FORMATS: &[&str] = &[
    "%Y:%m:%d %H:%M:%S%.f%:z",
    "%Y:%m:%d %H:%M:%S%:z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%:z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y:%m:%d %H:%M:%S%.fZ",
    "%Y:%m:%d %H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y:%m:%d %H:%M:%S%.f",
    "%Y:%m:%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y:%m:%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y:%m:%d", "%Y-%m-%d", "%Y/%m/%d"];

/// Parse a metadata value against the known date layouts, first match wins.
pub fn parse_metadata_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    // Every layout starts with a four digit year; anything else (durations,
    // version numbers) is not a date even if chrono could read it as one.
    if value.len() < 10 || !value.bytes().take(4).all(|b| b.is_ascii_digit()) {
        return None;
    }

    for format in ZONED_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.naive_local());
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(value, format) {
            return d.and_hms_opt(0, 0, 0);
        }
    }

    None
}
