use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use exif::{In, Reader};
use serde_json::Value;

use super::{build_table, MetadataSource, MetadataTable, RawEntry, TagFilter};
use crate::error::MetadataError;

/// Reads the EXIF block of each file in-process. Used where exiftool is not
/// installed; videos and files without EXIF simply get no record.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedExifSource;

/// Collect the primary-image EXIF fields of one file as `EXIF:<Tag>` pairs.
pub fn read_entry(path: &Path) -> Result<RawEntry, exif::Error> {
    let file = File::open(path)?;
    let exif = Reader::new().read_from_container(&mut BufReader::new(file))?;

    let tags = exif
        .fields()
        .filter(|f| f.ifd_num == In::PRIMARY)
        .filter_map(|f| Some((format!("EXIF:{}", f.tag), field_value(&f.value)?)))
        .collect();

    Ok(RawEntry {
        path: path.to_path_buf(),
        tags,
    })
}

fn field_value(value: &exif::Value) -> Option<Value> {
    match value {
        exif::Value::Ascii(parts) => {
            let text = String::from_utf8_lossy(parts.first()?);
            Some(Value::String(text.trim_end_matches('\0').trim().to_string()))
        }
        other => other.get_uint(0).map(Value::from),
    }
}

impl MetadataSource for EmbeddedExifSource {
    fn extract(
        &self,
        _dir: &Path,
        files: &[PathBuf],
        filter: &TagFilter,
    ) -> Result<MetadataTable, MetadataError> {
        let entries = files.iter().filter_map(|path| match read_entry(path) {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::debug!("no EXIF in {}: {}", path.display(), e);
                None
            }
        });
        Ok(build_table(entries, filter))
    }
}
