use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};

use super::{build_table, recognized_tag_names, MetadataSource, MetadataTable, RawEntry, TagFilter};
use crate::error::MetadataError;

pub const DEFAULT_PROGRAM: &str = "exiftool";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs exiftool once per directory and reads its JSON report.
#[derive(Debug, Clone)]
pub struct ExifToolSource {
    program: String,
    /// Arguments placed before exiftool's own, e.g. the script path when the
    /// program is `perl`.
    leading_args: Vec<String>,
    timeout: Duration,
}

impl ExifToolSource {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            timeout,
        }
    }

    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Build the batch command for `dir`, limited to the given extensions.
    /// exiftool does not recurse without `-r`, so only `dir` itself is read.
    pub fn command(&self, dir: &Path, extensions: &BTreeSet<String>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args);
        cmd.arg("-json").arg("-G").arg("-s").arg("-time:all");
        for tag in recognized_tag_names() {
            cmd.arg(format!("-{tag}"));
        }
        for ext in extensions {
            cmd.arg("-ext").arg(ext);
        }
        cmd.arg(dir);
        cmd
    }

    fn run(&self, dir: &Path, extensions: &BTreeSet<String>) -> Result<Vec<u8>, MetadataError> {
        let mut cmd = self.command(dir, extensions);
        log::debug!("running {:?}", cmd);

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| MetadataError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Drain both pipes off-thread so a chatty child cannot block on a full pipe.
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let out_reader = thread::spawn(move || drain(stdout));
        let err_reader = thread::spawn(move || drain(stderr));

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(MetadataError::Timeout {
                    program: self.program.clone(),
                    dir: dir.to_path_buf(),
                    timeout: self.timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = out_reader.join().unwrap_or_default();
        let stderr = err_reader.join().unwrap_or_default();

        // exiftool exits non-zero when single files fail but still reports the rest.
        if !status.success() {
            log::debug!(
                "{} exited with {} for {}: {}",
                self.program,
                status,
                dir.display(),
                String::from_utf8_lossy(&stderr).trim()
            );
        }

        Ok(stdout)
    }
}

fn drain<R: Read>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    buf
}

/// Turn exiftool's JSON array into raw entries keyed by `dir` + file name.
pub fn parse_output(dir: &Path, stdout: &[u8]) -> Result<Vec<RawEntry>, MetadataError> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Err(MetadataError::EmptyOutput(dir.to_path_buf()));
    }

    let items: Vec<Map<String, Value>> =
        serde_json::from_slice(stdout).map_err(|source| MetadataError::Parse {
            dir: dir.to_path_buf(),
            source,
        })?;

    let entries = items
        .into_iter()
        .filter_map(|mut item| {
            let source = item.remove("SourceFile")?;
            let name = Path::new(source.as_str()?).file_name()?.to_os_string();
            Some(RawEntry {
                path: dir.join(name),
                tags: item.into_iter().collect(),
            })
        })
        .collect();

    Ok(entries)
}

fn extensions_of(files: &[PathBuf]) -> BTreeSet<String> {
    files
        .iter()
        .filter_map(|f| f.extension())
        .map(|e| e.to_string_lossy().to_lowercase())
        .collect()
}

impl MetadataSource for ExifToolSource {
    fn extract(
        &self,
        dir: &Path,
        files: &[PathBuf],
        filter: &TagFilter,
    ) -> Result<MetadataTable, MetadataError> {
        let stdout = self.run(dir, &extensions_of(files))?;
        let entries = parse_output(dir, &stdout)?;
        Ok(build_table(entries, filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const SAMPLE: &str = r#"[
        {
            "SourceFile": "/somewhere/else/IMG_0001.jpg",
            "EXIF:DateTimeOriginal": "2020:05:01 12:00:00",
            "File:FileModifyDate": "2023:01:01 00:00:00+01:00",
            "EXIF:ExifImageWidth": 4000,
            "EXIF:ExifImageHeight": 3000
        },
        {
            "SourceFile": "/somewhere/else/clip.mov",
            "QuickTime:CreateDate": "0000:00:00 00:00:00",
            "QuickTime:Duration": "0:00:12",
            "QuickTime:CompressorID": "hvc1"
        }
    ]"#;

    #[test]
    fn test_command_line() {
        let source = ExifToolSource::new("exiftool", DEFAULT_TIMEOUT);
        let exts: BTreeSet<String> = ["jpg".to_string(), "mov".to_string()].into();
        let cmd = source.command(Path::new("/photos/trip"), &exts);
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(&args[..4], &["-json", "-G", "-s", "-time:all"]);
        assert!(args.contains(&"-ImageWidth".to_string()));
        assert!(args.windows(2).any(|w| w == ["-ext", "jpg"]));
        assert!(args.windows(2).any(|w| w == ["-ext", "mov"]));
        assert!(!args.contains(&"-r".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/photos/trip"));
    }

    #[test]
    fn test_parse_output_rekeys_by_directory() {
        let dir = Path::new("/photos/trip");
        let entries = parse_output(dir, SAMPLE.as_bytes()).unwrap();
        let table = build_table(entries, &TagFilter::default());

        let img = table.get(&dir.join("IMG_0001.jpg")).unwrap();
        assert_eq!(
            img.date,
            NaiveDate::from_ymd_opt(2020, 5, 1).unwrap().and_hms_opt(12, 0, 0)
        );
        assert_eq!((img.width, img.height), (Some(4000), Some(3000)));

        let clip = table.get(&dir.join("clip.mov")).unwrap();
        assert_eq!(clip.date, None);
        assert_eq!(clip.duration.as_deref(), Some("0:00:12"));
        assert_eq!(clip.codec.as_deref(), Some("hvc1"));
    }

    #[test]
    fn test_empty_and_garbage_output() {
        let dir = Path::new("/photos/trip");
        assert!(matches!(parse_output(dir, b"  \n"), Err(MetadataError::EmptyOutput(_))));
        assert!(matches!(parse_output(dir, b"Error: nope"), Err(MetadataError::Parse { .. })));
        assert!(parse_output(dir, b"[]").unwrap().is_empty());
    }

    #[test]
    fn test_missing_program() {
        let source = ExifToolSource::new("/nonexistent/bin/exiftool", DEFAULT_TIMEOUT);
        let err = source
            .extract(Path::new("."), &[PathBuf::from("a.jpg")], &TagFilter::default())
            .unwrap_err();
        assert!(matches!(err, MetadataError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_runs_program_and_tolerates_failure_status() {
        // `sh -c SCRIPT ARG0` prints ARG0; exiftool's own arguments are ignored.
        let source = ExifToolSource::new("sh", DEFAULT_TIMEOUT)
            .with_leading_args(["-c", "printf '%s' \"$0\"; exit 1", SAMPLE]);
        let table = source
            .extract(Path::new("/photos/trip"), &[PathBuf::from("IMG_0001.jpg")], &TagFilter::default())
            .unwrap();
        assert_eq!(table.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_silent_program_is_empty_output() {
        let source = ExifToolSource::new("sh", DEFAULT_TIMEOUT).with_leading_args(["-c", "exit 0"]);
        let err = source
            .extract(Path::new("/photos/trip"), &[PathBuf::from("a.jpg")], &TagFilter::default())
            .unwrap_err();
        assert!(matches!(err, MetadataError::EmptyOutput(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_program() {
        let source = ExifToolSource::new("sh", Duration::from_millis(200))
            .with_leading_args(["-c", "exec sleep 5"]);
        let started = Instant::now();
        let err = source
            .extract(Path::new("/photos/trip"), &[PathBuf::from("a.jpg")], &TagFilter::default())
            .unwrap_err();
        assert!(matches!(err, MetadataError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
