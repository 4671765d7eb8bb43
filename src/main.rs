use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use sortphotos_core::metadata::exif::EmbeddedExifSource;
use sortphotos_core::metadata::exiftool::{self, ExifToolSource};
use sortphotos_core::{MetadataSource, OrganizeOptions, TransferMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Run exiftool once per directory
    Exiftool,
    /// Read EXIF in-process (photos only, no exiftool needed)
    Embedded,
}

#[derive(Parser)]
#[command(name = "sortphotos", version, about = "Sort photos and videos into date folders by their earliest known date")]
struct Cli {
    /// Directory to read media from
    source_dir: PathBuf,

    /// Directory to create YYYY-MM-DD folders in
    destination_dir: PathBuf,

    /// Tag names or Group:Tag keys to ignore when looking for dates
    #[arg(long, value_delimiter = ',')]
    ignore_tags: Vec<String>,

    /// Tag groups (e.g. File, ICC_Profile) to ignore when looking for dates
    #[arg(long, value_delimiter = ',')]
    ignore_groups: Vec<String>,

    /// Extensions to process
    #[arg(long, value_delimiter = ',', default_value = ".jpg,.jpeg,.png,.mp4,.mov")]
    allowed_ext: Vec<String>,

    /// Copy files instead of moving them
    #[arg(long)]
    copy: bool,

    /// Use the path relative to the source dir for date guessing and naming
    #[arg(long)]
    include_relative_path: bool,

    /// When moving, delete sources whose content is already at the destination
    #[arg(long)]
    delete_duplicates: bool,

    /// Write each directory's metadata table as JSON into this directory
    #[arg(long, value_name = "DIR")]
    metadata_cache: Option<PathBuf>,

    /// Metadata backend
    #[arg(long, value_enum, default_value = "exiftool")]
    backend: Backend,

    /// exiftool program to run
    #[arg(long, value_name = "PATH", env = "SORTPHOTOS_EXIFTOOL", default_value = exiftool::DEFAULT_PROGRAM)]
    exiftool: String,

    /// Argument passed before exiftool's own (e.g. the script when --exiftool is perl)
    #[arg(long, value_name = "ARG")]
    exiftool_arg: Vec<String>,

    /// Seconds to wait for exiftool on one directory
    #[arg(long, value_name = "SECS", default_value_t = exiftool::DEFAULT_TIMEOUT.as_secs())]
    exiftool_timeout: u64,

    /// Show a progress bar instead of per-file log lines
    #[arg(long)]
    progress: bool,
}

impl Cli {
    fn options(&self) -> OrganizeOptions {
        let mut options = OrganizeOptions::new(&self.source_dir, &self.destination_dir);
        options.ignored_tags = self.ignore_tags.clone();
        options.ignored_groups = self.ignore_groups.clone();
        options.allowed_extensions = self.allowed_ext.clone();
        options.mode = if self.copy { TransferMode::Copy } else { TransferMode::Move };
        options.include_relative_path = self.include_relative_path;
        options.delete_duplicates = self.delete_duplicates;
        options.metadata_cache = self.metadata_cache.clone();
        options
    }

    fn metadata_source(&self) -> Box<dyn MetadataSource> {
        match self.backend {
            Backend::Exiftool => Box::new(
                ExifToolSource::new(&self.exiftool, Duration::from_secs(self.exiftool_timeout))
                    .with_leading_args(&self.exiftool_arg),
            ),
            Backend::Embedded => Box::new(EmbeddedExifSource),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.progress { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let t_total = std::time::Instant::now();
    let options = cli.options();
    let source = cli.metadata_source();

    let pb = if cli.progress {
        let pb = ProgressBar::new(0);
        pb.set_style(ProgressStyle::default_bar().template("[{bar:40}] {pos}/{len} {wide_msg}")?);
        pb
    } else {
        ProgressBar::hidden()
    };

    let summary = sortphotos_core::organize(&options, source.as_ref(), &|_stage, current, total, message| {
        pb.set_length(total);
        pb.set_position(current + 1);
        pb.set_message(message.to_string());
    })?;
    pb.finish_and_clear();

    eprintln!(
        "Done! {} placed, {} skipped ({} duplicates, {} without date, {} future-dated, {} unsupported), {} errors ({:.2}s)",
        summary.placed,
        summary.skipped(),
        summary.duplicates,
        summary.no_date,
        summary.future_dated,
        summary.unsupported_extension,
        summary.errors,
        t_total.elapsed().as_secs_f64()
    );
    if summary.metadata_failures > 0 {
        log::warn!(
            "Metadata could not be read for {} of {} directories; filenames were used there",
            summary.metadata_failures, summary.directories_scanned
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["sortphotos", "in", "out"]).unwrap();
        let options = cli.options();
        assert_eq!(options.mode, TransferMode::Move);
        assert_eq!(
            options.allowed_extensions,
            vec![".jpg", ".jpeg", ".png", ".mp4", ".mov"]
        );
        assert_eq!(cli.backend, Backend::Exiftool);
        assert_eq!(cli.exiftool_timeout, 300);
    }

    #[test]
    fn test_lists_accept_commas_and_repeats() {
        let cli = Cli::try_parse_from([
            "sortphotos",
            "in",
            "out",
            "--ignore-tags",
            "FileModifyDate,EXIF:ModifyDate",
            "--ignore-tags",
            "FileAccessDate",
            "--ignore-groups",
            "File",
            "--allowed-ext",
            "jpg,heic",
            "--copy",
            "--backend",
            "embedded",
        ])
        .unwrap();
        let options = cli.options();
        assert_eq!(
            options.ignored_tags,
            vec!["FileModifyDate", "EXIF:ModifyDate", "FileAccessDate"]
        );
        assert_eq!(options.ignored_groups, vec!["File"]);
        assert_eq!(options.allowed_extensions, vec!["jpg", "heic"]);
        assert_eq!(options.mode, TransferMode::Copy);
        assert_eq!(cli.backend, Backend::Embedded);
    }
}
