use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

const CHUNK_SIZE: usize = 64 * 1024;

/// Compute the SHA-256 digest (hex) of a file, streaming it in fixed-size chunks.
pub fn content_digest(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Lazily computed digest of one file, so a source is hashed at most once
/// no matter how many destination candidates it is compared against.
pub struct DigestCell<'a> {
    path: &'a Path,
    size: u64,
    digest: Option<String>,
}

impl<'a> DigestCell<'a> {
    pub fn new(path: &'a Path) -> io::Result<Self> {
        let size = fs::metadata(path)?.len();
        Ok(Self {
            path,
            size,
            digest: None,
        })
    }

    pub fn digest(&mut self) -> io::Result<&str> {
        if self.digest.is_none() {
            self.digest = Some(content_digest(self.path)?);
        }
        Ok(self.digest.as_deref().unwrap_or_default())
    }

    /// True when `other` holds exactly the same bytes. Sizes are compared
    /// first; files are only hashed when the sizes agree.
    pub fn matches(&mut self, other: &Path) -> io::Result<bool> {
        if fs::metadata(other)?.len() != self.size {
            return Ok(false);
        }
        let theirs = content_digest(other)?;
        Ok(self.digest()? == theirs)
    }
}

/// Compare two files by content.
pub fn same_content(a: &Path, b: &Path) -> io::Result<bool> {
    DigestCell::new(a)?.matches(b)
}
