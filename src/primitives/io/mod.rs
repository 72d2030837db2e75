#![forbid(unsafe_code)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::types::Result;

/// A newline-delimited text file replaced atomically on rewrite.
#[derive(Debug, Clone)]
pub struct LineFile {
    path: PathBuf,
    sync: bool,
}

impl LineFile {
    /// Opens the file at `path`, creating it empty when `create` is set.
    ///
    /// `sync` controls whether every write is flushed to stable storage
    /// before returning.
    pub fn open(path: impl AsRef<Path>, create: bool, sync: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            if !create {
                return Err(io::Error::new(
                    ErrorKind::NotFound,
                    format!("{} does not exist", path.display()),
                )
                .into());
            }
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .or_else(|err| match err.kind() {
                    // Another opener won the race.
                    ErrorKind::AlreadyExists => OpenOptions::new().write(true).open(&path),
                    _ => Err(err),
                })?;
            debug!(path = %path.display(), "io.line_file.created");
        }
        Ok(Self { path, sync })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the whole file.
    pub fn read_all(&self) -> Result<String> {
        Ok(fs::read_to_string(&self.path)?)
    }

    /// Size of the backing file in bytes.
    pub fn len(&self) -> Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    /// Returns true if the file holds no bytes.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Appends one line, terminating a dangling last line first.
    pub fn append_line(&self, line: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)?;
        let mut buf = String::with_capacity(line.len() + 2);
        if !ends_with_newline(&mut file)? {
            buf.push('\n');
        }
        buf.push_str(line);
        buf.push('\n');
        file.write_all(buf.as_bytes())?;
        if self.sync {
            file.sync_data()?;
        }
        Ok(())
    }

    /// Replaces the file with `lines`, each newline-terminated.
    ///
    /// The new image is written to a temporary file in the same directory and
    /// renamed over the original, so readers of the path see either the old
    /// or the new content, never a mix.
    pub fn replace_lines<'a>(&self, lines: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let file = tmp.as_file_mut();
            let mut written = 0usize;
            for line in lines {
                file.write_all(line.as_bytes())?;
                file.write_all(b"\n")?;
                written += 1;
            }
            file.flush()?;
            if self.sync {
                file.sync_all()?;
            }
            debug!(path = %self.path.display(), lines = written, "io.line_file.replace");
        }
        tmp.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }
}

fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
