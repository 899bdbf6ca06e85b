//! File-backed append log.

use super::AppendLog;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Initial size of the tail read used to find the last line.
const TAIL_CHUNK: u64 = 4096;

/// Newline-delimited text file, opened in append mode.
///
/// Each line is written with a single `write_all` of `line + "\n"`. Readers
/// only trust newline-terminated lines, so a record that is still being
/// written is skipped rather than parsed half way.
pub struct FileLog {
    path: PathBuf,
    writer: Mutex<Option<File>>,
}

impl FileLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_append(&self) -> io::Result<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&self.path)
    }
}

impl AppendLog for FileLog {
    fn reset(&self) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        *writer = None;
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        *writer = Some(self.open_append()?);
        Ok(())
    }

    fn append(&self, line: &str) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if writer.is_none() {
            *writer = Some(self.open_append()?);
        }
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        match writer.as_mut() {
            Some(file) => file.write_all(buf.as_bytes()),
            None => Err(io::Error::other("append handle unavailable")),
        }
    }

    fn last_line(&self) -> io::Result<Option<String>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        read_last_line(&mut file)
    }
}

/// Scan backwards from the end of the file for the last complete line,
/// doubling the tail window until a whole line fits.
fn read_last_line(file: &mut File) -> io::Result<Option<String>> {
    let len = file.metadata()?.len();
    let mut chunk = TAIL_CHUNK;

    loop {
        let start = len.saturating_sub(chunk);
        file.seek(SeekFrom::Start(start))?;
        let mut buf = Vec::with_capacity((len - start) as usize);
        (&mut *file).take(len - start).read_to_end(&mut buf)?;

        // Anything after the final newline is an unterminated write.
        let Some(end) = buf.iter().rposition(|b| *b == b'\n') else {
            if start == 0 {
                return Ok(None);
            }
            chunk *= 2;
            continue;
        };

        let segments: Vec<&[u8]> = buf[..end].split(|b| *b == b'\n').collect();
        for (i, segment) in segments.iter().enumerate().rev() {
            // The first segment may start mid-line unless we read from 0.
            if i == 0 && start > 0 {
                break;
            }
            let text = String::from_utf8_lossy(segment);
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
        if start == 0 {
            return Ok(None);
        }
        chunk *= 2;
    }
}
