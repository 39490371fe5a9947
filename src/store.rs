use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Append-only, newline-delimited log backing the live tail.
///
/// Single writer path (`append`), many independent readers each holding
/// their own [`TailCursor`] onto the same file.
#[derive(Clone)]
pub struct LogStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl LogStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends the lines in order, one record each. The whole batch is
    /// written as a single `write_all` and synced before returning, so a
    /// success means the lines are durable and a concurrent reader never
    /// sees part of a record without its terminator arriving in the same
    /// write.
    pub fn append(&self, lines: &[String]) -> io::Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut buf = String::new();
        for line in lines {
            buf.push_str(line);
            buf.push('\n');
        }
        file.write_all(buf.as_bytes())?;
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }

    /// Current size in bytes; 0 if the file does not exist yet.
    pub fn len(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Opens a cursor at the current end of the log. Creates the file and
    /// parent directories so a tail can start before the first append.
    pub fn open_tail(&self) -> io::Result<TailCursor> {
        self.ensure_exists()?;
        let mut file = File::open(&self.path)?;
        let offset = file.seek(SeekFrom::End(0))?;
        Ok(TailCursor { file, offset })
    }

    /// Opens a cursor at a specific byte offset.
    pub fn open_at(&self, offset: u64) -> io::Result<TailCursor> {
        self.ensure_exists()?;
        let file = File::open(&self.path)?;
        Ok(TailCursor { file, offset })
    }

    /// Last `max` complete lines, for the initial page snapshot.
    pub fn snapshot_tail(&self, max: usize) -> io::Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut lines: Vec<String> = reader.lines().collect::<io::Result<_>>()?;
        if lines.len() > max {
            lines.drain(..lines.len() - max);
        }
        Ok(lines)
    }

    fn ensure_exists(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&self.path)?;
        Ok(())
    }
}

/// Byte-offset read position owned by a single tail session.
pub struct TailCursor {
    file: File,
    offset: u64,
}

impl TailCursor {
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads the next complete line without blocking. A trailing fragment
    /// that has no terminator yet counts as not-yet-written: the cursor
    /// stays put and the fragment is retried on a later poll.
    pub fn read_next(&mut self) -> io::Result<Option<String>> {
        self.file.seek(SeekFrom::Start(self.offset))?;
        let mut reader = BufReader::new(&mut self.file);
        let mut buf = String::new();
        let read = reader.read_line(&mut buf)?;
        if read == 0 || !buf.ends_with('\n') {
            return Ok(None);
        }
        self.offset += read as u64;
        Ok(Some(buf.trim_end().to_string()))
    }
}
