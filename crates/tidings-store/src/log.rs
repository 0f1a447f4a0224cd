use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::entry::LogEntry;
use crate::error::{Result, StoreError};

/// Counters from one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub applied: usize,
    pub skipped: usize,
}

/// Minimal write-ahead log: append one entry, replay all entries in order.
///
/// The channel store only talks to this trait, so the backing storage can be
/// swapped without touching upsert or lookup logic.
pub trait ChangeLog: Send + Sync {
    fn append(&mut self, entry: &LogEntry) -> Result<()>;

    /// Feed every valid entry to `apply` in write order. Unparseable lines are
    /// skipped and counted.
    fn replay(&mut self, apply: &mut dyn FnMut(LogEntry)) -> Result<ReplayStats>;

    /// Atomically replace the whole log with `entries`.
    fn rewrite(&mut self, entries: &[LogEntry]) -> Result<()>;
}

/// Apply each line, skipping (and logging) the ones that fail to parse.
fn replay_line(
    line_no: usize,
    line: &str,
    apply: &mut dyn FnMut(LogEntry),
    stats: &mut ReplayStats,
) {
    match LogEntry::parse(line) {
        Ok(Some(entry)) => {
            apply(entry);
            stats.applied += 1;
        }
        Ok(None) => {}
        Err(e) => {
            warn!(line = line_no, "Skipping malformed channel log line: {}", e);
            stats.skipped += 1;
        }
    }
}

/// Append-only text file, one entry per line.
pub struct FileLog {
    path: PathBuf,
    file: File,
    sync: bool,
}

impl FileLog {
    /// Open or create the log. Every append is fsync'd.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_sync(path, true)
    }

    pub fn open_with_sync(path: &Path, sync: bool) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        truncate_torn_tail(&mut file)?;

        info!("Channel log opened at {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file,
            sync,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A crash mid-append can leave a final line without its terminator. That
/// record was never acknowledged, so cut the file back to the last complete
/// line before any new append lands after it.
fn truncate_torn_tail(file: &mut File) -> Result<()> {
    let len = file.metadata()?.len();
    let mut end = len;
    let mut chunk = [0u8; 4096];

    while end > 0 {
        let start = end.saturating_sub(chunk.len() as u64);
        let window = &mut chunk[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(window)?;
        if let Some(pos) = window.iter().rposition(|&b| b == b'\n') {
            end = start + pos as u64 + 1;
            break;
        }
        end = start;
    }

    if end < len {
        warn!(
            dropped_bytes = len - end,
            "Channel log ends with a partial line, truncating"
        );
        file.set_len(end)?;
        file.sync_data()?;
    }
    Ok(())
}

impl ChangeLog for FileLog {
    fn append(&mut self, entry: &LogEntry) -> Result<()> {
        let mut line = entry.encode();
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        if self.sync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn replay(&mut self, apply: &mut dyn FnMut(LogEntry)) -> Result<ReplayStats> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut stats = ReplayStats::default();
        let mut buf = Vec::new();
        let mut line_no = 0;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line_no += 1;

            if buf.last() != Some(&b'\n') {
                warn!(line = line_no, "Skipping unterminated channel log line");
                stats.skipped += 1;
                break;
            }
            match std::str::from_utf8(&buf) {
                Ok(line) => replay_line(line_no, line, apply, &mut stats),
                Err(_) => {
                    warn!(line = line_no, "Skipping non-UTF-8 channel log line");
                    stats.skipped += 1;
                }
            }
        }

        Ok(stats)
    }

    fn rewrite(&mut self, entries: &[LogEntry]) -> Result<()> {
        let tmp = self.path.with_extension("compact");
        match fs::remove_file(&tmp) {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        // This handle is the live log once renamed into place.
        let mut out = OpenOptions::new()
            .create_new(true)
            .read(true)
            .append(true)
            .open(&tmp)?;
        for entry in entries {
            out.write_all(entry.encode().as_bytes())?;
            out.write_all(b"\n")?;
        }
        out.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        self.file = out;
        Ok(())
    }
}

/// In-memory log. Clones share the same lines, so a test can keep a handle
/// and replay it into a fresh store.
#[derive(Clone, Default)]
pub struct MemoryLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with raw lines, e.g. to simulate a damaged file.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: Arc::new(Mutex::new(lines.into_iter().map(Into::into).collect())),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl ChangeLog for MemoryLog {
    fn append(&mut self, entry: &LogEntry) -> Result<()> {
        self.lines
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .push(entry.encode());
        Ok(())
    }

    fn replay(&mut self, apply: &mut dyn FnMut(LogEntry)) -> Result<ReplayStats> {
        let lines = self.lines.lock().map_err(|_| StoreError::Poisoned)?.clone();
        let mut stats = ReplayStats::default();
        for (idx, line) in lines.iter().enumerate() {
            replay_line(idx + 1, line, apply, &mut stats);
        }
        Ok(stats)
    }

    fn rewrite(&mut self, entries: &[LogEntry]) -> Result<()> {
        *self.lines.lock().map_err(|_| StoreError::Poisoned)? =
            entries.iter().map(LogEntry::encode).collect();
        Ok(())
    }
}
