//! Size-rotated traffic log file with bounded archive retention.
//!
//! The active file is renamed to `<file>.<UTC timestamp>` once the next
//! record would push it past `max_size_bytes`, then a fresh file is opened.
//! Archives past `max_backups`, or older than `max_age`, are pruned right
//! after each rotation.
//!
//! Threshold check, rotation and the write itself happen under one mutex, so
//! concurrent writers see either the old or the new file, never a record
//! split across both.

use crate::sink::TrafficWriter;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};
use trafficlog_core::{TrafficLogConfig, TrafficLogError};

const ARCHIVE_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";
/// Length of a rendered [`ARCHIVE_TIME_FORMAT`] suffix.
const ARCHIVE_TIME_LEN: usize = 23;

// ── Configuration ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RotatingFileConfig {
    /// Active file path, e.g. `log/data.log`.
    pub file_path: PathBuf,
    /// Size in bytes that triggers rotation. 0 disables size rotation.
    pub max_size_bytes: u64,
    /// Archives to keep. 0 = unlimited.
    pub max_backups: usize,
    /// Archives older than this are removed. `None` = keep forever.
    pub max_age: Option<Duration>,
    /// Rotate when the UTC date changes.
    pub rotate_daily: bool,
}

impl From<&TrafficLogConfig> for RotatingFileConfig {
    fn from(cfg: &TrafficLogConfig) -> Self {
        Self {
            file_path: cfg.log_path(),
            max_size_bytes: cfg.max_size_bytes(),
            max_backups: cfg.max_backups,
            max_age: cfg.max_age(),
            rotate_daily: cfg.rotate_daily,
        }
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct RotatingFile {
    config: RotatingFileConfig,
    inner: Mutex<FileState>,
}

struct FileState {
    writer: BufWriter<File>,
    current_date: NaiveDate,
    current_size: u64,
}

impl RotatingFile {
    /// Open (or create) the active file and its parent directories.
    pub fn new(config: RotatingFileConfig) -> Result<Self, TrafficLogError> {
        let path = &config.file_path;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| TrafficLogError::sink_setup(path, e))?;
            }
        }

        let file = open_append(path).map_err(|e| TrafficLogError::sink_setup(path, e))?;
        let metadata = file
            .metadata()
            .map_err(|e| TrafficLogError::sink_setup(path, e))?;
        let current_size = metadata.len();
        // An existing file belongs to the day it was last written.
        let current_date = metadata
            .modified()
            .map(|m| DateTime::<Utc>::from(m).date_naive())
            .unwrap_or_else(|_| Utc::now().date_naive());

        info!(path = %path.display(), size = current_size, "Traffic log file opened");

        Ok(Self {
            inner: Mutex::new(FileState {
                writer: BufWriter::new(file),
                current_date,
                current_size,
            }),
            config,
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.file_path
    }

    /// Bytes written to the active file, including what it held when opened.
    pub fn current_size(&self) -> u64 {
        self.lock().map(|s| s.current_size).unwrap_or(0)
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, FileState>> {
        self.inner
            .lock()
            .map_err(|_| io::Error::other("traffic log file lock poisoned"))
    }

    fn needs_rotation(&self, state: &FileState, incoming: u64, today: NaiveDate) -> bool {
        if state.current_size == 0 {
            return false;
        }
        let by_date = self.config.rotate_daily && today != state.current_date;
        let by_size = self.config.max_size_bytes > 0
            && state.current_size + incoming > self.config.max_size_bytes;
        by_date || by_size
    }

    /// Archive the active file and open a new one. Any failure leaves the
    /// current handle in place so records keep landing somewhere.
    fn rotate(&self, state: &mut FileState, today: NaiveDate) {
        if let Err(e) = state.writer.flush() {
            warn!(error = %e, "Failed to flush traffic log before rotation");
        }

        let base = &self.config.file_path;
        let archived = unique_path(archive_path(base, Utc::now()));

        if let Err(e) = fs::rename(base, &archived) {
            error!(
                error = %e,
                from = %base.display(),
                to = %archived.display(),
                "Failed to rotate traffic log, continuing on current file"
            );
            return;
        }

        match open_append(base) {
            Ok(file) => {
                state.writer = BufWriter::new(file);
                state.current_size = 0;
                state.current_date = today;
                info!(from = %base.display(), to = %archived.display(), "Rotated traffic log");
            }
            Err(e) => {
                error!(
                    error = %e,
                    path = %base.display(),
                    "Failed to reopen traffic log, continuing on archived file"
                );
                return;
            }
        }

        if let Err(e) = prune_archives(base, self.config.max_backups, self.config.max_age) {
            warn!(error = %e, "Failed to list old traffic log files for pruning");
        }
    }
}

impl TrafficWriter for RotatingFile {
    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        let mut state = self.lock()?;
        let incoming = buf.len() as u64;
        let today = Utc::now().date_naive();

        if self.needs_rotation(&state, incoming, today) {
            self.rotate(&mut state, today);
        }

        state.writer.write_all(buf)?;
        state.writer.flush()?;
        state.current_size += incoming;
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        self.lock()?.writer.flush()
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// `data.log` → `data.log.2025-01-15T10-30-00.123`. Suffixes sort in time order.
fn archive_path(base: &Path, at: DateTime<Utc>) -> PathBuf {
    let mut path = base.as_os_str().to_owned();
    path.push(".");
    path.push(at.format(ARCHIVE_TIME_FORMAT).to_string());
    PathBuf::from(path)
}

/// Append `.0001`, `.0002`, … until the name is free.
fn unique_path(candidate: PathBuf) -> PathBuf {
    if !candidate.exists() {
        return candidate;
    }
    let mut n = 1u32;
    loop {
        let mut path = candidate.as_os_str().to_owned();
        path.push(format!(".{n:04}"));
        let path = PathBuf::from(path);
        if !path.exists() {
            return path;
        }
        n += 1;
    }
}

/// `2025-01-15T10-30-00.123`, optionally followed by a `.0001` collision suffix.
fn is_archive_suffix(suffix: &str) -> bool {
    let Some((stamp, rest)) = suffix.split_at_checked(ARCHIVE_TIME_LEN) else {
        return false;
    };
    if NaiveDateTime::parse_from_str(stamp, ARCHIVE_TIME_FORMAT).is_err() {
        return false;
    }
    match rest.strip_prefix('.') {
        None => rest.is_empty(),
        Some(n) => !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()),
    }
}

/// Archives of `base` in the same directory, oldest first. Only regular files
/// named `<base>.<archive timestamp>` count.
fn list_archives(base: &Path) -> io::Result<Vec<PathBuf>> {
    let parent = match base.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let base_name = base.file_name().unwrap_or_default().to_string_lossy();
    let prefix = format!("{base_name}.");

    let mut archives = Vec::new();
    for entry in fs::read_dir(parent)? {
        let entry = entry?;
        let name = entry.file_name();
        let is_archive = name
            .to_str()
            .and_then(|n| n.strip_prefix(&prefix))
            .is_some_and(is_archive_suffix);
        if is_archive && entry.file_type().is_ok_and(|t| t.is_file()) {
            archives.push(entry.path());
        }
    }
    archives.sort();
    Ok(archives)
}

/// Remove one archive; a failure is logged and skipped so the rest still go.
fn remove_archive(path: &Path, reason: &str) -> bool {
    debug!(path = %path.display(), reason, "Pruning traffic log archive");
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Failed to remove traffic log archive");
            false
        }
    }
}

/// Delete archives older than `max_age`, then the oldest ones beyond `keep`
/// (0 = no count limit). Returns how many files were removed; only listing
/// the directory can fail.
fn prune_archives(base: &Path, keep: usize, max_age: Option<Duration>) -> io::Result<usize> {
    let mut archives = list_archives(base)?;
    let mut removed = 0;

    if let Some(max_age) = max_age {
        let now = SystemTime::now();
        let mut kept = Vec::with_capacity(archives.len());
        for path in archives {
            let expired = fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age > max_age);
            if expired {
                removed += usize::from(remove_archive(&path, "expired"));
            } else {
                kept.push(path);
            }
        }
        archives = kept;
    }

    if keep > 0 && archives.len() > keep {
        let excess = archives.len() - keep;
        for path in archives.iter().take(excess) {
            removed += usize::from(remove_archive(path, "over max_backups"));
        }
    }

    Ok(removed)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config(dir: &Path, max_size_bytes: u64, max_backups: usize) -> RotatingFileConfig {
        RotatingFileConfig {
            file_path: dir.join("data.log"),
            max_size_bytes,
            max_backups,
            max_age: None,
            rotate_daily: false,
        }
    }

    fn archive_count(dir: &Path) -> usize {
        list_archives(&dir.join("data.log")).unwrap().len()
    }

    #[test]
    fn archive_path_appends_timestamp_suffix() {
        let at = Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap();
        let p = archive_path(Path::new("/var/log/data.log"), at);
        assert_eq!(p, PathBuf::from("/var/log/data.log.2025-01-15T10-30-00.000"));
    }

    #[test]
    fn unique_path_skips_taken_names() {
        let dir = tempfile::tempdir().unwrap();
        let taken = dir.path().join("data.log.x");
        File::create(&taken).unwrap();
        File::create(dir.path().join("data.log.x.0001")).unwrap();
        assert_eq!(unique_path(taken), dir.path().join("data.log.x.0002"));
    }

    #[test]
    fn writer_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), 0, 0);
        cfg.file_path = dir.path().join("deep").join("nested").join("data.log");
        let writer = RotatingFile::new(cfg.clone()).unwrap();
        writer.write_all(b"nested\n").unwrap();
        assert!(cfg.file_path.exists());
    }

    #[test]
    fn writer_picks_up_existing_size() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("data.log"), b"0123456789").unwrap();
        let writer = RotatingFile::new(config(dir.path(), 0, 0)).unwrap();
        assert_eq!(writer.current_size(), 10);
    }

    #[test]
    fn no_rotation_below_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RotatingFile::new(config(dir.path(), 100, 5)).unwrap();
        writer.write_all(b"0123456789\n").unwrap();
        writer.write_all(b"0123456789\n").unwrap();
        assert_eq!(archive_count(dir.path()), 0);
        assert_eq!(writer.current_size(), 22);
    }

    #[test]
    fn crossing_threshold_rotates_exactly_once_before_write() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RotatingFile::new(config(dir.path(), 20, 5)).unwrap();

        writer.write_all(b"first-line-123\n").unwrap(); // 15 bytes
        writer.write_all(b"second-line\n").unwrap(); // 15 + 12 > 20

        assert_eq!(archive_count(dir.path()), 1);
        let active = fs::read_to_string(dir.path().join("data.log")).unwrap();
        assert_eq!(active, "second-line\n");
        let archived = &list_archives(&dir.path().join("data.log")).unwrap()[0];
        assert_eq!(fs::read_to_string(archived).unwrap(), "first-line-123\n");
        assert_eq!(writer.current_size(), 12);
    }

    #[test]
    fn oversized_record_lands_whole_in_fresh_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RotatingFile::new(config(dir.path(), 8, 5)).unwrap();
        writer.write_all(b"a\n").unwrap();
        writer.write_all(b"much-longer-than-eight\n").unwrap();
        let active = fs::read_to_string(dir.path().join("data.log")).unwrap();
        assert_eq!(active, "much-longer-than-eight\n");
    }

    #[test]
    fn archive_count_never_exceeds_max_backups() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RotatingFile::new(config(dir.path(), 10, 2)).unwrap();
        for i in 0..8 {
            writer.write_all(format!("line-{i:04}\n").as_bytes()).unwrap();
            assert!(archive_count(dir.path()) <= 2);
        }
        assert_eq!(archive_count(dir.path()), 2);
        let active = fs::read_to_string(dir.path().join("data.log")).unwrap();
        assert_eq!(active, "line-0007\n");
    }

    #[test]
    fn stray_entries_do_not_block_pruning() {
        let dir = tempfile::tempdir().unwrap();
        let stray_dir = dir.path().join("data.log.0-stray");
        let stamped_dir = dir.path().join("data.log.2000-01-01T00-00-00.000");
        let unrelated = dir.path().join("data.log.bak");
        fs::create_dir(&stray_dir).unwrap();
        fs::create_dir(&stamped_dir).unwrap();
        File::create(&unrelated).unwrap();

        let writer = RotatingFile::new(config(dir.path(), 10, 2)).unwrap();
        for i in 0..8 {
            writer.write_all(format!("line-{i:04}\n").as_bytes()).unwrap();
        }

        let files = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().unwrap().is_file())
            .count();
        // active file + 2 archives + the unrelated file
        assert_eq!(files, 4);
        assert_eq!(archive_count(dir.path()), 2);
        assert!(stray_dir.is_dir());
        assert!(stamped_dir.is_dir());
        assert!(unrelated.exists());
    }

    #[test]
    fn archive_suffix_shape() {
        assert!(is_archive_suffix("2025-01-15T10-30-00.123"));
        assert!(is_archive_suffix("2025-01-15T10-30-00.123.0002"));
        assert!(!is_archive_suffix("2025-01-15T10-30-00.123."));
        assert!(!is_archive_suffix("2025-01-15T10-30-00.123.old"));
        assert!(!is_archive_suffix("0-stray"));
        assert!(!is_archive_suffix("bak"));
    }

    #[test]
    fn daily_rotation_triggers_on_date_change_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), 0, 0);
        cfg.rotate_daily = true;
        let daily = RotatingFile::new(cfg).unwrap();
        daily.write_all(b"x\n").unwrap();

        let state = daily.lock().unwrap();
        let today = state.current_date;
        let tomorrow = today.succ_opt().unwrap();
        assert!(daily.needs_rotation(&state, 1, tomorrow));
        assert!(!daily.needs_rotation(&state, 1, today));
        drop(state);

        let other = tempfile::tempdir().unwrap();
        let plain = RotatingFile::new(config(other.path(), 0, 0)).unwrap();
        plain.write_all(b"x\n").unwrap();
        let state = plain.lock().unwrap();
        assert!(!plain.needs_rotation(&state, 1, state.current_date.succ_opt().unwrap()));
    }

    #[test]
    fn existing_file_keeps_its_last_write_date() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.log");
        fs::write(&path, b"yesterday\n").unwrap();
        let yesterday = SystemTime::now() - Duration::from_secs(86_400);
        filetime::set_file_mtime(&path, filetime::FileTime::from_system_time(yesterday)).unwrap();

        let mut cfg = config(dir.path(), 0, 0);
        cfg.rotate_daily = true;
        let writer = RotatingFile::new(cfg).unwrap();
        assert_eq!(
            writer.lock().unwrap().current_date,
            DateTime::<Utc>::from(yesterday).date_naive()
        );

        writer.write_all(b"today\n").unwrap();
        assert_eq!(archive_count(dir.path()), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "today\n");
    }

    #[test]
    fn prune_keeps_newest_archives() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("data.log");
        for i in 1..=5 {
            File::create(dir.path().join(format!("data.log.2025-01-0{i}T00-00-00.000"))).unwrap();
        }
        File::create(dir.path().join("other.log.2025-01-01T00-00-00.000")).unwrap();

        assert_eq!(prune_archives(&base, 2, None).unwrap(), 3);

        let left = list_archives(&base).unwrap();
        assert_eq!(
            left,
            vec![
                dir.path().join("data.log.2025-01-04T00-00-00.000"),
                dir.path().join("data.log.2025-01-05T00-00-00.000"),
            ]
        );
        assert!(dir.path().join("other.log.2025-01-01T00-00-00.000").exists());
    }

    #[test]
    fn prune_removes_archives_past_max_age() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("data.log");
        let old = dir.path().join("data.log.2020-01-01T00-00-00.000");
        let fresh = dir.path().join("data.log.2025-01-01T00-00-00.000");
        File::create(&old).unwrap();
        File::create(&fresh).unwrap();
        let ten_days_ago = SystemTime::now() - Duration::from_secs(10 * 86_400);
        filetime::set_file_mtime(&old, filetime::FileTime::from_system_time(ten_days_ago))
            .unwrap();

        let removed = prune_archives(&base, 0, Some(Duration::from_secs(86_400))).unwrap();

        assert_eq!(removed, 1);
        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn unlimited_backups_keep_everything() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RotatingFile::new(config(dir.path(), 5, 0)).unwrap();
        for _ in 0..4 {
            writer.write_all(b"abcdef\n").unwrap();
        }
        assert_eq!(archive_count(dir.path()), 3);
    }

    #[test]
    fn concurrent_writers_never_split_records() {
        let dir = tempfile::tempdir().unwrap();
        let writer = std::sync::Arc::new(RotatingFile::new(config(dir.path(), 200, 0)).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let w = std::sync::Arc::clone(&writer);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        w.write_all(format!("thread-{t}-record-{i:03}\n").as_bytes()).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut files = list_archives(&dir.path().join("data.log")).unwrap();
        files.push(dir.path().join("data.log"));
        let mut total = 0;
        for f in files {
            let content = fs::read_to_string(&f).unwrap();
            assert!(content.len() as u64 <= 200, "{} too large", f.display());
            for line in content.lines() {
                assert!(line.starts_with("thread-") && line.len() == 19, "torn line {line:?}");
                total += 1;
            }
        }
        assert_eq!(total, 200);
    }
}
