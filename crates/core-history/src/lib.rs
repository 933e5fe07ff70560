//! Shared command history.
//!
//! One [`History`] exists per history name, shared by every reader with
//! that name (process-wide registry, reference-counted). The store is
//! internally synchronized; background autosuggest workers call straight
//! into it.
//!
//! In memory the store holds this session's `new_items` plus an owned
//! snapshot of the on-disk file with pre-scanned item offsets. Items from
//! the file stamped after `boundary_timestamp` were written by sessions
//! started after this one and stay invisible here until a resync. Saving
//! is tempfile + advisory lock + rename; the in-memory state survives any
//! file-level failure.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, info, warn};

pub mod file;
pub mod search;

pub use file::{FileContents, FileFormat, FileIdentity};
pub use search::{HistorySearch, SearchDirection, SearchType};

/// Vacuum trims the file to this many items.
pub const SAVE_MAX_ITEMS: usize = 256 * 1024;
/// A full rewrite (dedupe + trim) happens every this many saves.
const SAVES_PER_VACUUM: u64 = 32;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One remembered command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HistoryItem {
    pub text: String,
    /// Seconds since the epoch.
    pub timestamp: i64,
    /// Literal path tokens that must exist for an autosuggestion based on
    /// this item to be offered.
    pub required_paths: Vec<String>,
}

impl HistoryItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: now_timestamp(),
            required_paths: Vec::new(),
        }
    }

    pub fn with_timestamp(text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            text: text.into(),
            timestamp,
            required_paths: Vec::new(),
        }
    }

    /// Two items are equivalent when text and timestamp match.
    pub fn is_equivalent(&self, other: &HistoryItem) -> bool {
        self.text == other.text && self.timestamp == other.timestamp
    }
}

pub fn now_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

struct HistoryImpl {
    /// Items added this session, oldest first.
    new_items: Vec<HistoryItem>,
    /// Prefix of `new_items` already persisted.
    first_unwritten_index: usize,
    /// The most recently added item is tentative and hidden from searches.
    pending: bool,
    /// Texts removed this session.
    deleted: HashSet<String>,
    /// Snapshot of the on-disk file, when one was readable.
    contents: Option<FileContents>,
    /// Offsets into `contents`, file order (oldest first).
    old_item_offsets: Vec<usize>,
    /// File items stamped after this belong to later sessions.
    boundary_timestamp: i64,
    path: Option<PathBuf>,
    save_count: u64,
    reported_file_error: bool,
}

/// Thread-safe history store for one name.
pub struct History {
    name: String,
    inner: Mutex<HistoryImpl>,
}

impl History {
    /// Open (or create) the history for `name` backed by `path`.
    /// A load failure falls back to an empty in-memory history.
    pub fn with_path(name: &str, path: Option<PathBuf>) -> Self {
        let boundary_timestamp = now_timestamp();
        let mut inner = HistoryImpl {
            new_items: Vec::new(),
            first_unwritten_index: 0,
            pending: false,
            deleted: HashSet::new(),
            contents: None,
            old_item_offsets: Vec::new(),
            boundary_timestamp,
            path,
            save_count: 0,
            reported_file_error: false,
        };
        inner.reload_contents();
        Self {
            name: name.to_string(),
            inner: Mutex::new(inner),
        }
    }

    /// Purely in-memory history (tests, `--private` sessions).
    pub fn in_memory(name: &str) -> Self {
        Self::with_path(name, None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append an item. A non-pending add resolves any pending one.
    pub fn add(&self, item: HistoryItem) {
        self.add_inner(item, false);
    }

    /// Append a tentative item, hidden from searches until resolved.
    /// "Add before execute" without polluting immediate recall.
    pub fn add_pending(&self, item: HistoryItem) {
        self.add_inner(item, true);
    }

    fn add_inner(&self, item: HistoryItem, pending: bool) {
        if item.text.is_empty() {
            return;
        }
        let mut inner = self.lock();
        inner.deleted.remove(&item.text);
        inner.new_items.push(item);
        inner.pending = pending;
        debug!(target: "history.store", name = %self.name, pending, total = inner.new_items.len(), "item added");
    }

    /// Make the pending item (if any) visible.
    pub fn resolve_pending(&self) {
        self.lock().pending = false;
    }

    /// Remove every item with this text, session-wide.
    pub fn remove(&self, text: &str) {
        let mut inner = self.lock();
        let text = text.to_string();
        let had_pending_tail = inner.pending
            && inner.new_items.last().is_some_and(|it| it.text == text);
        inner.new_items.retain(|it| it.text != text);
        if had_pending_tail {
            inner.pending = false;
        }
        inner.first_unwritten_index = inner.first_unwritten_index.min(inner.new_items.len());
        inner.deleted.insert(text);
    }

    /// Visible item at `idx`, newest first (0 = most recent).
    pub fn item_at(&self, idx: usize) -> Option<HistoryItem> {
        let inner = self.lock();
        let mut remaining = idx;

        let mut new_iter = inner.new_items.iter().rev();
        if inner.pending {
            new_iter.next();
        }
        for item in new_iter {
            if inner.deleted.contains(&item.text) {
                continue;
            }
            if remaining == 0 {
                return Some(item.clone());
            }
            remaining -= 1;
        }

        let contents = inner.contents.as_ref()?;
        for &offset in inner.old_item_offsets.iter().rev() {
            let item = contents.decode_item(offset);
            if inner.deleted.contains(&item.text) {
                continue;
            }
            if remaining == 0 {
                return Some(item);
            }
            remaining -= 1;
        }
        None
    }

    /// Count of visible items (linear; used by tests and the history
    /// jump commands, not hot paths).
    pub fn visible_len(&self) -> usize {
        let mut n = 0;
        while self.item_at(n).is_some() {
            n += 1;
        }
        n
    }

    /// Persist unwritten items. Returns without error when there is no
    /// backing path.
    pub fn save(&self) -> Result<(), HistoryError> {
        let mut inner = self.lock();
        let Some(path) = inner.path.clone() else {
            return Ok(());
        };
        let vacuum = inner.save_count % SAVES_PER_VACUUM == SAVES_PER_VACUUM - 1;
        inner.save_count += 1;

        match inner.save_to(&path, vacuum) {
            Ok(()) => {
                inner.reported_file_error = false;
                Ok(())
            }
            Err(err) => {
                // First failure gets a diagnostic; repeats are rate-limited.
                if !inner.reported_file_error {
                    warn!(target: "history.file", name = %self.name, %err, "history save failed");
                    inner.reported_file_error = true;
                }
                Err(err)
            }
        }
    }

    /// Re-read the on-disk file and make other sessions' items visible
    /// from now on.
    pub fn resync(&self) {
        let mut inner = self.lock();
        inner.boundary_timestamp = now_timestamp();
        // The boundary moved: a rescan is needed even if the file itself
        // is untouched, so drop the snapshot before reloading.
        inner.contents = None;
        inner.reload_contents();
        info!(target: "history.store", name = %self.name, old_items = inner.old_item_offsets.len(), "resynced");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HistoryImpl> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl HistoryImpl {
    /// Snapshot the file (if any) and rescan offsets under the boundary.
    /// Offsets survive only while the file identity (dev, inode, size,
    /// mtime) is unchanged; when it is, the existing snapshot stands.
    fn reload_contents(&mut self) {
        let Some(path) = self.path.clone() else {
            self.contents = None;
            self.old_item_offsets.clear();
            return;
        };
        if let (Some(contents), Some(identity)) =
            (&self.contents, file::FileIdentity::of(&path))
            && contents.identity == identity
        {
            return;
        }
        self.contents = None;
        self.old_item_offsets.clear();
        match FileContents::load(&path) {
            Ok(Some(contents)) => {
                self.old_item_offsets = contents.scan_offsets(self.boundary_timestamp);
                self.contents = Some(contents);
            }
            Ok(None) => {}
            Err(err) => {
                if !self.reported_file_error {
                    warn!(target: "history.file", %err, path = %path.display(), "history load failed; continuing empty");
                    self.reported_file_error = true;
                }
            }
        }
    }

    fn unwritten_items(&self) -> &[HistoryItem] {
        let mut end = self.new_items.len();
        if self.pending {
            end = end.saturating_sub(1);
        }
        let start = self.first_unwritten_index.min(end);
        &self.new_items[start..end]
    }

    fn save_to(&mut self, path: &Path, vacuum: bool) -> Result<(), HistoryError> {
        // Take the advisory lock on the live file for the whole rewrite.
        // Best-effort: a filesystem that refuses the lock (NFS) only loses
        // the lock, not atomicity, which rename provides.
        let lock_file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let _lock = LockedFile::acquire(&lock_file);

        // Merge: disk items (fresh read, to pick up concurrent sessions),
        // then our unwritten items.
        let mut fresh = FileContents::load(path)?.map_or_else(Vec::new, |contents| {
            contents
                .scan_offsets(0)
                .into_iter()
                .map(|off| contents.decode_item(off))
                .collect::<Vec<_>>()
        });
        let written = self.unwritten_items().to_vec();
        fresh.extend(written.iter().cloned());
        for item in fresh.iter_mut() {
            if item.timestamp == 0 {
                item.timestamp = now_timestamp();
            }
        }
        fresh.retain(|it| !self.deleted.contains(&it.text));

        if vacuum {
            fresh = dedupe_keeping_newest(fresh);
            if fresh.len() > SAVE_MAX_ITEMS {
                let excess = fresh.len() - SAVE_MAX_ITEMS;
                fresh.drain(..excess);
            }
        }

        let mut buffer = Vec::new();
        for item in &fresh {
            file::append_item(item, &mut buffer);
        }

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        temp.write_all(&buffer)?;
        temp.flush()?;
        temp.persist(path).map_err(|err| HistoryError::Io(err.error))?;

        self.first_unwritten_index = if self.pending {
            self.new_items.len().saturating_sub(1)
        } else {
            self.new_items.len()
        };
        self.reload_contents();
        debug!(target: "history.file", items = fresh.len(), vacuum, "history saved");
        Ok(())
    }
}

/// Keep only the newest occurrence of each text, preserving order.
fn dedupe_keeping_newest(items: Vec<HistoryItem>) -> Vec<HistoryItem> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<HistoryItem> = Vec::with_capacity(items.len());
    for item in items.into_iter().rev() {
        if seen.insert(item.text.clone()) {
            out.push(item);
        }
    }
    out.reverse();
    out
}

/// fcntl write lock held for a scope. Failure to lock is logged and
/// tolerated; rename keeps the rewrite atomic either way.
struct LockedFile<'a> {
    file: &'a std::fs::File,
}

impl<'a> LockedFile<'a> {
    fn acquire(file: &'a std::fs::File) -> Option<LockedFile<'a>> {
        use std::os::fd::AsRawFd;
        let lock = libc::flock {
            l_type: libc::F_WRLCK as libc::c_short,
            l_whence: libc::SEEK_SET as libc::c_short,
            l_start: 0,
            l_len: 0,
            l_pid: 0,
        };
        let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_SETLKW, &lock) };
        if rc != 0 {
            warn!(target: "history.file", "advisory lock unavailable; relying on rename atomicity");
            return None;
        }
        Some(LockedFile { file })
    }
}

impl Drop for LockedFile<'_> {
    fn drop(&mut self) {
        use std::os::fd::AsRawFd;
        let unlock = libc::flock {
            l_type: libc::F_UNLCK as libc::c_short,
            l_whence: libc::SEEK_SET as libc::c_short,
            l_start: 0,
            l_len: 0,
            l_pid: 0,
        };
        unsafe { libc::fcntl(self.file.as_raw_fd(), libc::F_SETLK, &unlock) };
    }
}

/// Default on-disk location for a history name:
/// `<data_dir>/driftline/<name>_history`.
pub fn default_history_path(name: &str) -> Option<PathBuf> {
    let mut dir = dirs::data_dir()?;
    dir.push("driftline");
    std::fs::create_dir_all(&dir).ok()?;
    dir.push(format!("{name}_history"));
    Some(dir)
}

/// Process-wide registry: one shared store per history name.
pub fn session(name: &str) -> Arc<History> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Arc<History>>>> = OnceLock::new();
    let registry = REGISTRY.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    map.entry(name.to_string())
        .or_insert_with(|| Arc::new(History::with_path(name, default_history_path(name))))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn visible_texts(history: &History) -> Vec<String> {
        let mut out = Vec::new();
        let mut idx = 0;
        while let Some(item) = history.item_at(idx) {
            out.push(item.text);
            idx += 1;
        }
        out
    }

    #[test]
    fn newest_first_ordering() {
        let history = History::in_memory("test");
        history.add(HistoryItem::with_timestamp("one", 1));
        history.add(HistoryItem::with_timestamp("two", 2));
        history.add(HistoryItem::with_timestamp("three", 3));
        assert_eq!(visible_texts(&history), vec!["three", "two", "one"]);
    }

    #[test]
    fn pending_item_is_hidden_until_resolved() {
        let history = History::in_memory("test");
        history.add(HistoryItem::with_timestamp("shown", 1));
        history.add_pending(HistoryItem::with_timestamp("tentative", 2));
        assert_eq!(visible_texts(&history), vec!["shown"]);
        history.resolve_pending();
        assert_eq!(visible_texts(&history), vec!["tentative", "shown"]);
    }

    #[test]
    fn adding_resolves_previous_pending() {
        let history = History::in_memory("test");
        history.add_pending(HistoryItem::with_timestamp("first", 1));
        history.add(HistoryItem::with_timestamp("second", 2));
        assert_eq!(visible_texts(&history), vec!["second", "first"]);
    }

    #[test]
    fn removed_items_stay_gone() {
        let history = History::in_memory("test");
        history.add(HistoryItem::with_timestamp("keep", 1));
        history.add(HistoryItem::with_timestamp("drop", 2));
        history.remove("drop");
        assert_eq!(visible_texts(&history), vec!["keep"]);
        // Re-adding after removal resurrects the text.
        history.add(HistoryItem::with_timestamp("drop", 3));
        assert_eq!(visible_texts(&history), vec!["drop", "keep"]);
    }

    #[test]
    fn save_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_history");
        {
            let history = History::with_path("test", Some(path.clone()));
            for (n, text) in ["ls", "cd /tmp", "echo done"].iter().enumerate() {
                history.add(HistoryItem::with_timestamp(*text, 100 + n as i64));
            }
            history.save().unwrap();
        }
        let reloaded = History::with_path("test", Some(path));
        assert_eq!(
            visible_texts(&reloaded),
            vec!["echo done", "cd /tmp", "ls"]
        );
    }

    #[test]
    fn boundary_hides_items_stamped_after_session_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_history");

        // Write a file containing one old item and one item stamped well
        // past this session's boundary (a session started later).
        let mut buffer = Vec::new();
        file::append_item(&HistoryItem::with_timestamp("old", 50), &mut buffer);
        file::append_item(
            &HistoryItem::with_timestamp("future", now_timestamp() + 10_000),
            &mut buffer,
        );
        std::fs::write(&path, &buffer).unwrap();

        let history = History::with_path("test", Some(path));
        assert_eq!(visible_texts(&history), vec!["old"]);
    }

    #[test]
    fn resync_picks_up_concurrent_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_history");
        let observer = History::with_path("test", Some(path.clone()));
        assert_eq!(visible_texts(&observer), Vec::<String>::new());

        // Another session commits an item (stamped in the past, so the
        // boundary does not hide it) after we loaded our snapshot.
        let writer = History::with_path("test", Some(path));
        writer.add(HistoryItem::with_timestamp("from-elsewhere", 100));
        writer.save().unwrap();

        // Not visible until we re-read the file.
        assert_eq!(visible_texts(&observer), Vec::<String>::new());
        observer.resync();
        assert_eq!(visible_texts(&observer), vec!["from-elsewhere"]);
    }

    #[test]
    fn pending_items_are_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_history");
        let history = History::with_path("test", Some(path.clone()));
        history.add(HistoryItem::with_timestamp("committed", 1));
        history.add_pending(HistoryItem::with_timestamp("tentative", 2));
        history.save().unwrap();

        let reloaded = History::with_path("test", Some(path));
        assert_eq!(visible_texts(&reloaded), vec!["committed"]);
    }

    #[test]
    fn dedupe_keeps_newest() {
        let items = vec![
            HistoryItem::with_timestamp("a", 1),
            HistoryItem::with_timestamp("b", 2),
            HistoryItem::with_timestamp("a", 3),
        ];
        let deduped = dedupe_keeping_newest(items);
        let texts: Vec<&str> = deduped.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["b", "a"]);
        assert_eq!(deduped[1].timestamp, 3);
    }

    #[test]
    fn vacuum_rewrite_dedupes_repeated_commands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_history");
        let history = History::with_path("test", Some(path.clone()));
        // Enough saves to cross the vacuum schedule, all recording the
        // same command text plus one marker.
        history.add(HistoryItem::with_timestamp("marker", 1));
        for n in 0..SAVES_PER_VACUUM {
            history.add(HistoryItem::with_timestamp("make test", 10 + n as i64));
            history.save().unwrap();
        }
        let reloaded = History::with_path("test", Some(path));
        let texts = visible_texts(&reloaded);
        let dups = texts.iter().filter(|t| *t == "make test").count();
        assert_eq!(dups, 1, "vacuum left duplicates: {texts:?}");
        assert!(texts.contains(&"marker".to_string()));
    }

    #[test]
    fn missing_file_loads_empty() {
        let history = History::with_path("test", Some(PathBuf::from("/nonexistent/dir/file")));
        assert_eq!(visible_texts(&history), Vec::<String>::new());
    }
}
