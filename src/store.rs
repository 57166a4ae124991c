use crate::error::StoreError;
use crate::record::TransactionRecord;
use log::debug;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Split, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

/// Single-slot exclusive resource guarding access to a record log.
///
/// Cloning shares the slot, so stores built with clones of one lock never
/// hold handles at the same time.
#[derive(Clone, Default)]
pub struct StoreLock(Arc<Mutex<()>>);

impl StoreLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The slot guards no data, so a panic while it was held leaves
        // nothing inconsistent behind.
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_lock(&self) -> Option<MutexGuard<'_, ()>> {
        match self.0.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(e)) => Some(e.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

impl fmt::Debug for StoreLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreLock").finish_non_exhaustive()
    }
}

/// Append-only, newline-delimited JSON log of transaction records.
///
/// All access goes through a [`StoreHandle`]. Only one handle exists at a
/// time, so readers never observe a line a writer is still producing.
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    persist: bool,
    lock: StoreLock,
}

impl RecordStore {
    /// Create a store over `path` with its own lock.
    ///
    /// With `persist` false every read yields nothing and every append is a
    /// no-op; the file is never touched.
    pub fn new(path: impl AsRef<Path>, persist: bool) -> Self {
        Self::with_lock(path, persist, StoreLock::new())
    }

    /// Create a store that shares `lock` with other stores.
    pub fn with_lock(path: impl AsRef<Path>, persist: bool, lock: StoreLock) -> Self {
        RecordStore {
            path: path.as_ref().to_path_buf(),
            persist,
            lock,
        }
    }

    /// Block until no other handle is outstanding, then return a new one.
    pub fn acquire(&self) -> StoreHandle<'_> {
        StoreHandle::new(self, self.lock.lock())
    }

    /// Like [`acquire`](Self::acquire) but returns `None` instead of waiting.
    pub fn try_acquire(&self) -> Option<StoreHandle<'_>> {
        self.lock.try_lock().map(|guard| StoreHandle::new(self, guard))
    }

    /// Returns the path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn persists(&self) -> bool {
        self.persist
    }
}

/// What a handle has been used for. Sticky once left `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleMode {
    Idle,
    Reading,
    Writing,
}

enum HandleState {
    Idle,
    // `None` when the log did not exist at first read.
    Reading(Option<RecordLines>),
    Writing(File),
}

struct RecordLines {
    // Raw bytes, so a line that is not UTF-8 is a decode error, not an i/o one.
    lines: Split<BufReader<File>>,
    line_no: usize,
}

impl RecordLines {
    fn next_record(&mut self) -> Option<Result<TransactionRecord, StoreError>> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            return Some(serde_json::from_slice(&line).map_err(|source| StoreError::Decode {
                line: self.line_no,
                source,
            }));
        }
    }
}

/// Exclusive access to a [`RecordStore`], used either to read or to append.
///
/// The first read or append fixes the handle's mode for the rest of its
/// life. Using it the other way afterwards is a bug in the caller and panics.
/// Dropping the handle closes the file and frees the store for the next
/// handle; [`release`](Self::release) does the same but reports sync errors.
pub struct StoreHandle<'a> {
    store: &'a RecordStore,
    // Declared before the guard so the file closes before the slot frees.
    state: HandleState,
    _guard: MutexGuard<'a, ()>,
}

impl<'a> StoreHandle<'a> {
    fn new(store: &'a RecordStore, guard: MutexGuard<'a, ()>) -> Self {
        StoreHandle {
            store,
            state: HandleState::Idle,
            _guard: guard,
        }
    }

    pub fn mode(&self) -> HandleMode {
        match self.state {
            HandleState::Idle => HandleMode::Idle,
            HandleState::Reading(_) => HandleMode::Reading,
            HandleState::Writing(_) => HandleMode::Writing,
        }
    }

    /// Append each record as one JSON line and sync the file.
    ///
    /// Returns the number of records written. Creates the log if needed.
    ///
    /// # Panics
    ///
    /// Panics if this handle has already been used for reading.
    pub fn append_records(&mut self, records: &[TransactionRecord]) -> Result<usize, StoreError> {
        if !self.store.persist || records.is_empty() {
            return Ok(0);
        }

        if let HandleState::Reading(_) = self.state {
            panic!("record log handle used for appending after reading");
        }

        if let HandleState::Idle = self.state {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.store.path)?;
            debug!("opened {} for append", self.store.path.display());
            self.state = HandleState::Writing(file);
        }

        let HandleState::Writing(file) = &mut self.state else {
            unreachable!("handle state is writing at this point");
        };

        for record in records {
            let json = serde_json::to_string(record).map_err(StoreError::Encode)?;
            writeln!(file, "{json}")?;
        }
        file.sync_data()?;

        debug!("appended {} record(s) to {}", records.len(), self.store.path.display());
        Ok(records.len())
    }

    /// Read up to `max` records, continuing where the previous call stopped.
    ///
    /// An empty result means the log is exhausted. A missing log file reads
    /// as empty. Blank lines are skipped. On a malformed line the whole batch
    /// is discarded and [`StoreError::Decode`] returned; callers should stop
    /// reading at that point.
    ///
    /// # Panics
    ///
    /// Panics if this handle has already been used for appending.
    pub fn read_records(&mut self, max: usize) -> Result<Vec<TransactionRecord>, StoreError> {
        if !self.store.persist || max == 0 {
            return Ok(Vec::new());
        }

        if let HandleState::Writing(_) = self.state {
            panic!("record log handle used for reading after appending");
        }

        if let HandleState::Idle = self.state {
            let lines = match File::open(&self.store.path) {
                Ok(file) => Some(RecordLines {
                    lines: BufReader::new(file).split(b'\n'),
                    line_no: 0,
                }),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("{} does not exist yet", self.store.path.display());
                    None
                }
                Err(e) => return Err(e.into()),
            };
            self.state = HandleState::Reading(lines);
        }

        let HandleState::Reading(lines) = &mut self.state else {
            unreachable!("handle state is reading at this point");
        };
        let Some(lines) = lines else {
            return Ok(Vec::new());
        };

        let mut batch = Vec::with_capacity(max);
        while batch.len() < max {
            match lines.next_record() {
                Some(record) => batch.push(record?),
                None => break,
            }
        }
        Ok(batch)
    }

    /// Close the file and give up exclusivity.
    pub fn release(mut self) -> Result<(), StoreError> {
        if let HandleState::Writing(file) = std::mem::replace(&mut self.state, HandleState::Idle) {
            file.sync_all()?;
        }
        Ok(())
    }
}

impl fmt::Debug for StoreHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("path", &self.store.path)
            .field("mode", &self.mode())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines_of(text: impl AsRef<[u8]>) -> Vec<Result<TransactionRecord, StoreError>> {
        // Route through a real file so the reader type matches.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, text).unwrap();
        let mut lines = RecordLines {
            lines: BufReader::new(File::open(&path).unwrap()).split(b'\n'),
            line_no: 0,
        };
        std::iter::from_fn(|| lines.next_record()).collect()
    }

    #[test]
    fn blank_lines_are_skipped_and_counted() {
        let text = "\n{\"id\":\"a\",\"description\":\"d\",\"date\":\"2023-01-02\",\"amount\":1.5}\n\n{oops\n";
        let results = lines_of(text);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().id, "a");
        match &results[1] {
            Err(StoreError::Decode { line, .. }) => assert_eq!(*line, 4),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn last_line_without_newline_is_read() {
        let text = concat!(
            r#"{"id":"a","description":"d","date":"2023-01-02","amount":1}"#,
            "\n",
            r#"{"id":"b","description":"d","date":"2023-01-03","amount":2}"#,
        );
        let ids: Vec<_> = lines_of(text).into_iter().map(|r| r.unwrap().id).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn invalid_utf8_is_a_decode_error() {
        let mut text = br#"{"id":"a","description":"d","date":"2023-01-02","amount":1}"#.to_vec();
        text.extend_from_slice(b"\n{\"id\":\"\xff\"}\n");
        let results = lines_of(text);
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        match &results[1] {
            Err(StoreError::Decode { line, .. }) => assert_eq!(*line, 2),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn crlf_line_endings_are_tolerated() {
        let text = concat!(
            r#"{"id":"a","description":"d","date":"2023-01-02","amount":1}"#,
            "\r\n\r\n",
        );
        let ids: Vec<_> = lines_of(text).into_iter().map(|r| r.unwrap().id).collect();
        assert_eq!(ids, ["a"]);
    }
}
