//! Bet Persistence
//!
//! The protocol layer only depends on the [`BetStore`] trait: an append
//! operation and a full scan. Two implementations are provided:
//!
//! - [`MemoryBetStore`]: a `RwLock<Vec<Bet>>`, used by tests and embedders
//! - [`FileBetStore`]: an append-only file with one JSON object per line
//!
//! Both preserve insertion order on `load()`.

use crate::storage::Bet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;
use tracing::{debug, trace};

/// Default location of the bets file.
pub const DEFAULT_STORAGE_PATH: &str = "./bets.jsonl";

/// Errors raised by a bet store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt record at line {line} of '{path}': {source}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode bet: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

/// The persistence collaborator.
///
/// `store` takes ownership of the bets: once handed over, the protocol
/// layer keeps no copy of them.
pub trait BetStore: Send + Sync {
    /// Appends bets to the store.
    ///
    /// An error means the batch may not have been persisted. File-backed
    /// stores can be left with a truncated trailing line, which `load`
    /// reports as corrupt.
    fn store(&self, bets: Vec<Bet>) -> Result<(), StoreError>;

    /// Returns every stored bet in insertion order.
    fn load(&self) -> Result<Vec<Bet>, StoreError>;
}

/// An in-memory bet store.
#[derive(Debug, Default)]
pub struct MemoryBetStore {
    bets: RwLock<Vec<Bet>>,
}

impl MemoryBetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bets stored so far.
    pub fn len(&self) -> usize {
        self.bets.read().map(|bets| bets.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BetStore for MemoryBetStore {
    fn store(&self, bets: Vec<Bet>) -> Result<(), StoreError> {
        let mut guard = self.bets.write().map_err(|_| StoreError::Poisoned)?;
        guard.extend(bets);
        Ok(())
    }

    fn load(&self) -> Result<Vec<Bet>, StoreError> {
        let guard = self.bets.read().map_err(|_| StoreError::Poisoned)?;
        Ok(guard.clone())
    }
}

/// An append-only, line-delimited JSON bet store.
#[derive(Debug, Clone)]
pub struct FileBetStore {
    path: PathBuf,
}

impl FileBetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl BetStore for FileBetStore {
    fn store(&self, bets: Vec<Bet>) -> Result<(), StoreError> {
        // Encode everything first so a bad record never leaves a partial batch.
        let mut encoded = Vec::with_capacity(bets.len() * 96);
        for bet in &bets {
            serde_json::to_writer(&mut encoded, bet)?;
            encoded.push(b'\n');
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;

        let mut writer = BufWriter::new(file);
        writer.write_all(&encoded).map_err(|e| self.io_error(e))?;
        writer.flush().map_err(|e| self.io_error(e))?;

        debug!(path = %self.path.display(), count = bets.len(), "Bets appended");
        Ok(())
    }

    fn load(&self) -> Result<Vec<Bet>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            // Nothing has been stored yet
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        let mut bets = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| self.io_error(e))?;
            if line.trim().is_empty() {
                continue;
            }
            let bet = serde_json::from_str(&line).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                line: index + 1,
                source,
            })?;
            bets.push(bet);
        }

        trace!(path = %self.path.display(), count = bets.len(), "Bets loaded");
        Ok(bets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_FILE: AtomicUsize = AtomicUsize::new(0);

    /// A per-test file path that is removed when dropped.
    struct ScratchFile(PathBuf);

    impl ScratchFile {
        fn new() -> Self {
            let n = NEXT_FILE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "betrelay-store-{}-{}.jsonl",
                std::process::id(),
                n
            ));
            let _ = std::fs::remove_file(&path);
            Self(path)
        }
    }

    impl Drop for ScratchFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    fn bet(agency: u32, document: &str, number: u32) -> Bet {
        Bet::new(
            document,
            format!("first_{}", agency),
            format!("last_{}", agency),
            agency,
            number,
            NaiveDate::from_ymd_opt(2000, 12, 20).unwrap(),
        )
    }

    #[test]
    fn test_memory_store_appends() {
        let store = MemoryBetStore::new();
        assert!(store.is_empty());

        store.store(vec![bet(1, "1", 10)]).unwrap();
        store.store(vec![bet(2, "2", 20), bet(3, "3", 30)]).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(loaded[0].document_id(), "1");
        assert_eq!(loaded[2].document_id(), "3");
    }

    #[test]
    fn test_file_store_load_missing_file() {
        let scratch = ScratchFile::new();
        let store = FileBetStore::new(&scratch.0);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_file_store_keeps_fields() {
        let scratch = ScratchFile::new();
        let store = FileBetStore::new(&scratch.0);

        let original = bet(1, "10000000", 7500);
        store.store(vec![original.clone()]).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, vec![original]);
    }

    #[test]
    fn test_file_store_keeps_order_across_batches() {
        let scratch = ScratchFile::new();
        let store = FileBetStore::new(&scratch.0);

        store.store(vec![bet(0, "10000000", 7500)]).unwrap();
        store
            .store(vec![bet(1, "10000001", 7501), bet(2, "10000002", 7502)])
            .unwrap();

        let documents: Vec<_> = store
            .load()
            .unwrap()
            .iter()
            .map(|b| b.document_id().to_string())
            .collect();
        assert_eq!(documents, vec!["10000000", "10000001", "10000002"]);
    }

    #[test]
    fn test_file_store_reports_corrupt_line() {
        let scratch = ScratchFile::new();
        std::fs::write(&scratch.0, "not json\n").unwrap();

        let store = FileBetStore::new(&scratch.0);
        match store.load() {
            Err(StoreError::Corrupt { line, .. }) => assert_eq!(line, 1),
            other => panic!("expected corrupt error, got {:?}", other),
        }
    }

    #[test]
    fn test_file_store_truncated_append_is_reported() {
        let scratch = ScratchFile::new();
        let store = FileBetStore::new(&scratch.0);
        store.store(vec![bet(1, "10000000", 7500)]).unwrap();

        // A write cut short leaves half a record at the end of the file
        let mut contents = std::fs::read(&scratch.0).unwrap();
        let mut partial = contents.clone();
        partial.truncate(partial.len() / 2);
        contents.extend_from_slice(&partial);
        std::fs::write(&scratch.0, contents).unwrap();

        match store.load() {
            Err(StoreError::Corrupt { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected corrupt error, got {:?}", other),
        }
    }
}
