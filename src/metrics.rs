//! Per-user usage metrics and the stores that keep them.
//!
//! # Value object
//!
//! [`UserMetrics`] holds, for each [`TransformKind`], how many images were
//! processed with it and how long each one took. The orchestrator never
//! touches a store: it takes a snapshot, records into it, and hands the
//! result back. Stores only ever *merge* such results.
//!
//! # Stores
//!
//! The [`MetricsStore`] trait is the read/merge contract with persistence:
//!
//! - [`snapshot`](MetricsStore::snapshot) reads the current record for an email.
//! - [`merge`](MetricsStore::merge) adds a delta (counts and latencies) to it
//!   as one atomic read-modify-write.
//!
//! Concurrent merges for the same email serialize on a per-email lock, so no
//! increment is ever lost; merges for different emails never contend.
//!
//! | Store | Backing |
//! |---|---|
//! | [`InMemoryMetricsStore`] | `RwLock<HashMap<email, Arc<Mutex<UserMetrics>>>>` |
//! | [`JsonFileMetricsStore`] | in-memory store + JSON document rewritten after each merge |
//!
//! ## JSON document
//!
//! ```json
//! {
//!   "version": 1,
//!   "users": {
//!     "ada@example.com": {
//!       "hist": { "count": 2, "latencies": [{ "secs": 0, "nanos": 1200000 }, ...] },
//!       "cont": { "count": 0, "latencies": [] },
//!       ...
//!     }
//!   }
//! }
//! ```

use crate::imaging::TransformKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use thiserror::Error;

/// Version of the JSON document format.
const DOCUMENT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("metrics document {path} has version {found}, expected {expected}")]
    Version {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
    #[error("metrics lock poisoned for {0}")]
    Poisoned(String),
}

/// Invocation count and per-image latencies for one transform kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KindMetrics {
    pub count: u64,
    pub latencies: Vec<Duration>,
}

impl KindMetrics {
    pub fn mean_latency(&self) -> Option<Duration> {
        let n = u32::try_from(self.latencies.len()).ok().filter(|&n| n > 0)?;
        Some(self.latencies.iter().sum::<Duration>() / n)
    }
}

/// Usage record for one user, one entry per transform kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UserMetrics {
    pub hist: KindMetrics,
    pub cont: KindMetrics,
    pub log: KindMetrics,
    pub rev: KindMetrics,
    pub gamma: KindMetrics,
}

impl UserMetrics {
    pub fn get(&self, kind: TransformKind) -> &KindMetrics {
        match kind {
            TransformKind::HistogramEq => &self.hist,
            TransformKind::ContrastStretching => &self.cont,
            TransformKind::LogCompression => &self.log,
            TransformKind::ReverseVideo => &self.rev,
            TransformKind::GammaCorrection => &self.gamma,
        }
    }

    pub fn get_mut(&mut self, kind: TransformKind) -> &mut KindMetrics {
        match kind {
            TransformKind::HistogramEq => &mut self.hist,
            TransformKind::ContrastStretching => &mut self.cont,
            TransformKind::LogCompression => &mut self.log,
            TransformKind::ReverseVideo => &mut self.rev,
            TransformKind::GammaCorrection => &mut self.gamma,
        }
    }

    /// Count one processed image and its latency.
    pub fn record(&mut self, kind: TransformKind, latency: Duration) {
        let entry = self.get_mut(kind);
        entry.count += 1;
        entry.latencies.push(latency);
    }

    /// Add another record's counts and latencies to this one.
    pub fn merge(&mut self, delta: &UserMetrics) {
        for kind in TransformKind::ALL {
            let add = delta.get(kind);
            let entry = self.get_mut(kind);
            entry.count += add.count;
            entry.latencies.extend_from_slice(&add.latencies);
        }
    }

    pub fn total_count(&self) -> u64 {
        self.iter().map(|(_, m)| m.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.iter()
            .all(|(_, m)| m.count == 0 && m.latencies.is_empty())
    }

    /// Entries in selection priority order.
    pub fn iter(&self) -> impl Iterator<Item = (TransformKind, &KindMetrics)> {
        TransformKind::ALL.into_iter().map(|k| (k, self.get(k)))
    }
}

/// Read/merge contract with the persistence layer, keyed by email.
pub trait MetricsStore: Send + Sync {
    /// Current record for `email`; an unknown email reads as all zeros.
    fn snapshot(&self, email: &str) -> Result<UserMetrics, StoreError>;

    /// Atomically add `delta` to the record for `email`, creating it on
    /// first use. Returns the merged record.
    fn merge(&self, email: &str, delta: &UserMetrics) -> Result<UserMetrics, StoreError>;
}

/// In-memory store with one lock per email.
#[derive(Default)]
pub struct InMemoryMetricsStore {
    users: RwLock<HashMap<String, Arc<Mutex<UserMetrics>>>>,
}

impl InMemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = (String, UserMetrics)>) -> Self {
        let users = records
            .into_iter()
            .map(|(email, metrics)| (email, Arc::new(Mutex::new(metrics))))
            .collect();
        Self {
            users: RwLock::new(users),
        }
    }

    /// Sorted copy of every record.
    pub fn records(&self) -> Result<BTreeMap<String, UserMetrics>, StoreError> {
        let users = self
            .users
            .read()
            .map_err(|_| StoreError::Poisoned("<registry>".into()))?;
        users
            .iter()
            .map(|(email, slot)| {
                let metrics = slot
                    .lock()
                    .map_err(|_| StoreError::Poisoned(email.clone()))?;
                Ok((email.clone(), metrics.clone()))
            })
            .collect()
    }

    fn existing(&self, email: &str) -> Result<Option<Arc<Mutex<UserMetrics>>>, StoreError> {
        let users = self
            .users
            .read()
            .map_err(|_| StoreError::Poisoned("<registry>".into()))?;
        Ok(users.get(email).cloned())
    }

    fn slot(&self, email: &str) -> Result<Arc<Mutex<UserMetrics>>, StoreError> {
        if let Some(slot) = self.existing(email)? {
            return Ok(slot);
        }
        let mut users = self
            .users
            .write()
            .map_err(|_| StoreError::Poisoned("<registry>".into()))?;
        Ok(users.entry(email.to_string()).or_default().clone())
    }
}

impl MetricsStore for InMemoryMetricsStore {
    fn snapshot(&self, email: &str) -> Result<UserMetrics, StoreError> {
        match self.existing(email)? {
            Some(slot) => slot
                .lock()
                .map(|m| m.clone())
                .map_err(|_| StoreError::Poisoned(email.to_string())),
            None => Ok(UserMetrics::default()),
        }
    }

    fn merge(&self, email: &str, delta: &UserMetrics) -> Result<UserMetrics, StoreError> {
        let slot = self.slot(email)?;
        let mut metrics = slot
            .lock()
            .map_err(|_| StoreError::Poisoned(email.to_string()))?;
        metrics.merge(delta);
        Ok(metrics.clone())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MetricsDocument {
    version: u32,
    users: BTreeMap<String, UserMetrics>,
}

/// JSON-file-backed store. The whole document is rewritten after every
/// merge, via a temporary file and a rename.
pub struct JsonFileMetricsStore {
    path: PathBuf,
    inner: InMemoryMetricsStore,
    write_lock: Mutex<()>,
}

impl JsonFileMetricsStore {
    /// Open the document at `path`. A missing file starts an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let inner = match std::fs::read_to_string(&path) {
            Ok(content) => {
                let doc: MetricsDocument = serde_json::from_str(&content)?;
                if doc.version != DOCUMENT_VERSION {
                    return Err(StoreError::Version {
                        path,
                        found: doc.version,
                        expected: DOCUMENT_VERSION,
                    });
                }
                InMemoryMetricsStore::from_records(doc.users)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => InMemoryMetricsStore::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), "Opened metrics store");
        Ok(Self {
            path,
            inner,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> Result<BTreeMap<String, UserMetrics>, StoreError> {
        self.inner.records()
    }

    fn save(&self, users: BTreeMap<String, UserMetrics>) -> Result<(), StoreError> {
        let doc = MetricsDocument {
            version: DOCUMENT_VERSION,
            users,
        };
        let json = serde_json::to_string_pretty(&doc)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl MetricsStore for JsonFileMetricsStore {
    fn snapshot(&self, email: &str) -> Result<UserMetrics, StoreError> {
        self.inner.snapshot(email)
    }

    fn merge(&self, email: &str, delta: &UserMetrics) -> Result<UserMetrics, StoreError> {
        // Writers are serialized, so `inner` cannot move between the read
        // below and the commit. Memory only changes once the file is on disk.
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StoreError::Poisoned(self.path.display().to_string()))?;
        let mut users = self.inner.records()?;
        users.entry(email.to_string()).or_default().merge(delta);
        self.save(users)?;
        self.inner.merge(email, delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn delta(kind: TransformKind, latencies: &[u64]) -> UserMetrics {
        let mut m = UserMetrics::default();
        for &l in latencies {
            m.record(kind, ms(l));
        }
        m
    }

    // =========================================================================
    // UserMetrics
    // =========================================================================

    #[test]
    fn record_increments_count_and_appends_latency() {
        let mut m = UserMetrics::default();
        m.record(TransformKind::ReverseVideo, ms(5));
        m.record(TransformKind::ReverseVideo, ms(7));

        assert_eq!(m.rev.count, 2);
        assert_eq!(m.rev.latencies, vec![ms(5), ms(7)]);
        assert_eq!(m.hist, KindMetrics::default());
        assert_eq!(m.total_count(), 2);
    }

    #[test]
    fn merge_adds_counts_and_keeps_latency_order() {
        let mut base = delta(TransformKind::HistogramEq, &[1]);
        base.merge(&delta(TransformKind::HistogramEq, &[2, 3]));
        base.merge(&delta(TransformKind::GammaCorrection, &[4]));

        assert_eq!(base.hist.count, 3);
        assert_eq!(base.hist.latencies, vec![ms(1), ms(2), ms(3)]);
        assert_eq!(base.gamma.count, 1);
    }

    #[test]
    fn mean_latency() {
        let m = delta(TransformKind::LogCompression, &[10, 20]);
        assert_eq!(m.log.mean_latency(), Some(ms(15)));
        assert_eq!(m.cont.mean_latency(), None);
    }

    #[test]
    fn default_is_empty_for_every_kind() {
        let m = UserMetrics::default();
        assert!(m.is_empty());
        assert_eq!(m.iter().count(), 5);
    }

    #[test]
    fn json_uses_short_kind_keys() {
        let json = serde_json::to_value(UserMetrics::default()).unwrap();
        for key in ["hist", "cont", "log", "rev", "gamma"] {
            assert_eq!(json[key]["count"], 0, "missing {key}");
        }
    }

    // =========================================================================
    // InMemoryMetricsStore
    // =========================================================================

    #[test]
    fn unknown_email_snapshots_as_zero() {
        let store = InMemoryMetricsStore::new();
        assert!(store.snapshot("nobody@example.com").unwrap().is_empty());
        assert!(store.records().unwrap().is_empty());
    }

    #[test]
    fn merge_creates_then_accumulates() {
        let store = InMemoryMetricsStore::new();
        store
            .merge("a@example.com", &delta(TransformKind::ReverseVideo, &[1]))
            .unwrap();
        let merged = store
            .merge("a@example.com", &delta(TransformKind::ReverseVideo, &[2]))
            .unwrap();

        assert_eq!(merged.rev.count, 2);
        assert_eq!(store.snapshot("a@example.com").unwrap(), merged);
        assert!(store.snapshot("b@example.com").unwrap().is_empty());
    }

    #[test]
    fn concurrent_merges_are_not_lost() {
        let store = InMemoryMetricsStore::new();
        std::thread::scope(|s| {
            for i in 0..16 {
                let store = &store;
                s.spawn(move || {
                    let kind = TransformKind::ALL[i % 5];
                    store
                        .merge("busy@example.com", &delta(kind, &[i as u64]))
                        .unwrap();
                });
            }
        });

        let m = store.snapshot("busy@example.com").unwrap();
        assert_eq!(m.total_count(), 16);
        assert_eq!(m.hist.count, 4);
        assert_eq!(m.cont.count, 3);
        let latencies: usize = m.iter().map(|(_, k)| k.latencies.len()).sum();
        assert_eq!(latencies, 16);
    }

    // =========================================================================
    // JsonFileMetricsStore
    // =========================================================================

    #[test]
    fn json_store_missing_file_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let store = JsonFileMetricsStore::open(tmp.path().join("metrics.json")).unwrap();
        assert!(store.records().unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn json_store_persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/metrics.json");

        let store = JsonFileMetricsStore::open(&path).unwrap();
        store
            .merge("a@example.com", &delta(TransformKind::ContrastStretching, &[3, 4]))
            .unwrap();
        drop(store);

        let reopened = JsonFileMetricsStore::open(&path).unwrap();
        let m = reopened.snapshot("a@example.com").unwrap();
        assert_eq!(m.cont.count, 2);
        assert_eq!(m.cont.latencies, vec![ms(3), ms(4)]);
    }

    #[test]
    fn json_store_failed_save_leaves_metrics_untouched() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metrics.json");
        let store = JsonFileMetricsStore::open(&path).unwrap();
        store
            .merge("a@example.com", &delta(TransformKind::GammaCorrection, &[2]))
            .unwrap();

        // A directory in the temp file's place makes the write fail.
        std::fs::create_dir(path.with_extension("json.tmp")).unwrap();
        let result = store.merge("a@example.com", &delta(TransformKind::ReverseVideo, &[5]));
        assert!(matches!(result, Err(StoreError::Io(_))));

        let m = store.snapshot("a@example.com").unwrap();
        assert_eq!(m.rev.count, 0);
        assert_eq!(m.gamma.count, 1);
        assert!(store.snapshot("b@example.com").unwrap().is_empty());

        let on_disk = JsonFileMetricsStore::open(&path).unwrap();
        assert_eq!(on_disk.snapshot("a@example.com").unwrap().rev.count, 0);
    }

    #[test]
    fn json_store_rejects_other_versions() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metrics.json");
        std::fs::write(&path, r#"{"version": 99, "users": {}}"#).unwrap();

        let result = JsonFileMetricsStore::open(&path);
        assert!(matches!(
            result,
            Err(StoreError::Version {
                found: 99,
                expected: 1,
                ..
            })
        ));
    }

    #[test]
    fn json_store_rejects_corrupt_document() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metrics.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            JsonFileMetricsStore::open(&path),
            Err(StoreError::Json(_))
        ));
    }
}
