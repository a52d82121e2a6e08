//! Cached, filesystem-derived tag index.
//!
//! The index keeps one [`TagIndexSnapshot`] per scan root. Readers always get
//! a whole snapshot (old or new, never partial). A snapshot older than the
//! freshness window is still served while a background rebuild replaces it,
//! and at most one background rebuild runs at a time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, info, warn};

use reelkeep_core::tags::extract_tags;
use reelkeep_core::{
    LibraryConfig, LibraryError, MediaEntry, MediaFilter, Result, TagIndexSnapshot, clean_absolute,
};

use crate::walker::MediaWalker;

/// Point-in-time view of the index without triggering a build.
#[derive(Debug, Clone)]
pub struct TagIndexStatus {
    /// A background rebuild is in flight.
    pub building: bool,
    /// Message of the last failed background rebuild.
    pub last_error: Option<String>,
    /// The cached snapshot, if any build has succeeded.
    pub snapshot: Option<Arc<TagIndexSnapshot>>,
}

/// Tag index service. Cheap to clone; clones share one cache.
#[derive(Debug, Clone)]
pub struct TagIndex {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    media_root: PathBuf,
    tag_root: PathBuf,
    freshness: Duration,
    walker: MediaWalker,
    /// Cache map, in-flight flag and last error share this lock.
    state: Mutex<IndexState>,
    /// Serializes the builds themselves.
    build_lock: Mutex<()>,
    rebuilds: AtomicU64,
}

#[derive(Debug, Default)]
struct IndexState {
    cache: HashMap<PathBuf, Cached>,
    building: bool,
    last_error: Option<String>,
}

#[derive(Debug)]
struct Cached {
    snapshot: Arc<TagIndexSnapshot>,
    built: Instant,
}

impl TagIndex {
    /// Create an index over `tag_root`, reporting paths relative to `media_root`.
    pub fn new(
        media_root: impl Into<PathBuf>,
        tag_root: impl Into<PathBuf>,
        filter: MediaFilter,
        freshness: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                media_root: media_root.into(),
                tag_root: tag_root.into(),
                freshness,
                walker: MediaWalker::new(filter),
                state: Mutex::new(IndexState::default()),
                build_lock: Mutex::new(()),
                rebuilds: AtomicU64::new(0),
            }),
        }
    }

    pub fn from_config(config: &LibraryConfig) -> Self {
        Self::new(
            &config.media_root,
            config.tag_root(),
            MediaFilter::from_config(config),
            config.tag_freshness(),
        )
    }

    /// Get the current snapshot.
    ///
    /// A fresh cached snapshot is returned as is unless `refresh` is set.
    /// A stale one (or any one, with `refresh`) is returned immediately while
    /// a background rebuild is started. With nothing cached, the first build
    /// runs on the calling thread.
    pub fn get(&self, refresh: bool) -> Result<Arc<TagIndexSnapshot>> {
        let root = self.resolve_root()?;

        let served = {
            let state = self.inner.lock_state();
            state.cache.get(&root).map(|cached| {
                let fresh = cached.built.elapsed() < self.inner.freshness;
                (Arc::clone(&cached.snapshot), fresh)
            })
        };

        match served {
            Some((snapshot, true)) if !refresh => Ok(snapshot),
            Some((snapshot, _)) => {
                self.trigger_rebuild();
                Ok(snapshot)
            }
            None => self.build_and_store(&root, true),
        }
    }

    /// Rebuild on the calling thread and return the new snapshot.
    pub fn refresh_now(&self) -> Result<Arc<TagIndexSnapshot>> {
        let root = self.resolve_root()?;
        self.build_and_store(&root, false)
    }

    /// Start a background rebuild unless one is already running.
    ///
    /// Returns `true` if this call started the rebuild. Callers never wait.
    pub fn trigger_rebuild(&self) -> bool {
        {
            let mut state = self.inner.lock_state();
            if state.building {
                return false;
            }
            state.building = true;
            state.last_error = None;
        }

        let index = self.clone();
        let job = move || index.run_background_rebuild();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(job);
            }
            Err(_) => {
                std::thread::spawn(job);
            }
        }
        true
    }

    /// Current state without building anything.
    pub fn status(&self) -> TagIndexStatus {
        let root = clean_absolute(&self.inner.tag_root).ok();
        let state = self.inner.lock_state();
        TagIndexStatus {
            building: state.building,
            last_error: state.last_error.clone(),
            snapshot: root
                .and_then(|r| state.cache.get(&r))
                .map(|c| Arc::clone(&c.snapshot)),
        }
    }

    /// Number of builds completed since creation.
    pub fn rebuild_count(&self) -> u64 {
        self.inner.rebuilds.load(Ordering::Acquire)
    }

    /// Validate the configured roots and return the absolute tag root.
    fn resolve_root(&self) -> Result<PathBuf> {
        let media = clean_absolute(&self.inner.media_root)?;
        let tag = clean_absolute(&self.inner.tag_root)?;
        if !tag.starts_with(&media) {
            return Err(LibraryError::invalid_config(format!(
                "tag root {} is outside media root {}",
                tag.display(),
                media.display()
            )));
        }
        if !tag.is_dir() {
            return Err(LibraryError::not_found(format!("tag root {}", tag.display())));
        }
        Ok(tag)
    }

    fn build_and_store(&self, root: &Path, reuse_existing: bool) -> Result<Arc<TagIndexSnapshot>> {
        let _build = self
            .inner
            .build_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if reuse_existing {
            // Another caller may have finished the first build while we waited.
            let state = self.inner.lock_state();
            if let Some(cached) = state.cache.get(root) {
                return Ok(Arc::clone(&cached.snapshot));
            }
        }

        let started = Instant::now();
        let snapshot = Arc::new(self.build(root)?);
        self.inner.rebuilds.fetch_add(1, Ordering::AcqRel);
        info!(
            root = %root.display(),
            entries = snapshot.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tag index built"
        );

        let mut state = self.inner.lock_state();
        state.cache.insert(
            root.to_path_buf(),
            Cached {
                snapshot: Arc::clone(&snapshot),
                built: Instant::now(),
            },
        );
        Ok(snapshot)
    }

    fn build(&self, root: &Path) -> Result<TagIndexSnapshot> {
        let media = clean_absolute(&self.inner.media_root)?;
        let outcome = self.inner.walker.walk(root, &media, |p| {
            debug!(dirs = p.dirs_visited, files = p.files_seen, "tag index walk");
        })?;

        let mut entries: Vec<MediaEntry> = outcome
            .files
            .into_iter()
            .map(|f| MediaEntry {
                tags: extract_tags(&f.name),
                name: f.name.into(),
                path: f.rel_path,
                size_bytes: f.size_bytes,
            })
            .collect();
        entries.sort_by_cached_key(|e| e.path.to_lowercase());

        Ok(TagIndexSnapshot {
            root: root.to_path_buf(),
            built_at: SystemTime::now(),
            entries,
        })
    }

    fn run_background_rebuild(&self) {
        let _building = BuildingFlag(&self.inner);
        let result = self
            .resolve_root()
            .and_then(|root| self.build_and_store(&root, false));
        if let Err(err) = result {
            warn!(error = %err, "tag index rebuild failed; keeping previous snapshot");
            self.inner.lock_state().last_error = Some(err.to_string());
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, IndexState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the in-flight flag when a background rebuild ends, even by panic.
struct BuildingFlag<'a>(&'a Inner);

impl Drop for BuildingFlag<'_> {
    fn drop(&mut self) {
        self.0.lock_state().building = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_library() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("tagged/sub")).unwrap();
        fs::write(root.join("tagged/B clip [goal].mp4"), "b").unwrap();
        fs::write(root.join("tagged/sub/a clip [save fast].mov"), "a").unwrap();
        fs::write(root.join("tagged/readme.txt"), "x").unwrap();
        fs::write(root.join("outside.mp4"), "o").unwrap();
        temp
    }

    fn index(temp: &TempDir, freshness: Duration) -> TagIndex {
        TagIndex::new(
            temp.path(),
            temp.path().join("tagged"),
            MediaFilter::default(),
            freshness,
        )
    }

    fn wait_idle(index: &TagIndex) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while index.status().building {
            assert!(Instant::now() < deadline, "rebuild never finished");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_first_get_builds_synchronously() {
        let temp = create_library();
        let index = index(&temp, Duration::from_secs(30));

        let snap = index.get(false).unwrap();
        let paths: Vec<_> = snap.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["tagged/B clip [goal].mp4", "tagged/sub/a clip [save fast].mov"]
        );
        assert_eq!(snap.entries[1].tags.as_slice(), ["save", "fast"]);
        assert_eq!(index.rebuild_count(), 1);
    }

    #[test]
    fn test_fresh_snapshot_is_reused() {
        let temp = create_library();
        let index = index(&temp, Duration::from_secs(30));

        let first = index.get(false).unwrap();
        let second = index.get(false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(index.rebuild_count(), 1);
        assert!(!index.status().building);
    }

    #[test]
    fn test_stale_snapshot_served_while_rebuilding() {
        let temp = create_library();
        let index = index(&temp, Duration::from_millis(50));

        let first = index.get(false).unwrap();
        std::thread::sleep(Duration::from_millis(80));
        fs::write(temp.path().join("tagged/new [extra].mp4"), "n").unwrap();

        let stale = index.get(false).unwrap();
        assert!(Arc::ptr_eq(&first, &stale));

        wait_idle(&index);
        assert_eq!(index.rebuild_count(), 2);
        let rebuilt = index.get(false).unwrap();
        assert_eq!(rebuilt.len(), 3);
    }

    #[test]
    fn test_concurrent_refresh_is_single_flight() {
        let temp = create_library();
        let index = index(&temp, Duration::from_secs(30));
        let first = index.get(false).unwrap();

        let build_gate = index.inner.build_lock.lock().unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let index = index.clone();
                std::thread::spawn(move || index.get(true).unwrap())
            })
            .collect();
        for handle in handles {
            let served = handle.join().unwrap();
            assert!(Arc::ptr_eq(&first, &served));
        }
        assert!(index.status().building);
        drop(build_gate);

        wait_idle(&index);
        assert_eq!(index.rebuild_count(), 2);
    }

    #[test]
    fn test_tag_root_outside_media_root() {
        let temp = create_library();
        let other = TempDir::new().unwrap();
        let index = TagIndex::new(
            temp.path().join("tagged"),
            other.path(),
            MediaFilter::default(),
            Duration::from_secs(30),
        );

        let err = index.get(false).unwrap_err();
        assert_eq!(err.kind(), reelkeep_core::ErrorKind::InvalidConfig);
    }

    #[test]
    fn test_failed_rebuild_keeps_snapshot() {
        let temp = create_library();
        let index = index(&temp, Duration::from_secs(30));
        index.get(false).unwrap();

        fs::remove_dir_all(temp.path().join("tagged")).unwrap();
        assert!(index.trigger_rebuild());
        wait_idle(&index);

        let status = index.status();
        assert!(status.last_error.is_some());
        assert_eq!(status.snapshot.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rebuild_on_runtime_worker() {
        let temp = create_library();
        let index = index(&temp, Duration::from_secs(30));
        index.get(false).unwrap();

        fs::write(temp.path().join("tagged/late [x].webm"), "l").unwrap();
        assert!(index.trigger_rebuild());

        let waiter = index.clone();
        tokio::time::timeout(Duration::from_secs(10), async move {
            while waiter.status().building {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("rebuild stuck");

        assert_eq!(index.get(false).unwrap().len(), 3);
    }
}
