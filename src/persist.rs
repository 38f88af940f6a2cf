//! Debounced persistence of a shared [`TrackLog`].
//!
//! Each generation of the log lives in its own file. An [`AutoSaver`] task
//! watches the log's revision, waits for a quiet period, then snapshots the log
//! under its lock and writes the snapshot on the blocking pool.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

use crate::config::TrackerConfig;
use crate::error::{Result, TrackLogError};
use crate::options::{MissingTimePolicy, ParseOptions};
use crate::parser;
use crate::session::TrackLog;

pub type SharedTrackLog = Arc<Mutex<TrackLog>>;

/// Locks the log, ignoring poisoning from a panicked observer.
pub fn lock_log(shared: &SharedTrackLog) -> MutexGuard<'_, TrackLog> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Where serialized generations of the log are kept.
pub trait GpxStore: Send + Sync + 'static {
    fn save(&self, generation: u64, xml: &str) -> Result<()>;

    /// `None` if nothing was saved for `generation`.
    fn load(&self, generation: u64) -> Result<Option<String>>;

    /// Highest generation present, if the store can tell.
    fn latest_generation(&self) -> Result<Option<u64>> {
        Ok(None)
    }
}

/// One `{prefix}-{generation}.gpx` file per generation in `dir`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    prefix: String,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn from_config(dir: impl Into<PathBuf>, config: &TrackerConfig) -> Self {
        Self::new(dir, config.file_prefix.clone())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, generation: u64) -> PathBuf {
        self.dir.join(format!("{}-{generation}.gpx", self.prefix))
    }

    fn generation_of(&self, file_name: &str) -> Option<u64> {
        file_name
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('-')?
            .strip_suffix(".gpx")?
            .parse()
            .ok()
    }
}

impl GpxStore for FileStore {
    fn save(&self, generation: u64, xml: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(generation);
        let tmp = path.with_extension("gpx.tmp");
        fs::write(&tmp, xml)?;
        fs::rename(&tmp, &path)?;
        tracing::debug!(path = %path.display(), bytes = xml.len(), "track log written");
        Ok(())
    }

    fn load(&self, generation: u64) -> Result<Option<String>> {
        match fs::read_to_string(self.path(generation)) {
            Ok(xml) => Ok(Some(xml)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn latest_generation(&self) -> Result<Option<u64>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut latest = None;
        for entry in entries {
            let name = entry?.file_name();
            if let Some(generation) = name.to_str().and_then(|n| self.generation_of(n)) {
                latest = latest.max(Some(generation));
            }
        }
        Ok(latest)
    }
}

/// Loads the newest stored generation into `shared`.
///
/// Reading and parsing happen without the lock; the swap is a single step.
/// Returns `false` if the store holds nothing. On error the log is untouched.
/// Points without a timestamp are skipped rather than failing the restore.
pub fn load_latest(shared: &SharedTrackLog, store: &dyn GpxStore) -> Result<bool> {
    let generation = match store.latest_generation()? {
        Some(generation) => generation,
        None => lock_log(shared).generation(),
    };
    let Some(xml) = store.load(generation)? else {
        return Ok(false);
    };
    let skip = ParseOptions {
        missing_time: MissingTimePolicy::SkipPoint,
    };
    let document = parser::parse_gpx_with(xml.as_bytes(), &skip)?;

    let mut log = lock_log(shared);
    log.set_generation(generation);
    log.load(document);
    Ok(true)
}

struct Saver {
    shared: SharedTrackLog,
    store: Arc<dyn GpxStore>,
    retries: u32,
    backoff: Duration,
    saved_revision: AtomicU64,
    write_lock: tokio::sync::Mutex<()>,
}

impl Saver {
    fn is_dirty(&self) -> bool {
        lock_log(&self.shared).revision() != self.saved_revision.load(Ordering::Acquire)
    }

    async fn save(&self) -> Result<()> {
        let _writing = self.write_lock.lock().await;
        let (generation, revision, xml) = {
            let log = lock_log(&self.shared);
            (log.generation(), log.revision(), log.to_xml()?)
        };
        let xml: Arc<str> = xml.into();

        let mut attempt = 0;
        loop {
            let store = Arc::clone(&self.store);
            let snapshot = Arc::clone(&xml);
            let result = tokio::task::spawn_blocking(move || store.save(generation, &snapshot))
                .await
                .map_err(|e| TrackLogError::Io(std::io::Error::other(e)))
                .and_then(|saved| saved);

            match result {
                Ok(()) => {
                    self.saved_revision.store(revision, Ordering::Release);
                    tracing::debug!(generation, revision, "track log saved");
                    return Ok(());
                }
                Err(e) if attempt < self.retries => {
                    let delay = self.backoff.saturating_mul(2u32.saturating_pow(attempt));
                    tracing::warn!(attempt, ?delay, "saving track log failed, retrying: {e}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(generation, "giving up saving track log: {e}");
                    return Err(e);
                }
            }
        }
    }
}

/// Background task that writes the log after each burst of changes.
///
/// Writes never overlap, whether triggered by the task or by [`save_now`](Self::save_now).
pub struct AutoSaver {
    saver: Arc<Saver>,
    stop: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl AutoSaver {
    /// Must be called from within a tokio runtime.
    pub fn spawn(shared: SharedTrackLog, store: Arc<dyn GpxStore>, config: &TrackerConfig) -> Self {
        let (saved_revision, rx) = {
            let mut log = lock_log(&shared);
            let (tx, rx) = watch::channel(log.revision());
            log.set_change_listener(Box::new(move |revision| {
                tx.send_replace(revision);
            }));
            (log.revision(), rx)
        };

        let saver = Arc::new(Saver {
            shared,
            store,
            retries: config.save_retries,
            backoff: config.retry_backoff(),
            saved_revision: AtomicU64::new(saved_revision),
            write_lock: tokio::sync::Mutex::new(()),
        });
        let stop = Arc::new(Notify::new());
        let task = tokio::spawn(run(
            Arc::clone(&saver),
            rx,
            Arc::clone(&stop),
            config.debounce(),
        ));

        Self {
            saver,
            stop,
            task: Some(task),
        }
    }

    /// Writes the current log immediately.
    pub async fn save_now(&self) -> Result<()> {
        self.saver.save().await
    }

    /// Stops the task, writing any change it had not saved yet.
    pub async fn shutdown(mut self) -> Result<()> {
        self.stop.notify_one();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("autosave task ended abnormally: {e}");
            }
        }
        if self.saver.is_dirty() {
            self.saver.save().await?;
        }
        Ok(())
    }
}

impl Drop for AutoSaver {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(saver: Arc<Saver>, mut changes: watch::Receiver<u64>, stop: Arc<Notify>, debounce: Duration) {
    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            _ = stop.notified() => return,
        }

        // The window opens at the first change and is not extended by later
        // ones, so a steady stream of fixes still gets written.
        tokio::select! {
            _ = tokio::time::sleep(debounce) => {}
            _ = stop.notified() => return,
        }
        changes.borrow_and_update();
        if !saver.is_dirty() {
            continue;
        }

        if let Err(e) = saver.save().await {
            tracing::error!("autosave failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;
    use crate::gpx_types::TrackPoint;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::AtomicUsize;

    fn pt(secs: i64) -> TrackPoint {
        TrackPoint::new(
            Coordinate::new(59.0 + secs as f64 * 1e-4, 18.0),
            Some(Utc.timestamp_opt(1_500_000_000 + secs, 0).unwrap()),
        )
    }

    #[derive(Default)]
    struct CountingStore {
        attempts: AtomicUsize,
        failures_left: AtomicUsize,
        saved: Mutex<Vec<(u64, String)>>,
    }

    impl CountingStore {
        fn failing(times: usize) -> Self {
            Self {
                failures_left: AtomicUsize::new(times),
                ..Default::default()
            }
        }

        fn saves(&self) -> usize {
            self.saved.lock().unwrap().len()
        }
    }

    impl GpxStore for CountingStore {
        fn save(&self, generation: u64, xml: &str) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(std::io::Error::other("disk full").into());
            }
            self.saved.lock().unwrap().push((generation, xml.to_string()));
            Ok(())
        }

        fn load(&self, generation: u64) -> Result<Option<String>> {
            Ok(self
                .saved
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(g, _)| *g == generation)
                .map(|(_, xml)| xml.clone()))
        }
    }

    fn record_burst(shared: &SharedTrackLog, points: i64) {
        let mut log = lock_log(shared);
        log.start_new_segment();
        for i in 0..points {
            log.handle_fix(pt(i * 20), true);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_written_once() {
        let config = TrackerConfig::default();
        let shared = SharedTrackLog::default();
        let store = Arc::new(CountingStore::default());
        let _saver = AutoSaver::spawn(Arc::clone(&shared), store.clone(), &config);

        record_burst(&shared, 5);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.saves(), 0);

        tokio::time::sleep(config.debounce() * 2).await;
        assert_eq!(store.saves(), 1);
        let (generation, xml) = store.saved.lock().unwrap()[0].clone();
        assert_eq!(generation, 0);
        assert_eq!(xml.matches("<trkpt").count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_fixes_saved_every_window() {
        let config = TrackerConfig::default();
        let shared = SharedTrackLog::default();
        let store = Arc::new(CountingStore::default());
        let _saver = AutoSaver::spawn(Arc::clone(&shared), store.clone(), &config);

        lock_log(&shared).start_new_segment();
        for i in 0..30 {
            lock_log(&shared).handle_fix(pt(i), true);
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        tokio::time::sleep(config.debounce() + Duration::from_secs(1)).await;

        // One save per window, two or three seconds apart depending on
        // whether the next fix lands before or after the write.
        let saves = store.saves();
        assert!((10..=16).contains(&saves), "saves = {saves}");
        let last = store.saved.lock().unwrap().last().unwrap().1.clone();
        assert_eq!(last.matches("<trkpt").count(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_retried_with_backoff() {
        let config = TrackerConfig::default();
        let shared = SharedTrackLog::default();
        let store = Arc::new(CountingStore::failing(2));
        let _saver = AutoSaver::spawn(Arc::clone(&shared), store.clone(), &config);

        record_burst(&shared, 1);
        tokio::time::sleep(config.debounce() + Duration::from_millis(100)).await;
        assert_eq!(store.attempts.load(Ordering::SeqCst), 1);

        tokio::time::sleep(config.retry_backoff() * 4).await;
        assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(store.saves(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_now_gives_up_after_retries() {
        let config = TrackerConfig {
            save_retries: 1,
            ..Default::default()
        };
        let shared = SharedTrackLog::default();
        let store = Arc::new(CountingStore::failing(5));
        let saver = AutoSaver::spawn(Arc::clone(&shared), store.clone(), &config);

        assert!(saver.save_now().await.is_err());
        assert_eq!(store.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_pending_change() {
        let config = TrackerConfig::default();
        let shared = SharedTrackLog::default();
        let store = Arc::new(CountingStore::default());
        let saver = AutoSaver::spawn(Arc::clone(&shared), store.clone(), &config);

        record_burst(&shared, 2);
        saver.shutdown().await.unwrap();
        assert_eq!(store.saves(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_saves_under_new_generation() {
        let config = TrackerConfig::default();
        let shared = SharedTrackLog::default();
        let store = Arc::new(CountingStore::default());
        let saver = AutoSaver::spawn(Arc::clone(&shared), store.clone(), &config);

        record_burst(&shared, 2);
        saver.save_now().await.unwrap();
        lock_log(&shared).clear();
        saver.save_now().await.unwrap();

        let mut generations: Vec<u64> = store.saved.lock().unwrap().iter().map(|(g, _)| *g).collect();
        generations.dedup();
        assert_eq!(generations, vec![0, 1]);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("logs"), "persist");
        assert_eq!(store.load(0).unwrap(), None);
        assert_eq!(store.latest_generation().unwrap(), None);

        store.save(0, "<gpx/>").unwrap();
        store.save(3, "<gpx></gpx>").unwrap();
        store.save(3, "<gpx version=\"1.0\"/>").unwrap();
        assert_eq!(store.load(3).unwrap().as_deref(), Some("<gpx version=\"1.0\"/>"));
        assert_eq!(store.latest_generation().unwrap(), Some(3));
        assert!(store.path(3).ends_with("persist-3.gpx"));

        let config = TrackerConfig {
            file_prefix: "log".to_string(),
            ..Default::default()
        };
        let configured = FileStore::from_config(dir.path(), &config);
        assert!(configured.path(3).ends_with("log-3.gpx"));

        let leftovers = fs::read_dir(store.dir())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_load_latest_swaps_in_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), "persist");
        let source = SharedTrackLog::default();
        record_burst(&source, 3);
        lock_log(&source).store_waypoint(pt(1)).unwrap();
        store.save(2, &lock_log(&source).to_xml().unwrap()).unwrap();

        let shared = SharedTrackLog::default();
        assert!(load_latest(&shared, &store).unwrap());
        let log = lock_log(&shared);
        assert_eq!(log.generation(), 2);
        assert_eq!(log.document().point_count(), 3);
        assert_eq!(log.document().waypoints().len(), 1);
        assert!(!log.is_recording());
    }

    #[test]
    fn test_untimed_fix_not_saved_and_reload_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), "persist");
        let source = SharedTrackLog::default();
        {
            let mut log = lock_log(&source);
            log.start_new_segment();
            log.handle_fix(pt(0), true);
            log.handle_fix(TrackPoint::new(Coordinate::new(59.1, 18.0), None), true);
            log.handle_fix(pt(40), true);
        }
        store.save(0, &lock_log(&source).to_xml().unwrap()).unwrap();

        let shared = SharedTrackLog::default();
        assert!(load_latest(&shared, &store).unwrap());
        assert_eq!(lock_log(&shared).document().point_count(), 2);
    }

    #[test]
    fn test_load_latest_skips_untimed_points_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), "persist");
        let xml = r#"<gpx version="1.0"><trk><trkseg>
            <trkpt lat="59.0" lon="18.0"><time>2017-07-14T02:40:00Z</time></trkpt>
            <trkpt lat="59.1" lon="18.0"></trkpt>
        </trkseg></trk></gpx>"#;
        store.save(0, xml).unwrap();

        let shared = SharedTrackLog::default();
        assert!(load_latest(&shared, &store).unwrap());
        assert_eq!(lock_log(&shared).document().point_count(), 1);
    }

    #[test]
    fn test_load_latest_failure_keeps_log() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), "persist");
        store.save(0, "<gpx><trk><trkseg>").unwrap();

        let shared = SharedTrackLog::default();
        record_burst(&shared, 2);
        let err = load_latest(&shared, &store).unwrap_err();
        assert!(err.is_parse_error());
        assert_eq!(lock_log(&shared).document().point_count(), 2);
    }

    #[test]
    fn test_load_latest_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), "persist");
        let shared = SharedTrackLog::default();
        assert!(!load_latest(&shared, &store).unwrap());
    }
}
