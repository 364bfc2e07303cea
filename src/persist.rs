//! Persistence engine: background load and save of the preference file.
//!
//! - One read task runs at startup (`NotStarted -> Reading -> Done`).
//! - One writer worker drains save requests (`Idle -> Writing -> Idle`).
//! - Both hold the storage mutex, so a read never overlaps a write.
//! - The load phase doubles as the "initial load done" rendezvous; no write
//!   starts before it reaches `Done`.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ErrorStatus, PreferencesError, Result};
use crate::format;
use crate::storage::Storage;
use crate::store::PreferenceStore;

/// Progress of the initial load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    NotStarted,
    Reading,
    Done,
}

/// Whether a write is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    Idle,
    Writing,
}

/// Who asked for a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOrigin {
    /// `Preferences::save`.
    Local,
    /// The control key in the live table.
    Remote,
}

/// A queued save.
#[derive(Debug)]
pub struct SaveRequest {
    pub origin: SaveOrigin,
    reply: oneshot::Sender<Result<()>>,
}

/// Completion of one save.
///
/// Await [`SaveHandle::wait`] for the outcome, or drop the handle to let the
/// save finish in the background.
#[derive(Debug)]
pub struct SaveHandle {
    rx: oneshot::Receiver<Result<()>>,
}

impl SaveHandle {
    /// Wait for the write to finish.
    pub async fn wait(self) -> Result<()> {
        self.rx.await.unwrap_or(Err(PreferencesError::WorkerStopped))
    }
}

/// Sending side of the writer worker's queue.
#[derive(Debug, Clone)]
pub struct SaveQueue {
    tx: mpsc::UnboundedSender<SaveRequest>,
}

impl SaveQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SaveRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a save. Never blocks.
    pub fn request(&self, origin: SaveOrigin) -> SaveHandle {
        let (reply, rx) = oneshot::channel();
        // A closed queue drops `reply`, which surfaces as WorkerStopped.
        let _ = self.tx.send(SaveRequest { origin, reply });
        SaveHandle { rx }
    }
}

/// Owns all access to the storage medium.
pub struct PersistenceEngine {
    storage: Arc<dyn Storage>,
    file_lock: tokio::sync::Mutex<()>,
    load: watch::Sender<LoadPhase>,
    write: watch::Sender<WritePhase>,
    writes_completed: AtomicU64,
    errors: Arc<ErrorStatus>,
}

impl PersistenceEngine {
    pub fn new(storage: Arc<dyn Storage>, errors: Arc<ErrorStatus>) -> Self {
        let (load, _) = watch::channel(LoadPhase::NotStarted);
        let (write, _) = watch::channel(WritePhase::Idle);
        Self {
            storage,
            file_lock: tokio::sync::Mutex::new(()),
            load,
            write,
            writes_completed: AtomicU64::new(0),
            errors,
        }
    }

    pub fn load_phase(&self) -> LoadPhase {
        *self.load.borrow()
    }

    pub fn write_phase(&self) -> WritePhase {
        *self.write.borrow()
    }

    /// Number of writes that reached the storage medium.
    pub fn writes_completed(&self) -> u64 {
        self.writes_completed.load(Ordering::SeqCst)
    }

    /// Resolve once the initial load has finished.
    pub async fn wait_loaded(&self) {
        let mut rx = self.load.subscribe();
        while *rx.borrow_and_update() != LoadPhase::Done {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Start the read task. Call once.
    pub fn spawn_load(self: &Arc<Self>, state: Arc<Mutex<PreferenceStore>>) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move { engine.load_into(&state).await })
    }

    async fn load_into(&self, state: &Mutex<PreferenceStore>) {
        self.load.send_replace(LoadPhase::Reading);
        let guard = self.file_lock.lock().await;

        match self.storage.load().await {
            Ok(Some(contents)) => {
                let parsed = format::parse(&contents);
                if !parsed.skipped.is_empty() {
                    warn!(lines = ?parsed.skipped, "Skipped malformed preference lines");
                }
                info!(
                    entries = parsed.store.len(),
                    "Loaded preferences from {}",
                    self.storage.describe()
                );
                *state.lock() = parsed.store;
            }
            Ok(None) => {
                info!("No preferences at {}, starting empty", self.storage.describe());
            }
            Err(err) => {
                warn!(error = %err, "Could not read {}, starting empty", self.storage.describe());
            }
        }

        drop(guard);
        self.load.send_replace(LoadPhase::Done);
    }

    /// Write the current state, replacing the stored document.
    ///
    /// Failures are reported to the shared [`ErrorStatus`] and returned.
    pub async fn write(&self, state: &Mutex<PreferenceStore>) -> Result<()> {
        self.wait_loaded().await;
        let _guard = self.file_lock.lock().await;
        self.write.send_replace(WritePhase::Writing);

        let contents = format::serialize(&state.lock());
        let result = self.storage.store(&contents).await;

        self.write.send_replace(WritePhase::Idle);
        match &result {
            Ok(()) => {
                self.writes_completed.fetch_add(1, Ordering::SeqCst);
                info!(bytes = contents.len(), "Saved preferences to {}", self.storage.describe());
            }
            Err(err) => self.errors.report("save", err),
        }
        result
    }

    /// Start the writer worker. Each request gets exactly one write.
    ///
    /// `before_write` runs for every request as it is dequeued, before the
    /// snapshot is taken. The worker stops once every [`SaveQueue`] is gone.
    pub fn spawn_writer<F>(
        self: &Arc<Self>,
        state: Arc<Mutex<PreferenceStore>>,
        mut requests: mpsc::UnboundedReceiver<SaveRequest>,
        before_write: F,
    ) -> JoinHandle<()>
    where
        F: Fn(SaveOrigin) + Send + Sync + 'static,
    {
        let engine = self.clone();
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                debug!(origin = ?request.origin, "Save requested");
                before_write(request.origin);
                let result = engine.write(&state).await;
                // Ignore send errors (handle dropped)
                let _ = request.reply.send(result);
            }
            debug!("Save worker stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn engine_with(storage: Arc<MemoryStorage>) -> (Arc<PersistenceEngine>, Arc<ErrorStatus>) {
        let errors = Arc::new(ErrorStatus::new());
        let engine = Arc::new(PersistenceEngine::new(storage, errors.clone()));
        (engine, errors)
    }

    #[tokio::test]
    async fn test_load_populates_state() {
        let storage = Arc::new(MemoryStorage::with_contents("[Preferences]\n; c\na=1\nb=2\n"));
        let (engine, _) = engine_with(storage);
        let state = Arc::new(Mutex::new(PreferenceStore::new()));

        assert_eq!(engine.load_phase(), LoadPhase::NotStarted);
        engine.spawn_load(state.clone());
        engine.wait_loaded().await;

        assert_eq!(engine.load_phase(), LoadPhase::Done);
        let state = state.lock();
        assert_eq!(state.keys(), ["a", "b"]);
        assert_eq!(state.comment("a"), Some("; c\n"));
    }

    #[tokio::test]
    async fn test_load_failure_starts_empty() {
        let storage = Arc::new(MemoryStorage::with_contents("a=1\n"));
        storage.fail_reads(true);
        let (engine, errors) = engine_with(storage);
        let state = Arc::new(Mutex::new(PreferenceStore::new()));

        engine.spawn_load(state.clone());
        engine.wait_loaded().await;

        assert!(state.lock().is_empty());
        assert!(errors.last().is_none());
    }

    #[tokio::test]
    async fn test_write_waits_for_load() {
        let storage = Arc::new(MemoryStorage::new());
        let (engine, _) = engine_with(storage.clone());
        let state = Arc::new(Mutex::new(PreferenceStore::new()));
        state.lock().insert("a", "1");

        let writer = {
            let engine = engine.clone();
            let state = state.clone();
            tokio::spawn(async move { engine.write(&state).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(storage.writes(), 0);

        engine.spawn_load(state.clone());
        writer.await.unwrap().unwrap();
        assert_eq!(storage.writes(), 1);
        assert_eq!(engine.write_phase(), WritePhase::Idle);
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let storage = Arc::new(MemoryStorage::new());
        storage.fail_writes(true);
        let (engine, errors) = engine_with(storage);
        let state = Arc::new(Mutex::new(PreferenceStore::new()));
        engine.spawn_load(state.clone());

        let err = engine.write(&state).await.unwrap_err();
        assert!(err.is_storage());
        assert_eq!(errors.last().unwrap().context, "save");
        assert_eq!(engine.writes_completed(), 0);
    }

    #[tokio::test]
    async fn test_every_request_is_written() {
        let storage = Arc::new(MemoryStorage::new());
        let (engine, _) = engine_with(storage.clone());
        let state = Arc::new(Mutex::new(PreferenceStore::new()));
        let (queue, requests) = SaveQueue::new();

        engine.spawn_load(state.clone());
        engine.spawn_writer(state.clone(), requests, |_| {});

        let handles: Vec<_> = (0..5).map(|_| queue.request(SaveOrigin::Local)).collect();
        for handle in handles {
            handle.wait().await.unwrap();
        }
        assert_eq!(storage.writes(), 5);
        assert_eq!(engine.writes_completed(), 5);
    }

    #[tokio::test]
    async fn test_hook_runs_before_each_write() {
        let storage = Arc::new(MemoryStorage::new());
        let (engine, _) = engine_with(storage.clone());
        let state = Arc::new(Mutex::new(PreferenceStore::new()));
        let (queue, requests) = SaveQueue::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        engine.spawn_load(state.clone());
        let (hook_storage, hook_seen) = (storage.clone(), seen.clone());
        engine.spawn_writer(state, requests, move |origin| {
            hook_seen.lock().push((origin, hook_storage.writes()));
        });

        queue.request(SaveOrigin::Remote).wait().await.unwrap();
        queue.request(SaveOrigin::Local).wait().await.unwrap();
        assert_eq!(
            *seen.lock(),
            vec![(SaveOrigin::Remote, 0), (SaveOrigin::Local, 1)]
        );
    }

    #[tokio::test]
    async fn test_worker_stops_when_queue_is_dropped() {
        let (engine, _) = engine_with(Arc::new(MemoryStorage::new()));
        let state = Arc::new(Mutex::new(PreferenceStore::new()));
        let (queue, requests) = SaveQueue::new();

        engine.spawn_load(state.clone());
        let worker = engine.spawn_writer(state, requests, |_| {});
        drop(queue);

        tokio::time::timeout(std::time::Duration::from_secs(2), worker)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_closed_queue_reports_stopped() {
        let (queue, requests) = SaveQueue::new();
        drop(requests);

        let result = queue.request(SaveOrigin::Local).wait().await;
        assert!(matches!(result, Err(PreferencesError::WorkerStopped)));
    }
}
