//! The caller-facing preference store.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

use crate::bridge::TableBridge;
use crate::codec::{validate_key, validate_string, validate_text, PreferenceValue};
use crate::config::PreferencesConfig;
use crate::error::{ErrorStatus, ReportedError, Result};
use crate::memory::MemoryTable;
use crate::persist::{LoadPhase, PersistenceEngine, SaveHandle, SaveOrigin, SaveQueue, WritePhase};
use crate::storage::{FileStorage, Storage};
use crate::store::PreferenceStore;
use crate::table::{LiveTable, TableValue};
use crate::watch::{Origin, WatchEvent, WatchSender, WatchStream};

static INSTANCE: OnceCell<Arc<Preferences>> = OnceCell::const_new();

/// Thread-safe persistent preferences, mirrored into a live table.
///
/// Values are kept as canonical text; typed getters fall back to the caller's
/// default when a key is missing or its text does not parse. Reads and writes
/// only touch memory. [`Preferences::save`] hands the write to a background
/// worker, and nothing is saved implicitly.
pub struct Preferences {
    config: PreferencesConfig,
    state: Arc<Mutex<PreferenceStore>>,
    engine: Arc<PersistenceEngine>,
    bridge: Arc<TableBridge>,
    saves: SaveQueue,
    watcher: WatchSender,
    errors: Arc<ErrorStatus>,
}

impl Preferences {
    /// The process-wide instance.
    ///
    /// Opened on first use from [`PreferencesConfig::load`] and mirrored into
    /// an in-process [`MemoryTable`]. Every caller waits for the initial load.
    pub async fn instance() -> Result<Arc<Self>> {
        INSTANCE
            .get_or_try_init(|| async {
                let config = PreferencesConfig::load()?;
                let table: Arc<dyn LiveTable> = MemoryTable::new();
                Self::open(config, table).await
            })
            .await
            .cloned()
    }

    /// Open a store backed by the file named in `config`.
    pub async fn open(config: PreferencesConfig, table: Arc<dyn LiveTable>) -> Result<Arc<Self>> {
        let storage = FileStorage::new(&config.path).with_sync(config.sync_writes);
        Self::open_with_storage(config, Arc::new(storage), table).await
    }

    /// Open a store on any storage medium.
    ///
    /// Returns once the initial load has completed and every entry has been
    /// published to the table.
    pub async fn open_with_storage(
        config: PreferencesConfig,
        storage: Arc<dyn Storage>,
        table: Arc<dyn LiveTable>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let errors = Arc::new(ErrorStatus::new());
        let state = Arc::new(Mutex::new(PreferenceStore::new()));
        let engine = Arc::new(PersistenceEngine::new(storage, errors.clone()));
        let watcher = WatchSender::new(config.event_capacity);
        let (saves, requests) = SaveQueue::new();

        engine.spawn_load(state.clone());
        engine.wait_loaded().await;

        let bridge = TableBridge::new(
            table,
            config.table_name.clone(),
            state.clone(),
            saves.clone(),
            watcher.clone(),
        );
        bridge.attach();

        // Weak, so dropping the store closes the queue and stops the worker.
        let control = Arc::downgrade(&bridge);
        engine.spawn_writer(state.clone(), requests, move |_| {
            if let Some(bridge) = control.upgrade() {
                bridge.clear_save_request();
            }
        });

        info!(
            entries = state.lock().len(),
            table = %config.table_name,
            "Preferences ready"
        );

        Ok(Arc::new(Self {
            config,
            state,
            engine,
            bridge,
            saves,
            watcher,
            errors,
        }))
    }

    pub fn config(&self) -> &PreferencesConfig {
        &self.config
    }

    /// Keys in file/insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.state.lock().keys().to_vec()
    }

    /// Canonical text stored under `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.state.lock().get(key).map(str::to_string)
    }

    /// Canonical text stored under `key`, or `default`.
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Decode the value under `key`, or return `default` if it is missing or
    /// malformed.
    pub fn get_value<T: PreferenceValue>(&self, key: &str, default: T) -> T {
        self.state
            .lock()
            .get(key)
            .and_then(T::decode)
            .unwrap_or(default)
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get_value(key, default.to_string())
    }

    pub fn get_int(&self, key: &str, default: i32) -> i32 {
        self.get_value(key, default)
    }

    pub fn get_double(&self, key: &str, default: f64) -> f64 {
        self.get_value(key, default)
    }

    pub fn get_float(&self, key: &str, default: f32) -> f32 {
        self.get_value(key, default)
    }

    pub fn get_boolean(&self, key: &str, default: bool) -> bool {
        self.get_value(key, default)
    }

    pub fn get_long(&self, key: &str, default: i64) -> i64 {
        self.get_value(key, default)
    }

    /// Store a string. The string may not contain `"` or line breaks.
    pub fn put_string(&self, key: &str, value: &str) -> Result<()> {
        validate_string(key, value)?;
        self.put_text(key, value.to_string().encode())
    }

    pub fn put_int(&self, key: &str, value: i32) -> Result<()> {
        self.put_text(key, value.encode())
    }

    pub fn put_double(&self, key: &str, value: f64) -> Result<()> {
        self.put_text(key, value.encode())
    }

    pub fn put_float(&self, key: &str, value: f32) -> Result<()> {
        self.put_text(key, value.encode())
    }

    pub fn put_boolean(&self, key: &str, value: bool) -> Result<()> {
        self.put_text(key, value.encode())
    }

    pub fn put_long(&self, key: &str, value: i64) -> Result<()> {
        self.put_text(key, value.encode())
    }

    fn put_text(&self, key: &str, text: String) -> Result<()> {
        validate_key(key)?;
        validate_text(key, &text)?;

        let mut state = self.state.lock();
        let old = state.insert(key, text.clone());
        self.bridge.publish(key, TableValue::String(text.clone()));
        self.watcher
            .send(WatchEvent::put(key, old, text, Origin::Local));
        Ok(())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.state.lock().contains_key(key)
    }

    /// Remove a key and its comment. Returns false if it was not present.
    pub fn remove(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        let Some(old) = state.remove(key) else {
            return false;
        };
        self.bridge.publish_removal(key);
        self.watcher
            .send(WatchEvent::removed(key, old, Origin::Local));
        true
    }

    /// Comment text stored above `key` in the file.
    pub fn comment(&self, key: &str) -> Option<String> {
        self.state.lock().comment(key).map(str::to_string)
    }

    /// Queue a write of the current contents.
    ///
    /// Never blocks. Every call results in its own write; failures are also
    /// recorded in [`Preferences::last_error`].
    pub fn save(&self) -> SaveHandle {
        self.saves.request(SaveOrigin::Local)
    }

    /// Changes to keys matching `pattern` (exact, or a prefix ending in `*`).
    pub fn watch(&self, pattern: &str) -> WatchStream {
        self.watcher.subscribe(pattern)
    }

    /// The most recent background failure.
    pub fn last_error(&self) -> Option<ReportedError> {
        self.errors.last()
    }

    pub fn errors(&self) -> &ErrorStatus {
        &self.errors
    }

    pub fn load_phase(&self) -> LoadPhase {
        self.engine.load_phase()
    }

    pub fn write_phase(&self) -> WritePhase {
        self.engine.write_phase()
    }

    /// Number of saves that reached storage.
    pub fn writes_completed(&self) -> u64 {
        self.engine.writes_completed()
    }
}
