//! Two-way synchronization between the store and the live table.
//!
//! Outbound: every local put publishes canonical text; a removal publishes the
//! sentinel. Inbound: remote edits are applied to the store without being
//! published back. Notifications caused by our own publishes are recognised
//! and dropped, so nothing loops.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::codec::{validate_key, validate_text, PreferenceValue};
use crate::persist::{SaveOrigin, SaveQueue};
use crate::store::PreferenceStore;
use crate::table::{LiveTable, TableListener, TableValue, ValueKind, SAVE_KEY};
use crate::watch::{Origin, WatchEvent, WatchSender};

/// Publishes this side has made and the table has not yet confirmed.
#[derive(Debug)]
struct Pending {
    latest: TableValue,
    unconfirmed: usize,
}

pub struct TableBridge {
    table: Arc<dyn LiveTable>,
    table_name: String,
    state: Arc<Mutex<PreferenceStore>>,
    pending: Mutex<HashMap<String, Pending>>,
    saves: SaveQueue,
    watcher: WatchSender,
}

impl TableBridge {
    pub fn new(
        table: Arc<dyn LiveTable>,
        table_name: impl Into<String>,
        state: Arc<Mutex<PreferenceStore>>,
        saves: SaveQueue,
        watcher: WatchSender,
    ) -> Arc<Self> {
        Arc::new(Self {
            table,
            table_name: table_name.into(),
            state,
            pending: Mutex::new(HashMap::new()),
            saves,
            watcher,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Publish every entry, clear the control key, and start listening.
    pub fn attach(self: &Arc<Self>) {
        {
            let state = self.state.lock();
            for entry in state.iter() {
                self.publish(entry.key, TableValue::String(entry.value.to_string()));
            }
            debug!(entries = state.len(), table = %self.table_name, "Published store");
        }
        self.table
            .publish(&self.table_name, SAVE_KEY, TableValue::Boolean(false));
        self.table.subscribe(&self.table_name, self.clone());
    }

    /// Publish a value.
    ///
    /// Callers hold the store lock so the table sees writes in store order.
    pub fn publish(&self, key: &str, value: TableValue) {
        {
            let mut pending = self.pending.lock();
            let entry = pending.entry(key.to_string()).or_insert_with(|| Pending {
                latest: value.clone(),
                unconfirmed: 0,
            });
            entry.latest = value.clone();
            entry.unconfirmed += 1;
        }
        debug!(key, value = %value, "Publishing");
        self.table.publish(&self.table_name, key, value);
    }

    /// Publish the sentinel for a removed key.
    pub fn publish_removal(&self, key: &str) {
        self.publish(key, TableValue::sentinel());
    }

    /// Clear the control key as a save starts.
    ///
    /// A trigger set while the write runs is then seen as a new request.
    pub fn clear_save_request(&self) {
        if self.table.get(&self.table_name, SAVE_KEY) == Some(TableValue::Boolean(true)) {
            self.table
                .publish(&self.table_name, SAVE_KEY, TableValue::Boolean(false));
        }
    }

    fn is_echo(&self, key: &str, current: &TableValue) -> bool {
        self.pending
            .lock()
            .get(key)
            .is_some_and(|pending| &pending.latest == current)
    }

    /// Apply the table's current value of `key` to the store.
    ///
    /// Runs under the store lock: local puts update `pending` and the table
    /// under the same lock, so a value matching the latest publish is ours.
    fn apply_remote(&self, key: &str) {
        if let Err(err) = validate_key(key) {
            warn!(error = %err, "Ignoring remote edit");
            return;
        }

        let mut state = self.state.lock();
        let Some(value) = self.table.get(&self.table_name, key) else {
            return;
        };
        if self.is_echo(key, &value) {
            debug!(key, "Ignoring echo of own publish");
            return;
        }

        let event = if value.is_sentinel() {
            match state.remove(key) {
                Some(old) => WatchEvent::removed(key, old, Origin::Remote),
                None => return,
            }
        } else {
            let text = remote_text(&value);
            if let Err(err) = validate_text(key, &text) {
                warn!(error = %err, "Ignoring remote edit");
                return;
            }
            if state.get(key) == Some(text.as_str()) {
                return;
            }
            let old = state.insert(key, text.clone());
            WatchEvent::put(key, old, text, Origin::Remote)
        };

        debug!(key, event_type = ?event.event_type, "Applied remote edit");
        self.watcher.send(event);
    }
}

/// Canonical text for a remote value.
///
/// The file format trims values, so a string with outer whitespace is quoted
/// to survive a save.
fn remote_text(value: &TableValue) -> String {
    match value {
        TableValue::String(text) if text.trim() != text => text.encode(),
        other => other.to_text(),
    }
}

impl TableListener for TableBridge {
    fn on_value_changed(&self, table: &str, key: &str, _kind: ValueKind) {
        if table != self.table_name {
            return;
        }

        if key == SAVE_KEY {
            if self.table.get(table, key) == Some(TableValue::Boolean(true)) {
                info!("Save requested through table {}", self.table_name);
                // The worker clears the control key before it writes.
                drop(self.saves.request(SaveOrigin::Remote));
            }
            return;
        }

        self.apply_remote(key);
    }

    fn on_value_confirmed(&self, table: &str, key: &str, _kind: ValueKind) {
        if table != self.table_name {
            return;
        }
        let mut pending = self.pending.lock();
        if let Some(entry) = pending.get_mut(key) {
            entry.unconfirmed = entry.unconfirmed.saturating_sub(1);
            if entry.unconfirmed == 0 {
                pending.remove(key);
            }
        }
    }
}
