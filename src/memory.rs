//! In-process live table.
//!
//! Values live in a map per table name. Notifications are queued on a channel
//! and delivered by a dispatcher task, so listeners never run while the
//! publisher holds a lock. Must be created inside a tokio runtime.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::debug;

use crate::table::{LiveTable, TableListener, TableValue, ValueKind};

#[derive(Debug, Clone, Copy)]
enum Notice {
    Changed,
    Confirmed,
}

#[derive(Debug)]
struct Notification {
    table: String,
    key: String,
    kind: ValueKind,
    notice: Notice,
}

type Listeners = Arc<RwLock<HashMap<String, Vec<Weak<dyn TableListener>>>>>;

/// In-memory implementation of [`LiveTable`].
///
/// A local `publish` is reported to listeners as a change followed by a
/// confirmation, the way a networked table echoes its own writes.
/// [`MemoryTable::remote_put`] stands in for an edit made by another party.
/// Listeners are held weakly and pruned once dropped.
pub struct MemoryTable {
    data: RwLock<HashMap<String, BTreeMap<String, TableValue>>>,
    listeners: Listeners,
    notices: mpsc::UnboundedSender<Notification>,
}

impl MemoryTable {
    /// Create a new empty table and start its dispatcher.
    pub fn new() -> Arc<Self> {
        let (notices, rx) = mpsc::unbounded_channel();
        let listeners: Listeners = Arc::default();
        tokio::spawn(dispatch(rx, listeners.clone()));

        Arc::new(Self {
            data: RwLock::new(HashMap::new()),
            listeners,
            notices,
        })
    }

    /// Apply an edit made by another party.
    pub fn remote_put(&self, table: &str, key: &str, value: TableValue) {
        let kind = value.kind();
        self.write(table, key, value);
        self.notify(table, key, kind, Notice::Changed);
    }

    /// Keys present in `table`, sorted.
    pub fn keys(&self, table: &str) -> Vec<String> {
        self.data
            .read()
            .get(table)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn write(&self, table: &str, key: &str, value: TableValue) {
        self.data
            .write()
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    fn notify(&self, table: &str, key: &str, kind: ValueKind, notice: Notice) {
        // Ignore send errors (dispatcher gone with the runtime)
        let _ = self.notices.send(Notification {
            table: table.to_string(),
            key: key.to_string(),
            kind,
            notice,
        });
    }
}

impl LiveTable for MemoryTable {
    fn publish(&self, table: &str, key: &str, value: TableValue) {
        let kind = value.kind();
        self.write(table, key, value);
        self.notify(table, key, kind, Notice::Changed);
        self.notify(table, key, kind, Notice::Confirmed);
    }

    fn get(&self, table: &str, key: &str) -> Option<TableValue> {
        self.data.read().get(table)?.get(key).cloned()
    }

    fn subscribe(&self, table: &str, listener: Arc<dyn TableListener>) {
        self.listeners
            .write()
            .entry(table.to_string())
            .or_default()
            .push(Arc::downgrade(&listener));
    }
}

async fn dispatch(mut rx: mpsc::UnboundedReceiver<Notification>, listeners: Listeners) {
    while let Some(n) = rx.recv().await {
        let targets: Vec<Arc<dyn TableListener>> = {
            let mut listeners = listeners.write();
            match listeners.get_mut(&n.table) {
                Some(entries) => {
                    entries.retain(|listener| listener.strong_count() > 0);
                    entries.iter().filter_map(Weak::upgrade).collect()
                }
                None => Vec::new(),
            }
        };
        debug!(table = %n.table, key = %n.key, notice = ?n.notice, "dispatching");
        for listener in targets {
            match n.notice {
                Notice::Changed => listener.on_value_changed(&n.table, &n.key, n.kind),
                Notice::Confirmed => listener.on_value_confirmed(&n.table, &n.key, n.kind),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl TableListener for Recorder {
        fn on_value_changed(&self, table: &str, key: &str, _kind: ValueKind) {
            self.seen.lock().push(format!("changed {table}/{key}"));
        }

        fn on_value_confirmed(&self, table: &str, key: &str, _kind: ValueKind) {
            self.seen.lock().push(format!("confirmed {table}/{key}"));
        }
    }

    async fn wait_for_count(recorder: &Recorder, count: usize) {
        for _ in 0..200 {
            if recorder.seen.lock().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {count} notifications, got {:?}", recorder.seen.lock());
    }

    #[tokio::test]
    async fn test_publish_and_get() {
        let table = MemoryTable::new();
        table.publish("Preferences", "a", TableValue::String("1".into()));

        assert_eq!(
            table.get("Preferences", "a"),
            Some(TableValue::String("1".into()))
        );
        assert!(table.get("Preferences", "b").is_none());
        assert!(table.get("Other", "a").is_none());
        assert_eq!(table.keys("Preferences"), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_publish_is_echoed_then_confirmed() {
        let table = MemoryTable::new();
        let recorder = Arc::new(Recorder::default());
        table.subscribe("Preferences", recorder.clone());

        table.publish("Preferences", "a", TableValue::Boolean(true));
        wait_for_count(&recorder, 2).await;

        assert_eq!(
            *recorder.seen.lock(),
            vec!["changed Preferences/a", "confirmed Preferences/a"]
        );
    }

    #[tokio::test]
    async fn test_remote_put_only_notifies_change() {
        let table = MemoryTable::new();
        let recorder = Arc::new(Recorder::default());
        table.subscribe("Preferences", recorder.clone());
        let other = Arc::new(Recorder::default());
        table.subscribe("Other", other.clone());

        table.remote_put("Preferences", "x", TableValue::Double(1.0));
        wait_for_count(&recorder, 1).await;

        assert_eq!(*recorder.seen.lock(), vec!["changed Preferences/x"]);
        assert!(other.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_listener_is_released() {
        let table = MemoryTable::new();
        let kept = Arc::new(Recorder::default());
        let dropped = Arc::new(Recorder::default());
        table.subscribe("Preferences", kept.clone());
        table.subscribe("Preferences", dropped.clone());

        let released = Arc::downgrade(&dropped);
        drop(dropped);
        assert!(released.upgrade().is_none());

        table.remote_put("Preferences", "x", TableValue::Double(1.0));
        wait_for_count(&kept, 1).await;
        assert_eq!(table.listeners.read()["Preferences"].len(), 1);
    }
}
