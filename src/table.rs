//! Contract of the live key-value table the store is mirrored into.
//!
//! The table is an external, shared service (an operator console reads and
//! edits it). This crate only needs to publish values, read them back, and be
//! told when they change.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::codec::PreferenceValue;

/// Name of the table the store is mirrored into.
pub const DEFAULT_TABLE_NAME: &str = "Preferences";

/// Control key: setting it to `true` asks the store to save.
pub const SAVE_KEY: &str = "~S A V E~";

/// Table value meaning "this key does not exist in the store".
pub const SENTINEL: &str = "\"";

/// A value held by the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TableValue {
    String(String),
    Boolean(bool),
    Double(f64),
}

/// Type tag delivered with notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    String,
    Boolean,
    Double,
}

impl TableValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            TableValue::String(_) => ValueKind::String,
            TableValue::Boolean(_) => ValueKind::Boolean,
            TableValue::Double(_) => ValueKind::Double,
        }
    }

    /// Canonical store text for this value.
    pub fn to_text(&self) -> String {
        match self {
            TableValue::String(s) => s.clone(),
            TableValue::Boolean(b) => b.encode(),
            TableValue::Double(d) => d.encode(),
        }
    }

    /// True if this is the "absent" sentinel.
    pub fn is_sentinel(&self) -> bool {
        matches!(self, TableValue::String(s) if s == SENTINEL)
    }

    pub fn sentinel() -> Self {
        TableValue::String(SENTINEL.to_string())
    }
}

impl fmt::Display for TableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Receives change notifications from a [`LiveTable`].
///
/// Callbacks carry only the key and type; the listener reads the current
/// value back from the table.
pub trait TableListener: Send + Sync {
    /// The table's copy of `key` changed.
    fn on_value_changed(&self, table: &str, key: &str, kind: ValueKind);

    /// A value this side published has been accepted by the table.
    fn on_value_confirmed(&self, table: &str, key: &str, kind: ValueKind);
}

/// A live, externally observable key-value table.
pub trait LiveTable: Send + Sync {
    /// Set `key` in `table` to `value`.
    fn publish(&self, table: &str, key: &str, value: TableValue);

    /// Current value of `key` in `table`.
    fn get(&self, table: &str, key: &str) -> Option<TableValue>;

    /// Register a listener for changes to `table`.
    ///
    /// The table does not keep the listener alive; dropping every other
    /// handle unsubscribes it.
    fn subscribe(&self, table: &str, listener: Arc<dyn TableListener>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_text() {
        assert_eq!(TableValue::String("\"x\"".into()).to_text(), "\"x\"");
        assert_eq!(TableValue::Boolean(true).to_text(), "true");
        assert_eq!(TableValue::Double(2.5).to_text(), "2.5");
        assert_eq!(TableValue::Double(3.0).to_string(), "3");
    }

    #[test]
    fn test_sentinel() {
        assert!(TableValue::sentinel().is_sentinel());
        assert!(!TableValue::String("\"\"".into()).is_sentinel());
        assert!(!TableValue::Boolean(false).is_sentinel());
        assert_eq!(TableValue::sentinel().kind(), ValueKind::String);
    }
}
