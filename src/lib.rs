//! # robot-preferences
//!
//! Persistent, thread-safe preferences for a robot controller.
//!
//! Settings are typed at the edges (strings, `i32`, `i64`, `f32`, `f64`,
//! `bool`) and stored as text. They survive restarts through a small
//! line-oriented file that keeps its comments and key order. They are also
//! mirrored into a live key-value table, so an operator console can read and
//! edit them while the robot runs.
//!
//! - **Store core**: ordered map with per-key comments, one lock
//! - **Persistence**: background load at startup, background save on demand
//! - **Table bridge**: publishes every change, applies remote edits, and saves
//!   when the `~S A V E~` control key is set
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use robot_preferences::{MemoryTable, Preferences, PreferencesConfig};
//!
//! #[tokio::main]
//! async fn main() -> robot_preferences::Result<()> {
//!     let table = MemoryTable::new();
//!     let prefs = Preferences::open(PreferencesConfig::default(), table).await?;
//!
//!     prefs.put_double("arm.kP", 0.35)?;
//!     let kp = prefs.get_double("arm.kP", 0.0);
//!     println!("kP = {}", kp);
//!
//!     // Nothing reaches the file until save() is called.
//!     prefs.save().wait().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Watching Changes
//!
//! ```rust,no_run
//! use robot_preferences::Preferences;
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> robot_preferences::Result<()> {
//!     let prefs = Preferences::instance().await?;
//!     let mut changes = prefs.watch("drive.*");
//!
//!     while let Some(event) = changes.next().await {
//!         println!("{} {:?} from {:?}", event.key, event.event_type, event.origin);
//!     }
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod codec;
pub mod config;
pub mod error;
pub mod format;
pub mod memory;
pub mod persist;
pub mod preferences;
pub mod storage;
pub mod store;
pub mod table;
pub mod watch;

// Re-export main types
pub use codec::PreferenceValue;
pub use crate::config::PreferencesConfig;
pub use error::{ErrorStatus, PreferencesError, ReportedError, Result};
pub use memory::MemoryTable;
pub use persist::{LoadPhase, SaveHandle, SaveOrigin, WritePhase};
pub use preferences::Preferences;
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use store::PreferenceStore;
pub use table::{LiveTable, TableListener, TableValue, ValueKind, SAVE_KEY, SENTINEL};
pub use watch::{EventType, Origin, WatchEvent, WatchStream};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::codec::PreferenceValue;
    pub use crate::config::PreferencesConfig;
    pub use crate::error::{PreferencesError, Result};
    pub use crate::memory::MemoryTable;
    pub use crate::preferences::Preferences;
    pub use crate::table::{LiveTable, TableListener, TableValue};
    pub use crate::watch::{EventType, WatchEvent, WatchStream};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backed_preferences() {
        let prefs = Preferences::open_with_storage(
            PreferencesConfig::default(),
            std::sync::Arc::new(MemoryStorage::new()),
            MemoryTable::new(),
        )
        .await
        .unwrap();

        prefs.put_int("answer", 42).unwrap();
        assert_eq!(prefs.get_int("answer", 0), 42);
    }

    #[test]
    fn test_preferences_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}

        assert_send_sync::<Preferences>();
        assert_send_sync::<MemoryTable>();
    }
}
