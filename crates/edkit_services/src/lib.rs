//! edkit Services Layer
//!
//! Platform-facing pieces the scripting core leans on: settings, the
//! main-thread hand-off queue and the shared request cache.

pub mod cache;
pub mod main_queue;
pub mod settings;

pub use cache::{CacheMap, SharedCache};
pub use main_queue::{MainQueue, QueueSender};
pub use settings::{ConfigError, InputDefaults, ScriptingConfig};
