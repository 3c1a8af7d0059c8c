//! Script lifecycle for the level editor
//!
//! Discovers script files, parses their metadata headers, runs each one in
//! its own QuickJS runtime with the editor bindings installed, and keeps a
//! per-script log of the most recent run.
//!
//! Everything here lives on the editor's main thread. The host drives
//! scripts by calling [`ScriptManager::tick_all`] once per frame and
//! delivers log notifications with [`ScriptManager::dispatch_events`].

mod bindings;
mod error;
mod input;
mod log;
mod manager;
mod metadata;
mod script;

pub use bindings::{GameObject, Point};
pub use error::ScriptError;
pub use input::{FixedInputs, InputKind, InputPolicy, InputValue, ScriptInput};
pub use log::{LogEntry, LogLevel, ScriptId, ScriptLog};
pub use manager::{ScriptLogged, ScriptManager, SubscriptionId};
pub use metadata::{MetadataError, ScriptMetadata};
pub use script::{JsScript, ScriptEnv};
