use crate::metadata::MetadataError;
use std::path::PathBuf;
use thiserror::Error;

/// Reasons a script could not be loaded or started. Each ends up as an
/// error entry in the script's log.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Unable to read script '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("Unable to create script runtime: {0}")]
    Runtime(#[source] edkit_qjs::Error),

    #[error("Unable to set up script bindings: {0}")]
    Bindings(#[source] edkit_qjs::Error),

    /// The module failed to compile or link.
    #[error("{0}")]
    Compile(String),
}
