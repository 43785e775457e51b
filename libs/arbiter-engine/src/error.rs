use arbiter_common::types::Language;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Request-level failures. Anything that goes wrong while running a single
/// test case is recorded in that test case's result instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Unsupported language: no backend registered for '{0}'")]
    UnsupportedLanguage(Language),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to prepare workspace at {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Raw input did not match its declared format. Recovered locally by the
/// argument parser and only ever logged.
#[derive(Debug, Error)]
#[error("input is not valid JSON ({0}); using whitespace tokens")]
pub struct ParseDegradation(#[from] pub serde_json::Error);
