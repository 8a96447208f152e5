pub mod build;
pub mod cli;
pub mod config;
pub mod judge;
pub mod pairing;
pub mod record;
pub mod remap;
pub mod render;
pub mod runner;
pub mod stitch;
pub mod store;
pub mod time_gap;
pub mod unify;

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

#[derive(Debug)]
pub enum CuebenchError {
    Io(std::io::Error),
    Json(serde_json::Error),
    /// Missing or unusable input; aborts the whole build.
    Configuration(String),
    /// The anchor/time-gap combination cannot be placed chronologically.
    TimeGapResolution(String),
    /// A cue or trigger utterance carries a role other than A or B.
    SpeakerMapping(String),
    MalformedRecord(String),
    Backend(String),
}

impl CuebenchError {
    /// Errors worth retrying with a different conversation or anchor.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CuebenchError::TimeGapResolution(_))
    }
}

impl std::fmt::Display for CuebenchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CuebenchError::Io(e) => write!(f, "io: {e}"),
            CuebenchError::Json(e) => write!(f, "json: {e}"),
            CuebenchError::Configuration(msg) => write!(f, "config: {msg}"),
            CuebenchError::TimeGapResolution(msg) => write!(f, "time gap: {msg}"),
            CuebenchError::SpeakerMapping(msg) => write!(f, "speaker mapping: {msg}"),
            CuebenchError::MalformedRecord(msg) => write!(f, "malformed record: {msg}"),
            CuebenchError::Backend(msg) => write!(f, "backend: {msg}"),
        }
    }
}

impl From<std::io::Error> for CuebenchError {
    fn from(e: std::io::Error) -> Self {
        CuebenchError::Io(e)
    }
}

impl From<serde_json::Error> for CuebenchError {
    fn from(e: serde_json::Error) -> Self {
        CuebenchError::Json(e)
    }
}

/// Read a JSON artifact. A missing file is a configuration problem, not an io one.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CuebenchError> {
    if !path.exists() {
        return Err(CuebenchError::Configuration(format!(
            "input not found: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write a JSON artifact (pretty, trailing newline), creating parent directories.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CuebenchError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = serde_json::to_string_pretty(value)?;
    out.push('\n');
    std::fs::write(path, out)?;
    Ok(())
}
