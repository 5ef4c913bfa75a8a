use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings from {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("settings file {} is not valid: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to write settings to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("unknown settings key '{0}'")]
    UnknownKey(String),
    #[error("invalid value '{value}' for '{key}': expected a whole number")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Error)]
pub enum WindowQueryError {
    #[error("active window inspection is not supported here: {0}")]
    Unsupported(String),
    #[error("window probe command failed: {0}")]
    Command(String),
    #[error("window probe timed out after {0}ms")]
    Timeout(u128),
    #[error("no focused window")]
    NoWindow,
}

#[derive(Debug, Error)]
pub enum SoundError {
    #[error("failed to open sound file {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode sound file {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },
    #[error("audio output unavailable: {0}")]
    Output(String),
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("no executable configured")]
    EmptyPath,
    #[error("executable not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to start {}: {source}", .path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
