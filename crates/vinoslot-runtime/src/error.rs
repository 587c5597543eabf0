use thiserror::Error;
use vinoslot_core::{BackendError, Device};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("model uses operators not supported by {device}: {}", operators.join(", "))]
    UnsupportedModel {
        device: Device,
        operators: Vec<String>,
    },

    #[error("request slot {slot} is out of range (session has {count} slots)")]
    InvalidRequestSlot { slot: usize, count: usize },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("no network has been loaded")]
    NotLoaded,

    #[error("network declares no {0} port")]
    MissingPort(&'static str),

    #[error("request slot {slot} is still in flight")]
    SlotBusy { slot: usize },

    #[error("request slot {slot} has not been started")]
    SlotNotStarted { slot: usize },

    #[error("request slot {slot} has no completed result")]
    OutputNotReady { slot: usize },

    #[error("network has no output named `{0}`")]
    UnknownOutput(String),

    #[error("{backend} backend cannot wait with a timeout")]
    BoundedWaitUnsupported { backend: &'static str },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}", path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
    #[error("invalid device: {0}")]
    Device(#[from] vinoslot_core::EmptyDevice),
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
