use std::error::Error as StdError;
use std::path::PathBuf;

use thiserror::Error;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Failure reported by an inference backend, carrying its native error when
/// there is one.
#[derive(Debug, Error)]
#[error("{backend}: {message}")]
pub struct BackendError {
    pub backend: &'static str,
    pub message: String,
    #[source]
    pub source: Option<BoxError>,
}

impl BackendError {
    pub fn new(backend: &'static str, message: impl Into<String>) -> Self {
        Self {
            backend,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        backend: &'static str,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            backend,
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("failed to read topology {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed topology XML")]
    Xml(#[from] quick_xml::Error),
    #[error("<{element}> is missing attribute `{attribute}`")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    #[error("layer `{layer}` has invalid shape `{raw}`")]
    InvalidShape { layer: String, raw: String },
    #[error("layer `{layer}` has unknown element type `{raw}`")]
    UnknownElementType { layer: String, raw: String },
    #[error("result layer `{layer}` has no producer edge")]
    DanglingResult { layer: String },
}

impl From<quick_xml::events::attributes::AttrError> for TopologyError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        TopologyError::Xml(err.into())
    }
}

impl From<TopologyError> for BackendError {
    fn from(err: TopologyError) -> Self {
        BackendError::with_source("ir", "failed to read network topology", err)
    }
}
