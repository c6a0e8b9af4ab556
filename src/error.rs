//! Crate-level error for front ends that drive several components at once.

use thiserror::Error;

use crate::config::ConfigError;
use crate::export::ExportError;
use crate::render::RenderFailure;
use crate::repair::{ProviderError, RepairError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Render(#[from] RenderFailure),
    #[error("export failed: {0}")]
    Export(#[from] ExportError),
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("repair failed: {0}")]
    Repair(#[from] RepairError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
