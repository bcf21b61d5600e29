//! The crate’s error type.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use crate::config::ConfigError;
use crate::projection::InvalidBoundingBoxError;


//------------ Error ---------------------------------------------------------

/// An error that aborts processing a project.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{}: {source}", path.display())]
    ConfigFormat {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid name listing {}: {source}", path.display())]
    Listing {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write name listing: {0}")]
    ListingFormat(#[from] toml::ser::Error),

    #[error(transparent)]
    BoundingBox(#[from] InvalidBoundingBoxError),
}

impl Error {
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Error::Io { path: path.as_ref().into(), source }
    }
}
