//! Importing map exports.

pub mod osm;

use std::{fmt, slice};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;
use crate::error::Error;
use crate::feature::{Coord, ElementId, GeoFeature};
use crate::projection::BoundingBox;


/// Loads an OSM XML export from a file.
pub fn load(path: &Path) -> Result<OsmData, Error> {
    let file = File::open(path).map_err(|err| Error::io(path, err))?;
    osm::read(BufReader::new(file))
}


//------------ OsmData -------------------------------------------------------

/// The result of reading an export.
#[derive(Clone, Debug, Default)]
pub struct OsmData {
    /// The bounds given in the export’s header, if any.
    pub bounds: Option<BoundingBox>,

    /// All features in document order.
    pub features: Vec<GeoFeature>,

    /// The features that had to be dropped.
    pub errors: ParseErrors,
}


//------------ ParseErrors ---------------------------------------------------

/// A collection of per-feature parse errors.
#[derive(Clone, Debug, Default)]
pub struct ParseErrors(Vec<ParseError>);

impl ParseErrors {
    pub fn new() -> Self {
        ParseErrors(Vec::new())
    }

    pub fn add(&mut self, element: ElementId, kind: ParseErrorKind) {
        let err = ParseError { element, kind };
        tracing::warn!("dropping feature: {}", err);
        self.0.push(err)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> slice::Iter<ParseError> {
        self.0.iter()
    }
}

impl fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for err in &self.0 {
            writeln!(f, "{}", err)?;
        }
        Ok(())
    }
}


//------------ ParseError ----------------------------------------------------

/// A single feature could not be read.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{element}: {kind}")]
pub struct ParseError {
    pub element: ElementId,
    pub kind: ParseErrorKind,
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ParseErrorKind {
    #[error("missing attribute '{0}'")]
    MissingAttribute(&'static str),

    #[error("invalid value '{value}' for attribute '{attr}'")]
    InvalidAttribute { attr: &'static str, value: String },

    #[error("coordinate {0} out of range")]
    CoordinateRange(Coord),

    #[error("references missing node {0}")]
    MissingNode(i64),

    #[error("references missing way {0}")]
    MissingWay(i64),

    #[error("too few points ({0})")]
    TooFewPoints(usize),

    #[error("ring is not closed")]
    OpenRing,
}
