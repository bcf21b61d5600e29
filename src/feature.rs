//! Geographic features as read from a map export.

use std::fmt;
use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use crate::import::ParseErrorKind;


//------------ Coord ---------------------------------------------------------

/// A geographic position in degrees.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Coord { lat, lon }
    }

    /// Returns whether the coordinate is finite and within WGS84 range.
    pub fn is_valid(self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
            && (-90. ..=90.).contains(&self.lat)
            && (-180. ..=180.).contains(&self.lon)
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:.7}, {:.7})", self.lat, self.lon)
    }
}


//------------ Tags ----------------------------------------------------------

/// The semantic attributes of a feature.
///
/// Tags are kept ordered by key so that everything derived from them is
/// independent of the order they appeared in in the source document.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    pub fn new() -> Self {
        Tags(BTreeMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Returns the value of the `name` tag if it is present and not empty.
    pub fn name(&self) -> Option<&str> {
        self.get("name").map(str::trim).filter(|name| !name.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Tags(
            iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
        )
    }
}


//------------ ElementId -----------------------------------------------------

/// The identifier of the source element a feature was created from.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ElementId {
    Node(i64),
    Way(i64),
    Relation(i64),
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ElementId::Node(id) => write!(f, "node {}", id),
            ElementId::Way(id) => write!(f, "way {}", id),
            ElementId::Relation(id) => write!(f, "relation {}", id),
        }
    }
}


//------------ Kind ----------------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    Point,
    Polyline,
    Polygon,
}

impl Kind {
    /// The minimum number of coordinates a feature of this kind needs.
    ///
    /// Polygon rings repeat their first coordinate at the end, so three
    /// distinct corners make four coordinates.
    pub fn min_coords(self) -> usize {
        match self {
            Kind::Point => 1,
            Kind::Polyline => 2,
            Kind::Polygon => 4,
        }
    }
}


//------------ GeoFeature ----------------------------------------------------

/// A single mapped entity with its geometry and tags.
#[derive(Clone, Debug, PartialEq)]
pub struct GeoFeature {
    id: ElementId,
    kind: Kind,
    coords: Vec<Coord>,
    tags: Tags,
}

impl GeoFeature {
    /// Creates a new feature, checking its coordinates.
    pub fn new(
        id: ElementId,
        kind: Kind,
        coords: Vec<Coord>,
        tags: Tags,
    ) -> Result<Self, ParseErrorKind> {
        if let Some(coord) = coords.iter().find(|coord| !coord.is_valid()) {
            return Err(ParseErrorKind::CoordinateRange(*coord))
        }
        if coords.len() < kind.min_coords()
            || (kind == Kind::Point && coords.len() != 1)
        {
            return Err(ParseErrorKind::TooFewPoints(coords.len()))
        }
        if kind == Kind::Polygon && coords.first() != coords.last() {
            return Err(ParseErrorKind::OpenRing)
        }
        Ok(GeoFeature { id, kind, coords, tags })
    }

    pub fn point(
        id: ElementId, coord: Coord, tags: Tags
    ) -> Result<Self, ParseErrorKind> {
        Self::new(id, Kind::Point, vec![coord], tags)
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn coords(&self) -> &[Coord] {
        &self.coords
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }
}


//============ Tests =========================================================
