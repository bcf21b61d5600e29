//! Extracting and selecting name labels.
//!
//! Names are extracted from all named features into a listing that is
//! curated by hand, typically by deleting the unwanted entries. Selection
//! then cross-references the curated listing against a fresh extraction
//! and keeps only the entries that still match exactly.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use kurbo::Point;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::feature::{GeoFeature, Tags};
use crate::path::{self, Label};
use crate::projection::ProjectionScale;


/// Entries closer than this to another entry are marked as crowded.
pub const CROWDING_RADIUS_MM: f64 = 5.;

/// The category of names not matching any other.
pub const OTHER: &str = "Other";


//------------ NameCategory --------------------------------------------------

/// A named group of tag keys.
///
/// A name belongs to the first category for which its feature has any of
/// the keys.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct NameCategory {
    pub name: String,
    pub keys: Vec<String>,
}

impl NameCategory {
    pub fn new(name: &str, keys: &[&str]) -> Self {
        NameCategory {
            name: name.into(),
            keys: keys.iter().map(|key| key.to_string()).collect(),
        }
    }

    pub fn matches(&self, tags: &Tags) -> bool {
        self.keys.iter().any(|key| tags.contains_key(key))
    }
}

pub fn default_categories() -> Vec<NameCategory> {
    vec![
        NameCategory::new(
            "Streets/Roads", &["highway", "cycleway", "foot", "motorroad"]
        ),
        NameCategory::new("Places", &["place"]),
        NameCategory::new("Admin", &["boundary", "admin_level", "city_limit"]),
        NameCategory::new(
            "Rivers/Water", &["waterway", "reservoir_type", "tidal"]
        ),
        NameCategory::new(
            "Natural", &["natural", "trees", "backcountry", "hiking"]
        ),
        NameCategory::new(
            "Buildings/Landmarks",
            &[
                "building", "castle_type", "memorial", "artwork_type",
                "site", "monument",
            ]
        ),
        NameCategory::new(
            "Amenities/Services",
            &[
                "amenity", "bar", "bench", "brewery", "post_office",
                "school:FR", "healthcare",
            ]
        ),
        NameCategory::new(
            "Leisure/Tourism/Culture",
            &["leisure", "tourism", "historic", "pilgrimage", "artist_name"]
        ),
        NameCategory::new(
            "Utilities/Infrastructure",
            &["power", "substation", "transformer", "voltage", "charge"]
        ),
    ]
}

/// Returns the name of the category for a feature’s tags.
pub fn categorize<'a>(tags: &Tags, categories: &'a [NameCategory]) -> &'a str {
    categories.iter().find(|category| category.matches(tags))
        .map(|category| category.name.as_str())
        .unwrap_or(OTHER)
}


//------------ NameEntry -----------------------------------------------------

/// A name with its position on the drawing.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct NameEntry {
    pub name: String,
    pub category: String,

    /// The position on the drawing in millimetres, rounded to 3 decimals.
    pub x: f64,
    pub y: f64,

    pub lat: f64,
    pub lon: f64,

    /// Is there another entry within the crowding radius?
    #[serde(default)]
    pub crowded: bool,
}

impl NameEntry {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Returns whether both entries have the same name and position.
    pub fn same_as(&self, other: &NameEntry) -> bool {
        self.name == other.name && self.x == other.x && self.y == other.y
    }

    pub fn label(&self) -> Label {
        Label { position: self.position(), text: self.name.clone() }
    }

    fn cmp_key(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name).then_with(|| {
            self.x.partial_cmp(&other.x).unwrap_or(Ordering::Equal)
        }).then_with(|| {
            self.y.partial_cmp(&other.y).unwrap_or(Ordering::Equal)
        })
    }
}


//------------ extract -------------------------------------------------------

/// Extracts the names of all features in the selected categories.
///
/// If `selected` is empty, all categories are used. The result is sorted
/// by name and position.
pub fn extract<'f>(
    features: impl IntoIterator<Item = &'f GeoFeature>,
    scale: &ProjectionScale,
    categories: &[NameCategory],
    selected: &[String],
) -> Vec<NameEntry> {
    for name in selected {
        if name != OTHER && !categories.iter().any(|cat| &cat.name == name) {
            tracing::warn!("unknown name category '{}'", name);
        }
    }
    let mut res = Vec::new();
    for feature in features {
        let name = match feature.tags().name() {
            Some(name) => name,
            None => continue,
        };
        let category = categorize(feature.tags(), categories);
        if !selected.is_empty() && !selected.iter().any(|s| s == category) {
            continue
        }
        if name.contains('/') {
            tracing::warn!("dropping name '{}' of {}", name, feature.id());
            continue
        }
        let pos = match path::anchor(feature, scale) {
            Some(pos) => pos,
            None => {
                tracing::debug!("name '{}' is outside the drawing", name);
                continue
            }
        };
        let coord = scale.invert(pos);
        res.push(NameEntry {
            name: name.into(),
            category: category.into(),
            x: round(pos.x),
            y: round(pos.y),
            lat: coord.lat,
            lon: coord.lon,
            crowded: false,
        });
    }
    res.sort_by(NameEntry::cmp_key);
    mark_crowded(&mut res);
    for pair in res.windows(2) {
        if pair[0].name == pair[1].name {
            tracing::warn!(
                "duplicate name '{}' at ({}, {}) and ({}, {})",
                pair[0].name, pair[0].x, pair[0].y, pair[1].x, pair[1].y
            );
        }
    }
    res
}

fn round(value: f64) -> f64 {
    (value * 1000.).round() / 1000.
}

fn mark_crowded(entries: &mut [NameEntry]) {
    let positions: Vec<_> = entries.iter().map(NameEntry::position).collect();
    for (idx, entry) in entries.iter_mut().enumerate() {
        entry.crowded = positions.iter().enumerate().any(|(other, pos)| {
            other != idx && pos.distance(positions[idx]) <= CROWDING_RADIUS_MM
        });
    }
}

/// Logs the number of names per category.
///
/// If `print_all` is given, every name is logged, too.
pub fn log_names_by_category(entries: &[NameEntry], print_all: bool) {
    let mut groups = BTreeMap::<&str, Vec<&str>>::new();
    for entry in entries {
        groups.entry(entry.category.as_str()).or_default().push(&entry.name);
    }
    tracing::info!("{} names found", entries.len());
    for (category, names) in groups {
        tracing::info!("--- {} ({}) ---", category, names.len());
        if print_all {
            for name in names {
                tracing::info!("{}", name);
            }
        }
    }
}


//------------ NameListing ---------------------------------------------------

/// The editable listing of name positions.
///
/// The listing is a TOML file with one `[[name]]` table per entry.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct NameListing {
    #[serde(rename = "name", default)]
    pub entries: Vec<NameEntry>,
}

impl NameListing {
    pub fn new(entries: Vec<NameEntry>) -> Self {
        NameListing { entries }
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }

    pub fn from_toml(src: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(src)
    }
}


//------------ Selection -----------------------------------------------------

/// The result of cross-referencing a curated listing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selection {
    pub retained: Vec<NameEntry>,
    pub warnings: Vec<UnmatchedNameEntryWarning>,
}

impl Selection {
    /// Returns the retained names sorted, one per line.
    pub fn name_list(&self) -> String {
        let mut names: Vec<_> = self.retained.iter().map(|entry| {
            entry.name.as_str()
        }).collect();
        names.sort_unstable();
        let mut res = String::new();
        for name in names {
            res.push_str(name);
            res.push('\n');
        }
        res
    }

    pub fn labels(&self) -> Vec<Label> {
        self.retained.iter().map(NameEntry::label).collect()
    }
}

/// Keeps the curated entries that exactly match an extracted entry.
///
/// Entries are matched by name and position. Each extracted entry matches
/// at most one curated entry, so duplicates are kept exactly as often as
/// they appear in both. Curated entries without a match are skipped with
/// a warning.
pub fn select(extracted: &[NameEntry], curated: &[NameEntry]) -> Selection {
    let mut res = Selection::default();
    let mut used = vec![false; extracted.len()];
    for entry in curated {
        let found = extracted.iter().enumerate().position(|(idx, item)| {
            !used[idx] && item.same_as(entry)
        });
        match found {
            Some(idx) => {
                used[idx] = true;
                res.retained.push(extracted[idx].clone())
            }
            None => {
                res.warnings.push(UnmatchedNameEntryWarning {
                    name: entry.name.clone(),
                    x: entry.x,
                    y: entry.y,
                })
            }
        }
    }
    res
}


//------------ UnmatchedNameEntryWarning -------------------------------------

/// A curated entry was not found among the extracted names.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("name '{name}' at ({x}, {y}) not found in the extracted names")]
pub struct UnmatchedNameEntryWarning {
    pub name: String,
    pub x: f64,
    pub y: f64,
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::feature::{Coord, ElementId, Kind};
    use crate::projection::{BoundingBox, Dimension};

    fn entry(name: &str, x: f64, y: f64) -> NameEntry {
        NameEntry {
            name: name.into(),
            category: "Streets/Roads".into(),
            x, y,
            lat: 0., lon: 0.,
            crowded: false,
        }
    }

    fn point(id: i64, lat: f64, lon: f64, tags: &[(&str, &str)]) -> GeoFeature {
        GeoFeature::new(
            ElementId::Node(id), Kind::Point, vec![Coord::new(lat, lon)],
            tags.iter().copied().collect(),
        ).unwrap()
    }

    fn way(id: i64, coords: &[(f64, f64)], tags: &[(&str, &str)]) -> GeoFeature {
        GeoFeature::new(
            ElementId::Way(id), Kind::Polyline,
            coords.iter().map(|&(lat, lon)| Coord::new(lat, lon)).collect(),
            tags.iter().copied().collect(),
        ).unwrap()
    }

    #[test]
    fn selection_keeps_curated_entries() {
        let extracted = vec![
            entry("Rue A", 10., 20.), entry("Rue B", 30., 40.)
        ];

        let res = select(&extracted, &[entry("Rue A", 10., 20.)]);
        assert_eq!(res.retained, vec![entry("Rue A", 10., 20.)]);
        assert!(res.warnings.is_empty());
        assert_eq!(res.name_list(), "Rue A\n");

        let res = select(&extracted, &[entry("Rue C", 50., 60.)]);
        assert!(res.retained.is_empty());
        assert_eq!(res.warnings.len(), 1);
        assert_eq!(res.warnings[0].name, "Rue C");

        // Same name elsewhere doesn’t match.
        let res = select(&extracted, &[entry("Rue A", 10., 20.001)]);
        assert!(res.retained.is_empty());
        assert_eq!(res.warnings.len(), 1);
    }

    #[test]
    fn selection_keeps_duplicates() {
        let extracted = vec![entry("Rue A", 1., 2.), entry("Rue A", 1., 2.)];

        let res = select(&extracted, &extracted);
        assert_eq!(res.retained.len(), 2);
        assert!(res.warnings.is_empty());
        assert_eq!(res.name_list(), "Rue A\nRue A\n");

        // The curator removed one of them.
        let res = select(&extracted, &extracted[..1]);
        assert_eq!(res.retained.len(), 1);

        // A third copy has nothing left to match.
        let mut curated = extracted.clone();
        curated.push(entry("Rue A", 1., 2.));
        let res = select(&extracted, &curated);
        assert_eq!(res.retained.len(), 2);
        assert_eq!(res.warnings.len(), 1);
    }

    #[test]
    fn categories() {
        let categories = default_categories();
        let tags: Tags = [("highway", "residential"), ("amenity", "bar")]
            .into_iter().collect();
        assert_eq!(categorize(&tags, &categories), "Streets/Roads");
        let tags: Tags = [("shop", "bakery")].into_iter().collect();
        assert_eq!(categorize(&tags, &categories), OTHER);
    }

    #[test]
    fn extract_names() {
        let bbox = BoundingBox::new(0.01, 0., 0.01, 0.).unwrap();
        let scale = ProjectionScale::new(
            bbox, Dimension::Width(100.)
        ).unwrap();
        let features = vec![
            point(1, 0.005, 0.005, &[("name", "Zeta"), ("place", "square")]),
            point(2, 0.0051, 0.005, &[("name", "Alpha"), ("amenity", "bar")]),
            point(3, 0.002, 0.002, &[("name", "A/B"), ("amenity", "bar")]),
            point(4, 0.02, 0.002, &[("name", "Far"), ("amenity", "bar")]),
            point(5, 0.002, 0.008, &[("amenity", "bar")]),
            point(6, 0.008, 0.008, &[("name", "Lone"), ("shop", "bakery")]),
        ];
        let all = extract(&features, &scale, &default_categories(), &[]);
        let names: Vec<_> = all.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Alpha", "Lone", "Zeta"]);
        assert!(all[0].crowded);
        assert!(!all[1].crowded);
        assert!(all[2].crowded);
        assert_eq!(all[1].category, OTHER);
        assert_eq!(all[0].x, round(all[0].x));

        let places = extract(
            &features, &scale, &default_categories(), &["Places".to_string()]
        );
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].name, "Zeta");
    }

    #[test]
    fn crossing_line_is_named_at_visible_part() {
        let bbox = BoundingBox::new(0.01, 0., 0.01, 0.).unwrap();
        let scale = ProjectionScale::new(
            bbox, Dimension::Width(100.)
        ).unwrap();
        let features = vec![
            way(1, &[(0.005, 0.002), (0.005, 0.05)], &[
                ("name", "Rue Longue"), ("highway", "primary")
            ]),
            way(2, &[(0.02, 0.002), (0.03, 0.05)], &[
                ("name", "Rue Loin"), ("highway", "primary")
            ]),
        ];
        let all = extract(&features, &scale, &default_categories(), &[]);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Rue Longue");
        assert!((all[0].x - 60.).abs() < 1e-3);
        assert!((all[0].y - 50.).abs() < 1e-3);
        assert!((all[0].lon - 0.006).abs() < 1e-6);
        assert!((all[0].lat - 0.005).abs() < 1e-6);
    }

    #[test]
    fn duplicates_survive_extraction_and_selection() {
        let bbox = BoundingBox::new(0.01, 0., 0.01, 0.).unwrap();
        let scale = ProjectionScale::new(
            bbox, Dimension::Width(100.)
        ).unwrap();
        let features = vec![
            point(1, 0.005, 0.005, &[("name", "Puits"), ("amenity", "well")]),
            point(2, 0.005, 0.005, &[("name", "Puits"), ("amenity", "well")]),
        ];
        let all = extract(&features, &scale, &default_categories(), &[]);
        assert_eq!(all.len(), 2);

        let listing = NameListing::new(all.clone());
        let parsed = NameListing::from_toml(
            &listing.to_toml().unwrap()
        ).unwrap();
        let res = select(&all, &parsed.entries);
        assert_eq!(res.retained.len(), 2);
        assert!(res.warnings.is_empty());
    }

    #[test]
    fn listing_survives_toml() {
        let mut item = entry("Rue \"A\"", 12.345, 0.1);
        item.lat = 43.6109123456789;
        item.lon = 3.87671234;
        item.crowded = true;
        let listing = NameListing::new(vec![item, entry("Rue B", 0., 7.)]);
        let text = listing.to_toml().unwrap();
        assert!(text.contains("[[name]]"));
        let parsed = NameListing::from_toml(&text).unwrap();
        assert_eq!(parsed, listing);
        assert_eq!(
            select(&listing.entries, &parsed.entries).retained.len(), 2
        );
    }
}
