//! Assigning features to layers.
//!
//! A layer table is an ordered list of layer definitions. Each definition
//! carries a list of tag predicates. A feature belongs to the first layer
//! in table order for which any of the predicates matches. The order of
//! the feature’s own tags never matters.

use std::fmt;
use serde::Deserialize;
use smallvec::{smallvec, SmallVec};
use crate::color::Color;
use crate::feature::{GeoFeature, Tags};
use crate::style::{Fill, LayerStyle, Operation};


//------------ TagMatch ------------------------------------------------------

/// A predicate on a single tag.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TagMatch {
    pub key: String,

    #[serde(default)]
    pub value: TagValue,
}

impl TagMatch {
    pub fn any(key: &str) -> Self {
        TagMatch { key: key.into(), value: TagValue::Any }
    }

    pub fn value(key: &str, value: &str) -> Self {
        TagMatch { key: key.into(), value: TagValue::One(value.into()) }
    }

    pub fn one_of(key: &str, values: &[&str]) -> Self {
        TagMatch {
            key: key.into(),
            value: TagValue::OneOf(
                values.iter().map(|v| String::from(*v)).collect()
            ),
        }
    }

    pub fn matches(&self, tags: &Tags) -> bool {
        match tags.get(&self.key) {
            Some(value) => self.value.matches(value),
            None => false,
        }
    }
}


//------------ TagValue ------------------------------------------------------

/// The expected value of a tag.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TagValue {
    /// Any value will do, as long as the tag is present.
    #[default]
    Any,

    /// Exactly this value, `"*"` meaning any value.
    One(String),

    /// One of these values.
    OneOf(Vec<String>),
}

impl TagValue {
    fn matches(&self, value: &str) -> bool {
        match *self {
            TagValue::Any => true,
            TagValue::One(ref expected) => expected == "*" || expected == value,
            TagValue::OneOf(ref expected) => {
                expected.iter().any(|expected| expected == value)
            }
        }
    }
}


//------------ LayerKind -----------------------------------------------------

/// The broad category of a layer.
///
/// The kind determines both how features are built into geometry and the
/// z-order of the layer in the drawing: kinds are drawn in the order they
/// are declared here.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq,
    PartialOrd
)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    /// Sea and coastlines, closed against the drawing’s edge.
    Sea,

    /// Filled areas such as buildings, water, or fields.
    #[default]
    Area,

    /// Open lines such as roads and rivers.
    Line,

    /// Point labels.
    Label,
}

impl LayerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LayerKind::Sea => "sea",
            LayerKind::Area => "area",
            LayerKind::Line => "line",
            LayerKind::Label => "label",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


//------------ LayerDef ------------------------------------------------------

/// The definition of a single layer.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LayerDef {
    pub name: String,

    #[serde(default)]
    pub kind: LayerKind,

    /// The predicates, any of which selects a feature.
    #[serde(rename = "match")]
    pub matches: SmallVec<[TagMatch; 2]>,

    #[serde(default)]
    pub style: LayerStyle,

    /// The stacking among layers of the same kind.
    ///
    /// Layers with a higher value are drawn later.
    #[serde(default)]
    pub z: i32,
}

impl LayerDef {
    pub fn new(
        name: &str,
        kind: LayerKind,
        matches: SmallVec<[TagMatch; 2]>,
        style: LayerStyle,
    ) -> Self {
        LayerDef { name: name.into(), kind, matches, style, z: 0 }
    }

    pub fn with_z(self, z: i32) -> Self {
        LayerDef { z, .. self }
    }

    pub fn matches(&self, tags: &Tags) -> bool {
        self.matches.iter().any(|item| item.matches(tags))
    }
}


//------------ LayerTable ----------------------------------------------------

/// The ordered set of all layers.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct LayerTable {
    layers: Vec<LayerDef>,
}

impl LayerTable {
    pub fn new(layers: Vec<LayerDef>) -> Self {
        LayerTable { layers }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&LayerDef> {
        self.layers.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayerDef> {
        self.layers.iter()
    }

    /// Returns the index of the layer a feature belongs to.
    pub fn classify_index(&self, feature: &GeoFeature) -> Option<usize> {
        let res = self.layers.iter().position(|layer| {
            layer.matches(feature.tags())
        });
        if res.is_none() {
            tracing::trace!("{} matches no layer", feature.id());
        }
        res
    }

    /// Returns the layer a feature belongs to.
    pub fn classify(&self, feature: &GeoFeature) -> Option<&LayerDef> {
        self.classify_index(feature).map(|idx| &self.layers[idx])
    }

    /// Returns the layer indexes in drawing order.
    ///
    /// Layers are sorted by kind first, then by their `z` value, and keep
    /// their table order otherwise.
    pub fn z_order(&self) -> Vec<usize> {
        let mut order: Vec<_> = (0..self.layers.len()).collect();
        order.sort_by_key(|&idx| {
            let layer = &self.layers[idx];
            (layer.kind, layer.z, idx)
        });
        order
    }
}

impl Default for LayerTable {
    /// The layers used when the configuration doesn’t define any.
    fn default() -> Self {
        let water = Color::rgb(0.55, 0.75, 0.95);
        let black = Color::BLACK;
        LayerTable::new(vec![
            LayerDef::new(
                "buildings", LayerKind::Area,
                smallvec![TagMatch::any("building")],
                LayerStyle::filled(black, 0.1, Fill::Palette(vec![
                    Color::grey(0.6), Color::grey(0.7), Color::grey(0.8),
                ])),
            ).with_z(1),
            LayerDef::new(
                "major_roads", LayerKind::Line,
                smallvec![TagMatch::one_of("highway", &[
                    "motorway", "trunk", "primary", "secondary", "tertiary",
                    "motorway_link", "trunk_link", "primary_link",
                    "secondary_link", "tertiary_link",
                ])],
                LayerStyle::stroked(black, 1.2),
            ),
            LayerDef::new(
                "minor_roads", LayerKind::Line,
                smallvec![TagMatch::one_of("highway", &[
                    "residential", "unclassified", "living_street",
                    "service", "pedestrian", "road",
                ])],
                LayerStyle::stroked(black, 0.7),
            ),
            LayerDef::new(
                "paths", LayerKind::Line,
                smallvec![TagMatch::one_of("highway", &[
                    "footway", "path", "cycleway", "steps", "track",
                    "bridleway",
                ])],
                LayerStyle::stroked(black, 0.3).with_dash(&[2., 1.]),
            ),
            LayerDef::new(
                "sea", LayerKind::Sea,
                smallvec![
                    TagMatch::value("natural", "coastline"),
                    TagMatch::value("place", "sea"),
                ],
                LayerStyle::filled(black, 0.1, Fill::Solid(water))
                    .with_operation(Operation::Engrave),
            ),
            LayerDef::new(
                "rivers", LayerKind::Line,
                smallvec![TagMatch::one_of(
                    "waterway", &["river", "stream", "ditch", "canal"]
                )],
                LayerStyle::stroked(water, 0.8),
            ),
            LayerDef::new(
                "water_bodies", LayerKind::Area,
                smallvec![
                    TagMatch::value("natural", "water"),
                    TagMatch::one_of(
                        "water",
                        &["lake", "pond", "reservoir", "basin", "lagoon"]
                    ),
                    TagMatch::one_of(
                        "leisure", &["swimming_pool", "swimming_area"]
                    ),
                ],
                LayerStyle::filled(black, 0.1, Fill::Solid(water))
                    .with_operation(Operation::Engrave),
            ),
            LayerDef::new(
                "beaches", LayerKind::Area,
                smallvec![TagMatch::one_of("natural", &["beach", "sand"])],
                LayerStyle::filled(
                    black, 0.1, Fill::Solid(Color::rgb(0.96, 0.9, 0.7))
                ).with_operation(Operation::Engrave),
            ),
            LayerDef::new(
                "fields", LayerKind::Area,
                smallvec![
                    TagMatch::one_of(
                        "natural", &["scrub", "grassland", "wood", "tree_row"]
                    ),
                    TagMatch::one_of(
                        "landuse",
                        &["grass", "meadow", "farmland", "farmyard", "forest"]
                    ),
                ],
                LayerStyle::filled(
                    black, 0.1, Fill::Solid(Color::rgb(0.75, 0.88, 0.7))
                ).with_operation(Operation::Engrave),
            ),
            LayerDef::new(
                "parks", LayerKind::Area,
                smallvec![TagMatch::value("leisure", "park")],
                LayerStyle::filled(
                    black, 0.1, Fill::Solid(Color::rgb(0.75, 0.88, 0.7))
                ).with_operation(Operation::Engrave),
            ),
            LayerDef::new(
                "piers", LayerKind::Line,
                smallvec![TagMatch::value("man_made", "pier")],
                LayerStyle::stroked(black, 1.0),
            ),
            LayerDef::new(
                "places", LayerKind::Label,
                smallvec![TagMatch::one_of(
                    "place", &["city", "town", "village", "suburb"]
                )],
                LayerStyle {
                    stroke: None,
                    fill: Fill::Solid(black),
                    operation: Operation::Engrave,
                    font_size: 3.,
                    .. Default::default()
                },
            ),
        ])
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::feature::{Coord, ElementId};

    fn feature(tags: &[(&str, &str)]) -> GeoFeature {
        GeoFeature::point(
            ElementId::Node(1), Coord::new(0., 0.),
            tags.iter().copied().collect()
        ).unwrap()
    }

    #[test]
    fn first_layer_in_table_order_wins() {
        let table = LayerTable::new(vec![
            LayerDef::new(
                "building", LayerKind::Area,
                smallvec![TagMatch::any("building")], Default::default()
            ),
            LayerDef::new(
                "amenity", LayerKind::Area,
                smallvec![TagMatch::any("amenity")], Default::default()
            ),
        ]);
        // Tags are sorted by key, so "amenity" comes first in the feature.
        let both = feature(&[("amenity", "cafe"), ("building", "yes")]);
        assert_eq!(table.classify(&both).map(|l| l.name.as_str()), Some("building"));
        let amenity = feature(&[("amenity", "cafe")]);
        assert_eq!(table.classify(&amenity).map(|l| l.name.as_str()), Some("amenity"));
    }

    #[test]
    fn unmatched_feature_has_no_layer() {
        let table = LayerTable::default();
        assert_eq!(table.classify(&feature(&[("created_by", "JOSM")])), None);
        assert_eq!(table.classify(&feature(&[])), None);
    }

    #[test]
    fn value_predicates() {
        let tags: Tags = [("highway", "primary")].into_iter().collect();
        assert!(TagMatch::any("highway").matches(&tags));
        assert!(TagMatch::value("highway", "primary").matches(&tags));
        assert!(TagMatch::value("highway", "*").matches(&tags));
        assert!(!TagMatch::value("highway", "secondary").matches(&tags));
        assert!(TagMatch::one_of("highway", &["trunk", "primary"]).matches(&tags));
        assert!(!TagMatch::any("building").matches(&tags));
    }

    #[test]
    fn default_table_classifies_like_the_exports_need() {
        let table = LayerTable::default();
        let name = |tags: &[(&str, &str)]| {
            table.classify(&feature(tags)).map(|l| l.name.clone())
        };
        assert_eq!(name(&[("natural", "coastline")]).as_deref(), Some("sea"));
        assert_eq!(name(&[("water", "pond")]).as_deref(), Some("water_bodies"));
        assert_eq!(name(&[("highway", "primary")]).as_deref(), Some("major_roads"));
        assert_eq!(name(&[("building", "house")]).as_deref(), Some("buildings"));
    }

    #[test]
    fn default_table_priority() {
        let table = LayerTable::default();
        let name = |tags: &[(&str, &str)]| {
            table.classify(&feature(tags)).map(|l| l.name.clone())
        };
        assert_eq!(
            name(&[("building", "yes"), ("natural", "water")]).as_deref(),
            Some("buildings")
        );
        assert_eq!(
            name(&[("highway", "primary"), ("natural", "coastline")])
                .as_deref(),
            Some("major_roads")
        );
        assert_eq!(
            name(&[("man_made", "pier"), ("highway", "footway")]).as_deref(),
            Some("paths")
        );
        assert_eq!(
            name(&[("waterway", "river"), ("natural", "water")]).as_deref(),
            Some("rivers")
        );
    }

    #[test]
    fn buildings_are_drawn_above_land() {
        let table = LayerTable::default();
        let position = |name: &str| {
            table.z_order().into_iter().position(|idx| {
                table.get(idx).map(|layer| layer.name.as_str()) == Some(name)
            })
        };
        assert!(position("buildings") > position("fields"));
        assert!(position("buildings") > position("water_bodies"));
        assert!(position("sea") < position("fields"));
        assert!(position("buildings") < position("major_roads"));
    }

    #[test]
    fn z_order_sorts_by_kind() {
        let table = LayerTable::default();
        let kinds: Vec<_> = table.z_order().into_iter().map(|idx| {
            table.get(idx).map(|layer| layer.kind)
        }).collect();
        let mut sorted = kinds.clone();
        sorted.sort();
        assert_eq!(kinds, sorted);
        assert_eq!(kinds.first(), Some(&Some(LayerKind::Sea)));
        assert_eq!(kinds.last(), Some(&Some(LayerKind::Label)));
    }

    #[test]
    fn table_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            layers: LayerTable,
        }

        let table = toml::from_str::<Wrapper>(r#"
            [[layers]]
            name = "roads"
            kind = "line"
            match = [
                { key = "highway", value = ["primary", "secondary"] },
                { key = "man_made", value = "pier" },
            ]
            style = { stroke_width = 1.5 }

            [[layers]]
            name = "buildings"
            match = [{ key = "building" }]
        "#).unwrap().layers;
        assert_eq!(table.len(), 2);
        let roads = table.get(0).unwrap();
        assert_eq!(roads.kind, LayerKind::Line);
        assert_eq!(roads.matches[0], TagMatch::one_of("highway", &["primary", "secondary"]));
        assert_eq!(roads.matches[1], TagMatch::value("man_made", "pier"));
        assert_eq!(roads.style.stroke_width, 1.5);
        let buildings = table.get(1).unwrap();
        assert_eq!(buildings.kind, LayerKind::Area);
        assert_eq!(buildings.matches[0], TagMatch::any("building"));
    }
}
