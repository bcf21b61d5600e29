//! The styling of layers.

use std::fmt;
use std::convert::TryFrom;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{de, Deserialize, Deserializer};
use smallvec::SmallVec;
use crate::color::{Color, InvalidHexColor};


//------------ LayerStyle ----------------------------------------------------

/// How the geometry of a layer is drawn.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayerStyle {
    /// The stroke color or `None` for no stroke.
    #[serde(deserialize_with = "deserialize_optional_color")]
    pub stroke: Option<Color>,

    /// The stroke width in millimetres.
    pub stroke_width: f64,

    pub fill: Fill,

    pub fill_rule: FillRule,

    /// Alternating dash and gap lengths in millimetres.
    pub dash: Option<SmallVec<[f64; 4]>>,

    /// What the laser does with this layer.
    pub operation: Operation,

    /// The font size for labels in millimetres.
    pub font_size: f64,
}

impl LayerStyle {
    pub fn stroked(stroke: Color, stroke_width: f64) -> Self {
        LayerStyle {
            stroke: Some(stroke),
            stroke_width,
            .. Default::default()
        }
    }

    pub fn filled(stroke: Color, stroke_width: f64, fill: Fill) -> Self {
        LayerStyle {
            stroke: Some(stroke),
            stroke_width,
            fill,
            .. Default::default()
        }
    }

    pub fn with_dash(mut self, dash: &[f64]) -> Self {
        self.dash = Some(dash.iter().copied().collect());
        self
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }

    /// Returns the dash pattern as an SVG `stroke-dasharray` value.
    pub fn dash_array(&self) -> Option<String> {
        let dash = self.dash.as_ref().filter(|dash| {
            !dash.is_empty() && dash.iter().all(|v| *v > 0.)
        })?;
        Some(
            dash.iter().map(|v| format!("{}", v)).collect::<Vec<_>>().join(",")
        )
    }
}

impl Default for LayerStyle {
    fn default() -> Self {
        LayerStyle {
            stroke: Some(Color::BLACK),
            stroke_width: 0.1,
            fill: Fill::None,
            fill_rule: FillRule::NonZero,
            dash: None,
            operation: Operation::Cut,
            font_size: 2.,
        }
    }
}


/// Deserializes a color that may be given as `"none"`.
pub(crate) fn deserialize_optional_color<'de, D: Deserializer<'de>>(
    deserializer: D
) -> Result<Option<Color>, D::Error> {
    let value = String::deserialize(deserializer)?;
    if value.eq_ignore_ascii_case("none") {
        Ok(None)
    }
    else {
        Color::hex(&value).map(Some).map_err(de::Error::custom)
    }
}


//------------ Fill ----------------------------------------------------------

/// The fill of closed geometry.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(try_from = "FillSpec")]
pub enum Fill {
    #[default]
    None,

    Solid(Color),

    /// Each shape gets a color picked at random from the palette.
    ///
    /// This is cosmetic only. The picks come from a seeded generator so
    /// drawings stay reproducible.
    Palette(Vec<Color>),
}

impl Fill {
    pub fn is_none(&self) -> bool {
        matches!(*self, Fill::None)
    }

    /// Returns the fill color for the next shape.
    pub fn pick<R: Rng>(&self, rng: &mut R) -> Option<Color> {
        match *self {
            Fill::None => None,
            Fill::Solid(color) => Some(color),
            Fill::Palette(ref colors) => colors.choose(rng).copied(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FillSpec {
    Single(String),
    Palette(Vec<String>),
}

impl TryFrom<FillSpec> for Fill {
    type Error = InvalidHexColor;

    fn try_from(spec: FillSpec) -> Result<Self, Self::Error> {
        match spec {
            FillSpec::Single(value) => {
                if value.eq_ignore_ascii_case("none") {
                    Ok(Fill::None)
                }
                else {
                    Color::hex(&value).map(Fill::Solid)
                }
            }
            FillSpec::Palette(values) => {
                values.iter().map(|value| Color::hex(value)).collect::<Result<_, _>>()
                    .map(Fill::Palette)
            }
        }
    }
}


//------------ FillRule ------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FillRule {
    #[default]
    NonZero,
    EvenOdd,
}

impl FillRule {
    pub fn as_str(self) -> &'static str {
        match self {
            FillRule::NonZero => "nonzero",
            FillRule::EvenOdd => "evenodd",
        }
    }
}


//------------ Operation -----------------------------------------------------

/// The machine operation a layer stands for.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Outlines are cut through.
    #[default]
    Cut,

    /// Fills are engraved into the surface.
    Engrave,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Cut => "cut",
            Operation::Engrave => "engrave",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[derive(Deserialize)]
    struct Wrapper {
        style: LayerStyle,
    }

    #[test]
    fn style_from_toml() {
        let style = toml::from_str::<Wrapper>(r##"
            style = { stroke = "#000000", stroke_width = 0.3, fill = ["#ff0000", "#00ff00"], dash = [4, 1], operation = "engrave" }
        "##).unwrap().style;
        assert_eq!(style.stroke_width, 0.3);
        assert_eq!(style.operation, Operation::Engrave);
        assert_eq!(style.dash_array().as_deref(), Some("4,1"));
        assert!(matches!(style.fill, Fill::Palette(ref c) if c.len() == 2));

        let style = toml::from_str::<Wrapper>(r#"
            style = { fill = "none", stroke = "none" }
        "#).unwrap().style;
        assert!(style.fill.is_none());
        assert_eq!(style.stroke, None);
        assert_eq!(style.operation, Operation::Cut);
    }

    #[test]
    fn palette_picks_are_seeded() {
        let fill = Fill::Palette(vec![
            Color::RED, Color::BLACK, Color::WHITE, Color::YELLOW
        ]);
        let picks = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..16).map(|_| fill.pick(&mut rng)).collect::<Vec<_>>()
        };
        assert_eq!(picks(7), picks(7));
    }
}
