//! Name labels drawn on top of a faded map.

use serde::Deserialize;
use svg::Document;
use svg::node::element::{Group, Text};
use crate::color::Color;
use crate::path::Label;
use super::{number, paint, rect, MapDrawing};


//------------ LabelStyle ----------------------------------------------------

/// How name labels are drawn.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LabelStyle {
    /// The font size in millimetres.
    pub font_size: f64,

    pub text: Color,

    /// The color of the box behind each label.
    pub background: Color,

    /// The opacity of the map underneath the labels.
    pub map_opacity: f64,
}

impl LabelStyle {
    /// Returns the estimated width of a text.
    fn text_width(&self, text: &str) -> f64 {
        text.chars().count() as f64 * self.font_size * 0.6
    }
}

impl Default for LabelStyle {
    fn default() -> Self {
        LabelStyle {
            font_size: 1.,
            text: Color::RED,
            background: Color::YELLOW,
            map_opacity: 0.2,
        }
    }
}


//------------ overlay -------------------------------------------------------

/// Draws labels on top of a faded version of a map.
///
/// Each label is anchored at its lower left corner and gets a box behind
/// it so it stays readable on busy maps.
pub fn overlay(
    drawing: &MapDrawing, labels: &[Label], style: &LabelStyle
) -> Document {
    let group = Group::new()
        .set("id", "labels")
        .set("font-family", "monospace")
        .set("font-size", number(style.font_size));
    let mut group = paint(group, "fill", Some(style.text));
    let height = style.font_size * 1.4;
    for label in labels {
        let pos = label.position;
        group = group
            .add(
                paint(
                    rect(
                        pos.x, pos.y - style.font_size,
                        style.text_width(&label.text), height
                    ),
                    "fill", Some(style.background)
                )
                .set("stroke", "none")
            )
            .add(
                Text::new(label.text.as_str())
                    .set("x", number(pos.x))
                    .set("y", number(pos.y))
            );
    }
    drawing.document_with(style.map_opacity, group)
}


//============ Tests =========================================================
