//! Rendering built geometry into SVG drawings.
//!
//! Drawings use millimetres as user units. The root element carries the
//! physical size so that laser software picks up the correct scale.
//!
//! Rendering the same input twice gives the same elements in the same
//! order with the same geometry and colors. The order of attributes within
//! an element may differ between runs, so compare drawings by their
//! content rather than byte by byte.

pub mod label;

use kurbo::{BezPath, PathEl, Point};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Deserialize;
use svg::{Document, Node};
use svg::node::element::{Group, Path, Polygon, Polyline, Rectangle, Text};
use crate::class::{LayerDef, LayerKind, LayerTable};
use crate::color::Color;
use crate::path::{BuiltLayer, BuiltMap, PathGeometry};
use crate::style::{deserialize_optional_color, Fill};


//------------ RenderOptions -------------------------------------------------

/// Options for the main drawing.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderOptions {
    /// The color of the background rectangle.
    #[serde(deserialize_with = "deserialize_optional_color")]
    pub background: Option<Color>,

    /// The color of a frame around the drawing.
    #[serde(deserialize_with = "deserialize_optional_color")]
    pub frame: Option<Color>,

    pub frame_width: f64,

    /// The seed for picking palette colors.
    pub seed: u64,

    /// Draw lines as filled outlines of their strokes.
    pub outline_strokes: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            background: Some(Color::WHITE),
            frame: None,
            frame_width: 0.2,
            seed: 0,
            outline_strokes: false,
        }
    }
}


//------------ MapDrawing ----------------------------------------------------

/// The main drawing with one group per layer.
#[derive(Clone, Debug)]
pub struct MapDrawing {
    width_mm: f64,
    height_mm: f64,
    background: Option<Color>,
    frame: Option<(Color, f64)>,
    layers: Vec<Group>,
}

impl MapDrawing {
    pub fn render(
        map: &BuiltMap, table: &LayerTable, options: &RenderOptions
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(options.seed);
        let rect = map.rect();
        let layers = map.layers().iter().filter_map(|layer| {
            let def = table.get(layer.index)?;
            tracing::debug!(
                "layer {}: {} paths, {} labels",
                def.name, layer.paths.len(), layer.labels.len()
            );
            Some(render_layer(def, layer, options, &mut rng))
        }).collect();
        MapDrawing {
            width_mm: rect.width(),
            height_mm: rect.height(),
            background: options.background,
            frame: options.frame.map(|color| (color, options.frame_width)),
            layers,
        }
    }

    pub fn width_mm(&self) -> f64 {
        self.width_mm
    }

    pub fn height_mm(&self) -> f64 {
        self.height_mm
    }

    /// Returns the complete drawing.
    pub fn document(&self) -> Document {
        let mut doc = self.canvas();
        for layer in &self.layers {
            doc = doc.add(layer.clone());
        }
        self.add_frame(doc)
    }

    /// Returns the drawing with additional content on top.
    ///
    /// The map itself is wrapped in a group with the given opacity.
    pub fn document_with(&self, opacity: f64, extra: Group) -> Document {
        let mut content = Group::new().set("opacity", number(opacity));
        for layer in &self.layers {
            content = content.add(layer.clone());
        }
        self.add_frame(self.canvas().add(content)).add(extra)
    }

    /// Returns an empty document with the background.
    fn canvas(&self) -> Document {
        let doc = document(self.width_mm, self.height_mm);
        match self.background {
            Some(color) => {
                doc.add(
                    paint(
                        rect(0., 0., self.width_mm, self.height_mm),
                        "fill", Some(color)
                    ).set("stroke", "none")
                )
            }
            None => doc
        }
    }

    fn add_frame(&self, doc: Document) -> Document {
        match self.frame {
            Some((color, width)) => {
                let frame = rect(0., 0., self.width_mm, self.height_mm)
                    .set("id", "frame")
                    .set("fill", "none")
                    .set("stroke-width", number(width));
                doc.add(paint(frame, "stroke", Some(color)))
            }
            None => doc
        }
    }
}

fn render_layer(
    def: &LayerDef,
    layer: &BuiltLayer,
    options: &RenderOptions,
    rng: &mut StdRng,
) -> Group {
    let style = &def.style;
    let group = Group::new()
        .set("id", def.name.as_str())
        .set("data-operation", style.operation.as_str());

    if options.outline_strokes && def.kind == LayerKind::Line {
        let color = style.stroke.unwrap_or(Color::BLACK);
        let mut group = paint(group, "fill", Some(color)).set("stroke", "none");
        for path in &layer.paths {
            let outline = path.outline(
                style.stroke_width, style.dash.as_deref()
            );
            group = group.add(Path::new().set("d", path_data(&outline)));
        }
        return group
    }

    let mut group = paint(group, "stroke", style.stroke);
    if style.stroke.is_some() {
        group = group
            .set("stroke-width", number(style.stroke_width))
            .set("stroke-linecap", "round")
            .set("stroke-linejoin", "round");
    }
    if let Some(dash) = style.dash_array() {
        group = group.set("stroke-dasharray", dash);
    }
    let palette = matches!(style.fill, Fill::Palette(_));
    if !palette {
        group = paint(group, "fill", style.fill.pick(rng));
    }
    group = group.set("fill-rule", style.fill_rule.as_str());

    for path in &layer.paths {
        group = if path.is_closed() {
            let mut polygon = Polygon::new().set("points", ring_points(path));
            if palette {
                polygon = paint(polygon, "fill", style.fill.pick(rng));
            }
            group.add(polygon)
        }
        else {
            group.add(
                Polyline::new()
                    .set("points", points(path.points()))
                    .set("fill", "none")
            )
        };
    }

    let text_color = match style.fill {
        Fill::Solid(color) => color,
        _ => style.stroke.unwrap_or(Color::BLACK),
    };
    for label in &layer.labels {
        let text = Text::new(label.text.as_str())
            .set("x", number(label.position.x))
            .set("y", number(label.position.y))
            .set("font-size", number(style.font_size))
            .set("text-anchor", "middle")
            .set("stroke", "none");
        group = group.add(paint(text, "fill", Some(text_color)));
    }
    group
}


//------------ Helper Functions ----------------------------------------------

/// Creates an empty document of the given physical size.
pub(crate) fn document(width_mm: f64, height_mm: f64) -> Document {
    Document::new()
        .set("width", format!("{:.2}mm", width_mm))
        .set("height", format!("{:.2}mm", height_mm))
        .set("viewBox", format!("0 0 {:.2} {:.2}", width_mm, height_mm))
}

pub(crate) fn rect(x: f64, y: f64, width: f64, height: f64) -> Rectangle {
    Rectangle::new()
        .set("x", number(x))
        .set("y", number(y))
        .set("width", number(width))
        .set("height", number(height))
}

/// Sets a color attribute.
///
/// Translucent colors also get the matching `-opacity` attribute. `None`
/// sets the attribute to `none`.
pub(crate) fn paint<T: Node>(
    mut node: T, attribute: &str, color: Option<Color>
) -> T {
    match color {
        Some(color) => {
            node.assign(attribute, color.to_svg());
            if !color.is_opaque() {
                node.assign(
                    format!("{}-opacity", attribute), number(color.alpha())
                );
            }
        }
        None => node.assign(attribute, "none"),
    }
    node
}

/// Formats a drawing coordinate.
pub(crate) fn number(value: f64) -> String {
    let value = (value * 1000.).round() / 1000.;
    if value == 0. {
        // Avoid "-0".
        return "0".into()
    }
    let mut res = format!("{:.3}", value);
    while res.ends_with('0') {
        res.pop();
    }
    if res.ends_with('.') {
        res.pop();
    }
    res
}

fn point(point: Point) -> String {
    format!("{},{}", number(point.x), number(point.y))
}

fn points(items: &[Point]) -> String {
    items.iter().map(|item| point(*item)).collect::<Vec<_>>().join(" ")
}

/// Returns the points of a closed path without the repeated last point.
fn ring_points(path: &PathGeometry) -> String {
    let items = path.points();
    points(&items[..items.len().saturating_sub(1)])
}

fn path_data(path: &BezPath) -> String {
    let mut res = String::new();
    for el in path.elements() {
        if !res.is_empty() {
            res.push(' ');
        }
        match *el {
            PathEl::MoveTo(p) => {
                res.push('M');
                res.push_str(&point(p));
            }
            PathEl::LineTo(p) => {
                res.push('L');
                res.push_str(&point(p));
            }
            PathEl::QuadTo(p1, p2) => {
                res.push('Q');
                res.push_str(&point(p1));
                res.push(' ');
                res.push_str(&point(p2));
            }
            PathEl::CurveTo(p1, p2, p3) => {
                res.push('C');
                res.push_str(&point(p1));
                res.push(' ');
                res.push_str(&point(p2));
                res.push(' ');
                res.push_str(&point(p3));
            }
            PathEl::ClosePath => res.push('Z'),
        }
    }
    res
}


//============ Tests =========================================================
