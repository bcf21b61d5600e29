//! Building drawing geometry from classified features.
//!
//! All geometry is projected into drawing millimetres and clipped to the
//! drawing area. Areas become closed paths, lines stay open. Sea layers get
//! special treatment: coastlines come as open lines cut off at the edge of
//! the export, so they are joined up and then closed by walking along the
//! drawing’s edge.

use std::mem;
use std::cmp::Ordering;
use kurbo::{
    BezPath, Cap, Join, Point, Rect, Shape, Stroke, StrokeOpts, Vec2,
};
use thiserror::Error;
use crate::class::{LayerKind, LayerTable};
use crate::feature::{GeoFeature, Kind};
use crate::projection::ProjectionScale;


//------------ Configurable Constants ----------------------------------------

/// Open rings with ends closer than this are closed in place.
pub const CLOSE_TOLERANCE_MM: f64 = 0.05;

/// Maximum distance of a sea endpoint from the drawing edge.
pub const PERIMETER_TOLERANCE_MM: f64 = 0.1;

/// Arcs differing by less than this share of the perimeter are ambiguous.
pub const AMBIGUITY_RATIO: f64 = 0.02;

/// Accuracy of stroke outlines in millimetres.
const OUTLINE_TOLERANCE: f64 = 0.01;


//------------ PathGeometry --------------------------------------------------

/// A path in drawing coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct PathGeometry {
    points: Vec<Point>,
    closed: bool,
}

impl PathGeometry {
    pub fn open(points: Vec<Point>) -> Self {
        PathGeometry { points, closed: false }
    }

    /// Creates a closed path, repeating the first point at the end.
    pub fn closed(mut points: Vec<Point>) -> Self {
        if let Some(&first) = points.first() {
            if points.last() != Some(&first) {
                points.push(first)
            }
        }
        PathGeometry { points, closed: true }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns the enclosed area or zero for open paths.
    pub fn area(&self) -> f64 {
        if self.closed {
            self.to_bez_path().area().abs()
        }
        else {
            0.
        }
    }

    pub fn to_bez_path(&self) -> BezPath {
        let mut path = BezPath::new();
        let mut points = self.points.iter();
        if let Some(first) = points.next() {
            path.move_to(*first);
            points.for_each(|point| path.line_to(*point));
            if self.closed {
                path.close_path();
            }
        }
        path
    }

    /// Returns the outline of the path stroked with the given width.
    ///
    /// This turns lines into areas for laser software that ignores stroke
    /// widths.
    pub fn outline(&self, width: f64, dash: Option<&[f64]>) -> BezPath {
        let mut style = Stroke::new(width)
            .with_caps(Cap::Round)
            .with_join(Join::Round);
        if let Some(dash) = dash {
            style = style.with_dashes(0., dash.iter().copied());
        }
        kurbo::stroke(
            self.to_bez_path().elements().iter().copied(),
            &style, &StrokeOpts::default(), OUTLINE_TOLERANCE
        )
    }
}


//------------ Label ---------------------------------------------------------

/// A text placed on the drawing.
#[derive(Clone, Debug, PartialEq)]
pub struct Label {
    pub position: Point,
    pub text: String,
}


//------------ BuiltLayer ----------------------------------------------------

/// The geometry of a single layer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuiltLayer {
    /// The index of the layer in the layer table.
    pub index: usize,
    pub paths: Vec<PathGeometry>,
    pub labels: Vec<Label>,
}

impl BuiltLayer {
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.labels.is_empty()
    }
}


//------------ BuiltMap ------------------------------------------------------

/// The complete geometry of a drawing.
#[derive(Clone, Debug, PartialEq)]
pub struct BuiltMap {
    rect: Rect,

    /// The layers in drawing order.
    layers: Vec<BuiltLayer>,

    warnings: Vec<AmbiguousClosureWarning>,
}

impl BuiltMap {
    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn layers(&self) -> &[BuiltLayer] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&BuiltLayer> {
        self.layers.iter().find(|layer| layer.index == index)
    }

    pub fn warnings(&self) -> &[AmbiguousClosureWarning] {
        &self.warnings
    }
}


//------------ GeometryBuilder -----------------------------------------------

/// Collects the geometry of all features of a drawing.
pub struct GeometryBuilder<'a> {
    table: &'a LayerTable,
    scale: &'a ProjectionScale,
    rect: Rect,

    /// The geometry for each layer in table order.
    layers: Vec<BuiltLayer>,

    /// Open sea pieces for each layer in table order.
    sea: Vec<Vec<Vec<Point>>>,
}

impl<'a> GeometryBuilder<'a> {
    pub fn new(table: &'a LayerTable, scale: &'a ProjectionScale) -> Self {
        GeometryBuilder {
            table,
            scale,
            rect: scale.drawing_rect(),
            layers: (0..table.len()).map(|index| {
                BuiltLayer { index, .. Default::default() }
            }).collect(),
            sea: vec![Vec::new(); table.len()],
        }
    }

    /// Classifies a feature and adds its geometry.
    ///
    /// Returns the index of the layer the feature went to.
    pub fn add(&mut self, feature: &GeoFeature) -> Option<usize> {
        let index = self.table.classify_index(feature)?;
        let layer = self.table.get(index)?;
        match (layer.kind, feature.kind()) {
            (LayerKind::Label, _) => self.add_label(index, feature),
            (_, Kind::Point) => {
                tracing::trace!(
                    "ignoring point {} in layer {}", feature.id(), layer.name
                );
            }
            (LayerKind::Line, _) => {
                let points = self.scale.apply_all(feature.coords());
                self.add_line(index, &points);
            }
            (_, Kind::Polygon) => {
                let points = self.scale.apply_all(feature.coords());
                self.add_area(index, points)
            }
            (kind, Kind::Polyline) => {
                let mut points = self.scale.apply_all(feature.coords());
                if ends_meet(&points) && points.len() > 3 {
                    let first = points[0];
                    if let Some(last) = points.last_mut() {
                        *last = first;
                    }
                    self.add_area(index, points)
                }
                else if kind == LayerKind::Sea {
                    let pieces = clip_polyline(&points, self.rect);
                    self.sea[index].extend(pieces);
                }
                else {
                    tracing::debug!(
                        "{} in area layer {} is not closed",
                        feature.id(), layer.name
                    );
                    self.add_line(index, &points);
                }
            }
        }
        Some(index)
    }

    pub fn add_all<'f>(
        &mut self, features: impl IntoIterator<Item = &'f GeoFeature>
    ) {
        for feature in features {
            self.add(feature);
        }
    }

    fn add_label(&mut self, index: usize, feature: &GeoFeature) {
        let text = match feature.tags().name() {
            Some(name) => name.to_string(),
            None => return,
        };
        if let Some(position) = anchor(feature, self.scale) {
            self.layers[index].labels.push(Label { position, text })
        }
    }

    fn add_line(&mut self, index: usize, points: &[Point]) {
        let pieces = clip_polyline(points, self.rect);
        self.layers[index].paths.extend(
            pieces.into_iter().map(PathGeometry::open)
        );
    }

    fn add_area(&mut self, index: usize, ring: Vec<Point>) {
        let clipped = clip_polygon(&ring[..ring.len() - 1], self.rect);
        if clipped.len() < 3 {
            return
        }
        self.layers[index].paths.push(PathGeometry::closed(clipped));
    }

    /// Closes the sea layers and returns the finished geometry.
    pub fn finish(mut self) -> BuiltMap {
        let perimeter = Perimeter::new(self.rect);
        let mut warnings = Vec::new();
        let sea = mem::take(&mut self.sea);
        for (index, pieces) in sea.into_iter().enumerate() {
            if pieces.is_empty() {
                continue
            }
            let name = match self.table.get(index) {
                Some(layer) => layer.name.as_str(),
                None => continue,
            };
            for piece in join_pieces(pieces) {
                let path = if ends_meet(&piece) && piece.len() > 3 {
                    PathGeometry::closed(piece)
                }
                else {
                    match perimeter.close(&piece, name) {
                        Some((path, warning)) => {
                            if let Some(warning) = warning {
                                tracing::warn!("{}", warning);
                                warnings.push(warning);
                            }
                            path
                        }
                        None => {
                            tracing::warn!(
                                "sea piece in layer {} does not end at the \
                                 drawing edge, leaving it open",
                                name
                            );
                            PathGeometry::open(piece)
                        }
                    }
                };
                self.layers[index].paths.push(path);
            }
        }
        let order = self.table.z_order();
        let mut layers: Vec<_> = self.layers.into_iter().map(Some).collect();
        BuiltMap {
            rect: self.rect,
            layers: order.into_iter().filter_map(|idx| {
                layers[idx].take()
            }).collect(),
            warnings,
        }
    }
}

/// Convenience for building all features at once.
pub fn build<'f>(
    table: &LayerTable,
    scale: &ProjectionScale,
    features: impl IntoIterator<Item = &'f GeoFeature>,
) -> BuiltMap {
    let mut builder = GeometryBuilder::new(table, scale);
    builder.add_all(features);
    builder.finish()
}


//------------ Perimeter -----------------------------------------------------

/// The edge of the drawing, walked clockwise from the north-west corner.
///
/// Positions on the perimeter are given as the distance from the
/// north-west corner along the edge.
struct Perimeter {
    rect: Rect,
}

impl Perimeter {
    fn new(rect: Rect) -> Self {
        Perimeter { rect }
    }

    fn length(&self) -> f64 {
        2. * (self.rect.width() + self.rect.height())
    }

    /// Returns the perimeter position of a point near the edge.
    fn position(&self, point: Point) -> Option<f64> {
        let r = self.rect;
        let (w, h) = (r.width(), r.height());
        let edges = [
            (point.y - r.y0).abs(),
            (point.x - r.x1).abs(),
            (point.y - r.y1).abs(),
            (point.x - r.x0).abs(),
        ];
        let (edge, dist) = edges.iter().copied().enumerate().min_by(|a, b| {
            a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal)
        })?;
        if dist > PERIMETER_TOLERANCE_MM {
            return None
        }
        Some(match edge {
            0 => (point.x - r.x0).clamp(0., w),
            1 => w + (point.y - r.y0).clamp(0., h),
            2 => w + h + (r.x1 - point.x).clamp(0., w),
            _ => 2. * w + h + (r.y1 - point.y).clamp(0., h),
        })
    }

    /// Returns the point at a perimeter position.
    fn point_at(&self, pos: f64) -> Point {
        let r = self.rect;
        let (w, h) = (r.width(), r.height());
        let pos = pos.rem_euclid(self.length());
        if pos <= w {
            Point::new(r.x0 + pos, r.y0)
        }
        else if pos <= w + h {
            Point::new(r.x1, r.y0 + pos - w)
        }
        else if pos <= 2. * w + h {
            Point::new(r.x1 - (pos - w - h), r.y1)
        }
        else {
            Point::new(r.x0, r.y1 - (pos - 2. * w - h))
        }
    }

    fn corners(&self) -> [(f64, Point); 4] {
        let r = self.rect;
        let (w, h) = (r.width(), r.height());
        [
            (0., Point::new(r.x0, r.y0)),
            (w, Point::new(r.x1, r.y0)),
            (w + h, Point::new(r.x1, r.y1)),
            (2. * w + h, Point::new(r.x0, r.y1)),
        ]
    }

    /// Returns the corners passed walking from `from` to `to` and the
    /// length of the walk.
    fn walk(&self, from: f64, to: f64, clockwise: bool) -> (Vec<Point>, f64) {
        let length = self.length();
        let offset = |a: f64, b: f64| {
            if clockwise { (b - a).rem_euclid(length) }
            else { (a - b).rem_euclid(length) }
        };
        let walk_len = offset(from, to);
        let mut corners: Vec<_> = self.corners().iter().filter_map(|c| {
            let off = offset(from, c.0);
            (off > 0. && off < walk_len).then_some((off, c.1))
        }).collect();
        corners.sort_by(|a, b| {
            a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal)
        });
        (corners.into_iter().map(|c| c.1).collect(), walk_len)
    }

    /// Closes an open piece along the perimeter.
    ///
    /// Returns `None` if either end of the piece is not on the perimeter.
    /// The shorter of the two possible walks is taken. If both are about
    /// the same, the one producing the smaller-than-half area is taken and
    /// a warning returned.
    fn close(
        &self, piece: &[Point], layer: &str
    ) -> Option<(PathGeometry, Option<AmbiguousClosureWarning>)> {
        let (&start, &end) = (piece.first()?, piece.last()?);
        let start_pos = self.position(start)?;
        let end_pos = self.position(end)?;

        let mut snapped = piece.to_vec();
        snapped[0] = self.point_at(start_pos);
        let last = snapped.len() - 1;
        snapped[last] = self.point_at(end_pos);

        let candidate = |clockwise| {
            let (corners, len) = self.walk(end_pos, start_pos, clockwise);
            let mut points = snapped.clone();
            points.extend(corners);
            (PathGeometry::closed(points), len)
        };
        let (cw, cw_len) = candidate(true);
        let (ccw, ccw_len) = candidate(false);

        if (cw_len - ccw_len).abs() > AMBIGUITY_RATIO * self.length() {
            let path = if cw_len < ccw_len { cw } else { ccw };
            return Some((path, None))
        }

        let half = self.rect.area() / 2.;
        let (cw_area, ccw_area) = (cw.area(), ccw.area());
        let path = match (cw_area < half, ccw_area < half) {
            (true, false) => cw,
            (false, true) => ccw,
            _ => if cw_area <= ccw_area { cw } else { ccw }
        };
        let warning = AmbiguousClosureWarning {
            layer: layer.into(),
            start: snapped[0],
            end: snapped[last],
            area: path.area(),
            half,
        };
        Some((path, Some(warning)))
    }
}


//------------ AmbiguousClosureWarning ---------------------------------------

/// Closing a sea piece had no clear choice of direction.
#[derive(Clone, Debug, Error, PartialEq)]
#[error(
    "ambiguous closure in layer {layer} between ({:.2}, {:.2}) and \
     ({:.2}, {:.2}): chose area {area:.1}mm² of {half:.1}mm² half, \
     please check the drawing",
    start.x, start.y, end.x, end.y
)]
pub struct AmbiguousClosureWarning {
    pub layer: String,
    pub start: Point,
    pub end: Point,

    /// The area of the chosen polygon.
    pub area: f64,

    /// Half the area of the drawing.
    pub half: f64,
}


//------------ anchor --------------------------------------------------------

/// Returns the point a feature’s label is anchored to.
///
/// This is the mean of the vertices of the feature’s geometry after
/// clipping it to the drawing, so lines leaving the drawing are labelled
/// at their visible part. Returns `None` if nothing of the feature is
/// inside the drawing.
pub fn anchor(feature: &GeoFeature, scale: &ProjectionScale) -> Option<Point> {
    let rect = scale.drawing_rect();
    let points = scale.apply_all(feature.coords());
    let visible: Vec<Point> = match feature.kind() {
        Kind::Point => {
            points.into_iter().filter(|point| within(*point, rect)).collect()
        }
        Kind::Polyline => clip_polyline(&points, rect).concat(),
        Kind::Polygon => clip_polygon(&points[..points.len() - 1], rect),
    };
    if visible.is_empty() {
        return None
    }
    let sum = visible.iter().fold(Vec2::ZERO, |sum, point| {
        sum + point.to_vec2()
    });
    Some((sum / visible.len() as f64).to_point())
}


//------------ Helper Functions ----------------------------------------------

fn near(a: Point, b: Point) -> bool {
    a.distance(b) <= CLOSE_TOLERANCE_MM
}

fn ends_meet(points: &[Point]) -> bool {
    match (points.first(), points.last()) {
        (Some(first), Some(last)) => near(*first, *last),
        _ => false
    }
}

/// Returns whether a point is inside the rectangle, edges included.
fn within(point: Point, rect: Rect) -> bool {
    point.x >= rect.x0 && point.x <= rect.x1
        && point.y >= rect.y0 && point.y <= rect.y1
}

/// Joins pieces whose ends meet.
fn join_pieces(mut pieces: Vec<Vec<Point>>) -> Vec<Vec<Point>> {
    pieces.reverse();
    let mut res = Vec::new();
    while let Some(mut current) = pieces.pop() {
        while !ends_meet(&current) {
            let (start, end) = match (current.first(), current.last()) {
                (Some(start), Some(end)) => (*start, *end),
                _ => break
            };
            if let Some(pos) = pieces.iter().position(|piece| {
                piece.first().map(|p| near(*p, end)).unwrap_or(false)
            }) {
                let next = pieces.remove(pos);
                current.extend(next.into_iter().skip(1));
            }
            else if let Some(pos) = pieces.iter().position(|piece| {
                piece.last().map(|p| near(*p, start)).unwrap_or(false)
            }) {
                let mut prev = pieces.remove(pos);
                prev.extend(current.into_iter().skip(1));
                current = prev;
            }
            else {
                break
            }
        }
        res.push(current);
    }
    res
}

/// Clips a line to a rectangle, possibly splitting it into several pieces.
fn clip_polyline(points: &[Point], rect: Rect) -> Vec<Vec<Point>> {
    let mut pieces = Vec::new();
    let mut current: Vec<Point> = Vec::new();

    fn flush(current: &mut Vec<Point>, pieces: &mut Vec<Vec<Point>>) {
        let piece = mem::take(current);
        if piece.len() >= 2 {
            pieces.push(piece)
        }
    }

    for segment in points.windows(2) {
        match clip_segment(segment[0], segment[1], rect) {
            Some((a, b)) => {
                if current.last() != Some(&a) {
                    flush(&mut current, &mut pieces);
                    current.push(a);
                }
                current.push(b);
                if b != segment[1] {
                    flush(&mut current, &mut pieces);
                }
            }
            None => flush(&mut current, &mut pieces),
        }
    }
    flush(&mut current, &mut pieces);
    pieces
}

/// Clips a segment to a rectangle (Liang–Barsky).
///
/// Unclipped ends are returned unchanged so that consecutive segments
/// still share their points exactly.
fn clip_segment(p: Point, q: Point, rect: Rect) -> Option<(Point, Point)> {
    let d = q - p;
    let mut t0 = 0.;
    let mut t1 = 1.;
    let checks = [
        (-d.x, p.x - rect.x0),
        (d.x, rect.x1 - p.x),
        (-d.y, p.y - rect.y0),
        (d.y, rect.y1 - p.y),
    ];
    for (pk, qk) in checks {
        if pk == 0. {
            if qk < 0. {
                return None
            }
        }
        else {
            let r = qk / pk;
            if pk < 0. {
                if r > t1 {
                    return None
                }
                if r > t0 {
                    t0 = r
                }
            }
            else {
                if r < t0 {
                    return None
                }
                if r < t1 {
                    t1 = r
                }
            }
        }
    }
    if t0 > t1 {
        return None
    }
    let a = if t0 == 0. { p } else { p + d * t0 };
    let b = if t1 == 1. { q } else { p + d * t1 };
    if a == b {
        return None
    }
    Some((a, b))
}

/// Clips a ring to a rectangle (Sutherland–Hodgman).
///
/// The ring is given without repeating the first point.
fn clip_polygon(ring: &[Point], rect: Rect) -> Vec<Point> {
    if ring.iter().all(|point| within(*point, rect)) {
        return ring.to_vec()
    }

    #[derive(Clone, Copy)]
    enum Edge { Left, Right, Top, Bottom }

    let inside = |point: Point, edge: Edge| match edge {
        Edge::Left => point.x >= rect.x0,
        Edge::Right => point.x <= rect.x1,
        Edge::Top => point.y >= rect.y0,
        Edge::Bottom => point.y <= rect.y1,
    };
    let intersect = |a: Point, b: Point, edge: Edge| {
        let d = b - a;
        match edge {
            Edge::Left | Edge::Right => {
                let x = if matches!(edge, Edge::Left) { rect.x0 }
                        else { rect.x1 };
                Point::new(x, a.y + d.y * (x - a.x) / d.x)
            }
            Edge::Top | Edge::Bottom => {
                let y = if matches!(edge, Edge::Top) { rect.y0 }
                        else { rect.y1 };
                Point::new(a.x + d.x * (y - a.y) / d.y, y)
            }
        }
    };

    let mut output = ring.to_vec();
    for edge in [Edge::Left, Edge::Right, Edge::Top, Edge::Bottom] {
        let input = mem::take(&mut output);
        let mut prev = match input.last() {
            Some(prev) => *prev,
            None => break,
        };
        for &point in &input {
            match (inside(prev, edge), inside(point, edge)) {
                (true, true) => output.push(point),
                (false, true) => {
                    output.push(intersect(prev, point, edge));
                    output.push(point);
                }
                (true, false) => output.push(intersect(prev, point, edge)),
                (false, false) => { }
            }
            prev = point;
        }
    }
    output.dedup();
    output
}


//============ Tests =========================================================
