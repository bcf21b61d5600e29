//! Transformations from geographic into drawing coordinates.
//!
//! The projection is a local equirectangular approximation on a spherical
//! earth. One degree of latitude is always [`METERS_PER_DEGREE`] while a
//! degree of longitude shrinks with the cosine of the bounding box’s mid
//! latitude. This is good enough for the few square kilometres a single
//! drawing covers.
//!
//! Drawing coordinates are millimetres with the origin in the north-west
//! corner and the y axis pointing south.

use std::fmt;
use kurbo::{Point, Rect};
use thiserror::Error;
use crate::feature::Coord;


/// The length of one degree of latitude in meters.
pub const METERS_PER_DEGREE: f64 = 111_320.;


//------------ BoundingBox ---------------------------------------------------

/// The geographic extent of a drawing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    north: f64,
    south: f64,
    east: f64,
    west: f64,
}

impl BoundingBox {
    pub fn new(
        north: f64, south: f64, east: f64, west: f64
    ) -> Result<Self, InvalidBoundingBoxError> {
        if ![north, south, east, west].iter().all(|v| v.is_finite()) {
            return Err(InvalidBoundingBoxError::NotFinite)
        }
        if !(-90. ..=90.).contains(&north) || !(-90. ..=90.).contains(&south)
            || !(-180. ..=180.).contains(&east)
            || !(-180. ..=180.).contains(&west)
        {
            return Err(InvalidBoundingBoxError::OutOfRange)
        }
        if north <= south {
            return Err(InvalidBoundingBoxError::Latitude { north, south })
        }
        if east <= west {
            return Err(InvalidBoundingBoxError::Longitude { east, west })
        }
        Ok(BoundingBox { north, south, east, west })
    }

    /// Creates a box from the `[north, west, east, south]` order used in
    /// project configurations.
    pub fn from_nwes(
        nwes: [f64; 4]
    ) -> Result<Self, InvalidBoundingBoxError> {
        let [north, west, east, south] = nwes;
        Self::new(north, south, east, west)
    }

    pub fn north(&self) -> f64 {
        self.north
    }

    pub fn south(&self) -> f64 {
        self.south
    }

    pub fn east(&self) -> f64 {
        self.east
    }

    pub fn west(&self) -> f64 {
        self.west
    }

    pub fn mid_lat(&self) -> f64 {
        (self.north + self.south) / 2.
    }

    pub fn center(&self) -> Coord {
        Coord::new(self.mid_lat(), (self.east + self.west) / 2.)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f, "N {} S {} W {} E {}",
            self.north, self.south, self.west, self.east
        )
    }
}


//------------ Dimension -----------------------------------------------------

/// The one physical dimension of a drawing requested by the user.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Dimension {
    /// The drawing’s width in millimetres.
    Width(f64),

    /// The drawing’s height in millimetres.
    Height(f64),
}

impl Dimension {
    pub fn mm(self) -> f64 {
        match self {
            Dimension::Width(mm) | Dimension::Height(mm) => mm
        }
    }
}


//------------ ProjectionScale -----------------------------------------------

/// The projection of one run, derived from the bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectionScale {
    bbox: BoundingBox,
    requested: Dimension,

    /// Meters per degree of longitude at the mid latitude.
    meters_per_lon: f64,

    real_width: f64,
    real_height: f64,

    /// Real-world meters per drawing millimetre.
    factor: f64,

    width_mm: f64,
    height_mm: f64,
}

impl ProjectionScale {
    pub fn new(
        bbox: BoundingBox, requested: Dimension
    ) -> Result<Self, InvalidBoundingBoxError> {
        let mm = requested.mm();
        if !mm.is_finite() || mm <= 0. {
            return Err(InvalidBoundingBoxError::Dimension(mm))
        }
        let meters_per_lon =
            METERS_PER_DEGREE * bbox.mid_lat().to_radians().cos();
        let real_width = (bbox.east - bbox.west) * meters_per_lon;
        let real_height = (bbox.north - bbox.south) * METERS_PER_DEGREE;
        if !(real_width > 0.) || !(real_height > 0.) {
            return Err(InvalidBoundingBoxError::Degenerate)
        }
        let (factor, width_mm, height_mm) = match requested {
            Dimension::Width(mm) => {
                let factor = real_width / mm;
                (factor, mm, real_height / factor)
            }
            Dimension::Height(mm) => {
                let factor = real_height / mm;
                (factor, real_width / factor, mm)
            }
        };
        if !factor.is_finite() || factor <= 0. {
            return Err(InvalidBoundingBoxError::Degenerate)
        }
        Ok(ProjectionScale {
            bbox, requested, meters_per_lon, real_width, real_height,
            factor, width_mm, height_mm
        })
    }

    /// Projects a geographic position into drawing millimetres.
    pub fn apply(&self, coord: Coord) -> Point {
        Point::new(
            (coord.lon - self.bbox.west) * self.meters_per_lon / self.factor,
            (self.bbox.north - coord.lat) * METERS_PER_DEGREE / self.factor,
        )
    }

    /// Returns the geographic position of a drawing point.
    pub fn invert(&self, point: Point) -> Coord {
        Coord::new(
            self.bbox.north - point.y * self.factor / METERS_PER_DEGREE,
            self.bbox.west + point.x * self.factor / self.meters_per_lon,
        )
    }

    pub fn apply_all(&self, coords: &[Coord]) -> Vec<Point> {
        coords.iter().map(|coord| self.apply(*coord)).collect()
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn requested(&self) -> Dimension {
        self.requested
    }

    pub fn meters_per_lat(&self) -> f64 {
        METERS_PER_DEGREE
    }

    pub fn meters_per_lon(&self) -> f64 {
        self.meters_per_lon
    }

    pub fn real_width(&self) -> f64 {
        self.real_width
    }

    pub fn real_height(&self) -> f64 {
        self.real_height
    }

    /// Returns real-world meters per drawing millimetre.
    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn width_mm(&self) -> f64 {
        self.width_mm
    }

    pub fn height_mm(&self) -> f64 {
        self.height_mm
    }

    /// Returns the drawing area in drawing coordinates.
    pub fn drawing_rect(&self) -> Rect {
        Rect::new(0., 0., self.width_mm, self.height_mm)
    }

    pub fn report(&self) -> ScaleReport {
        ScaleReport::new(self)
    }
}


//------------ ScaleReport ---------------------------------------------------

/// The values reported to the user after projecting.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleReport {
    pub real_width_m: f64,
    pub real_height_m: f64,
    pub width_mm: f64,
    pub height_mm: f64,

    /// The `N` in a scale of 1:N.
    pub scale_ratio: u64,

    pub meters_per_map_cm: f64,
    pub map_cm_per_real_km: f64,
    pub real_km_per_map_cm: f64,
}

/// Reference sizes for which equivalent drawing sizes are reported.
const REFERENCE_SIZES: [f64; 4] = [100., 150., 200., 300.];

impl ScaleReport {
    fn new(scale: &ProjectionScale) -> Self {
        let factor = scale.factor();
        ScaleReport {
            real_width_m: scale.real_width(),
            real_height_m: scale.real_height(),
            width_mm: scale.width_mm(),
            height_mm: scale.height_mm(),
            scale_ratio: (factor * 1000.).round() as u64,
            meters_per_map_cm: factor * 10.,
            map_cm_per_real_km: 100. / factor,
            real_km_per_map_cm: factor / 100.,
        }
    }

    /// Returns the sizes of the drawing scaled to the reference widths and
    /// then to the reference heights.
    pub fn equivalent_sizes(&self) -> Vec<(f64, f64)> {
        let aspect = self.height_mm / self.width_mm;
        REFERENCE_SIZES.iter().map(|w| (*w, w * aspect)).chain(
            REFERENCE_SIZES.iter().map(|h| (h / aspect, *h))
        ).collect()
    }

    pub fn log(&self) {
        tracing::info!(
            "original dimensions: {:.0}m x {:.0}m",
            self.real_width_m, self.real_height_m
        );
        tracing::info!(
            "scaled dimensions: {:.2}mm x {:.2}mm",
            self.width_mm, self.height_mm
        );
        for (width, height) in self.equivalent_sizes() {
            tracing::info!(
                "corresponding to {:.0}mm x {:.0}mm", width, height
            );
        }
        tracing::info!("map scale: 1:{}", self.scale_ratio);
        tracing::info!(
            "1cm on map = {:.2}m in reality", self.meters_per_map_cm
        );
        tracing::info!(
            "1km in reality = {:.3}cm on map", self.map_cm_per_real_km
        );
        tracing::info!(
            "1cm on map = {:.4}km in reality", self.real_km_per_map_cm
        );
    }
}


//------------ InvalidBoundingBoxError ---------------------------------------

/// The bounding box or requested size cannot produce a drawing.
#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum InvalidBoundingBoxError {
    #[error("bounding box contains non-finite values")]
    NotFinite,

    #[error("bounding box outside of valid latitude/longitude range")]
    OutOfRange,

    #[error("north {north} is not north of south {south}")]
    Latitude { north: f64, south: f64 },

    #[error("east {east} is not east of west {west}")]
    Longitude { east: f64, west: f64 },

    #[error("bounding box has no extent")]
    Degenerate,

    #[error("invalid drawing size {0}mm")]
    Dimension(f64),
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    fn brest() -> BoundingBox {
        BoundingBox::new(48.395, 48.375, -4.47, -4.51).unwrap()
    }

    #[test]
    fn center_maps_to_center() {
        for dim in [Dimension::Width(300.), Dimension::Height(420.)] {
            let scale = ProjectionScale::new(brest(), dim).unwrap();
            let center = scale.apply(brest().center());
            assert!((center.x - scale.width_mm() / 2.).abs() < 1e-9);
            assert!((center.y - scale.height_mm() / 2.).abs() < 1e-9);
        }
    }

    #[test]
    fn corners_map_to_corners() {
        let bbox = brest();
        let scale = ProjectionScale::new(bbox, Dimension::Width(300.)).unwrap();
        let nw = scale.apply(Coord::new(bbox.north(), bbox.west()));
        let se = scale.apply(Coord::new(bbox.south(), bbox.east()));
        assert!(nw.x.abs() < 1e-9 && nw.y.abs() < 1e-9);
        assert!((se.x - 300.).abs() < 1e-9);
        assert!((se.y - scale.height_mm()).abs() < 1e-9);

        let back = scale.invert(Point::new(300., scale.height_mm()));
        assert!((back.lat - bbox.south()).abs() < 1e-9);
        assert!((back.lon - bbox.east()).abs() < 1e-9);
    }

    #[test]
    fn north_is_up() {
        let scale = ProjectionScale::new(
            brest(), Dimension::Width(300.)
        ).unwrap();
        let upper = scale.apply(Coord::new(48.39, -4.49));
        let lower = scale.apply(Coord::new(48.38, -4.49));
        assert!(upper.y < lower.y);
        assert_eq!(upper.x, lower.x);
    }

    #[test]
    fn derived_dimension_keeps_aspect() {
        let scale = ProjectionScale::new(
            brest(), Dimension::Width(300.)
        ).unwrap();
        assert_eq!(scale.width_mm(), 300.);
        let real = scale.real_height() / scale.real_width();
        assert!((scale.height_mm() / scale.width_mm() - real).abs() < 1e-12);

        let scale = ProjectionScale::new(
            brest(), Dimension::Height(200.)
        ).unwrap();
        assert_eq!(scale.height_mm(), 200.);
        let real = scale.real_width() / scale.real_height();
        assert!((scale.width_mm() / scale.height_mm() - real).abs() < 1e-12);
    }

    #[test]
    fn longitude_shrinks_with_latitude() {
        let scale = ProjectionScale::new(
            brest(), Dimension::Width(300.)
        ).unwrap();
        let expected = METERS_PER_DEGREE * 48.385f64.to_radians().cos();
        assert!((scale.meters_per_lon() - expected).abs() < 1e-6);
        assert_eq!(scale.meters_per_lat(), METERS_PER_DEGREE);
    }

    #[test]
    fn rejects_bad_boxes() {
        assert_eq!(
            BoundingBox::new(48.0, 48.0, 1., 0.),
            Err(InvalidBoundingBoxError::Latitude { north: 48., south: 48. })
        );
        assert!(matches!(
            BoundingBox::new(47.0, 48.0, 1., 0.),
            Err(InvalidBoundingBoxError::Latitude { .. })
        ));
        assert!(matches!(
            BoundingBox::new(48.0, 47.0, 0., 0.),
            Err(InvalidBoundingBoxError::Longitude { .. })
        ));
        assert_eq!(
            BoundingBox::new(f64::NAN, 47.0, 1., 0.),
            Err(InvalidBoundingBoxError::NotFinite)
        );
        assert!(matches!(
            ProjectionScale::new(brest(), Dimension::Width(0.)),
            Err(InvalidBoundingBoxError::Dimension(_))
        ));
    }

    #[test]
    fn report_values() {
        // 10 km wide at the equator drawn 200mm wide is 1:50,000.
        let bbox = BoundingBox::new(
            0.05, -0.05, 10_000. / METERS_PER_DEGREE, 0.
        ).unwrap();
        let report = ProjectionScale::new(
            bbox, Dimension::Width(200.)
        ).unwrap().report();
        assert_eq!(report.scale_ratio, 50_000);
        assert!((report.map_cm_per_real_km - 2.).abs() < 1e-9);
        assert!((report.real_km_per_map_cm - 0.5).abs() < 1e-9);
        assert!((report.meters_per_map_cm - 500.).abs() < 1e-9);
        assert_eq!(report.equivalent_sizes().len(), 8);
    }
}
