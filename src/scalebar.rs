//! The scale bar drawing.

use std::fmt;
use serde::Deserialize;
use svg::Document;
use svg::node::element::{Group, Line};
use crate::color::Color;
use crate::projection::ProjectionScale;
use crate::render::{document, number, paint, rect};


/// The share of the drawing width the bar may take at most.
const MAX_WIDTH_SHARE: f64 = 0.25;

/// The mantissas of the round distances, largest first.
const MANTISSAS: [f64; 3] = [5., 2., 1.];


//------------ ScaleBarStyle -------------------------------------------------

/// How the scale bar is drawn.
///
/// All lengths are in millimetres.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScaleBarStyle {
    pub bar_height: f64,
    pub main_tick: f64,
    pub minor_tick: f64,
    pub color: Color,
    pub stroke_width: f64,
    pub padding: f64,

    /// A fixed distance in meters instead of picking one.
    pub distance_m: Option<f64>,
}

impl Default for ScaleBarStyle {
    fn default() -> Self {
        ScaleBarStyle {
            bar_height: 3.,
            main_tick: 5.,
            minor_tick: 3.,
            color: Color::BLACK,
            stroke_width: 0.5,
            padding: 5.,
            distance_m: None,
        }
    }
}


//------------ ScaleBar ------------------------------------------------------

/// A bar representing a round real-world distance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleBar {
    /// The distance represented by the bar in meters.
    distance_m: f64,

    /// The length of the bar on the drawing.
    length_mm: f64,
}

impl ScaleBar {
    /// Picks a round distance for the given projection.
    pub fn choose(scale: &ProjectionScale) -> Self {
        Self::choose_for(scale.factor(), scale.width_mm())
    }

    /// Picks the largest 1-2-5 distance that fits a quarter of the width.
    ///
    /// Since neighbouring candidates differ by at most a factor of 2.5, the
    /// bar always takes at least a tenth of the width.
    fn choose_for(factor: f64, width_mm: f64) -> Self {
        let target = width_mm * MAX_WIDTH_SHARE * factor;
        let exp = target.log10().floor() as i32;
        let base = 10f64.powi(exp);
        let distance_m = MANTISSAS.iter().map(|m| m * base).find(|d| {
            *d <= target
        }).unwrap_or(base);
        ScaleBar { distance_m, length_mm: distance_m / factor }
    }

    /// Uses a fixed distance instead.
    pub fn with_distance(scale: &ProjectionScale, distance_m: f64) -> Self {
        ScaleBar { distance_m, length_mm: distance_m / scale.factor() }
    }

    /// Returns the bar for the style’s fixed distance or a round one.
    pub fn for_style(scale: &ProjectionScale, style: &ScaleBarStyle) -> Self {
        match style.distance_m {
            Some(distance) if distance > 0. => {
                Self::with_distance(scale, distance)
            }
            _ => Self::choose(scale),
        }
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    pub fn length_mm(&self) -> f64 {
        self.length_mm
    }

    /// Returns a label such as “500 m” or “2 km”.
    pub fn label(&self) -> String {
        if self.distance_m < 1000. {
            format!("{} m", number(self.distance_m))
        }
        else {
            format!("{} km", number(self.distance_m / 1000.))
        }
    }

    /// Draws the bar with ticks above it.
    ///
    /// Main ticks are at the start, middle, and end of the bar, minor ticks
    /// at the quarters.
    pub fn render(&self, style: &ScaleBarStyle) -> Document {
        let width = self.length_mm + 2. * style.padding;
        let height = style.bar_height + style.main_tick + 2. * style.padding;
        let bar_y = height - style.padding - style.bar_height;
        let color = Some(style.color);

        let bar = paint(
            rect(style.padding, bar_y, self.length_mm, style.bar_height),
            "fill", color
        );

        let mut ticks = paint(
            Group::new().set("stroke-width", number(style.stroke_width)),
            "stroke", color
        );
        let len = self.length_mm;
        let marks = [
            (0., style.main_tick),
            (len / 4., style.minor_tick),
            (len / 2., style.main_tick),
            (len * 3. / 4., style.minor_tick),
            (len, style.main_tick),
        ];
        for (x, tick) in marks {
            let x = number(style.padding + x);
            ticks = ticks.add(
                Line::new()
                    .set("x1", x.as_str())
                    .set("y1", number(bar_y - tick))
                    .set("x2", x.as_str())
                    .set("y2", number(bar_y + style.bar_height))
            );
        }

        document(width, height)
            .add(Group::new().set("id", "scale_bar").add(bar).add(ticks))
    }
}

impl fmt::Display for ScaleBar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} = {:.2} mm", self.label(), self.length_mm)
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::projection::{BoundingBox, Dimension, METERS_PER_DEGREE};

    #[test]
    fn round_distance_at_fifty_thousand() {
        // 200 mm at 1:50,000 covers 10 km.
        let bar = ScaleBar::choose_for(50., 200.);
        assert_eq!(bar.distance_m(), 2000.);
        assert_eq!(bar.length_mm(), 40.);
        assert_eq!(bar.label(), "2 km");
        assert!(bar.length_mm() >= 10. && bar.length_mm() <= 80.);
    }

    #[test]
    fn bar_stays_within_share() {
        for factor in [0.3, 1., 2.7, 13., 50., 120., 999.] {
            for width in [80., 200., 450.] {
                let bar = ScaleBar::choose_for(factor, width);
                let share = bar.length_mm() / width;
                assert!(share >= 0.1 - 1e-9, "{} {}", factor, width);
                assert!(share <= 0.25 + 1e-9, "{} {}", factor, width);
            }
        }
    }

    #[test]
    fn bar_from_projection() {
        let bbox = BoundingBox::new(
            0.05, -0.05, 10_000. / METERS_PER_DEGREE, 0.
        ).unwrap();
        let scale = ProjectionScale::new(bbox, Dimension::Width(200.)).unwrap();
        let bar = ScaleBar::choose(&scale);
        assert_eq!(bar.distance_m(), 2000.);
        assert!((bar.length_mm() - 40.).abs() < 0.01);

        let style = ScaleBarStyle {
            distance_m: Some(500.), .. Default::default()
        };
        let bar = ScaleBar::for_style(&scale, &style);
        assert_eq!(bar.label(), "500 m");
        let svg = bar.render(&style).to_string();
        assert!(svg.contains("<line"));
        assert!(svg.contains(r#"height="18.00mm""#));
    }
}
