/// Colors.

use std::fmt;
use std::convert::TryFrom;
use std::num::ParseIntError;
use serde::Deserialize;


/// A color.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq)]
#[serde(try_from = "String")]
pub struct Color {
    red: f64,
    green: f64,
    blue: f64,
    alpha: f64
}

impl Color {
    pub const fn rgb(red: f64, green: f64, blue: f64) -> Self {
        Color { red, green, blue, alpha: 1. }
    }

    pub const fn rgba(red: f64, green: f64, blue: f64, alpha: f64) -> Self {
        Color { red, green, blue, alpha }
    }

    pub const fn grey(level: f64) -> Self {
        Color::rgb(level, level, level)
    }

    pub fn hex(mut hex: &str) -> Result<Self, InvalidHexColor> {
        if let Some(stripped) = hex.strip_prefix('#') {
            hex = stripped;
        }
        if !hex.is_ascii() {
            return Err(InvalidHexColor)
        }
        let (r, g, b, a) = if hex.len() == 6 {
            (
                u8::from_str_radix(&hex[0..2], 16)?,
                u8::from_str_radix(&hex[2..4], 16)?,
                u8::from_str_radix(&hex[4..6], 16)?,
                0xFF,
            )
        }
        else if hex.len() == 8 {
            (
                u8::from_str_radix(&hex[0..2], 16)?,
                u8::from_str_radix(&hex[2..4], 16)?,
                u8::from_str_radix(&hex[4..6], 16)?,
                u8::from_str_radix(&hex[6..8], 16)?,
            )
        }
        else {
            return Err(InvalidHexColor)
        };
        Ok(Color::rgba(
            r as f64 / 255.,
            g as f64 / 255.,
            b as f64 / 255.,
            a as f64 / 255.,
        ))
    }

    /// Returns the color as an SVG `#rrggbb` value.
    ///
    /// Alpha isn’t part of the value, it goes into a separate opacity
    /// attribute.
    pub fn to_svg(self) -> String {
        fn component(x: f64) -> u8 {
            (x.clamp(0., 1.) * 255.).round() as u8
        }

        format!(
            "#{:02x}{:02x}{:02x}",
            component(self.red), component(self.green), component(self.blue)
        )
    }

    pub fn alpha(self) -> f64 {
        self.alpha
    }

    pub fn is_opaque(self) -> bool {
        self.alpha >= 1.
    }
}

impl Color {
    pub const WHITE: Color = Color::rgb(1., 1., 1.);
    pub const BLACK: Color = Color::rgb(0., 0., 0.);
    pub const RED: Color = Color::rgb(1., 0., 0.);
    pub const YELLOW: Color = Color::rgb(1., 1., 0.);
}

impl TryFrom<String> for Color {
    type Error = InvalidHexColor;

    fn try_from(src: String) -> Result<Self, Self::Error> {
        Self::hex(&src)
    }
}

impl<'a> TryFrom<&'a str> for Color {
    type Error = InvalidHexColor;

    fn try_from(src: &'a str) -> Result<Self, Self::Error> {
        Self::hex(src)
    }
}


//------------ InvalidHexColor -----------------------------------------------

#[derive(Clone, Copy, Debug)]
pub struct InvalidHexColor;

impl From<ParseIntError> for InvalidHexColor {
    fn from(_: ParseIntError) -> Self {
        InvalidHexColor
    }
}

impl fmt::Display for InvalidHexColor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("invalid color")
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hex_round_trip() {
        assert_eq!(Color::hex("#1a2B3c").unwrap().to_svg(), "#1a2b3c");
        assert_eq!(Color::hex("ffffff80").unwrap().to_svg(), "#ffffff");
        assert!(!Color::hex("ffffff80").unwrap().is_opaque());
        assert!(Color::hex("#fff").is_err());
        assert!(Color::hex("#gggggg").is_err());
    }
}
