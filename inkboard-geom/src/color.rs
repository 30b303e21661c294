// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::str::FromStr;

use crate::FuzzyEq;

/// An RGBA color with components in `[0, 1]`.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Color {
    #[allow(missing_docs)]
    pub r: f64,
    #[allow(missing_docs)]
    pub g: f64,
    #[allow(missing_docs)]
    pub b: f64,
    #[allow(missing_docs)]
    pub a: f64,
}

/// A color string that could not be parsed.
#[derive(Clone, PartialEq, Debug)]
pub struct ColorParseError(pub String);

impl std::fmt::Display for ColorParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "invalid color '{}'", self.0)
    }
}

impl std::error::Error for ColorParseError {}

impl Color {
    /// Fully transparent black.
    pub const TRANSPARENT: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };
    /// Opaque black.
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };
    /// Opaque white.
    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };

    /// Creates an opaque color.
    #[inline]
    pub const fn rgb(r: f64, g: f64, b: f64) -> Color {
        Color { r, g, b, a: 1.0 }
    }

    /// Creates a color with alpha.
    #[inline]
    pub const fn rgba(r: f64, g: f64, b: f64, a: f64) -> Color {
        Color { r, g, b, a }
    }

    /// Creates a color from 8-bit components.
    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Color {
        Color::rgba(
            f64::from(r) / 255.0,
            f64::from(g) / 255.0,
            f64::from(b) / 255.0,
            f64::from(a) / 255.0,
        )
    }

    /// Parses a CSS color.
    ///
    /// Accepts `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`, named colors,
    /// `rgb(…)`/`rgba(…)`, and the keywords `none`/`transparent`.
    pub fn from_string(text: &str) -> Result<Color, ColorParseError> {
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case("none") || trimmed.eq_ignore_ascii_case("transparent") {
            return Ok(Color::TRANSPARENT);
        }

        let c = svgtypes::Color::from_str(trimmed)
            .map_err(|_| ColorParseError(text.to_string()))?;
        Ok(Color::from_rgba8(c.red, c.green, c.blue, c.alpha))
    }

    /// Serializes as a lowercase hex string.
    ///
    /// Opaque colors produce `#rrggbb`; anything else `#rrggbbaa`. The
    /// output is deterministic for a given color.
    pub fn to_hex_string(&self) -> String {
        let to8 = |v: f64| (v.max(0.0).min(1.0) * 255.0).round() as u8;
        if to8(self.a) == 255 {
            format!("#{:02x}{:02x}{:02x}", to8(self.r), to8(self.g), to8(self.b))
        } else {
            format!(
                "#{:02x}{:02x}{:02x}{:02x}",
                to8(self.r),
                to8(self.g),
                to8(self.b),
                to8(self.a)
            )
        }
    }

    /// Returns `true` if the color is fully transparent.
    #[inline]
    pub fn is_transparent(&self) -> bool {
        self.a <= 0.0
    }

    /// Mixes `fraction` of `other` into `self`, component-wise.
    pub fn mix(&self, other: Color, fraction: f64) -> Color {
        let t = fraction.max(0.0).min(1.0);
        Color::rgba(
            self.r + (other.r - self.r) * t,
            self.g + (other.g - self.g) * t,
            self.b + (other.b - self.b) * t,
            self.a + (other.a - self.a) * t,
        )
    }

    /// Relative luminance of the color, ignoring alpha.
    pub fn luminance(&self) -> f64 {
        0.2126 * self.r + 0.7152 * self.g + 0.0722 * self.b
    }

    /// Chooses a contrasting rule color for grid backgrounds: darker
    /// colors get a lighter rule and vice versa.
    pub fn contrasting_shade(&self) -> Color {
        if self.luminance() > 0.5 {
            self.mix(Color::BLACK, 0.22)
        } else {
            self.mix(Color::WHITE, 0.22)
        }
    }
}

impl FuzzyEq for Color {
    fn fuzzy_eq(&self, other: &Self) -> bool {
        // Component equality finer than 8-bit quantization.
        let close = |a: f64, b: f64| (a - b).abs() < 0.5 / 255.0;
        close(self.r, other.r)
            && close(self.g, other.g)
            && close(self.b, other.b)
            && close(self.a, other.a)
    }
}
