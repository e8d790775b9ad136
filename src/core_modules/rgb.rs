// THEORY:
// The `rgb` module is the device-color half of the color model. An `RgbVector` is
// an integer triplet that the color clustering stage treats as a point in a 3D
// space: it is added, subtracted, scaled and averaged like any other vector, and
// compared by squared Euclidean distance.
//
// Key principles:
// 1) No clamping in the type: intermediate sums and differences routinely leave
//    the 0..255 range, so clamping only happens at the image boundary
//    (`to_channels`).
// 2) Hue rotation goes through `ColorHsv`, the only place where the HSV model is
//    used. It exists to spread initial color centroids evenly around the wheel.

use crate::core_modules::vector::Mean;
use std::ops::{Add, Div, Mul, Neg, Sub};

pub type Channel = i32;
pub type Hue = f64;
pub type Saturation = f64;
pub type Value = f64;

/// An integer (R, G, B) triplet. Each channel is intended to be in 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RgbVector {
    pub red: Channel,
    pub green: Channel,
    pub blue: Channel,
}

impl RgbVector {
    pub const ZERO: RgbVector = RgbVector::new(0, 0, 0);

    pub const fn new(red: Channel, green: Channel, blue: Channel) -> Self {
        Self { red, green, blue }
    }

    pub fn distance_to_squared(&self, other: &RgbVector) -> i64 {
        let dr = (self.red - other.red) as i64;
        let dg = (self.green - other.green) as i64;
        let db = (self.blue - other.blue) as i64;
        dr * dr + dg * dg + db * db
    }

    pub fn dot(&self, other: &RgbVector) -> i64 {
        self.red as i64 * other.red as i64
            + self.green as i64 * other.green as i64
            + self.blue as i64 * other.blue as i64
    }

    /// Index of the nearest vector in `candidates`; the first one wins on ties.
    pub fn closest_index(&self, candidates: &[RgbVector]) -> Option<usize> {
        let mut best: Option<(usize, i64)> = None;
        for (index, candidate) in candidates.iter().enumerate() {
            let distance = self.distance_to_squared(candidate);
            if best.is_none_or(|(_, best_distance)| distance < best_distance) {
                best = Some((index, distance));
            }
        }
        best.map(|(index, _)| index)
    }

    /// Rotates the hue by one step of a circle split into `divisions` segments.
    pub fn hsv_rotated(&self, divisions: usize) -> RgbVector {
        if divisions == 0 {
            return *self;
        }
        self.hue_rotated(360.0 / divisions as f64)
    }

    pub fn hue_rotated(&self, degrees: f64) -> RgbVector {
        ColorHsv::from_rgb(self).rotated(degrees).to_rgb()
    }

    /// Channels clamped into the displayable byte range.
    pub fn to_channels(&self) -> [u8; 3] {
        [
            self.red.clamp(0, 255) as u8,
            self.green.clamp(0, 255) as u8,
            self.blue.clamp(0, 255) as u8,
        ]
    }
}

impl From<[u8; 3]> for RgbVector {
    fn from(channels: [u8; 3]) -> Self {
        RgbVector::new(channels[0] as Channel, channels[1] as Channel, channels[2] as Channel)
    }
}

impl Neg for RgbVector {
    type Output = RgbVector;

    fn neg(self) -> RgbVector {
        RgbVector::new(-self.red, -self.green, -self.blue)
    }
}

impl Add for RgbVector {
    type Output = RgbVector;

    fn add(self, other: RgbVector) -> RgbVector {
        RgbVector::new(self.red + other.red, self.green + other.green, self.blue + other.blue)
    }
}

impl Sub for RgbVector {
    type Output = RgbVector;

    fn sub(self, other: RgbVector) -> RgbVector {
        self + (-other)
    }
}

impl Mul<Channel> for RgbVector {
    type Output = RgbVector;

    fn mul(self, factor: Channel) -> RgbVector {
        RgbVector::new(self.red * factor, self.green * factor, self.blue * factor)
    }
}

/// Truncating division, channel-wise.
impl Div<Channel> for RgbVector {
    type Output = RgbVector;

    fn div(self, divisor: Channel) -> RgbVector {
        RgbVector::new(self.red / divisor, self.green / divisor, self.blue / divisor)
    }
}

impl Mean for RgbVector {
    fn mean(colors: &[RgbVector]) -> Option<RgbVector> {
        if colors.is_empty() {
            return None;
        }
        let count = colors.len() as i64;
        let (r, g, b) = colors.iter().fold((0i64, 0i64, 0i64), |(r, g, b), c| {
            (r + c.red as i64, g + c.green as i64, b + c.blue as i64)
        });
        Some(RgbVector::new(
            (r / count) as Channel,
            (g / count) as Channel,
            (b / count) as Channel,
        ))
    }
}

/// A color in the HSV model: hue in [0, 360), saturation and value in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorHsv {
    pub hue: Hue,
    pub saturation: Saturation,
    pub value: Value,
}

impl ColorHsv {
    pub fn from_rgb(color: &RgbVector) -> Self {
        let [red, green, blue] = color.to_channels();
        let red = red as f64 / 255.0;
        let green = green as f64 / 255.0;
        let blue = blue as f64 / 255.0;

        let maximum_channel = red.max(green.max(blue));
        let minimum_channel = red.min(green.min(blue));
        let chroma = maximum_channel - minimum_channel;

        let hue = if chroma <= 1e-9 {
            0.0
        } else {
            let (base_difference, sector_offset) = if maximum_channel == red {
                (green - blue, 0.0)
            } else if maximum_channel == green {
                (blue - red, 2.0)
            } else {
                (red - green, 4.0)
            };
            let degrees = (base_difference / chroma + sector_offset) * 60.0;
            if degrees < 0.0 { degrees + 360.0 } else { degrees }
        };

        let saturation = if maximum_channel <= 1e-9 {
            0.0
        } else {
            1.0 - minimum_channel / maximum_channel
        };

        Self {
            hue,
            saturation,
            value: maximum_channel,
        }
    }

    /// Copy of this color with the hue moved by `degrees`, wrapped into [0, 360).
    pub fn rotated(&self, degrees: f64) -> Self {
        Self {
            hue: (self.hue + degrees).rem_euclid(360.0),
            ..*self
        }
    }

    pub fn to_rgb(&self) -> RgbVector {
        let sector = (self.hue / 60.0).floor();
        let fraction = self.hue / 60.0 - sector;
        let sector = (sector as i64).rem_euclid(6);

        let value = self.value * 255.0;
        let v = value.round() as Channel;
        let p = (value * (1.0 - self.saturation)).round() as Channel;
        let q = (value * (1.0 - fraction * self.saturation)).round() as Channel;
        let t = (value * (1.0 - (1.0 - fraction) * self.saturation)).round() as Channel;

        match sector {
            0 => RgbVector::new(v, t, p),
            1 => RgbVector::new(q, v, p),
            2 => RgbVector::new(p, v, t),
            3 => RgbVector::new(p, q, v),
            4 => RgbVector::new(t, p, v),
            _ => RgbVector::new(v, p, q),
        }
    }
}
