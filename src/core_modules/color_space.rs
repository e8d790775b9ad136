// THEORY (Color Space Conversion):
// Every distance the superpixel stage computes is measured in CIELAB, because
// Euclidean distance there approximates perceived color difference. Pixels arrive
// as device sRGB bytes, so this module owns the full conversion chain:
//
//     sRGB (0..255)  ->  XYZ (D65/2°, 0..100)  ->  CIELAB (L*, a*, b*)
//
// and the exact inverse chain back to sRGB for display.
//
// Key principles:
// 1) Stateless and deterministic: plain functions over `Copy` values.
// 2) Symmetric: the inverse direction mirrors each forward step with the same
//    thresholds (0.04045 / 0.0031308 for the sRGB transfer function, 0.008856 for
//    the CIELAB nonlinearity), so forward-then-inverse reproduces the input byte.
// 3) Fast path for bytes: the sRGB -> linear transfer function is a 256-entry
//    `OnceLock` table, so converting a whole image costs a lookup per channel
//    instead of a `powf`. Out-of-range channels fall back to the formula.

use crate::core_modules::rgb::RgbVector;
use std::ops::{Add, Div, Neg, Sub};
use std::sync::OnceLock;

pub type Component = f64;

/// D65 / 2° reference white.
pub const REFERENCE_X: Component = 95.047;
pub const REFERENCE_Y: Component = 100.0;
pub const REFERENCE_Z: Component = 108.883;

const SRGB_DECODE_THRESHOLD: Component = 0.04045;
const SRGB_ENCODE_THRESHOLD: Component = 0.0031308;
const LAB_EPSILON: Component = 0.008856;
const LAB_KAPPA: Component = 7.787;
const LAB_OFFSET: Component = 16.0 / 116.0;

static SRGB_TO_LINEAR_LUT: OnceLock<[Component; 256]> = OnceLock::new();

/// A color in CIE 1931 XYZ, scaled so that Y of the reference white is 100.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColorXyz {
    pub x: Component,
    pub y: Component,
    pub z: Component,
}

/// A color in CIELAB relative to the D65 reference white.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColorCielab {
    pub l: Component,
    pub a: Component,
    pub b: Component,
}

#[inline]
fn srgb_to_linear(normalized: Component) -> Component {
    if normalized > SRGB_DECODE_THRESHOLD {
        ((normalized + 0.055) / 1.055).powf(2.4)
    } else {
        normalized / 12.92
    }
}

#[inline]
fn linear_to_srgb(linear: Component) -> Component {
    if linear > SRGB_ENCODE_THRESHOLD {
        1.055 * linear.powf(1.0 / 2.4) - 0.055
    } else {
        12.92 * linear
    }
}

/// Gamma-decodes a channel into linear light in 0..1.
#[inline]
fn decode_channel(channel: i32) -> Component {
    if (0..=255).contains(&channel) {
        let table = SRGB_TO_LINEAR_LUT.get_or_init(|| {
            let mut table = [0.0; 256];
            for (value, entry) in table.iter_mut().enumerate() {
                *entry = srgb_to_linear(value as Component / 255.0);
            }
            table
        });
        table[channel as usize]
    } else {
        srgb_to_linear(channel as Component / 255.0)
    }
}

#[inline]
fn lab_forward(t: Component) -> Component {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        LAB_KAPPA * t + LAB_OFFSET
    }
}

#[inline]
fn lab_inverse(t: Component) -> Component {
    let cubed = t * t * t;
    if cubed > LAB_EPSILON {
        cubed
    } else {
        (t - LAB_OFFSET) / LAB_KAPPA
    }
}

pub fn rgb_to_xyz(rgb: &RgbVector) -> ColorXyz {
    let red = decode_channel(rgb.red) * 100.0;
    let green = decode_channel(rgb.green) * 100.0;
    let blue = decode_channel(rgb.blue) * 100.0;

    ColorXyz {
        x: red * 0.4124 + green * 0.3576 + blue * 0.1805,
        y: red * 0.2126 + green * 0.7152 + blue * 0.0722,
        z: red * 0.0193 + green * 0.1192 + blue * 0.9505,
    }
}

pub fn xyz_to_cielab(xyz: &ColorXyz) -> ColorCielab {
    let x = lab_forward(xyz.x / REFERENCE_X);
    let y = lab_forward(xyz.y / REFERENCE_Y);
    let z = lab_forward(xyz.z / REFERENCE_Z);

    ColorCielab {
        l: 116.0 * y - 16.0,
        a: 500.0 * (x - y),
        b: 200.0 * (y - z),
    }
}

pub fn cielab_to_xyz(lab: &ColorCielab) -> ColorXyz {
    let y = (lab.l + 16.0) / 116.0;
    let x = lab.a / 500.0 + y;
    let z = y - lab.b / 200.0;

    ColorXyz {
        x: lab_inverse(x) * REFERENCE_X,
        y: lab_inverse(y) * REFERENCE_Y,
        z: lab_inverse(z) * REFERENCE_Z,
    }
}

/// Rounds to the nearest integer channel. Values outside 0..=255 are returned as-is.
pub fn xyz_to_rgb(xyz: &ColorXyz) -> RgbVector {
    let x = xyz.x / 100.0;
    let y = xyz.y / 100.0;
    let z = xyz.z / 100.0;

    let red = x * 3.2406 + y * -1.5372 + z * -0.4986;
    let green = x * -0.9689 + y * 1.8758 + z * 0.0415;
    let blue = x * 0.0557 + y * -0.2040 + z * 1.0570;

    RgbVector::new(
        (linear_to_srgb(red) * 255.0).round() as i32,
        (linear_to_srgb(green) * 255.0).round() as i32,
        (linear_to_srgb(blue) * 255.0).round() as i32,
    )
}

pub fn rgb_to_cielab(rgb: &RgbVector) -> ColorCielab {
    xyz_to_cielab(&rgb_to_xyz(rgb))
}

pub fn cielab_to_rgb(lab: &ColorCielab) -> RgbVector {
    xyz_to_rgb(&cielab_to_xyz(lab))
}

impl ColorXyz {
    pub fn from_rgb(rgb: &RgbVector) -> Self {
        rgb_to_xyz(rgb)
    }

    pub fn to_rgb(&self) -> RgbVector {
        xyz_to_rgb(self)
    }
}

impl ColorCielab {
    pub const fn new(l: Component, a: Component, b: Component) -> Self {
        Self { l, a, b }
    }

    pub fn from_rgb(rgb: &RgbVector) -> Self {
        rgb_to_cielab(rgb)
    }

    pub fn from_xyz(xyz: &ColorXyz) -> Self {
        xyz_to_cielab(xyz)
    }

    pub fn to_xyz(&self) -> ColorXyz {
        cielab_to_xyz(self)
    }

    pub fn to_rgb(&self) -> RgbVector {
        cielab_to_rgb(self)
    }

    /// Squared length of the (L, a, b) vector.
    #[inline]
    pub fn norm_squared(&self) -> Component {
        self.l * self.l + self.a * self.a + self.b * self.b
    }

    #[inline]
    pub fn distance_squared(&self, other: &ColorCielab) -> Component {
        (*self - *other).norm_squared()
    }
}

impl Neg for ColorCielab {
    type Output = ColorCielab;

    fn neg(self) -> ColorCielab {
        ColorCielab::new(-self.l, -self.a, -self.b)
    }
}

impl Add for ColorCielab {
    type Output = ColorCielab;

    fn add(self, other: ColorCielab) -> ColorCielab {
        ColorCielab::new(self.l + other.l, self.a + other.a, self.b + other.b)
    }
}

impl Sub for ColorCielab {
    type Output = ColorCielab;

    fn sub(self, other: ColorCielab) -> ColorCielab {
        ColorCielab::new(self.l - other.l, self.a - other.a, self.b - other.b)
    }
}

impl Div<Component> for ColorCielab {
    type Output = ColorCielab;

    fn div(self, divisor: Component) -> ColorCielab {
        ColorCielab::new(self.l / divisor, self.a / divisor, self.b / divisor)
    }
}
