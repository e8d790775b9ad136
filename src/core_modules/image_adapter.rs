// THEORY:
// The `image_adapter` is the boundary between the segmentation engines and real
// pixel buffers. The engines never see an image type: they read through
// `PixelSource` and write through `PixelSink`, and this module provides both for
// `image::RgbImage`.
//
// Key architectural principles:
// 1.  **Column-major flattening**: every flat array produced here is ordered
//     `index = height * x + y`. The superpixel engine finds a pixel from its
//     position through that formula, so the order is part of the contract.
// 2.  **Clamping at the edge**: colors are unclamped integers inside the engines and
//     only squeezed into bytes when they are written back.
// 3.  **File I/O stays in `image_helper`**: loading, resizing and PNG encoding are
//     kept in their own small module so the conversion code stays pure.

use crate::core_modules::color_space::ColorCielab;
use crate::core_modules::pixel_labxy::PixelLabxy;
use crate::core_modules::rgb::RgbVector;
use crate::core_modules::superpixel_region::SuperpixelRegion;
use crate::core_modules::vector::Position;
use image::{Rgb, RgbImage};
use rayon::prelude::*;

/// Read access to a grid of colors.
pub trait PixelSource {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Color at `(x, y)`. Callers stay within `width x height`.
    fn get_color(&self, x: u32, y: u32) -> RgbVector;

    fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    fn contains(&self, position: Position) -> bool {
        position.x() >= 0
            && position.y() >= 0
            && (position.x() as u32) < self.width()
            && (position.y() as u32) < self.height()
    }
}

/// Write access to a grid of colors.
pub trait PixelSink: PixelSource {
    fn set_color(&mut self, x: u32, y: u32, color: RgbVector);
}

impl PixelSource for RgbImage {
    fn width(&self) -> u32 {
        self.dimensions().0
    }

    fn height(&self) -> u32 {
        self.dimensions().1
    }

    fn get_color(&self, x: u32, y: u32) -> RgbVector {
        RgbVector::from(self.get_pixel(x, y).0)
    }
}

impl PixelSink for RgbImage {
    fn set_color(&mut self, x: u32, y: u32, color: RgbVector) {
        self.put_pixel(x, y, Rgb(color.to_channels()));
    }
}

/// A position with the color to paint there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagePixel {
    pub position: Position,
    pub color: RgbVector,
}

impl ImagePixel {
    pub const fn new(position: Position, color: RgbVector) -> Self {
        Self { position, color }
    }
}

#[inline]
fn column_major_position(index: usize, height: u32) -> Position {
    let height = height as usize;
    Position::new((index / height) as i32, (index % height) as i32)
}

/// Every position of the source, column-major.
pub fn to_positions<P: PixelSource + ?Sized>(source: &P) -> Vec<Position> {
    let height = source.height();
    (0..source.pixel_count())
        .map(|index| column_major_position(index, height))
        .collect()
}

/// Every pixel of the source as RGB, column-major.
pub fn to_image_pixels<P: PixelSource + ?Sized>(source: &P) -> Vec<ImagePixel> {
    to_positions(source)
        .into_iter()
        .map(|position| {
            let color = source.get_color(position.x() as u32, position.y() as u32);
            ImagePixel::new(position, color)
        })
        .collect()
}

/// Every pixel of the source lifted into LABXY space, column-major. Conversion runs in parallel.
pub fn to_labxy_pixels<P: PixelSource + Sync + ?Sized>(source: &P) -> Vec<PixelLabxy> {
    let height = source.height();
    (0..source.pixel_count())
        .into_par_iter()
        .map(|index| {
            let position = column_major_position(index, height);
            let color = source.get_color(position.x() as u32, position.y() as u32);
            PixelLabxy::new(ColorCielab::from_rgb(&color), position)
        })
        .collect()
}

/// Writes `pixels` into `sink`, skipping positions outside it. Returns how many were written.
pub fn paint_pixels<S: PixelSink + ?Sized>(sink: &mut S, pixels: &[ImagePixel]) -> usize {
    let mut painted = 0;
    for pixel in pixels {
        if sink.contains(pixel.position) {
            sink.set_color(pixel.position.x() as u32, pixel.position.y() as u32, pixel.color);
            painted += 1;
        }
    }
    painted
}

/// Outlines every region in `color`. Returns how many pixels were written.
pub fn render_boundaries<S, C>(
    sink: &mut S,
    regions: &[SuperpixelRegion<C>],
    color: RgbVector,
) -> usize
where
    S: PixelSink + ?Sized,
    C: Sync,
{
    let outline: Vec<ImagePixel> = regions
        .par_iter()
        .flat_map_iter(|region| {
            region
                .boundary()
                .into_iter()
                .map(move |position| ImagePixel::new(position, color))
        })
        .collect();
    paint_pixels(sink, &outline)
}

pub mod image_helper {
    use crate::error::Result;
    use image::codecs::png::PngEncoder;
    use image::imageops::FilterType;
    use image::{ExtendedColorType, ImageEncoder, RgbImage};
    use std::fs::File;
    use std::io::BufWriter;
    use std::path::Path;

    /// Decodes any format `image` understands into RGB, optionally resized to `(width, height)`.
    pub fn load<P: AsRef<Path>>(path: P, resize: Option<(u32, u32)>) -> Result<RgbImage> {
        let decoded = image::open(path)?.to_rgb8();
        Ok(match resize {
            Some((width, height)) if (width, height) != decoded.dimensions() => {
                image::imageops::resize(&decoded, width, height, FilterType::CatmullRom)
            }
            _ => decoded,
        })
    }

    /// Encodes `image` as PNG.
    pub fn save<P: AsRef<Path>>(path: P, image: &RgbImage) -> Result<()> {
        let output = BufWriter::new(File::create(path)?);
        let encoder = PngEncoder::new(output);
        let (width, height) = image.dimensions();

        encoder.write_image(image.as_raw(), width, height, ExtendedColorType::Rgb8)?;

        Ok(())
    }
}
