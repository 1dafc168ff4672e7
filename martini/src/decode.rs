//! Terrain-RGB elevation decoding.
//!
//! # References
//!
//! 1. [Mapbox Terrain-RGB](https://docs.mapbox.com/data/tilesets/reference/mapbox-terrain-rgb-v1/)
//! 1. [Terrarium](https://github.com/tilezen/joerd/blob/master/docs/formats.md#terrarium)

use crate::{Grid, MartiniError};
use std::{borrow::Cow, fmt, str::FromStr};

/// Formula mapping a pixel's (R, G, B) channels to elevation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// `(R * 256 + G + B / 256) - 32768`
    Terrarium,
    /// `(R * 256 * 256 + G * 256 + B) / 10 - 10000`
    Mapbox,
}

impl Encoding {
    /// Returns the elevation, in meters, encoded by a single pixel.
    ///
    /// Arithmetic is done in `f64` and rounded to `f32` once.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub fn decode_pixel(self, r: u8, g: u8, b: u8) -> f32 {
        let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
        let elev = match self {
            Self::Terrarium => (r * 256.0 + g + b / 256.0) - 32768.0,
            Self::Mapbox => (r * 256.0 * 256.0 + g * 256.0 + b) / 10.0 - 10000.0,
        };
        elev as f32
    }

    /// Returns the tag this encoding parses from.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Terrarium => "terrarium",
            Self::Mapbox => "mapbox",
        }
    }
}

impl FromStr for Encoding {
    type Err = MartiniError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "terrarium" => Ok(Self::Terrarium),
            "mapbox" => Ok(Self::Mapbox),
            _ => Err(MartiniError::UnsupportedEncoding(s.to_owned())),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interleaved 8-bit pixel data, row-major.
///
/// The first three channels of each pixel are R, G, and B; any
/// further channels (e.g. alpha) are ignored.
#[derive(Clone, Debug)]
pub struct Raster<'a> {
    width: usize,
    height: usize,
    channels: usize,
    data: Cow<'a, [u8]>,
}

impl<'a> Raster<'a> {
    pub fn new(
        data: impl Into<Cow<'a, [u8]>>,
        width: usize,
        height: usize,
        channels: usize,
    ) -> Result<Self, MartiniError> {
        let data = data.into();
        if channels < 3 {
            return Err(MartiniError::DimensionMismatch {
                what: "raster channels",
                expected: 3,
                actual: channels,
            });
        }
        let len = width
            .checked_mul(height)
            .and_then(|pixels| pixels.checked_mul(channels));
        if len != Some(data.len()) {
            return Err(MartiniError::DimensionMismatch {
                what: "raster buffer length",
                expected: len.unwrap_or(usize::MAX),
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Returns this raster's (width, height).
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Returns the number of interleaved channels per pixel.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Returns the (R, G, B) channels of the pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    #[inline]
    pub fn rgb(&self, (x, y): (usize, usize)) -> (u8, u8, u8) {
        let k = (y * self.width + x) * self.channels;
        (self.data[k], self.data[k + 1], self.data[k + 2])
    }

    fn side(&self) -> Result<usize, MartiniError> {
        if self.width == self.height {
            Ok(self.width)
        } else {
            Err(MartiniError::DimensionMismatch {
                what: "raster height",
                expected: self.width,
                actual: self.height,
            })
        }
    }
}

#[cfg(feature = "image")]
impl Raster<'static> {
    /// Returns an RGB raster holding `img`'s pixels.
    pub fn from_image(img: &image::DynamicImage) -> Self {
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        Self {
            width: width as usize,
            height: height as usize,
            channels: 3,
            data: Cow::Owned(rgb.into_raw()),
        }
    }
}

/// Decodes every pixel of a square `raster` into an elevation grid of
/// the same side.
pub fn decode(raster: &Raster<'_>, encoding: Encoding) -> Result<Grid, MartiniError> {
    let size = raster.side()?;
    let mut cells = Vec::with_capacity(size * size);
    for y in 0..size {
        for x in 0..size {
            let (r, g, b) = raster.rgb((x, y));
            cells.push(encoding.decode_pixel(r, g, b));
        }
    }
    Grid::new(size, cells)
}

/// Decodes a square `raster` tile into a grid one sample wider and
/// taller, as needed to mesh a `2^k` tile with a `2^k + 1` grid.
///
/// The extra bottom row repeats the last decoded row, then the extra
/// right column repeats the column to its left.
pub fn decode_tile(raster: &Raster<'_>, encoding: Encoding) -> Result<Grid, MartiniError> {
    let tile_size = raster.side()?;
    let size = tile_size + 1;
    let mut grid = Grid::zeroed(size);
    let cells = grid.as_mut_slice();

    for y in 0..tile_size {
        for x in 0..tile_size {
            let (r, g, b) = raster.rgb((x, y));
            cells[y * size + x] = encoding.decode_pixel(r, g, b);
        }
    }

    if tile_size > 0 {
        for x in 0..size - 1 {
            cells[size * (size - 1) + x] = cells[size * (size - 2) + x];
        }
        for y in 0..size {
            cells[size * y + size - 1] = cells[size * y + size - 2];
        }
    }

    Ok(grid)
}
