use crate::{cell::Cell, MartiniError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
#[cfg(feature = "image")]
use image::{ImageBuffer, Luma};
#[cfg(feature = "image")]
use num_traits::AsPrimitive;
use std::io::{Read, Write};

/// A square, row-major grid of `f32` samples.
///
/// Used for both decoded elevations and RTIN errors. Index `(0, 0)`
/// is the top-left (NW) sample; `x` grows east and `y` grows south,
/// matching raster row order.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    /// Number of samples along each side.
    size: usize,

    /// Samples, `size * size` of them.
    cells: Box<[f32]>,
}

impl Grid {
    /// Returns a grid of side `size` backed by `cells`.
    pub fn new(size: usize, cells: Vec<f32>) -> Result<Self, MartiniError> {
        let len = size.checked_mul(size);
        if len != Some(cells.len()) {
            return Err(MartiniError::DimensionMismatch {
                what: "grid length",
                expected: len.unwrap_or(usize::MAX),
                actual: cells.len(),
            });
        }
        Ok(Self {
            size,
            cells: cells.into_boxed_slice(),
        })
    }

    pub(crate) fn zeroed(size: usize) -> Self {
        Self {
            size,
            cells: vec![0.0; size * size].into_boxed_slice(),
        }
    }

    /// Reads `size * size` little-endian `f32`s from `src`.
    ///
    /// This is the flat layout reference fixtures are stored in.
    pub fn read_le(src: &mut impl Read, size: usize) -> Result<Self, MartiniError> {
        let len = size
            .checked_mul(size)
            .ok_or(MartiniError::DimensionMismatch {
                what: "grid length",
                expected: usize::MAX,
                actual: 0,
            })?;
        let mut cells = vec![0.0; len];
        src.read_f32_into::<LittleEndian>(&mut cells)?;
        Self::new(size, cells)
    }

    /// Writes samples to `dst` as flat little-endian `f32`s.
    pub fn write_le(&self, dst: &mut impl Write) -> Result<(), MartiniError> {
        for &cell in self.cells.iter() {
            dst.write_f32::<LittleEndian>(cell)?;
        }
        Ok(())
    }

    /// Returns samples as flat little-endian `f32` bytes.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.cells.iter().flat_map(|cell| cell.to_le_bytes()).collect()
    }

    /// Returns the number of samples along each side.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the number of samples in this grid.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns the samples in row-major order.
    pub fn as_slice(&self) -> &[f32] {
        &self.cells
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.cells
    }

    /// Returns the lowest sample in this grid.
    pub fn min(&self) -> f32 {
        self.cells.iter().copied().fold(f32::INFINITY, f32::min)
    }

    /// Returns the highest sample in this grid.
    pub fn max(&self) -> f32 {
        self.cells.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    /// Returns and iterator over `self`'s cells.
    pub fn iter(&self) -> impl Iterator<Item = Cell<'_>> + '_ {
        (0..self.len()).map(|index| Cell { grid: self, index })
    }

    /// Returns the sample at `loc`, if contained in this grid.
    ///
    /// `loc` can be one of:
    ///
    /// - `usize`: linear index of the sample.
    /// - `(usize, usize)`: (x, y) index of the sample.
    pub fn get<T>(&self, loc: T) -> Option<f32>
    where
        Self: Get<T>,
    {
        <Self as Get<T>>::get(self, loc)
    }

    /// Returns the sample at `loc`.
    ///
    /// # Panics
    ///
    /// Panics if `loc` is out of bounds.
    pub fn get_unchecked<T>(&self, loc: T) -> f32
    where
        Self: Get<T>,
    {
        <Self as Get<T>>::get_unchecked(self, loc)
    }
}

#[cfg(feature = "image")]
impl Grid {
    /// Returns an [`ImageBuffer`] of this grid.
    ///
    /// The image is scaled so that the lowest sample is `0` and the
    /// highest is `Pix::MAX`. A constant grid renders as all zeros.
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_image<Pix>(&self) -> ImageBuffer<Luma<Pix>, Vec<Pix>>
    where
        Pix: image::Primitive + 'static,
        f32: AsPrimitive<Pix> + From<Pix>,
    {
        let dim = self.size() as u32;
        let mut img = ImageBuffer::new(dim, dim);
        let min = self.min();
        let range = self.max() - min;
        let scale = |sample: f32| {
            if range > 0.0 {
                (sample - min) / range * f32::from(Pix::max_value())
            } else {
                0.0
            }
        };
        for cell in self.iter() {
            let (x, y) = cell.xy();
            img.put_pixel(x as u32, y as u32, Luma([scale(cell.value()).as_()]));
        }
        img
    }
}

/// Private API
impl Grid {
    pub(crate) fn linear_to_xy(&self, idx: usize) -> (usize, usize) {
        (idx % self.size, idx / self.size)
    }

    pub(crate) fn xy_to_linear(&self, (x, y): (usize, usize)) -> usize {
        y * self.size + x
    }
}

pub trait Get<Loc> {
    fn get(&self, loc: Loc) -> Option<f32>;

    fn get_unchecked(&self, loc: Loc) -> f32;
}

impl Get<usize> for Grid {
    #[inline]
    fn get(&self, loc: usize) -> Option<f32> {
        self.cells.get(loc).copied()
    }

    #[inline]
    fn get_unchecked(&self, loc: usize) -> f32 {
        self.cells[loc]
    }
}

impl Get<(usize, usize)> for Grid {
    #[inline]
    fn get(&self, (x, y): (usize, usize)) -> Option<f32> {
        if x < self.size && y < self.size {
            Some(self.cells[self.xy_to_linear((x, y))])
        } else {
            None
        }
    }

    #[inline]
    fn get_unchecked(&self, loc: (usize, usize)) -> f32 {
        self.cells[self.xy_to_linear(loc)]
    }
}
