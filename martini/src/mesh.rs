use crate::{Grid, MartiniError};
use geo::Rect;

/// A triangulated subset of a grid's samples.
///
/// Vertices are stored once and referenced by index from
/// `triangles`, so shared corners cost 4 bytes per use instead of a
/// full coordinate pair.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mesh {
    /// Grid `[x, y]` of each vertex.
    pub vertices: Vec<[u16; 2]>,

    /// Vertex indices of each triangle.
    pub triangles: Vec<[u32; 3]>,

    /// Error grid value at each vertex; parallel to `vertices`.
    pub errors: Vec<f32>,
}

impl Mesh {
    /// Returns the index of the vertex at `[x, y]`, adding it if this
    /// is its first use.
    ///
    /// `indices` maps grid samples to 1-based vertex indices, 0
    /// meaning unused.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn vertex(
        &mut self,
        indices: &mut [u32],
        size: usize,
        [x, y]: [u32; 2],
        errors: &[f32],
    ) -> u32 {
        let k = y as usize * size + x as usize;
        if indices[k] == 0 {
            self.vertices.push([x as u16, y as u16]);
            self.errors.push(errors[k]);
            indices[k] = self.vertices.len() as u32;
        }
        indices[k] - 1
    }

    /// Returns the total area of all triangles, in grid cells.
    pub fn area(&self) -> f64 {
        let xy = |i: u32| self.vertices[i as usize].map(f64::from);
        self.triangles
            .iter()
            .map(|&[a, b, c]| {
                let ([ax, ay], [bx, by], [cx, cy]) = (xy(a), xy(b), xy(c));
                ((bx - ax) * (cy - ay) - (cx - ax) * (by - ay)).abs() / 2.0
            })
            .sum()
    }

    /// Returns `[x, y, z]` positions of each vertex, with `x` and `y`
    /// rescaled from grid units into `bounds` and `z` the elevation
    /// sampled from `terrain`.
    ///
    /// With `flip_y`, grid row 0 maps to `bounds.max().y` instead of
    /// `bounds.min().y`.
    pub fn positions(
        &self,
        terrain: &Grid,
        bounds: Rect<f64>,
        flip_y: bool,
    ) -> Result<Vec<[f64; 3]>, MartiniError> {
        #[allow(clippy::cast_precision_loss)]
        let tile_size = terrain.size().saturating_sub(1).max(1) as f64;
        let (min, max) = (bounds.min(), bounds.max());
        let x_scale = (max.x - min.x) / tile_size;
        let y_scale = (max.y - min.y) / tile_size;

        self.vertices
            .iter()
            .map(|&[x, y]| {
                let z = terrain.get((usize::from(x), usize::from(y))).ok_or(
                    MartiniError::DimensionMismatch {
                        what: "terrain size",
                        expected: usize::from(x.max(y)) + 1,
                        actual: terrain.size(),
                    },
                )?;
                let (x, y) = (f64::from(x), f64::from(y));
                let px = x * x_scale + min.x;
                let py = if flip_y {
                    max.y - y * y_scale
                } else {
                    y * y_scale + min.y
                };
                Ok([px, py, f64::from(z)])
            })
            .collect()
    }
}
