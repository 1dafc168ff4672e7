//! Right-triangulated irregular network (RTIN) construction.
//!
//! A `2^k + 1` grid is covered by two right triangles which are
//! recursively bisected along their hypotenuse. Every possible
//! triangle is a node of an implicit binary tree; node `i` has id
//! `i + 2`, so the roots are ids 2 and 3 and the children of id `n`
//! are `2n` and `2n + 1`. Walking the tree backwards visits the finest
//! triangles first.
//!
//! # References
//!
//! 1. [MARTINI: Real-Time RTIN Terrain Mesh](https://observablehq.com/@mourner/martin-real-time-rtin-terrain-mesh)
//! 1. [Right-Triangulated Irregular Networks](https://www.cs.ubc.ca/~will/papers/rtin.pdf)

use crate::{Grid, Mesh, MartiniError};
use log::debug;

/// Largest supported tile side; triangle coordinates are stored as `u16`.
const MAX_TILE_SIZE: usize = 1 << 15;

/// Precomputed triangle hierarchy for grids of one size.
///
/// Build once per grid size and reuse it for every [`Tile`] of that
/// size.
#[derive(Debug)]
pub struct Martini {
    /// Number of samples along each side of the grid.
    grid_size: usize,

    /// Total number of triangles in the hierarchy.
    num_triangles: usize,

    /// Number of triangles which have children.
    num_parent_triangles: usize,

    /// Hypotenuse endpoints `[ax, ay, bx, by]` of each triangle.
    coords: Box<[[u16; 4]]>,
}

impl Martini {
    /// Returns the triangle hierarchy for `grid_size` x `grid_size`
    /// grids.
    ///
    /// `grid_size - 1` must be a power of two no larger than 32768.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(grid_size: usize) -> Result<Self, MartiniError> {
        let tile_size = grid_size.wrapping_sub(1);
        if grid_size < 3 || !tile_size.is_power_of_two() || tile_size > MAX_TILE_SIZE {
            return Err(MartiniError::InvalidGridSize(grid_size));
        }

        let num_triangles = tile_size * tile_size * 2 - 2;
        let num_parent_triangles = num_triangles - tile_size * tile_size;
        let max = tile_size as u32;

        let coords = (0..num_triangles)
            .map(|i| {
                let mut id = i + 2;
                let (mut ax, mut ay, mut bx, mut by, mut cx, mut cy) = (0u32, 0, 0, 0, 0, 0);
                if id & 1 == 1 {
                    // top-right root
                    (bx, by, cx) = (max, max, max);
                } else {
                    // bottom-left root
                    (ax, ay, cy) = (max, max, max);
                }
                loop {
                    id >>= 1;
                    if id <= 1 {
                        break;
                    }
                    let mx = (ax + bx) >> 1;
                    let my = (ay + by) >> 1;
                    if id & 1 == 1 {
                        // left half
                        (bx, by) = (ax, ay);
                        (ax, ay) = (cx, cy);
                    } else {
                        // right half
                        (ax, ay) = (bx, by);
                        (bx, by) = (cx, cy);
                    }
                    (cx, cy) = (mx, my);
                }
                [ax, ay, bx, by].map(|c| c as u16)
            })
            .collect();

        debug!(
            "martini; grid_size: {}, triangles: {}, parents: {}",
            grid_size, num_triangles, num_parent_triangles
        );

        Ok(Self {
            grid_size,
            num_triangles,
            num_parent_triangles,
            coords,
        })
    }

    /// Returns the number of samples along each side of the grid.
    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    /// Returns the number of triangles in the full hierarchy.
    pub fn num_triangles(&self) -> usize {
        self.num_triangles
    }

    /// Computes the error grid for `terrain`.
    pub fn create_tile<'m>(&'m self, terrain: &Grid) -> Result<Tile<'m>, MartiniError> {
        if terrain.size() != self.grid_size {
            return Err(MartiniError::DimensionMismatch {
                what: "terrain size",
                expected: self.grid_size,
                actual: terrain.size(),
            });
        }
        let errors = self.errors(terrain.as_slice());
        debug!(
            "tile; grid_size: {}, max_error: {}",
            self.grid_size,
            errors.max()
        );
        Ok(Tile {
            martini: self,
            errors,
        })
    }

    /// Bottom-up error pass over every triangle, finest level first.
    ///
    /// Each hypotenuse midpoint holds the max of its own interpolation
    /// error and the errors of the two child midpoints beneath it.
    #[allow(clippy::cast_possible_truncation)]
    fn errors(&self, terrain: &[f32]) -> Grid {
        let size = self.grid_size;
        let mut grid = Grid::zeroed(size);
        let errors = grid.as_mut_slice();
        let height = |x: usize, y: usize| f64::from(terrain[y * size + x]);

        for i in (0..self.num_triangles).rev() {
            let [ax, ay, bx, by] = self.coords[i].map(usize::from);
            let mx = (ax + bx) >> 1;
            let my = (ay + by) >> 1;

            let interpolated = (height(ax, ay) + height(bx, by)) / 2.0;
            let middle_index = my * size + mx;
            let middle_error = (interpolated - height(mx, my)).abs();
            errors[middle_index] = errors[middle_index].max(middle_error as f32);

            if i < self.num_parent_triangles {
                // right-angle vertex
                let cx = mx + my - ay;
                let cy = my + ax - mx;
                let left_child = ((ay + cy) >> 1) * size + ((ax + cx) >> 1);
                let right_child = ((by + cy) >> 1) * size + ((bx + cx) >> 1);
                errors[middle_index] = errors[middle_index]
                    .max(errors[left_child])
                    .max(errors[right_child]);
            }
        }

        grid
    }
}

/// RTIN errors for one elevation grid.
///
/// A tile is immutable; any number of meshes, at any thresholds, may
/// be extracted from it, including concurrently.
#[derive(Debug)]
pub struct Tile<'m> {
    martini: &'m Martini,
    errors: Grid,
}

impl<'m> Tile<'m> {
    /// Returns the error of omitting each grid sample from a mesh.
    pub fn errors(&self) -> &Grid {
        &self.errors
    }

    /// Extracts the coarsest mesh whose omitted samples all have an
    /// error no greater than `max_error`.
    ///
    /// Vertex and triangle order follow a depth-first walk of the
    /// triangle hierarchy, top-right root first.
    pub fn mesh(&self, max_error: f32) -> Result<Mesh, MartiniError> {
        if max_error.is_nan() || max_error < 0.0 {
            return Err(MartiniError::InvalidThreshold(max_error));
        }

        let size = self.martini.grid_size;
        #[allow(clippy::cast_possible_truncation)]
        let max = (size - 1) as u32;
        let errors = self.errors.as_slice();

        // 1-based vertex index per grid sample, 0 when unused.
        let mut indices = vec![0u32; size * size];
        let mut mesh = Mesh::default();

        let mut stack: Vec<[u32; 6]> = vec![[max, max, 0, 0, 0, max], [0, 0, max, max, max, 0]];
        while let Some([ax, ay, bx, by, cx, cy]) = stack.pop() {
            let mx = (ax + bx) >> 1;
            let my = (ay + by) >> 1;

            if ax.abs_diff(cx) + ay.abs_diff(cy) > 1
                && errors[my as usize * size + mx as usize] > max_error
            {
                // Pushed in reverse so (c, a, m) is visited before (b, c, m).
                stack.push([bx, by, cx, cy, mx, my]);
                stack.push([cx, cy, ax, ay, mx, my]);
            } else {
                let a = mesh.vertex(&mut indices, size, [ax, ay], errors);
                let b = mesh.vertex(&mut indices, size, [bx, by], errors);
                let c = mesh.vertex(&mut indices, size, [cx, cy], errors);
                mesh.triangles.push([a, b, c]);
            }
        }

        debug!(
            "mesh; max_error: {}, vertices: {}, triangles: {}",
            max_error,
            mesh.vertices.len(),
            mesh.triangles.len()
        );

        Ok(mesh)
    }
}

/// Computes the error grid for `terrain` and extracts its mesh at
/// `max_error` in one call.
///
/// Prefer [`Martini::create_tile`] and [`Tile::mesh`] when meshing
/// more than once.
pub fn create_tile(terrain: &Grid, max_error: f32) -> Result<(Grid, Mesh), MartiniError> {
    let martini = Martini::new(terrain.size())?;
    let tile = martini.create_tile(terrain)?;
    let mesh = tile.mesh(max_error)?;
    Ok((tile.errors, mesh))
}

#[cfg(test)]
mod tests {
    use super::{create_tile, Martini};
    use crate::{Grid, MartiniError, Mesh};
    use itertools::iproduct;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[rustfmt::skip]
    fn peaked() -> Grid {
        Grid::new(3, vec![
            0.0, 1.0, 0.0,
            0.0, 4.0, 0.0,
            0.0, 0.0, 2.0,
        ]).unwrap()
    }

    /// Deterministic bumpy 17x17 terrain.
    #[allow(clippy::cast_precision_loss)]
    fn bumpy(size: usize) -> Grid {
        let cells = iproduct!(0..size, 0..size)
            .map(|(y, x)| {
                let (x, y) = (x as f32, y as f32);
                (x * 0.7).sin() * 40.0 + (y * 0.3).cos() * 25.0 + (x * y * 0.05).sin() * 10.0
            })
            .collect();
        Grid::new(size, cells).unwrap()
    }

    fn vertex_set(mesh: &Mesh) -> HashSet<[u16; 2]> {
        mesh.vertices.iter().copied().collect()
    }

    #[test]
    fn test_invalid_grid_sizes() {
        for size in [0, 1, 2, 4, 16, 256, 258, 32770, 65537] {
            assert!(
                matches!(Martini::new(size), Err(MartiniError::InvalidGridSize(s)) if s == size),
                "{size}"
            );
        }
        for size in [3, 5, 9, 17, 257] {
            assert!(Martini::new(size).is_ok(), "{size}");
        }
    }

    #[test]
    fn test_triangle_counts() {
        let martini = Martini::new(257).unwrap();
        assert_eq!(martini.grid_size(), 257);
        assert_eq!(martini.num_triangles(), 256 * 256 * 2 - 2);
        assert_eq!(martini.num_parent_triangles, 256 * 256 - 2);
    }

    #[test]
    fn test_triangle_coords_3x3() {
        let martini = Martini::new(3).unwrap();
        assert_eq!(
            &*martini.coords,
            &[
                [2, 2, 0, 0],
                [0, 0, 2, 2],
                [0, 0, 0, 2],
                [2, 2, 2, 0],
                [0, 2, 2, 2],
                [2, 0, 0, 0],
            ]
        );
    }

    #[test]
    fn test_root_triangles() {
        let martini = Martini::new(9).unwrap();
        let apex = |[ax, ay, bx, by]: [u16; 4]| {
            let (mx, my) = ((ax + bx) >> 1, (ay + by) >> 1);
            (mx + my - ay, my + ax - mx)
        };
        // Odd id 3: top-right root, right angle at the NE corner.
        assert_eq!(martini.coords[1], [0, 0, 8, 8]);
        assert_eq!(apex(martini.coords[1]), (8, 0));
        // Even id 2: bottom-left root, right angle at the SW corner.
        assert_eq!(martini.coords[0], [8, 8, 0, 0]);
        assert_eq!(apex(martini.coords[0]), (0, 8));
    }

    #[test]
    fn test_terrain_size_mismatch() {
        let martini = Martini::new(5).unwrap();
        assert!(matches!(
            martini.create_tile(&peaked()),
            Err(MartiniError::DimensionMismatch {
                expected: 5,
                actual: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_errors_3x3() {
        let martini = Martini::new(3).unwrap();
        let tile = martini.create_tile(&peaked()).unwrap();
        #[rustfmt::skip]
        assert_eq!(
            tile.errors().as_slice(),
            &[
                0.0, 1.0, 0.0,
                0.0, 3.0, 1.0,
                0.0, 1.0, 0.0,
            ]
        );
    }

    #[test]
    fn test_mesh_3x3_full_detail() {
        let martini = Martini::new(3).unwrap();
        let tile = martini.create_tile(&peaked()).unwrap();
        let mesh = tile.mesh(0.0).unwrap();
        assert_eq!(
            mesh.vertices,
            vec![
                [1, 1],
                [2, 0],
                [1, 0],
                [0, 0],
                [2, 2],
                [2, 1],
                [0, 2],
                [1, 2],
            ]
        );
        assert_eq!(
            mesh.triangles,
            vec![
                [0, 1, 2],
                [3, 0, 2],
                [0, 4, 5],
                [1, 0, 5],
                [0, 6, 7],
                [4, 0, 7],
                [3, 6, 0],
            ]
        );
        assert_eq!(
            mesh.errors,
            vec![3.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0]
        );
    }

    #[test]
    fn test_mesh_3x3_thresholds() {
        let martini = Martini::new(3).unwrap();
        let tile = martini.create_tile(&peaked()).unwrap();

        // Threshold is exclusive; errors equal to it are dropped.
        let mesh = tile.mesh(1.0).unwrap();
        assert_eq!(mesh.vertices, vec![[2, 0], [0, 0], [1, 1], [2, 2], [0, 2]]);
        assert_eq!(
            mesh.triangles,
            vec![[0, 1, 2], [3, 0, 2], [4, 3, 2], [1, 4, 2]]
        );

        let mesh = tile.mesh(3.0).unwrap();
        assert_eq!(mesh.vertices, vec![[0, 0], [2, 2], [2, 0], [0, 2]]);
        assert_eq!(mesh.triangles, vec![[0, 1, 2], [1, 0, 3]]);
        assert_eq!(mesh.errors, vec![0.0; 4]);
    }

    #[test]
    fn test_flat_grid() {
        let flat = Grid::new(5, vec![123.5; 25]).unwrap();
        let (errors, _) = create_tile(&flat, 0.0).unwrap();
        assert!(errors.as_slice().iter().all(|&e| e == 0.0));
        for max_error in [0.0, 0.5, 100.0] {
            let (_, mesh) = create_tile(&flat, max_error).unwrap();
            assert_eq!(mesh.vertices, vec![[0, 0], [4, 4], [4, 0], [0, 4]]);
            assert_eq!(mesh.triangles, vec![[0, 1, 2], [1, 0, 3]]);
        }
    }

    #[test]
    fn test_invalid_threshold() {
        let martini = Martini::new(3).unwrap();
        let tile = martini.create_tile(&peaked()).unwrap();
        assert!(matches!(
            tile.mesh(-0.5),
            Err(MartiniError::InvalidThreshold(e)) if e == -0.5
        ));
        assert!(matches!(
            tile.mesh(f32::NAN),
            Err(MartiniError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_error_uses_f64_midpoint() {
        // 1 + 2^24 rounds to 2^24 in f32, losing the half meter.
        #[rustfmt::skip]
        let terrain = Grid::new(3, vec![
            1.0, 8_388_608.0, 16_777_216.0,
            0.0, 0.0,         0.0,
            0.0, 0.0,         0.0,
        ]).unwrap();
        let (errors, _) = create_tile(&terrain, 0.0).unwrap();
        assert_eq!(errors.get((1usize, 0usize)), Some(0.5));
    }

    #[test]
    fn test_full_detail_mesh_uses_every_sample() {
        let terrain = bumpy(17);
        let (_, mesh) = create_tile(&terrain, 0.0).unwrap();
        assert_eq!(mesh.vertices.len(), 17 * 17);
        assert_eq!(mesh.triangles.len(), 16 * 16 * 2);
    }

    #[test]
    fn test_mesh_is_shareable_across_threads() {
        let terrain = bumpy(17);
        let martini = Martini::new(17).unwrap();
        let tile = &martini.create_tile(&terrain).unwrap();
        let thresholds = [0.0, 1.0, 5.0, 20.0];
        let meshes: Vec<Mesh> = std::thread::scope(|s| {
            let handles: Vec<_> = thresholds
                .iter()
                .map(|&e| s.spawn(move || tile.mesh(e).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for (mesh, &e) in meshes.iter().zip(&thresholds) {
            assert_eq!(mesh, &tile.mesh(e).unwrap());
        }
    }

    /// Error grid computed one subdivision level at a time, walking
    /// triangles as explicit `(a, b, c)` corners rather than through
    /// the precomputed hierarchy.
    #[allow(clippy::cast_possible_truncation)]
    fn level_by_level_errors(terrain: &Grid) -> Vec<f32> {
        type Corner = (usize, usize);
        let size = terrain.size();
        let max = size - 1;
        let h = |(x, y): Corner| f64::from(terrain.get_unchecked((x, y)));
        let mid = |(ax, ay): Corner, (bx, by): Corner| ((ax + bx) / 2, (ay + by) / 2);

        let mut levels: Vec<Vec<[Corner; 3]>> =
            vec![vec![[(0, 0), (max, max), (max, 0)], [(max, max), (0, 0), (0, max)]]];
        while levels.last().unwrap().len() < max * max {
            let next = levels
                .last()
                .unwrap()
                .iter()
                .flat_map(|&[a, b, c]| {
                    let m = mid(a, b);
                    [[c, a, m], [b, c, m]]
                })
                .collect();
            levels.push(next);
        }

        let mut errors = vec![0.0f32; size * size];
        let finest = levels.len() - 1;
        for (depth, level) in levels.iter().enumerate().rev() {
            for &[a, b, c] in level {
                let (mx, my) = mid(a, b);
                let k = my * size + mx;
                let local = ((h(a) + h(b)) / 2.0 - h((mx, my))).abs() as f32;
                errors[k] = errors[k].max(local);
                if depth < finest {
                    let (lx, ly) = mid(c, a);
                    let (rx, ry) = mid(b, c);
                    errors[k] = errors[k]
                        .max(errors[ly * size + lx])
                        .max(errors[ry * size + rx]);
                }
            }
        }
        errors
    }

    #[test]
    fn test_errors_match_level_by_level_pass() {
        for size in [5, 9, 17, 33, 65] {
            let martini = Martini::new(size).unwrap();
            let terrain = bumpy(size);
            let tile = martini.create_tile(&terrain).unwrap();
            let expected = level_by_level_errors(&terrain);
            let differing = tile
                .errors()
                .as_slice()
                .iter()
                .zip(&expected)
                .filter(|(a, b)| a.to_bits() != b.to_bits())
                .count();
            assert_eq!(differing, 0, "size {size}");
            assert!(tile.errors().as_slice().iter().any(|&e| e > 0.0));
        }
    }

    #[test]
    fn test_errors_5x5() {
        // Single spike at the centre of the top-left quadrant; it is
        // only ever a hypotenuse midpoint, never an endpoint, so its
        // error propagates up to (2, 0), (0, 2) and the centre.
        let mut cells = vec![0.0; 25];
        cells[5 + 1] = 8.0;
        let terrain = Grid::new(5, cells).unwrap();
        let martini = Martini::new(5).unwrap();
        let tile = martini.create_tile(&terrain).unwrap();
        #[rustfmt::skip]
        assert_eq!(
            tile.errors().as_slice(),
            &[
                0.0, 0.0, 8.0, 0.0, 0.0,
                0.0, 8.0, 0.0, 0.0, 0.0,
                8.0, 0.0, 8.0, 0.0, 0.0,
                0.0, 0.0, 0.0, 0.0, 0.0,
                0.0, 0.0, 0.0, 0.0, 0.0,
            ]
        );
        assert_eq!(tile.errors().as_slice(), level_by_level_errors(&terrain).as_slice());
    }

    fn arb_terrain(size: usize) -> impl Strategy<Value = Grid> {
        proptest::collection::vec(-500.0f32..4000.0, size * size)
            .prop_map(move |cells| Grid::new(size, cells).unwrap())
    }

    proptest! {
        #[test]
        fn errors_are_deterministic_and_non_negative(terrain in arb_terrain(9)) {
            let martini = Martini::new(9).unwrap();
            let first = martini.create_tile(&terrain).unwrap();
            let second = martini.create_tile(&terrain).unwrap();
            prop_assert_eq!(first.errors().to_le_bytes(), second.errors().to_le_bytes());
            prop_assert!(first.errors().as_slice().iter().all(|&e| e >= 0.0));
            for corner in [(0usize, 0usize), (8, 0), (0, 8), (8, 8)] {
                prop_assert_eq!(first.errors().get(corner), Some(0.0));
            }
        }

        #[test]
        fn parent_errors_cover_children(terrain in arb_terrain(9)) {
            let martini = Martini::new(9).unwrap();
            let tile = martini.create_tile(&terrain).unwrap();
            let errors = tile.errors();
            for &[ax, ay, bx, by] in &martini.coords[..martini.num_parent_triangles] {
                let [ax, ay, bx, by] = [ax, ay, bx, by].map(usize::from);
                let (mx, my) = ((ax + bx) >> 1, (ay + by) >> 1);
                let (cx, cy) = (mx + my - ay, my + ax - mx);
                let parent = errors.get_unchecked((mx, my));
                prop_assert!(parent >= errors.get_unchecked(((ax + cx) >> 1, (ay + cy) >> 1)));
                prop_assert!(parent >= errors.get_unchecked(((bx + cx) >> 1, (by + cy) >> 1)));
            }
        }

        #[test]
        fn coarser_thresholds_keep_fewer_vertices(
            terrain in arb_terrain(17),
            lo in 0.0f32..200.0,
            delta in 0.0f32..200.0,
        ) {
            let martini = Martini::new(17).unwrap();
            let tile = martini.create_tile(&terrain).unwrap();
            let fine = tile.mesh(lo).unwrap();
            let coarse = tile.mesh(lo + delta).unwrap();
            prop_assert!(vertex_set(&coarse).is_subset(&vertex_set(&fine)));
            for mesh in [&fine, &coarse] {
                let vertices = vertex_set(mesh);
                for corner in [[0, 0], [16, 0], [0, 16], [16, 16]] {
                    prop_assert!(vertices.contains(&corner));
                }
                prop_assert_eq!(mesh.vertices.len(), vertices.len());
                prop_assert_eq!(mesh.area(), 16.0 * 16.0);
            }
        }

        #[test]
        fn retained_midpoints_exceed_threshold(terrain in arb_terrain(17), max_error in 0.0f32..300.0) {
            let martini = Martini::new(17).unwrap();
            let tile = martini.create_tile(&terrain).unwrap();
            let mesh = tile.mesh(max_error).unwrap();
            for (&[x, y], &e) in mesh.vertices.iter().zip(&mesh.errors) {
                prop_assert_eq!(tile.errors().get((usize::from(x), usize::from(y))), Some(e));
            }
            // Every triangle is a leaf: either finest level or its
            // hypotenuse midpoint is within tolerance.
            for &[a, b, c] in &mesh.triangles {
                let [ax, ay] = mesh.vertices[a as usize];
                let [bx, by] = mesh.vertices[b as usize];
                let [cx, cy] = mesh.vertices[c as usize];
                let (mx, my) = (usize::from((ax + bx) >> 1), usize::from((ay + by) >> 1));
                let finest = ax.abs_diff(cx) + ay.abs_diff(cy) <= 1;
                prop_assert!(finest || tile.errors().get_unchecked((mx, my)) <= max_error);
            }
        }
    }
}
