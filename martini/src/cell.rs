use crate::Grid;

/// A single sample of a [`Grid`].
pub struct Cell<'a> {
    /// The parent [Grid] this cell belongs to.
    pub(crate) grid: &'a Grid,
    /// Index into parent's sample data corresponding to this cell.
    pub(crate) index: usize,
}

#[allow(clippy::must_use_candidate)]
impl<'a> Cell<'a> {
    /// Sample value (meters for elevation and error grids).
    #[inline]
    pub fn value(&self) -> f32 {
        self.grid.as_slice()[self.index]
    }

    /// This cell's offset in the source grid's memory.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// This cell's logical (x, y) location in source grid.
    ///
    /// Note that (0, 0) is the NW corner.
    #[inline]
    pub fn xy(&self) -> (usize, usize) {
        self.grid.linear_to_xy(self.index)
    }

    /// Returns `true` if this cell lies on the grid's outer edge.
    #[inline]
    pub fn is_boundary(&self) -> bool {
        let (x, y) = self.xy();
        let max = self.grid.size() - 1;
        x == 0 || y == 0 || x == max || y == max
    }
}

impl<'a> std::cmp::PartialEq for Cell<'a> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && std::ptr::eq(self.grid, other.grid)
    }
}

impl<'a> std::cmp::Eq for Cell<'a> {}

#[cfg(test)]
mod tests {
    use crate::Grid;

    #[test]
    fn test_cells_walk_row_major() {
        let grid = Grid::new(3, (0..9u8).map(f32::from).collect()).unwrap();
        let cells: Vec<_> = grid.iter().map(|c| (c.xy(), c.value())).collect();
        assert_eq!(cells[0], ((0, 0), 0.0));
        assert_eq!(cells[5], ((2, 1), 5.0));
        assert_eq!(cells[8], ((2, 2), 8.0));
        let interior: Vec<_> = grid.iter().filter(|c| !c.is_boundary()).collect();
        assert_eq!(interior.len(), 1);
        assert_eq!(interior[0].index(), 4);
    }
}
