use common::{Color, Coordinate, Torus};

use crate::validator::CellView;

/// In-memory copy of every cell's color, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    torus: Torus,
    cells: Vec<Color>,
}

impl Snapshot {
    pub fn filled(torus: Torus, color: Color) -> Self {
        Self {
            torus,
            cells: vec![color; torus.area()],
        }
    }

    pub fn torus(&self) -> Torus {
        self.torus
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn get(&self, coord: Coordinate) -> Option<Color> {
        self.torus.index(coord).map(|i| self.cells[i])
    }

    /// Returns the previous color, or `None` if `coord` is off the map.
    pub fn set(&mut self, coord: Coordinate, color: Color) -> Option<Color> {
        let i = self.torus.index(coord)?;
        Some(std::mem::replace(&mut self.cells[i], color))
    }

    /// Cells with their coordinates, row by row.
    pub fn iter(&self) -> impl Iterator<Item = (Coordinate, Color)> + '_ {
        let width = self.torus.width as usize;
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, color)| (Coordinate::new((i % width) as i32, (i / width) as i32), *color))
    }

    pub fn count(&self, color: Color) -> usize {
        self.cells.iter().filter(|c| **c == color).count()
    }
}

impl CellView for Snapshot {
    fn torus(&self) -> Torus {
        self.torus
    }

    fn color_at(&self, coord: Coordinate) -> Option<Color> {
        self.get(coord)
    }
}
