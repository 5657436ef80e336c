use crate::Cell;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GridShapeError {
    #[error("grid has no rows")]
    Empty,
    #[error("ragged grid: row {row} has {got} cells (expected {expected})")]
    Ragged {
        row: usize,
        got: usize,
        expected: usize,
    },
}

/// Rectangular 2-D array of cells, indexed `[row][col]`.
///
/// Dimensions are fixed at construction (they come from the authoritative
/// source during bootstrap) and never change afterwards. The wire format is
/// nested arrays; ragged input is rejected on deserialization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<Cell>>", into = "Vec<Vec<Cell>>")]
pub struct Grid {
    rows: Vec<Vec<Cell>>,
    cols: usize,
}

impl Grid {
    pub fn new(rows: Vec<Vec<Cell>>) -> Result<Self, GridShapeError> {
        let Some(first) = rows.first() else {
            return Err(GridShapeError::Empty);
        };
        let cols = first.len();
        if cols == 0 {
            return Err(GridShapeError::Empty);
        }
        for (row, cells) in rows.iter().enumerate() {
            if cells.len() != cols {
                return Err(GridShapeError::Ragged {
                    row,
                    got: cells.len(),
                    expected: cols,
                });
            }
        }
        Ok(Self { rows, cols })
    }

    /// Uniform grid of bare cells sharing one base value.
    pub fn filled(rows: usize, cols: usize, base_value: u128) -> Result<Self, GridShapeError> {
        Self::new(vec![vec![Cell::new(base_value); cols]; rows])
    }

    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|cells| cells.get(col))
    }

    /// Mutable cell access. Shape stays fixed; only layer history and
    /// selection-independent cell state may change.
    pub fn get_mut(&mut self, row: usize, col: usize) -> Option<&mut Cell> {
        self.rows.get_mut(row).and_then(|cells| cells.get_mut(col))
    }

    pub fn iter(&self) -> impl Iterator<Item = ((usize, usize), &Cell)> {
        self.rows.iter().enumerate().flat_map(|(row, cells)| {
            cells
                .iter()
                .enumerate()
                .map(move |(col, cell)| ((row, col), cell))
        })
    }
}

impl TryFrom<Vec<Vec<Cell>>> for Grid {
    type Error = GridShapeError;

    fn try_from(rows: Vec<Vec<Cell>>) -> Result<Self, Self::Error> {
        Self::new(rows)
    }
}

impl From<Grid> for Vec<Vec<Cell>> {
    fn from(grid: Grid) -> Self {
        grid.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_ragged_rows() {
        let rows = vec![
            vec![Cell::new(1), Cell::new(1)],
            vec![Cell::new(1)],
        ];
        assert_eq!(
            Grid::new(rows),
            Err(GridShapeError::Ragged {
                row: 1,
                got: 1,
                expected: 2
            })
        );
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(Grid::new(vec![]), Err(GridShapeError::Empty));
        assert_eq!(Grid::new(vec![vec![]]), Err(GridShapeError::Empty));
    }

    #[test]
    fn bounds_checked_lookup() {
        let grid = Grid::filled(2, 3, 100).unwrap();
        assert_eq!(grid.rows(), 2);
        assert_eq!(grid.cols(), 3);
        assert!(grid.get(1, 2).is_some());
        assert!(grid.get(2, 0).is_none());
        assert!(grid.get(0, 3).is_none());
    }

    #[test]
    fn wire_format_is_nested_arrays() {
        let grid = Grid::filled(1, 2, 5).unwrap();
        let json = serde_json::to_string(&grid).unwrap();
        assert_eq!(
            json,
            r#"[[{"base_value":"5","layers":[]},{"base_value":"5","layers":[]}]]"#
        );
        let back: Grid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, grid);
    }

    #[test]
    fn deserialize_rejects_ragged() {
        let json = r#"[[{"base_value":"5","layers":[]}],[]]"#;
        assert!(serde_json::from_str::<Grid>(json).is_err());
    }
}
