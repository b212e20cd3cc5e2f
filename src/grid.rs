use geo::{Area, Coord, LineString, MultiPolygon, Polygon};

/// Regular groundwater grid. The origin is the upper-left corner and rows are
/// counted downwards, as in MODFLOW.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    pub x_origin: f64,
    pub y_origin: f64,
    pub nrow: u32,
    pub ncol: u32,
    pub cell_width: f64,
    pub cell_height: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    pub id: u32,
    pub row: u32,
    pub col: u32,
    pub polygon: MultiPolygon<f64>,
}

impl GridCell {
    pub fn area(&self) -> f64 {
        self.polygon.unsigned_area()
    }
}

impl GridSpec {
    /// MODFLOW cell number of a 1-based (row, col).
    pub fn cell_id(&self, row: u32, col: u32) -> u32 {
        (row - 1) * self.ncol + col
    }

    /// Upper bound of the area threshold on this grid.
    pub fn max_cell_area(&self) -> f64 {
        (self.cell_width * self.cell_height).abs()
    }

    pub fn cell(&self, row: u32, col: u32) -> GridCell {
        let x0 = self.x_origin + (col - 1) as f64 * self.cell_width;
        let y0 = self.y_origin - (row - 1) as f64 * self.cell_height;
        let x1 = x0 + self.cell_width;
        let y1 = y0 - self.cell_height;
        let ring = LineString::from(vec![
            Coord { x: x0, y: y1 },
            Coord { x: x1, y: y1 },
            Coord { x: x1, y: y0 },
            Coord { x: x0, y: y0 },
            Coord { x: x0, y: y1 },
        ]);
        GridCell {
            id: self.cell_id(row, col),
            row,
            col,
            polygon: MultiPolygon(vec![Polygon::new(ring, vec![])]),
        }
    }

    pub fn cells(&self) -> Vec<GridCell> {
        (1..=self.nrow)
            .flat_map(|row| (1..=self.ncol).map(move |col| (row, col)))
            .map(|(row, col)| self.cell(row, col))
            .collect()
    }
}
