use crate::error::GridError;
use nalgebra::Vector2;

/// A particle position.
pub type Point = Vector2<f64>;

/// Fixed geometry of a uniform 2D grid with square cells of side `dx`.
///
/// Cells are keyed row-major: `key = row * w + column`.
#[derive(Clone, Debug)]
pub struct GridGeometry {
    width: f64,
    height: f64,
    dx: f64,
    w: usize,
    h: usize,
}

impl GridGeometry {
    pub fn new(width: f64, height: f64, dx: f64) -> Result<Self, GridError> {
        let invalid = GridError::InvalidDimensions {
            width,
            height,
            cell_size: dx,
        };
        let all_positive = [width, height, dx]
            .iter()
            .all(|&v| v.is_finite() && v > 0.0);
        if !all_positive {
            return Err(invalid);
        }

        let w_f = (width / dx).ceil();
        let h_f = (height / dx).ceil();
        if !w_f.is_finite() || !h_f.is_finite() || w_f > u32::MAX as f64 || h_f > u32::MAX as f64
        {
            return Err(invalid);
        }
        let w = w_f as usize;
        let h = h_f as usize;
        // The bucket table holds one usize per cell
        let max_cells = isize::MAX as usize / std::mem::size_of::<usize>();
        match w.checked_mul(h) {
            Some(cells) if cells <= max_cells => {}
            _ => return Err(invalid),
        }

        Ok(Self {
            width,
            height,
            dx,
            w,
            h,
        })
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn cell_size(&self) -> f64 {
        self.dx
    }

    /// Grid dimensions in cells, `(w, h)`.
    pub fn dims(&self) -> (usize, usize) {
        (self.w, self.h)
    }

    pub fn num_cells(&self) -> usize {
        self.w * self.h
    }

    /// Upper corner of the covered area, `(w * dx, h * dx)`. This may exceed
    /// the requested domain when it is not a multiple of the cell size.
    pub fn extent(&self) -> Point {
        Point::new(self.w as f64 * self.dx, self.h as f64 * self.dx)
    }

    /// Cell coordinates `(column, row)` of `p`.
    pub fn cell_coords(&self, p: &Point) -> Result<(usize, usize), GridError> {
        match (self.axis_cell(p.x, self.w), self.axis_cell(p.y, self.h)) {
            (Some(cx), Some(cy)) => Ok((cx, cy)),
            _ => Err(GridError::OutOfBounds { x: p.x, y: p.y }),
        }
    }

    /// Cell key of `p`, `floor(y / dx) * w + floor(x / dx)`.
    pub fn key(&self, p: &Point) -> Result<usize, GridError> {
        let (cx, cy) = self.cell_coords(p)?;
        Ok(self.key_of_coords(cx, cy))
    }

    pub fn key_of_coords(&self, cx: usize, cy: usize) -> usize {
        cy * self.w + cx
    }

    pub fn coords_of_key(&self, key: usize) -> (usize, usize) {
        (key % self.w, key / self.w)
    }

    /// Whether signed cell coordinates fall inside the grid.
    pub fn idx_ok(&self, cx: isize, cy: isize) -> bool {
        cx >= 0 && cy >= 0 && (cx as usize) < self.w && (cy as usize) < self.h
    }

    fn axis_cell(&self, v: f64, n: usize) -> Option<usize> {
        // Negated so NaN is rejected too
        if !(v >= 0.0) {
            return None;
        }
        let c = (v / self.dx).floor() as usize;
        if c < n {
            Some(c)
        } else if v < n as f64 * self.dx {
            // v / dx rounded up onto the upper edge
            Some(n - 1)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_dimensions() {
        let g = GridGeometry::new(10.0, 10.0, 1.0).unwrap();
        assert_eq!(g.dims(), (10, 10));
        assert_eq!(g.num_cells(), 100);

        let g = GridGeometry::new(10.5, 4.0, 2.0).unwrap();
        assert_eq!(g.dims(), (6, 2));
        let ext = g.extent();
        assert_relative_eq!(ext.x, 12.0);
        assert_relative_eq!(ext.y, 4.0);
    }

    #[test]
    fn test_invalid_dimensions() {
        assert!(GridGeometry::new(0.0, 10.0, 1.0).is_err());
        assert!(GridGeometry::new(10.0, -1.0, 1.0).is_err());
        assert!(GridGeometry::new(10.0, 10.0, 0.0).is_err());
        assert!(GridGeometry::new(f64::NAN, 10.0, 1.0).is_err());
        assert!(GridGeometry::new(f64::INFINITY, 10.0, 1.0).is_err());
        assert!(GridGeometry::new(1e300, 1e300, 1e-300).is_err());
        assert!(GridGeometry::new(4.0e9, 4.0e9, 1.0).is_err());
    }

    #[test]
    fn test_boundary_keys() {
        let g = GridGeometry::new(10.0, 10.0, 1.0).unwrap();
        assert_eq!(g.key(&Point::new(9.999, 9.999)).unwrap(), 99);
        assert_eq!(g.key(&Point::new(0.0, 0.0)).unwrap(), 0);
        assert_eq!(g.key(&Point::new(3.5, 1.2)).unwrap(), 13);
    }

    #[test]
    fn test_out_of_bounds() {
        let g = GridGeometry::new(10.0, 10.0, 1.0).unwrap();
        assert_eq!(
            g.key(&Point::new(10.0, 5.0)),
            Err(GridError::OutOfBounds { x: 10.0, y: 5.0 })
        );
        assert!(g.key(&Point::new(-0.1, 0.0)).is_err());
        assert!(g.key(&Point::new(1.0, f64::NAN)).is_err());
        assert!(g.key(&Point::new(f64::INFINITY, 1.0)).is_err());
    }

    #[test]
    fn test_partial_last_cell() {
        // 10.5 / 1.0 rounds up to 11 columns covering [0, 11)
        let g = GridGeometry::new(10.5, 1.0, 1.0).unwrap();
        assert_eq!(g.key(&Point::new(10.7, 0.5)).unwrap(), 10);
    }

    #[test]
    fn test_key_coords_roundtrip() {
        let g = GridGeometry::new(7.0, 5.0, 1.0).unwrap();
        assert_eq!(g.key_of_coords(3, 2), 17);
        assert_eq!(g.coords_of_key(17), (3, 2));
    }

    #[test]
    fn test_idx_ok() {
        let g = GridGeometry::new(3.0, 2.0, 1.0).unwrap();
        assert!(g.idx_ok(0, 0));
        assert!(g.idx_ok(2, 1));
        assert!(!g.idx_ok(-1, 0));
        assert!(!g.idx_ok(3, 0));
        assert!(!g.idx_ok(0, 2));
    }
}
