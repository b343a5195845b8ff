//! Grid classification and geometry metadata for model variables.
//!
//! Each variable exposed by an engine is discretized on a grid. The grid type
//! determines which geometry queries are meaningful: a uniform grid has a
//! spacing and an origin, a rectilinear or structured grid has per-cell
//! coordinate arrays, an unstructured grid additionally has connectivity.
//! Asking for an attribute the grid type does not have is an error, never a
//! default value.

use crate::errors::{BmiError, BmiResult};
use serde::{Deserialize, Serialize};

/// Classification of a variable's spatial discretization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GridType {
    Unknown,
    /// Regular spacing from a fixed origin
    Uniform,
    /// Per-axis coordinate arrays
    Rectilinear,
    /// Full coordinate grid
    Structured,
    /// Explicit cell connectivity
    Unstructured,
}

impl GridType {
    /// Whether the grid has per-dimension sizes (`grid_shape`).
    pub fn has_shape(&self) -> bool {
        matches!(
            self,
            GridType::Uniform | GridType::Rectilinear | GridType::Structured
        )
    }

    /// Whether the grid has a fixed cell spacing and origin.
    pub fn has_regular_spacing(&self) -> bool {
        matches!(self, GridType::Uniform)
    }

    /// Whether the grid has per-cell coordinate arrays (`grid_x`/`y`/`z`).
    pub fn has_coordinate_arrays(&self) -> bool {
        matches!(
            self,
            GridType::Rectilinear | GridType::Structured | GridType::Unstructured
        )
    }

    /// Whether the grid carries cell connectivity information.
    pub fn has_connectivity(&self) -> bool {
        matches!(self, GridType::Unstructured)
    }
}

impl std::fmt::Display for GridType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GridType::Unknown => write!(f, "unknown"),
            GridType::Uniform => write!(f, "uniform"),
            GridType::Rectilinear => write!(f, "rectilinear"),
            GridType::Structured => write!(f, "structured"),
            GridType::Unstructured => write!(f, "unstructured"),
        }
    }
}

/// Fail with [`BmiError::UnsupportedGrid`] unless `applicable` holds for the
/// given grid type.
pub fn ensure_applicable(
    operation: &'static str,
    grid_type: GridType,
    applicable: bool,
) -> BmiResult<()> {
    if applicable {
        Ok(())
    } else {
        Err(BmiError::UnsupportedGrid {
            operation,
            grid_type: grid_type.to_string(),
        })
    }
}

/// Coordinate axis selector for grid coordinate queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinateAxis {
    X,
    Y,
    Z,
}

/// Dimensions of a regular 2-D model grid as reported by an engine.
///
/// The layout follows the raster convention used by the engines: an
/// upper-left corner, per-axis cell sizes and row/column counts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridDimensions {
    pub x_upper_left: f64,
    pub y_upper_left: f64,
    pub x_size: f64,
    pub y_size: f64,
    pub rows: usize,
    pub cols: usize,
}

impl GridDimensions {
    /// The per-dimension sizes, `[rows, cols]`.
    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.cols]
    }

    /// The cell size along each dimension, `[x_size, y_size]`.
    pub fn spacing(&self) -> [f64; 2] {
        [self.x_size, self.y_size]
    }

    /// The lower-left corner of the grid, `[x, y]`.
    ///
    /// The engine reports the upper-left corner, so the y coordinate is
    /// shifted down by the grid height.
    pub fn origin(&self) -> [f64; 2] {
        [
            self.x_upper_left,
            self.y_upper_left - self.rows as f64 * self.y_size,
        ]
    }

    /// Total number of grid cells.
    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    fn dims() -> GridDimensions {
        GridDimensions {
            x_upper_left: 100.0,
            y_upper_left: 400.0,
            x_size: 0.5,
            y_size: 0.25,
            rows: 40,
            cols: 30,
        }
    }

    #[test]
    fn shape_is_rows_then_cols() {
        assert_eq!(dims().shape(), [40, 30]);
        assert_eq!(dims().cell_count(), 1200);
    }

    #[test]
    fn origin_is_lower_left() {
        let [x, y] = dims().origin();
        assert_eq!(x, 100.0);
        assert!(is_close!(y, 390.0));
    }

    #[test]
    fn applicability_per_grid_type() {
        assert!(GridType::Uniform.has_shape());
        assert!(GridType::Uniform.has_regular_spacing());
        assert!(!GridType::Uniform.has_coordinate_arrays());

        assert!(GridType::Rectilinear.has_shape());
        assert!(!GridType::Rectilinear.has_regular_spacing());
        assert!(GridType::Rectilinear.has_coordinate_arrays());

        assert!(!GridType::Unstructured.has_shape());
        assert!(GridType::Unstructured.has_coordinate_arrays());
        assert!(GridType::Unstructured.has_connectivity());

        assert!(!GridType::Unknown.has_shape());
        assert!(!GridType::Unknown.has_coordinate_arrays());
    }

    #[test]
    fn ensure_applicable_reports_operation_and_grid() {
        let err = ensure_applicable("get_grid_origin", GridType::Unstructured, false).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("get_grid_origin"));
        assert!(msg.contains("unstructured"));
    }

    #[test]
    fn serialise_round_trip() {
        let toml = toml::to_string(&dims()).unwrap();
        let back: GridDimensions = toml::from_str(&toml).unwrap();
        assert_eq!(back, dims());
    }
}
