//! Data models exchanged with the container.
//!
//! - `PackageRequest`: a transient placement proposal from a driver or agent
//! - `Placement`: what an accepted request did to the height field
//! - `PlacementError` / `ValidationError`: the failure taxonomy

use std::ops::Range;

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::types::Dims;

/// Reasons why `Container::add_package` refused a request.
///
/// Every variant leaves the container untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlacementError {
    /// Non-positive, NaN or infinite package dimension.
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),
    /// NaN or infinite placement coordinate.
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),
    /// Footprint wider or longer than the container; no clamp can fix it.
    #[error(
        "Package footprint {size_x} x {size_y} exceeds container {width} x {height}"
    )]
    OversizedPackage {
        size_x: f64,
        size_y: f64,
        width: usize,
        height: usize,
    },
    /// Centre outside `[0, width) x [0, height)`.
    #[error("Package centre ({x_center}, {y_center}) lies outside container {width} x {height}")]
    OutOfBounds {
        x_center: f64,
        y_center: f64,
        width: usize,
        height: usize,
    },
    /// The resulting stack height is not representable as a finite `f64`.
    #[error("Stacking {increment} onto {base} overflows the height field")]
    HeightOverflow { base: f64, increment: f64 },
}

impl PlacementError {
    /// Stable machine-readable code, used in events and API responses.
    pub fn code(&self) -> &'static str {
        match self {
            PlacementError::InvalidDimension(_) => "invalid_dimension",
            PlacementError::InvalidCoordinate(_) => "invalid_coordinate",
            PlacementError::OversizedPackage { .. } => "oversized_package",
            PlacementError::OutOfBounds { .. } => "out_of_bounds",
            PlacementError::HeightOverflow { .. } => "height_overflow",
        }
    }
}

/// Validation error for configuration and scoring parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// A proposal to drop a package centred at `(x_center, y_center)`.
///
/// Coordinates live in the grid's range `[0, width) x [0, height)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "x_center": 10.0,
    "y_center": 10.0,
    "dims": {"size_x": 20.0, "size_y": 20.0, "size_z": 5.0}
}))]
pub struct PackageRequest {
    pub x_center: f64,
    pub y_center: f64,
    pub dims: Dims,
}

impl PackageRequest {
    #[inline]
    pub fn new(x_center: f64, y_center: f64, dims: impl Into<Dims>) -> Self {
        Self {
            x_center,
            y_center,
            dims: dims.into(),
        }
    }
}

/// Half-open range of grid cells along one axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CellSpan {
    pub start: usize,
    pub end: usize,
}

impl CellSpan {
    /// Number of cells covered.
    #[inline]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl From<Range<usize>> for CellSpan {
    fn from(range: Range<usize>) -> Self {
        Self {
            start: range.start,
            end: range.end,
        }
    }
}

/// Result of an accepted `add_package` call.
///
/// # Fields
/// * `x_center`, `y_center` - Centre after clamping into the container
/// * `x_cells`, `y_cells` - Grid cells covered by the footprint
/// * `supported` - `true` if the footprint landed on a flat surface
/// * `increment` - Height added to every footprint cell (penalised when unsupported)
/// * `top_height` - Highest footprint cell after the update
#[derive(Clone, Copy, Debug, PartialEq, Serialize, ToSchema)]
pub struct Placement {
    pub x_center: f64,
    pub y_center: f64,
    pub dims: Dims,
    pub x_cells: CellSpan,
    pub y_cells: CellSpan,
    pub supported: bool,
    pub increment: f64,
    pub top_height: f64,
}

impl Placement {
    /// Whether the requested centre had to be moved to keep the footprint inside.
    pub fn was_clamped(&self, request: &PackageRequest) -> bool {
        self.x_center != request.x_center || self.y_center != request.y_center
    }

    /// Number of grid cells covered by the footprint.
    pub fn cell_count(&self) -> usize {
        self.x_cells.len() * self.y_cells.len()
    }
}
