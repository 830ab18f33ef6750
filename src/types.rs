//! Common value types for the height-field container.
//!
//! Packages are described by a small fixed-arity `Dims` value rather than an
//! untyped tuple so the three axes cannot be swapped by accident.

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use utoipa::ToSchema;

/// Global numerical tolerance for floating-point comparisons.
pub const EPSILON_GENERAL: f64 = 1e-6;

/// Default tolerance when deciding whether a footprint rests on a flat surface.
///
/// Heights are sums of package heights, so exact equality is usually reachable;
/// the tolerance only absorbs accumulated rounding.
pub const EPSILON_HEIGHT: f64 = 1e-6;

/// Dimensions of a package along the three container axes.
///
/// All components are expressed in grid units: one unit equals one grid cell.
///
/// # Examples
/// ```
/// use box_stacking::types::Dims;
///
/// let dims = Dims::new(20.0, 10.0, 5.0);
/// assert_eq!(dims.base_area(), 200.0);
/// assert!(dims.is_valid());
/// assert!(!Dims::new(0.0, 1.0, 1.0).is_valid());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"size_x": 20.0, "size_y": 20.0, "size_z": 5.0}))]
pub struct Dims {
    /// Extent along the x axis (grid width direction).
    pub size_x: f64,
    /// Extent along the y axis (grid height direction).
    pub size_y: f64,
    /// Vertical extent, added to the height field.
    pub size_z: f64,
}

impl Dims {
    #[inline]
    pub const fn new(size_x: f64, size_y: f64, size_z: f64) -> Self {
        Self {
            size_x,
            size_y,
            size_z,
        }
    }

    /// Base area (x × y).
    #[inline]
    pub fn base_area(&self) -> f64 {
        self.size_x * self.size_y
    }

    #[inline]
    pub fn volume(&self) -> f64 {
        self.size_x * self.size_y * self.size_z
    }

    /// Checks if all components are positive and finite.
    #[inline]
    pub fn is_valid(&self) -> bool {
        validation::validate_dims(self).is_ok()
    }

    /// Half extents of the footprint along x and y.
    #[inline]
    pub fn half_footprint(&self) -> (f64, f64) {
        (self.size_x / 2.0, self.size_y / 2.0)
    }
}

impl From<(f64, f64, f64)> for Dims {
    #[inline]
    fn from(tuple: (f64, f64, f64)) -> Self {
        Self::new(tuple.0, tuple.1, tuple.2)
    }
}

impl From<Dims> for (f64, f64, f64) {
    #[inline]
    fn from(dims: Dims) -> Self {
        (dims.size_x, dims.size_y, dims.size_z)
    }
}

/// Validation helpers shared by the container and its configuration.
pub mod validation {
    use super::Dims;

    /// Validates a single package dimension.
    ///
    /// # Returns
    /// `Ok(())` for positive finite values, otherwise error text
    pub fn validate_dimension(value: f64, name: &str) -> Result<(), String> {
        if value.is_nan() {
            return Err(format!("{} must not be NaN", name));
        }
        if value.is_infinite() {
            return Err(format!("{} must not be infinite", name));
        }
        if value <= 0.0 {
            return Err(format!("{} must be positive, got: {}", name, value));
        }
        Ok(())
    }

    /// Validates all three package dimensions.
    pub fn validate_dims(dims: &Dims) -> Result<(), String> {
        validate_dimension(dims.size_x, "size_x")?;
        validate_dimension(dims.size_y, "size_y")?;
        validate_dimension(dims.size_z, "size_z")?;
        Ok(())
    }

    /// Validates a placement coordinate. Any finite value is accepted here;
    /// range checks belong to the container.
    pub fn validate_coordinate(value: f64, name: &str) -> Result<(), String> {
        if !value.is_finite() {
            return Err(format!("{} must be finite, got: {}", name, value));
        }
        Ok(())
    }
}
