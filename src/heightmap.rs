//! Relative height map handed to placement agents.

use serde::Serialize;
use utoipa::ToSchema;

/// Top-down view of the container, normalised so the lowest exposed surface reads 0.
///
/// The map owns its values; mutating it never touches the container it came from.
/// Values are stored row-major (`y * width + x`), matching the container grid.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct HeightMap {
    width: usize,
    height: usize,
    /// Raw height that was subtracted from every cell.
    baseline: f64,
    values: Vec<f64>,
}

impl HeightMap {
    /// Builds a relative map from raw heights by subtracting their minimum.
    pub(crate) fn from_raw(width: usize, height: usize, raw: &[f64]) -> Self {
        debug_assert_eq!(raw.len(), width * height);
        let baseline = raw.iter().copied().fold(f64::INFINITY, f64::min);
        let baseline = if baseline.is_finite() { baseline } else { 0.0 };
        let values = raw.iter().map(|&h| h - baseline).collect();
        Self {
            width,
            height,
            baseline,
            values,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    /// Relative height at cell `(x, y)`, `None` outside the grid.
    pub fn get(&self, x: usize, y: usize) -> Option<f64> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.values.get(y * self.width + x).copied()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Largest relative height, i.e. the unevenness of the surface.
    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }

    /// Smallest relative height; 0 for any non-empty map.
    pub fn min(&self) -> f64 {
        let min = self.values.iter().copied().fold(f64::INFINITY, f64::min);
        if min.is_finite() { min } else { 0.0 }
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}
