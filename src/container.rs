//! The height-field container.
//!
//! A `Container` models a rectangular box seen from above: a `width x height`
//! grid of stacked heights. Packages are dropped onto it with `add_package`,
//! scored with `estimate_bounding_volume` and observed through
//! `observe_height_map`.
//!
//! Grid cells are unit squares; cell `(x, y)` covers `[x, x+1) x [y, y+1)` and
//! is stored row-major at `y * width + x`.

use tracing::debug;

use crate::geometry::{cell_range, clamp_center, interval};
use crate::heightmap::HeightMap;
use crate::model::{CellSpan, PackageRequest, Placement, PlacementError, ValidationError};
use crate::types::{EPSILON_HEIGHT, validation};

/// Configuration of a container episode.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ContainerConfig {
    /// Number of grid cells along x.
    pub width: usize,
    /// Number of grid cells along y.
    pub height: usize,
    /// Factor applied to a package's height when it lands on an uneven surface (> 1).
    pub penalty_multiplier: f64,
    /// Maximum height difference under a footprint still treated as flat.
    pub flatness_tolerance: f64,
}

impl ContainerConfig {
    pub const DEFAULT_WIDTH: usize = 1000;
    pub const DEFAULT_HEIGHT: usize = 1000;
    pub const DEFAULT_PENALTY_MULTIPLIER: f64 = 10.0;
    pub const DEFAULT_FLATNESS_TOLERANCE: f64 = EPSILON_HEIGHT;

    /// Creates a builder for custom configuration.
    pub fn builder() -> ContainerConfigBuilder {
        ContainerConfigBuilder::default()
    }

    /// Checks that the configuration describes a usable container.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.width == 0 || self.height == 0 {
            return Err(ValidationError::InvalidConfiguration(format!(
                "grid must have at least one cell per axis, got {} x {}",
                self.width, self.height
            )));
        }
        if !self.penalty_multiplier.is_finite() || self.penalty_multiplier <= 1.0 {
            return Err(ValidationError::InvalidConfiguration(format!(
                "penalty_multiplier must be finite and greater than 1, got: {}",
                self.penalty_multiplier
            )));
        }
        if !self.flatness_tolerance.is_finite() || self.flatness_tolerance < 0.0 {
            return Err(ValidationError::InvalidConfiguration(format!(
                "flatness_tolerance must be finite and non-negative, got: {}",
                self.flatness_tolerance
            )));
        }
        Ok(())
    }

    /// Number of cells in the grid.
    pub fn cell_count(&self) -> usize {
        self.width.saturating_mul(self.height)
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            width: Self::DEFAULT_WIDTH,
            height: Self::DEFAULT_HEIGHT,
            penalty_multiplier: Self::DEFAULT_PENALTY_MULTIPLIER,
            flatness_tolerance: Self::DEFAULT_FLATNESS_TOLERANCE,
        }
    }
}

/// Builder for `ContainerConfig`.
#[derive(Clone, Debug, Default)]
pub struct ContainerConfigBuilder {
    config: ContainerConfig,
}

impl ContainerConfigBuilder {
    pub fn width(mut self, width: usize) -> Self {
        self.config.width = width;
        self
    }

    pub fn height(mut self, height: usize) -> Self {
        self.config.height = height;
        self
    }

    /// Sets both grid sides to the same length.
    pub fn side(self, side: usize) -> Self {
        self.width(side).height(side)
    }

    pub fn penalty_multiplier(mut self, multiplier: f64) -> Self {
        self.config.penalty_multiplier = multiplier;
        self
    }

    pub fn flatness_tolerance(mut self, tolerance: f64) -> Self {
        self.config.flatness_tolerance = tolerance;
        self
    }

    pub fn build(self) -> ContainerConfig {
        self.config
    }
}

/// Occupied frame of the container as used by the bounding volume estimate.
///
/// # Fields
/// * `max_height` - Tallest cell anywhere (before any height bias)
/// * `width` - Columns between the first and last non-empty column, inclusive
/// * `length` - Rows between the first and last non-empty row, inclusive
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, utoipa::ToSchema)]
pub struct BoundingExtent {
    pub max_height: f64,
    pub width: usize,
    pub length: usize,
}

impl BoundingExtent {
    /// `height_bias * max_height * width * length`.
    pub fn volume(&self, height_bias: f64) -> f64 {
        height_bias * self.max_height * self.width as f64 * self.length as f64
    }
}

/// Rectangular container represented as a top-down height field.
#[derive(Clone, Debug)]
pub struct Container {
    config: ContainerConfig,
    grid: Vec<f64>,
    placed: usize,
}

impl Container {
    /// Creates an empty container after validating the configuration.
    ///
    /// # Examples
    /// ```
    /// use box_stacking::container::{Container, ContainerConfig};
    ///
    /// let config = ContainerConfig::builder().side(100).build();
    /// let container = Container::new(config).unwrap();
    /// assert!(container.is_empty());
    /// assert_eq!(container.bounding_volume(), 0.0);
    ///
    /// let broken = ContainerConfig::builder().penalty_multiplier(0.5).build();
    /// assert!(Container::new(broken).is_err());
    /// ```
    pub fn new(config: ContainerConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self {
            grid: vec![0.0; config.cell_count()],
            config,
            placed: 0,
        })
    }

    /// Grid cells along x.
    #[inline]
    pub fn width(&self) -> usize {
        self.config.width
    }

    /// Grid cells along y.
    #[inline]
    pub fn height(&self) -> usize {
        self.config.height
    }

    #[inline]
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Number of packages accepted since construction or the last reset.
    #[inline]
    pub fn placed_count(&self) -> usize {
        self.placed
    }

    /// Raw stacked heights, row-major.
    #[inline]
    pub fn heights(&self) -> &[f64] {
        &self.grid
    }

    /// Raw height at cell `(x, y)`, `None` outside the grid.
    pub fn height_at(&self, x: usize, y: usize) -> Option<f64> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        Some(self.grid[self.index(x, y)])
    }

    pub fn max_height(&self) -> f64 {
        self.grid.iter().copied().fold(0.0, f64::max)
    }

    /// Lowest exposed surface.
    pub fn min_height(&self) -> f64 {
        self.grid.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// `true` while no cell holds any height.
    pub fn is_empty(&self) -> bool {
        self.grid.iter().all(|&h| h == 0.0)
    }

    /// Clears the grid for the next episode, keeping the allocation.
    pub fn reset(&mut self) {
        self.grid.fill(0.0);
        self.placed = 0;
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        y * self.config.width + x
    }

    /// Drops a package onto the height field.
    ///
    /// The centre is shifted so the footprint stays inside the container. If
    /// every cell under the footprint has the same height the package adds
    /// `size_z`; otherwise it adds `penalty_multiplier * size_z` to model an
    /// unstable stack. All footprint cells are raised by the same amount.
    ///
    /// # Errors
    /// Nothing is mutated on error:
    /// * `InvalidDimension` - a dimension is not positive and finite
    /// * `InvalidCoordinate` - a centre coordinate is not finite
    /// * `OversizedPackage` - `size_x > width` or `size_y > height`
    /// * `OutOfBounds` - the centre lies outside `[0, width) x [0, height)`
    /// * `HeightOverflow` - the new stack height would not be finite
    pub fn add_package(&mut self, request: PackageRequest) -> Result<Placement, PlacementError> {
        let result = self.plan(&request);
        match result {
            Ok(placement) => {
                self.apply(&placement);
                Ok(placement)
            }
            Err(err) => {
                debug!(code = err.code(), "package rejected: {}", err);
                Err(err)
            }
        }
    }

    /// Computes the placement for a request without touching the grid.
    fn plan(&self, request: &PackageRequest) -> Result<Placement, PlacementError> {
        let PackageRequest {
            x_center,
            y_center,
            dims,
        } = *request;

        validation::validate_dims(&dims).map_err(PlacementError::InvalidDimension)?;
        validation::validate_coordinate(x_center, "x_center")
            .map_err(PlacementError::InvalidCoordinate)?;
        validation::validate_coordinate(y_center, "y_center")
            .map_err(PlacementError::InvalidCoordinate)?;

        let width = self.width() as f64;
        let length = self.height() as f64;

        if dims.size_x > width || dims.size_y > length {
            return Err(PlacementError::OversizedPackage {
                size_x: dims.size_x,
                size_y: dims.size_y,
                width: self.width(),
                height: self.height(),
            });
        }

        if !(0.0..width).contains(&x_center) || !(0.0..length).contains(&y_center) {
            return Err(PlacementError::OutOfBounds {
                x_center,
                y_center,
                width: self.width(),
                height: self.height(),
            });
        }

        let x_center = clamp_center(x_center, dims.size_x, width);
        let y_center = clamp_center(y_center, dims.size_y, length);

        let (x_lo, x_hi) = interval(x_center, dims.size_x);
        let (y_lo, y_hi) = interval(y_center, dims.size_y);
        let x_cells = CellSpan::from(cell_range(x_lo, x_hi, self.width()));
        let y_cells = CellSpan::from(cell_range(y_lo, y_hi, self.height()));

        let (supported, base) = self.surface_under(x_cells, y_cells);
        let increment = if supported {
            dims.size_z
        } else {
            self.config.penalty_multiplier * dims.size_z
        };
        let top_height = base + increment;
        if !top_height.is_finite() {
            return Err(PlacementError::HeightOverflow { base, increment });
        }

        Ok(Placement {
            x_center,
            y_center,
            dims,
            x_cells,
            y_cells,
            supported,
            increment,
            top_height,
        })
    }

    /// Returns whether the footprint is flat and the highest height under it.
    ///
    /// Flat means the spread between the lowest and highest footprint cell is
    /// at most `flatness_tolerance`.
    fn surface_under(&self, x_cells: CellSpan, y_cells: CellSpan) -> (bool, f64) {
        let mut lowest = f64::INFINITY;
        let mut highest = f64::NEG_INFINITY;

        for y in y_cells.range() {
            let row = &self.grid[self.index(x_cells.start, y)..self.index(x_cells.end, y)];
            for &h in row {
                lowest = lowest.min(h);
                highest = highest.max(h);
            }
        }

        (highest - lowest <= self.config.flatness_tolerance, highest)
    }

    fn apply(&mut self, placement: &Placement) {
        let (start, end) = (placement.x_cells.start, placement.x_cells.end);
        for y in placement.y_cells.range() {
            let (from, to) = (self.index(start, y), self.index(end, y));
            for h in &mut self.grid[from..to] {
                *h += placement.increment;
            }
        }
        self.placed += 1;
    }

    /// Computes the occupied frame in a single pass over the grid.
    ///
    /// A column (fixed x) or row (fixed y) counts as occupied when any of its
    /// cells is non-zero. The width is `width - leading_empty - trailing_empty`
    /// columns, floored at 0; the length is the same over rows.
    pub fn bounding_extent(&self) -> BoundingExtent {
        let (w, h) = (self.width(), self.height());
        let mut occupied_cols = vec![false; w];
        let mut occupied_rows = vec![false; h];
        let mut max_height = 0.0_f64;

        for y in 0..h {
            let row = &self.grid[y * w..(y + 1) * w];
            for (x, &cell) in row.iter().enumerate() {
                if cell != 0.0 {
                    occupied_cols[x] = true;
                    occupied_rows[y] = true;
                    max_height = max_height.max(cell);
                }
            }
        }

        BoundingExtent {
            max_height,
            width: occupied_span(&occupied_cols),
            length: occupied_span(&occupied_rows),
        }
    }

    /// Fast approximate volume of the box enclosing all placed packages.
    ///
    /// `height_bias * max_height * occupied_width * occupied_length`, where the
    /// occupied width and length come from the empty margins on each side.
    /// The occupied region need not be rectangular, so this over-approximates
    /// irregular packings. Runs in O(width * height) regardless of how many
    /// packages were placed.
    ///
    /// # Errors
    /// `InvalidConfiguration` when `height_bias` is not positive and finite.
    pub fn estimate_bounding_volume(&self, height_bias: f64) -> Result<f64, ValidationError> {
        validate_height_bias(height_bias)?;
        Ok(self.bounding_extent().volume(height_bias))
    }

    /// `estimate_bounding_volume` with a neutral height bias of 1.
    pub fn bounding_volume(&self) -> f64 {
        self.bounding_extent().volume(1.0)
    }

    /// Agent-facing observation: heights relative to the lowest exposed surface.
    ///
    /// Returns an owned copy; the container cannot be modified through it.
    pub fn observe_height_map(&self) -> HeightMap {
        HeightMap::from_raw(self.width(), self.height(), &self.grid)
    }
}

/// Cells between the first and last `true` flag, inclusive; 0 if none is set.
fn occupied_span(flags: &[bool]) -> usize {
    let leading = flags.iter().take_while(|&&f| !f).count();
    let trailing = flags.iter().rev().take_while(|&&f| !f).count();
    flags.len().saturating_sub(leading + trailing)
}

/// Checks a bounding-volume height bias.
pub fn validate_height_bias(height_bias: f64) -> Result<(), ValidationError> {
    if !height_bias.is_finite() || height_bias <= 0.0 {
        return Err(ValidationError::InvalidConfiguration(format!(
            "height_bias must be positive and finite, got: {}",
            height_bias
        )));
    }
    Ok(())
}
