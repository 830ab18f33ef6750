//! Height-field container model for evolutionary 3D box stacking.
//!
//! The container is a top-down grid of stacked heights. Drivers drop packages
//! onto it, agents observe a relative height map, and candidate packings are
//! scored by a fast bounding volume estimate.

pub mod api;
pub mod config;
pub mod container;
pub mod evaluation;
pub mod geometry;
pub mod heightmap;
pub mod model;
pub mod types;

pub use container::{BoundingExtent, Container, ContainerConfig};
pub use heightmap::HeightMap;
pub use model::{PackageRequest, Placement, PlacementError, ValidationError};
pub use types::Dims;
