//! Volumes and the geometry that places them in physical space.

pub mod geometry;
pub mod grid;
pub mod image;

pub use geometry::{Geometry, GeometryError};
pub use grid::generate_grid_3d;
pub use image::Image;
