//! Heightmap rasterization for implicit solids.
//!
//! An implicit solid is a scalar field `f(x, y, z)` where `f < 0` marks the
//! inside. Given a batched [`Evaluator`] for such a field and an
//! axis-aligned [`Voxels`] grid, [`render`] produces a [`DepthImage`]
//! holding the greatest filled z per pixel and a [`NormalImage`] holding
//! packed surface normals at those hits.
//!
//! The renderer subdivides the grid recursively, pruning blocks that
//! interval arithmetic proves entirely inside or outside, visiting the
//! high-z half first so the visible shell occludes the interior, and
//! rasterizing leaf blocks in single evaluator batches. At the top level
//! the grid is carved into XY-disjoint tiles, one per evaluator, rendered
//! on parallel threads and composited after the join.
//!
//! Expression trees and their evaluators live outside this crate, behind
//! the [`Evaluator`] trait.
pub mod eval;
pub mod image;
pub mod interval;
pub mod render;
pub mod voxels;

mod error;

pub use error::Error;
pub use eval::{Derivs, Evaluator};
pub use image::{DepthImage, Image, NormalImage};
pub use interval::Interval;
pub use render::{render, render_into, CancelToken};
pub use voxels::{View, Voxels};
