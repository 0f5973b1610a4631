//! Heightmap rendering of implicit solids
//!
//! [`render`] walks an axis-aligned voxel grid with an evaluator pool and
//! produces a depth image and a packed normal image; [`render_into`] fills
//! caller-provided buffers instead. Renders can be interrupted through a
//! shared [`CancelToken`].
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

mod heightmap;
pub use heightmap::{render, render_into};

/// Token to cancel an in-progress render
///
/// Tokens are cheap to clone and shared between threads; once cancelled, a
/// token stays cancelled for the rest of the render.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Builds a new token, which is initialized as "not cancelled"
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks this token as cancelled
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Checks if the token is cancelled
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
