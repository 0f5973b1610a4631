//! The contract between the renderer and field evaluators
//!
//! An [`Evaluator`] is bound to a single expression tree and evaluates the
//! tree's scalar field in batches: points are staged into numbered slots,
//! then one call produces values or gradients for every staged slot. The
//! renderer drives evaluators generically and never looks inside the tree.
use nalgebra::{Matrix4, Point3};

use crate::{interval::Interval, Error};

/// Gradient components for a batch of staged points
///
/// The slices are borrowed from the evaluator and cover exactly the
/// requested slot count.
pub struct Derivs<'a> {
    /// Partial derivatives with respect to `x`
    pub dx: &'a [f32],
    /// Partial derivatives with respect to `y`
    pub dy: &'a [f32],
    /// Partial derivatives with respect to `z`
    pub dz: &'a [f32],
}

/// Batched evaluator for a single expression tree
///
/// Evaluators are stateful: they hold an installed affine transform, the
/// staged input slots, and a stack of tree-activity hints. Each evaluator is
/// owned by at most one render worker at a time, so implementations need no
/// internal synchronization.
///
/// Errors returned from [`values`](Evaluator::values),
/// [`derivs`](Evaluator::derivs) and [`eval`](Evaluator::eval) are
/// propagated verbatim by the renderer.
pub trait Evaluator {
    /// Number of slots in one evaluation batch
    ///
    /// Any `N >= 1` is valid; implementations typically pick a SIMD-friendly
    /// size so that per-batch overhead amortizes.
    const N: usize;

    /// Installs a 4x4 affine transform applied to subsequent inputs
    ///
    /// The transform stays in effect until replaced.
    fn set_matrix(&mut self, mat: Matrix4<f32>);

    /// Stores a point into slot `k` without applying the transform
    ///
    /// Callers follow up with [`apply_transform`](Evaluator::apply_transform)
    /// once the whole batch is staged.
    ///
    /// # Panics
    /// Implementations may panic if `k >= N`; staging past the batch
    /// capacity is a programmer error.
    fn set_raw(&mut self, p: Point3<f32>, k: usize);

    /// Stores a point into slot `k` with the transform applied
    fn set(&mut self, p: Point3<f32>, k: usize);

    /// Applies the installed transform to the first `count` raw-staged slots
    fn apply_transform(&mut self, count: usize);

    /// Evaluates the field at the first `count` staged slots
    ///
    /// The result at slot `k` is `< 0` iff that point is inside the solid.
    fn values(&mut self, count: usize) -> Result<&[f32], Error>;

    /// Evaluates gradient components at the first `count` staged slots
    fn derivs(&mut self, count: usize) -> Result<Derivs<'_>, Error>;

    /// Interval-evaluates the field over an axis-aligned box
    ///
    /// The result `[a, b]` is conservative: every point of the box (after
    /// the installed transform) evaluates within it.
    fn eval(
        &mut self,
        lower: Point3<f32>,
        upper: Point3<f32>,
    ) -> Result<Interval, Error>;

    /// Temporarily disables subtrees that the latest interval evaluation
    /// proved inactive over its box
    ///
    /// Pushes nest like a stack; each `push` must be matched by exactly one
    /// [`pop`](Evaluator::pop) on every control path.
    fn push(&mut self);

    /// Restores the subtrees disabled by the matching [`push`](Evaluator::push)
    fn pop(&mut self);
}
