//! Evaluation interface consumed during cell tree construction
//!
//! The cell tree drives a single [`Evaluator`] through interval queries,
//! staged point batches, and bulk gradient requests; the evaluator is
//! exclusively borrowed for the duration of a build.  Everything here works
//! in 3D coordinates: lower-dimensional cells lift their points by appending
//! fixed perpendicular coordinates before calling in.
mod field;

pub use field::{Field, FieldEval, FieldMath};

use crate::types::{Grad, Interval};
use nalgebra::Vector3;

/// Interface to an implicit function evaluator
///
/// Implementations may specialize themselves to a spatial region: [`push`]
/// opens a specialization frame in which sub-expressions proven constant over
/// the region may be skipped, and [`pop`] closes it.  Frames nest like a
/// stack and must stay balanced; [`Specialize`] enforces that scope.
///
/// Batched evaluation is split into a staging step ([`set`] / [`set_raw`])
/// and a flush ([`values`] / [`derivs`]), so that implementations can hand
/// the whole batch to vectorized or compiled backends at once.
///
/// [`push`]: Evaluator::push
/// [`pop`]: Evaluator::pop
/// [`set`]: Evaluator::set
/// [`set_raw`]: Evaluator::set_raw
/// [`values`]: Evaluator::values
/// [`derivs`]: Evaluator::derivs
pub trait Evaluator {
    /// Error produced by evaluation; surfaced to callers unwrapped
    type Error;

    /// Evaluates the function over an axis-aligned box, returning a
    /// conservative range of its values
    fn eval_interval(
        &mut self,
        lower: Vector3<f32>,
        upper: Vector3<f32>,
    ) -> Result<Interval, Self::Error>;

    /// Opens a specialization frame
    fn push(&mut self);

    /// Closes the innermost specialization frame
    fn pop(&mut self);

    /// Stages a point for batched evaluation in the given slot
    fn set(&mut self, p: Vector3<f32>, slot: usize);

    /// Stages a point without feeding the specialization machinery
    ///
    /// Used for throwaway probe points (e.g. bracketing searches) whose
    /// positions should not influence frame bookkeeping.
    fn set_raw(&mut self, p: Vector3<f32>, slot: usize);

    /// Evaluates the first `n` staged points
    fn values(&mut self, n: usize) -> Result<&[f32], Self::Error>;

    /// Evaluates the first `n` staged points with gradients
    ///
    /// Gradients may contain `NaN` partials (e.g. at the center of a
    /// distance field); callers are expected to screen for them.
    fn derivs(&mut self, n: usize) -> Result<&[Grad], Self::Error>;
}

/// Scoped specialization frame
///
/// Pushes a frame on construction and pops it on drop, so the stack stays
/// balanced on every exit path, including error propagation.
pub struct Specialize<'a, E: Evaluator> {
    eval: &'a mut E,
}

impl<'a, E: Evaluator> Specialize<'a, E> {
    /// Opens a new specialization frame on the given evaluator
    pub fn new(eval: &'a mut E) -> Self {
        eval.push();
        Self { eval }
    }
}

impl<E: Evaluator> Drop for Specialize<'_, E> {
    fn drop(&mut self) {
        self.eval.pop();
    }
}

impl<E: Evaluator> std::ops::Deref for Specialize<'_, E> {
    type Target = E;
    fn deref(&self) -> &E {
        self.eval
    }
}

impl<E: Evaluator> std::ops::DerefMut for Specialize<'_, E> {
    fn deref_mut(&mut self) -> &mut E {
        self.eval
    }
}
