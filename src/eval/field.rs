//! Closed-form fields and the bundled evaluator built on them
use super::Evaluator;
use crate::{
    types::{Grad, Interval},
    Error,
};
use nalgebra::Vector3;

/// Trait for math operations used during evaluation
///
/// Implementing a field generically over this trait gives point, interval,
/// and gradient evaluation from a single definition.
pub trait FieldMath:
    Copy
    + From<f32>
    + std::ops::Add<Self, Output = Self>
    + std::ops::Sub<Self, Output = Self>
    + std::ops::Mul<Self, Output = Self>
    + std::ops::Neg<Output = Self>
{
    /// Absolute value
    fn abs(self) -> Self;
    /// Square root
    fn sqrt(self) -> Self;
    /// Square, which may have tighter bounds than self-multiplication
    fn square(self) -> Self;
    /// Minimum of two values
    fn min(self, rhs: Self) -> Self;
    /// Maximum of two values
    fn max(self, rhs: Self) -> Self;
}

impl FieldMath for f32 {
    fn abs(self) -> Self {
        f32::abs(self)
    }
    fn sqrt(self) -> Self {
        f32::sqrt(self)
    }
    fn square(self) -> Self {
        self * self
    }
    fn min(self, rhs: Self) -> Self {
        f32::min(self, rhs)
    }
    fn max(self, rhs: Self) -> Self {
        f32::max(self, rhs)
    }
}

impl FieldMath for Interval {
    fn abs(self) -> Self {
        Interval::abs(self)
    }
    fn sqrt(self) -> Self {
        Interval::sqrt(self)
    }
    fn square(self) -> Self {
        Interval::square(self)
    }
    fn min(self, rhs: Self) -> Self {
        Interval::min(self, rhs)
    }
    fn max(self, rhs: Self) -> Self {
        Interval::max(self, rhs)
    }
}

impl FieldMath for Grad {
    fn abs(self) -> Self {
        Grad::abs(self)
    }
    fn sqrt(self) -> Self {
        Grad::sqrt(self)
    }
    fn square(self) -> Self {
        Grad::square(self)
    }
    fn min(self, rhs: Self) -> Self {
        Grad::min(self, rhs)
    }
    fn max(self, rhs: Self) -> Self {
        Grad::max(self, rhs)
    }
}

/// A closed-form implicit function `F: R^3 -> R`
///
/// The modeled solid is `{ p : F(p) < 0 }`.
pub trait Field {
    /// Evaluates the field at `(x, y, z)` in the given numeric type
    fn eval<T: FieldMath>(&self, x: T, y: T, z: T) -> T;
}

/// An [`Evaluator`] over a closed-form [`Field`]
///
/// Points are staged into an internal buffer, then flushed in a single pass
/// per batch.  Specialization frames are tracked only for balance checking;
/// a closed-form field has nothing to specialize.
pub struct FieldEval<F> {
    field: F,
    points: Vec<Vector3<f32>>,
    values: Vec<f32>,
    grads: Vec<Grad>,
    depth: usize,
}

impl<F: Field> FieldEval<F> {
    /// Builds a new evaluator over the given field
    pub fn new(field: F) -> Self {
        Self {
            field,
            points: vec![],
            values: vec![],
            grads: vec![],
            depth: 0,
        }
    }
}

impl<F: Field> Evaluator for FieldEval<F> {
    type Error = Error;

    fn eval_interval(
        &mut self,
        lower: Vector3<f32>,
        upper: Vector3<f32>,
    ) -> Result<Interval, Error> {
        let x = Interval::new(lower.x, upper.x);
        let y = Interval::new(lower.y, upper.y);
        let z = Interval::new(lower.z, upper.z);
        Ok(self.field.eval(x, y, z))
    }

    fn push(&mut self) {
        self.depth += 1;
    }

    fn pop(&mut self) {
        debug_assert!(self.depth > 0, "unbalanced specialization pop");
        self.depth -= 1;
    }

    fn set(&mut self, p: Vector3<f32>, slot: usize) {
        if slot >= self.points.len() {
            self.points.resize(slot + 1, Vector3::zeros());
        }
        self.points[slot] = p;
    }

    fn set_raw(&mut self, p: Vector3<f32>, slot: usize) {
        self.set(p, slot);
    }

    fn values(&mut self, n: usize) -> Result<&[f32], Error> {
        if n > self.points.len() {
            return Err(Error::BadBatchSize(n, self.points.len()));
        }
        self.values.clear();
        for p in &self.points[..n] {
            let v = self.field.eval(p.x, p.y, p.z);
            self.values.push(v);
        }
        Ok(&self.values)
    }

    fn derivs(&mut self, n: usize) -> Result<&[Grad], Error> {
        if n > self.points.len() {
            return Err(Error::BadBatchSize(n, self.points.len()));
        }
        self.grads.clear();
        for p in &self.points[..n] {
            let x = Grad::new(p.x, 1.0, 0.0, 0.0);
            let y = Grad::new(p.y, 0.0, 1.0, 0.0);
            let z = Grad::new(p.z, 0.0, 0.0, 1.0);
            let g = self.field.eval(x, y, z);
            self.grads.push(g);
        }
        Ok(&self.grads)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Sphere {
        radius: f32,
    }

    impl Field for Sphere {
        fn eval<T: FieldMath>(&self, x: T, y: T, z: T) -> T {
            (x.square() + y.square() + z.square()).sqrt()
                - T::from(self.radius)
        }
    }

    #[test]
    fn point_batches() {
        let mut eval = FieldEval::new(Sphere { radius: 1.0 });
        eval.set(Vector3::new(2.0, 0.0, 0.0), 0);
        eval.set(Vector3::new(0.0, 0.5, 0.0), 1);
        let out = eval.values(2).unwrap();
        assert_eq!(out, [1.0, -0.5]);
    }

    #[test]
    fn batch_size_checked() {
        let mut eval = FieldEval::new(Sphere { radius: 1.0 });
        eval.set(Vector3::zeros(), 0);
        assert!(matches!(eval.values(4), Err(Error::BadBatchSize(4, 1))));
    }

    #[test]
    fn gradients_point_outward() {
        let mut eval = FieldEval::new(Sphere { radius: 1.0 });
        eval.set(Vector3::new(2.0, 0.0, 0.0), 0);
        let out = eval.derivs(1).unwrap();
        assert_eq!(out[0].v, 1.0);
        assert_eq!(out[0].dx, 1.0);
        assert_eq!(out[0].dy, 0.0);
        assert_eq!(out[0].dz, 0.0);
    }

    #[test]
    fn gradient_nan_at_field_center() {
        let mut eval = FieldEval::new(Sphere { radius: 1.0 });
        eval.set(Vector3::zeros(), 0);
        let out = eval.derivs(1).unwrap();
        assert!(out[0].has_nan_grad());
    }

    #[test]
    fn interval_classification() {
        let mut eval = FieldEval::new(Sphere { radius: 1.0 });
        let i = eval
            .eval_interval(
                Vector3::new(2.0, 2.0, 2.0),
                Vector3::new(3.0, 3.0, 3.0),
            )
            .unwrap();
        assert!(i.is_empty());
        let i = eval
            .eval_interval(
                Vector3::new(-0.1, -0.1, -0.1),
                Vector3::new(0.1, 0.1, 0.1),
            )
            .unwrap();
        assert!(i.is_filled());
    }
}
