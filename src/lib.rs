//! Adaptive cell trees for dual contouring of implicit surfaces.
//!
//! This crate builds the spatial acceleration structure at the heart of a
//! [Dual Contouring](https://www.cs.wustl.edu/~taoju/research/dualContour.pdf)
//! mesher: a tree of axis-aligned cells, refined where the surface of an
//! implicit function might cross, with one vertex placed per surface cell by
//! minimizing a quadratic error function over sampled gradients.  Uniform
//! regions are pruned early with interval arithmetic, and branches that
//! resolve no extra topology are folded back into single leaves.
//!
//! The implicit function is consumed through the [`eval::Evaluator`] trait;
//! [`eval::FieldEval`] adapts any closed-form [`eval::Field`] to it.
//!
//! ```
//! use nalgebra::Vector3;
//! use xtree::{
//!     eval::{Field, FieldEval, FieldMath},
//!     Region, XTree,
//! };
//!
//! struct Sphere;
//! impl Field for Sphere {
//!     fn eval<T: FieldMath>(&self, x: T, y: T, z: T) -> T {
//!         (x.square() + y.square() + z.square()).sqrt() - T::from(0.6)
//!     }
//! }
//!
//! let mut eval = FieldEval::new(Sphere);
//! let region = Region::new(
//!     Vector3::new(-1.0, -1.0, -1.0),
//!     Vector3::new(1.0, 1.0, 1.0),
//! );
//! let tree = XTree::build(&mut eval, region)?;
//! assert!(tree.is_branch());
//! # Ok::<(), xtree::Error>(())
//! ```
#![warn(missing_docs)]

mod error;
pub mod eval;
pub mod types;
pub mod xtree;

pub use error::Error;
pub use xtree::{Region, XTree};
