//! Axis-aligned cell regions
use arrayvec::ArrayVec;
use nalgebra::{SVector, Vector3};

/// An axis-aligned box in `R^N`, plus the fixed coordinates that lift its
/// points into the evaluator's 3D space
///
/// Sub-regions and corners share one indexing scheme: bit `j` of the index
/// selects upper (set) vs lower (clear) along axis `j`.  Mesh extraction
/// depends on this, so it is part of the API contract rather than an
/// internal detail.
#[derive(Clone, Debug, PartialEq)]
pub struct Region<const N: usize> {
    /// Lower corner of the box
    pub lower: SVector<f64, N>,
    /// Upper corner of the box
    pub upper: SVector<f64, N>,
    /// Fixed values for the remaining `3 - N` axes
    pub perp: ArrayVec<f32, 1>,
}

impl<const N: usize> Region<N> {
    /// Builds a region with no lift coordinates (i.e. for 3D cells)
    pub fn new(lower: SVector<f64, N>, upper: SVector<f64, N>) -> Self {
        let out = Self {
            lower,
            upper,
            perp: ArrayVec::new(),
        };
        debug_assert!(
            out.lower.iter().zip(&out.upper).all(|(a, b)| a <= b),
            "inverted region {out:?}"
        );
        out
    }

    /// Builds a 2D region lifted to the plane at the given height
    pub fn with_perp(
        lower: SVector<f64, N>,
        upper: SVector<f64, N>,
        perp: f32,
    ) -> Self {
        let mut out = Self::new(lower, upper);
        out.perp.push(perp);
        out
    }

    /// Returns the volume of the region (area, for 2D regions)
    pub fn volume(&self) -> f64 {
        (self.upper - self.lower).iter().product()
    }

    /// Splits the region into `2^N` halves along every axis
    ///
    /// Sub-regions are returned in corner-bitmask order, so that sub-region
    /// `i` touches [`corner(i)`](Self::corner) of the parent.
    pub fn subdivide(&self) -> ArrayVec<Region<N>, 8> {
        let center = (self.lower + self.upper) / 2.0;
        (0..1usize << N)
            .map(|i| {
                let mut lower = self.lower;
                let mut upper = center;
                for j in 0..N {
                    if i & (1 << j) != 0 {
                        lower[j] = center[j];
                        upper[j] = self.upper[j];
                    }
                }
                Region {
                    lower,
                    upper,
                    perp: self.perp.clone(),
                }
            })
            .collect()
    }

    /// Returns the given corner of the region, keyed by bitmask
    pub fn corner(&self, i: usize) -> SVector<f64, N> {
        SVector::from_fn(|j, _| {
            if i & (1 << j) != 0 {
                self.upper[j]
            } else {
                self.lower[j]
            }
        })
    }

    /// Lifts an `N`-dimensional point into evaluator coordinates
    pub fn lift(&self, p: &SVector<f64, N>) -> Vector3<f32> {
        let mut out = Vector3::zeros();
        for i in 0..N {
            out[i] = p[i] as f32;
        }
        for (i, &v) in self.perp.iter().enumerate() {
            out[N + i] = v;
        }
        out
    }

    /// Returns the lower corner in evaluator coordinates
    pub fn lower3(&self) -> Vector3<f32> {
        self.lift(&self.lower)
    }

    /// Returns the upper corner in evaluator coordinates
    pub fn upper3(&self) -> Vector3<f32> {
        self.lift(&self.upper)
    }
}
