//! Quadratic error functions for vertex placement
use super::dim::{CellDim, Dim};
use nalgebra::{SMatrix, SVector};

/// Eigenvalues smaller than this (in magnitude) are treated as zero when
/// inverting `AᵀA`; the count of survivors is the feature rank
pub const EIGENVALUE_CUTOFF: f64 = 1e-10;

/// Accumulated quadratic error function for a single cell
///
/// The error being minimized is `Σ (nᵢ · (x − pᵢ))²` over one plane per
/// sample, kept in the compact form `(AᵀA, Aᵀb, bᵀb)`.  The mass point is
/// stored as a position sum plus a contribution count, so that accumulation
/// stays additive when cells are merged.
#[derive(Copy, Clone, Debug)]
pub struct Qef<const N: usize> {
    ata: SMatrix<f64, N, N>,
    atb: SVector<f64, N>,
    btb: f64,
    mass_point: SVector<f64, N>,
    mass_count: f64,
}

/// Output of a QEF solve
#[derive(Copy, Clone, Debug)]
pub struct Solution<const N: usize> {
    /// Position minimizing the error, biased toward the mass point along
    /// any null directions
    pub vert: SVector<f64, N>,
    /// Count of eigenvalues that survived truncation
    pub rank: usize,
    /// Error value at `vert`
    pub error: f64,
}

impl<const N: usize> Default for Qef<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Qef<N> {
    /// Builds a new, empty error function
    pub fn new() -> Self {
        Self {
            ata: SMatrix::zeros(),
            atb: SVector::zeros(),
            btb: 0.0,
            mass_point: SVector::zeros(),
            mass_count: 0.0,
        }
    }

    /// Accumulates a surface intersection into the mass point
    pub fn push_intersection(&mut self, pos: SVector<f64, N>) {
        self.mass_point += pos;
        self.mass_count += 1.0;
    }

    /// Accumulates one plane constraint `row · x = b`
    ///
    /// `row` is expected to be a unit normal (or zero, which is a no-op).
    pub fn push_plane(&mut self, row: SVector<f64, N>, b: f64) {
        self.ata += row * row.transpose();
        self.atb += row * b;
        self.btb += b * b;
    }

    /// Adds another cell's matrix terms into this one
    pub fn add_matrices(&mut self, rhs: &Self) {
        self.ata += rhs.ata;
        self.atb += rhs.atb;
        self.btb += rhs.btb;
    }

    /// Adds another cell's mass point into this one
    ///
    /// Kept separate from [`add_matrices`](Self::add_matrices): when merging
    /// children, only the ones at the parent's feature rank contribute to
    /// the positional mean.
    pub fn add_mass_point(&mut self, rhs: &Self) {
        self.mass_point += rhs.mass_point;
        self.mass_count += rhs.mass_count;
    }

    /// Returns the centroid of the accumulated intersections
    pub fn mass_point(&self) -> SVector<f64, N> {
        self.mass_point / self.mass_count
    }

    /// Returns the number of accumulated intersections
    pub fn mass_count(&self) -> f64 {
        self.mass_count
    }

    /// Solves for the error-minimizing vertex
    ///
    /// `AᵀA` is symmetric, so its eigenvectors form an orthonormal basis and
    /// the pseudo-inverse is `U · D⁻¹ · Uᵀ` with near-zero eigenvalues
    /// truncated.  Solving relative to the mass point pins any null
    /// directions to the centroid of the surface intersections, which keeps
    /// sliver vertices from wandering off along under-constrained axes.
    pub fn solve(&self) -> Solution<N>
    where
        Dim<N>: CellDim<N>,
    {
        let (eigenvalues, u) = Dim::<N>::symmetric_eigen(&self.ata);

        let mut d_inv = SMatrix::<f64, N, N>::zeros();
        let mut rank = 0;
        for i in 0..N {
            if eigenvalues[i].abs() >= EIGENVALUE_CUTOFF {
                d_inv[(i, i)] = 1.0 / eigenvalues[i];
                rank += 1;
            }
        }
        let pseudo_inv = u * d_inv * u.transpose();

        let center = self.mass_point();
        let vert = pseudo_inv * (self.atb - self.ata * center) + center;
        let error =
            vert.dot(&(self.ata * vert)) - 2.0 * vert.dot(&self.atb) + self.btb;
        Solution { vert, rank, error }
    }
}
