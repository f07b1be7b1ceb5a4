//! Per-dimension tables and solvers
//!
//! Cells are generic over `N ∈ {2, 3}`, but two pieces can't be written
//! dimension-generically: the symmetric eigensolver wants a concrete matrix
//! size, and the corner-manifold table has a different shape per dimension.
//! Both hang off [`Dim`] so the rest of the crate can stay generic.
use nalgebra::{SMatrix, SVector};
use once_cell::sync::Lazy;

/// Marker type carrying per-dimension data for a `const` cell dimension
pub struct Dim<const N: usize>;

/// Tables and solvers that differ between 2- and 3-dimensional cells
pub trait CellDim<const N: usize> {
    /// Eigendecomposition of a symmetric matrix, as
    /// `(eigenvalues, eigenvectors)` with eigenvectors stored in columns
    fn symmetric_eigen(
        m: &SMatrix<f64, N, N>,
    ) -> (SVector<f64, N>, SMatrix<f64, N, N>);

    /// Checks whether a corner sign pattern admits a single surface patch,
    /// i.e. has no figure-eight / saddle ambiguity within the cell
    fn corners_are_manifold(mask: u8) -> bool;
}

impl CellDim<2> for Dim<2> {
    fn symmetric_eigen(
        m: &SMatrix<f64, 2, 2>,
    ) -> (SVector<f64, 2>, SMatrix<f64, 2, 2>) {
        let es = nalgebra::linalg::SymmetricEigen::new(*m);
        (es.eigenvalues, es.eigenvectors)
    }

    fn corners_are_manifold(mask: u8) -> bool {
        // Only the two checkerboard patterns (0b0110 and 0b1001) are unsafe
        const TABLE: [bool; 16] = [
            true, true, true, true, true, true, false, true, true, false,
            true, true, true, true, true, true,
        ];
        TABLE[mask as usize]
    }
}

impl CellDim<3> for Dim<3> {
    fn symmetric_eigen(
        m: &SMatrix<f64, 3, 3>,
    ) -> (SVector<f64, 3>, SMatrix<f64, 3, 3>) {
        let es = nalgebra::linalg::SymmetricEigen::new(*m);
        (es.eigenvalues, es.eigenvectors)
    }

    fn corners_are_manifold(mask: u8) -> bool {
        static TABLE: Lazy<[bool; 256]> = Lazy::new(|| {
            let mut out = [false; 256];
            for (mask, entry) in out.iter_mut().enumerate() {
                *entry = sign_pattern_is_manifold(mask as u32, 3);
            }
            out
        });
        TABLE[mask as usize]
    }
}

/// A sign pattern is manifold iff its filled corners and its empty corners
/// each form a single edge-connected set on the cell graph
fn sign_pattern_is_manifold(mask: u32, n: usize) -> bool {
    let full = (1u32 << (1 << n)) - 1;
    edge_connected(mask, n) && edge_connected(!mask & full, n)
}

/// Checks that the given corner set is connected along cell edges
///
/// The empty set is vacuously connected.
fn edge_connected(set: u32, n: usize) -> bool {
    if set == 0 {
        return true;
    }
    let mut seen = 1u32 << set.trailing_zeros();
    loop {
        let mut next = seen;
        for i in 0..1u32 << n {
            if seen & (1 << i) == 0 {
                continue;
            }
            for axis in 0..n {
                let j = i ^ (1 << axis);
                if set & (1 << j) != 0 {
                    next |= 1 << j;
                }
            }
        }
        if next == seen {
            return seen == set;
        }
        seen = next;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn corner_table_2d_matches_connectivity() {
        for mask in 0..16 {
            assert_eq!(
                <Dim<2> as CellDim<2>>::corners_are_manifold(mask),
                sign_pattern_is_manifold(mask as u32, 2),
                "table disagrees at mask {mask:04b}"
            );
        }
    }

    #[test]
    fn corner_table_3d_known_cases() {
        let manifold = <Dim<3> as CellDim<3>>::corners_are_manifold;
        assert!(manifold(0)); // all empty
        assert!(manifold(255)); // all filled
        assert!(manifold(0b0000_0001)); // single corner
        assert!(manifold(0b0000_0011)); // edge pair
        assert!(manifold(0b0000_1111)); // face

        assert!(!manifold(0b0000_1001)); // face diagonal
        assert!(!manifold(0b1000_0001)); // body diagonal
        assert!(!manifold(0b0110_1001)); // two diagonals
    }

    #[test]
    fn corner_table_3d_is_sign_symmetric() {
        let manifold = <Dim<3> as CellDim<3>>::corners_are_manifold;
        for mask in 0..=255u8 {
            assert_eq!(manifold(mask), manifold(!mask));
        }
    }

    #[test]
    fn eigen_recovers_symmetric_matrix() {
        let m = SMatrix::<f64, 3, 3>::new(
            2.0, 1.0, 0.0, //
            1.0, 2.0, 0.0, //
            0.0, 0.0, 5.0,
        );
        let (vals, vecs) = <Dim<3> as CellDim<3>>::symmetric_eigen(&m);
        let mut d = SMatrix::<f64, 3, 3>::zeros();
        for i in 0..3 {
            d[(i, i)] = vals[i];
        }
        let back = vecs * d * vecs.transpose();
        assert!((back - m).norm() < 1e-12);
    }
}
