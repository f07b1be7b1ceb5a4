//! Adaptive cell trees for dual contouring
//!
//! An [`XTree`] recursively subdivides a [`Region`] against an implicit
//! function, pruning uniform cells with interval arithmetic and placing one
//! vertex in each surface-crossing leaf.  Vertex placement samples gradients
//! on a regular grid (the [Dual Marching Cubes] strategy) and minimizes the
//! resulting quadratic error function; branches whose children agree on a
//! simple topology are collapsed back into leaves when the merged error
//! stays small, following ["Dual Contouring of Hermite Data"] (Ju et al,
//! 2002), "Simplification with topology safety".
//!
//! The tree only places vertices; walking the dual grid to emit triangles
//! or segments is a separate concern, built on the read-only accessors
//! exposed here.
//!
//! [Dual Marching Cubes]: https://faculty.cc.gatech.edu/~jarek/papers/DMC.pdf
//! ["Dual Contouring of Hermite Data"]: https://www.cs.wustl.edu/~taoju/research/dualContour.pdf
mod dim;
mod qef;
mod region;

pub use dim::{CellDim, Dim};
pub use qef::{Qef, Solution, EIGENVALUE_CUTOFF};
pub use region::Region;

use crate::eval::{Evaluator, Specialize};
use arrayvec::ArrayVec;
use nalgebra::{SVector, Vector3};

/// Cells larger than this volume are subdivided rather than sampled
pub const VOLUME_EPS: f64 = 1e-3;

/// A branch collapses into a leaf when its merged error stays below this
pub const QEF_COLLAPSE_EPS: f64 = 1e-8;

/// Samples per axis on the vertex-placement grid
pub const SAMPLE_RES: usize = 4;

/// Candidates evaluated per edge-search round
pub const EDGE_SEARCH_SIZE: usize = 16;

/// Edge-search rounds; each narrows the bracket to the candidate spacing
pub const EDGE_SEARCH_DEPTH: usize = 4;

/// Classification of a whole cell against the field
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CellType {
    /// The field is non-negative throughout the cell
    Empty,
    /// The field is negative throughout the cell
    Filled,
    /// The surface may cross this cell
    Ambiguous,
}

/// Sign of the field at a single cell corner
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CornerState {
    /// The field is non-negative at this corner
    Empty,
    /// The field is negative at this corner
    Filled,
}

/// A cell in the adaptive subdivision tree
///
/// Corners, children, and sub-regions all share the `N`-bit corner bitmask
/// index: bit `j` set means upper along axis `j`.  Cells are built once and
/// read-only afterwards.
#[derive(Debug)]
pub struct XTree<const N: usize> {
    region: Region<N>,
    ty: CellType,
    corners: ArrayVec<CornerState, 8>,
    children: Option<Vec<XTree<N>>>,
    level: usize,
    rank: usize,
    manifold: bool,
    qef: Qef<N>,
    vert: SVector<f64, N>,
}

impl<const N: usize> XTree<N>
where
    Dim<N>: CellDim<N>,
{
    /// Recursively builds the cell tree for the given region
    ///
    /// The evaluator is exclusively borrowed for the whole build; children
    /// of a cell share its specialization frame, so there is no parallelism
    /// within a single tree.  Evaluator errors propagate out unmodified.
    pub fn build<E: Evaluator>(
        eval: &mut E,
        region: Region<N>,
    ) -> Result<Self, E::Error> {
        let mut out = Self::new_cell(region);

        // Preliminary interval evaluation to prune uniform regions
        let i = eval.eval_interval(out.region.lower3(), out.region.upper3())?;
        if i.is_filled() {
            out.fill_uniform(CellType::Filled);
            return Ok(out);
        }
        if i.is_empty() {
            out.fill_uniform(CellType::Empty);
            return Ok(out);
        }

        {
            // Hold a specialization frame while recursing (or sampling), so
            // that evaluations below may skip sub-expressions proven
            // constant over this region
            let mut scope = Specialize::new(eval);
            if out.region.volume() > VOLUME_EPS {
                let mut children = Vec::with_capacity(1 << N);
                for sub in out.region.subdivide() {
                    children.push(Self::build(&mut *scope, sub)?);
                }
                // Each child shares exactly one corner with this cell
                for i in 0..1 << N {
                    out.corners[i] = children[i].corners[i];
                }
                out.children = Some(children);
            } else {
                // Terminal cell: sample the field at every corner
                for i in 0..1 << N {
                    let pos = out.region.lift(&out.region.corner(i));
                    scope.set(pos, i);
                }
                let vs = scope.values(1 << N)?;
                for (corner, &v) in out.corners.iter_mut().zip(vs) {
                    *corner = if v < 0.0 {
                        CornerState::Filled
                    } else {
                        CornerState::Empty
                    };
                }
            }
        }

        // The corners alone decide the aggregate type; a branch may be
        // reclassified uniform here even when some children were ambiguous
        let mask = out.corner_mask();
        let full = ((1u16 << (1 << N)) - 1) as u8;
        out.ty = if mask == full {
            CellType::Filled
        } else if mask == 0 {
            CellType::Empty
        } else {
            CellType::Ambiguous
        };

        if out.is_branch() {
            let children = out.children.as_ref().unwrap();
            out.level = 1 + children.iter().map(|c| c.level).max().unwrap();
            if children.iter().all(|c| !c.is_branch()) {
                out.try_collapse(mask);
            }
        } else if out.ty == CellType::Ambiguous {
            out.manifold = Dim::<N>::corners_are_manifold(mask);
            out.find_intersections(eval)?;
            if out.manifold {
                out.sample_qef(eval)?;
                let sol = out.qef.solve();
                out.vert = sol.vert;
                out.rank = sol.rank;
            } else {
                // Non-manifold cells take the centroid of their edge
                // intersections ("Dual Contouring: The Secret Sauce")
                out.vert = out.qef.mass_point();
            }
        }

        if out.ty != CellType::Ambiguous {
            out.manifold = true;
        }
        Ok(out)
    }

    fn new_cell(region: Region<N>) -> Self {
        Self {
            region,
            ty: CellType::Ambiguous,
            corners: std::iter::repeat(CornerState::Empty)
                .take(1 << N)
                .collect(),
            children: None,
            level: 0,
            rank: 0,
            manifold: false,
            qef: Qef::new(),
            vert: SVector::zeros(),
        }
    }

    fn fill_uniform(&mut self, ty: CellType) {
        let state = if ty == CellType::Filled {
            CornerState::Filled
        } else {
            CornerState::Empty
        };
        self.ty = ty;
        for c in &mut self.corners {
            *c = state;
        }
        self.manifold = true;
    }

    /// Attempts to merge a branch whose children are all leaves into a
    /// single leaf
    ///
    /// The three topology-safety predicates from [Ju et al, 2002] gate the
    /// merge; the merged error then has to stay below
    /// [`QEF_COLLAPSE_EPS`] for the children to actually be released.
    fn try_collapse(&mut self, mask: u8) {
        let children = self.children.as_ref().unwrap();
        self.manifold = Dim::<N>::corners_are_manifold(mask)
            && children.iter().all(|c| c.manifold)
            && self.leaves_are_manifold();
        if !self.manifold {
            return;
        }

        // Feature rank is the maximum across children; lower-rank children
        // are left out of the positional mean so they can't pull the vertex
        // off a sharp feature they never saw
        self.rank = children.iter().map(|c| c.rank).max().unwrap();
        for c in children {
            if c.rank == self.rank {
                self.qef.add_mass_point(&c.qef);
            }
            self.qef.add_matrices(&c.qef);
        }

        let sol = self.qef.solve();
        self.vert = sol.vert;
        if sol.error < QEF_COLLAPSE_EPS {
            log::trace!(
                "collapsing level-{} branch (error = {:.3e})",
                self.level,
                sol.error
            );
            self.children = None;
            self.level = 0;
        }
    }

    /// Checks the sign at the midpoint of every coarse sub-face (edges,
    /// faces, and the cell body) against that face's corners
    ///
    /// A midpoint that disagrees with all of its face's corners means the
    /// children resolve surface detail that a single merged cell would
    /// destroy [Ju et al, 2002].
    fn leaves_are_manifold(&self) -> bool {
        let children = self.children.as_ref().unwrap();
        let corners = 1usize << N;
        // `axes` runs over nonempty axis subsets, picking out a class of
        // sub-faces; `q` fixes the remaining axes to lower/upper
        for axes in 1..corners {
            let fixed = !axes & (corners - 1);
            for q in 0..corners {
                if q & !fixed != 0 {
                    continue;
                }
                // The face midpoint coincides with this corner of child `q`
                let mid = children[q].corners[q | axes];
                let agrees = (0..corners)
                    .filter(|&s| s & !axes == 0)
                    .any(|s| self.corners[q | s] == mid);
                if !agrees {
                    return false;
                }
            }
        }
        true
    }

    /// Walks every sign-changing cell edge and accumulates its surface
    /// crossing into the mass point
    fn find_intersections<E: Evaluator>(
        &mut self,
        eval: &mut E,
    ) -> Result<(), E::Error> {
        for t in 0..N {
            let axis = 1 << t;
            for a in 0..1usize << N {
                if a & axis != 0 || self.corners[a] == self.corners[a | axis] {
                    continue;
                }
                let b = a | axis;
                let (inside, outside) =
                    if self.corners[a] == CornerState::Filled {
                        (self.region.corner(a), self.region.corner(b))
                    } else {
                        (self.region.corner(b), self.region.corner(a))
                    };
                let p = self.search_edge(eval, inside, outside)?;
                self.qef.push_intersection(p);
            }
        }
        Ok(())
    }

    /// Narrows the bracket around an edge's sign change
    ///
    /// Each round spreads [`EDGE_SEARCH_SIZE`] candidates uniformly over the
    /// bracket and keeps the last strictly-inside pair, shrinking the
    /// bracket by the candidate spacing every time.  `inside` stays strictly
    /// inside the surface throughout and is the returned crossing estimate.
    fn search_edge<E: Evaluator>(
        &self,
        eval: &mut E,
        mut inside: SVector<f64, N>,
        mut outside: SVector<f64, N>,
    ) -> Result<SVector<f64, N>, E::Error> {
        let mut ps = [SVector::<f64, N>::zeros(); EDGE_SEARCH_SIZE];
        for _ in 0..EDGE_SEARCH_DEPTH {
            for (j, p) in ps.iter_mut().enumerate() {
                let frac = j as f64 / (EDGE_SEARCH_SIZE - 1) as f64;
                *p = inside * (1.0 - frac) + outside * frac;
                eval.set_raw(self.region.lift(p), j);
            }
            let out = eval.values(EDGE_SEARCH_SIZE)?;

            // The first non-negative candidate bounds the crossing.  If no
            // candidate crossed (or the inside endpoint tied to zero under
            // a near-tangent field), the bracket is left unchanged.
            if let Some(j) = out.iter().position(|&v| v >= 0.0) {
                if j > 0 {
                    inside = ps[j - 1];
                    outside = ps[j];
                }
            }
        }
        Ok(inside)
    }

    /// Builds and stores the cell's error function from a regular grid of
    /// gradient samples spanning the region
    fn sample_qef<E: Evaluator>(&mut self, eval: &mut E) -> Result<(), E::Error> {
        let num = SAMPLE_RES.pow(N as u32);

        // Per-axis grid positions
        let mut pts = [[0.0f64; SAMPLE_RES]; N];
        for i in 0..SAMPLE_RES {
            let frac = i as f64 / (SAMPLE_RES - 1) as f64;
            for j in 0..N {
                pts[j][i] = self.region.lower[j] * (1.0 - frac)
                    + self.region.upper[j] * frac;
            }
        }

        let mut positions = Vec::with_capacity(num);
        for i in 0..num {
            let p = SVector::<f64, N>::from_fn(|j, _| {
                pts[j][(i / SAMPLE_RES.pow(j as u32)) % SAMPLE_RES]
            });
            eval.set(self.region.lift(&p), i);
            positions.push(p);
        }

        let ds = eval.derivs(num)?;
        for (p, d) in positions.iter().zip(ds) {
            // NaN gradients contribute a zero row, neutral in the sum
            if d.has_nan_grad() {
                continue;
            }
            let g = Vector3::new(d.dx as f64, d.dy as f64, d.dz as f64);
            let g = g / g.norm();
            let mut row = SVector::<f64, N>::zeros();
            for j in 0..N {
                row[j] = g[j];
            }
            let b = row.dot(p) - d.v as f64;
            self.qef.push_plane(row, b);
        }
        Ok(())
    }
}

impl<const N: usize> XTree<N> {
    /// Returns the region this cell covers
    pub fn region(&self) -> &Region<N> {
        &self.region
    }

    /// Returns the cell's aggregate classification
    pub fn cell_type(&self) -> CellType {
        self.ty
    }

    /// Looks up the field sign at the given corner, keyed by bitmask
    pub fn corner_state(&self, i: usize) -> CornerState {
        self.corners[i]
    }

    /// Packs the corner states into a byte, with bit `i` set iff corner `i`
    /// is filled
    pub fn corner_mask(&self) -> u8 {
        self.corners
            .iter()
            .enumerate()
            .filter(|(_i, &c)| c == CornerState::Filled)
            .fold(0, |acc, (i, _c)| acc | (1 << i))
    }

    /// Checks whether this cell has children
    pub fn is_branch(&self) -> bool {
        self.children.is_some()
    }

    /// Returns this cell's children, if it is a branch
    pub fn children(&self) -> Option<&[XTree<N>]> {
        self.children.as_deref()
    }

    /// Looks up the given child, keyed by corner bitmask
    pub fn child(&self, i: usize) -> Option<&XTree<N>> {
        self.children.as_ref().map(|c| &c[i])
    }

    /// Returns the cell's height: 0 for leaves, one more than the tallest
    /// child for branches
    pub fn level(&self) -> usize {
        self.level
    }

    /// Returns the feature rank of the cell's error function
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Checks whether this cell's sign configuration is safe to represent
    /// with a single vertex
    pub fn manifold(&self) -> bool {
        self.manifold
    }

    /// Returns the cell's vertex; only meaningful on leaves of ambiguous
    /// cells (sampled or collapsed)
    pub fn vert(&self) -> SVector<f64, N> {
        self.vert
    }

    /// Returns the cell's vertex, lifted into evaluator coordinates
    pub fn vert3(&self) -> Vector3<f64> {
        let mut out = Vector3::zeros();
        for i in 0..N {
            out[i] = self.vert[i];
        }
        for (i, &v) in self.region.perp.iter().enumerate() {
            out[N + i] = v as f64;
        }
        out
    }

    #[cfg(test)]
    pub(crate) fn qef(&self) -> &Qef<N> {
        &self.qef
    }
}
