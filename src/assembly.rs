use indicatif::ProgressBar;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CscMatrix};
use sprs::{FillInReduction, SymmetryCheck, TriMat};
use sprs_ldl::{Ldl, LdlNumeric};

use crate::error::PerovskiteError;
use crate::lattice::{Lattice, CONDITION_NUMBER_LIMIT};

/// Full local boundary basis: 26 canonical tag slots times 6 DOFs.
pub const FULL_BOUNDARY_DOF: usize = 26 * 6;

/// Precomputed condensed-stiffness (Schur complement) matrices keyed by the
/// radius vector they were generated for. Lookup is nearest-neighbor in
/// Euclidean distance over the radii.
#[derive(Debug, Default)]
pub struct SchurTable {
    entries: Vec<(Vec<f64>, DMatrix<f64>)>,
}

impl SchurTable {
    pub fn new() -> SchurTable {
        SchurTable::default()
    }

    /// Registers a condensed stiffness matrix for a radius vector.
    pub fn insert(&mut self, radii: Vec<f64>, matrix: DMatrix<f64>) -> Result<(), PerovskiteError> {
        if matrix.nrows() != matrix.ncols() {
            return Err(PerovskiteError::Input(format!(
                "Schur matrix must be square, got {}x{}",
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        if let Some((key, _)) = self.entries.first() {
            if key.len() != radii.len() {
                return Err(PerovskiteError::Input(format!(
                    "Schur key length {} does not match table key length {}",
                    radii.len(),
                    key.len()
                )));
            }
        }
        self.entries.push((radii, matrix));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the matrix whose radius key is closest to the query vector.
    /// Ties keep the earliest entry.
    pub fn lookup_nearest(&self, radii: &[f64]) -> Result<&DMatrix<f64>, PerovskiteError> {
        if self.entries.is_empty() {
            return Err(PerovskiteError::Input(
                "Schur table is empty".to_owned(),
            ));
        }
        let mut best: Option<(f64, &DMatrix<f64>)> = None;
        for (key, matrix) in &self.entries {
            if key.len() != radii.len() {
                return Err(PerovskiteError::Input(format!(
                    "Schur lookup key length {} does not match table key length {}",
                    radii.len(),
                    key.len()
                )));
            }
            let distance: f64 = key
                .iter()
                .zip(radii)
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            match best {
                Some((best_distance, _)) if distance >= best_distance => {}
                _ => best = Some((distance, matrix)),
            }
        }
        Ok(best.expect("table checked non-empty").1)
    }
}

/// Expands a condensed matrix defined over the boundary nodes actually
/// present in a cell onto the full 156-DOF canonical basis. `present`
/// flags, per canonical tag rank, whether the cell has a node in that slot.
pub fn expand_to_full_basis(
    reduced: &DMatrix<f64>,
    present: &[bool; 26],
) -> Result<DMatrix<f64>, PerovskiteError> {
    let active = present.iter().filter(|p| **p).count() * 6;
    if reduced.nrows() != active {
        return Err(PerovskiteError::Input(format!(
            "Reduced Schur matrix has {} rows, expected {} for the present nodes",
            reduced.nrows(),
            active
        )));
    }
    let mut dof_map = Vec::with_capacity(active);
    for (rank, is_present) in present.iter().enumerate() {
        if *is_present {
            for dof in 0..6 {
                dof_map.push(rank * 6 + dof);
            }
        }
    }
    let mut full = DMatrix::zeros(FULL_BOUNDARY_DOF, FULL_BOUNDARY_DOF);
    for i in 0..active {
        for j in 0..active {
            full[(dof_map[i], dof_map[j])] = reduced[(i, j)];
        }
    }
    Ok(full)
}

/// Factorized handle of the global boundary preconditioner, consumed by the
/// external conjugate-gradient loop.
pub enum Preconditioner {
    /// Sparse LDL factorization of the assembled operator.
    Factorized(LdlNumeric<f64, usize>),
    /// Dense pseudo-inverse fallback for ill-conditioned assemblies.
    PseudoInverse(DMatrix<f64>),
}

impl std::fmt::Debug for Preconditioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Preconditioner::Factorized(_) => write!(f, "Preconditioner::Factorized(...)"),
            Preconditioner::PseudoInverse(m) => {
                write!(f, "Preconditioner::PseudoInverse({}x{})", m.nrows(), m.ncols())
            }
        }
    }
}

impl Preconditioner {
    /// Applies the preconditioner: solves `M x = rhs` (or multiplies by the
    /// pseudo-inverse).
    pub fn apply(&self, rhs: &DVector<f64>) -> DVector<f64> {
        match self {
            Preconditioner::Factorized(ldl) => {
                DVector::from_vec(ldl.solve(rhs.as_slice()))
            }
            Preconditioner::PseudoInverse(inverse) => inverse * rhs,
        }
    }
}

/// Assembles the global boundary preconditioner `Σ B·S·Bᵗ` over all cells
/// as a sparse matrix of size (freeDOF × freeDOF).
///
/// Coupling operators are (re)built against the current free-DOF
/// assignment; each cell's condensed stiffness comes from the nearest table
/// entry for its radius vector.
pub fn assemble_global_matrix(
    lattice: &mut Lattice,
    table: &SchurTable,
) -> Result<CscMatrix<f64>, PerovskiteError> {
    lattice.build_coupling_operators()?;
    let n_free_dof = lattice
        .free_dof()
        .expect("free DOF count set by build_coupling_operators");

    let mut global = CooMatrix::new(n_free_dof, n_free_dof);
    let bar = ProgressBar::new(lattice.cells.len() as u64);
    for cell in &lattice.cells {
        bar.inc(1);
        let schur = table.lookup_nearest(&cell.radii)?;
        let coupling = cell
            .coupling
            .as_ref()
            .expect("coupling operator built above");
        if schur.nrows() != coupling.ncols() {
            return Err(PerovskiteError::Input(format!(
                "Schur matrix dimension {} does not match cell boundary DOF count {}",
                schur.nrows(),
                coupling.ncols()
            )));
        }
        let entries: Vec<(usize, usize)> = coupling
            .triplet_iter()
            .map(|(row, col, _)| (row, col))
            .collect();
        for &(g1, l1) in &entries {
            for &(g2, l2) in &entries {
                let value = schur[(l1, l2)];
                if value != 0.0 {
                    global.push(g1, g2, value);
                }
            }
        }
    }
    bar.finish_and_clear();

    let csc = CscMatrix::from(&global);

    let mut row_sums = vec![0.0; n_free_dof];
    for (row, _, value) in csc.triplet_iter() {
        row_sums[row] += *value;
    }
    if row_sums.iter().any(|sum| *sum == 0.0) {
        println!("warning: some rows of the assembled preconditioner are all zeros");
    }

    Ok(csc)
}

/// Factorizes the assembled preconditioner: sparse LDL in the
/// well-conditioned case, dense pseudo-inverse when the condition number
/// exceeds the limit.
pub fn factorize_preconditioner(
    matrix: &CscMatrix<f64>,
) -> Result<Preconditioner, PerovskiteError> {
    let n = matrix.nrows();
    let mut dense = DMatrix::zeros(n, n);
    for (row, col, value) in matrix.triplet_iter() {
        dense[(row, col)] += *value;
    }

    let singular_values = dense.singular_values();
    let sigma_max = singular_values.max();
    let sigma_min = singular_values.min();
    let condition = if sigma_min == 0.0 {
        f64::INFINITY
    } else {
        sigma_max / sigma_min
    };
    println!("info: preconditioner condition number: {:.3e}", condition);

    if condition > CONDITION_NUMBER_LIMIT {
        println!("warning: ill-conditioned preconditioner, using pseudo-inverse");
        let inverse = dense
            .pseudo_inverse(1e-10)
            .map_err(|err| PerovskiteError::Solver(format!("Pseudo-inverse failed: {}", err)))?;
        return Ok(Preconditioner::PseudoInverse(inverse));
    }

    let mut triplets = TriMat::new((n, n));
    for (row, col, value) in matrix.triplet_iter() {
        triplets.add_triplet(row, col, *value);
    }
    let sparse = triplets.to_csc();
    let ldl = Ldl::new()
        .fill_in_reduction(FillInReduction::ReverseCuthillMcKee)
        .check_symmetry(SymmetryCheck::DontCheckSymmetry)
        .numeric(sparse.view())
        .map_err(|err| PerovskiteError::Solver(format!("LDL factorization failed: {}", err)))?;
    println!("info: using sparse LDL factorization of the preconditioner");
    Ok(Preconditioner::Factorized(ldl))
}

/// Assembles and factorizes in one step.
pub fn build_preconditioner(
    lattice: &mut Lattice,
    table: &SchurTable,
) -> Result<Preconditioner, PerovskiteError> {
    let matrix = assemble_global_matrix(lattice, table)?;
    factorize_preconditioner(&matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn nearest_lookup_picks_closest_key() {
        let mut table = SchurTable::new();
        table
            .insert(vec![0.05], DMatrix::identity(6, 6) * 1.0)
            .unwrap();
        table
            .insert(vec![0.1], DMatrix::identity(6, 6) * 2.0)
            .unwrap();
        let near = table.lookup_nearest(&[0.09]).unwrap();
        assert_relative_eq!(near[(0, 0)], 2.0);
        let near = table.lookup_nearest(&[0.06]).unwrap();
        assert_relative_eq!(near[(0, 0)], 1.0);
    }

    #[test]
    fn empty_table_and_key_mismatch_are_errors() {
        let table = SchurTable::new();
        assert!(table.lookup_nearest(&[0.1]).is_err());

        let mut table = SchurTable::new();
        table.insert(vec![0.05], DMatrix::identity(6, 6)).unwrap();
        assert!(table.lookup_nearest(&[0.05, 0.1]).is_err());
        assert!(table
            .insert(vec![0.05, 0.1], DMatrix::identity(6, 6))
            .is_err());
    }

    #[test]
    fn expansion_scatters_into_canonical_slots() {
        // Two present nodes in slots 0 and 3.
        let mut present = [false; 26];
        present[0] = true;
        present[3] = true;
        let reduced = DMatrix::from_fn(12, 12, |i, j| (i * 12 + j) as f64);
        let full = expand_to_full_basis(&reduced, &present).unwrap();
        assert_eq!(full.nrows(), FULL_BOUNDARY_DOF);
        assert_relative_eq!(full[(0, 0)], reduced[(0, 0)]);
        assert_relative_eq!(full[(18, 18)], reduced[(6, 6)]);
        assert_relative_eq!(full[(0, 18)], reduced[(0, 6)]);
        assert_relative_eq!(full[(6, 6)], 0.0);
    }

    #[test]
    fn expansion_rejects_wrong_dimensions() {
        let present = [false; 26];
        let reduced = DMatrix::identity(6, 6);
        assert!(expand_to_full_basis(&reduced, &present).is_err());
    }

    #[test]
    fn pseudo_inverse_applies_like_inverse() {
        let dense = DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 4.0]));
        let preconditioner =
            Preconditioner::PseudoInverse(dense.pseudo_inverse(1e-12).unwrap());
        let result = preconditioner.apply(&DVector::from_vec(vec![2.0, 4.0]));
        assert_relative_eq!(result[0], 1.0, epsilon = 1e-10);
        assert_relative_eq!(result[1], 1.0, epsilon = 1e-10);
    }
}
