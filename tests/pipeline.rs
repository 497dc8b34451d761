//! End-to-end tests of the assembly pipeline: construction, deduplication,
//! boundary conditions, penalization rewriting and preconditioner assembly.

use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector};

use perovskite::assembly::{self, Preconditioner, SchurTable};
use perovskite::gradient::{GradientProperty, GradientRule};
use perovskite::lattice::{Lattice, LatticeParams, Surface};

const BCC: i32 = 0;
const CUBIC: i32 = 5;

#[test]
fn bcc_grid_dedups_shared_corners_and_applies_boundary_conditions() {
    // 2x2x2 grid of unit BCC cells: 27 grid-corner nodes shared across
    // cells plus 8 cell centers.
    let mut lattice = Lattice::simple([1.0, 1.0, 1.0], [2, 2, 2], BCC, 0.1).unwrap();
    assert_eq!(lattice.node_count(), 35);

    let corner_nodes = lattice
        .node_positions()
        .into_iter()
        .filter(|(_, p)| p.iter().all(|c| *c == 0.0 || *c == 1.0 || *c == 2.0))
        .count();
    assert_eq!(corner_nodes, 27);

    lattice
        .apply_displacement_on_surfaces(&[Surface::Xmin], &[-1.0], &[0])
        .unwrap();

    let bb = lattice.extents();
    for id in lattice.used_node_ids() {
        let node = lattice.arena.get(id);
        if node.x == bb.x_min {
            assert_eq!(node.displacement[0], -1.0);
            assert!(node.fixed_dof[0]);
        } else {
            assert_eq!(node.displacement[0], 0.0);
            assert!(!node.fixed_dof[0]);
        }
        // Other DOFs stay free everywhere.
        assert!(!node.fixed_dof[1]);
    }
}

#[test]
fn shared_nodes_get_one_boundary_index_across_cells() {
    let lattice = Lattice::simple([1.0, 1.0, 1.0], [2, 2, 1], CUBIC, 0.1).unwrap();
    // Every cubic node sits on its cell's corners, so all are boundary
    // nodes; shared corners must carry a single boundary index.
    assert_eq!(lattice.boundary_node_count(), lattice.node_count());

    let mut by_boundary_index = std::collections::HashMap::new();
    for id in lattice.used_node_ids() {
        let node = lattice.arena.get(id);
        let boundary_index = node.boundary_index.unwrap();
        assert!(by_boundary_index.insert(boundary_index, id).is_none());
    }
}

#[test]
fn dimension_gradient_keeps_cells_conforming() {
    let mut params = LatticeParams::simple([1.0, 1.0, 1.0], [2, 1, 1], CUBIC, 0.1);
    params.grad_dim = Some(GradientProperty {
        rule: GradientRule::Linear,
        direction: [true, false, false],
        parameters: [0.5, 0.0, 0.0],
    });
    let lattice = Lattice::build(params).unwrap();
    // The shared plane between the two cells must deduplicate exactly.
    assert_eq!(lattice.node_count(), 12);
    assert!(lattice.cells[1].size[0] > lattice.cells[0].size[0]);
}

#[test]
fn penalization_preserves_length_and_collinearity() {
    let plain = Lattice::simple([1.0, 1.0, 1.0], [1, 1, 1], BCC, 0.05).unwrap();
    let original_length = (3.0f64).sqrt() / 2.0;
    assert_eq!(plain.cells[0].beams.len(), 8);

    let mut params = LatticeParams::simple([1.0, 1.0, 1.0], [1, 1, 1], BCC, 0.05);
    params.penalize_joints = true;
    let mut lattice = Lattice::build(params).unwrap();
    let beams = &lattice.cells[0].beams;
    assert_eq!(beams.len(), 24);

    for triple in beams.chunks(3) {
        let [b1, b2, b3] = triple else { panic!("beams not in triples") };
        // End segments are flagged and stiffened, the center keeps the
        // original radius.
        assert!(b1.modified && b3.modified && !b2.modified);
        assert_relative_eq!(b2.radius, 0.05);
        assert!(b1.radius > b2.radius);

        // Total length is preserved and the chain is connected.
        assert_relative_eq!(
            b1.length + b2.length + b3.length,
            original_length,
            epsilon = 1e-9
        );
        assert_eq!(b1.p2, b2.p1);
        assert_eq!(b2.p2, b3.p1);

        // The two intermediate nodes lie on the original line.
        let a = lattice.arena.get(b1.p1).position();
        let b = lattice.arena.get(b3.p2).position();
        for mid in [lattice.arena.get(b1.p2), lattice.arena.get(b2.p2)] {
            let m = mid.position();
            let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
            let v = [m[0] - a[0], m[1] - a[1], m[2] - a[2]];
            let cross = [
                u[1] * v[2] - u[2] * v[1],
                u[2] * v[0] - u[0] * v[2],
                u[0] * v[1] - u[1] * v[0],
            ];
            for component in cross {
                assert_relative_eq!(component, 0.0, epsilon = 1e-12);
            }
        }
    }

    // New intermediate nodes were indexed by the re-run of the global pass.
    for id in lattice.used_node_ids() {
        assert!(lattice.arena.get(id).index.is_some());
    }

    // The rewrite refuses to run twice.
    let before = lattice.cells[0].beams.len();
    lattice.rewrite_penalized_beams();
    assert_eq!(lattice.cells[0].beams.len(), before);
}

#[test]
fn periodic_penalized_lattice_builds() {
    let mut params = LatticeParams::simple([1.0, 1.0, 1.0], [2, 2, 2], BCC, 0.05);
    params.periodic = true;
    params.penalize_joints = true;
    let lattice = Lattice::build(params).unwrap();
    assert_eq!(lattice.cells[0].beams.len(), 24);
}

#[test]
fn assembled_preconditioner_is_symmetric_and_solvable() {
    let mut lattice = Lattice::simple([1.0, 1.0, 1.0], [2, 2, 2], CUBIC, 0.1).unwrap();
    lattice
        .apply_displacement_on_surfaces(&[Surface::Zmin], &[0.0, 0.0, 0.0], &[0, 1, 2])
        .unwrap();
    let n_free = lattice.assign_free_dof_indices();
    assert_eq!(n_free, 27 * 6 - 9 * 3);

    // Symmetric reference stiffness for every cell: 8 corner nodes x 6 DOF.
    let mut table = SchurTable::new();
    table
        .insert(vec![0.1], DMatrix::identity(48, 48))
        .unwrap();

    let matrix = assembly::assemble_global_matrix(&mut lattice, &table).unwrap();
    assert_eq!(matrix.nrows(), n_free);

    let mut dense = DMatrix::zeros(n_free, n_free);
    for (row, col, value) in matrix.triplet_iter() {
        dense[(row, col)] += *value;
    }
    let transposed = dense.transpose();
    for i in 0..n_free {
        for j in 0..n_free {
            assert_relative_eq!(dense[(i, j)], transposed[(i, j)], epsilon = 1e-12);
        }
    }

    // With identity reference matrices the assembly is diagonal with the
    // cell multiplicity of each DOF, so the factorized solve inverts it.
    let preconditioner = assembly::factorize_preconditioner(&matrix).unwrap();
    assert!(matches!(preconditioner, Preconditioner::Factorized(_)));
    let rhs = DVector::from_element(n_free, 1.0);
    let solution = preconditioner.apply(&rhs);
    let recovered = &dense * &solution;
    for i in 0..n_free {
        assert_relative_eq!(recovered[i], 1.0, epsilon = 1e-9);
    }
}

#[test]
fn ill_conditioned_assembly_falls_back_to_pseudo_inverse() {
    let mut lattice = Lattice::simple([1.0, 1.0, 1.0], [1, 1, 1], CUBIC, 0.1).unwrap();
    lattice.assign_free_dof_indices();

    // A rank-deficient reference matrix drives the condition number past
    // the factorization limit.
    let mut rank_deficient = DMatrix::zeros(48, 48);
    rank_deficient[(0, 0)] = 1.0;
    let mut table = SchurTable::new();
    table.insert(vec![0.1], rank_deficient).unwrap();

    let preconditioner = assembly::build_preconditioner(&mut lattice, &table).unwrap();
    assert!(matches!(preconditioner, Preconditioner::PseudoInverse(_)));
}

#[test]
fn random_template_cell_is_structurally_valid() {
    for seed in 0..8 {
        let mut params = LatticeParams::simple([1.0, 1.0, 1.0], [1, 1, 1], -1, 0.1);
        params.seed = seed;
        let lattice = Lattice::build(params).unwrap();
        // Every arena node is referenced by some beam after construction.
        assert_eq!(lattice.used_node_ids().len(), lattice.arena.len());
        assert!(lattice.beam_count() > 0);
    }
}

#[test]
fn reaction_forces_accumulate_and_energy_follows() {
    let mut lattice = Lattice::simple([1.0, 1.0, 1.0], [1, 1, 1], CUBIC, 0.1).unwrap();
    lattice
        .apply_displacement_on_surfaces(&[Surface::Xmin], &[2.0], &[0])
        .unwrap();
    lattice.assign_free_dof_indices();

    // Push a reaction onto one Xmin corner through its boundary index.
    let target = lattice.nodes_on_surfaces(&[Surface::Xmin, Surface::Ymin, Surface::Zmin]).unwrap()[0];
    let boundary_index = lattice.arena.get(target).boundary_index.unwrap();
    lattice
        .add_reaction_forces(&[boundary_index], &[[3.0, 0.0, 0.0, 0.0, 0.0, 0.0]])
        .unwrap();
    lattice
        .add_reaction_forces(&[boundary_index], &[[1.0, 0.0, 0.0, 0.0, 0.0, 0.0]])
        .unwrap();

    let reactions = lattice.global_reaction_forces(false);
    assert_relative_eq!(reactions[&boundary_index][0], 4.0);

    // ½ · u · R on the loaded node only.
    assert_relative_eq!(lattice.internal_energy(), 0.5 * 2.0 * 4.0);

    // Applied forces override reported reactions when requested.
    lattice
        .apply_force_on_surfaces(&[Surface::Xmax], &[7.0], &[1])
        .unwrap();
    let with_applied = lattice.global_reaction_forces(true);
    let xmax_node = lattice.nodes_on_surfaces(&[Surface::Xmax, Surface::Ymin, Surface::Zmin]).unwrap()[0];
    let xmax_index = lattice.arena.get(xmax_node).boundary_index.unwrap();
    assert_relative_eq!(with_applied[&xmax_index][1], 7.0);

    lattice.reset_reaction_forces();
    assert_relative_eq!(lattice.internal_energy(), 0.0);
}

#[test]
fn free_displacement_roundtrip() {
    let mut lattice = Lattice::simple([1.0, 1.0, 1.0], [1, 1, 1], CUBIC, 0.1).unwrap();
    lattice
        .apply_displacement_on_surfaces(&[Surface::Zmin], &[0.0, 0.0, 0.0], &[0, 1, 2])
        .unwrap();
    let n_free = lattice.assign_free_dof_indices();

    let values: Vec<f64> = (0..n_free).map(|i| i as f64 * 0.25).collect();
    lattice.set_free_displacements(&values).unwrap();

    // Free DOFs are read back in the same stable traversal order the
    // indices were assigned in.
    let (readback, indices) = lattice.displacement_vector(false);
    assert_eq!(readback, values);
    assert_eq!(indices.len(), n_free);

    // Wrong-size vectors are rejected.
    assert!(lattice.set_free_displacements(&values[..n_free - 1]).is_err());
}
