use nalgebra_sparse::CooMatrix;
use rand::Rng;

use crate::beam::{Beam, BeamKey};
use crate::error::PerovskiteError;
use crate::gradient::GradientTable;
use crate::node::{tag_point, BoundaryTag, BoundingBox, NodeArena, NodeId, CANONICAL_TAG_ORDER};

/// One repeated unit of the lattice grid.
///
/// A cell instantiates one or more geometry templates (hybrid channels) into
/// concrete arena nodes and beams at its grid position, scaled by the
/// per-axis gradient factors, and later carries its boundary coupling
/// operator for the domain-decomposition assembly.
#[derive(Debug)]
pub struct Cell {
    /// Grid position (i, j, k).
    pub position: [usize; 3],
    /// World-space origin of the cell box.
    pub origin: [f64; 3],
    /// Physical size per axis, after the dimension gradient.
    pub size: [f64; 3],
    /// Resolved template id per geometry channel.
    pub geom_types: Vec<i32>,
    /// Scaled beam radius per geometry channel.
    pub radii: Vec<f64>,
    pub material: usize,
    pub beams: Vec<Beam>,
    pub index: Option<usize>,
    /// Indices of face-adjacent cells in the lattice's cell list.
    pub neighbours: Vec<usize>,
    /// Coupling operator B, built once boundary-condition setup is done.
    pub coupling: Option<CooMatrix<f64>>,
}

impl Cell {
    /// Instantiates the cell's geometry channels into the node arena.
    ///
    /// # Arguments
    /// * `position` - Grid position of the cell
    /// * `base_cell_size` - Unscaled cell dimensions
    /// * `origin` - World position of the cell box corner
    /// * `geom_types` - Resolved template id per channel
    /// * `base_radii` - Unscaled beam radius per channel
    /// * `grad_radius` / `grad_dim` - Per-axis gradient multiplier tables
    /// * `materials` - Material id table indexed `[z][y][x]`
    /// * `node_uncertainty` - Gaussian noise std-dev on node positions
    ///
    /// # Returns
    /// The instantiated cell, its beams referencing deduplicated arena nodes
    pub fn new<R: Rng>(
        position: [usize; 3],
        base_cell_size: [f64; 3],
        origin: [f64; 3],
        geom_types: &[i32],
        base_radii: &[f64],
        grad_radius: &GradientTable,
        grad_dim: &GradientTable,
        materials: &[Vec<Vec<usize>>],
        node_uncertainty: f64,
        arena: &mut NodeArena,
        rng: &mut R,
    ) -> Result<Cell, PerovskiteError> {
        if geom_types.len() != base_radii.len() {
            return Err(PerovskiteError::Input(format!(
                "Radius vector length {} does not match geometry channel count {}",
                base_radii.len(),
                geom_types.len()
            )));
        }

        let mut size = [0.0; 3];
        for axis in 0..3 {
            size[axis] = base_cell_size[axis] * grad_dim[position[axis]][axis];
        }

        let radius_factor = grad_radius[position[0]][0]
            * grad_radius[position[1]][1]
            * grad_radius[position[2]][2];
        let radii: Vec<f64> = base_radii.iter().map(|r| r * radius_factor).collect();
        let material = materials[position[2]][position[1]][position[0]];

        let mut cell = Cell {
            position,
            origin,
            size,
            geom_types: geom_types.to_vec(),
            radii,
            material,
            beams: Vec::new(),
            index: None,
            neighbours: Vec::new(),
            coupling: None,
        };

        for (channel, &template_id) in cell.geom_types.iter().enumerate() {
            let radius = cell.radii[channel];
            for (a, b) in crate::geometry::template_segments(template_id)? {
                let p1 = arena.insert_perturbed(
                    a[0] * size[0] + origin[0],
                    a[1] * size[1] + origin[1],
                    a[2] * size[2] + origin[2],
                    node_uncertainty,
                    rng,
                );
                let p2 = arena.insert_perturbed(
                    b[0] * size[0] + origin[0],
                    b[1] * size[1] + origin[1],
                    b[2] * size[2] + origin[2],
                    node_uncertainty,
                    rng,
                );
                cell.beams.push(Beam::new(p1, p2, radius, material, channel, arena));
            }
        }

        Ok(cell)
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_origin_size(self.origin, self.size)
    }

    pub fn center(&self) -> [f64; 3] {
        [
            self.origin[0] + self.size[0] / 2.0,
            self.origin[1] + self.size[1] / 2.0,
            self.origin[2] + self.size[2] / 2.0,
        ]
    }

    /// All distinct nodes referenced by the cell's beams, in order of first
    /// appearance.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut seen = std::collections::HashSet::new();
        let mut ids = Vec::new();
        for beam in &self.beams {
            for id in [beam.p1, beam.p2] {
                if seen.insert(id) {
                    ids.push(id);
                }
            }
        }
        ids
    }

    pub fn add_beam(&mut self, beam: Beam) {
        self.beams.push(beam);
    }

    /// Removes the first beam matching the given endpoint pair. A missing
    /// beam is logged and ignored; rewrite passes may retry removals.
    pub fn remove_beam(&mut self, key: BeamKey) {
        match self.beams.iter().position(|b| b.key() == key) {
            Some(pos) => {
                self.beams.remove(pos);
            }
            None => println!("warning: beam not found in cell, skipping removal"),
        }
    }

    /// The cell's boundary nodes ordered by canonical tag rank: corners
    /// first, then edges, then faces, each in fixed id order. At most one
    /// node is kept per tag slot (first encountered wins), so two
    /// structurally identical cells produce identically ordered layouts.
    pub fn canonical_boundary_nodes(&self, arena: &NodeArena) -> Vec<(BoundaryTag, NodeId)> {
        let bb = self.bounding_box();
        let mut slots: [Option<NodeId>; 26] = [None; 26];
        for id in self.node_ids() {
            if arena.get(id).boundary_index.is_none() {
                continue;
            }
            if let Some(tag) = tag_point(arena.get(id).position(), &bb) {
                let rank = tag.canonical_rank();
                if slots[rank].is_none() {
                    slots[rank] = Some(id);
                }
            }
        }
        CANONICAL_TAG_ORDER
            .iter()
            .enumerate()
            .filter_map(|(rank, tag)| slots[rank].map(|id| (*tag, id)))
            .collect()
    }

    /// Number of local boundary DOFs, fixed or not.
    pub fn boundary_dof_count(&self, arena: &NodeArena) -> usize {
        self.canonical_boundary_nodes(arena).len() * 6
    }

    /// Maps each local boundary DOF (canonical node order × 6) to its global
    /// free-DOF index, `None` for fixed DOFs.
    pub fn local_to_global_dof(&self, arena: &NodeArena) -> Vec<Option<usize>> {
        let ordered = self.canonical_boundary_nodes(arena);
        let mut map = Vec::with_capacity(ordered.len() * 6);
        for (_, id) in &ordered {
            let node = arena.get(*id);
            for dof in 0..6 {
                if node.fixed_dof[dof] {
                    map.push(None);
                } else {
                    map.push(node.global_free_dof[dof]);
                }
            }
        }
        map
    }

    /// Builds the sparse Boolean coupling operator B mapping the cell's
    /// local boundary DOFs into the lattice's global free-DOF space.
    ///
    /// # Arguments
    /// * `n_free_dof` - Total number of free DOFs in the lattice
    pub fn build_coupling_operator(
        &mut self,
        n_free_dof: usize,
        arena: &NodeArena,
    ) -> Result<(), PerovskiteError> {
        let local_map = self.local_to_global_dof(arena);
        let mut matrix = CooMatrix::new(n_free_dof, local_map.len());
        for (col, global) in local_map.iter().enumerate() {
            if let Some(row) = global {
                matrix.push(*row, col, 1.0);
            }
        }
        self.coupling = Some(matrix);
        Ok(())
    }

    /// Internal energy of the cell: the sum of ½·u·R over its boundary
    /// nodes.
    pub fn internal_energy(&self, arena: &NodeArena) -> f64 {
        self.node_ids()
            .into_iter()
            .filter(|id| arena.get(*id).boundary_index.is_some())
            .map(|id| arena.get(id).energy())
            .sum()
    }

    /// Total material volume of the cell's active beams.
    pub fn volume(&self) -> f64 {
        self.beams.iter().filter(|b| b.radius > 0.0).map(Beam::volume).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradient;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn build_cell(template: i32, arena: &mut NodeArena) -> Cell {
        let grad = gradient::constant_settings([1, 1, 1]);
        let materials = gradient::material_settings([1, 1, 1], gradient::MaterialRule::Uniform);
        let mut rng = StdRng::seed_from_u64(1);
        Cell::new(
            [0, 0, 0],
            [1.0, 1.0, 1.0],
            [0.0, 0.0, 0.0],
            &[template],
            &[0.1],
            &grad,
            &grad,
            &materials,
            0.0,
            arena,
            &mut rng,
        )
        .unwrap()
    }

    #[test]
    fn bcc_cell_shares_template_points() {
        let mut arena = NodeArena::new();
        let cell = build_cell(0, &mut arena);
        // BCC: 8 corners plus the body center, deduplicated in the arena.
        assert_eq!(cell.beams.len(), 8);
        assert_eq!(arena.len(), 9);
        assert_eq!(cell.node_ids().len(), 9);
    }

    #[test]
    fn mismatched_radius_vector_is_an_error() {
        let grad = gradient::constant_settings([1, 1, 1]);
        let materials = gradient::material_settings([1, 1, 1], gradient::MaterialRule::Uniform);
        let mut arena = NodeArena::new();
        let mut rng = StdRng::seed_from_u64(1);
        let result = Cell::new(
            [0, 0, 0],
            [1.0, 1.0, 1.0],
            [0.0, 0.0, 0.0],
            &[0, 5],
            &[0.1],
            &grad,
            &grad,
            &materials,
            0.0,
            &mut arena,
            &mut rng,
        );
        assert!(result.is_err());
    }

    #[test]
    fn hybrid_channels_keep_distinct_type_ids() {
        let grad = gradient::constant_settings([1, 1, 1]);
        let materials = gradient::material_settings([1, 1, 1], gradient::MaterialRule::Uniform);
        let mut arena = NodeArena::new();
        let mut rng = StdRng::seed_from_u64(1);
        let cell = Cell::new(
            [0, 0, 0],
            [1.0, 1.0, 1.0],
            [0.0, 0.0, 0.0],
            &[0, 5],
            &[0.1, 0.05],
            &grad,
            &grad,
            &materials,
            0.0,
            &mut arena,
            &mut rng,
        )
        .unwrap();
        assert!(cell.beams.iter().any(|b| b.type_id == 0 && b.radius == 0.1));
        assert!(cell.beams.iter().any(|b| b.type_id == 1 && b.radius == 0.05));
    }

    #[test]
    fn gradient_scales_cell_size_and_radius() {
        let grad_dim: GradientTable = vec![[2.0, 1.0, 1.0]];
        let grad_radius: GradientTable = vec![[3.0, 1.0, 1.0]];
        let materials = gradient::material_settings([1, 1, 1], gradient::MaterialRule::Uniform);
        let mut arena = NodeArena::new();
        let mut rng = StdRng::seed_from_u64(1);
        let cell = Cell::new(
            [0, 0, 0],
            [1.0, 1.0, 1.0],
            [0.0, 0.0, 0.0],
            &[5],
            &[0.1],
            &grad_radius,
            &grad_dim,
            &materials,
            0.0,
            &mut arena,
            &mut rng,
        )
        .unwrap();
        assert_eq!(cell.size, [2.0, 1.0, 1.0]);
        assert!((cell.radii[0] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn canonical_boundary_nodes_follow_tag_order() {
        let mut arena = NodeArena::new();
        let cell = build_cell(5, &mut arena); // Cubic: nodes at the 8 corners
        for id in cell.node_ids() {
            arena.get_mut(id).boundary_index = Some(0);
        }
        let ordered = cell.canonical_boundary_nodes(&arena);
        assert_eq!(ordered.len(), 8);
        let ranks: Vec<usize> = ordered.iter().map(|(t, _)| t.canonical_rank()).collect();
        assert!(ranks.windows(2).all(|w| w[0] < w[1]));
        assert!(ordered.iter().all(|(t, _)| t.is_corner()));
    }

    #[test]
    fn remove_missing_beam_is_a_noop() {
        let mut arena = NodeArena::new();
        let mut cell = build_cell(0, &mut arena);
        let n = cell.beams.len();
        cell.remove_beam(BeamKey::new(900, 901));
        assert_eq!(cell.beams.len(), n);
        let key = cell.beams[0].key();
        cell.remove_beam(key);
        assert_eq!(cell.beams.len(), n - 1);
    }
}
