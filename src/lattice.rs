use std::collections::{BTreeMap, HashMap, HashSet};

use indicatif::ProgressBar;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::beam::{penalization_length, Beam, BeamEnd, BeamKey, LONE_ENDPOINT_ANGLE_DEG};
use crate::cell::Cell;
use crate::error::PerovskiteError;
use crate::geometry;
use crate::gradient::{
    constant_settings, gradient_settings, material_settings, GradientProperty, MaterialRule,
};
use crate::node::{tag_point, BoundingBox, NodeArena, NodeId};

/// Radius multiplier applied to the stiffened end segments introduced by the
/// joint-penalization rewrite.
pub const PENALIZATION_COEFFICIENT: f64 = 1.5;

/// Condition-number threshold above which the assembled preconditioner is
/// pseudo-inverted instead of factorized.
pub const CONDITION_NUMBER_LIMIT: f64 = 1e15;

/// Axis-aligned box excluded from the cell grid.
#[derive(Debug, Clone, Copy)]
pub struct ErasedRegion {
    pub start: [f64; 3],
    pub size: [f64; 3],
}

impl ErasedRegion {
    fn contains_origin(&self, origin: [f64; 3]) -> bool {
        (0..3).all(|axis| {
            self.start[axis] <= origin[axis]
                && origin[axis] <= self.start[axis] + self.size[axis]
        })
    }
}

/// Named boundary plane of the lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Xmin,
    Xmax,
    Ymin,
    Ymax,
    Zmin,
    Zmax,
    Xmid,
    Ymid,
    Zmid,
}

impl Surface {
    pub fn from_name(name: &str) -> Result<Surface, PerovskiteError> {
        match name {
            "Xmin" => Ok(Surface::Xmin),
            "Xmax" => Ok(Surface::Xmax),
            "Ymin" => Ok(Surface::Ymin),
            "Ymax" => Ok(Surface::Ymax),
            "Zmin" => Ok(Surface::Zmin),
            "Zmax" => Ok(Surface::Zmax),
            "Xmid" => Ok(Surface::Xmid),
            "Ymid" => Ok(Surface::Ymid),
            "Zmid" => Ok(Surface::Zmid),
            _ => Err(PerovskiteError::Input(format!(
                "Invalid surface name '{}'",
                name
            ))),
        }
    }

    fn axis_value(&self, bb: &BoundingBox) -> (usize, f64) {
        match self {
            Surface::Xmin => (0, bb.x_min),
            Surface::Xmax => (0, bb.x_max),
            Surface::Ymin => (1, bb.y_min),
            Surface::Ymax => (1, bb.y_max),
            Surface::Zmin => (2, bb.z_min),
            Surface::Zmax => (2, bb.z_max),
            Surface::Xmid => (0, 0.5 * (bb.x_min + bb.x_max)),
            Surface::Ymid => (1, 0.5 * (bb.y_min + bb.y_max)),
            Surface::Zmid => (2, 0.5 * (bb.z_min + bb.z_max)),
        }
    }
}

/// Kind of constraint applied to a node's DOFs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConstraintKind {
    Displacement,
    Force,
}

/// Construction parameters for a lattice.
pub struct LatticeParams {
    pub cell_size: [f64; 3],
    pub num_cells: [usize; 3],
    /// Template id per geometry channel; `-1` draws a random template per
    /// cell.
    pub geom_types: Vec<i32>,
    /// Base beam radius per geometry channel.
    pub radii: Vec<f64>,
    pub grad_radius: Option<GradientProperty>,
    pub grad_dim: Option<GradientProperty>,
    pub material_rule: MaterialRule,
    /// Enables the joint-penalization rewrite after construction.
    pub penalize_joints: bool,
    /// Standard deviation of the Gaussian noise on node positions.
    pub node_uncertainty: f64,
    pub periodic: bool,
    pub erased_regions: Vec<ErasedRegion>,
    /// Optional point-containment predicate; cells with no box corner
    /// inside the mesh are culled.
    pub inside_mesh: Option<Box<dyn Fn([f64; 3]) -> bool>>,
    /// Seed for the random draws (templates, node noise).
    pub seed: u64,
}

impl LatticeParams {
    /// Parameters for a plain uniform lattice of one geometry.
    pub fn simple(
        cell_size: [f64; 3],
        num_cells: [usize; 3],
        geom_type: i32,
        radius: f64,
    ) -> LatticeParams {
        LatticeParams {
            cell_size,
            num_cells,
            geom_types: vec![geom_type],
            radii: vec![radius],
            grad_radius: None,
            grad_dim: None,
            material_rule: MaterialRule::Uniform,
            penalize_joints: false,
            node_uncertainty: 0.0,
            periodic: false,
            erased_regions: Vec::new(),
            inside_mesh: None,
            seed: 0,
        }
    }
}

/// Two-phase index assignment for nodes and beams.
///
/// The first phase collects indices that already exist so a re-run never
/// reassigns them; the second hands out fresh sequential indices to anything
/// still unindexed, deduplicating beams by unordered endpoint pair. Nodes
/// deduplicate through the arena itself.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    next_node: usize,
    next_beam: usize,
    beams: HashMap<BeamKey, usize>,
}

impl IndexBuilder {
    pub fn new() -> IndexBuilder {
        IndexBuilder::default()
    }

    /// Phase one: record every pre-existing node and beam index.
    pub fn collect_existing(&mut self, cells: &[Cell], arena: &NodeArena) {
        for (_, node) in arena.iter() {
            if let Some(index) = node.index {
                self.next_node = self.next_node.max(index + 1);
            }
        }
        for cell in cells {
            for beam in &cell.beams {
                if let Some(index) = beam.index {
                    self.beams.insert(beam.key(), index);
                    self.next_beam = self.next_beam.max(index + 1);
                }
            }
        }
    }

    /// Phase two: assign fresh indices in cell-traversal order.
    pub fn assign_fresh(&mut self, cells: &mut [Cell], arena: &mut NodeArena) {
        for cell in cells {
            for beam in &mut cell.beams {
                if beam.index.is_none() {
                    let key = beam.key();
                    let index = *self.beams.entry(key).or_insert_with(|| {
                        let index = self.next_beam;
                        self.next_beam += 1;
                        index
                    });
                    beam.index = Some(index);
                }
                for id in [beam.p1, beam.p2] {
                    let node = arena.get_mut(id);
                    if node.index.is_none() {
                        node.index = Some(self.next_node);
                        self.next_node += 1;
                    }
                }
            }
        }
    }
}

/// Lightweight beam snapshot used during angle computation, when the cell
/// list cannot be borrowed mutably.
#[derive(Debug, Clone, Copy)]
struct BeamRef {
    key: BeamKey,
    p1: NodeId,
    p2: NodeId,
    radius: f64,
}

/// The lattice: a 3D grid of cells sharing nodes through a common arena,
/// with global indexing, boundary classification, neighbor topology and the
/// bookkeeping needed by a domain-decomposition solver.
pub struct Lattice {
    pub cell_size: [f64; 3],
    pub num_cells: [usize; 3],
    pub geom_types: Vec<i32>,
    pub radii: Vec<f64>,
    pub periodic: bool,
    pub arena: NodeArena,
    pub cells: Vec<Cell>,
    erased_regions: Vec<ErasedRegion>,
    extents: BoundingBox,
    occupancy: HashMap<[usize; 3], usize>,
    /// Occupied (min, max) grid index per axis and row, for periodic wrap.
    row_extents: HashMap<(usize, [usize; 2]), (usize, usize)>,
    penalized: bool,
    boundary_node_count: usize,
    free_dof: Option<usize>,
}

impl Lattice {
    /// Builds the full lattice: cells, deduplicated indices, boundary tags,
    /// neighbor topology, optional joint penalization, and the compact
    /// boundary-node enumeration.
    pub fn build(params: LatticeParams) -> Result<Lattice, PerovskiteError> {
        validate_params(&params)?;

        let grad_radius = match params.grad_radius {
            Some(property) => gradient_settings(params.num_cells, &property),
            None => constant_settings(params.num_cells),
        };
        let grad_dim = match params.grad_dim {
            Some(property) => gradient_settings(params.num_cells, &property),
            None => constant_settings(params.num_cells),
        };
        let materials = material_settings(params.num_cells, params.material_rule);

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut arena = NodeArena::new();
        let mut cells: Vec<Cell> = Vec::new();

        let [nx, ny, nz] = params.num_cells;
        let bar = ProgressBar::new((nx * ny * nz) as u64);
        let mut x_start = 0.0;
        for i in 0..nx {
            if i != 0 {
                x_start += params.cell_size[0] * grad_dim[i - 1][0];
            }
            let mut y_start = 0.0;
            for j in 0..ny {
                if j != 0 {
                    y_start += params.cell_size[1] * grad_dim[j - 1][1];
                }
                let mut z_start = 0.0;
                for k in 0..nz {
                    if k != 0 {
                        z_start += params.cell_size[2] * grad_dim[k - 1][2];
                    }
                    bar.inc(1);
                    let origin = [x_start, y_start, z_start];
                    if params
                        .erased_regions
                        .iter()
                        .any(|region| region.contains_origin(origin))
                    {
                        continue;
                    }

                    let mut resolved = Vec::with_capacity(params.geom_types.len());
                    for &id in &params.geom_types {
                        resolved.push(geometry::resolve_template_id(id, &mut rng)?);
                    }

                    let cell = Cell::new(
                        [i, j, k],
                        params.cell_size,
                        origin,
                        &resolved,
                        &params.radii,
                        &grad_radius,
                        &grad_dim,
                        &materials,
                        params.node_uncertainty,
                        &mut arena,
                        &mut rng,
                    )?;

                    if let Some(inside) = &params.inside_mesh {
                        let bb = cell.bounding_box();
                        let corners = box_corners(&bb);
                        if !corners.iter().any(|corner| inside(*corner)) {
                            continue;
                        }
                    }
                    cells.push(cell);
                }
            }
        }
        bar.finish_and_clear();

        if cells.is_empty() {
            return Err(PerovskiteError::Topology(
                "No cells in the lattice".to_owned(),
            ));
        }

        let extents = compute_extents(&cells, &arena)?;

        let mut lattice = Lattice {
            cell_size: params.cell_size,
            num_cells: params.num_cells,
            geom_types: params.geom_types,
            radii: params.radii,
            periodic: params.periodic,
            arena,
            cells,
            erased_regions: params.erased_regions,
            extents,
            occupancy: HashMap::new(),
            row_extents: HashMap::new(),
            penalized: false,
            boundary_node_count: 0,
            free_dof: None,
        };

        if lattice.geom_types.len() > 1 {
            lattice.check_hybrid_collision();
        }

        lattice.define_node_beam_index();
        lattice.define_cell_index();
        lattice.build_occupancy();
        lattice.define_cell_neighbours();
        lattice.set_local_tags();
        lattice.apply_tags();

        if params.penalize_joints {
            lattice.compute_joint_angles();
            lattice.rewrite_penalized_beams();
        }

        lattice.define_boundary_indices();

        Ok(lattice)
    }

    /// Convenience constructor for a uniform single-geometry lattice.
    pub fn simple(
        cell_size: [f64; 3],
        num_cells: [usize; 3],
        geom_type: i32,
        radius: f64,
    ) -> Result<Lattice, PerovskiteError> {
        Lattice::build(LatticeParams::simple(cell_size, num_cells, geom_type, radius))
    }

    pub fn extents(&self) -> BoundingBox {
        self.extents
    }

    /// Recomputes the lattice extents from the current node positions.
    pub fn update_extents(&mut self) -> Result<(), PerovskiteError> {
        self.extents = compute_extents(&self.cells, &self.arena)?;
        Ok(())
    }

    /// Number of distinct boundary nodes (compact boundary enumeration).
    pub fn boundary_node_count(&self) -> usize {
        self.boundary_node_count
    }

    /// Total free DOF count, available once
    /// [`Lattice::assign_free_dof_indices`] has run.
    pub fn free_dof(&self) -> Option<usize> {
        self.free_dof
    }

    // ------------------------------------------------------------------
    // Indexing
    // ------------------------------------------------------------------

    /// Assigns global indices to every distinct node and beam. Idempotent:
    /// indices that already exist survive, new entities get fresh ones.
    pub fn define_node_beam_index(&mut self) {
        let mut builder = IndexBuilder::new();
        builder.collect_existing(&self.cells, &self.arena);
        builder.assign_fresh(&mut self.cells, &mut self.arena);
    }

    fn define_cell_index(&mut self) {
        for (index, cell) in self.cells.iter_mut().enumerate() {
            if cell.index.is_none() {
                cell.index = Some(index);
            }
        }
    }

    // ------------------------------------------------------------------
    // Occupancy and neighbors
    // ------------------------------------------------------------------

    fn build_occupancy(&mut self) {
        self.occupancy.clear();
        self.row_extents.clear();
        for (index, cell) in self.cells.iter().enumerate() {
            self.occupancy.insert(cell.position, index);
            for axis in 0..3 {
                let row = row_key(cell.position, axis);
                let along = cell.position[axis];
                let entry = self
                    .row_extents
                    .entry((axis, row))
                    .or_insert((along, along));
                entry.0 = entry.0.min(along);
                entry.1 = entry.1.max(along);
            }
        }
    }

    /// Computes the up-to-6 face-adjacent neighbors of every cell. With
    /// periodicity enabled, stepping past the occupied extreme of a row
    /// wraps to its opposite extreme; a hole or fully erased row simply
    /// yields no neighbor.
    pub fn define_cell_neighbours(&mut self) {
        let mut neighbour_lists: Vec<Vec<usize>> = Vec::with_capacity(self.cells.len());
        for cell in &self.cells {
            let mut neighbours = Vec::new();
            for axis in 0..3 {
                for step in [-1i64, 1i64] {
                    let mut target = cell.position;
                    let raw = cell.position[axis] as i64 + step;
                    if self.periodic {
                        let row = row_key(cell.position, axis);
                        let (row_min, row_max) = match self.row_extents.get(&(axis, row)) {
                            Some(extents) => *extents,
                            None => continue,
                        };
                        if raw < row_min as i64 {
                            target[axis] = row_max;
                        } else if raw > row_max as i64 {
                            target[axis] = row_min;
                        } else {
                            target[axis] = raw as usize;
                        }
                    } else {
                        if raw < 0 || raw >= self.num_cells[axis] as i64 {
                            continue;
                        }
                        target[axis] = raw as usize;
                    }
                    if let Some(&index) = self.occupancy.get(&target) {
                        neighbours.push(index);
                    }
                }
            }
            neighbours.dedup();
            neighbour_lists.push(neighbours);
        }
        for (cell, neighbours) in self.cells.iter_mut().zip(neighbour_lists) {
            cell.neighbours = neighbours;
        }
    }

    // ------------------------------------------------------------------
    // Tagging
    // ------------------------------------------------------------------

    /// Records each node's first-touch local tag (against the box of the
    /// first cell that references it).
    fn set_local_tags(&mut self) {
        for cell in &self.cells {
            let bb = cell.bounding_box();
            for beam in &cell.beams {
                for id in [beam.p1, beam.p2] {
                    let node = self.arena.get_mut(id);
                    if node.local_tag.is_none() {
                        node.local_tag = tag_point(node.position(), &bb);
                    }
                }
            }
        }
    }

    /// Tags every node against the lattice box, or against a cell-relative
    /// box when erased regions make the global extents meaningless locally.
    pub fn apply_tags(&mut self) {
        let use_local_box = !self.erased_regions.is_empty();
        let global_box = self.extents;
        for ci in 0..self.cells.len() {
            let bb = if use_local_box {
                self.relative_boundary_box(ci)
            } else {
                global_box
            };
            let ids = self.cells[ci].node_ids();
            for id in ids {
                let node = self.arena.get_mut(id);
                node.tag = tag_point(node.position(), &bb);
            }
        }
    }

    /// Bounding box of the occupied grid slabs the cell belongs to: per
    /// axis, the extent of every cell sharing this cell's index on that
    /// axis. Used instead of the global box when erased regions exist.
    fn relative_boundary_box(&self, cell_index: usize) -> BoundingBox {
        let position = self.cells[cell_index].position;
        let mut bounds = [[f64::INFINITY, f64::NEG_INFINITY]; 3];
        for cell in &self.cells {
            for axis in 0..3 {
                if cell.position[axis] != position[axis] {
                    continue;
                }
                let bb = cell.bounding_box();
                let (lo, hi) = match axis {
                    0 => (bb.x_min, bb.x_max),
                    1 => (bb.y_min, bb.y_max),
                    _ => (bb.z_min, bb.z_max),
                };
                bounds[axis][0] = bounds[axis][0].min(lo);
                bounds[axis][1] = bounds[axis][1].max(hi);
            }
        }
        BoundingBox {
            x_min: bounds[0][0],
            x_max: bounds[0][1],
            y_min: bounds[1][0],
            y_max: bounds[1][1],
            z_min: bounds[2][0],
            z_max: bounds[2][1],
        }
    }

    /// Assigns the compact boundary index to every node lying on some
    /// cell's box, in cell-traversal order, and backfills first-touch local
    /// tags for nodes introduced after construction.
    pub fn define_boundary_indices(&mut self) {
        let mut counter = 0;
        for ci in 0..self.cells.len() {
            let bb = self.cells[ci].bounding_box();
            let ids: Vec<NodeId> = self.cells[ci]
                .beams
                .iter()
                .flat_map(|b| [b.p1, b.p2])
                .collect();
            for id in ids {
                let node = self.arena.get_mut(id);
                let tag = tag_point(node.position(), &bb);
                if tag.is_some() {
                    if node.local_tag.is_none() {
                        node.local_tag = tag;
                    }
                    if node.boundary_index.is_none() {
                        node.boundary_index = Some(counter);
                        counter += 1;
                    }
                }
            }
        }
        self.boundary_node_count = counter;
    }

    // ------------------------------------------------------------------
    // Angles and penalization
    // ------------------------------------------------------------------

    /// Computes, for every beam and endpoint, the (radius, angle) of the
    /// co-incident connection producing the largest penalization zone, and
    /// stores it on the beam.
    pub fn compute_joint_angles(&mut self) {
        let mut results: Vec<(usize, usize, (f64, f64), (f64, f64))> = Vec::new();

        for (ci, cell) in self.cells.iter().enumerate() {
            let refs = self.collect_reachable_beams(ci);
            for (bi, beam) in cell.beams.iter().enumerate() {
                let angle1 = self.endpoint_angle(beam, beam.p1, &refs);
                let angle2 = self.endpoint_angle(beam, beam.p2, &refs);
                results.push((ci, bi, angle1, angle2));
            }
        }

        for (ci, bi, angle1, angle2) in results {
            self.cells[ci].beams[bi].set_angles(angle1, angle2);
        }
    }

    /// Beams of the cell and its neighbors, deduplicated by endpoint pair.
    fn collect_reachable_beams(&self, cell_index: usize) -> Vec<BeamRef> {
        let mut seen = HashSet::new();
        let mut refs = Vec::new();
        let mut cell_list = self.cells[cell_index].neighbours.clone();
        cell_list.push(cell_index);
        for ci in cell_list {
            for beam in &self.cells[ci].beams {
                if seen.insert(beam.key()) {
                    refs.push(BeamRef {
                        key: beam.key(),
                        p1: beam.p1,
                        p2: beam.p2,
                        radius: beam.radius,
                    });
                }
            }
        }
        refs
    }

    /// Selects the governing (radius, angle) pair at one endpoint of a
    /// beam: the connection maximizing the penalization length.
    fn endpoint_angle(&self, beam: &Beam, shared: NodeId, refs: &[BeamRef]) -> (f64, f64) {
        let mut candidates: Vec<(f64, f64)> = Vec::new();
        for other in refs {
            if other.key == beam.key() {
                continue;
            }
            let matched = if other.p1 == shared || other.p2 == shared {
                Some(if other.p1 == shared { other.p1 } else { other.p2 })
            } else if self.periodic {
                self.periodic_match(shared, other)
            } else {
                None
            };
            let Some(matched) = matched else { continue };
            let Some(angle) = self.angle_between(beam, shared, other, matched) else {
                continue;
            };
            // Self-parallel and near-zero angles carry no joint.
            if angle < 0.01 {
                continue;
            }
            candidates.push((other.radius, angle));
        }

        if candidates.is_empty() {
            return (beam.radius, LONE_ENDPOINT_ANGLE_DEG);
        }

        let mut best = candidates[0];
        let mut best_length = penalization_length(best.0, best.1);
        for (radius, angle) in candidates.into_iter().skip(1) {
            let length = penalization_length(radius, angle);
            if length > best_length {
                best_length = length;
                best = (radius, angle);
            }
        }
        best
    }

    /// Finds the endpoint of `other` that is periodically equivalent to the
    /// shared node: both global and first-touch local tags must fall in the
    /// same periodic category.
    fn periodic_match(&self, shared: NodeId, other: &BeamRef) -> Option<NodeId> {
        let node = self.arena.get(shared);
        let group = node.tag?.periodic_group();
        if node.local_tag?.periodic_group() != group {
            return None;
        }
        for candidate in [other.p1, other.p2] {
            let candidate_node = self.arena.get(candidate);
            let global_matches = candidate_node
                .tag
                .map_or(false, |tag| tag.periodic_group() == group);
            let local_matches = candidate_node
                .local_tag
                .map_or(false, |tag| tag.periodic_group() == group);
            if global_matches && local_matches {
                return Some(candidate);
            }
        }
        None
    }

    /// Angle in degrees between two beams joined at (possibly periodically
    /// equivalent) endpoints. Zero-length direction vectors return `None`.
    fn angle_between(
        &self,
        beam: &Beam,
        shared: NodeId,
        other: &BeamRef,
        matched: NodeId,
    ) -> Option<f64> {
        let u = self.direction_from(beam.p1, beam.p2, shared)?;
        let v = self.direction_from(other.p1, other.p2, matched)?;
        let dot = u[0] * v[0] + u[1] * v[1] + u[2] * v[2];
        let cos_theta = dot.clamp(-1.0, 1.0);
        Some(cos_theta.acos().to_degrees())
    }

    /// Unit vector from `origin` towards the opposite endpoint.
    fn direction_from(&self, p1: NodeId, p2: NodeId, origin: NodeId) -> Option<[f64; 3]> {
        let (from, to) = if origin == p1 { (p1, p2) } else { (p2, p1) };
        let a = self.arena.get(from).position();
        let b = self.arena.get(to).position();
        let d = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
        let norm = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
        if norm == 0.0 {
            return None;
        }
        Some([d[0] / norm, d[1] / norm, d[2] / norm])
    }

    /// Rewrites every beam into three collinear sub-beams: two stiffened
    /// end segments sized by the per-endpoint penalization lengths and one
    /// central segment keeping the original properties. Endpoints and total
    /// length are preserved. Runs at most once; re-runs global indexing
    /// because new nodes and beams appear.
    pub fn rewrite_penalized_beams(&mut self) {
        if self.penalized {
            println!("warning: penalization rewrite already applied, skipping");
            return;
        }

        for ci in 0..self.cells.len() {
            let originals = std::mem::take(&mut self.cells[ci].beams);
            for beam in originals {
                let (mut l1, mut l2) = beam.penalization_lengths();
                if l1 + l2 >= beam.length {
                    // Zones longer than the beam collapse to negligible stubs.
                    l1 = 1e-7;
                    l2 = 1e-7;
                }
                let e1 = beam.point_at_distance(l1, BeamEnd::First, &self.arena);
                let e2 = beam.point_at_distance(l2, BeamEnd::Second, &self.arena);
                let m1 = self.arena.insert(e1[0], e1[1], e1[2]);
                let m2 = self.arena.insert(e2[0], e2[1], e2[2]);

                let mut b1 = Beam::new(
                    beam.p1,
                    m1,
                    beam.radius * PENALIZATION_COEFFICIENT,
                    beam.material,
                    beam.type_id,
                    &self.arena,
                );
                b1.modified = true;
                let b2 = Beam::new(m1, m2, beam.radius, beam.material, beam.type_id, &self.arena);
                let mut b3 = Beam::new(
                    m2,
                    beam.p2,
                    beam.radius * PENALIZATION_COEFFICIENT,
                    beam.material,
                    beam.type_id,
                    &self.arena,
                );
                b3.modified = true;

                self.cells[ci].beams.push(b1);
                self.cells[ci].beams.push(b2);
                self.cells[ci].beams.push(b3);
            }
        }

        self.penalized = true;
        self.define_node_beam_index();
    }

    // ------------------------------------------------------------------
    // Structure editing
    // ------------------------------------------------------------------

    /// Splits hybrid beams crossed by a coincident node of the same cell.
    /// Repeats until no beam contains a foreign node on its interior.
    pub fn check_hybrid_collision(&mut self) {
        for ci in 0..self.cells.len() {
            loop {
                let node_ids = self.cells[ci].node_ids();
                let mut split: Option<(usize, NodeId)> = None;
                'outer: for (bi, beam) in self.cells[ci].beams.iter().enumerate() {
                    for &id in &node_ids {
                        let position = self.arena.get(id).position();
                        if beam.is_point_on_beam(position, &self.arena) {
                            split = Some((bi, id));
                            break 'outer;
                        }
                    }
                }
                let Some((bi, id)) = split else { break };
                let beam = self.cells[ci].beams.remove(bi);
                let b1 = Beam::new(
                    beam.p1,
                    id,
                    beam.radius,
                    beam.material,
                    beam.type_id,
                    &self.arena,
                );
                let b2 = Beam::new(
                    beam.p2,
                    id,
                    beam.radius,
                    beam.material,
                    beam.type_id,
                    &self.arena,
                );
                self.cells[ci].beams.push(b1);
                self.cells[ci].beams.push(b2);
            }
        }
    }

    /// Removes beams whose radius is at or below the threshold.
    pub fn delete_beams_under_threshold(&mut self, threshold: f64) {
        for cell in &mut self.cells {
            cell.beams.retain(|beam| beam.radius > threshold);
        }
    }

    /// Removes repeated beams so each endpoint pair appears in exactly one
    /// cell. Intended after geometry transforms that fold cells together.
    pub fn delete_duplicated_beams(&mut self) {
        let mut seen: HashSet<BeamKey> = HashSet::new();
        for cell in &mut self.cells {
            cell.beams.retain(|beam| seen.insert(beam.key()));
        }
    }

    /// Shortest active (non-modified) beam length above the degenerate
    /// cutoff.
    pub fn minimum_beam_length(&self) -> f64 {
        let mut min_length = f64::INFINITY;
        for cell in &self.cells {
            for beam in &cell.beams {
                if !beam.modified && beam.length > 1e-4 && beam.length < min_length {
                    min_length = beam.length;
                }
            }
        }
        min_length
    }

    // ------------------------------------------------------------------
    // Counts and exports
    // ------------------------------------------------------------------

    /// Number of distinct nodes referenced by the structure.
    pub fn node_count(&self) -> usize {
        self.used_node_ids().len()
    }

    /// Number of distinct beams (shared beams counted once).
    pub fn beam_count(&self) -> usize {
        let mut keys = HashSet::new();
        for cell in &self.cells {
            for beam in &cell.beams {
                keys.insert(beam.key());
            }
        }
        keys.len()
    }

    /// All node ids referenced by at least one beam.
    pub fn used_node_ids(&self) -> HashSet<NodeId> {
        let mut ids = HashSet::new();
        for cell in &self.cells {
            for beam in &cell.beams {
                ids.insert(beam.p1);
                ids.insert(beam.p2);
            }
        }
        ids
    }

    /// Flat node export rows `(index, [x, y, z])`, ordered by global index.
    pub fn node_positions(&self) -> Vec<(usize, [f64; 3])> {
        let mut rows: Vec<(usize, [f64; 3])> = self
            .used_node_ids()
            .into_iter()
            .filter_map(|id| {
                let node = self.arena.get(id);
                node.index.map(|index| (index, node.position()))
            })
            .collect();
        rows.sort_by_key(|(index, _)| *index);
        rows
    }

    /// Flat beam export rows `(index, p1, p2, type)`, ordered by global
    /// index. Penalized sub-segments report the modified flag through a
    /// type offset of 1000.
    pub fn beam_connectivity(&self) -> Vec<(usize, usize, usize, usize)> {
        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for cell in &self.cells {
            for beam in &cell.beams {
                if !seen.insert(beam.key()) {
                    continue;
                }
                let (Some(index), Some(i1), Some(i2)) = (
                    beam.index,
                    self.arena.get(beam.p1).index,
                    self.arena.get(beam.p2).index,
                ) else {
                    continue;
                };
                let type_id = if beam.modified {
                    beam.type_id + 1000
                } else {
                    beam.type_id
                };
                rows.push((index, i1, i2, type_id));
            }
        }
        rows.sort_by_key(|(index, ..)| *index);
        rows
    }

    /// Prints summary statistics for the structure.
    pub fn print_statistics(&self) {
        println!("info: number of cells: {}", self.cells.len());
        println!("info: number of beams: {}", self.beam_count());
        println!("info: number of nodes: {}", self.node_count());
        println!("info: boundary nodes:  {}", self.boundary_node_count);
        let bb = self.extents;
        println!(
            "info: extents: [{:.4}, {:.4}] x [{:.4}, {:.4}] x [{:.4}, {:.4}]",
            bb.x_min, bb.x_max, bb.y_min, bb.y_max, bb.z_min, bb.z_max
        );
    }

    // ------------------------------------------------------------------
    // Boundary conditions
    // ------------------------------------------------------------------

    /// Nodes lying on every one of the named surfaces.
    pub fn nodes_on_surfaces(&self, surfaces: &[Surface]) -> Result<Vec<NodeId>, PerovskiteError> {
        if surfaces.is_empty() {
            return Err(PerovskiteError::Input(
                "No surfaces given for node selection".to_owned(),
            ));
        }
        let bb = self.extents;
        let criteria: Vec<(usize, f64)> = surfaces.iter().map(|s| s.axis_value(&bb)).collect();
        let mut ids: Vec<NodeId> = self
            .used_node_ids()
            .into_iter()
            .filter(|id| {
                let position = self.arena.get(*id).position();
                criteria.iter().all(|(axis, value)| position[*axis] == *value)
            })
            .collect();
        if ids.is_empty() {
            return Err(PerovskiteError::Input(
                "No points found on the specified surfaces".to_owned(),
            ));
        }
        ids.sort_unstable();
        Ok(ids)
    }

    fn apply_constraint(
        &mut self,
        ids: &[NodeId],
        values: &[f64],
        dofs: &[usize],
        kind: ConstraintKind,
    ) -> Result<(), PerovskiteError> {
        if values.len() != dofs.len() {
            return Err(PerovskiteError::Input(
                "Constraint values and DOF lists differ in length".to_owned(),
            ));
        }
        if let Some(dof) = dofs.iter().find(|dof| **dof > 5) {
            return Err(PerovskiteError::Input(format!(
                "Invalid degree of freedom index {}",
                dof
            )));
        }
        for &id in ids {
            let node = self.arena.get_mut(id);
            for (&value, &dof) in values.iter().zip(dofs) {
                match kind {
                    ConstraintKind::Displacement => {
                        node.set_displacement(dof, value);
                        node.fix_dof(dof);
                    }
                    ConstraintKind::Force => {
                        node.applied_force[dof] = value;
                    }
                }
            }
        }
        Ok(())
    }

    /// Imposes displacement values (and fixes the DOFs) on all nodes lying
    /// on the named surfaces.
    pub fn apply_displacement_on_surfaces(
        &mut self,
        surfaces: &[Surface],
        values: &[f64],
        dofs: &[usize],
    ) -> Result<(), PerovskiteError> {
        let ids = self.nodes_on_surfaces(surfaces)?;
        self.apply_constraint(&ids, values, dofs, ConstraintKind::Displacement)
    }

    /// Applies external forces on all nodes lying on the named surfaces.
    pub fn apply_force_on_surfaces(
        &mut self,
        surfaces: &[Surface],
        values: &[f64],
        dofs: &[usize],
    ) -> Result<(), PerovskiteError> {
        let ids = self.nodes_on_surfaces(surfaces)?;
        self.apply_constraint(&ids, values, dofs, ConstraintKind::Force)
    }

    /// Fixes the given DOFs (zero displacement) on the named surfaces.
    pub fn fix_dof_on_surfaces(
        &mut self,
        surfaces: &[Surface],
        dofs: &[usize],
    ) -> Result<(), PerovskiteError> {
        let values = vec![0.0; dofs.len()];
        self.apply_displacement_on_surfaces(surfaces, &values, dofs)
    }

    fn resolve_node_indices(&self, indices: &[usize]) -> Result<Vec<NodeId>, PerovskiteError> {
        let count = self.node_count();
        let mut by_index: HashMap<usize, NodeId> = HashMap::new();
        for id in self.used_node_ids() {
            if let Some(index) = self.arena.get(id).index {
                by_index.insert(index, id);
            }
        }
        let mut ids = Vec::with_capacity(indices.len());
        for &index in indices {
            if index >= count {
                return Err(PerovskiteError::Input(format!(
                    "Node index {} out of range ({} nodes)",
                    index, count
                )));
            }
            match by_index.get(&index) {
                Some(id) => ids.push(*id),
                None => {
                    return Err(PerovskiteError::Input(format!(
                        "Node index {} does not exist",
                        index
                    )))
                }
            }
        }
        Ok(ids)
    }

    /// Imposes displacement values on explicit global node indices.
    pub fn apply_displacement_on_nodes(
        &mut self,
        indices: &[usize],
        values: &[f64],
        dofs: &[usize],
    ) -> Result<(), PerovskiteError> {
        let ids = self.resolve_node_indices(indices)?;
        self.apply_constraint(&ids, values, dofs, ConstraintKind::Displacement)
    }

    /// Fixes the given DOFs on explicit global node indices.
    pub fn fix_dof_on_nodes(
        &mut self,
        indices: &[usize],
        dofs: &[usize],
    ) -> Result<(), PerovskiteError> {
        let values = vec![0.0; dofs.len()];
        self.apply_displacement_on_nodes(indices, &values, dofs)
    }

    // ------------------------------------------------------------------
    // Free-DOF bookkeeping
    // ------------------------------------------------------------------

    /// Assigns the stable global free-DOF index to every non-fixed DOF of
    /// every boundary node, in cell-traversal order, and records the total.
    /// Must run after boundary conditions are applied and before coupling
    /// operators are built.
    pub fn assign_free_dof_indices(&mut self) -> usize {
        let mut counter = 0;
        let mut processed: HashSet<NodeId> = HashSet::new();
        for ci in 0..self.cells.len() {
            let ids: Vec<NodeId> = self.cells[ci]
                .beams
                .iter()
                .flat_map(|b| [b.p1, b.p2])
                .collect();
            for id in ids {
                if !processed.insert(id) {
                    continue;
                }
                let node = self.arena.get_mut(id);
                if node.boundary_index.is_none() {
                    continue;
                }
                for dof in 0..6 {
                    if !node.fixed_dof[dof] {
                        node.global_free_dof[dof] = Some(counter);
                        counter += 1;
                    } else {
                        node.global_free_dof[dof] = None;
                    }
                }
            }
        }
        self.free_dof = Some(counter);
        counter
    }

    /// Builds the coupling operator of every cell against the current
    /// free-DOF assignment.
    pub fn build_coupling_operators(&mut self) -> Result<(), PerovskiteError> {
        let n_free_dof = match self.free_dof {
            Some(n) => n,
            None => self.assign_free_dof_indices(),
        };
        let arena = &self.arena;
        for cell in &mut self.cells {
            cell.build_coupling_operator(n_free_dof, arena)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Displacement / reaction state
    // ------------------------------------------------------------------

    /// Global displacement values over boundary nodes in traversal order,
    /// with the matching boundary index per value. Free DOFs only, or every
    /// DOF when `include_fixed` is set.
    pub fn displacement_vector(&self, include_fixed: bool) -> (Vec<f64>, Vec<usize>) {
        let mut values = Vec::new();
        let mut indices = Vec::new();
        let mut processed: HashSet<usize> = HashSet::new();
        for cell in &self.cells {
            for beam in &cell.beams {
                for id in [beam.p1, beam.p2] {
                    let node = self.arena.get(id);
                    let Some(boundary_index) = node.boundary_index else {
                        continue;
                    };
                    if !processed.insert(boundary_index) {
                        continue;
                    }
                    for dof in 0..6 {
                        if !node.fixed_dof[dof] || include_fixed {
                            values.push(node.displacement[dof]);
                            indices.push(boundary_index);
                        }
                    }
                }
            }
        }
        (values, indices)
    }

    /// Writes solver results back into the free DOFs, addressed by the
    /// global free-DOF index.
    pub fn set_free_displacements(&mut self, values: &[f64]) -> Result<(), PerovskiteError> {
        let expected = self.free_dof.ok_or_else(|| {
            PerovskiteError::Solver("Free DOF indices have not been assigned".to_owned())
        })?;
        if values.len() != expected {
            return Err(PerovskiteError::Solver(format!(
                "Displacement vector length {} does not match {} free DOFs",
                values.len(),
                expected
            )));
        }
        for (_, node) in self.arena.iter_mut() {
            for dof in 0..6 {
                if let Some(index) = node.global_free_dof[dof] {
                    node.displacement[dof] = values[index];
                }
            }
        }
        Ok(())
    }

    /// Zeroes every node's displacement vector.
    pub fn reset_displacements(&mut self) {
        for (_, node) in self.arena.iter_mut() {
            node.reset_displacement();
        }
    }

    /// Zeroes every node's accumulated reaction force.
    pub fn reset_reaction_forces(&mut self) {
        for (_, node) in self.arena.iter_mut() {
            node.reset_reaction_force();
        }
    }

    /// Accumulates per-cell reaction-force contributions addressed by
    /// boundary index.
    pub fn add_reaction_forces(
        &mut self,
        indices: &[usize],
        forces: &[[f64; 6]],
    ) -> Result<(), PerovskiteError> {
        if indices.len() != forces.len() {
            return Err(PerovskiteError::Solver(
                "Reaction index and force lists differ in length".to_owned(),
            ));
        }
        let mut by_boundary: HashMap<usize, NodeId> = HashMap::new();
        for (id, node) in self.arena.iter() {
            if let Some(boundary_index) = node.boundary_index {
                by_boundary.insert(boundary_index, id);
            }
        }
        for (index, force) in indices.iter().zip(forces) {
            match by_boundary.get(index) {
                Some(id) => self.arena.get_mut(*id).add_reaction_force(force),
                None => {
                    return Err(PerovskiteError::Solver(format!(
                        "Unknown boundary index {}",
                        index
                    )))
                }
            }
        }
        Ok(())
    }

    /// Accumulated reaction force per boundary index. With
    /// `include_applied`, non-zero externally applied forces override the
    /// corresponding components.
    pub fn global_reaction_forces(&self, include_applied: bool) -> BTreeMap<usize, [f64; 6]> {
        let mut result: BTreeMap<usize, [f64; 6]> = BTreeMap::new();
        for index in 0..self.boundary_node_count {
            result.insert(index, [0.0; 6]);
        }
        for (_, node) in self.arena.iter() {
            let Some(boundary_index) = node.boundary_index else {
                continue;
            };
            let entry = result.entry(boundary_index).or_insert([0.0; 6]);
            for dof in 0..6 {
                entry[dof] += node.reaction_force[dof];
                if include_applied && node.applied_force[dof] != 0.0 {
                    entry[dof] = node.applied_force[dof];
                }
            }
        }
        result
    }

    /// Reaction forces restricted to free DOFs, in boundary traversal
    /// order. With `right_hand_side`, applied forces enter negated, ready
    /// for the solver's right-hand side.
    pub fn reaction_force_free_vector(&self, right_hand_side: bool) -> Vec<f64> {
        let mut values = Vec::new();
        let mut processed: HashSet<usize> = HashSet::new();
        for cell in &self.cells {
            for beam in &cell.beams {
                for id in [beam.p1, beam.p2] {
                    let node = self.arena.get(id);
                    let Some(boundary_index) = node.boundary_index else {
                        continue;
                    };
                    if !processed.insert(boundary_index) {
                        continue;
                    }
                    for dof in 0..6 {
                        if node.applied_force[dof] != 0.0 && right_hand_side {
                            values.push(-node.applied_force[dof]);
                        } else if !node.fixed_dof[dof] {
                            values.push(node.reaction_force[dof]);
                        }
                    }
                }
            }
        }
        values
    }

    /// Total internal energy: ½·u·R summed over distinct boundary nodes.
    pub fn internal_energy(&self) -> f64 {
        self.arena
            .iter()
            .filter(|(_, node)| node.boundary_index.is_some())
            .map(|(_, node)| node.energy())
            .sum()
    }

    /// Compliance objective: half the imposed displacement dotted with the
    /// matching reaction forces (applied forces included).
    pub fn compliance(&self) -> f64 {
        let reactions = self.global_reaction_forces(true);
        let mut objective = 0.0;
        for (_, node) in self.arena.iter() {
            let Some(boundary_index) = node.boundary_index else {
                continue;
            };
            let reaction = &reactions[&boundary_index];
            for dof in 0..6 {
                let imposed = if node.fixed_dof[dof] || node.applied_force[dof] != 0.0 {
                    node.displacement[dof]
                } else {
                    0.0
                };
                objective += 0.5 * reaction[dof] * imposed;
            }
        }
        objective
    }
}

fn validate_params(params: &LatticeParams) -> Result<(), PerovskiteError> {
    if params.num_cells.iter().any(|n| *n == 0) {
        return Err(PerovskiteError::Input(
            "Number of cells must be positive in every direction".to_owned(),
        ));
    }
    if params.cell_size.iter().any(|s| *s <= 0.0) {
        return Err(PerovskiteError::Input(
            "Cell size must be positive in every direction".to_owned(),
        ));
    }
    if params.geom_types.is_empty() {
        return Err(PerovskiteError::Input(
            "At least one geometry channel is required".to_owned(),
        ));
    }
    if params.geom_types.len() != params.radii.len() {
        return Err(PerovskiteError::Input(format!(
            "Radius vector length {} does not match geometry channel count {}",
            params.radii.len(),
            params.geom_types.len()
        )));
    }
    if params.radii.iter().any(|r| *r < 0.0) {
        return Err(PerovskiteError::Input(
            "Beam radii must be non-negative".to_owned(),
        ));
    }
    Ok(())
}

fn row_key(position: [usize; 3], axis: usize) -> [usize; 2] {
    match axis {
        0 => [position[1], position[2]],
        1 => [position[0], position[2]],
        _ => [position[0], position[1]],
    }
}

fn box_corners(bb: &BoundingBox) -> [[f64; 3]; 8] {
    [
        [bb.x_min, bb.y_min, bb.z_min],
        [bb.x_max, bb.y_min, bb.z_min],
        [bb.x_min, bb.y_max, bb.z_min],
        [bb.x_max, bb.y_max, bb.z_min],
        [bb.x_min, bb.y_min, bb.z_max],
        [bb.x_max, bb.y_min, bb.z_max],
        [bb.x_min, bb.y_max, bb.z_max],
        [bb.x_max, bb.y_max, bb.z_max],
    ]
}

fn compute_extents(cells: &[Cell], arena: &NodeArena) -> Result<BoundingBox, PerovskiteError> {
    let mut bb = BoundingBox {
        x_min: f64::INFINITY,
        x_max: f64::NEG_INFINITY,
        y_min: f64::INFINITY,
        y_max: f64::NEG_INFINITY,
        z_min: f64::INFINITY,
        z_max: f64::NEG_INFINITY,
    };
    let mut any = false;
    for cell in cells {
        for beam in &cell.beams {
            for id in [beam.p1, beam.p2] {
                let node = arena.get(id);
                bb.x_min = bb.x_min.min(node.x);
                bb.x_max = bb.x_max.max(node.x);
                bb.y_min = bb.y_min.min(node.y);
                bb.y_max = bb.y_max.max(node.y);
                bb.z_min = bb.z_min.min(node.z);
                bb.z_max = bb.z_max.max(node.z);
                any = true;
            }
        }
    }
    if !any {
        return Err(PerovskiteError::Topology(
            "No nodes in the cells of the lattice".to_owned(),
        ));
    }
    Ok(bb)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(num_cells: [usize; 3], geom_type: i32) -> Lattice {
        Lattice::simple([1.0, 1.0, 1.0], num_cells, geom_type, 0.1).unwrap()
    }

    #[test]
    fn shared_face_nodes_resolve_to_one_index() {
        let lattice = grid([2, 1, 1], 5); // Cubic: nodes at the cell corners
        // The x = 1 plane is shared by both cells; each of its four corners
        // must appear exactly once.
        assert_eq!(lattice.node_count(), 12);
        let shared: Vec<usize> = lattice
            .node_positions()
            .into_iter()
            .filter(|(_, [x, _, _])| *x == 1.0)
            .map(|(index, _)| index)
            .collect();
        assert_eq!(shared.len(), 4);
    }

    #[test]
    fn indexing_is_idempotent() {
        let mut lattice = grid([2, 2, 2], 0);
        let before = lattice.node_positions();
        let beams_before = lattice.beam_connectivity();
        lattice.define_node_beam_index();
        assert_eq!(lattice.node_positions(), before);
        assert_eq!(lattice.beam_connectivity(), beams_before);
    }

    #[test]
    fn non_periodic_corner_cell_has_three_neighbours() {
        let lattice = grid([2, 2, 2], 0);
        for cell in &lattice.cells {
            assert_eq!(cell.neighbours.len(), 3);
        }
    }

    #[test]
    fn periodic_neighbours_wrap_to_opposite_extreme() {
        let mut params = LatticeParams::simple([1.0, 1.0, 1.0], [3, 1, 1], 0, 0.1);
        params.periodic = true;
        let lattice = Lattice::build(params).unwrap();
        let first = lattice
            .cells
            .iter()
            .position(|c| c.position == [0, 0, 0])
            .unwrap();
        let last = lattice
            .cells
            .iter()
            .position(|c| c.position == [2, 0, 0])
            .unwrap();
        assert!(lattice.cells[first].neighbours.contains(&last));
        assert!(lattice.cells[last].neighbours.contains(&first));
    }

    #[test]
    fn erased_region_removes_cells_and_wrap_skips_it() {
        let mut params = LatticeParams::simple([1.0, 1.0, 1.0], [3, 1, 1], 0, 0.1);
        params.periodic = true;
        params.erased_regions.push(ErasedRegion {
            start: [1.9, -0.1, -0.1],
            size: [0.2, 0.2, 0.2],
        });
        let lattice = Lattice::build(params).unwrap();
        assert_eq!(lattice.cells.len(), 2);
        // The occupied extremes of the row are now cells 0 and 1.
        let first = lattice
            .cells
            .iter()
            .position(|c| c.position == [0, 0, 0])
            .unwrap();
        let second = lattice
            .cells
            .iter()
            .position(|c| c.position == [1, 0, 0])
            .unwrap();
        assert!(lattice.cells[first].neighbours.contains(&second));
        assert!(lattice.cells[second].neighbours.contains(&first));
    }

    #[test]
    fn boundary_indices_are_unique_and_shared() {
        let lattice = grid([2, 2, 2], 5);
        let mut seen = std::collections::HashMap::new();
        for id in lattice.used_node_ids() {
            let node = lattice.arena.get(id);
            if let Some(boundary_index) = node.boundary_index {
                // One boundary index per node, never reused.
                assert!(seen.insert(boundary_index, id).is_none());
            }
        }
        assert_eq!(seen.len(), lattice.boundary_node_count());
        // Cubic cells put every node on a cell box corner.
        assert_eq!(seen.len(), lattice.node_count());
    }

    #[test]
    fn free_dof_indices_cover_every_free_dof_once() {
        let mut lattice = grid([2, 1, 1], 5);
        lattice
            .apply_displacement_on_surfaces(&[Surface::Xmin], &[0.0], &[0])
            .unwrap();
        let total = lattice.assign_free_dof_indices();

        let mut used = vec![false; total];
        let mut free_count = 0;
        for id in lattice.used_node_ids() {
            let node = lattice.arena.get(id);
            if node.boundary_index.is_none() {
                continue;
            }
            for dof in 0..6 {
                if node.fixed_dof[dof] {
                    assert!(node.global_free_dof[dof].is_none());
                } else {
                    let index = node.global_free_dof[dof].unwrap();
                    assert!(!used[index], "free DOF index {} assigned twice", index);
                    used[index] = true;
                    free_count += 1;
                }
            }
        }
        assert_eq!(free_count, total);
        assert!(used.into_iter().all(|u| u));
        // Cubic 2x1x1: 12 nodes, 4 on Xmin with one fixed DOF each.
        assert_eq!(total, 12 * 6 - 4);
    }

    #[test]
    fn surface_selection_validates_names_and_hits() {
        let mut lattice = grid([1, 1, 1], 0);
        assert!(Surface::from_name("Xback").is_err());
        // BCC has no node on the x mid-plane boundary of a single cell
        // besides the center, which is interior but still matches Xmid.
        let mids = lattice.nodes_on_surfaces(&[Surface::Xmid]).unwrap();
        assert_eq!(mids.len(), 1);
        // DOF out of range is a usage error.
        assert!(lattice
            .apply_displacement_on_surfaces(&[Surface::Xmin], &[1.0], &[6])
            .is_err());
    }

    #[test]
    fn node_index_constraints_check_bounds() {
        let mut lattice = grid([1, 1, 1], 0);
        assert!(lattice.fix_dof_on_nodes(&[900], &[0]).is_err());
        lattice.fix_dof_on_nodes(&[0], &[0, 1]).unwrap();
        let fixed: Vec<bool> = lattice
            .used_node_ids()
            .into_iter()
            .map(|id| lattice.arena.get(id))
            .filter(|n| n.index == Some(0))
            .map(|n| n.fixed_dof[0] && n.fixed_dof[1] && !n.fixed_dof[2])
            .collect();
        assert_eq!(fixed, vec![true]);
    }

    #[test]
    fn hybrid_collision_splitting_leaves_no_interior_nodes() {
        // Cubic edges run through CubicV3's edge-midpoint nodes.
        let mut params = LatticeParams::simple([1.0, 1.0, 1.0], [1, 1, 1], 5, 0.1);
        params.geom_types = vec![5, 10];
        params.radii = vec![0.1, 0.05];
        let lattice = Lattice::build(params).unwrap();
        for cell in &lattice.cells {
            let ids = cell.node_ids();
            for beam in &cell.beams {
                for &id in &ids {
                    let position = lattice.arena.get(id).position();
                    assert!(
                        !beam.is_point_on_beam(position, &lattice.arena),
                        "node {:?} still lies inside a beam",
                        position
                    );
                }
            }
        }
    }

    #[test]
    fn threshold_pruning_drops_suppressed_beams() {
        let mut params = LatticeParams::simple([1.0, 1.0, 1.0], [1, 1, 1], 5, 0.1);
        params.geom_types = vec![5, 0];
        params.radii = vec![0.1, 0.0];
        let mut lattice = Lattice::build(params).unwrap();
        let with_suppressed = lattice.beam_count();
        lattice.delete_beams_under_threshold(0.0);
        assert!(lattice.beam_count() < with_suppressed);
        assert!(lattice
            .cells
            .iter()
            .all(|c| c.beams.iter().all(|b| b.radius > 0.0)));
    }

    #[test]
    fn duplicate_beam_deletion_keeps_one_copy_per_pair() {
        let mut lattice = grid([2, 1, 1], 5);
        // The four beams of the shared face live in both cells.
        let per_cell_total: usize = lattice.cells.iter().map(|c| c.beams.len()).sum();
        let distinct = lattice.beam_count();
        assert!(per_cell_total > distinct);
        lattice.delete_duplicated_beams();
        let after: usize = lattice.cells.iter().map(|c| c.beams.len()).sum();
        assert_eq!(after, distinct);
        assert_eq!(lattice.beam_count(), distinct);
    }

    #[test]
    fn minimum_beam_length_matches_geometry() {
        let lattice = grid([1, 1, 1], 0);
        // BCC half-diagonal.
        let expected = (3.0f64).sqrt() / 2.0;
        assert!((lattice.minimum_beam_length() - expected).abs() < 1e-12);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(Lattice::simple([1.0, 1.0, 1.0], [0, 1, 1], 0, 0.1).is_err());
        assert!(Lattice::simple([0.0, 1.0, 1.0], [1, 1, 1], 0, 0.1).is_err());
        assert!(Lattice::simple([1.0, 1.0, 1.0], [1, 1, 1], 0, -0.1).is_err());
        assert!(Lattice::simple([1.0, 1.0, 1.0], [1, 1, 1], 99, 0.1).is_err());
    }
}
