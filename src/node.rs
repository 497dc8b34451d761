use std::collections::HashMap;

use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Stable handle into the node arena. Cells and beams store these instead of
/// references; one id exists per distinct coordinate.
pub type NodeId = usize;

/// Degrees of freedom per node: three translations and three rotations.
pub const DOF_PER_NODE: usize = 6;

/// Axis-aligned box used for boundary classification, either the whole
/// lattice extents or a single cell's box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub z_min: f64,
    pub z_max: f64,
}

impl BoundingBox {
    pub fn from_origin_size(origin: [f64; 3], size: [f64; 3]) -> BoundingBox {
        BoundingBox {
            x_min: origin[0],
            x_max: origin[0] + size[0],
            y_min: origin[1],
            y_max: origin[1] + size[1],
            z_min: origin[2],
            z_max: origin[2] + size[2],
        }
    }
}

/// One of the 26 canonical boundary regions of a box: 6 faces, 12 edges,
/// 8 corners. A strictly interior point carries no tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundaryTag {
    FaceZmin,
    FaceYmin,
    FaceXmin,
    FaceXmax,
    FaceYmax,
    FaceZmax,
    EdgeYminZmin,
    EdgeXminZmin,
    EdgeXminYmin,
    EdgeXmaxZmin,
    EdgeXmaxYmin,
    EdgeYmaxZmin,
    EdgeXminYmax,
    EdgeXmaxYmax,
    EdgeYminZmax,
    EdgeXminZmax,
    EdgeXmaxZmax,
    EdgeYmaxZmax,
    CornerXminYminZmin,
    CornerXmaxYminZmin,
    CornerXminYmaxZmin,
    CornerXmaxYmaxZmin,
    CornerXminYminZmax,
    CornerXmaxYminZmax,
    CornerXminYmaxZmax,
    CornerXmaxYmaxZmax,
}

/// Category used when matching periodically-equivalent nodes: opposite faces
/// pair up, edges group by the axis they run along, and all corners are
/// mutually equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodicGroup {
    Corners,
    EdgesAlongX,
    EdgesAlongY,
    EdgesAlongZ,
    FacesX,
    FacesY,
    FacesZ,
}

/// Canonical local ordering of the 26 regions: corners 1000..1007, edges
/// 100..111, faces 10..15. Cells order their boundary DOFs by position in
/// this list.
pub const CANONICAL_TAG_ORDER: [BoundaryTag; 26] = [
    BoundaryTag::CornerXminYminZmin,
    BoundaryTag::CornerXmaxYminZmin,
    BoundaryTag::CornerXminYmaxZmin,
    BoundaryTag::CornerXmaxYmaxZmin,
    BoundaryTag::CornerXminYminZmax,
    BoundaryTag::CornerXmaxYminZmax,
    BoundaryTag::CornerXminYmaxZmax,
    BoundaryTag::CornerXmaxYmaxZmax,
    BoundaryTag::EdgeYminZmin,
    BoundaryTag::EdgeXminZmin,
    BoundaryTag::EdgeXminYmin,
    BoundaryTag::EdgeXmaxZmin,
    BoundaryTag::EdgeXmaxYmin,
    BoundaryTag::EdgeYmaxZmin,
    BoundaryTag::EdgeXminYmax,
    BoundaryTag::EdgeXmaxYmax,
    BoundaryTag::EdgeYminZmax,
    BoundaryTag::EdgeXminZmax,
    BoundaryTag::EdgeXmaxZmax,
    BoundaryTag::EdgeYmaxZmax,
    BoundaryTag::FaceZmin,
    BoundaryTag::FaceYmin,
    BoundaryTag::FaceXmin,
    BoundaryTag::FaceXmax,
    BoundaryTag::FaceYmax,
    BoundaryTag::FaceZmax,
];

impl BoundaryTag {
    /// Numeric region id: faces 10-15, edges 100-111, corners 1000-1007.
    pub fn id(&self) -> u16 {
        match self {
            BoundaryTag::FaceZmin => 10,
            BoundaryTag::FaceYmin => 11,
            BoundaryTag::FaceXmin => 12,
            BoundaryTag::FaceXmax => 13,
            BoundaryTag::FaceYmax => 14,
            BoundaryTag::FaceZmax => 15,
            BoundaryTag::EdgeYminZmin => 100,
            BoundaryTag::EdgeXminZmin => 101,
            BoundaryTag::EdgeXminYmin => 102,
            BoundaryTag::EdgeXmaxZmin => 103,
            BoundaryTag::EdgeXmaxYmin => 104,
            BoundaryTag::EdgeYmaxZmin => 105,
            BoundaryTag::EdgeXminYmax => 106,
            BoundaryTag::EdgeXmaxYmax => 107,
            BoundaryTag::EdgeYminZmax => 108,
            BoundaryTag::EdgeXminZmax => 109,
            BoundaryTag::EdgeXmaxZmax => 110,
            BoundaryTag::EdgeYmaxZmax => 111,
            BoundaryTag::CornerXminYminZmin => 1000,
            BoundaryTag::CornerXmaxYminZmin => 1001,
            BoundaryTag::CornerXminYmaxZmin => 1002,
            BoundaryTag::CornerXmaxYmaxZmin => 1003,
            BoundaryTag::CornerXminYminZmax => 1004,
            BoundaryTag::CornerXmaxYminZmax => 1005,
            BoundaryTag::CornerXminYmaxZmax => 1006,
            BoundaryTag::CornerXmaxYmaxZmax => 1007,
        }
    }

    /// Position in [`CANONICAL_TAG_ORDER`].
    pub fn canonical_rank(&self) -> usize {
        CANONICAL_TAG_ORDER
            .iter()
            .position(|t| t == self)
            .expect("tag missing from canonical order")
    }

    pub fn is_corner(&self) -> bool {
        self.id() >= 1000
    }

    pub fn is_edge(&self) -> bool {
        (100..=111).contains(&self.id())
    }

    pub fn is_face(&self) -> bool {
        self.id() < 100
    }

    pub fn periodic_group(&self) -> PeriodicGroup {
        use BoundaryTag::*;
        match self {
            CornerXminYminZmin | CornerXmaxYminZmin | CornerXminYmaxZmin | CornerXmaxYmaxZmin
            | CornerXminYminZmax | CornerXmaxYminZmax | CornerXminYmaxZmax
            | CornerXmaxYmaxZmax => PeriodicGroup::Corners,
            EdgeYminZmin | EdgeYmaxZmin | EdgeYminZmax | EdgeYmaxZmax => PeriodicGroup::EdgesAlongX,
            EdgeXminZmin | EdgeXmaxZmin | EdgeXminZmax | EdgeXmaxZmax => PeriodicGroup::EdgesAlongY,
            EdgeXminYmin | EdgeXmaxYmin | EdgeXminYmax | EdgeXmaxYmax => PeriodicGroup::EdgesAlongZ,
            FaceXmin | FaceXmax => PeriodicGroup::FacesX,
            FaceYmin | FaceYmax => PeriodicGroup::FacesY,
            FaceZmin | FaceZmax => PeriodicGroup::FacesZ,
        }
    }
}

/// Classifies a point against a bounding box into at most one of the 26
/// canonical regions.
///
/// Boundary membership is exact coordinate equality; non-boundary axes must
/// be strictly interior, which makes the corner/edge/face tiers mutually
/// exclusive. A strictly interior point returns `None`.
pub fn tag_point(position: [f64; 3], bb: &BoundingBox) -> Option<BoundaryTag> {
    let [x, y, z] = position;
    let on_x_min = x == bb.x_min;
    let on_x_max = x == bb.x_max;
    let on_y_min = y == bb.y_min;
    let on_y_max = y == bb.y_max;
    let on_z_min = z == bb.z_min;
    let on_z_max = z == bb.z_max;
    let in_x = bb.x_min < x && x < bb.x_max;
    let in_y = bb.y_min < y && y < bb.y_max;
    let in_z = bb.z_min < z && z < bb.z_max;

    // Corners
    if on_x_min && on_y_min && on_z_min {
        return Some(BoundaryTag::CornerXminYminZmin);
    }
    if on_x_max && on_y_min && on_z_min {
        return Some(BoundaryTag::CornerXmaxYminZmin);
    }
    if on_x_min && on_y_max && on_z_min {
        return Some(BoundaryTag::CornerXminYmaxZmin);
    }
    if on_x_max && on_y_max && on_z_min {
        return Some(BoundaryTag::CornerXmaxYmaxZmin);
    }
    if on_x_min && on_y_min && on_z_max {
        return Some(BoundaryTag::CornerXminYminZmax);
    }
    if on_x_max && on_y_min && on_z_max {
        return Some(BoundaryTag::CornerXmaxYminZmax);
    }
    if on_x_min && on_y_max && on_z_max {
        return Some(BoundaryTag::CornerXminYmaxZmax);
    }
    if on_x_max && on_y_max && on_z_max {
        return Some(BoundaryTag::CornerXmaxYmaxZmax);
    }

    // Edges
    if on_x_min && on_y_min && in_z {
        return Some(BoundaryTag::EdgeXminYmin);
    }
    if in_x && on_y_min && on_z_min {
        return Some(BoundaryTag::EdgeYminZmin);
    }
    if on_x_max && on_y_min && in_z {
        return Some(BoundaryTag::EdgeXmaxYmin);
    }
    if in_x && on_y_min && on_z_max {
        return Some(BoundaryTag::EdgeYminZmax);
    }
    if on_x_min && in_y && on_z_min {
        return Some(BoundaryTag::EdgeXminZmin);
    }
    if on_x_max && in_y && on_z_min {
        return Some(BoundaryTag::EdgeXmaxZmin);
    }
    if on_x_min && on_y_max && in_z {
        return Some(BoundaryTag::EdgeXminYmax);
    }
    if in_x && on_y_max && on_z_min {
        return Some(BoundaryTag::EdgeYmaxZmin);
    }
    if on_x_max && on_y_max && in_z {
        return Some(BoundaryTag::EdgeXmaxYmax);
    }
    if in_x && on_y_max && on_z_max {
        return Some(BoundaryTag::EdgeYmaxZmax);
    }
    if on_x_min && in_y && on_z_max {
        return Some(BoundaryTag::EdgeXminZmax);
    }
    if on_x_max && in_y && on_z_max {
        return Some(BoundaryTag::EdgeXmaxZmax);
    }

    // Faces
    if on_x_min && in_y && in_z {
        return Some(BoundaryTag::FaceXmin);
    }
    if on_x_max && in_y && in_z {
        return Some(BoundaryTag::FaceXmax);
    }
    if in_x && on_y_min && in_z {
        return Some(BoundaryTag::FaceYmin);
    }
    if in_x && on_y_max && in_z {
        return Some(BoundaryTag::FaceYmax);
    }
    if in_x && in_y && on_z_min {
        return Some(BoundaryTag::FaceZmin);
    }
    if in_x && in_y && on_z_max {
        return Some(BoundaryTag::FaceZmax);
    }

    None
}

/// Exact-value coordinate key. Bit-pattern equality gives the same identity
/// contract the deduplication passes rely on: coordinates built through the
/// same arithmetic compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointKey([u64; 3]);

impl PointKey {
    pub fn new(x: f64, y: f64, z: f64) -> PointKey {
        PointKey([x.to_bits(), y.to_bits(), z.to_bits()])
    }
}

/// A lattice node: a 3D point with per-DOF simulation state and boundary
/// classification data.
#[derive(Debug, Clone)]
pub struct Node {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Global index, assigned once by the indexing pass.
    pub index: Option<usize>,
    /// Tag against the lattice-level (or cell-relative) box.
    pub tag: Option<BoundaryTag>,
    /// Tag against the box of the first cell that touched this node.
    pub local_tag: Option<BoundaryTag>,
    /// Compact enumeration over boundary nodes only.
    pub boundary_index: Option<usize>,
    pub displacement: [f64; 6],
    pub reaction_force: [f64; 6],
    pub applied_force: [f64; 6],
    pub fixed_dof: [bool; 6],
    pub global_free_dof: [Option<usize>; 6],
}

impl Node {
    fn new(x: f64, y: f64, z: f64) -> Node {
        Node {
            x,
            y,
            z,
            index: None,
            tag: None,
            local_tag: None,
            boundary_index: None,
            displacement: [0.0; 6],
            reaction_force: [0.0; 6],
            applied_force: [0.0; 6],
            fixed_dof: [false; 6],
            global_free_dof: [None; 6],
        }
    }

    pub fn position(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn set_displacement(&mut self, dof: usize, value: f64) {
        self.displacement[dof] = value;
    }

    pub fn fix_dof(&mut self, dof: usize) {
        self.fixed_dof[dof] = true;
    }

    pub fn free_dof_count(&self) -> usize {
        self.fixed_dof.iter().filter(|fixed| !**fixed).count()
    }

    /// Accumulates one cell's reaction-force contribution.
    pub fn add_reaction_force(&mut self, contribution: &[f64; 6]) {
        for (total, value) in self.reaction_force.iter_mut().zip(contribution) {
            *total += value;
        }
    }

    pub fn reset_reaction_force(&mut self) {
        self.reaction_force = [0.0; 6];
    }

    pub fn reset_displacement(&mut self) {
        self.displacement = [0.0; 6];
    }

    /// Internal energy at this node: half the dot product of displacement
    /// and reaction force over the six DOFs.
    pub fn energy(&self) -> f64 {
        0.5 * self
            .displacement
            .iter()
            .zip(self.reaction_force.iter())
            .map(|(u, r)| u * r)
            .sum::<f64>()
    }
}

/// Arena owning every node in the lattice, deduplicated by exact nominal
/// coordinate. Cells reference nodes through [`NodeId`], so state shared
/// across adjacent cells lives in exactly one place.
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: Vec<Node>,
    lookup: HashMap<PointKey, NodeId>,
}

impl NodeArena {
    pub fn new() -> NodeArena {
        NodeArena {
            nodes: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    /// Returns the node at the given coordinates, inserting it if the
    /// coordinate key is new.
    pub fn insert(&mut self, x: f64, y: f64, z: f64) -> NodeId {
        let key = PointKey::new(x, y, z);
        if let Some(&id) = self.lookup.get(&key) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(Node::new(x, y, z));
        self.lookup.insert(key, id);
        id
    }

    /// Like [`NodeArena::insert`], but the stored position is perturbed by
    /// Gaussian noise with the given standard deviation the first time the
    /// nominal coordinate is seen. Lookup stays keyed on the nominal
    /// coordinates so sharing across cells is unaffected.
    pub fn insert_perturbed<R: Rng>(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        std_dev: f64,
        rng: &mut R,
    ) -> NodeId {
        if std_dev == 0.0 {
            return self.insert(x, y, z);
        }
        let key = PointKey::new(x, y, z);
        if let Some(&id) = self.lookup.get(&key) {
            return id;
        }
        let normal = Normal::new(0.0, std_dev).expect("standard deviation must be finite");
        let id = self.nodes.len();
        self.nodes.push(Node::new(
            x + normal.sample(rng),
            y + normal.sample(rng),
            z + normal.sample(rng),
        ));
        self.lookup.insert(key, id);
        id
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.nodes.iter().enumerate()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (NodeId, &mut Node)> + '_ {
        self.nodes.iter_mut().enumerate()
    }
}
