use crate::node::{NodeArena, NodeId};

/// Angle above which a joint is treated as straight and the penalization
/// zone collapses to a negligible length.
pub const DEGENERATE_ANGLE_DEG: f64 = 170.0;

/// Default angle assigned to a beam endpoint with no other connected beam.
pub const LONE_ENDPOINT_ANGLE_DEG: f64 = 179.9;

/// Identity of a beam for deduplication: the unordered endpoint pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BeamKey(NodeId, NodeId);

impl BeamKey {
    pub fn new(p1: NodeId, p2: NodeId) -> BeamKey {
        if p1 <= p2 {
            BeamKey(p1, p2)
        } else {
            BeamKey(p2, p1)
        }
    }
}

/// One of the two endpoints of a beam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeamEnd {
    First,
    Second,
}

/// Penalization data for one endpoint: the governing connection's radius and
/// the angle (degrees) it makes with this beam.
pub type AngleData = (f64, f64);

/// A straight structural edge between two arena nodes.
///
/// `type_id` is the geometry channel the beam came from; `modified` marks
/// stiffened end segments introduced by the penalization rewrite. A radius
/// of zero means the beam is suppressed: it participates in topology but not
/// in physical computation.
#[derive(Debug, Clone)]
pub struct Beam {
    pub p1: NodeId,
    pub p2: NodeId,
    pub radius: f64,
    pub material: usize,
    pub type_id: usize,
    pub modified: bool,
    pub index: Option<usize>,
    pub length: f64,
    pub angle1: Option<AngleData>,
    pub angle2: Option<AngleData>,
}

impl Beam {
    pub fn new(
        p1: NodeId,
        p2: NodeId,
        radius: f64,
        material: usize,
        type_id: usize,
        arena: &NodeArena,
    ) -> Beam {
        let a = arena.get(p1).position();
        let b = arena.get(p2).position();
        let length = ((b[0] - a[0]).powi(2) + (b[1] - a[1]).powi(2) + (b[2] - a[2]).powi(2)).sqrt();
        Beam {
            p1,
            p2,
            radius,
            material,
            type_id,
            modified: false,
            index: None,
            length,
            angle1: None,
            angle2: None,
        }
    }

    pub fn key(&self) -> BeamKey {
        BeamKey::new(self.p1, self.p2)
    }

    pub fn endpoint(&self, end: BeamEnd) -> NodeId {
        match end {
            BeamEnd::First => self.p1,
            BeamEnd::Second => self.p2,
        }
    }

    pub fn volume(&self) -> f64 {
        std::f64::consts::PI * self.radius * self.radius * self.length
    }

    pub fn set_angles(&mut self, angle1: AngleData, angle2: AngleData) {
        self.angle1 = Some(angle1);
        self.angle2 = Some(angle2);
    }

    /// Position on the beam at the given distance from one endpoint, walking
    /// towards the other.
    pub fn point_at_distance(&self, distance: f64, from: BeamEnd, arena: &NodeArena) -> [f64; 3] {
        let (start, end) = match from {
            BeamEnd::First => (self.p1, self.p2),
            BeamEnd::Second => (self.p2, self.p1),
        };
        let a = arena.get(start).position();
        let b = arena.get(end).position();
        let mut position = [0.0; 3];
        for axis in 0..3 {
            position[axis] = a[axis] + (b[axis] - a[axis]) / self.length * distance;
        }
        position
    }

    /// Whether a point lies strictly between the beam's endpoints on its
    /// supporting line. Endpoints themselves do not count.
    pub fn is_point_on_beam(&self, position: [f64; 3], arena: &NodeArena) -> bool {
        let a = arena.get(self.p1).position();
        let b = arena.get(self.p2).position();
        if position == a || position == b {
            return false;
        }
        let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
        let v = [
            position[0] - a[0],
            position[1] - a[1],
            position[2] - a[2],
        ];
        let cross = [
            u[1] * v[2] - u[2] * v[1],
            u[2] * v[0] - u[0] * v[2],
            u[0] * v[1] - u[1] * v[0],
        ];
        if cross != [0.0, 0.0, 0.0] {
            return false;
        }
        let dot = u[0] * v[0] + u[1] * v[1] + u[2] * v[2];
        let len_sq = u[0] * u[0] + u[1] * u[1] + u[2] * u[2];
        0.0 <= dot && dot <= len_sq
    }

    /// Penalization-zone lengths at both endpoints from the stored angle
    /// data. Endpoints without angle data fall back to the near-straight
    /// default.
    pub fn penalization_lengths(&self) -> (f64, f64) {
        let l1 = match self.angle1 {
            Some((radius, angle)) => penalization_length(radius, angle),
            None => penalization_length(self.radius, LONE_ENDPOINT_ANGLE_DEG),
        };
        let l2 = match self.angle2 {
            Some((radius, angle)) => penalization_length(radius, angle),
            None => penalization_length(self.radius, LONE_ENDPOINT_ANGLE_DEG),
        };
        (l1, l2)
    }
}

/// Length of the stiffened zone induced at a joint by a beam of the given
/// radius meeting at the given angle: `L = r / tan(angle/2)`. Angles above
/// [`DEGENERATE_ANGLE_DEG`] map to a negligible length.
pub fn penalization_length(radius: f64, angle_deg: f64) -> f64 {
    if angle_deg > DEGENERATE_ANGLE_DEG {
        return 1e-7;
    }
    radius / (angle_deg.to_radians() / 2.0).tan()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn arena_with(points: &[[f64; 3]]) -> (NodeArena, Vec<NodeId>) {
        let mut arena = NodeArena::new();
        let ids = points
            .iter()
            .map(|p| arena.insert(p[0], p[1], p[2]))
            .collect();
        (arena, ids)
    }

    #[test]
    fn key_is_unordered() {
        assert_eq!(BeamKey::new(3, 7), BeamKey::new(7, 3));
        assert_ne!(BeamKey::new(3, 7), BeamKey::new(3, 8));
    }

    #[test]
    fn length_is_euclidean() {
        let (arena, ids) = arena_with(&[[0.0, 0.0, 0.0], [3.0, 4.0, 0.0]]);
        let beam = Beam::new(ids[0], ids[1], 0.1, 0, 0, &arena);
        assert_relative_eq!(beam.length, 5.0);
        assert_relative_eq!(beam.volume(), std::f64::consts::PI * 0.01 * 5.0);
    }

    #[test]
    fn point_at_distance_walks_from_either_end() {
        let (arena, ids) = arena_with(&[[0.0, 0.0, 0.0], [2.0, 0.0, 0.0]]);
        let beam = Beam::new(ids[0], ids[1], 0.1, 0, 0, &arena);
        assert_eq!(
            beam.point_at_distance(0.5, BeamEnd::First, &arena),
            [0.5, 0.0, 0.0]
        );
        assert_eq!(
            beam.point_at_distance(0.5, BeamEnd::Second, &arena),
            [1.5, 0.0, 0.0]
        );
    }

    #[test]
    fn point_on_beam_excludes_endpoints_and_offline_points() {
        let (arena, ids) = arena_with(&[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]);
        let beam = Beam::new(ids[0], ids[1], 0.1, 0, 0, &arena);
        assert!(beam.is_point_on_beam([0.5, 0.5, 0.5], &arena));
        assert!(!beam.is_point_on_beam([0.0, 0.0, 0.0], &arena));
        assert!(!beam.is_point_on_beam([0.5, 0.5, 0.25], &arena));
    }

    #[test]
    fn penalization_length_degenerates_past_threshold() {
        assert_relative_eq!(penalization_length(0.1, 90.0), 0.1, max_relative = 1e-12);
        assert!(penalization_length(0.1, 171.0) < 1e-6);
        assert!(penalization_length(0.1, 60.0) > penalization_length(0.1, 90.0));
    }
}
