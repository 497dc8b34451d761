use rand::Rng;

use crate::error::PerovskiteError;

/// One beam of a unit-cell template, as a pair of normalized (0..1)
/// endpoint coordinates.
pub type Segment = ([f64; 3], [f64; 3]);

/// Template id drawn at random when a cell requests geometry `-1`.
pub const RANDOM_TEMPLATE_ID: i32 = -1;

const TEMPLATE_NAMES: [&str; 14] = [
    "BCC",
    "Octet",
    "OctetExt",
    "OctetInt",
    "BCCZ",
    "Cubic",
    "OctahedronZ",
    "OctahedronZcross",
    "Kelvin",
    "CubicV2",
    "CubicV3",
    "CubicV4",
    "Diamond",
    "Auxetic",
];

const BCC: &[[f64; 6]] = &[
    [0.0, 0.0, 0.0, 0.5, 0.5, 0.5],
    [0.5, 0.5, 0.5, 1.0, 1.0, 1.0],
    [0.5, 0.5, 0.5, 1.0, 1.0, 0.0],
    [0.5, 0.5, 0.5, 0.0, 0.0, 1.0],
    [0.5, 0.5, 0.5, 0.0, 1.0, 0.0],
    [0.5, 0.5, 0.5, 0.0, 1.0, 1.0],
    [1.0, 0.0, 1.0, 0.5, 0.5, 0.5],
    [0.5, 0.5, 0.5, 1.0, 0.0, 0.0],
];

const OCTET: &[[f64; 6]] = &[
    [0.0, 0.0, 0.0, 0.5, 0.0, 0.5],
    [1.0, 0.0, 1.0, 0.5, 0.0, 0.5],
    [0.0, 0.0, 1.0, 0.5, 0.0, 0.5],
    [1.0, 0.0, 0.0, 0.5, 0.0, 0.5],
    [0.0, 0.0, 0.0, 0.0, 0.5, 0.5],
    [0.0, 1.0, 1.0, 0.0, 0.5, 0.5],
    [0.0, 0.0, 1.0, 0.0, 0.5, 0.5],
    [0.0, 1.0, 0.0, 0.0, 0.5, 0.5],
    [0.0, 0.0, 0.0, 0.5, 0.5, 0.0],
    [1.0, 1.0, 0.0, 0.5, 0.5, 0.0],
    [1.0, 0.0, 0.0, 0.5, 0.5, 0.0],
    [0.0, 1.0, 0.0, 0.5, 0.5, 0.0],
    [0.0, 0.0, 1.0, 0.5, 0.5, 1.0],
    [1.0, 1.0, 1.0, 0.5, 0.5, 1.0],
    [1.0, 0.0, 1.0, 0.5, 0.5, 1.0],
    [0.0, 1.0, 1.0, 0.5, 0.5, 1.0],
    [1.0, 0.5, 0.5, 1.0, 1.0, 1.0],
    [1.0, 0.0, 0.0, 1.0, 0.5, 0.5],
    [1.0, 0.5, 0.5, 1.0, 1.0, 0.0],
    [1.0, 0.0, 1.0, 1.0, 0.5, 0.5],
    [0.5, 1.0, 0.5, 1.0, 1.0, 1.0],
    [0.0, 1.0, 0.0, 0.5, 1.0, 0.5],
    [0.5, 1.0, 0.5, 1.0, 1.0, 0.0],
    [0.0, 1.0, 1.0, 0.5, 1.0, 0.5],
    [0.5, 0.0, 0.5, 0.5, 0.5, 0.0],
    [0.5, 0.0, 0.5, 0.0, 0.5, 0.5],
    [0.5, 0.0, 0.5, 1.0, 0.5, 0.5],
    [0.5, 0.0, 0.5, 0.5, 0.5, 1.0],
    [0.5, 1.0, 0.5, 0.5, 0.5, 0.0],
    [0.5, 1.0, 0.5, 0.0, 0.5, 0.5],
    [0.5, 1.0, 0.5, 1.0, 0.5, 0.5],
    [0.5, 1.0, 0.5, 0.5, 0.5, 1.0],
    [1.0, 0.5, 0.5, 0.5, 0.5, 0.0],
    [0.5, 0.5, 0.0, 0.0, 0.5, 0.5],
    [0.5, 0.5, 1.0, 0.0, 0.5, 0.5],
    [0.5, 0.5, 1.0, 1.0, 0.5, 0.5],
];

const OCTET_EXT: &[[f64; 6]] = &[
    [0.0, 0.0, 0.0, 0.5, 0.0, 0.5],
    [1.0, 0.0, 1.0, 0.5, 0.0, 0.5],
    [0.0, 0.0, 1.0, 0.5, 0.0, 0.5],
    [1.0, 0.0, 0.0, 0.5, 0.0, 0.5],
    [0.0, 0.0, 0.0, 0.0, 0.5, 0.5],
    [0.0, 1.0, 1.0, 0.0, 0.5, 0.5],
    [0.0, 0.0, 1.0, 0.0, 0.5, 0.5],
    [0.0, 1.0, 0.0, 0.0, 0.5, 0.5],
    [0.0, 0.0, 0.0, 0.5, 0.5, 0.0],
    [1.0, 1.0, 0.0, 0.5, 0.5, 0.0],
    [1.0, 0.0, 0.0, 0.5, 0.5, 0.0],
    [0.0, 1.0, 0.0, 0.5, 0.5, 0.0],
    [0.0, 0.0, 1.0, 0.5, 0.5, 1.0],
    [1.0, 1.0, 1.0, 0.5, 0.5, 1.0],
    [1.0, 0.0, 1.0, 0.5, 0.5, 1.0],
    [0.0, 1.0, 1.0, 0.5, 0.5, 1.0],
    [1.0, 0.5, 0.5, 1.0, 1.0, 1.0],
    [1.0, 0.0, 0.0, 1.0, 0.5, 0.5],
    [1.0, 0.5, 0.5, 1.0, 1.0, 0.0],
    [1.0, 0.0, 1.0, 1.0, 0.5, 0.5],
    [0.5, 1.0, 0.5, 1.0, 1.0, 1.0],
    [0.0, 1.0, 0.0, 0.5, 1.0, 0.5],
    [0.5, 1.0, 0.5, 1.0, 1.0, 0.0],
    [0.0, 1.0, 1.0, 0.5, 1.0, 0.5],
];

const OCTET_INT: &[[f64; 6]] = &[
    [0.5, 0.0, 0.5, 0.5, 0.5, 0.0],
    [0.5, 0.0, 0.5, 0.0, 0.5, 0.5],
    [0.5, 0.0, 0.5, 1.0, 0.5, 0.5],
    [0.5, 0.0, 0.5, 0.5, 0.5, 1.0],
    [0.5, 1.0, 0.5, 0.5, 0.5, 0.0],
    [0.5, 1.0, 0.5, 0.0, 0.5, 0.5],
    [0.5, 1.0, 0.5, 1.0, 0.5, 0.5],
    [0.5, 1.0, 0.5, 0.5, 0.5, 1.0],
    [1.0, 0.5, 0.5, 0.5, 0.5, 0.0],
    [0.5, 0.5, 0.0, 0.0, 0.5, 0.5],
    [0.5, 0.5, 1.0, 0.0, 0.5, 0.5],
    [0.5, 0.5, 1.0, 1.0, 0.5, 0.5],
];

const BCCZ: &[[f64; 6]] = &[
    [0.5, 0.5, 0.5, 1.0, 1.0, 1.0],
    [0.0, 0.0, 0.0, 0.5, 0.5, 0.5],
    [0.5, 0.5, 0.5, 1.0, 1.0, 0.0],
    [0.0, 0.0, 1.0, 0.5, 0.5, 0.5],
    [0.5, 0.5, 0.5, 0.0, 1.0, 0.0],
    [1.0, 0.0, 1.0, 0.5, 0.5, 0.5],
    [0.5, 0.5, 0.5, 0.0, 1.0, 1.0],
    [1.0, 0.0, 0.0, 0.5, 0.5, 0.5],
    [0.5, 0.5, 0.0, 0.5, 0.5, 0.5],
    [0.5, 0.5, 0.5, 0.5, 0.5, 1.0],
];

const CUBIC: &[[f64; 6]] = &[
    [0.0, 0.0, 0.0, 0.0, 0.0, 1.0],
    [1.0, 0.0, 0.0, 1.0, 0.0, 1.0],
    [0.0, 1.0, 0.0, 0.0, 1.0, 1.0],
    [1.0, 1.0, 0.0, 1.0, 1.0, 1.0],
    [0.0, 0.0, 0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.0, 1.0, 0.0],
    [1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
    [1.0, 1.0, 0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 1.0, 0.0, 1.0],
    [0.0, 0.0, 1.0, 0.0, 1.0, 1.0],
    [1.0, 1.0, 1.0, 0.0, 1.0, 1.0],
    [1.0, 1.0, 1.0, 1.0, 0.0, 1.0],
];

const OCTAHEDRON_Z: &[[f64; 6]] = &[
    [0.5, 0.0, 0.5, 0.5, 0.5, 0.0],
    [0.5, 0.0, 0.5, 0.0, 0.5, 0.5],
    [0.5, 0.0, 0.5, 1.0, 0.5, 0.5],
    [0.5, 0.0, 0.5, 0.5, 0.5, 1.0],
    [0.5, 1.0, 0.5, 0.5, 0.5, 0.0],
    [0.5, 1.0, 0.5, 0.0, 0.5, 0.5],
    [0.5, 1.0, 0.5, 1.0, 0.5, 0.5],
    [0.5, 1.0, 0.5, 0.5, 0.5, 1.0],
    [1.0, 0.5, 0.5, 0.5, 0.5, 0.0],
    [0.5, 0.5, 0.0, 0.0, 0.5, 0.5],
    [0.5, 0.5, 1.0, 0.0, 0.5, 0.5],
    [0.5, 0.5, 1.0, 1.0, 0.5, 0.5],
    [0.5, 0.5, 0.0, 0.5, 0.5, 1.0],
];

const OCTAHEDRON_Z_CROSS: &[[f64; 6]] = &[
    [0.5, 0.0, 0.5, 0.5, 0.5, 0.0],
    [0.5, 0.0, 0.5, 0.0, 0.5, 0.5],
    [0.5, 0.0, 0.5, 1.0, 0.5, 0.5],
    [0.5, 0.0, 0.5, 0.5, 0.5, 1.0],
    [0.5, 1.0, 0.5, 0.5, 0.5, 0.0],
    [0.5, 1.0, 0.5, 0.0, 0.5, 0.5],
    [0.5, 1.0, 0.5, 1.0, 0.5, 0.5],
    [0.5, 1.0, 0.5, 0.5, 0.5, 1.0],
    [1.0, 0.5, 0.5, 0.5, 0.5, 0.0],
    [0.5, 0.5, 0.0, 0.0, 0.5, 0.5],
    [0.5, 0.5, 1.0, 0.0, 0.5, 0.5],
    [0.5, 0.5, 1.0, 1.0, 0.5, 0.5],
    [0.5, 0.5, 0.0, 0.5, 0.5, 0.5],
    [0.5, 0.5, 1.0, 0.5, 0.5, 0.5],
    [0.5, 0.0, 0.5, 0.5, 0.5, 0.5],
    [0.0, 0.5, 0.5, 0.5, 0.5, 0.5],
    [1.0, 0.5, 0.5, 0.5, 0.5, 0.5],
    [0.5, 1.0, 0.5, 0.5, 0.5, 0.5],
];

const KELVIN: &[[f64; 6]] = &[
    [0.5, 0.25, 0.0, 0.25, 0.5, 0.0],
    [0.5, 0.25, 0.0, 0.75, 0.5, 0.0],
    [0.5, 0.75, 0.0, 0.25, 0.5, 0.0],
    [0.5, 0.75, 0.0, 0.75, 0.5, 0.0],
    [0.5, 0.25, 1.0, 0.25, 0.5, 1.0],
    [0.5, 0.25, 1.0, 0.75, 0.5, 1.0],
    [0.5, 0.75, 1.0, 0.25, 0.5, 1.0],
    [0.5, 0.75, 1.0, 0.75, 0.5, 1.0],
    [0.5, 0.0, 0.25, 0.25, 0.0, 0.5],
    [0.5, 0.0, 0.25, 0.75, 0.0, 0.5],
    [0.5, 0.0, 0.75, 0.25, 0.0, 0.5],
    [0.5, 0.0, 0.75, 0.75, 0.0, 0.5],
    [0.5, 1.0, 0.25, 0.25, 1.0, 0.5],
    [0.5, 1.0, 0.25, 0.75, 1.0, 0.5],
    [0.5, 1.0, 0.75, 0.25, 1.0, 0.5],
    [0.5, 1.0, 0.75, 0.75, 1.0, 0.5],
    [0.0, 0.5, 0.25, 0.0, 0.25, 0.5],
    [0.0, 0.5, 0.25, 0.0, 0.75, 0.5],
    [0.0, 0.5, 0.75, 0.0, 0.25, 0.5],
    [0.0, 0.5, 0.75, 0.0, 0.75, 0.5],
    [1.0, 0.5, 0.25, 1.0, 0.25, 0.5],
    [1.0, 0.5, 0.25, 1.0, 0.75, 0.5],
    [1.0, 0.5, 0.75, 1.0, 0.25, 0.5],
    [1.0, 0.5, 0.75, 1.0, 0.75, 0.5],
    [0.5, 0.25, 0.0, 0.5, 0.0, 0.25],
    [0.25, 0.5, 0.0, 0.0, 0.5, 0.25],
    [0.75, 0.5, 0.0, 1.0, 0.5, 0.25],
    [0.5, 0.75, 0.0, 0.5, 1.0, 0.25],
    [0.25, 0.0, 0.5, 0.0, 0.25, 0.5],
    [0.75, 0.0, 0.5, 1.0, 0.25, 0.5],
    [0.75, 1.0, 0.5, 1.0, 0.75, 0.5],
    [0.25, 1.0, 0.5, 0.0, 0.75, 0.5],
    [0.5, 0.0, 0.75, 0.5, 0.25, 1.0],
    [0.0, 0.5, 0.75, 0.25, 0.5, 1.0],
    [0.5, 1.0, 0.75, 0.5, 0.75, 1.0],
    [1.0, 0.5, 0.75, 0.75, 0.5, 1.0],
];

const CUBIC_V2: &[[f64; 6]] = &[
    [0.5, 0.0, 0.5, 0.5, 0.5, 0.5],
    [0.0, 0.5, 0.5, 0.5, 0.5, 0.5],
    [0.5, 1.0, 0.5, 0.5, 0.5, 0.5],
    [1.0, 0.5, 0.5, 0.5, 0.5, 0.5],
    [0.5, 0.5, 0.0, 0.5, 0.5, 0.5],
    [0.5, 0.5, 1.0, 0.5, 0.5, 0.5],
];

const CUBIC_V3: &[[f64; 6]] = &[
    [0.0, 0.0, 0.0, 0.5, 0.0, 0.0],
    [0.5, 0.0, 0.0, 1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.5, 1.0, 0.0],
    [0.5, 1.0, 0.0, 1.0, 1.0, 0.0],
    [0.5, 0.0, 0.0, 0.5, 1.0, 0.0],
    [0.0, 0.0, 1.0, 0.5, 0.0, 1.0],
    [0.5, 0.0, 1.0, 1.0, 0.0, 1.0],
    [0.0, 1.0, 1.0, 0.5, 1.0, 1.0],
    [0.5, 1.0, 1.0, 1.0, 1.0, 1.0],
    [0.5, 0.0, 1.0, 0.5, 1.0, 1.0],
    [0.5, 0.0, 0.0, 0.5, 0.0, 1.0],
    [0.5, 1.0, 0.0, 0.5, 1.0, 1.0],
];

const CUBIC_V4: &[[f64; 6]] = &[
    [0.5, 0.0, 0.0, 0.5, 0.5, 0.0],
    [0.0, 0.5, 0.0, 0.5, 0.5, 0.0],
    [0.5, 1.0, 0.0, 0.5, 0.5, 0.0],
    [1.0, 0.5, 0.0, 0.5, 0.5, 0.0],
    [0.5, 0.0, 1.0, 0.5, 0.5, 1.0],
    [0.0, 0.5, 1.0, 0.5, 0.5, 1.0],
    [0.5, 1.0, 1.0, 0.5, 0.5, 1.0],
    [1.0, 0.5, 1.0, 0.5, 0.5, 1.0],
    [0.5, 0.5, 0.0, 0.5, 0.5, 1.0],
];

const DIAMOND: &[[f64; 6]] = &[
    [0.0, 0.0, 0.0, 0.25, 0.25, 0.25],
    [0.25, 0.25, 0.25, 0.5, 0.5, 0.0],
    [0.25, 0.25, 0.25, 0.0, 0.5, 0.5],
    [0.25, 0.25, 0.25, 0.5, 0.0, 0.5],
    [1.0, 0.0, 0.0, 0.75, 0.25, 0.25],
    [0.75, 0.25, 0.25, 0.5, 0.5, 0.0],
    [0.75, 0.25, 0.25, 1.0, 0.5, 0.5],
    [0.75, 0.25, 0.25, 0.5, 0.0, 0.5],
    [1.0, 1.0, 0.0, 0.75, 0.75, 0.25],
    [0.75, 0.75, 0.25, 0.5, 0.5, 0.0],
    [0.75, 0.75, 0.25, 1.0, 0.5, 0.5],
    [0.75, 0.75, 0.25, 0.5, 1.0, 0.5],
    [0.0, 1.0, 0.0, 0.25, 0.75, 0.25],
    [0.25, 0.75, 0.25, 0.5, 0.5, 0.0],
    [0.25, 0.75, 0.25, 0.0, 0.5, 0.5],
    [0.25, 0.75, 0.25, 0.5, 1.0, 0.5],
    [0.0, 0.0, 1.0, 0.25, 0.25, 0.75],
    [0.25, 0.25, 0.75, 0.5, 0.5, 1.0],
    [0.25, 0.25, 0.75, 0.0, 0.5, 0.5],
    [0.25, 0.25, 0.75, 0.5, 0.0, 0.5],
    [1.0, 0.0, 1.0, 0.75, 0.25, 0.75],
    [0.75, 0.25, 0.75, 0.5, 0.5, 1.0],
    [0.75, 0.25, 0.75, 1.0, 0.5, 0.5],
    [0.75, 0.25, 0.75, 0.5, 0.0, 0.5],
    [1.0, 1.0, 1.0, 0.75, 0.75, 0.75],
    [0.75, 0.75, 0.75, 0.5, 0.5, 1.0],
    [0.75, 0.75, 0.75, 1.0, 0.5, 0.5],
    [0.75, 0.75, 0.75, 0.5, 1.0, 0.5],
    [0.0, 1.0, 1.0, 0.25, 0.75, 0.75],
    [0.25, 0.75, 0.75, 0.5, 0.5, 1.0],
    [0.25, 0.75, 0.75, 0.0, 0.5, 0.5],
    [0.25, 0.75, 0.75, 0.5, 1.0, 0.5],
];

/// Reentrant-profile template. The two shape constants control the notch
/// angle (degrees) and the waist height of the profile.
const AUXETIC_ANGLE_DEG: f64 = 20.0;
const AUXETIC_H: f64 = 0.35;

fn auxetic_segments() -> Vec<Segment> {
    let h = AUXETIC_H;
    let val = h - (AUXETIC_ANGLE_DEG * std::f64::consts::PI / 180.0).tan() / 2.0;
    let rows: Vec<[f64; 6]> = vec![
        [0.5, 0.0, 0.0, 0.5, 0.0, h],
        [0.5, 0.0, 1.0, 0.5, 0.0, 1.0 - h],
        [0.0, 0.0, val, 0.0, 0.0, 1.0 - val],
        [1.0, 0.0, val, 1.0, 0.0, 1.0 - val],
        [0.0, 0.0, val, 0.5, 0.0, h],
        [0.0, 0.0, 1.0 - val, 0.5, 0.0, 1.0 - h],
        [1.0, 0.0, 1.0 - val, 0.5, 0.0, 1.0 - h],
        [1.0, 0.0, val, 0.5, 0.0, h],
        [0.5, 1.0, 0.0, 0.5, 1.0, h],
        [0.5, 1.0, 1.0, 0.5, 1.0, 1.0 - h],
        [0.0, 1.0, val, 0.0, 1.0, 1.0 - val],
        [1.0, 1.0, val, 1.0, 1.0, 1.0 - val],
        [0.0, 1.0, val, 0.5, 1.0, h],
        [0.0, 1.0, 1.0 - val, 0.5, 1.0, 1.0 - h],
        [1.0, 1.0, 1.0 - val, 0.5, 1.0, 1.0 - h],
        [1.0, 1.0, val, 0.5, 1.0, h],
        [1.0, 0.0, val, 1.0, 0.5, h],
        [1.0, 1.0, val, 1.0, 0.5, h],
        [1.0, 0.5, 0.0, 1.0, 0.5, h],
        [1.0, 0.5, 1.0 - h, 1.0, 1.0, 1.0 - val],
        [1.0, 0.5, 1.0 - h, 1.0, 0.0, 1.0 - val],
        [1.0, 0.5, 1.0 - h, 1.0, 0.5, 1.0],
        [0.0, 0.0, val, 0.0, 0.5, h],
        [0.0, 1.0, val, 0.0, 0.5, h],
        [0.0, 0.5, 0.0, 0.0, 0.5, h],
        [0.0, 0.5, 1.0 - h, 0.0, 1.0, 1.0 - val],
        [0.0, 0.5, 1.0 - h, 0.0, 0.0, 1.0 - val],
        [0.0, 0.5, 1.0 - h, 0.0, 0.5, 1.0],
    ];
    rows.iter().map(to_segment).collect()
}

fn to_segment(row: &[f64; 6]) -> Segment {
    ([row[0], row[1], row[2]], [row[3], row[4], row[5]])
}

/// Returns the human-readable name of a template id, if it exists.
pub fn template_name(id: i32) -> Option<&'static str> {
    usize::try_from(id).ok().and_then(|i| TEMPLATE_NAMES.get(i).copied())
}

/// Number of known templates.
pub fn template_count() -> usize {
    TEMPLATE_NAMES.len()
}

/// Resolves a requested template id into a concrete one, drawing a random
/// known template for [`RANDOM_TEMPLATE_ID`].
pub fn resolve_template_id<R: Rng>(id: i32, rng: &mut R) -> Result<i32, PerovskiteError> {
    if id == RANDOM_TEMPLATE_ID {
        return Ok(rng.gen_range(0..TEMPLATE_NAMES.len() as i32));
    }
    if template_name(id).is_none() {
        return Err(PerovskiteError::Input(format!(
            "Unknown geometry template id {}",
            id
        )));
    }
    Ok(id)
}

/// Returns the normalized segment list defining one unit cell of the given
/// template.
///
/// # Arguments
/// * `id` - A concrete template id (random ids must be resolved first)
///
/// # Returns
/// The template's segments as normalized endpoint pairs
pub fn template_segments(id: i32) -> Result<Vec<Segment>, PerovskiteError> {
    let rows: &[[f64; 6]] = match id {
        0 => BCC,
        1 => OCTET,
        2 => OCTET_EXT,
        3 => OCTET_INT,
        4 => BCCZ,
        5 => CUBIC,
        6 => OCTAHEDRON_Z,
        7 => OCTAHEDRON_Z_CROSS,
        8 => KELVIN,
        9 => CUBIC_V2,
        10 => CUBIC_V3,
        11 => CUBIC_V4,
        12 => DIAMOND,
        13 => return Ok(auxetic_segments()),
        _ => {
            return Err(PerovskiteError::Input(format!(
                "Unknown geometry template id {}",
                id
            )))
        }
    };
    Ok(rows.iter().map(to_segment).collect())
}
