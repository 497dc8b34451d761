use crate::error::PerovskiteError;

/// Rule shaping a per-axis multiplier along the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradientRule {
    Constant,
    Linear,
    Parabolic,
    Sinusoidal,
    Exponential,
}

impl GradientRule {
    pub fn from_name(name: &str) -> Result<GradientRule, PerovskiteError> {
        match name {
            "constant" => Ok(GradientRule::Constant),
            "linear" => Ok(GradientRule::Linear),
            "parabolic" => Ok(GradientRule::Parabolic),
            "sinusoidal" => Ok(GradientRule::Sinusoidal),
            "exponential" => Ok(GradientRule::Exponential),
            _ => Err(PerovskiteError::Input(format!(
                "Unknown gradient rule '{}'",
                name
            ))),
        }
    }
}

/// One gradient specification: the rule, the axes it is active on, and the
/// per-axis rule parameter.
#[derive(Debug, Clone, Copy)]
pub struct GradientProperty {
    pub rule: GradientRule,
    pub direction: [bool; 3],
    pub parameters: [f64; 3],
}

/// Material assignment rule across the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialRule {
    /// Every cell gets material 0.
    Uniform,
    /// Material id equals the cell's layer index along the given axis.
    Layered(usize),
}

/// Per-axis multiplier table: one `[f64; 3]` row per grid index, consumed by
/// cell construction as `table[pos[axis]][axis]`.
pub type GradientTable = Vec<[f64; 3]>;

fn rule_value(rule: GradientRule, t: f64, param: f64) -> f64 {
    match rule {
        GradientRule::Constant => 1.0,
        GradientRule::Linear => 1.0 + param * t,
        GradientRule::Parabolic => 1.0 + param * t * t,
        GradientRule::Sinusoidal => 1.0 + param * (std::f64::consts::PI * t).sin(),
        GradientRule::Exponential => 1.0 + param * (t.exp() - 1.0),
    }
}

/// Evaluates a gradient property over the grid.
///
/// # Arguments
/// * `num_cells` - Grid dimensions along x, y, z
/// * `property` - The gradient rule to evaluate
///
/// # Returns
/// A table with `max(num_cells)` rows of per-axis multipliers
pub fn gradient_settings(num_cells: [usize; 3], property: &GradientProperty) -> GradientTable {
    let rows = num_cells.iter().copied().max().unwrap_or(1).max(1);
    let mut table = Vec::with_capacity(rows);
    for i in 0..rows {
        let mut row = [1.0; 3];
        for axis in 0..3 {
            if !property.direction[axis] || num_cells[axis] < 2 {
                continue;
            }
            let t = i as f64 / (num_cells[axis] - 1) as f64;
            row[axis] = rule_value(property.rule, t, property.parameters[axis]);
        }
        table.push(row);
    }
    table
}

/// All-ones multiplier table, the default when no gradient is requested.
pub fn constant_settings(num_cells: [usize; 3]) -> GradientTable {
    let rows = num_cells.iter().copied().max().unwrap_or(1).max(1);
    vec![[1.0; 3]; rows]
}

/// Evaluates the material rule over the grid, indexed `[z][y][x]`.
pub fn material_settings(num_cells: [usize; 3], rule: MaterialRule) -> Vec<Vec<Vec<usize>>> {
    let [nx, ny, nz] = num_cells;
    let mut table = vec![vec![vec![0usize; nx]; ny]; nz];
    if let MaterialRule::Layered(axis) = rule {
        for (k, layer) in table.iter_mut().enumerate() {
            for (j, row) in layer.iter_mut().enumerate() {
                for (i, mat) in row.iter_mut().enumerate() {
                    *mat = [i, j, k][axis];
                }
            }
        }
    }
    table
}
