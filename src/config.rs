use json::JsonValue;

use crate::error::PerovskiteError;
use crate::gradient::{GradientProperty, GradientRule, MaterialRule};
use crate::lattice::{ErasedRegion, LatticeParams, Surface};

/// One named boundary-condition rule from the input file.
#[derive(Debug)]
pub struct BoundaryRule {
    pub name: String,
    pub surfaces: Vec<Surface>,
    pub values: Vec<f64>,
    pub dofs: Vec<usize>,
    pub is_force: bool,
}

/// Parses the input json into a JsonValue object
///
/// # Arguments
/// * `input_file` - The path to the input file
///
/// # Returns
/// A JsonValue object
pub fn load_input_file(input_file: &str) -> Result<JsonValue, PerovskiteError> {
    let file_string = match std::fs::read_to_string(input_file) {
        Ok(f) => f,
        Err(_err) => {
            return Err(PerovskiteError::Input(format!(
                "Unable to open input file {}",
                input_file
            )))
        }
    };

    let input_json = match json::parse(&file_string) {
        Ok(f) => f,
        Err(err) => {
            return Err(PerovskiteError::Input(format!(
                "Error in input file json: {}",
                err
            )))
        }
    };

    if !input_json.has_key("geometry") {
        return Err(PerovskiteError::Input(
            "Input json missing geometry field".to_string(),
        ));
    }

    Ok(input_json)
}

fn axis_triple_f64(value: &JsonValue, context: &str) -> Result<[f64; 3], PerovskiteError> {
    let mut triple = [0.0; 3];
    for (i, axis) in ["x", "y", "z"].iter().enumerate() {
        triple[i] = value[*axis].as_f64().ok_or_else(|| {
            PerovskiteError::Input(format!("Missing or bad {} field in {}", axis, context))
        })?;
    }
    Ok(triple)
}

fn axis_triple_usize(value: &JsonValue, context: &str) -> Result<[usize; 3], PerovskiteError> {
    let mut triple = [0; 3];
    for (i, axis) in ["x", "y", "z"].iter().enumerate() {
        triple[i] = value[*axis].as_usize().ok_or_else(|| {
            PerovskiteError::Input(format!("Missing or bad {} field in {}", axis, context))
        })?;
    }
    Ok(triple)
}

fn parse_gradient(value: &JsonValue, context: &str) -> Result<GradientProperty, PerovskiteError> {
    let rule_name = value["rule"].as_str().ok_or_else(|| {
        PerovskiteError::Input(format!("Missing rule field in {} gradient", context))
    })?;
    let rule = GradientRule::from_name(rule_name)?;

    let mut direction = [false; 3];
    let mut parameters = [0.0; 3];
    for axis in 0..3 {
        direction[axis] = value["direction"][axis].as_u32().unwrap_or(0) != 0;
        parameters[axis] = value["parameters"][axis].as_f64().unwrap_or(0.0);
    }
    Ok(GradientProperty {
        rule,
        direction,
        parameters,
    })
}

/// Parses lattice construction parameters from the input json.
///
/// # Arguments
/// * `input_json` - The input file as a JsonValue object
///
/// # Returns
/// A LatticeParams instance
pub fn parse_params(input_json: &JsonValue) -> Result<LatticeParams, PerovskiteError> {
    let geometry = &input_json["geometry"];
    if !geometry.has_key("cell_size") {
        return Err(PerovskiteError::Input(
            "Input json missing cell_size field in geometry section".to_string(),
        ));
    }
    if !geometry.has_key("number_of_cells") {
        return Err(PerovskiteError::Input(
            "Input json missing number_of_cells field in geometry section".to_string(),
        ));
    }
    if !geometry.has_key("geom_types") {
        return Err(PerovskiteError::Input(
            "Input json missing geom_types field in geometry section".to_string(),
        ));
    }
    if !geometry.has_key("radii") {
        return Err(PerovskiteError::Input(
            "Input json missing radii field in geometry section".to_string(),
        ));
    }

    let cell_size = axis_triple_f64(&geometry["cell_size"], "cell_size")?;
    let num_cells = axis_triple_usize(&geometry["number_of_cells"], "number_of_cells")?;

    let mut geom_types = Vec::new();
    for entry in geometry["geom_types"].members() {
        geom_types.push(entry.as_i32().ok_or_else(|| {
            PerovskiteError::Input("Non-integer value in geom_types".to_string())
        })?);
    }
    let mut radii = Vec::new();
    for entry in geometry["radii"].members() {
        radii.push(
            entry
                .as_f64()
                .ok_or_else(|| PerovskiteError::Input("Non-float value in radii".to_string()))?,
        );
    }

    let mut params = LatticeParams {
        cell_size,
        num_cells,
        geom_types,
        radii,
        grad_radius: None,
        grad_dim: None,
        material_rule: MaterialRule::Uniform,
        penalize_joints: false,
        node_uncertainty: 0.0,
        periodic: false,
        erased_regions: Vec::new(),
        inside_mesh: None,
        seed: 0,
    };

    if input_json.has_key("gradients") {
        let gradients = &input_json["gradients"];
        if gradients.has_key("radius") {
            params.grad_radius = Some(parse_gradient(&gradients["radius"], "radius")?);
        }
        if gradients.has_key("dimension") {
            params.grad_dim = Some(parse_gradient(&gradients["dimension"], "dimension")?);
        }
        if gradients.has_key("material") {
            let material = &gradients["material"];
            match material["rule"].as_str() {
                Some("uniform") | None => {}
                Some("layered") => {
                    let axis = material["axis"].as_usize().unwrap_or(2);
                    if axis > 2 {
                        return Err(PerovskiteError::Input(format!(
                            "Bad material layering axis {}",
                            axis
                        )));
                    }
                    params.material_rule = MaterialRule::Layered(axis);
                }
                Some(other) => {
                    return Err(PerovskiteError::Input(format!(
                        "Unknown material rule '{}'",
                        other
                    )))
                }
            }
        }
    }

    if input_json.has_key("simulation") {
        let simulation = &input_json["simulation"];
        params.penalize_joints = simulation["penalize_joints"].as_bool().unwrap_or(false);
        params.periodic = simulation["periodic"].as_bool().unwrap_or(false);
        params.node_uncertainty = simulation["node_uncertainty"].as_f64().unwrap_or(0.0);
        params.seed = simulation["seed"].as_u64().unwrap_or(0);
    }

    if input_json.has_key("erased_regions") {
        for region in input_json["erased_regions"].members() {
            let mut start = [0.0; 3];
            let mut size = [0.0; 3];
            for axis in 0..3 {
                start[axis] = region["start"][axis].as_f64().ok_or_else(|| {
                    PerovskiteError::Input("Bad start field in erased region".to_string())
                })?;
                size[axis] = region["size"][axis].as_f64().ok_or_else(|| {
                    PerovskiteError::Input("Bad size field in erased region".to_string())
                })?;
            }
            params.erased_regions.push(ErasedRegion { start, size });
        }
    }

    Ok(params)
}

/// Parses named boundary-condition rules from the input json.
///
/// # Arguments
/// * `input_json` - The input file as a JsonValue object
///
/// # Returns
/// The boundary rules, in file order
pub fn parse_boundary_rules(input_json: &JsonValue) -> Result<Vec<BoundaryRule>, PerovskiteError> {
    let mut rules = Vec::new();
    if !input_json.has_key("boundary_conditions") {
        return Ok(rules);
    }

    for (name, rule_json) in input_json["boundary_conditions"].entries() {
        if !rule_json.has_key("surfaces") {
            return Err(PerovskiteError::Input(format!(
                "Boundary rule {} is missing surfaces field",
                name
            )));
        }
        if !rule_json.has_key("values") {
            return Err(PerovskiteError::Input(format!(
                "Boundary rule {} is missing values field",
                name
            )));
        }
        if !rule_json.has_key("dofs") {
            return Err(PerovskiteError::Input(format!(
                "Boundary rule {} is missing dofs field",
                name
            )));
        }

        let mut surfaces = Vec::new();
        for surface in rule_json["surfaces"].members() {
            let surface_name = surface.as_str().ok_or_else(|| {
                PerovskiteError::Input(format!("Bad surface entry in rule {}", name))
            })?;
            surfaces.push(Surface::from_name(surface_name)?);
        }

        let mut values = Vec::new();
        for value in rule_json["values"].members() {
            values.push(value.as_f64().ok_or_else(|| {
                PerovskiteError::Input(format!("Non-float value in rule {}", name))
            })?);
        }
        let mut dofs = Vec::new();
        for dof in rule_json["dofs"].members() {
            dofs.push(dof.as_usize().ok_or_else(|| {
                PerovskiteError::Input(format!("Non-integer DOF in rule {}", name))
            })?);
        }

        if values.len() != dofs.len() {
            return Err(PerovskiteError::Input(format!(
                "Boundary rule {} has {} values for {} DOFs",
                name,
                values.len(),
                dofs.len()
            )));
        }

        let is_force = match rule_json["type"].as_str() {
            Some("Force") => true,
            Some("Displacement") | None => false,
            Some(other) => {
                return Err(PerovskiteError::Input(format!(
                    "Unknown boundary rule type '{}' in rule {}",
                    other, name
                )))
            }
        };

        rules.push(BoundaryRule {
            name: name.to_string(),
            surfaces,
            values,
            dofs,
            is_force,
        });
    }

    println!("info: loaded {} boundary rules from input file", rules.len());
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> JsonValue {
        json::parse(
            r#"{
                "geometry": {
                    "cell_size": {"x": 1.0, "y": 1.0, "z": 1.0},
                    "number_of_cells": {"x": 2, "y": 2, "z": 2},
                    "geom_types": [0],
                    "radii": [0.1]
                },
                "simulation": {"periodic": true, "seed": 7},
                "boundary_conditions": {
                    "pull": {
                        "surfaces": ["Xmin"],
                        "values": [-1.0],
                        "dofs": [0]
                    }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn parses_geometry_and_simulation_sections() {
        let params = parse_params(&sample_json()).unwrap();
        assert_eq!(params.num_cells, [2, 2, 2]);
        assert_eq!(params.geom_types, vec![0]);
        assert!(params.periodic);
        assert_eq!(params.seed, 7);
    }

    #[test]
    fn parses_boundary_rules() {
        let rules = parse_boundary_rules(&sample_json()).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "pull");
        assert_eq!(rules[0].surfaces, vec![Surface::Xmin]);
        assert!(!rules[0].is_force);
    }

    #[test]
    fn missing_sections_are_input_errors() {
        let bad = json::parse(r#"{"geometry": {"cell_size": {"x": 1.0}}}"#).unwrap();
        assert!(parse_params(&bad).is_err());

        let bad_rule = json::parse(
            r#"{
                "geometry": {
                    "cell_size": {"x": 1.0, "y": 1.0, "z": 1.0},
                    "number_of_cells": {"x": 1, "y": 1, "z": 1},
                    "geom_types": [0],
                    "radii": [0.1]
                },
                "boundary_conditions": {"bad": {"surfaces": ["Nowhere"], "values": [], "dofs": []}}
            }"#,
        )
        .unwrap();
        assert!(parse_boundary_rules(&bad_rule).is_err());
    }
}
