use std::io::Write;

use crate::{error::PerovskiteError, lattice::Lattice};

/// Writes the flat node and beam lists to two CSV files.
///
/// Nodes are written as `index,x,y,z` and beams as `index,p1,p2,type`,
/// ordered by global index, for downstream meshing or visualization tools.
///
/// # Arguments
/// * `lattice` - The lattice to export
/// * `nodes_output` - The filename of the output nodes csv
/// * `beams_output` - The filename of the output beams csv
pub fn csv_output(
    lattice: &Lattice,
    nodes_output: &str,
    beams_output: &str,
) -> Result<(), PerovskiteError> {
    let mut nodes_file = match std::fs::File::create(nodes_output) {
        Ok(f) => f,
        Err(err) => {
            return Err(PerovskiteError::Input(format!(
                "Failed to create {}: {}",
                nodes_output, err
            )));
        }
    };
    let mut beams_file = match std::fs::File::create(beams_output) {
        Ok(f) => f,
        Err(err) => {
            return Err(PerovskiteError::Input(format!(
                "Failed to create {}: {}",
                beams_output, err
            )));
        }
    };

    let write_failure =
        |err: std::io::Error| PerovskiteError::Input(format!("Failed to write csv: {}", err));

    // Write nodes
    nodes_file
        .write_all("index,x,y,z\n".as_bytes())
        .map_err(write_failure)?;
    for (index, [x, y, z]) in lattice.node_positions() {
        nodes_file
            .write_all(format!("{},{},{},{}\n", index, x, y, z).as_bytes())
            .map_err(write_failure)?;
    }

    // Write beams
    beams_file
        .write_all("index,p1,p2,type\n".as_bytes())
        .map_err(write_failure)?;
    for (index, p1, p2, type_id) in lattice.beam_connectivity() {
        beams_file
            .write_all(format!("{},{},{},{}\n", index, p1, p2, type_id).as_bytes())
            .map_err(write_failure)?;
    }

    println!(
        "info: wrote output to {} and {}",
        nodes_output, beams_output
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exports_match_structure_counts() {
        let lattice = Lattice::simple([1.0, 1.0, 1.0], [1, 1, 1], 5, 0.1).unwrap();
        let dir = std::env::temp_dir();
        let nodes_path = dir.join("perovskite_nodes_test.csv");
        let beams_path = dir.join("perovskite_beams_test.csv");
        csv_output(
            &lattice,
            nodes_path.to_str().unwrap(),
            beams_path.to_str().unwrap(),
        )
        .unwrap();

        let nodes = std::fs::read_to_string(&nodes_path).unwrap();
        let beams = std::fs::read_to_string(&beams_path).unwrap();
        assert_eq!(nodes.lines().count(), lattice.node_count() + 1);
        assert_eq!(beams.lines().count(), lattice.beam_count() + 1);
        assert!(nodes.starts_with("index,x,y,z"));
        assert!(beams.starts_with("index,p1,p2,type"));

        std::fs::remove_file(nodes_path).ok();
        std::fs::remove_file(beams_path).ok();
    }
}
