use clap::Parser;

use perovskite::error::PerovskiteError;
use perovskite::lattice::Lattice;
use perovskite::{config, export};

/// Build a parametric beam-lattice structure from a json description and
/// export its node and beam lists.
#[derive(Parser)]
#[command(name = "perovskite")]
struct Args {
    /// Input json describing geometry, gradients and boundary conditions
    input: String,

    /// Output csv for the node list
    #[arg(long, default_value = "nodes.csv")]
    nodes_output: String,

    /// Output csv for the beam list
    #[arg(long, default_value = "beams.csv")]
    beams_output: String,
}

fn run(args: &Args) -> Result<(), PerovskiteError> {
    let input_json = config::load_input_file(&args.input)?;
    let params = config::parse_params(&input_json)?;
    let rules = config::parse_boundary_rules(&input_json)?;

    let mut lattice = Lattice::build(params)?;

    for rule in &rules {
        println!("info: applying boundary rule {}", rule.name);
        if rule.is_force {
            lattice.apply_force_on_surfaces(&rule.surfaces, &rule.values, &rule.dofs)?;
        } else {
            lattice.apply_displacement_on_surfaces(&rule.surfaces, &rule.values, &rule.dofs)?;
        }
    }

    if !rules.is_empty() {
        let free_dof = lattice.assign_free_dof_indices();
        println!("info: {} free degrees of freedom", free_dof);
    }

    lattice.print_statistics();
    export::csv_output(&lattice, &args.nodes_output, &args.beams_output)?;

    Ok(())
}

fn main() {
    let args = Args::parse();

    if let Err(err) = run(&args) {
        println!("{}", err);
        std::process::exit(1)
    }
}
