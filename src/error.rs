use std::fmt::Display;

#[derive(Debug)]
pub enum PerovskiteError {
    Input(String),
    Geometry(String),
    Topology(String),
    Solver(String),
}

impl Display for PerovskiteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (err_name, value) = match self {
            PerovskiteError::Input(v) => ("Input", v),
            PerovskiteError::Geometry(v) => ("Geometry", v),
            PerovskiteError::Topology(v) => ("Topology", v),
            PerovskiteError::Solver(v) => ("Solver", v),
        };

        write!(f, "{} error: {}", err_name, value)
    }
}

impl std::error::Error for PerovskiteError {}
