//! Parametric beam-lattice structures for additive-manufacturing design,
//! prepared for a domain-decomposition elasticity solve.
//!
//! The pipeline instantiates per-cell geometry templates into a globally
//! deduplicated beam-and-node graph, classifies every node against the
//! structure's bounding geometry, builds neighbor topology (optionally
//! periodic), optionally rewrites beams for joint-angle penalization, and
//! assembles the per-cell reduced coupling operators into a factorized
//! global preconditioner for an external conjugate-gradient loop.

pub mod assembly;
pub mod beam;
pub mod cell;
pub mod config;
pub mod error;
pub mod export;
pub mod geometry;
pub mod gradient;
pub mod lattice;
pub mod node;
