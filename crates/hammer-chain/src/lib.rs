#![deny(missing_docs)]

//! Likelihood computation chains assembled from pluggable core and likelihood
//! modules, plus the versioned descriptor used to decide whether a run may be
//! continued.

mod build;
mod chain;
/// Chain descriptor schema and YAML persistence.
pub mod descriptor;
mod hash;

pub use build::{build_computation_chain, ModuleList};
pub use chain::LikelihoodComputationChain;
pub use descriptor::{descriptor_path, ChainDescriptor, DESCRIPTOR_SCHEMA};
pub use hash::{stable_hash_string, to_canonical_json_bytes};
