//! QA harness for MariaDB Galera clusters.
//!
//! Provisions throwaway clusters from config templates, drives sysbench and
//! RQG workloads against them, takes nodes down and back up, and compares
//! per-table checksums across nodes.

mod cluster;
mod command;
mod config;
mod consistency;
pub(crate) mod constants;
mod errors;
mod materializer;
mod node;
mod scenario;
pub mod utils;
mod workload;

pub use cluster::*;
pub use command::*;
pub use config::*;
pub use consistency::*;
pub use errors::*;
pub use materializer::*;
pub use node::*;
pub use scenario::*;
pub use utils::*;
pub use workload::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
