//! Helpers shared by the unit tests: throwaway install and template trees
//! plus scripted command runners.
mod common;
mod mock;

pub use common::*;
pub use mock::*;
