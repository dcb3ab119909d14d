// Adapters layer: concrete implementations of the domain ports backed by
// external programs and HTTP APIs.

pub mod compose;
pub mod git;
pub mod nexus;
pub mod podman;
pub mod process;
pub mod script;
