use std::path::{Path, PathBuf};

/// The two sibling files of an IR model: graph topology and binary weights.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelArtifact {
    pub topology: PathBuf,
    pub weights: PathBuf,
}

impl ModelArtifact {
    /// Weights live next to the topology with the extension swapped for `bin`.
    pub fn from_topology(topology: impl Into<PathBuf>) -> Self {
        let topology = topology.into();
        let weights = topology.with_extension("bin");
        Self { topology, weights }
    }

    pub fn topology(&self) -> &Path {
        &self.topology
    }

    pub fn weights(&self) -> &Path {
        &self.weights
    }
}
