use std::collections::BTreeSet;
use std::fmt;

use crate::{DType, ModelArtifact, Shape};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IOName(pub String);

impl IOName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IOName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IOName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorSpec {
    pub name: IOName,
    pub dtype: DType,
    pub rank: usize,
    pub dims: Vec<Option<usize>>, // None = dynamic
}

impl TensorSpec {
    /// Declared shape with dynamic dimensions reported as 0.
    pub fn shape(&self) -> Shape {
        Shape(self.dims.iter().map(|d| d.unwrap_or(0)).collect())
    }

    pub fn is_static(&self) -> bool {
        self.dims.iter().all(Option::is_some)
    }
}

/// One node of the model graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerSpec {
    pub id: String,
    pub name: String,
    /// Operator type, e.g. `Convolution` or `Relu`.
    pub kind: String,
    /// Operator set the kind belongs to, e.g. `opset8`. Custom operators
    /// carry a non-standard set name.
    pub version: Option<String>,
    /// 0 for the top-level graph, 1 inside a `TensorIterator`/`Loop` body,
    /// and so on.
    pub depth: usize,
}

impl LayerSpec {
    pub fn is_standard_opset(&self) -> bool {
        self.version
            .as_deref()
            .and_then(|v| v.strip_prefix("opset"))
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
    }
}

/// Parsed network representation: what the topology declares, before any
/// device has compiled it.
#[derive(Clone, Debug)]
pub struct Network {
    pub name: String,
    pub artifact: ModelArtifact,
    /// Every layer, sub-graph bodies included.
    pub layers: Vec<LayerSpec>,
    /// In declaration order.
    pub inputs: Vec<TensorSpec>,
    /// In declaration order.
    pub outputs: Vec<TensorSpec>,
}

impl Network {
    /// Distinct operator kinds used by the network.
    pub fn operator_kinds(&self) -> BTreeSet<String> {
        self.layers.iter().map(|l| l.kind.clone()).collect()
    }

    pub fn input(&self, name: &IOName) -> Option<&TensorSpec> {
        self.inputs.iter().find(|s| &s.name == name)
    }

    pub fn output(&self, name: &IOName) -> Option<&TensorSpec> {
        self.outputs.iter().find(|s| &s.name == name)
    }

    pub fn input_index(&self, name: &IOName) -> Option<usize> {
        self.inputs.iter().position(|s| &s.name == name)
    }

    pub fn output_index(&self, name: &IOName) -> Option<usize> {
        self.outputs.iter().position(|s| &s.name == name)
    }
}
