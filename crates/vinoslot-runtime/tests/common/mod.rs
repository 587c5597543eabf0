#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use vinoslot_core::{
    BackendError, Device, ExecutableNetwork, IOName, InferRequest, Network, Plugin,
    RequestStatus, Shape, Tensor,
};

pub const DEFAULT_REQUESTS: usize = 2;

thread_local! {
    static DROPPED: Cell<usize> = const { Cell::new(0) };
    static LIVE_NETWORKS: Cell<usize> = const { Cell::new(0) };
}

/// Plugins dropped on the current test thread.
pub fn dropped_plugins() -> usize {
    DROPPED.with(Cell::get)
}

/// Compiled networks alive on the current test thread.
pub fn live_networks() -> usize {
    LIVE_NETWORKS.with(Cell::get)
}

pub fn model(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../models")
        .join(name)
}

pub fn input(shape: &[usize], values: &[f32]) -> Tensor {
    Tensor::from_f32(Shape::from_slice(shape), values)
}

/// In-memory plugin: supports a fixed set of operator kinds and computes
/// `relu(input)` for every output.
pub struct ScriptedPlugin {
    device: Device,
    supported: RefCell<BTreeSet<String>>,
    pub extensions: RefCell<Vec<PathBuf>>,
    pub requested: Cell<Option<Option<NonZeroUsize>>>,
    /// Bounded waits that report not-ready before a request completes.
    pub pending_polls: usize,
    pub bounded_waits: bool,
    /// Networks that were still alive when the last compile started.
    pub live_at_compile: Cell<Option<usize>>,
}

impl ScriptedPlugin {
    pub fn new(device: &str) -> Self {
        Self {
            device: device.parse().expect("device"),
            supported: RefCell::new(
                ["Parameter", "Result", "Relu", "Sigmoid"]
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            ),
            extensions: RefCell::new(Vec::new()),
            requested: Cell::new(None),
            pending_polls: 0,
            bounded_waits: true,
            live_at_compile: Cell::new(None),
        }
    }

    pub fn with_pending_polls(mut self, polls: usize) -> Self {
        self.pending_polls = polls;
        self
    }

    pub fn without_bounded_waits(mut self) -> Self {
        self.bounded_waits = false;
        self
    }
}

impl Drop for ScriptedPlugin {
    fn drop(&mut self) {
        DROPPED.with(|d| d.set(d.get() + 1));
    }
}

impl Plugin for ScriptedPlugin {
    type Executable = ScriptedNetwork;

    fn create(device: &Device) -> Result<Self, BackendError> {
        if device.as_str() == "BROKEN" {
            return Err(BackendError::new("scripted", "no such device"));
        }
        Ok(Self::new(device.as_str()))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn device(&self) -> &Device {
        &self.device
    }

    /// The library's file stem names the operator it provides.
    fn add_extension(&self, path: &Path) -> Result<(), BackendError> {
        let kind = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| BackendError::new("scripted", "bad extension path"))?;
        self.supported.borrow_mut().insert(kind.to_string());
        self.extensions.borrow_mut().push(path.to_path_buf());
        Ok(())
    }

    fn supported_operators(&self, network: &Network) -> Result<BTreeSet<String>, BackendError> {
        let supported = self.supported.borrow();
        Ok(network
            .operator_kinds()
            .into_iter()
            .filter(|k| supported.contains(k))
            .collect())
    }

    fn load_network(
        &self,
        network: &Network,
        requests: Option<NonZeroUsize>,
    ) -> Result<ScriptedNetwork, BackendError> {
        self.requested.set(Some(requests));
        self.live_at_compile.set(Some(live_networks()));
        if network.name == "uncompilable" {
            return Err(BackendError::new("scripted", "compile failed"));
        }
        LIVE_NETWORKS.with(|n| n.set(n.get() + 1));
        let count = requests.map_or(DEFAULT_REQUESTS, NonZeroUsize::get);
        let outputs: Vec<IOName> = network.outputs.iter().map(|o| o.name.clone()).collect();
        Ok(ScriptedNetwork {
            requests: (0..count)
                .map(|_| ScriptedRequest {
                    outputs: outputs.clone(),
                    pending: None,
                    results: HashMap::new(),
                    polls_left: 0,
                    pending_polls: self.pending_polls,
                    bounded_waits: self.bounded_waits,
                    starts: 0,
                })
                .collect(),
        })
    }
}

pub struct ScriptedNetwork {
    pub requests: Vec<ScriptedRequest>,
}

impl Drop for ScriptedNetwork {
    fn drop(&mut self) {
        LIVE_NETWORKS.with(|n| n.set(n.get() - 1));
    }
}

impl ExecutableNetwork for ScriptedNetwork {
    type Request = ScriptedRequest;

    fn request_count(&self) -> usize {
        self.requests.len()
    }

    fn request(&mut self, idx: usize) -> Option<&mut ScriptedRequest> {
        self.requests.get_mut(idx)
    }
}

pub struct ScriptedRequest {
    outputs: Vec<IOName>,
    pending: Option<Tensor>,
    results: HashMap<IOName, Tensor>,
    polls_left: usize,
    pending_polls: usize,
    bounded_waits: bool,
    pub starts: usize,
}

impl InferRequest for ScriptedRequest {
    fn start_async(&mut self, inputs: Vec<(IOName, Tensor)>) -> Result<(), BackendError> {
        let (_, tensor) = inputs
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::new("scripted", "no input bound"))?;
        if tensor.data.is_empty() {
            return Err(BackendError::new("scripted", "rejected empty input"));
        }
        self.pending = Some(tensor);
        self.results.clear();
        self.polls_left = self.pending_polls;
        self.starts += 1;
        Ok(())
    }

    fn wait(&mut self, timeout: Option<Duration>) -> Result<RequestStatus, BackendError> {
        if timeout.is_some() && self.polls_left > 0 {
            self.polls_left -= 1;
            return Ok(RequestStatus::ResultNotReady);
        }
        let Some(input) = self.pending.take() else {
            return Ok(RequestStatus::InferNotStarted);
        };
        let values = input
            .to_f32_vec()
            .ok_or_else(|| BackendError::new("scripted", "expected f32 input"))?;
        let relu: Vec<f32> = values.iter().map(|v| v.max(0.0)).collect();
        for name in &self.outputs {
            self.results.insert(
                name.clone(),
                Tensor::from_f32(input.desc.shape.clone(), &relu),
            );
        }
        Ok(RequestStatus::Ok)
    }

    fn supports_bounded_wait(&self) -> bool {
        self.bounded_waits
    }

    fn output(&mut self, name: &IOName) -> Result<Tensor, BackendError> {
        self.results
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::new("scripted", format!("no result for {name}")))
    }
}
