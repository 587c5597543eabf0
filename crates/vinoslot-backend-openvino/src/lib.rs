use std::cell::RefCell;
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use openvino::{CompiledModel, Core, DeviceType, ElementType};
use tracing::{debug, warn};
use vinoslot_core::{
    BackendError, DType, Device, ExecutableNetwork, IOName, InferRequest, Network, Plugin,
    RequestStatus, Shape, Tensor, TensorSpec,
};

const NAME: &str = "openvino";

/// Requests created when the caller leaves the count to the backend.
const DEFAULT_REQUESTS: usize = 1;

/// The bindings only expose a bounded wait, so "forever" is the longest one
/// the runtime accepts (about 49 days).
const WAIT_FOREVER_MS: i64 = u32::MAX as i64;

pub struct OpenVinoPlugin {
    core: RefCell<Core>,
    device: Device,
    extensions: RefCell<Vec<PathBuf>>,
}

impl OpenVinoPlugin {
    pub fn extensions(&self) -> Vec<PathBuf> {
        self.extensions.borrow().clone()
    }
}

impl Plugin for OpenVinoPlugin {
    type Executable = OpenVinoNetwork;

    fn create(device: &Device) -> Result<Self, BackendError> {
        let core = Core::new()
            .map_err(|e| BackendError::with_source(NAME, "failed to create OpenVINO core", e))?;
        Ok(Self {
            core: RefCell::new(core),
            device: device.clone(),
            extensions: RefCell::new(Vec::new()),
        })
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn device(&self) -> &Device {
        &self.device
    }

    /// CPU kernels for custom layers ship inside the CPU plugin since
    /// OpenVINO 2022.1, so the library is only checked and recorded. Once
    /// one is registered, layers from non-standard opsets are accepted.
    fn add_extension(&self, path: &Path) -> Result<(), BackendError> {
        std::fs::metadata(path).map_err(|e| {
            BackendError::with_source(
                NAME,
                format!("extension {} is not readable", path.display()),
                e,
            )
        })?;
        warn!(
            path = %path.display(),
            "CPU extension libraries are built into the CPU plugin; recording only"
        );
        self.extensions.borrow_mut().push(path.to_path_buf());
        Ok(())
    }

    fn supported_operators(&self, network: &Network) -> Result<BTreeSet<String>, BackendError> {
        Ok(supported_kinds(network, !self.extensions.borrow().is_empty()))
    }

    fn load_network(
        &self,
        network: &Network,
        requests: Option<NonZeroUsize>,
    ) -> Result<OpenVinoNetwork, BackendError> {
        let topology = path_str(&network.artifact.topology)?;
        let weights = path_str(&network.artifact.weights)?;

        let mut core = self.core.borrow_mut();
        let model = core
            .read_model_from_file(topology, weights)
            .map_err(|e| BackendError::with_source(NAME, "failed to read model", e))?;
        let mut compiled = core
            .compile_model(&model, DeviceType::from(self.device.as_str()))
            .map_err(|e| {
                BackendError::with_source(
                    NAME,
                    format!("failed to compile model for {}", self.device),
                    e,
                )
            })?;

        let count = requests.map_or(DEFAULT_REQUESTS, NonZeroUsize::get);
        let inputs: Vec<IOName> = network.inputs.iter().map(|s| s.name.clone()).collect();
        let mut slots = Vec::with_capacity(count);
        for _ in 0..count {
            let request = compiled
                .create_infer_request()
                .map_err(|e| BackendError::with_source(NAME, "failed to create infer request", e))?;
            slots.push(OpenVinoRequest {
                request,
                inputs: inputs.clone(),
                outputs: network.outputs.clone(),
                started: false,
            });
        }
        debug!(network = %network.name, requests = count, "compiled model");

        Ok(OpenVinoNetwork {
            requests: slots,
            _compiled: compiled,
        })
    }
}

pub struct OpenVinoNetwork {
    requests: Vec<OpenVinoRequest>,
    _compiled: CompiledModel,
}

impl ExecutableNetwork for OpenVinoNetwork {
    type Request = OpenVinoRequest;

    fn request_count(&self) -> usize {
        self.requests.len()
    }

    fn request(&mut self, idx: usize) -> Option<&mut OpenVinoRequest> {
        self.requests.get_mut(idx)
    }
}

pub struct OpenVinoRequest {
    request: openvino::InferRequest,
    inputs: Vec<IOName>,
    outputs: Vec<TensorSpec>,
    started: bool,
}

impl InferRequest for OpenVinoRequest {
    fn start_async(&mut self, inputs: Vec<(IOName, Tensor)>) -> Result<(), BackendError> {
        for (name, tensor) in inputs {
            let idx = self
                .inputs
                .iter()
                .position(|n| n == &name)
                .ok_or_else(|| BackendError::new(NAME, format!("unknown input `{name}`")))?;
            let value = tensor_to_ov(&tensor)?;
            self.request
                .set_input_tensor_by_index(idx, &value)
                .map_err(|e| BackendError::with_source(NAME, format!("failed to bind `{name}`"), e))?;
        }
        self.request
            .infer_async()
            .map_err(|e| BackendError::with_source(NAME, "failed to start inference", e))?;
        self.started = true;
        Ok(())
    }

    fn wait(&mut self, timeout: Option<Duration>) -> Result<RequestStatus, BackendError> {
        if !self.started {
            return Ok(RequestStatus::InferNotStarted);
        }
        if timeout.is_some() {
            return Err(BackendError::new(
                NAME,
                "bounded waits cannot report an elapsed timeout",
            ));
        }
        self.request
            .wait(WAIT_FOREVER_MS)
            .map_err(|e| BackendError::with_source(NAME, "inference failed", e))?;
        self.started = false;
        Ok(RequestStatus::Ok)
    }

    /// `InferRequest::wait` returns `Ok(())` whether the request finished or
    /// the timeout ran out.
    fn supports_bounded_wait(&self) -> bool {
        false
    }

    fn output(&mut self, name: &IOName) -> Result<Tensor, BackendError> {
        let (idx, spec) = self
            .outputs
            .iter()
            .enumerate()
            .find(|(_, s)| &s.name == name)
            .ok_or_else(|| BackendError::new(NAME, format!("unknown output `{name}`")))?;
        let value = self
            .request
            .get_output_tensor_by_index(idx)
            .map_err(|e| BackendError::with_source(NAME, format!("failed to fetch `{name}`"), e))?;
        ov_to_tensor(&value, spec.dtype)
    }
}

/// Kinds the CPU plugin can run: everything from a standard `opsetN`, plus
/// custom-opset layers once an extension is registered.
fn supported_kinds(network: &Network, with_extensions: bool) -> BTreeSet<String> {
    network
        .layers
        .iter()
        .filter(|l| with_extensions || l.is_standard_opset())
        .map(|l| l.kind.clone())
        .collect()
}

fn path_str(path: &Path) -> Result<&str, BackendError> {
    path.to_str()
        .ok_or_else(|| BackendError::new(NAME, format!("non-UTF-8 path {}", path.display())))
}

fn dtype_to_element(dtype: DType) -> ElementType {
    match dtype {
        DType::F32 => ElementType::F32,
        DType::F16 => ElementType::F16,
        DType::I64 => ElementType::I64,
        DType::I32 => ElementType::I32,
        DType::U8 => ElementType::U8,
    }
}

fn tensor_to_ov(tensor: &Tensor) -> Result<openvino::Tensor, BackendError> {
    let expected = tensor.expected_byte_len();
    if tensor.byte_len() != expected {
        return Err(BackendError::new(
            NAME,
            format!(
                "input byte size mismatch: got {}, expected {expected}",
                tensor.byte_len()
            ),
        ));
    }

    let dims: Vec<i64> = tensor.desc.shape.dims().iter().map(|d| *d as i64).collect();
    let shape = openvino::Shape::new(&dims)
        .map_err(|e| BackendError::with_source(NAME, "invalid input shape", e))?;
    let mut value = openvino::Tensor::new(dtype_to_element(tensor.desc.dtype), &shape)
        .map_err(|e| BackendError::with_source(NAME, "failed to allocate input tensor", e))?;
    let buf = value
        .get_raw_data_mut()
        .map_err(|e| BackendError::with_source(NAME, "failed to map input tensor", e))?;
    copy_input(buf, &tensor.data)?;
    Ok(value)
}

fn copy_input(dst: &mut [u8], src: &[u8]) -> Result<(), BackendError> {
    if dst.len() != src.len() {
        return Err(BackendError::new(
            NAME,
            format!(
                "input tensor holds {} bytes, runtime allocated {}",
                src.len(),
                dst.len()
            ),
        ));
    }
    dst.copy_from_slice(src);
    Ok(())
}

fn ov_to_tensor(value: &openvino::Tensor, dtype: DType) -> Result<Tensor, BackendError> {
    let shape = value
        .get_shape()
        .map_err(|e| BackendError::with_source(NAME, "failed to read output shape", e))?;
    let dims: Vec<usize> = shape
        .get_dimensions()
        .iter()
        .map(|d| usize::try_from(*d).unwrap_or(0))
        .collect();
    let raw = value
        .get_raw_data()
        .map_err(|e| BackendError::with_source(NAME, "failed to map output tensor", e))?;

    let out = Tensor::from_cpu_bytes(dtype, Shape::from_slice(&dims), Bytes::copy_from_slice(raw));
    if out.byte_len() != out.expected_byte_len() {
        return Err(BackendError::new(
            NAME,
            format!(
                "output holds {} bytes, {} {dtype} elements expected",
                out.byte_len(),
                out.desc.shape.numel()
            ),
        ));
    }
    Ok(out)
}
