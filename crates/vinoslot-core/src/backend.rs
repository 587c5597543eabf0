use std::collections::BTreeSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use crate::{ir, BackendError, Device, IOName, ModelArtifact, Network, Tensor};

/// Completion status of an inference request. Codes follow the inference
/// engine's status convention, `0` meaning success.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestStatus {
    Ok,
    GeneralError,
    ResultNotReady,
    InferNotStarted,
}

impl RequestStatus {
    pub fn code(self) -> i32 {
        match self {
            RequestStatus::Ok => 0,
            RequestStatus::GeneralError => -1,
            RequestStatus::ResultNotReady => -9,
            RequestStatus::InferNotStarted => -11,
        }
    }

    pub fn is_ok(self) -> bool {
        self == RequestStatus::Ok
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestStatus::Ok => "OK",
            RequestStatus::GeneralError => "GENERAL_ERROR",
            RequestStatus::ResultNotReady => "RESULT_NOT_READY",
            RequestStatus::InferNotStarted => "INFER_NOT_STARTED",
        };
        write!(f, "{name} ({})", self.code())
    }
}

/// A device-bound execution backend.
///
/// Methods take `&self` so one plugin can serve several sessions; backends
/// that need mutation keep it behind interior mutability. Nothing here is
/// required to be `Sync`.
pub trait Plugin: Sized {
    type Executable: ExecutableNetwork;

    fn create(device: &Device) -> Result<Self, BackendError>;

    fn name(&self) -> &'static str;

    fn device(&self) -> &Device;

    /// Registers a custom-operator library with the plugin.
    fn add_extension(&self, path: &Path) -> Result<(), BackendError>;

    fn read_network(&self, artifact: &ModelArtifact) -> Result<Network, BackendError> {
        Ok(ir::read_network(artifact)?)
    }

    /// Operator kinds this plugin can execute, out of those `network` uses.
    fn supported_operators(&self, network: &Network) -> Result<BTreeSet<String>, BackendError>;

    /// Compiles `network` for the plugin's device with `requests` parallel
    /// request slots; `None` lets the backend choose.
    fn load_network(
        &self,
        network: &Network,
        requests: Option<NonZeroUsize>,
    ) -> Result<Self::Executable, BackendError>;
}

/// A network compiled for one device, owning its request slots.
pub trait ExecutableNetwork {
    type Request: InferRequest;

    fn request_count(&self) -> usize;

    fn request(&mut self, idx: usize) -> Option<&mut Self::Request>;
}

/// One asynchronous execution context.
pub trait InferRequest {
    /// Binds `inputs` and starts execution without blocking.
    fn start_async(&mut self, inputs: Vec<(IOName, Tensor)>) -> Result<(), BackendError>;

    /// Blocks until the request completes or `timeout` elapses. `None` waits
    /// forever; an elapsed timeout yields [`RequestStatus::ResultNotReady`].
    fn wait(&mut self, timeout: Option<Duration>) -> Result<RequestStatus, BackendError>;

    /// Whether `wait` can tell an elapsed timeout from completion. Backends
    /// that cannot only accept `wait(None)`.
    fn supports_bounded_wait(&self) -> bool {
        true
    }

    fn output(&mut self, name: &IOName) -> Result<Tensor, BackendError>;
}
