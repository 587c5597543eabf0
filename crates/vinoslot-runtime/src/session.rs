use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};
use vinoslot_core::{
    Device, ExecutableNetwork, IOName, InferRequest, ModelArtifact, Network, Plugin,
    RequestStatus, Shape, Tensor, TensorSpec,
};

use crate::slot::SlotPool;
use crate::{PluginHandle, RequestHandle, Result, SessionError, SlotState};

/// What to load and where.
#[derive(Clone, Debug)]
pub struct LoadOptions {
    /// Topology file; the weights file is derived from it.
    pub model: PathBuf,
    pub device: Device,
    /// Parallel request slots. `0` lets the backend pick.
    pub request_count: usize,
    /// Custom-operator library, only registered on CPU-class devices.
    pub extension: Option<PathBuf>,
}

impl LoadOptions {
    pub fn new(model: impl Into<PathBuf>, device: Device) -> Self {
        Self {
            model: model.into(),
            device,
            request_count: 1,
            extension: None,
        }
    }

    pub fn with_request_count(mut self, request_count: usize) -> Self {
        self.request_count = request_count;
        self
    }

    pub fn with_extension(mut self, path: impl Into<PathBuf>) -> Self {
        self.extension = Some(path.into());
        self
    }
}

struct Loaded<'p, P: Plugin> {
    plugin: PluginHandle<'p, P>,
    network: Network,
    executable: P::Executable,
    input: TensorSpec,
    output: IOName,
    slots: SlotPool,
}

/// Binds one IR model to one plugin and drives its request slots.
///
/// The input and output used by default are the first ones the topology
/// declares. The session does no locking of its own; sharing it across
/// threads is only as safe as the backend makes it.
pub struct InferenceSession<'p, P: Plugin> {
    loaded: Option<Loaded<'p, P>>,
}

impl<P: Plugin> Default for InferenceSession<'_, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'p, P: Plugin> InferenceSession<'p, P> {
    pub fn new() -> Self {
        Self { loaded: None }
    }

    /// Loads the model onto `plugin`, or onto a plugin created for
    /// `options.device` when none is lent.
    ///
    /// On CPU-class devices every operator kind of the network must be
    /// supported by the plugin, otherwise [`SessionError::UnsupportedModel`]
    /// is returned and nothing is loaded. A previously loaded network stays
    /// in place when the topology is rejected; it is released before the new
    /// one is compiled, so a failed compile leaves the session unloaded.
    pub fn load(&mut self, options: &LoadOptions, plugin: Option<&'p P>) -> Result<(&P, Shape)> {
        let artifact = ModelArtifact::from_topology(&options.model);
        info!(
            topology = %artifact.topology.display(),
            weights = %artifact.weights.display(),
            device = %options.device,
            "loading network"
        );

        let plugin = match plugin {
            Some(p) => PluginHandle::Borrowed(p),
            None => PluginHandle::Owned(P::create(&options.device)?),
        };

        let cpu_class = options.device.is_cpu_class();
        if let (Some(extension), true) = (&options.extension, cpu_class) {
            debug!(path = %extension.display(), "registering extension");
            plugin.add_extension(extension)?;
        }

        let network = plugin.read_network(&artifact)?;

        if cpu_class {
            let supported = plugin.supported_operators(&network)?;
            let unsupported: Vec<String> = network
                .operator_kinds()
                .difference(&supported)
                .cloned()
                .collect();
            if !unsupported.is_empty() {
                let layers: Vec<&str> = network
                    .layers
                    .iter()
                    .filter(|l| !supported.contains(&l.kind))
                    .map(|l| l.name.as_str())
                    .collect();
                warn!(
                    device = %options.device,
                    operators = ?unsupported,
                    layers = ?layers,
                    "network uses unsupported operators"
                );
                return Err(SessionError::UnsupportedModel {
                    device: options.device.clone(),
                    operators: unsupported,
                });
            }
        }

        let input = network
            .inputs
            .first()
            .cloned()
            .ok_or(SessionError::MissingPort("input"))?;
        let output = network
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or(SessionError::MissingPort("output"))?;

        // The topology is acceptable; release the previous network before
        // the device compiles the new one.
        if let Some(previous) = self.loaded.take() {
            debug!(network = %previous.network.name, "unloading previous network");
        }

        let executable = plugin.load_network(&network, NonZeroUsize::new(options.request_count))?;
        let slots = SlotPool::new(executable.request_count());

        info!(
            network = %network.name,
            backend = plugin.name(),
            input = %input.name,
            output = %output,
            requests = slots.len(),
            "network loaded"
        );

        let loaded = self.loaded.insert(Loaded {
            plugin,
            network,
            executable,
            input,
            output,
            slots,
        });
        Ok((&*loaded.plugin, loaded.input.shape()))
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    fn loaded(&self) -> Result<&Loaded<'p, P>> {
        self.loaded.as_ref().ok_or(SessionError::NotLoaded)
    }

    fn loaded_mut(&mut self) -> Result<&mut Loaded<'p, P>> {
        self.loaded.as_mut().ok_or(SessionError::NotLoaded)
    }

    /// Declared shape of the default input; dynamic dimensions read as 0.
    pub fn input_shape(&self) -> Result<Shape> {
        Ok(self.loaded()?.input.shape())
    }

    pub fn input_spec(&self) -> Result<&TensorSpec> {
        Ok(&self.loaded()?.input)
    }

    pub fn input_name(&self) -> Result<&IOName> {
        Ok(&self.loaded()?.input.name)
    }

    pub fn output_name(&self) -> Result<&IOName> {
        Ok(&self.loaded()?.output)
    }

    pub fn network(&self) -> Result<&Network> {
        Ok(&self.loaded()?.network)
    }

    pub fn plugin(&self) -> Result<&P> {
        Ok(&self.loaded()?.plugin)
    }

    pub fn owns_plugin(&self) -> Result<bool> {
        Ok(self.loaded()?.plugin.is_owned())
    }

    pub fn request_count(&self) -> Result<usize> {
        Ok(self.loaded()?.slots.len())
    }

    pub fn status(&self, request_id: usize) -> Result<SlotState> {
        self.loaded()?.slots.state(request_id)
    }

    /// Starts inference of `input` on slot `request_id` and returns at once.
    pub fn execute(&mut self, request_id: usize, input: Tensor) -> Result<RequestHandle> {
        let loaded = self.loaded_mut()?;
        loaded.slots.check_free(request_id)?;

        let count = loaded.slots.len();
        let request = loaded
            .executable
            .request(request_id)
            .ok_or(SessionError::InvalidRequestSlot {
                slot: request_id,
                count,
            })?;
        if let Err(err) = request.start_async(vec![(loaded.input.name.clone(), input)]) {
            let handle = loaded.slots.mark_rejected(request_id);
            warn!(
                slot = request_id,
                submission = handle.submission,
                error = %err,
                "request rejected"
            );
            return Err(err.into());
        }

        let handle = loaded.slots.mark_submitted(request_id);
        debug!(slot = request_id, submission = handle.submission, "request started");
        Ok(handle)
    }

    /// Blocks until slot `request_id` completes.
    pub fn wait(&mut self, request_id: usize) -> Result<RequestStatus> {
        self.wait_for(request_id, None)
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`, returning
    /// [`RequestStatus::ResultNotReady`] and leaving the slot in flight.
    /// Backends that cannot detect an elapsed timeout fail with
    /// [`SessionError::BoundedWaitUnsupported`] and the slot stays in flight.
    pub fn wait_timeout(&mut self, request_id: usize, timeout: Duration) -> Result<RequestStatus> {
        self.wait_for(request_id, Some(timeout))
    }

    fn wait_for(&mut self, request_id: usize, timeout: Option<Duration>) -> Result<RequestStatus> {
        let loaded = self.loaded_mut()?;
        match loaded.slots.state(request_id)? {
            SlotState::Idle => return Err(SessionError::SlotNotStarted { slot: request_id }),
            SlotState::Complete(status) => return Ok(status),
            SlotState::InFlight => {}
        }

        let count = loaded.slots.len();
        let backend = loaded.plugin.name();
        let request = loaded
            .executable
            .request(request_id)
            .ok_or(SessionError::InvalidRequestSlot {
                slot: request_id,
                count,
            })?;
        if timeout.is_some() && !request.supports_bounded_wait() {
            return Err(SessionError::BoundedWaitUnsupported { backend });
        }

        let status = match request.wait(timeout) {
            Ok(status) => status,
            Err(err) => {
                loaded
                    .slots
                    .mark_complete(request_id, RequestStatus::GeneralError);
                return Err(err.into());
            }
        };

        if status != RequestStatus::ResultNotReady {
            loaded.slots.mark_complete(request_id, status);
        }
        debug!(slot = request_id, %status, "request waited");
        Ok(status)
    }

    /// Reads a result.
    ///
    /// Without `output_name` the default output of slot `request_id` is
    /// returned. A named output is read from the most recently submitted
    /// request. Either way the slot being read must have completed
    /// successfully.
    pub fn output(&mut self, request_id: usize, output_name: Option<&str>) -> Result<Tensor> {
        let loaded = self.loaded_mut()?;
        loaded.slots.state(request_id)?;

        let (slot, name) = match output_name {
            Some(raw) => {
                let name = IOName::from(raw);
                if loaded.network.output(&name).is_none() {
                    return Err(SessionError::UnknownOutput(raw.to_string()));
                }
                let last = loaded
                    .slots
                    .last_submitted()
                    .ok_or(SessionError::OutputNotReady { slot: request_id })?;
                (last.slot, name)
            }
            None => (request_id, loaded.output.clone()),
        };

        loaded.slots.check_readable(slot)?;
        let count = loaded.slots.len();
        let request = loaded
            .executable
            .request(slot)
            .ok_or(SessionError::InvalidRequestSlot { slot, count })?;
        Ok(request.output(&name)?)
    }
}
