use std::fmt;
use std::str::FromStr;

/// Target device string as understood by the inference runtime, e.g. `CPU`,
/// `GPU.1`, `MYRIAD` or a composite like `HETERO:FPGA,CPU`.
///
/// Stored upper-cased; the runtime matches device names case-sensitively.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Device(String);

impl Device {
    pub fn cpu() -> Self {
        Self("CPU".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Individual targets named by the device, with any `HETERO:`/`MULTI:`
    /// style prefix stripped.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        let list = match self.0.split_once(':') {
            Some((_, rest)) => rest,
            None => self.0.as_str(),
        };
        list.split(',').map(str::trim).filter(|t| !t.is_empty())
    }

    /// True when any target is the CPU plugin.
    pub fn is_cpu_class(&self) -> bool {
        self.targets()
            .any(|t| t == "CPU" || t.strip_prefix("CPU.").is_some())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("device name must not be empty")]
pub struct EmptyDevice;

impl FromStr for Device {
    type Err = EmptyDevice;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(EmptyDevice);
        }
        Ok(Self(raw.to_ascii_uppercase()))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
