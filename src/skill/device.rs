//! Execution devices.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// Backend class a skill instance can be loaded onto.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DeviceKind {
    Cpu,
    Gpu,
    Npu,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Cpu => "cpu",
            DeviceKind::Gpu => "gpu",
            DeviceKind::Npu => "npu",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown device kind '{0}', expected cpu, gpu or npu")]
pub struct ParseDeviceKindError(String);

impl FromStr for DeviceKind {
    type Err = ParseDeviceKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(DeviceKind::Cpu),
            "gpu" => Ok(DeviceKind::Gpu),
            "npu" => Ok(DeviceKind::Npu),
            _ => Err(ParseDeviceKindError(s.to_string())),
        }
    }
}

/// A concrete device a skill instance is bound to. Instances are recreated
/// only when the selected device actually changes, which is why this is
/// comparable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExecutionDevice {
    pub kind: DeviceKind,
    pub name: String,
}

impl ExecutionDevice {
    /// The host CPU, always present.
    pub fn cpu() -> Self {
        Self {
            kind: DeviceKind::Cpu,
            name: "cpu0".to_string(),
        }
    }
}

impl fmt::Display for ExecutionDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("cpu".parse::<DeviceKind>().unwrap(), DeviceKind::Cpu);
        assert_eq!(" GPU ".parse::<DeviceKind>().unwrap(), DeviceKind::Gpu);
        assert_eq!("Npu".parse::<DeviceKind>().unwrap(), DeviceKind::Npu);
        assert!("tpu".parse::<DeviceKind>().is_err());
    }

    #[test]
    fn devices_compare_by_kind_and_name() {
        assert_eq!(ExecutionDevice::cpu(), ExecutionDevice::cpu());
        let gpu = ExecutionDevice {
            kind: DeviceKind::Gpu,
            name: "gpu0".to_string(),
        };
        assert_ne!(ExecutionDevice::cpu(), gpu);
    }

    #[test]
    fn display_names_the_device() {
        assert_eq!(ExecutionDevice::cpu().to_string(), "cpu0 (cpu)");
    }
}
