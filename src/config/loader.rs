//! Machine registry loader.
//!
//! Parses the declarative machine map, assigns each entry its key, applies
//! defaults and computes the host-appropriate acceleration mode.

use crate::config::validator::validate_machine;
use crate::error::RegistryError;
use crate::models::{Accelerator, Machine};
use indexmap::IndexMap;
use std::fs;
use std::path::Path;

/// Only these CPU-virtualizing binaries can use hardware acceleration.
const ACCELERATED_BINARIES: &[&str] = &["qemu-system-x86_64", "qemu-system-i386"];

/// Every known machine, in registry order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    machines: IndexMap<String, Machine>,
}

/// Pick the acceleration mode for a QEMU binary on the given host OS.
///
/// Never assumed: anything outside the known binary/host pairs gets `None`.
pub fn detect_accelerator(binary: &str, host_os: &str, enabled: bool) -> Option<Accelerator> {
    if !enabled || !ACCELERATED_BINARIES.contains(&binary) {
        return None;
    }
    match host_os {
        "linux" => Some(Accelerator::Kvm),
        "windows" => Some(Accelerator::Whpx),
        _ => None,
    }
}

impl Registry {
    /// Load the registry from a JSON file.
    pub fn load(path: &Path, accelerate: bool) -> Result<Self, RegistryError> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RegistryError::FileNotFound(format!(
                    "Machine registry not found at: {}",
                    path.display()
                ))
            } else {
                RegistryError::IoError(e)
            }
        })?;

        let registry = Self::from_json(&content, std::env::consts::OS, accelerate)?;
        log::info!(
            "Loaded {} machine(s) from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    /// Parse and normalize a registry document.
    pub fn from_json(content: &str, host_os: &str, accelerate: bool) -> Result<Self, RegistryError> {
        let raw: IndexMap<String, Machine> = serde_json::from_str(content)?;

        let mut machines = IndexMap::with_capacity(raw.len());
        for (key, mut machine) in raw {
            machine.key = key.clone();
            if machine.name.trim().is_empty() {
                machine.name = key.clone();
            }
            if let Some(qemu) = machine.qemu.as_mut() {
                qemu.accelerate = detect_accelerator(&qemu.binary, host_os, accelerate);
            }

            validate_machine(&machine)?;
            machines.insert(key, machine);
        }

        Ok(Registry { machines })
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Machine> {
        self.machines.get(key)
    }

    /// Iterate machines in registry order.
    pub fn machines(&self) -> impl Iterator<Item = &Machine> {
        self.machines.values()
    }
}
