//! Machine selection from command-line glob patterns.

use crate::config::loader::Registry;
use crate::config::validator::validate_machine_pattern;
use crate::error::RegistryError;
use crate::models::Machine;
use glob::Pattern;
use std::sync::Arc;

/// Resolve patterns into the Run Set.
///
/// Each pattern is matched against both the key and the display name of
/// every machine. A pattern that matches nothing fails the whole selection.
/// The result keeps registry order and holds each machine once.
pub fn select_machines(
    registry: &Registry,
    patterns: &[String],
) -> Result<Vec<Arc<Machine>>, RegistryError> {
    if registry.is_empty() {
        return Err(RegistryError::NoMachineAvailable);
    }

    if patterns.is_empty() {
        return Ok(registry.machines().cloned().map(Arc::new).collect());
    }

    let mut selected = vec![false; registry.len()];
    for raw in patterns {
        validate_machine_pattern(raw)?;
        let pattern = Pattern::new(raw).map_err(|e| RegistryError::InvalidPattern {
            pattern: raw.clone(),
            reason: e.msg.to_string(),
        })?;

        let mut matched = false;
        for (idx, machine) in registry.machines().enumerate() {
            if pattern.matches(&machine.key) || pattern.matches(&machine.name) {
                selected[idx] = true;
                matched = true;
            }
        }
        if !matched {
            return Err(RegistryError::NoMatch(raw.clone()));
        }
    }

    let machines: Vec<Arc<Machine>> = registry
        .machines()
        .zip(selected)
        .filter(|(_, keep)| *keep)
        .map(|(machine, _)| Arc::new(machine.clone()))
        .collect();

    log::debug!(
        "Selected {} of {} machine(s) for patterns {:?}",
        machines.len(),
        registry.len(),
        patterns
    );
    Ok(machines)
}
