//! Registry validation.

use crate::error::RegistryError;
use crate::models::Machine;

/// Validate a machine pattern given on the command line.
///
/// Patterns are globs over registry keys and names; path separators and dots
/// are rejected so a pattern can never escape the machine directory.
pub fn validate_machine_pattern(pattern: &str) -> Result<(), RegistryError> {
    if pattern.is_empty()
        || pattern.starts_with("__")
        || pattern.contains(['\\', '/', '.'])
    {
        return Err(RegistryError::InvalidMachineName(pattern.to_string()));
    }
    Ok(())
}

/// Validate one machine after defaults have been applied.
pub fn validate_machine(machine: &Machine) -> Result<(), RegistryError> {
    let fail = |reason: String| {
        Err(RegistryError::ValidationFailed(format!(
            "machine '{}': {}",
            machine.key, reason
        )))
    };

    if machine.platform.trim().is_empty() {
        return fail("platform cannot be empty".to_string());
    }

    if let Some(qemu) = &machine.qemu {
        if qemu.binary.trim().is_empty() {
            return fail("qemu binary cannot be empty".to_string());
        }
        if qemu.ssh_port == 0 {
            return fail("qemu ssh_port cannot be 0".to_string());
        }
        if qemu.shutdown.trim().is_empty() {
            return fail("qemu shutdown command cannot be empty".to_string());
        }
    } else if let Some(ssh) = &machine.ssh {
        if ssh.port == 0 {
            return fail("ssh port cannot be 0".to_string());
        }
    }

    for (suite, build) in &machine.builds {
        if build.directory.trim().is_empty() {
            return fail(format!("build suite '{}' has no directory", suite));
        }
        if build.build.trim().is_empty() {
            return fail(format!("build suite '{}' has no build command", suite));
        }
        if build.arch.trim().is_empty() {
            return fail(format!("build suite '{}' has no arch", suite));
        }
    }

    for (suite, test) in &machine.tests {
        if test.directory.trim().is_empty() {
            return fail(format!("test suite '{}' has no directory", suite));
        }
        if test.build.trim().is_empty() {
            return fail(format!("test suite '{}' has no build command", suite));
        }
    }

    Ok(())
}
