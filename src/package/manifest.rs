//! Component manifest (`package.json`) handling.

use crate::error::PackageError;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{ *([a-zA-Z_][a-zA-Z_0-9]*) *\}\}").expect("Invalid placeholder regex")
});

/// Load a JSON manifest.
pub fn read_manifest(path: &Path) -> Result<Value, PackageError> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PackageError::ManifestNotFound(path.to_path_buf())
        } else {
            PackageError::Io(e)
        }
    })?;

    serde_json::from_str(&content).map_err(|e| PackageError::InvalidManifest {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// The `version` field of a manifest.
pub fn read_version(path: &Path) -> Result<String, PackageError> {
    let manifest = read_manifest(path)?;
    manifest
        .get("version")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| PackageError::InvalidManifest {
            path: path.to_path_buf(),
            reason: "missing string field 'version'".to_string(),
        })
}

/// Declare only the install step and drop development dependencies.
pub fn rewrite_manifest(manifest: &mut Value, install_script: &str) -> Result<(), String> {
    let object = manifest
        .as_object_mut()
        .ok_or_else(|| "manifest is not a JSON object".to_string())?;

    let mut scripts = Map::new();
    scripts.insert("install".to_string(), Value::String(install_script.to_string()));
    object.insert("scripts".to_string(), Value::Object(scripts));
    object.shift_remove("devDependencies");
    Ok(())
}

/// Write a manifest indented with four spaces.
pub fn write_manifest(path: &Path, manifest: &Value) -> Result<(), PackageError> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    manifest
        .serialize(&mut serializer)
        .map_err(|e| PackageError::InvalidManifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    fs::write(path, buffer)?;
    Ok(())
}

/// Follow a dotted path (`cnoke.require`) into a JSON value.
pub fn lookup<'a>(value: &'a Value, dotted: &str) -> Option<&'a Value> {
    dotted
        .split('.')
        .filter(|part| !part.is_empty())
        .try_fold(value, |current, part| current.get(part))
}

/// Replace `{{name}}` placeholders. Unknown names are left untouched.
pub fn expand_template(template: &str, vars: &HashMap<&str, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Host platform in the component's naming.
pub fn host_platform() -> &'static str {
    match std::env::consts::OS {
        "windows" => "win32",
        "macos" => "darwin",
        other => other,
    }
}

/// Host architecture in the component's naming.
pub fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x64",
        "x86" => "ia32",
        "aarch64" => "arm64",
        other => other,
    }
}
