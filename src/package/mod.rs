//! Package assembly for `dist`.
//!
//! The package root is a second, narrower snapshot of the build snapshot.
//! Collected artifacts are injected under a fixed layout, the manifest is
//! rewritten to declare only the install step, entry scripts are bundled to
//! the top level and documentation is moved next to them. A smoke test then
//! loads the packaged entry point in a fresh process.

pub mod manifest;

pub use manifest::{
    expand_template, host_arch, host_platform, lookup, read_manifest, read_version,
    rewrite_manifest, write_manifest,
};

use crate::config::{CommandTemplate, FleetSettings};
use crate::error::PackageError;
use crate::snapshot::{PathFilter, SnapshotBuilder, VcsExclusion};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;

/// Name of the rewritten manifest at the package root.
pub const PACKAGE_MANIFEST: &str = "package.json";

/// Refuse artifact directories holding files that match `lock`.
pub fn validate_artifacts(artifacts: &[PathBuf], lock: &Regex) -> Result<(), PackageError> {
    for artifact in artifacts {
        for entry in fs::read_dir(artifact)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if lock.is_match(&name) {
                return Err(PackageError::LockArtifact {
                    artifact: artifact.clone(),
                    file: name,
                });
            }
        }
    }
    Ok(())
}

fn expand_args(template: &CommandTemplate, vars: &HashMap<&str, String>) -> Vec<String> {
    template
        .args
        .iter()
        .map(|arg| expand_template(arg, vars))
        .collect()
}

fn failure_text(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout).into_owned()
    } else {
        stderr.into_owned()
    }
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

pub struct Packager<'a> {
    settings: &'a FleetSettings,
}

impl<'a> Packager<'a> {
    pub fn new(settings: &'a FleetSettings) -> Self {
        Packager { settings }
    }

    pub fn dist_dir(&self) -> PathBuf {
        self.settings.dist_dir()
    }

    /// Build the package root from the build snapshot and `artifacts`.
    pub async fn assemble(&self, artifacts: &[PathBuf]) -> Result<PathBuf, PackageError> {
        let package = &self.settings.package;
        let dist = self.dist_dir();

        SnapshotBuilder::new(self.settings.snapshot_dir(), package.filter.clone())
            .vcs_exclusion(VcsExclusion::None)
            .build(&dist)?;

        let layout = dist.join(&package.artifact_dir);
        fs::create_dir_all(&layout)?;
        for artifact in artifacts {
            let Some(name) = artifact.file_name() else {
                continue;
            };
            SnapshotBuilder::new(artifact, PathFilter::all())
                .vcs_exclusion(VcsExclusion::None)
                .build(&layout.join(name))?;
        }
        log::info!("[Package] Injected {} artifact directories", artifacts.len());

        let component_manifest = dist.join(&package.component_manifest);
        let mut manifest = read_manifest(&component_manifest)?;
        rewrite_manifest(&mut manifest, &package.install_script).map_err(|reason| {
            PackageError::InvalidManifest {
                path: component_manifest.clone(),
                reason,
            }
        })?;

        for entry in &package.entries {
            self.bundle(&dist, &entry.source, &entry.output).await?;
        }

        write_manifest(&dist.join(PACKAGE_MANIFEST), &manifest)?;

        for path in &package.remove {
            remove_path(&dist.join(path))?;
        }
        for relocation in &package.relocate {
            self.relocate(&dist, &relocation.from, &relocation.to)?;
        }
        for dir in &package.prune {
            match fs::remove_dir(dist.join(dir)) {
                Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        }

        log::info!("[Package] Package assembled in {}", dist.display());
        Ok(dist)
    }

    async fn bundle(&self, dist: &Path, source: &str, output: &str) -> Result<(), PackageError> {
        let input = dist.join(source);
        let target = dist.join(output);

        let Some(bundler) = &self.settings.package.bundler else {
            fs::copy(&input, &target).map_err(|e| PackageError::BundleFailed {
                entry: source.to_string(),
                reason: e.to_string(),
            })?;
            return Ok(());
        };

        let vars = HashMap::from([
            ("input", input.display().to_string()),
            ("output", target.display().to_string()),
        ]);
        log::debug!("[Package] Bundling {} with {}", source, bundler.program);

        let result = Command::new(&bundler.program)
            .args(expand_args(bundler, &vars))
            .current_dir(dist)
            .output()
            .await
            .map_err(|e| PackageError::BundleFailed {
                entry: source.to_string(),
                reason: format!("cannot run {}: {}", bundler.program, e),
            })?;
        if !result.status.success() {
            return Err(PackageError::BundleFailed {
                entry: source.to_string(),
                reason: failure_text(&result),
            });
        }
        Ok(())
    }

    fn relocate(&self, dist: &Path, from: &str, to: &str) -> Result<(), PackageError> {
        let source = dist.join(from);
        let target = dist.join(to);
        if !source.exists() {
            log::warn!("[Package] Nothing to move at {}", from);
            return Ok(());
        }

        let moved = match target.parent() {
            Some(parent) => fs::create_dir_all(parent).and_then(|_| fs::rename(&source, &target)),
            None => fs::rename(&source, &target),
        };
        moved.map_err(|e| PackageError::RelocationFailed {
            from: from.to_string(),
            to: to.to_string(),
            reason: e.to_string(),
        })
    }

    /// Path of the prebuilt binary the package would load on this host.
    pub fn smoke_entry(&self, dist: &Path) -> Result<PathBuf, PackageError> {
        let manifest_path = dist.join(PACKAGE_MANIFEST);
        let manifest = read_manifest(&manifest_path)?;
        let field = &self.settings.package.require_field;
        let invalid = |reason: String| PackageError::InvalidManifest {
            path: manifest_path.clone(),
            reason,
        };

        let template = lookup(&manifest, field)
            .and_then(|value| value.as_str())
            .ok_or_else(|| invalid(format!("missing string field '{}'", field)))?;
        let version = manifest
            .get("version")
            .and_then(|value| value.as_str())
            .ok_or_else(|| invalid("missing string field 'version'".to_string()))?;

        let vars = HashMap::from([
            ("version", version.to_string()),
            ("platform", host_platform().to_string()),
            ("arch", host_arch().to_string()),
        ]);
        Ok(dist.join(expand_template(template, &vars)))
    }

    /// Load the packaged entry point in a fresh process.
    pub async fn smoke_test(&self, dist: &Path) -> Result<(), PackageError> {
        let entry = self.smoke_entry(dist)?;
        let template = &self.settings.package.smoke_test;
        let vars = HashMap::from([("entry", entry.display().to_string())]);

        log::info!("[Package] Smoke test: loading {}", entry.display());
        let output = Command::new(&template.program)
            .args(expand_args(template, &vars))
            .current_dir(dist)
            .output()
            .await
            .map_err(|e| PackageError::SmokeTestFailed(format!("cannot run {}: {}", template.program, e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(PackageError::SmokeTestFailed(failure_text(&output)))
        }
    }
}
