//! Orchestrator settings (`fleet.toml`).
//!
//! Every field has a default so an absent or partial file is valid. Relative
//! paths are resolved against the directory holding the settings file.

use crate::error::RegistryError;
use crate::snapshot::PathFilter;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SETTINGS_FILE_NAME: &str = "fleet.toml";

/// Get the user-level settings path: ~/.config/vmfleet/fleet.toml
pub fn get_global_settings_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config/vmfleet").join(SETTINGS_FILE_NAME))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Source tree that gets snapshotted
    pub root: PathBuf,
    pub registry: PathBuf,
    /// Local machine files, one directory per registry key
    pub machines: PathBuf,
    /// Snapshot, dist, artifacts and logs
    pub build: PathBuf,
    /// JSON manifest carrying the component `version`
    pub manifest: PathBuf,
    /// Directory holding the QEMU binaries, when not on PATH
    pub qemu_prefix: Option<PathBuf>,
}

impl Default for PathSettings {
    fn default() -> Self {
        PathSettings {
            root: PathBuf::from("../../.."),
            registry: PathBuf::from("registry/machines.json"),
            machines: PathBuf::from("qemu"),
            build: PathBuf::from("../build"),
            manifest: PathBuf::from("../../../src/koffi/package.json"),
            qemu_prefix: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub settle_ms: u64,
    pub join_attempts: u32,
    pub probe_attempts: u32,
    pub manual_join_attempts: u32,
    pub retry_interval_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub remove_attempts: u32,
    pub remove_interval_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        TimingSettings {
            settle_ms: 2_000,
            join_attempts: 30,
            probe_attempts: 2,
            manual_join_attempts: 5,
            retry_interval_ms: 10_000,
            shutdown_timeout_ms: 60_000,
            remove_attempts: 10,
            remove_interval_ms: 1_000,
        }
    }
}

impl TimingSettings {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn remove_interval(&self) -> Duration {
        Duration::from_millis(self.remove_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Parallel file transfers per push
    pub concurrency: usize,
}

impl Default for TransferSettings {
    fn default() -> Self {
        // scp from a Windows control host chokes on parallel transfers
        let concurrency = if cfg!(windows) { 1 } else { 4 };
        TransferSettings { concurrency }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    pub release_flags: String,
    pub debug_flags: String,
    /// Directory, relative to a suite directory, where commands run
    pub remote_subdir: String,
    /// Directory, relative to a suite directory, holding `<platform>_<arch>` outputs
    pub artifact_subdir: String,
    /// File whose presence marks an artifact as already built
    pub artifact_binary: String,
    /// Regex of file names that must never be pulled into an artifact
    pub lock_prefix: String,
    /// Also leave untracked (not only ignored) files out of snapshots
    pub exclude_untracked: bool,
}

impl BuildSettings {
    /// Compiled [`lock_prefix`](Self::lock_prefix).
    pub fn lock_regex(&self) -> Result<Regex, RegistryError> {
        Regex::new(&self.lock_prefix).map_err(|e| RegistryError::InvalidPattern {
            pattern: self.lock_prefix.clone(),
            reason: e.to_string(),
        })
    }
}

impl Default for BuildSettings {
    fn default() -> Self {
        BuildSettings {
            release_flags: " --config release".to_string(),
            debug_flags: " --debug".to_string(),
            remote_subdir: "src/koffi".to_string(),
            artifact_subdir: "src/koffi/build/koffi".to_string(),
            artifact_binary: "koffi.node".to_string(),
            lock_prefix: "^v[0-9]+".to_string(),
            exclude_untracked: false,
        }
    }
}

/// Entry script bundled into the package root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryScript {
    /// Source, relative to the package root
    pub source: String,
    /// Output, relative to the package root
    pub output: String,
}

/// File or directory moved inside the package root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relocation {
    pub from: String,
    pub to: String,
}

/// External command template. `{{name}}` placeholders are expanded per use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageSettings {
    pub filter: PathFilter,
    /// Component manifest, relative to the package root
    pub component_manifest: String,
    /// Directory, relative to the package root, receiving the artifacts
    pub artifact_dir: String,
    pub install_script: String,
    pub entries: Vec<EntryScript>,
    /// Placeholders: `{{input}}`, `{{output}}`. None copies entries verbatim.
    pub bundler: Option<CommandTemplate>,
    pub remove: Vec<String>,
    pub relocate: Vec<Relocation>,
    /// Directories removed once emptied by the relocations
    pub prune: Vec<String>,
    /// Manifest field holding the loadable entry template
    pub require_field: String,
    /// Placeholder: `{{entry}}`
    pub smoke_test: CommandTemplate,
}

impl Default for PackageSettings {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let relocate = |from: &str, to: &str| Relocation {
            from: from.to_string(),
            to: to.to_string(),
        };

        PackageSettings {
            filter: PathFilter::new(
                strings(&["src", "vendor/node-addon-api", "web"]),
                strings(&["src/koffi/benchmark", "src/koffi/test", "src/koffi/tools"]),
            ),
            component_manifest: "src/koffi/package.json".to_string(),
            artifact_dir: "build/koffi".to_string(),
            install_script: "node src/cnoke/cnoke.js -p . -d src/koffi --prebuild".to_string(),
            entries: vec![
                EntryScript {
                    source: "src/koffi/index.js".to_string(),
                    output: "index.js".to_string(),
                },
                EntryScript {
                    source: "src/koffi/indirect.js".to_string(),
                    output: "indirect.js".to_string(),
                },
            ],
            bundler: Some(CommandTemplate {
                program: "esbuild".to_string(),
                args: strings(&["{{input}}", "--bundle", "--platform=node", "--outfile={{output}}"]),
            }),
            remove: strings(&[
                "src/koffi/package.json",
                "src/koffi/index.js",
                "src/koffi/indirect.js",
                "src/koffi/.gitignore",
            ]),
            relocate: vec![
                relocate("src/koffi/index.d.ts", "index.d.ts"),
                relocate("src/koffi/README.md", "README.md"),
                relocate("src/koffi/LICENSE.txt", "LICENSE.txt"),
                relocate("src/koffi/CHANGELOG.md", "CHANGELOG.md"),
                relocate("web/koffi.dev", "doc"),
            ],
            prune: strings(&["web"]),
            require_field: "cnoke.require".to_string(),
            smoke_test: CommandTemplate {
                program: "node".to_string(),
                args: strings(&["-e", "require(process.argv[1])", "{{entry}}"]),
            },
        }
    }
}

fn default_snapshot_filter() -> PathFilter {
    let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    PathFilter::new(
        strings(&[
            "src/core/base",
            "src/cnoke",
            "src/koffi",
            "tools",
            "vendor/node-addon-api",
            "vendor/raylib",
            "vendor/sqlite3",
            "vendor/sqlite3mc",
            "web/koffi.dev",
        ]),
        strings(&["tools/qemu"]),
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSettings {
    pub filter: PathFilter,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        SnapshotSettings {
            filter: default_snapshot_filter(),
        }
    }
}

/// Complete orchestrator settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetSettings {
    pub paths: PathSettings,
    pub timing: TimingSettings,
    pub transfer: TransferSettings,
    pub build: BuildSettings,
    pub snapshot: SnapshotSettings,
    pub package: PackageSettings,
}

impl FleetSettings {
    /// Load settings from an explicit TOML file.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RegistryError::FileNotFound(format!("Settings file not found at: {}", path.display()))
            } else {
                RegistryError::IoError(e)
            }
        })?;

        let mut settings: FleetSettings = toml::from_str(&content)?;
        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        settings.resolve_paths(&base);

        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Find settings: explicit path, then `./fleet.toml`, then the user
    /// settings, then built-in defaults anchored at `fallback_base`.
    pub fn discover(explicit: Option<&Path>, fallback_base: &Path) -> Result<Self, RegistryError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let local = fallback_base.join(SETTINGS_FILE_NAME);
        if local.is_file() {
            return Self::load(&local);
        }
        if let Some(global) = get_global_settings_path().filter(|p| p.is_file()) {
            return Self::load(&global);
        }

        log::debug!("No settings file found, using defaults");
        let mut settings = FleetSettings::default();
        settings.resolve_paths(fallback_base);
        Ok(settings)
    }

    /// Anchor every relative path at `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let anchor = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };

        anchor(&mut self.paths.root);
        anchor(&mut self.paths.registry);
        anchor(&mut self.paths.machines);
        anchor(&mut self.paths.build);
        anchor(&mut self.paths.manifest);
        if let Some(prefix) = self.paths.qemu_prefix.as_mut() {
            anchor(prefix);
        }
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.paths.build.join("snapshot")
    }

    pub fn dist_dir(&self) -> PathBuf {
        self.paths.build.join("dist")
    }

    pub fn artifact_root(&self) -> PathBuf {
        self.paths.build.join("qemu")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.paths.build.join("logs")
    }

    pub fn machine_dir(&self, key: &str) -> PathBuf {
        self.paths.machines.join(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = FleetSettings::default();
        assert_eq!(settings.timing.join_attempts, 30);
        assert_eq!(settings.timing.probe_attempts, 2);
        assert_eq!(settings.timing.retry_interval(), Duration::from_secs(10));
        assert_eq!(settings.build.release_flags, " --config release");
        assert_eq!(settings.package.entries.len(), 2);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fleet.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[timing]\nsettle_ms = 5\njoin_attempts = 3\n\n[paths]\nroot = \"src\"").unwrap();

        let settings = FleetSettings::load(&path).unwrap();
        assert_eq!(settings.timing.settle_ms, 5);
        assert_eq!(settings.timing.join_attempts, 3);
        assert_eq!(settings.timing.probe_attempts, 2);
        assert_eq!(settings.paths.root, temp_dir.path().join("src"));
        assert_eq!(settings.paths.registry, temp_dir.path().join("registry/machines.json"));
    }

    #[test]
    fn test_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fleet.toml");
        fs::write(&path, "[timing\nsettle_ms = ").unwrap();

        let result = FleetSettings::load(&path);
        assert!(matches!(result, Err(RegistryError::InvalidSettings(_))));
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = FleetSettings::load(Path::new("/nonexistent/fleet.toml"));
        assert!(matches!(result, Err(RegistryError::FileNotFound(_))));
    }

    #[test]
    fn test_discover_local_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(SETTINGS_FILE_NAME), "[transfer]\nconcurrency = 9\n").unwrap();

        let settings = FleetSettings::discover(None, temp_dir.path()).unwrap();
        assert_eq!(settings.transfer.concurrency, 9);
    }

    #[test]
    fn test_lock_regex() {
        let mut build = BuildSettings::default();
        assert!(build.lock_regex().unwrap().is_match("v8.lock"));
        build.lock_prefix = "v[".to_string();
        assert!(matches!(build.lock_regex(), Err(RegistryError::InvalidPattern { .. })));
    }

    #[test]
    fn test_absolute_paths_untouched() {
        let mut settings = FleetSettings::default();
        settings.paths.build = PathBuf::from("/var/tmp/fleet");
        settings.resolve_paths(Path::new("/somewhere"));
        assert_eq!(settings.paths.build, PathBuf::from("/var/tmp/fleet"));
        assert_eq!(settings.dist_dir(), PathBuf::from("/var/tmp/fleet/dist"));
    }
}
