//! End-to-end fleet runs against the scripted engine and connector.
//!
//! Registry used throughout:
//! - `m1`: bootable Linux machine, build suites `x86` and `x64`, one test suite
//! - `m2`: manual macOS machine, build suite `arm`

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use vmfleet::config::{CommandTemplate, EntryScript, FleetSettings, Registry, TimingSettings};
use vmfleet::console::{Reporter, Status};
use vmfleet::mock::{LaunchScript, MockConnector, MockEngine, MockEvent, MockHost};
use vmfleet::snapshot::PathFilter;
use vmfleet::{
    select_machines, FleetError, IgnoreReason, LifecycleController, PackageError, RunContext,
    RunOptions,
};

const M1_PORT: u16 = 22201;
const M2_PORT: u16 = 22301;

const REGISTRY: &str = r#"{
    "m1": {
        "platform": "linux",
        "qemu": {
            "binary": "qemu-system-x86_64",
            "arguments": ["-m", "2G"],
            "disk": "disk.qcow2",
            "ssh_port": 22201,
            "username": "debian",
            "password": "debian",
            "shutdown": "sudo poweroff"
        },
        "builds": {
            "x86": { "arch": "ia32", "directory": "/home/debian/fleet_x86", "build": "node build.js x86" },
            "x64": { "arch": "x64", "directory": "/home/debian/fleet_x64", "build": "node build.js x64" }
        },
        "tests": {
            "Linux": {
                "directory": "/home/debian/fleet_test",
                "build": "node test_build.js",
                "commands": {
                    "Sync": "node test/sync.js",
                    "Async": { "command": "node test/async.js", "repeat": 2 }
                }
            }
        }
    },
    "m2": {
        "platform": "darwin",
        "ssh": { "port": 22301, "username": "macos", "password": "macos" },
        "builds": {
            "arm": { "arch": "arm64", "directory": "/Users/macos/fleet", "build": "node build.js arm" }
        }
    }
}"#;

struct Fixture {
    _dir: TempDir,
    settings: Arc<FleetSettings>,
    registry: Registry,
    engine: Arc<MockEngine>,
    connector: MockConnector,
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn fast_timing() -> TimingSettings {
    TimingSettings {
        settle_ms: 0,
        join_attempts: 3,
        probe_attempts: 1,
        manual_join_attempts: 5,
        retry_interval_ms: 1,
        shutdown_timeout_ms: 100,
        remove_attempts: 2,
        remove_interval_ms: 1,
    }
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("source");

    write(
        &root.join("src/koffi/package.json"),
        r#"{
    "name": "koffi",
    "version": "2.8.0",
    "scripts": { "test": "node tools/qemu.js test" },
    "devDependencies": { "esbuild": "^0.19.0" },
    "cnoke": { "require": "./build/koffi/{{platform}}_{{arch}}/koffi.node" }
}"#,
    );
    write(&root.join("src/koffi/index.js"), "module.exports = require('./build');\n");
    write(&root.join("src/koffi/src/ffi.cc"), "// ffi\n");
    write(&root.join("notes/todo.txt"), "not shipped\n");

    let machines = dir.path().join("machines");
    fs::create_dir_all(machines.join("m1")).unwrap();

    let mut settings = FleetSettings::default();
    settings.paths.root = root.clone();
    settings.paths.registry = dir.path().join("machines.json");
    settings.paths.machines = machines;
    settings.paths.build = dir.path().join("build");
    settings.paths.manifest = root.join("src/koffi/package.json");
    settings.timing = fast_timing();
    settings.snapshot.filter = PathFilter::new(vec!["src".to_string()], vec![]);

    settings.package.filter = PathFilter::new(vec!["src".to_string()], vec![]);
    settings.package.bundler = None;
    settings.package.entries = vec![EntryScript {
        source: "src/koffi/index.js".to_string(),
        output: "index.js".to_string(),
    }];
    settings.package.remove = vec![
        "src/koffi/package.json".to_string(),
        "src/koffi/index.js".to_string(),
    ];
    settings.package.relocate = vec![];
    settings.package.prune = vec![];
    settings.package.smoke_test = CommandTemplate {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), "exit 0".to_string()],
    };

    let registry = Registry::from_json(REGISTRY, "linux", true).unwrap();

    let connector = MockConnector::new();
    connector.add_host(
        M1_PORT,
        MockHost::up()
            .shutdown_with("sudo poweroff")
            .serving("koffi.node", "linux binary")
            .serving("v8.lock", "lock"),
    );
    connector.add_host(M2_PORT, MockHost::up().serving("koffi.node", "darwin binary"));

    Fixture {
        _dir: dir,
        settings: Arc::new(settings),
        registry,
        engine: Arc::new(MockEngine::new()),
        connector,
    }
}

impl Fixture {
    fn context(&self, patterns: &[&str], options: RunOptions) -> (RunContext, Reporter) {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        let run_set = select_machines(&self.registry, &patterns).unwrap();
        let reporter = Reporter::capturing(run_set.iter().map(|m| m.name.as_str()));
        let lifecycle = LifecycleController::new(
            self.engine.clone(),
            Arc::new(self.connector.clone()),
            self.settings.timing.clone(),
        );
        let ctx = RunContext::new(self.settings.clone(), options, lifecycle, reporter.clone(), run_set);
        (ctx, reporter)
    }

    fn replace_host(&self, port: u16, host: MockHost) {
        self.connector.add_host(port, host);
    }
}

fn has_status(reporter: &Reporter, machine: &str, action: &str, status: Status) -> bool {
    let expected = reporter.format_status(machine, action, status);
    reporter.lines().iter().any(|line| *line == expected)
}

// ============================================================================
// START
// ============================================================================

#[tokio::test]
async fn test_start_with_unreachable_manual_machine_succeeds() {
    let fx = fixture();
    fx.replace_host(M2_PORT, MockHost::down());

    let (mut ctx, reporter) = fx.context(&[], RunOptions { detach: true, ..Default::default() });
    let success = ctx.start_only().await.unwrap();

    assert!(success);
    let m1 = ctx.runtime("m1").unwrap();
    assert!(m1.started);
    assert!(!m1.is_ignored());

    let m2 = ctx.runtime("m2").unwrap();
    assert_eq!(m2.ignore_reason(), Some(IgnoreReason::ManualUnreachable));
    assert!(ctx.ignore_set().contains("m2"));
    assert_eq!(fx.connector.connect_attempts(M2_PORT), 5);

    assert!(has_status(&reporter, "m1", "Start (kvm)", Status::Ok));
    assert!(has_status(&reporter, "m2", "Join", Status::Ignore));

    let launches = fx.engine.launches();
    assert_eq!(launches.len(), 1);
    assert!(launches[0].detach);
    assert_eq!(launches[0].args, vec!["-m", "2G", "-accel", "kvm"]);
}

#[tokio::test]
async fn test_pattern_selects_single_machine() {
    let fx = fixture();
    let (mut ctx, _reporter) = fx.context(&["m1"], RunOptions::default());
    assert_eq!(ctx.machines().len(), 1);

    assert!(ctx.start_only().await.unwrap());
    assert_eq!(fx.connector.connect_attempts(M2_PORT), 0);
}

#[tokio::test]
async fn test_already_running_machine_is_joined_not_owned() {
    let fx = fixture();
    fx.engine.script("m1", LaunchScript::Exit(Some(1)));

    let (mut ctx, reporter) = fx.context(&["m1"], RunOptions::default());
    assert!(ctx.start_only().await.unwrap());

    let m1 = ctx.runtime("m1").unwrap();
    assert!(!m1.started);
    assert!(m1.session.is_some());
    assert!(has_status(&reporter, "m1", "Join", Status::Ok));
}

#[tokio::test]
async fn test_no_machine_available() {
    let fx = fixture();
    fs::remove_dir_all(fx.settings.machine_dir("m1")).unwrap();
    fx.replace_host(M2_PORT, MockHost::down());

    let (mut ctx, reporter) = fx.context(&[], RunOptions::default());
    let result = ctx.start_only().await;

    assert!(matches!(result, Err(FleetError::NoMachineAvailable)));
    assert!(has_status(&reporter, "m1", "Missing files", Status::Ignore));
    assert!(fx.engine.launches().is_empty());
}

#[tokio::test]
async fn test_version_mismatch_is_environmental() {
    let fx = fixture();
    let registry = REGISTRY.replace("\"shutdown\": \"sudo poweroff\"", "\"shutdown\": \"sudo poweroff\", \"version\": 3");
    let fx = Fixture {
        registry: Registry::from_json(&registry, "linux", true).unwrap(),
        ..fx
    };
    fs::write(fx.settings.machine_dir("m1").join("VERSION"), "2\n").unwrap();

    let (mut ctx, reporter) = fx.context(&[], RunOptions::default());
    assert!(ctx.start_only().await.unwrap());

    assert_eq!(ctx.runtime("m1").unwrap().ignore_reason(), Some(IgnoreReason::VersionMismatch));
    assert!(has_status(&reporter, "m1", "Machine version mismatch", Status::Ignore));
    assert!(fx.engine.launches().is_empty());
}

#[tokio::test]
async fn test_missing_engine_is_fatal() {
    let fx = fixture();
    let fx = Fixture {
        engine: Arc::new(MockEngine::missing()),
        ..fx
    };

    let (mut ctx, _reporter) = fx.context(&["m1"], RunOptions::default());
    assert!(matches!(ctx.start_only().await, Err(FleetError::MissingTool(_))));
}

// ============================================================================
// TEST PIPELINE
// ============================================================================

#[tokio::test]
async fn test_run_test_success_stops_started_machines() {
    let fx = fixture();
    let (mut ctx, reporter) = fx.context(&["m1"], RunOptions::default());

    let success = ctx.run_test().await.unwrap();
    assert!(success);

    let commands = fx.connector.commands(M1_PORT);
    assert!(commands.contains(&"node build.js x86 --config release".to_string()));
    assert!(commands.contains(&"node build.js x64 --config release".to_string()));
    assert!(commands.contains(&"node test_build.js --config release".to_string()));
    assert_eq!(
        commands.iter().filter(|c| *c == "node test/async.js").count(),
        2
    );
    assert_eq!(commands.last().map(String::as_str), Some("sudo poweroff"));
    assert!(fx.connector.is_closed(M1_PORT));
    assert!(!ctx.runtime("m1").unwrap().started);

    // Every upload directory received the snapshot once
    let pushed: Vec<String> = fx.connector.pushes(M1_PORT).into_iter().map(|(_, remote)| remote).collect();
    assert_eq!(
        pushed,
        vec!["/home/debian/fleet_x86", "/home/debian/fleet_x64", "/home/debian/fleet_test"]
    );

    assert!(has_status(&reporter, "m1", "Upload", Status::Ok));
    assert!(has_status(&reporter, "m1", "Stop", Status::Ok));
    assert!(reporter.lines().contains(&">> Status: SUCCESS".to_string()));
}

#[tokio::test]
async fn test_debug_mode_uses_debug_flags() {
    let fx = fixture();
    let (mut ctx, _reporter) = fx.context(
        &["m1"],
        RunOptions {
            mode: vmfleet::BuildMode::Debug,
            ..Default::default()
        },
    );

    assert!(ctx.run_test().await.unwrap());
    let commands = fx.connector.commands(M1_PORT);
    assert!(commands.contains(&"node build.js x64 --debug".to_string()));
    assert!(commands.contains(&"node test_build.js --debug".to_string()));
}

#[tokio::test]
async fn test_failing_test_build_skips_remaining_commands() {
    let fx = fixture();
    fx.replace_host(
        M1_PORT,
        MockHost::up()
            .shutdown_with("sudo poweroff")
            .respond("test_build.js", 1, "", "g++: fatal error"),
    );

    let (mut ctx, reporter) = fx.context(&["m1"], RunOptions::default());
    let success = ctx.run_test().await.unwrap();

    assert!(!success);
    let commands = fx.connector.commands(M1_PORT);
    assert!(!commands.iter().any(|c| c.contains("test/sync.js")));
    assert!(!commands.iter().any(|c| c.contains("test/async.js")));

    // Test failures do not take the machine out of the run
    assert!(!ctx.runtime("m1").unwrap().is_ignored());
    assert!(has_status(&reporter, "m1", "Linux > Build", Status::Error));
    assert!(reporter.lines().iter().any(|l| l.trim() == "g++: fatal error"));
    assert!(reporter.lines().contains(&">> Status: FAILED".to_string()));
}

#[tokio::test]
async fn test_failing_test_command_does_not_stop_sequence() {
    let fx = fixture();
    fx.replace_host(
        M1_PORT,
        MockHost::up()
            .shutdown_with("sudo poweroff")
            .respond("test/sync.js", 1, "1 test failed", ""),
    );

    let (mut ctx, reporter) = fx.context(&["m1"], RunOptions::default());
    assert!(!ctx.run_test().await.unwrap());

    let commands = fx.connector.commands(M1_PORT);
    let sync = commands.iter().position(|c| c == "node test/sync.js").unwrap();
    let async_ = commands.iter().position(|c| c == "node test/async.js").unwrap();
    assert!(sync < async_);
    assert!(has_status(&reporter, "m1", "Linux > Sync", Status::Error));
}

#[tokio::test]
async fn test_compile_failure_ignores_machine_for_the_rest_of_the_run() {
    let fx = fixture();
    fx.replace_host(
        M1_PORT,
        MockHost::up()
            .shutdown_with("sudo poweroff")
            .respond("build.js x64", 2, "", "undefined reference"),
    );

    let (mut ctx, reporter) = fx.context(&["m1"], RunOptions::default());
    assert!(!ctx.run_test().await.unwrap());

    let m1 = ctx.runtime("m1").unwrap();
    assert_eq!(m1.ignore_reason(), Some(IgnoreReason::BuildFailed));

    // Only the shutdown follows the failed build
    let commands = fx.connector.commands(M1_PORT);
    assert!(!commands.iter().any(|c| c.contains("test_build.js")));
    assert_eq!(commands.last().map(String::as_str), Some("sudo poweroff"));
    assert!(has_status(&reporter, "m1", "x64 > Build", Status::Error));
}

#[tokio::test]
async fn test_upload_failure_is_a_run_failure() {
    let fx = fixture();
    fx.replace_host(M1_PORT, MockHost::up().shutdown_with("sudo poweroff").failing_push());

    let (mut ctx, reporter) = fx.context(&["m1"], RunOptions::default());
    assert!(!ctx.run_test().await.unwrap());

    assert_eq!(ctx.runtime("m1").unwrap().ignore_reason(), Some(IgnoreReason::TransferFailed));
    assert!(has_status(&reporter, "m1", "Upload", Status::Error));
    assert!(!fx.connector.commands(M1_PORT).iter().any(|c| c.contains("build.js")));
}

#[tokio::test]
async fn test_phases_wait_for_every_machine() {
    let fx = fixture();
    fx.replace_host(M2_PORT, MockHost::up().slow(Duration::from_millis(30)));

    let (mut ctx, _reporter) = fx.context(&[], RunOptions::default());
    assert!(ctx.run_test().await.unwrap());

    let events = fx.connector.events();
    let m2_joined = events
        .iter()
        .position(|e| *e == MockEvent::Connected(M2_PORT))
        .unwrap();
    let m1_first_push = events
        .iter()
        .position(|e| matches!(e, MockEvent::Push(M1_PORT, _)))
        .unwrap();
    assert!(m2_joined < m1_first_push);

    let is_compile = |e: &MockEvent| matches!(e, MockEvent::Exec(_, c) if c.starts_with("node build.js"));
    let is_test = |e: &MockEvent| matches!(e, MockEvent::Exec(_, c) if c.starts_with("node test"));
    let last_compile = events.iter().rposition(is_compile).unwrap();
    let first_test = events.iter().position(is_test).unwrap();
    assert_eq!(events[last_compile].port(), M2_PORT);
    assert!(last_compile < first_test);
}

#[tokio::test]
async fn test_shutdown_timeout_does_not_fail_the_run() {
    let fx = fixture();
    fx.replace_host(M1_PORT, MockHost::up().shutdown_with("sudo poweroff").hanging_on_shutdown());

    let (mut ctx, reporter) = fx.context(&["m1"], RunOptions::default());
    assert!(ctx.run_test().await.unwrap());
    assert!(has_status(&reporter, "m1", "Stop", Status::Error));
}

// ============================================================================
// DIST PIPELINE
// ============================================================================

#[tokio::test]
async fn test_dist_packages_surviving_artifacts_after_compile_failure() {
    let fx = fixture();
    fx.replace_host(
        M1_PORT,
        MockHost::up()
            .shutdown_with("sudo poweroff")
            .respond("build.js x64", 2, "", "undefined reference")
            .serving("koffi.node", "linux binary"),
    );

    let (mut ctx, reporter) = fx.context(&[], RunOptions::default());
    let outcome = ctx.run_dist().await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.version, "2.8.0");
    assert_eq!(ctx.runtime("m1").unwrap().ignore_reason(), Some(IgnoreReason::BuildFailed));

    // Collection skips m1 entirely
    assert!(fx.connector.pulls(M1_PORT).is_empty());
    assert_eq!(fx.connector.pulls(M2_PORT).len(), 1);

    let layout = outcome.package_dir.join("build/koffi");
    assert!(layout.join("darwin_arm64/koffi.node").is_file());
    assert!(!layout.join("linux_x64").exists());
    assert!(!layout.join("linux_ia32").exists());

    assert!(has_status(&reporter, "m2", "Pack", Status::Ok));
    assert!(fx.connector.is_closed(M1_PORT));
}

#[tokio::test]
async fn test_dist_assembles_package() {
    let fx = fixture();
    let (mut ctx, reporter) = fx.context(&[], RunOptions::default());
    let outcome = ctx.run_dist().await.unwrap();
    assert!(outcome.success);

    let dist = &outcome.package_dir;
    let linux = dist.join("build/koffi/linux_x64");
    assert!(linux.join("koffi.node").is_file());
    // Versioned lock files never leave the machine
    assert!(!linux.join("v8.lock").exists());
    assert!(dist.join("build/koffi/linux_ia32/koffi.node").is_file());
    assert!(dist.join("build/koffi/darwin_arm64/koffi.node").is_file());

    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dist.join("package.json")).unwrap()).unwrap();
    assert_eq!(
        manifest["scripts"],
        serde_json::json!({ "install": fx.settings.package.install_script })
    );
    assert!(manifest.get("devDependencies").is_none());

    assert!(dist.join("index.js").is_file());
    assert!(!dist.join("src/koffi/index.js").exists());
    assert!(!dist.join("src/koffi/package.json").exists());
    assert!(dist.join("src/koffi/src/ffi.cc").is_file());
    assert!(!dist.join("notes").exists());

    let lines = reporter.lines();
    assert!(lines.contains(&">> Version: 2.8.0".to_string()));
    assert!(has_status(&reporter, "m1", "x64 > Status", Status::Missing));
    assert!(has_status(&reporter, "m2", "arm > Status", Status::Manual));
    assert!(lines.contains(&">> Test prebuild".to_string()));
}

#[tokio::test]
async fn test_dist_skips_machines_when_everything_is_built() {
    let fx = fixture();
    for target in ["linux_ia32", "linux_x64", "darwin_arm64"] {
        write(
            &fx.settings.artifact_root().join("2.8.0").join(target).join("koffi.node"),
            "prebuilt",
        );
    }

    let (mut ctx, reporter) = fx.context(&[], RunOptions::default());
    let outcome = ctx.run_dist().await.unwrap();

    assert!(outcome.success);
    assert!(fx.engine.launches().is_empty());
    assert_eq!(fx.connector.connect_attempts(M1_PORT), 0);
    assert_eq!(fx.connector.connect_attempts(M2_PORT), 0);
    assert_eq!(ctx.runtime("m1").unwrap().ignore_reason(), Some(IgnoreReason::AlreadyBuilt));
    assert!(has_status(&reporter, "m1", "x64 > Status", Status::Ok));
    assert!(outcome.package_dir.join("build/koffi/linux_x64/koffi.node").is_file());
}

#[tokio::test]
async fn test_dist_with_unreachable_manual_machine_succeeds() {
    let fx = fixture();
    fx.replace_host(M2_PORT, MockHost::down());

    let (mut ctx, reporter) = fx.context(&[], RunOptions::default());
    let outcome = ctx.run_dist().await.unwrap();

    assert!(outcome.success);
    assert_eq!(ctx.runtime("m2").unwrap().ignore_reason(), Some(IgnoreReason::ManualUnreachable));
    assert!(fx.connector.pulls(M2_PORT).is_empty());

    let layout = outcome.package_dir.join("build/koffi");
    assert!(layout.join("linux_x64/koffi.node").is_file());
    assert!(!layout.join("darwin_arm64").exists());

    let lines = reporter.lines();
    assert!(lines.contains(&">> Status: SUCCESS".to_string()));
    assert!(lines.contains(&"   (but some machines could not be tested)".to_string()));
}

#[tokio::test]
async fn test_dist_with_missing_machine_files_succeeds() {
    let fx = fixture();
    fs::remove_dir_all(fx.settings.machine_dir("m1")).unwrap();

    let (mut ctx, reporter) = fx.context(&[], RunOptions::default());
    let outcome = ctx.run_dist().await.unwrap();

    assert!(outcome.success);
    assert_eq!(ctx.runtime("m1").unwrap().ignore_reason(), Some(IgnoreReason::MissingFiles));
    assert!(fx.engine.launches().is_empty());
    assert!(outcome.package_dir.join("build/koffi/darwin_arm64/koffi.node").is_file());
    assert!(has_status(&reporter, "m1", "Missing files", Status::Ignore));
}

#[tokio::test]
async fn test_dist_smoke_failure_is_fatal() {
    let fx = fixture();
    let mut settings = (*fx.settings).clone();
    settings.package.smoke_test = CommandTemplate {
        program: "sh".to_string(),
        args: vec![
            "-c".to_string(),
            "echo \"cannot load $1\" >&2; exit 3".to_string(),
            "smoke".to_string(),
            "{{entry}}".to_string(),
        ],
    };
    let fx = Fixture {
        settings: Arc::new(settings),
        ..fx
    };

    let (mut ctx, reporter) = fx.context(&[], RunOptions::default());
    let result = ctx.run_dist().await;

    match result {
        Err(FleetError::Package(PackageError::SmokeTestFailed(output))) => {
            assert!(output.contains("cannot load"));
            assert!(output.contains("koffi.node"));
        }
        other => panic!("expected smoke test failure, got {:?}", other.map(|o| o.success)),
    }

    // Machines were stopped before packaging
    assert!(fx.connector.is_closed(M1_PORT));
    assert!(reporter.lines().contains(&">> Status: FAILED".to_string()));
}

// ============================================================================
// STOP / RESET / INFO
// ============================================================================

#[tokio::test]
async fn test_stop_all_checks_unreachable_machines() {
    let fx = fixture();
    fx.replace_host(M1_PORT, MockHost::down());

    let (mut ctx, reporter) = fx.context(&[], RunOptions::default());
    assert!(ctx.stop_all().await.unwrap());

    assert_eq!(fx.connector.connect_attempts(M1_PORT), 1);
    // Manual machines are never stopped
    assert_eq!(fx.connector.connect_attempts(M2_PORT), 0);
    assert!(has_status(&reporter, "m1", "Already down", Status::Ok));
}

#[tokio::test]
async fn test_stop_all_shuts_down_running_machine() {
    let fx = fixture();
    let (mut ctx, reporter) = fx.context(&["m1"], RunOptions::default());
    assert!(ctx.stop_all().await.unwrap());

    assert_eq!(fx.connector.commands(M1_PORT), vec!["sudo poweroff"]);
    assert!(has_status(&reporter, "m1", "Stop", Status::Ok));
}

#[tokio::test]
async fn test_reset_restores_base_snapshot() {
    let fx = fixture();
    let (mut ctx, reporter) = fx.context(&[], RunOptions::default());
    assert!(ctx.reset().await.unwrap());

    let restores = fx.engine.restores();
    assert_eq!(restores.len(), 1);
    assert_eq!(restores[0].0, fx.settings.machine_dir("m1"));
    assert_eq!(restores[0].1, "disk.qcow2");
    assert_eq!(restores[0].2, "base");
    assert!(has_status(&reporter, "m1", "Reset disk", Status::Ok));
}

#[tokio::test]
async fn test_reset_failure_prints_standard_error() {
    let fx = fixture();
    fx.engine.set_restore_output(vmfleet::ExecOutput {
        code: Some(1),
        stdout: String::new(),
        stderr: "Could not open 'disk.qcow2'".to_string(),
    });

    let (mut ctx, reporter) = fx.context(&["m1"], RunOptions::default());
    assert!(!ctx.reset().await.unwrap());
    assert!(has_status(&reporter, "m1", "Reset disk", Status::Error));
    assert!(reporter.lines().iter().any(|l| l.trim() == "Could not open 'disk.qcow2'"));
}

#[tokio::test]
async fn test_info_lists_bootable_machines() {
    let fx = fixture();
    let (ctx, reporter) = fx.context(&[], RunOptions::default());
    ctx.info();

    assert_eq!(
        reporter.lines(),
        vec![
            ">> m1 (m1)",
            "  - SSH port: 22201",
            "  - VNC port: none",
            "  - Username: debian",
            "  - Password: debian",
        ]
    );
}
