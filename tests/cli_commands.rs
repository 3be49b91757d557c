//! Command-line parsing through [`Fleet`] dispatch.

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;
use vmfleet::cli::Cli;
use vmfleet::config::{FleetSettings, Registry};
use vmfleet::error::RegistryError;
use vmfleet::mock::{MockConnector, MockEngine, MockHost};
use vmfleet::snapshot::PathFilter;
use vmfleet::{Command, Fleet, FleetError, Invocation};

const REGISTRY: &str = r#"{
    "m1": {
        "name": "Debian",
        "platform": "linux",
        "qemu": {
            "binary": "qemu-system-x86_64",
            "disk": "disk.qcow2",
            "ssh_port": 22201,
            "vnc_port": 5901,
            "username": "debian",
            "password": "secret",
            "shutdown": "sudo poweroff"
        },
        "tests": {
            "Linux": {
                "directory": "/home/debian/fleet",
                "build": "make",
                "commands": { "Unit": "make check" }
            }
        }
    },
    "m2": {
        "name": "macOS",
        "platform": "darwin",
        "ssh": { "port": 22301, "username": "macos", "password": "macos" }
    }
}"#;

struct Setup {
    _dir: TempDir,
    settings: Arc<FleetSettings>,
    engine: Arc<MockEngine>,
    connector: MockConnector,
}

fn setup() -> Setup {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("source");
    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(root.join("src/main.c"), "int main() {}\n").unwrap();
    fs::create_dir_all(dir.path().join("machines/m1")).unwrap();

    let mut settings = FleetSettings::default();
    settings.paths.root = root;
    settings.paths.machines = dir.path().join("machines");
    settings.paths.build = dir.path().join("build");
    settings.snapshot.filter = PathFilter::all();
    settings.timing.settle_ms = 0;
    settings.timing.join_attempts = 2;
    settings.timing.probe_attempts = 1;
    settings.timing.manual_join_attempts = 1;
    settings.timing.retry_interval_ms = 1;
    settings.timing.shutdown_timeout_ms = 100;

    let connector = MockConnector::new();
    connector.add_host(22201, MockHost::up().shutdown_with("sudo poweroff"));
    connector.add_host(22301, MockHost::down());

    Setup {
        _dir: dir,
        settings: Arc::new(settings),
        engine: Arc::new(MockEngine::new()),
        connector,
    }
}

impl Setup {
    fn fleet(&self) -> Fleet {
        self.fleet_with(self.connector.clone())
    }

    fn fleet_with(&self, connector: MockConnector) -> Fleet {
        let registry = Registry::from_json(REGISTRY, "linux", false).unwrap();
        Fleet::new(self.settings.clone(), registry)
            .with_tools(self.engine.clone(), Arc::new(connector))
            .capturing()
    }
}

fn invocation(args: &[&str]) -> Invocation {
    let mut argv = vec!["vmfleet"];
    argv.extend_from_slice(args);
    Cli::parse_from_args(argv).unwrap().command.into_invocation()
}

#[tokio::test]
async fn test_banner_lists_selected_machines() {
    let setup = setup();
    let outcome = setup.fleet().run(&invocation(&["info"])).await.unwrap();

    let lines = outcome.reporter.lines();
    assert_eq!(lines[0], "Machines: Debian, macOS");
    assert_eq!(lines[1], "");
    assert!(outcome.success);
}

#[tokio::test]
async fn test_info_lists_connection_details() {
    let setup = setup();
    let outcome = setup.fleet().run(&invocation(&["info", "m*"])).await.unwrap();

    let lines = outcome.reporter.lines();
    assert!(lines.contains(&">> Debian (m1)".to_string()));
    assert!(lines.contains(&"  - VNC port: 5901".to_string()));
    assert!(lines.contains(&"  - Password: secret".to_string()));
    // Manual machines have nothing to show
    assert!(!lines.iter().any(|l| l.contains("(m2)")));
    assert_eq!(setup.connector.connect_attempts(22201), 0);
}

#[tokio::test]
async fn test_ssh_requires_exactly_one_machine() {
    let setup = setup();
    let err = setup.fleet().run(&invocation(&["ssh"])).await.unwrap_err();
    assert!(matches!(err, FleetError::SingleMachineRequired(ref c) if c == "ssh"));
    assert_eq!(
        err.user_message(),
        "The ssh command can only be used with one machine"
    );
}

#[tokio::test]
async fn test_missing_ssh_client() {
    let setup = setup();
    let fleet = setup.fleet_with(MockConnector::missing());
    let err = fleet.run(&invocation(&["stop"])).await.unwrap_err();
    assert!(matches!(err, FleetError::MissingTool(_)));

    // Info never needs the client
    let outcome = fleet.run(&invocation(&["info"])).await.unwrap();
    assert!(outcome.success);
}

#[tokio::test]
async fn test_unmatched_pattern_aborts_before_any_machine() {
    let setup = setup();
    let err = setup
        .fleet()
        .run(&invocation(&["start", "m1", "freebsd"]))
        .await
        .unwrap_err();

    assert!(matches!(err, FleetError::Registry(RegistryError::NoMatch(_))));
    assert!(setup.engine.launches().is_empty());
    assert_eq!(setup.connector.connect_attempts(22201), 0);
}

#[tokio::test]
async fn test_start_detaches_with_keyboard_layout() {
    let setup = setup();
    let outcome = setup
        .fleet()
        .run(&invocation(&["start", "-k", "fr", "m1"]))
        .await
        .unwrap();

    assert!(outcome.success);
    let launches = setup.engine.launches();
    assert_eq!(launches.len(), 1);
    assert!(launches[0].detach);
    assert_eq!(launches[0].args, vec!["-k", "fr"]);
    // Start leaves the machine running
    assert!(!setup.connector.commands(22201).contains(&"sudo poweroff".to_string()));
}

#[tokio::test]
async fn test_debug_uses_debug_flags() {
    let setup = setup();
    let outcome = setup.fleet().run(&invocation(&["debug", "m1"])).await.unwrap();

    assert!(outcome.success);
    let commands = setup.connector.commands(22201);
    assert!(commands.contains(&"make --debug".to_string()));
    assert!(commands.contains(&"make check".to_string()));
    assert_eq!(commands.last().map(String::as_str), Some("sudo poweroff"));
    assert!(!setup.engine.launches()[0].detach);
}

#[tokio::test]
async fn test_test_uses_release_flags() {
    let setup = setup();
    setup.fleet().run(&invocation(&["test", "Debian"])).await.unwrap();
    assert!(setup
        .connector
        .commands(22201)
        .contains(&"make --config release".to_string()));
}

#[test]
fn test_invocation_from_cli() {
    let inv = invocation(&["build", "--no-accel", "debian_*"]);
    assert_eq!(inv.command, Command::Dist);
    assert!(!inv.accelerate);
    assert_eq!(inv.patterns, vec!["debian_*"]);
}
