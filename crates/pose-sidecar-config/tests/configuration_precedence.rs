use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use ortho_config::OrthoConfig;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use pose_sidecar_config::{
    Config, DEFAULT_PORT, LaunchTrigger, default_log_filter, default_log_format,
};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct Harness {
    temp_dir: TempDir,
    cli_args: RefCell<Vec<OsString>>,
    env_overrides: RefCell<Vec<(String, Option<OsString>)>>,
    env_guard: RefCell<Option<MutexGuard<'static, ()>>>,
    loaded: RefCell<Option<Config>>,
    error: RefCell<Option<String>>,
}

impl Harness {
    fn new() -> Self {
        let temp_dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(error) => panic!("failed to create temporary directory: {error}"),
        };
        Self {
            temp_dir,
            cli_args: RefCell::new(vec![OsString::from("pose-sidecar")]),
            env_overrides: RefCell::new(Vec::new()),
            env_guard: RefCell::new(None),
            loaded: RefCell::new(None),
            error: RefCell::new(None),
        }
    }

    fn write_config(&self, port: u16) {
        let path = self.temp_dir.path().join("pose-sidecar.toml");
        if let Err(error) = fs::write(&path, format!("port = {port}\n")) {
            panic!("failed to write configuration: {error}");
        }
        let mut args = self.cli_args.borrow_mut();
        args.push(OsString::from("--config-path"));
        args.push(path.into_os_string());
    }

    fn hold_env_lock(&self) {
        if self.env_guard.borrow().is_none() {
            let guard = ENV_MUTEX
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *self.env_guard.borrow_mut() = Some(guard);
        }
    }

    fn set_env(&self, key: &str, value: &str) {
        self.hold_env_lock();
        let previous = std::env::var_os(key);
        // Environment mutation is `unsafe` in edition 2024. Overrides are
        // serialised by `ENV_MUTEX` and restored in `Drop`.
        unsafe { std::env::set_var(key, value) };
        self.env_overrides
            .borrow_mut()
            .push((key.to_owned(), previous));
    }

    fn push_cli_arg(&self, arg: impl Into<OsString>) {
        self.cli_args.borrow_mut().push(arg.into());
    }

    fn load(&self) {
        if self.loaded.borrow().is_some() || self.error.borrow().is_some() {
            return;
        }
        self.hold_env_lock();
        let args = self.cli_args.borrow().clone();
        match Config::load_from_iter(args) {
            Ok(config) => *self.loaded.borrow_mut() = Some(config),
            Err(error) => *self.error.borrow_mut() = Some(error.to_string()),
        }
    }

    fn loaded_config(&self) -> Config {
        self.load();
        if let Some(error) = self.error.borrow().as_ref() {
            panic!("configuration failed to load: {error}");
        }
        match self.loaded.borrow().as_ref() {
            Some(config) => config.clone(),
            None => panic!("configuration was not loaded"),
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let mut overrides = self.env_overrides.borrow_mut();
        while let Some((key, value)) = overrides.pop() {
            match value {
                Some(os_value) => unsafe { std::env::set_var(&key, os_value) },
                None => unsafe { std::env::remove_var(&key) },
            }
        }
        drop(self.env_guard.borrow_mut().take());
    }
}

fn parse_port(port: &str) -> u16 {
    match port.parse::<u16>() {
        Ok(port) => port,
        Err(error) => panic!("invalid port '{port}': {error}"),
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

#[given("a configuration file setting the port to \"{port}\"")]
fn given_configuration_file(harness: &Harness, port: String) {
    harness.write_config(parse_port(&port));
}

#[given("the environment overrides the port to \"{port}\"")]
fn given_environment_override(harness: &Harness, port: String) {
    harness.set_env("POSE_SIDECAR_PORT", &port);
}

#[when("the CLI sets the port to \"{port}\"")]
fn when_cli_override(harness: &Harness, port: String) {
    harness.push_cli_arg("--port");
    harness.push_cli_arg(OsString::from(&port));
}

#[when("the configuration loads without overrides")]
fn when_load_without_overrides(harness: &Harness) {
    harness.load();
}

#[then("loading the configuration resolves the port to \"{port}\"")]
fn then_resolved_port(harness: &Harness, port: String) {
    let config = harness.loaded_config();
    assert_eq!(config.port, parse_port(&port));
}

#[then("loading the configuration applies the built-in defaults")]
fn then_defaults_applied(harness: &Harness) {
    let config = harness.loaded_config();
    assert_eq!(config.port, DEFAULT_PORT);
    assert_eq!(config.log_filter(), default_log_filter());
    assert_eq!(config.log_format(), default_log_format());
    assert_eq!(config.launch_trigger(), LaunchTrigger::OnDemand);
    assert_eq!(config.heartbeat_interval_ms, 500);
}

#[scenario(path = "tests/features/configuration_precedence.feature", index = 0)]
fn defaults_apply_without_overrides(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(path = "tests/features/configuration_precedence.feature", index = 1)]
fn file_overrides_defaults(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(path = "tests/features/configuration_precedence.feature", index = 2)]
fn environment_overrides_file(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(path = "tests/features/configuration_precedence.feature", index = 3)]
fn cli_overrides_every_layer(#[from(harness)] harness: Harness) {
    let _ = harness;
}
