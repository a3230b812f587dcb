//! Common test utilities
#![allow(dead_code)]

use async_trait::async_trait;
use cohesion::config::{load_config, Config};
use cohesion::error::ExecutionResult;
use cohesion::plugin::PluginCatalog;
use cohesion::runner::{
    CommandOutcome, CommandRequest, CommandRunner, Engine, Reporter, Verbosity,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Create a temporary directory with a cohesion.yml file
pub fn create_test_config(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("cohesion.yml");
    fs::write(&config_path, content).unwrap();
    (temp_dir, config_path)
}

/// A temporary monorepo
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Workspace {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Write a file, creating its parent directories
    pub fn write(&self, relative: &str, content: &str) -> &Self {
        let path = self.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        self
    }

    /// Load a config file of the workspace as the root Config
    pub async fn load(&self, relative: &str) -> Arc<Config> {
        load_config(relative, self.path()).await.unwrap()
    }
}

/// Records commands instead of running them.
///
/// Commands containing `fail` exit with 1. Each command takes `delay`, and
/// the highest number of commands in flight at once is tracked.
#[derive(Clone, Default)]
pub struct RecordingRunner {
    requests: Arc<Mutex<Vec<CommandRequest>>>,
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.command.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<CommandRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, request: CommandRequest) -> ExecutionResult<CommandOutcome> {
        let code = if request.command.contains("fail") { 1 } else { 0 };
        self.requests.lock().unwrap().push(request);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(CommandOutcome { code: Some(code) })
    }
}

/// Engine for a Config's plugins, recording commands instead of running them
pub fn engine(config: &Config, runner: &RecordingRunner) -> Engine {
    let registry = PluginCatalog::builtin()
        .build_registry(&config.plugins)
        .unwrap();
    Engine::new(registry)
        .with_runner(runner.clone())
        .with_reporter(Reporter::new(Verbosity::Silent))
}
