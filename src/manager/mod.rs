//! Configuration manager for the multus shim.
//!
//! The manager tracks one primary (delegate) CNI configuration, derives the
//! shim configuration from it and keeps the shim file on disk in sync while
//! its watch loop runs.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::codec;
use crate::config::MultusConfig;
use crate::error::{ConfigError, Result};
use crate::locator;
use crate::types::{NetConfDocument, ShimConfig};
use crate::version;
use crate::watcher::{ConfigWatcher, DEFAULT_DEBOUNCE};

/// Lifecycle of a [`Manager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed, shim written, not watching
    Ready,
    /// Watch loop running
    Watching,
    /// Watch loop exited; the manager cannot be started again
    Stopped,
}

/// Where the shim network name comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameSource {
    TopLevel,
    Delegate,
}

struct DelegateState {
    primary_path: PathBuf,
    document: NetConfDocument,
    name_source: NameSource,
}

/// State shared between the manager and its watch loop
pub(crate) struct Shared {
    config: MultusConfig,
    shim_path: PathBuf,
    delegate: Mutex<DelegateState>,
    lifecycle: Mutex<Lifecycle>,
    regenerations: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Parse a delegate file and bring its version in line with the top-level one
fn load_delegate(path: &Path, config: &MultusConfig) -> Result<NetConfDocument> {
    let document = codec::parse(path)?;
    version::reconcile(path, document, &config.cni_version, config.force_cni_version)
}

fn absolute(path: PathBuf) -> Result<PathBuf> {
    std::path::absolute(&path).map_err(|e| ConfigError::io(path, e))
}

impl Shared {
    pub(crate) fn autoconfig_dir(&self) -> &Path {
        &self.config.autoconfig_dir
    }

    pub(crate) fn shim_path(&self) -> &Path {
        &self.shim_path
    }

    pub(crate) fn set_lifecycle(&self, lifecycle: Lifecycle) {
        *lock(&self.lifecycle) = lifecycle;
    }

    /// File names whose changes always concern the primary configuration
    pub(crate) fn tracked_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.config.master_cni_file_name.iter().cloned().collect();
        if let Some(name) = self.primary_path().file_name() {
            names.push(name.to_string_lossy().into_owned());
        }
        names
    }

    pub(crate) fn record_regeneration(&self) {
        self.regenerations.fetch_add(1, Ordering::Relaxed);
    }

    fn primary_path(&self) -> PathBuf {
        lock(&self.delegate).primary_path.clone()
    }

    /// Re-read the current primary configuration and render the shim
    fn generate(&self) -> Result<String> {
        let path = self.primary_path();
        self.generate_from(&path)
    }

    /// Load `path` as the primary configuration and render the shim from it.
    ///
    /// The tracked primary path and document are only updated on success.
    fn generate_from(&self, path: &Path) -> Result<String> {
        let document = load_delegate(path, &self.config)?;

        let mut state = lock(&self.delegate);
        let shim = self.build_shim(path, &document, state.name_source)?;
        let rendered = shim
            .to_json()
            .map_err(|e| ConfigError::malformed(path, e))?;

        if state.primary_path != path {
            info!(
                "Primary CNI configuration moved from {} to {}",
                state.primary_path.display(),
                path.display()
            );
            state.primary_path = path.to_path_buf();
        }
        state.document = document;
        Ok(rendered)
    }

    fn build_shim(
        &self,
        path: &Path,
        document: &NetConfDocument,
        name_source: NameSource,
    ) -> Result<ShimConfig> {
        let cni_version = document
            .cni_version()
            .ok_or_else(|| ConfigError::malformed(path, "missing required key 'cniVersion'"))?;

        let name = match name_source {
            NameSource::TopLevel => self.config.name.as_str(),
            NameSource::Delegate => document.name().ok_or(ConfigError::MissingNetworkName)?,
        };

        Ok(ShimConfig::new(cni_version, name, &path.to_string_lossy())
            .with_capabilities(document.capabilities()))
    }

    fn persist(&self, path: &Path) -> Result<String> {
        let rendered = self.generate_from(path)?;
        codec::write_atomic(&self.shim_path, rendered.as_bytes())?;
        debug!("Wrote shim configuration {}", self.shim_path.display());
        Ok(rendered)
    }

    /// React to changes of the given file names in the autoconfig directory.
    ///
    /// Returns the new shim when it was rewritten, `None` when the changes do
    /// not concern the primary configuration.
    pub(crate) fn refresh(&self, changed: &[String]) -> Result<Option<String>> {
        let name = locator::locate(&self.config.autoconfig_dir, &self.config)?;
        let located = absolute(self.config.autoconfig_dir.join(&name))?;

        let switched = located != self.primary_path();
        if !switched && !changed.iter().any(|c| *c == name) {
            return Ok(None);
        }

        self.persist(&located).map(Some)
    }
}

/// Owner of the generated shim configuration
pub struct Manager {
    shared: Arc<Shared>,
    debounce: Duration,
}

impl Manager {
    /// Locate and validate the primary configuration, then write the initial shim
    pub fn new(config: MultusConfig) -> Result<Self> {
        let name = locator::locate(&config.autoconfig_dir, &config)?;
        let primary_path = absolute(config.autoconfig_dir.join(&name))?;
        info!("Using {} as the primary CNI configuration", primary_path.display());

        let document = load_delegate(&primary_path, &config)
            .map_err(|e| ConfigError::LoadPrimaryConfig(Box::new(e)))?;

        let override_name = config.override_network_name;
        let shim_path = config.multus_config_file_path();
        let manager = Self {
            shared: Arc::new(Shared {
                config,
                shim_path,
                delegate: Mutex::new(DelegateState {
                    primary_path: primary_path.clone(),
                    document,
                    name_source: NameSource::TopLevel,
                }),
                lifecycle: Mutex::new(Lifecycle::Ready),
                regenerations: AtomicU64::new(0),
            }),
            debounce: DEFAULT_DEBOUNCE,
        };

        if override_name {
            manager.override_network_name()?;
        }

        manager.shared.persist(&primary_path)?;
        info!(
            "Wrote multus configuration {}",
            manager.shared.shim_path.display()
        );
        Ok(manager)
    }

    /// Use a different debounce window for the watch loop
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Render the shim configuration from the current primary configuration.
    ///
    /// Nothing is written to disk.
    pub fn generate_config(&self) -> Result<String> {
        self.shared.generate()
    }

    /// Render the shim configuration and write it to [`Self::multus_config_file_path`]
    pub fn persist_config(&self) -> Result<String> {
        let path = self.shared.primary_path();
        self.shared.persist(&path)
    }

    /// Name the shim network after the delegate instead of the top-level name
    pub fn override_network_name(&self) -> Result<()> {
        let mut state = lock(&self.shared.delegate);
        match state.document.name() {
            Some(name) if !name.is_empty() => {
                debug!("Shim network name now follows the delegate: {}", name);
                state.name_source = NameSource::Delegate;
                Ok(())
            }
            _ => Err(ConfigError::MissingNetworkName),
        }
    }

    /// Start watching the primary configuration.
    ///
    /// The watch is armed before this returns; the loop itself runs on
    /// `tracker` until `cancel` fires. Fails with [`ConfigError::NoRuntime`]
    /// outside a tokio runtime.
    pub fn start(&self, cancel: CancellationToken, tracker: &TaskTracker) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;

        let mut lifecycle = lock(&self.shared.lifecycle);
        match *lifecycle {
            Lifecycle::Ready => {}
            Lifecycle::Watching => return Err(ConfigError::AlreadyStarted),
            Lifecycle::Stopped => return Err(ConfigError::Stopped),
        }

        let watcher = ConfigWatcher::arm(self.shared.autoconfig_dir(), self.debounce)?;
        *lifecycle = Lifecycle::Watching;
        drop(lifecycle);

        tracker.spawn_on(watcher.run(Arc::clone(&self.shared), cancel), &runtime);
        Ok(())
    }

    /// Path of the generated shim configuration
    pub fn multus_config_file_path(&self) -> &Path {
        self.shared.shim_path()
    }

    /// Absolute path of the primary configuration currently tracked
    pub fn primary_config_path(&self) -> PathBuf {
        self.shared.primary_path()
    }

    /// Number of times the watch loop rewrote the shim
    pub fn regenerations(&self) -> u64 {
        self.shared.regenerations.load(Ordering::Relaxed)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *lock(&self.shared.lifecycle)
    }

    pub fn config(&self) -> &MultusConfig {
        &self.shared.config
    }
}
