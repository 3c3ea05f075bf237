use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEvent, Debouncer};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::locator;
use crate::manager::{Lifecycle, Shared};

/// Quiet period after the last filesystem event before the shim is regenerated.
///
/// Editors and installers usually touch a file several times per save; this
/// window folds those into one regeneration.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// An armed watch on the autoconfig directory
pub(crate) struct ConfigWatcher {
    dir: PathBuf,
    debouncer: Debouncer<RecommendedWatcher>,
    events: mpsc::UnboundedReceiver<DebounceEventResult>,
}

impl ConfigWatcher {
    /// Watch `dir` (non-recursively) for changes
    pub(crate) fn arm(dir: &Path, debounce: Duration) -> Result<Self> {
        let (tx, events) = mpsc::unbounded_channel();
        let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| {
            // Receiver gone means the loop already exited
            let _ = tx.send(result);
        })?;

        debouncer
            .watcher()
            .watch(dir, RecursiveMode::NonRecursive)?;

        info!(
            "Watching {} for CNI configuration changes (debounce: {:?})",
            dir.display(),
            debounce
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            debouncer,
            events,
        })
    }

    /// Process debounced change batches one at a time until `cancel` fires
    pub(crate) async fn run(self, shared: Arc<Shared>, cancel: CancellationToken) {
        let ConfigWatcher {
            dir,
            debouncer,
            mut events,
        } = self;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Stopping CNI configuration watch on {}", dir.display());
                    break;
                }
                batch = events.recv() => match batch {
                    Some(Ok(batch)) => {
                        let changed =
                            changed_configs(&batch, shared.shim_path(), &shared.tracked_names());
                        if changed.is_empty() {
                            continue;
                        }
                        debug!("CNI configuration changes in {}: {:?}", dir.display(), changed);
                        regenerate(&shared, changed).await;
                    }
                    Some(Err(e)) => {
                        error!("Error watching {}: {}", dir.display(), e);
                    }
                    None => {
                        error!("Watch on {} closed unexpectedly", dir.display());
                        break;
                    }
                },
            }
        }

        // Releases the OS watch before the tracker sees this task finish
        drop(debouncer);
        shared.set_lifecycle(Lifecycle::Stopped);
    }
}

/// File names touched by `batch` that may affect the primary configuration.
///
/// Files in `tracked` (the explicit master and the current primary) always
/// count whatever their name; anything else must look like a CNI
/// configuration. The shim itself never counts.
fn changed_configs(
    batch: &[DebouncedEvent],
    shim_path: &Path,
    tracked: &[String],
) -> Vec<String> {
    let mut names: Vec<String> = batch
        .iter()
        .map(|event| event.path.as_path())
        .filter(|path| !locator::same_file(path, shim_path))
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            let relevant = tracked.contains(&name) || locator::is_cni_config(path);
            relevant.then_some(name)
        })
        .collect();
    names.sort();
    names.dedup();
    names
}

async fn regenerate(shared: &Arc<Shared>, changed: Vec<String>) {
    let worker = Arc::clone(shared);
    let result = tokio::task::spawn_blocking(move || worker.refresh(&changed)).await;

    match result {
        Ok(Ok(Some(_))) => {
            shared.record_regeneration();
            info!(
                "Regenerated multus configuration {}",
                shared.shim_path().display()
            );
        }
        Ok(Ok(None)) => {}
        Ok(Err(e)) if e.is_not_found() => {
            warn!(
                "Primary CNI configuration unavailable, keeping {}: {}",
                shared.shim_path().display(),
                e
            );
        }
        Ok(Err(e)) => {
            error!(
                "Failed to regenerate multus configuration, keeping {}: {}",
                shared.shim_path().display(),
                e
            );
        }
        Err(e) => {
            error!("Regeneration task failed: {}", e);
        }
    }
}
