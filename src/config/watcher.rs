//! Configuration and rule file watcher for hot reload.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::loader::load_config;
use crate::config::schema::GatekeeperConfig;
use crate::rule::loader::repository_path;

/// Monitors the configuration file and the rule files it names. Any change
/// re-reads the configuration and publishes it; rule files are re-read when
/// the update is applied. The set of watched rule files follows the
/// repositories of the latest configuration.
pub struct ConfigWatcher {
    config_path: PathBuf,
    rule_paths: BTreeSet<PathBuf>,
    update_tx: mpsc::UnboundedSender<GatekeeperConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(config_path: &Path, config: &GatekeeperConfig) -> (Self, mpsc::UnboundedReceiver<GatekeeperConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                rule_paths: rule_paths(config_path, config),
                config_path: config_path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned task owns the file watcher and ends once
    /// the update receiver is dropped.
    pub fn run(self) -> Result<JoinHandle<()>, notify::Error> {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = event_tx.send(res);
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.config_path, RecursiveMode::NonRecursive)?;
        let mut watched = BTreeSet::new();
        rewatch(&mut watcher, &mut watched, &self.rule_paths);
        tracing::info!(path = ?self.config_path, rule_files = watched.len(), "Config watcher started");

        let Self {
            config_path,
            update_tx,
            ..
        } = self;

        Ok(tokio::spawn(async move {
            while let Some(res) = event_rx.recv().await {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::error!(error = ?e, "Watch error");
                        continue;
                    }
                };
                if !(event.kind.is_modify() || event.kind.is_create()) {
                    continue;
                }

                tracing::info!(paths = ?event.paths, "Configuration change detected, reloading");
                match load_config(&config_path) {
                    Ok(new_config) => {
                        rewatch(&mut watcher, &mut watched, &rule_paths(&config_path, &new_config));
                        if update_tx.send(new_config).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to reload configuration, keeping the current one");
                    }
                }
            }
            tracing::debug!("Config watcher stopped");
        }))
    }
}

/// Local rule files named by `config`, excluding the config file itself.
fn rule_paths(config_path: &Path, config: &GatekeeperConfig) -> BTreeSet<PathBuf> {
    config
        .access_rules
        .repositories
        .iter()
        .map(|repo| repository_path(repo))
        .filter(|path| path != config_path)
        .collect()
}

/// Paths to start and to stop watching so that `watched` becomes `wanted`.
fn changes(watched: &BTreeSet<PathBuf>, wanted: &BTreeSet<PathBuf>) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let added = wanted.difference(watched).cloned().collect();
    let removed = watched.difference(wanted).cloned().collect();
    (added, removed)
}

/// Bring the watched rule files in line with `wanted`. Files that cannot be
/// watched yet (typically missing ones) are retried on the next change.
fn rewatch(watcher: &mut impl Watcher, watched: &mut BTreeSet<PathBuf>, wanted: &BTreeSet<PathBuf>) {
    let (added, removed) = changes(watched, wanted);
    for path in removed {
        if let Err(e) = watcher.unwatch(&path) {
            tracing::debug!(path = ?path, error = %e, "Unable to stop watching access rule file");
        }
        watched.remove(&path);
    }
    for path in added {
        match watcher.watch(&path, RecursiveMode::NonRecursive) {
            Ok(()) => {
                tracing::debug!(path = ?path, "Watching access rule file");
                watched.insert(path);
            }
            Err(e) => tracing::warn!(path = ?path, error = %e, "Unable to watch access rule file"),
        }
    }
}
