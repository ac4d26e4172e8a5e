//! Hot reload of the guard configuration file.
//!
//! The parent directory is watched rather than the file itself: editors and
//! deployment tools usually replace the file, which drops a watch placed on
//! the old inode.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::{parse_config, ConfigError};
use crate::config::schema::AppConfig;

/// Forwards each valid, changed revision of the configuration file.
pub struct ConfigWatcher {
    path: PathBuf,
    last_seen: Mutex<Option<String>>,
    update_tx: mpsc::UnboundedSender<AppConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<AppConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            last_seen: Mutex::new(fs::read_to_string(path).ok()),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Re-read the file and forward it when its content differs from the
    /// last revision seen. Returns whether an update was sent.
    pub fn reload(&self) -> Result<bool, ConfigError> {
        let content = fs::read_to_string(&self.path)?;
        let mut last = self.last_seen.lock().unwrap_or_else(|e| e.into_inner());
        if last.as_deref() == Some(content.as_str()) {
            return Ok(false);
        }
        let config = parse_config(&content)?;
        *last = Some(content);
        Ok(self.update_tx.send(config).is_ok())
    }

    fn concerns(&self, event: &Event) -> bool {
        let name = self.path.file_name();
        (event.kind.is_modify() || event.kind.is_create())
            && event.paths.iter().any(|p| p.file_name() == name)
    }

    /// Start watching in notify's background thread. Updates stop when the
    /// returned handle is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if self.concerns(&event) => match self.reload() {
                    Ok(true) => tracing::info!(path = ?self.path, "Config change detected"),
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "Rejected config change, keeping current configuration")
                    }
                },
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_forwards_only_changed_valid_revisions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guard.toml");
        fs::write(&path, "[rate_limit]\nlimit = 5").unwrap();

        let (watcher, mut updates) = ConfigWatcher::new(&path);
        assert!(!watcher.reload().unwrap());

        fs::write(&path, "[rate_limit]\nlimit = 7").unwrap();
        assert!(watcher.reload().unwrap());
        assert_eq!(updates.try_recv().unwrap().guard.rate_limit.limit, 7);

        fs::write(&path, "[rate_limit]\nlimit = 0").unwrap();
        assert!(matches!(watcher.reload(), Err(ConfigError::Validation(_))));
        assert!(updates.try_recv().is_err());
    }
}
