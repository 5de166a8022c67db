//! Configuration file watcher
//!
//! Polls the file's modification time. A reload happens only when the mtime
//! moved forward and the new document parses with at least one register;
//! otherwise the running configuration stays in place.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::config::SimulatorDocument;

/// How often the file's mtime is checked
pub const WATCH_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub struct ConfigWatcher {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl ConfigWatcher {
    /// Start watching; the current mtime counts as already loaded
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let last_modified = modified(&path);
        Self {
            path,
            last_modified,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// New document if the file changed and is usable
    pub fn check(&mut self) -> Option<SimulatorDocument> {
        let current = modified(&self.path)?;
        if self.last_modified.is_some_and(|last| current <= last) {
            return None;
        }
        info!("Configuration change detected in {}", self.path.display());
        // a broken edit is not retried until the file changes again
        self.last_modified = Some(current);

        match SimulatorDocument::load(&self.path) {
            Ok(doc) if doc.registers.is_empty() => {
                warn!(
                    "{} has no registers, keeping previous configuration",
                    self.path.display()
                );
                None
            },
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!("Reload failed, keeping previous configuration: {}", e);
                None
            },
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(time) => Some(time),
        Err(e) => {
            debug!("No mtime for {}: {}", path.display(), e);
            None
        },
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use std::fs::File;

    fn touch(path: &Path, secs_ahead: u64) {
        let when = SystemTime::now() + Duration::from_secs(secs_ahead);
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(when)
            .unwrap();
    }

    const ONE: &str = "registers:\n  - { address: 0, name: Engine RPM, nominal: 1200 }\n";
    const TWO: &str = "registers:\n  - { address: 0, name: Engine RPM, nominal: 1200 }\n  - { address: 1, name: Hour Meter, nominal: 5 }\n";

    #[test]
    fn test_reloads_only_on_newer_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("register_config.yaml");
        std::fs::write(&path, ONE).unwrap();

        let mut watcher = ConfigWatcher::new(&path);
        assert!(watcher.check().is_none());

        std::fs::write(&path, TWO).unwrap();
        touch(&path, 10);
        let doc = watcher.check().unwrap();
        assert_eq!(doc.registers.len(), 2);
        assert!(watcher.check().is_none());
    }

    #[test]
    fn test_unusable_edits_keep_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("register_config.yaml");
        std::fs::write(&path, ONE).unwrap();
        let mut watcher = ConfigWatcher::new(&path);

        std::fs::write(&path, "registers: [ {address: 0").unwrap();
        touch(&path, 10);
        assert!(watcher.check().is_none());

        std::fs::write(&path, "simulation:\n  noise_enabled: false\n").unwrap();
        touch(&path, 20);
        assert!(watcher.check().is_none());

        std::fs::write(&path, TWO).unwrap();
        touch(&path, 30);
        assert!(watcher.check().is_some());

        std::fs::remove_file(&path).unwrap();
        assert!(watcher.check().is_none());
    }

    #[test]
    fn test_file_created_after_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.yaml");
        let mut watcher = ConfigWatcher::new(&path);
        assert!(watcher.check().is_none());

        std::fs::write(&path, ONE).unwrap();
        assert_eq!(watcher.check().unwrap().registers.len(), 1);
    }
}
