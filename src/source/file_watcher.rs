use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher, recommended_watcher};
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use super::ReloadSignal;
use crate::core::{ConfigError, Result};

/// Cross-platform watcher that turns file system events into reload signals.
///
/// Watches the parent directory of each file rather than the file itself so
/// that editors which save by writing a temporary file and renaming it over
/// the original are still observed. Events for unrelated files in the same
/// directory are filtered out.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    watched_files: Arc<RwLock<HashSet<PathBuf>>>,
    watched_dirs: HashSet<PathBuf>,
}

impl FileWatcher {
    /// Creates a watcher that raises `signal` for every create, modify or
    /// remove event touching one of the watched files.
    ///
    /// # Errors
    /// Returns `ConfigError::FileWatch` if the platform watcher cannot be initialised.
    pub fn new(signal: ReloadSignal) -> Result<Self> {
        let watched_files: Arc<RwLock<HashSet<PathBuf>>> = Arc::new(RwLock::new(HashSet::new()));
        let filter = watched_files.clone();

        let watcher = recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "File watcher reported an error");
                    return;
                }
            };

            if !matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                return;
            }

            let files = filter.read();
            if event.paths.iter().any(|path| files.contains(path)) {
                trace!(paths = ?event.paths, kind = ?event.kind, "Watched file changed");
                signal.notify();
            }
        })
        .map_err(|e| ConfigError::FileWatch {
            path: PathBuf::new(),
            details: format!("failed to initialise watcher: {e}"),
        })?;

        Ok(Self {
            watcher,
            watched_files,
            watched_dirs: HashSet::new(),
        })
    }

    /// Adds a file to the watch list.
    ///
    /// The file itself does not need to exist yet, only its parent directory.
    /// Watching an already watched file is a no-op.
    ///
    /// # Errors
    /// Returns `ConfigError::FileWatch` if the parent directory cannot be watched.
    pub fn watch_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = absolute(path.as_ref());
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ConfigError::FileWatch {
                path: path.clone(),
                details: "file has no parent directory".to_string(),
            })?;
        let dir = dir.canonicalize().unwrap_or(dir);
        let file = match path.file_name() {
            Some(name) => dir.join(name),
            None => path.clone(),
        };

        if !self.watched_files.write().insert(file.clone()) {
            return Ok(());
        }

        if self.watched_dirs.insert(dir.clone()) {
            self.watcher
                .watch(&dir, RecursiveMode::NonRecursive)
                .map_err(|e| ConfigError::FileWatch {
                    path: file.clone(),
                    details: e.to_string(),
                })?;
        }

        debug!(file = %file.display(), "Watching configuration file");
        Ok(())
    }

    /// Removes a file from the watch list. Unknown files are ignored.
    ///
    /// # Errors
    /// Returns `ConfigError::FileWatch` if the directory watch cannot be released.
    pub fn unwatch_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = absolute(path.as_ref());
        let Some(dir) = path.parent().map(Path::to_path_buf) else {
            return Ok(());
        };
        let dir = dir.canonicalize().unwrap_or(dir);
        let file = match path.file_name() {
            Some(name) => dir.join(name),
            None => path,
        };

        let mut files = self.watched_files.write();
        if !files.remove(&file) {
            return Ok(());
        }

        let dir_still_used = files.iter().any(|f| f.parent() == Some(dir.as_path()));
        drop(files);

        if !dir_still_used && self.watched_dirs.remove(&dir) {
            self.watcher
                .unwatch(&dir)
                .map_err(|e| ConfigError::FileWatch {
                    path: file,
                    details: e.to_string(),
                })?;
        }

        Ok(())
    }

    /// Files currently on the watch list.
    pub fn watched_files(&self) -> Vec<PathBuf> {
        self.watched_files.read().iter().cloned().collect()
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }

    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
