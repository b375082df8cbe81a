//! Per-session append-only log files.
//!
//! Each session gets one file, `session_<key>.log`, where the key is derived
//! from the session's creation time and id. The file is created on the
//! first append and kept open until [`SessionLog::close`].
//!
//! Sink failures are logged via `tracing` and never reach the protocol
//! layer: a full disk must not disconnect anybody.
//!
//! The map of open files is locked only to look up or insert a handle.
//! Writes happen under that session's own lock, so one slow file never
//! stalls appends for other sessions.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Local;
use tracing::{debug, warn};

use relay_core::{SessionId, SessionInfo};

/// Append-only sink keyed by session.
pub trait SessionLog: Send + Sync {
    /// Appends one timestamped record for `session`, opening its log on
    /// first use.
    fn append(&self, session: &SessionInfo, text: &str);

    /// Flushes and releases the session's log. Appending afterwards
    /// reopens the same file.
    fn close(&self, session: &SessionInfo);
}

/// Shared handle to a session log sink.
pub type SharedSessionLog = Arc<dyn SessionLog>;

// ============================================================================
// File Sink
// ============================================================================

/// Writes one log file per session under a directory.
#[derive(Debug)]
pub struct FileSessionLog {
    dir: PathBuf,
    open: Mutex<HashMap<SessionId, Arc<Mutex<File>>>>,
}

impl FileSessionLog {
    /// Creates the sink, creating `dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the directory cannot be created.
    pub fn create(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            open: Mutex::new(HashMap::new()),
        })
    }

    /// Directory holding the session files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the log file for a session.
    pub fn path_for(&self, session: &SessionInfo) -> PathBuf {
        self.dir.join(format!("session_{}.log", session.log_key()))
    }

    /// Returns the open handle for a session, opening the file on first use.
    fn handle_for(&self, session: &SessionInfo) -> io::Result<Arc<Mutex<File>>> {
        if let Some(file) = self.lock_open().get(&session.id) {
            return Ok(Arc::clone(file));
        }

        let path = self.path_for(session);
        debug!(session_id = %session.id, path = %path.display(), "Opening session log");
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        // A racing open of the same session wins; both handles append.
        let mut open = self.lock_open();
        let handle = open
            .entry(session.id)
            .or_insert_with(|| Arc::new(Mutex::new(file)));
        Ok(Arc::clone(handle))
    }

    fn lock_open(&self) -> MutexGuard<'_, HashMap<SessionId, Arc<Mutex<File>>>> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_record(&self, session: &SessionInfo, text: &str) -> io::Result<()> {
        let handle = self.handle_for(session)?;
        let mut file = handle.lock().unwrap_or_else(PoisonError::into_inner);

        writeln!(
            file,
            "[{}] {}: {}",
            Local::now().format("%H:%M:%S"),
            session.display_name,
            text
        )?;
        file.flush()
    }
}

impl SessionLog for FileSessionLog {
    fn append(&self, session: &SessionInfo, text: &str) {
        if let Err(e) = self.write_record(session, text) {
            warn!(
                session_id = %session.id,
                error = %e,
                "Failed to write session log"
            );
        }
    }

    fn close(&self, session: &SessionInfo) {
        let removed = self.lock_open().remove(&session.id);
        if let Some(handle) = removed {
            let mut file = handle.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = file.flush() {
                warn!(session_id = %session.id, error = %e, "Failed to flush session log");
            }
        }
    }
}

/// Sink that discards everything. Used when session logs are disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSessionLog;

impl SessionLog for NoopSessionLog {
    fn append(&self, _session: &SessionInfo, _text: &str) {}

    fn close(&self, _session: &SessionInfo) {}
}
