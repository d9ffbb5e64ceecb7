//! Per-session case directories
//!
//! Every browser session gets its own case directory under the sessions
//! root, seeded from the template case. Uploads, solver runs and exports
//! of one session never touch another session's files. Idle sessions are
//! reaped by a background task.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::postprocess::Visualization;
use crate::solver::SolverJob;

/// Errors from session management
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to prepare session directory {path}: {source}")]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One user's isolated workspace
pub struct Session {
    pub id: Uuid,
    pub case_dir: PathBuf,
    pub created_at: Instant,
    last_seen: std::sync::Mutex<Instant>,
    /// Latest solver job, running or finished
    pub job: Mutex<Option<Arc<SolverJob>>>,
    /// Latest successful visualization
    pub visualization: Mutex<Option<Arc<Visualization>>>,
    /// Held for the whole of an upload, run start or visualization
    operation: Mutex<()>,
}

impl Session {
    fn new(id: Uuid, case_dir: PathBuf) -> Self {
        let now = Instant::now();
        Self {
            id,
            case_dir,
            created_at: now,
            last_seen: std::sync::Mutex::new(now),
            job: Mutex::new(None),
            visualization: Mutex::new(None),
            operation: Mutex::new(()),
        }
    }

    /// Claim the session for a case-changing operation.
    ///
    /// Returns None while another upload, run start or visualization holds it.
    pub fn try_begin_operation(&self) -> Option<MutexGuard<'_, ()>> {
        self.operation.try_lock().ok()
    }

    pub fn touch(&self) {
        if let Ok(mut seen) = self.last_seen.lock() {
            *seen = Instant::now();
        }
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        self.last_seen
            .lock()
            .map(|seen| now.saturating_duration_since(*seen))
            .unwrap_or_default()
    }

    /// Cancel the current solver job, if any is running
    pub async fn cancel_job(&self) -> bool {
        match self.job.lock().await.as_ref() {
            Some(job) if job.is_running() => {
                job.cancel();
                true
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("case_dir", &self.case_dir)
            .finish()
    }
}

/// All live sessions
pub struct SessionStore {
    root: PathBuf,
    template: Option<PathBuf>,
    ttl: Duration,
    sessions: DashMap<Uuid, Arc<Session>>,
}

impl SessionStore {
    /// Create a store rooted at `root`, creating the directory if needed
    pub fn new(
        root: impl Into<PathBuf>,
        template: Option<PathBuf>,
        ttl: Duration,
    ) -> Result<Self, SessionError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| SessionError::Prepare {
            path: root.clone(),
            source: e,
        })?;

        if let Some(template) = &template
            && !template.is_dir()
        {
            warn!("Template case {:?} is not a directory, sessions start empty", template);
        }

        info!(root = %root.display(), ttl_secs = ttl.as_secs(), "Session store ready");

        Ok(Self {
            root,
            template,
            ttl,
            sessions: DashMap::new(),
        })
    }

    /// Start a new session with a freshly seeded case directory
    pub fn create(&self) -> Result<Arc<Session>, SessionError> {
        let id = Uuid::new_v4();
        let case_dir = self.root.join(id.to_string());

        let prepare = |source: std::io::Error| SessionError::Prepare {
            path: case_dir.clone(),
            source,
        };

        std::fs::create_dir_all(&case_dir).map_err(prepare)?;
        if let Some(template) = &self.template
            && template.is_dir()
        {
            copy_dir_recursive(template, &case_dir).map_err(prepare)?;
        }

        let session = Arc::new(Session::new(id, case_dir));
        self.sessions.insert(id, Arc::clone(&session));
        info!(session = %id, "Session created");
        Ok(session)
    }

    /// Look up a session and mark it as active
    pub fn get(&self, id: &Uuid) -> Option<Arc<Session>> {
        let session = self.sessions.get(id).map(|s| Arc::clone(s.value()))?;
        session.touch();
        Some(session)
    }

    /// End a session: cancel its job and delete its directory
    pub async fn remove(&self, id: &Uuid) -> bool {
        let Some((_, session)) = self.sessions.remove(id) else {
            return false;
        };
        session.cancel_job().await;
        if let Err(e) = tokio::fs::remove_dir_all(&session.case_dir).await {
            warn!(session = %id, "Failed to remove session directory: {}", e);
        }
        info!(session = %id, "Session removed");
        true
    }

    /// Remove sessions idle longer than the TTL. Returns how many were reaped.
    pub async fn reap_expired(&self, now: Instant) -> usize {
        let expired: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().idle_for(now) > self.ttl)
            .map(|entry| *entry.key())
            .collect();

        let mut reaped = 0;
        for id in expired {
            if self.remove(&id).await {
                reaped += 1;
            }
        }
        if reaped > 0 {
            info!(reaped = reaped, remaining = self.sessions.len(), "Reaped idle sessions");
        }
        reaped
    }

    /// Spawn a background task reaping idle sessions every `interval_secs`
    pub fn start_reaper_task(self: Arc<Self>, interval_secs: u64) {
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));
            loop {
                ticker.tick().await;
                debug!("Checking for idle sessions");
                self.reap_expired(Instant::now()).await;
            }
        });
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Copy a directory tree, following the template's layout
fn copy_dir_recursive(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            // Preserves permissions, so an executable Allrun stays executable
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
