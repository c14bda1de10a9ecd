//! Filesystem-backed append-only trace store.
//!
//! Logs are grouped by creation month and project id. A legacy layout keyed
//! by the project's deprecated numeric CI identifier is consulted first on
//! reads; new writes only ever land in the current layout.

use crate::masker::SecretMasker;
use gantry_core::job::Job;
use gantry_core::project::Project;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TraceError {
    /// The caller's offset does not match the stored length. Distinct from
    /// the zero-byte no-op so runners know to resync rather than move on.
    #[error("Trace offset conflict: store is at {current}, write requested at {requested}")]
    OffsetConflict { current: u64, requested: u64 },

    #[error("Trace IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TraceResult<T> = std::result::Result<T, TraceError>;

impl From<TraceError> for gantry_core::Error {
    fn from(err: TraceError) -> Self {
        match err {
            TraceError::Io(io) => gantry_core::Error::Io(io),
            other => gantry_core::Error::Store(other.to_string()),
        }
    }
}

pub struct TraceStore {
    root: PathBuf,
}

impl TraceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Append `bytes` at `offset`, masking secrets first.
    ///
    /// `offset` must equal the current stored length; a zero-byte append at
    /// the current length is an idempotent no-op success (runners ping with
    /// empty bodies to force a state refresh). Returns the new length.
    pub fn append(
        &self,
        job: &Job,
        project: &Project,
        bytes: &[u8],
        offset: u64,
    ) -> TraceResult<u64> {
        let path = self.write_path(job, project);
        let current = path.metadata().map(|m| m.len()).unwrap_or(0);

        if offset != current {
            return Err(TraceError::OffsetConflict {
                current,
                requested: offset,
            });
        }
        if bytes.is_empty() {
            return Ok(current);
        }

        let masked = SecretMasker::for_job(job, project).mask_bytes(bytes);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(&masked)?;
        debug!(job = %job.id, offset, appended = masked.len(), "trace appended");
        Ok(current + masked.len() as u64)
    }

    /// Full overwrite, used only by the legacy single-shot trace setter.
    pub fn truncate_and_rewrite(
        &self,
        job: &Job,
        project: &Project,
        bytes: &[u8],
    ) -> TraceResult<()> {
        let path = self.write_path(job, project);
        let masked = SecretMasker::for_job(job, project).mask_bytes(bytes);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, masked)?;
        Ok(())
    }

    /// Read the trace, optionally windowed to the last `last_n_lines` lines.
    /// `Ok(None)` when no trace exists in either layout.
    pub fn read(
        &self,
        job: &Job,
        project: &Project,
        last_n_lines: Option<usize>,
    ) -> TraceResult<Option<String>> {
        let Some(path) = self.read_path(job, project) else {
            return Ok(None);
        };
        let mut contents = Vec::new();
        File::open(&path)?.read_to_end(&mut contents)?;
        let text = String::from_utf8_lossy(&contents).into_owned();

        match last_n_lines {
            None => Ok(Some(text)),
            Some(n) => {
                let lines: Vec<&str> = text.lines().collect();
                let start = lines.len().saturating_sub(n);
                let mut tail = lines[start..].join("\n");
                if text.ends_with('\n') && !tail.is_empty() {
                    tail.push('\n');
                }
                Ok(Some(tail))
            }
        }
    }

    pub fn exists(&self, job: &Job, project: &Project) -> bool {
        self.read_path(job, project).is_some()
    }

    pub fn len(&self, job: &Job, project: &Project) -> u64 {
        self.read_path(job, project)
            .and_then(|p| p.metadata().ok())
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Remove the trace from both layouts. Idempotent: erasing a job with no
    /// trace is a no-op. Returns whether any bytes were removed.
    pub fn erase(&self, job: &Job, project: &Project) -> TraceResult<bool> {
        let mut removed = false;
        for path in self.candidate_paths(job, project) {
            if path.exists() {
                fs::remove_file(&path)?;
                removed = true;
            }
        }
        if removed {
            debug!(job = %job.id, "trace erased");
        }
        Ok(removed)
    }

    /// Writes always target the current month/project layout.
    fn write_path(&self, job: &Job, project: &Project) -> PathBuf {
        self.current_dir(job, project).join(log_name(job))
    }

    /// Reads prefer pre-existing data: legacy layout first, then current.
    fn read_path(&self, job: &Job, project: &Project) -> Option<PathBuf> {
        self.candidate_paths(job, project)
            .into_iter()
            .find(|p| p.exists())
    }

    fn candidate_paths(&self, job: &Job, project: &Project) -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(2);
        if let Some(legacy) = self.legacy_dir(project) {
            paths.push(legacy.join(log_name(job)));
        }
        paths.push(self.current_dir(job, project).join(log_name(job)));
        paths
    }

    fn current_dir(&self, job: &Job, project: &Project) -> PathBuf {
        self.root
            .join(job.created_at.format("%Y_%m").to_string())
            .join(project.id.as_uuid().to_string())
    }

    fn legacy_dir(&self, project: &Project) -> Option<PathBuf> {
        project.ci_id.map(|ci_id| self.root.join(ci_id.to_string()))
    }
}

fn log_name(job: &Job) -> String {
    format!("{}.log", job.id.as_uuid())
}
