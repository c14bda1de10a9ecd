//! Byte storage for job artifacts.

use gantry_core::job::Job;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Removal operations over artifact bytes. Each call is independently
/// idempotent: removing something already gone reports `false` and is not
/// an error.
pub trait ArtifactStore: Send + Sync {
    /// Remove the artifact archive bytes; returns whether bytes existed.
    fn remove_archive(&self, job: &Job) -> io::Result<bool>;

    /// Remove the artifact metadata bytes; returns whether bytes existed.
    fn remove_metadata(&self, job: &Job) -> io::Result<bool>;
}

/// Filesystem layout: `{root}/{project_id}/{job_id}/{filename}`.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn archive_path(&self, job: &Job) -> Option<PathBuf> {
        job.artifacts_file
            .as_ref()
            .map(|f| self.job_dir(job).join(&f.filename))
    }

    pub fn metadata_path(&self, job: &Job) -> Option<PathBuf> {
        job.artifacts_metadata
            .as_ref()
            .map(|f| self.job_dir(job).join(&f.filename))
    }

    /// Write archive bytes for a job; used by upload handling and tests.
    pub fn save_archive(&self, job: &Job, filename: &str, bytes: &[u8]) -> io::Result<u64> {
        let dir = self.job_dir(job);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(filename), bytes)?;
        Ok(bytes.len() as u64)
    }

    fn job_dir(&self, job: &Job) -> PathBuf {
        self.root
            .join(job.project_id.as_uuid().to_string())
            .join(job.id.as_uuid().to_string())
    }

    fn remove(&self, path: Option<PathBuf>) -> io::Result<bool> {
        match path {
            Some(path) if path.exists() => {
                fs::remove_file(path)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl ArtifactStore for FsArtifactStore {
    fn remove_archive(&self, job: &Job) -> io::Result<bool> {
        self.remove(self.archive_path(job))
    }

    fn remove_metadata(&self, job: &Job) -> io::Result<bool> {
        self.remove(self.metadata_path(job))
    }
}
