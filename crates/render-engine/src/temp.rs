//! Per-job temp workspaces and orphan cleanup.
//!
//! Every render job gets an isolated directory under the temp root, keyed by
//! its job id, so concurrent jobs never collide. Workspaces are reclaimed
//! when the job reaches a terminal state; directories left behind by a crash
//! are detected by age (the owning process no longer exists to ask) and
//! removed by the startup sweep.

use std::path::PathBuf;
use std::time::Duration;

use dreamcloud_common::{DreamcloudError, DreamcloudResult};

/// Paths allocated for one render job.
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    /// The job's private scratch directory.
    pub work_dir: PathBuf,

    /// Where the generated project XML is written.
    pub xml_path: PathBuf,
}

/// Allocates and reclaims per-job scratch directories.
pub struct TempResourceManager {
    root: PathBuf,
}

impl TempResourceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The temp root all workspaces live under.
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Create an isolated workspace for the given job id.
    pub fn allocate(&self, job_id: &str) -> DreamcloudResult<JobWorkspace> {
        let work_dir = self.root.join(job_id);
        std::fs::create_dir_all(&work_dir)
            .map_err(|e| DreamcloudError::temp_io(work_dir.clone(), e))?;

        Ok(JobWorkspace {
            xml_path: work_dir.join("project.mlt"),
            work_dir,
        })
    }

    /// Remove the job's workspace and everything in it.
    pub fn cleanup(&self, job_id: &str) -> DreamcloudResult<()> {
        let work_dir = self.root.join(job_id);
        if work_dir.exists() {
            std::fs::remove_dir_all(&work_dir)
                .map_err(|e| DreamcloudError::temp_io(work_dir.clone(), e))?;
        }
        Ok(())
    }

    /// Remove workspaces older than `max_age`, returning how many were
    /// reclaimed. Entries that cannot be inspected or removed are skipped
    /// and left for a later sweep.
    pub fn sweep_orphans(&self, max_age: Duration) -> DreamcloudResult<usize> {
        if !self.root.exists() {
            return Ok(0);
        }

        let entries = std::fs::read_dir(&self.root)
            .map_err(|e| DreamcloudError::temp_io(self.root.clone(), e))?;

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| modified.elapsed().ok());

            match age {
                Some(age) if age >= max_age => {
                    match std::fs::remove_dir_all(&path) {
                        Ok(()) => {
                            tracing::info!(path = %path.display(), "Removed orphaned render workspace");
                            removed += 1;
                        }
                        Err(e) => {
                            tracing::warn!(path = %path.display(), error = %e, "Failed to remove orphaned workspace");
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_root(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("dreamcloud_temp_test_{name}"));
        let _ = std::fs::remove_dir_all(&root);
        root
    }

    #[test]
    fn test_allocate_creates_isolated_workspace() {
        let manager = TempResourceManager::new(unique_root("allocate"));

        let first = manager.allocate("job-a").unwrap();
        let second = manager.allocate("job-b").unwrap();

        assert!(first.work_dir.is_dir());
        assert!(second.work_dir.is_dir());
        assert_ne!(first.work_dir, second.work_dir);
        assert!(first.xml_path.starts_with(&first.work_dir));

        let _ = std::fs::remove_dir_all(manager.root());
    }

    #[test]
    fn test_cleanup_removes_workspace_and_is_idempotent() {
        let manager = TempResourceManager::new(unique_root("cleanup"));

        let workspace = manager.allocate("job-a").unwrap();
        std::fs::write(&workspace.xml_path, "<mlt/>").unwrap();

        manager.cleanup("job-a").unwrap();
        assert!(!workspace.work_dir.exists());

        // A second cleanup of the same id is a no-op.
        manager.cleanup("job-a").unwrap();

        let _ = std::fs::remove_dir_all(manager.root());
    }

    #[test]
    fn test_sweep_removes_only_old_workspaces() {
        let manager = TempResourceManager::new(unique_root("sweep"));
        manager.allocate("stale-job").unwrap();

        // Everything is younger than a day.
        let removed = manager.sweep_orphans(Duration::from_secs(24 * 60 * 60)).unwrap();
        assert_eq!(removed, 0);

        // With a zero threshold the workspace counts as orphaned.
        let removed = manager.sweep_orphans(Duration::ZERO).unwrap();
        assert_eq!(removed, 1);
        assert!(!manager.root().join("stale-job").exists());

        let _ = std::fs::remove_dir_all(manager.root());
    }

    #[test]
    fn test_sweep_of_missing_root_is_a_noop() {
        let manager = TempResourceManager::new(unique_root("missing"));
        assert_eq!(manager.sweep_orphans(Duration::ZERO).unwrap(), 0);
    }
}
