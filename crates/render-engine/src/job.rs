//! Render job types and lifecycle states.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use dreamcloud_project_model::{RenderPreset, TimeRange};

use crate::progress::RenderProgress;

/// Lifecycle state of a render job.
///
/// Transitions are strictly monotonic: `Queued -> Running -> ` exactly one
/// terminal state. There is no way back out of a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RenderStatus {
    /// Whether the job has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RenderStatus::Completed | RenderStatus::Failed | RenderStatus::Cancelled
        )
    }

    /// Whether the job still counts against the active set.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

/// What a job renders for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderKind {
    Preview,
    Export,
}

/// Caller-supplied knobs for a render request.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Restrict the render to `[start, end)` of the timeline.
    pub range: Option<TimeRange>,

    /// Output file name hint (typically the project id). The final name is
    /// `<stem>-<timestamp>.<ext>`.
    pub file_stem: Option<String>,

    /// Keep the generated XML and work directory after the job finishes.
    pub keep_artifacts: bool,
}

/// Caller-facing snapshot of a render job.
///
/// The underlying process handle is owned exclusively by the supervising
/// task and never appears here, so a snapshot can never pair a terminal
/// status with a live process.
#[derive(Debug, Clone, Serialize)]
pub struct RenderJob {
    /// Opaque unique id. A new render always gets a fresh id, even for the
    /// same timeline.
    pub id: String,

    pub kind: RenderKind,

    pub status: RenderStatus,

    /// The preset this job was created with.
    pub preset: RenderPreset,

    /// Partial-render window, if any.
    pub range: Option<TimeRange>,

    /// Where the finished render is written.
    pub output_path: PathBuf,

    /// Per-job scratch directory holding the generated XML.
    pub work_dir: PathBuf,

    /// Last observed progress.
    pub progress: RenderProgress,

    /// Terminal error message, if the job failed.
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
}
