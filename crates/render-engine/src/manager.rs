//! Render job orchestration and external process supervision.
//!
//! The manager owns the job registry and the full lifecycle of every render:
//! it generates and validates the project XML, confirms the engine is
//! usable, materializes the XML into a per-job workspace, then spawns and
//! supervises the melt process from a dedicated task. The process handle
//! never leaves its supervisor; callers observe jobs only through snapshots
//! and a per-job subscription channel.
//!
//! Synchronous failures (generation, validation, engine missing) are
//! returned straight from the `render_*` call with nothing registered and
//! nothing on disk. Once a job exists, every later error is recorded on the
//! job and delivered through the same channel as progress.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use dreamcloud_common::{DreamcloudError, DreamcloudResult, RenderSettings};
use dreamcloud_project_model::{RenderPreset, TimeRange, Timeline};

use crate::engine::EngineChecker;
use crate::generator::{
    estimate_total_frames, generate_project_xml, generate_project_xml_for_range,
};
use crate::job::{RenderJob, RenderKind, RenderOptions, RenderStatus};
use crate::progress::{ProgressParser, RenderProgress};
use crate::temp::TempResourceManager;
use crate::validator::validate_project_xml;

/// How many trailing non-progress stderr lines are kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

struct JobState {
    job: RenderJob,
    cancel: CancellationToken,
    updates: watch::Sender<RenderJob>,
    supervisor: Option<JoinHandle<()>>,
    keep_artifacts: bool,
}

struct ManagerInner {
    settings: RenderSettings,
    checker: EngineChecker,
    temp: TempResourceManager,
    jobs: Mutex<HashMap<String, JobState>>,
}

/// Orchestrates render jobs against the external engine.
#[derive(Clone)]
pub struct RenderJobManager {
    inner: Arc<ManagerInner>,
}

impl RenderJobManager {
    /// Construct the manager: ensures the output/temp directories exist and
    /// sweeps workspaces orphaned by a previous crash.
    pub fn new(settings: RenderSettings) -> DreamcloudResult<Self> {
        for dir in [&settings.export_dir, &settings.preview_dir, &settings.temp_dir] {
            std::fs::create_dir_all(dir)
                .map_err(|e| DreamcloudError::temp_io(dir.clone(), e))?;
        }

        let temp = TempResourceManager::new(settings.temp_dir.clone());
        match temp.sweep_orphans(Duration::from_secs(settings.orphan_max_age_secs)) {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "Startup sweep reclaimed orphaned workspaces"),
            Err(e) => tracing::warn!(error = %e, "Startup orphan sweep failed"),
        }

        let checker = EngineChecker::new(settings.engine_path.clone());

        Ok(Self {
            inner: Arc::new(ManagerInner {
                settings,
                checker,
                temp,
                jobs: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Engine availability snapshot (cached).
    pub async fn check_engine(&self) -> crate::engine::MeltCheckResult {
        self.inner.checker.check().await
    }

    /// Start a fast, low-resolution preview render, optionally restricted
    /// to a time range.
    pub async fn render_preview(
        &self,
        timeline: &Timeline,
        range: Option<TimeRange>,
    ) -> DreamcloudResult<String> {
        let options = RenderOptions {
            range,
            ..RenderOptions::default()
        };
        self.start_job(
            timeline,
            RenderKind::Preview,
            RenderPreset::preview_draft(),
            options,
        )
        .await
    }

    /// Start a full-quality export render with the caller's preset.
    pub async fn render_export(
        &self,
        timeline: &Timeline,
        preset: RenderPreset,
    ) -> DreamcloudResult<String> {
        self.start_job(timeline, RenderKind::Export, preset, RenderOptions::default())
            .await
    }

    /// Export with explicit options (range, naming hint, artifact policy).
    pub async fn render_export_with(
        &self,
        timeline: &Timeline,
        preset: RenderPreset,
        options: RenderOptions,
    ) -> DreamcloudResult<String> {
        self.start_job(timeline, RenderKind::Export, preset, options)
            .await
    }

    /// Snapshot of one job.
    pub fn get_job(&self, job_id: &str) -> Option<RenderJob> {
        let jobs = self.inner.jobs.lock().unwrap();
        jobs.get(job_id).map(|state| state.job.clone())
    }

    /// Snapshots of all jobs still queued or running.
    pub fn get_active_jobs(&self) -> Vec<RenderJob> {
        let jobs = self.inner.jobs.lock().unwrap();
        let mut active: Vec<RenderJob> = jobs
            .values()
            .filter(|state| state.job.status.is_active())
            .map(|state| state.job.clone())
            .collect();
        active.sort_by_key(|job| job.created_at);
        active
    }

    /// Request cancellation of a job.
    ///
    /// Returns `None` for an unknown id. Cancelling a job already in a
    /// terminal state is a no-op that returns its current status; no signal
    /// is sent. For an active job the supervisor observes the token, sends
    /// the termination signal, escalates to a forced kill after the grace
    /// period, and transitions the job to `Cancelled`.
    pub fn cancel_job(&self, job_id: &str) -> Option<RenderStatus> {
        let jobs = self.inner.jobs.lock().unwrap();
        let state = jobs.get(job_id)?;
        let status = state.job.status;
        if status.is_active() {
            tracing::info!(job_id, "Cancellation requested");
            state.cancel.cancel();
        }
        Some(status)
    }

    /// Subscribe to job updates (progress and state transitions). The
    /// current snapshot is available immediately; every later change is
    /// delivered in order, with `frames_rendered` non-decreasing.
    pub fn subscribe(&self, job_id: &str) -> Option<watch::Receiver<RenderJob>> {
        let jobs = self.inner.jobs.lock().unwrap();
        jobs.get(job_id).map(|state| state.updates.subscribe())
    }

    /// Wait for a job to reach a terminal state and return its final
    /// snapshot.
    pub async fn wait(&self, job_id: &str) -> Option<RenderJob> {
        let mut updates = self.subscribe(job_id)?;
        loop {
            let job = updates.borrow().clone();
            if job.status.is_terminal() {
                return Some(job);
            }
            if updates.changed().await.is_err() {
                return self.get_job(job_id);
            }
        }
    }

    /// Cancel all active jobs and wait for their supervisors to finish.
    pub async fn shutdown(&self) {
        let supervisors: Vec<(String, JoinHandle<()>)> = {
            let mut jobs = self.inner.jobs.lock().unwrap();
            jobs.iter_mut()
                .filter(|(_, state)| state.job.status.is_active())
                .filter_map(|(id, state)| {
                    state.cancel.cancel();
                    state.supervisor.take().map(|handle| (id.clone(), handle))
                })
                .collect()
        };

        for (job_id, handle) in supervisors {
            if let Err(e) = handle.await {
                tracing::warn!(job_id, error = %e, "Render supervisor panicked during shutdown");
            }
        }
        tracing::info!("Render job manager shut down");
    }

    async fn start_job(
        &self,
        timeline: &Timeline,
        kind: RenderKind,
        preset: RenderPreset,
        options: RenderOptions,
    ) -> DreamcloudResult<String> {
        let profile = preset.profile;

        let xml = match &options.range {
            Some(range) => generate_project_xml_for_range(timeline, &profile, range)?,
            None => generate_project_xml(timeline, &profile)?,
        };
        validate_project_xml(&xml)?;

        let engine = self.inner.checker.require().await?;

        let job_id = uuid::Uuid::new_v4().to_string();
        let workspace = self.inner.temp.allocate(&job_id)?;
        if let Err(e) = std::fs::write(&workspace.xml_path, &xml) {
            let _ = self.inner.temp.cleanup(&job_id);
            return Err(DreamcloudError::temp_io(workspace.xml_path.clone(), e));
        }

        let output_dir = match kind {
            RenderKind::Export => &self.inner.settings.export_dir,
            RenderKind::Preview => &self.inner.settings.preview_dir,
        };
        let stem = options.file_stem.as_deref().unwrap_or("untitled");
        let output_path = output_dir.join(format!(
            "{stem}-{}.{}",
            Utc::now().format("%Y%m%d-%H%M%S%.3f"),
            preset.extension()
        ));

        let total_frames = estimate_total_frames(timeline, &profile, options.range.as_ref());
        let job = RenderJob {
            id: job_id.clone(),
            kind,
            status: RenderStatus::Queued,
            preset: preset.clone(),
            range: options.range,
            output_path: output_path.clone(),
            work_dir: workspace.work_dir.clone(),
            progress: RenderProgress::starting(total_frames),
            error: None,
            created_at: Utc::now(),
        };

        let cancel = CancellationToken::new();
        let (updates, _) = watch::channel(job.clone());
        {
            let mut jobs = self.inner.jobs.lock().unwrap();
            jobs.insert(
                job_id.clone(),
                JobState {
                    job,
                    cancel: cancel.clone(),
                    updates,
                    supervisor: None,
                    keep_artifacts: options.keep_artifacts,
                },
            );
        }

        let supervisor = tokio::spawn(supervise(
            self.inner.clone(),
            job_id.clone(),
            engine,
            workspace.xml_path,
            output_path,
            preset,
            total_frames,
            cancel,
        ));
        {
            let mut jobs = self.inner.jobs.lock().unwrap();
            if let Some(state) = jobs.get_mut(&job_id) {
                state.supervisor = Some(supervisor);
            }
        }

        tracing::info!(job_id = %job_id, ?kind, total_frames, "Render job queued");
        Ok(job_id)
    }
}

impl ManagerInner {
    /// Apply a progress update if the job is still active and the frame
    /// count has not regressed.
    fn update_progress(&self, job_id: &str, progress: RenderProgress) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(state) = jobs.get_mut(job_id) {
            if state.job.status.is_terminal() {
                return;
            }
            if progress.frames_rendered < state.job.progress.frames_rendered {
                return;
            }
            state.job.progress = progress;
            state.updates.send_replace(state.job.clone());
        }
    }

    fn mark_running(&self, job_id: &str) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(state) = jobs.get_mut(job_id) {
            if state.job.status == RenderStatus::Queued {
                state.job.status = RenderStatus::Running;
                state.updates.send_replace(state.job.clone());
            }
        }
    }

    /// Transition a job into a terminal state. A job already terminal is
    /// left untouched; there is no way back out.
    fn finish_job(
        &self,
        job_id: &str,
        status: RenderStatus,
        error: Option<String>,
        final_progress: Option<RenderProgress>,
    ) -> bool {
        let mut jobs = self.jobs.lock().unwrap();
        let Some(state) = jobs.get_mut(job_id) else {
            return false;
        };
        if state.job.status.is_terminal() {
            return false;
        }
        state.job.status = status;
        state.job.error = error;
        if let Some(progress) = final_progress {
            state.job.progress = progress;
        }
        state.updates.send_replace(state.job.clone());
        true
    }

    fn keep_artifacts(&self, job_id: &str) -> bool {
        let jobs = self.jobs.lock().unwrap();
        jobs.get(job_id).map(|s| s.keep_artifacts).unwrap_or(false)
    }
}

/// How one supervised render ended.
enum RenderOutcome {
    Completed,
    Cancelled,
    Failed(DreamcloudError),
}

/// Supervise one render process from spawn to terminal state.
///
/// Owns the process handle exclusively. Runs cleanup exactly once on every
/// path out.
#[allow(clippy::too_many_arguments)]
async fn supervise(
    inner: Arc<ManagerInner>,
    job_id: String,
    engine: PathBuf,
    xml_path: PathBuf,
    output_path: PathBuf,
    preset: RenderPreset,
    total_frames: u64,
    cancel: CancellationToken,
) {
    let outcome = run_render(
        &inner,
        &job_id,
        &engine,
        &xml_path,
        &output_path,
        &preset,
        total_frames,
        &cancel,
    )
    .await;

    match outcome {
        RenderOutcome::Completed => {
            inner.finish_job(
                &job_id,
                RenderStatus::Completed,
                None,
                Some(RenderProgress::completed(total_frames)),
            );
            tracing::info!(job_id = %job_id, output = %output_path.display(), "Render completed");
        }
        RenderOutcome::Cancelled => {
            inner.finish_job(&job_id, RenderStatus::Cancelled, None, None);
            tracing::info!(job_id = %job_id, "Render cancelled");
        }
        RenderOutcome::Failed(error) => {
            tracing::warn!(job_id = %job_id, error = %error, "Render failed");
            inner.finish_job(&job_id, RenderStatus::Failed, Some(error.to_string()), None);
        }
    }

    if inner.keep_artifacts(&job_id) {
        tracing::debug!(job_id = %job_id, "Keeping render artifacts on request");
    } else if let Err(e) = inner.temp.cleanup(&job_id) {
        // Never escalate: the render already succeeded or failed on its own
        // merits. The orphan sweep picks this up at next startup.
        tracing::warn!(job_id = %job_id, error = %e, "Temp cleanup failed");
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_render(
    inner: &ManagerInner,
    job_id: &str,
    engine: &PathBuf,
    xml_path: &PathBuf,
    output_path: &PathBuf,
    preset: &RenderPreset,
    total_frames: u64,
    cancel: &CancellationToken,
) -> RenderOutcome {
    if cancel.is_cancelled() {
        return RenderOutcome::Cancelled;
    }

    let mut command = tokio::process::Command::new(engine);
    command
        .arg(xml_path)
        .arg("-consumer")
        .arg(format!("avformat:{}", output_path.display()));
    for property in preset.consumer_properties() {
        command.arg(property);
    }
    command
        .arg("-progress2")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            return RenderOutcome::Failed(DreamcloudError::process_spawn(format!(
                "{}: {e}",
                engine.display()
            )))
        }
    };

    inner.mark_running(job_id);
    tracing::info!(
        job_id,
        pid = child.id(),
        engine = %engine.display(),
        "Render process started"
    );

    let Some(stderr) = child.stderr.take() else {
        let _ = child.kill().await;
        return RenderOutcome::Failed(DreamcloudError::process_spawn(
            "could not capture render process output",
        ));
    };

    let grace = Duration::from_millis(inner.settings.cancel_grace_ms);
    let watchdog = Duration::from_secs(inner.settings.progress_timeout_secs);
    let throttle = Duration::from_millis(inner.settings.progress_interval_ms);

    let mut lines = BufReader::new(stderr).lines();
    let mut parser = ProgressParser::new(total_frames);
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut last_emit: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                terminate_child(&mut child, grace).await;
                return RenderOutcome::Cancelled;
            }
            read = tokio::time::timeout(watchdog, lines.next_line()) => {
                match read {
                    Err(_) => {
                        // No output for the whole watchdog window: stuck.
                        terminate_child(&mut child, grace).await;
                        return RenderOutcome::Failed(DreamcloudError::Timeout {
                            seconds: watchdog.as_secs(),
                        });
                    }
                    Ok(Ok(Some(line))) => {
                        if let Some(progress) = parser.parse_line(&line) {
                            let due = last_emit
                                .map(|at| at.elapsed() >= throttle)
                                .unwrap_or(true);
                            let is_final = progress.frames_rendered >= total_frames;
                            if due || is_final {
                                inner.update_progress(job_id, progress);
                                last_emit = Some(Instant::now());
                            }
                        } else if !line.trim().is_empty() {
                            if tail.len() == STDERR_TAIL_LINES {
                                tail.pop_front();
                            }
                            tail.push_back(line);
                        }
                    }
                    Ok(Ok(None)) => break,
                    Ok(Err(e)) => {
                        tail.push_back(format!("<output stream error: {e}>"));
                        break;
                    }
                }
            }
        }
    }

    let status = match child.wait().await {
        Ok(status) => status,
        Err(e) => {
            return RenderOutcome::Failed(DreamcloudError::process_crashed(format!(
                "failed to collect exit status: {e}"
            )))
        }
    };

    if cancel.is_cancelled() {
        return RenderOutcome::Cancelled;
    }

    let output_size = std::fs::metadata(output_path).map(|m| m.len()).unwrap_or(0);

    if status.success() && output_size > 0 {
        RenderOutcome::Completed
    } else if !status.success() {
        let detail: Vec<String> = tail.into_iter().collect();
        RenderOutcome::Failed(DreamcloudError::process_crashed(format!(
            "engine exited with {status}: {}",
            detail.join(" | ")
        )))
    } else {
        RenderOutcome::Failed(DreamcloudError::process_crashed(format!(
            "engine exited cleanly but produced no output at {}",
            output_path.display()
        )))
    }
}

/// Ask the child to terminate, then force-kill after the grace period.
async fn terminate_child(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            let _ = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(_) => return,
                Err(_) => {
                    tracing::warn!(pid, "Process ignored termination signal, escalating to kill");
                }
            }
        }
    }

    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "Failed to kill render process");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dreamcloud_project_model::{AssetKind, Clip, Track, TrackKind};

    fn test_settings(name: &str) -> RenderSettings {
        let base = std::env::temp_dir().join(format!("dreamcloud_manager_test_{name}"));
        let _ = std::fs::remove_dir_all(&base);
        RenderSettings {
            export_dir: base.join("renders"),
            preview_dir: base.join("previews"),
            temp_dir: base.join("mlt-temp"),
            // Pointing at a nonexistent binary makes the engine check fail
            // deterministically, whatever the host has installed.
            engine_path: Some(base.join("no-such-melt")),
            progress_interval_ms: 10,
            progress_timeout_secs: 5,
            cancel_grace_ms: 200,
            orphan_max_age_secs: 24 * 60 * 60,
            keep_artifacts: false,
        }
    }

    fn simple_timeline() -> Timeline {
        Timeline {
            tracks: vec![Track {
                kind: TrackKind::Video,
                clips: vec![Clip {
                    asset_path: "clip.mp4".into(),
                    asset_kind: AssetKind::Video,
                    source_in: 0.0,
                    source_out: 2.0,
                    start: 0.0,
                    transform: None,
                    volume: None,
                }],
                transitions: vec![],
            }],
        }
    }

    fn temp_entries(settings: &RenderSettings) -> usize {
        std::fs::read_dir(&settings.temp_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_missing_engine_fails_fast_with_no_job_and_no_temp_files() {
        let settings = test_settings("missing_engine");
        let manager = RenderJobManager::new(settings.clone()).unwrap();

        let err = manager
            .render_export(&simple_timeline(), RenderPreset::export_h264())
            .await
            .unwrap_err();
        assert!(matches!(err, DreamcloudError::EngineNotFound { .. }));

        let err = manager.render_preview(&simple_timeline(), None).await.unwrap_err();
        assert!(matches!(err, DreamcloudError::EngineNotFound { .. }));

        assert!(manager.get_active_jobs().is_empty());
        assert_eq!(temp_entries(&settings), 0);
    }

    #[tokio::test]
    async fn test_bad_timeline_fails_synchronously_before_engine_check() {
        let settings = test_settings("bad_timeline");
        let manager = RenderJobManager::new(settings.clone()).unwrap();

        let mut timeline = simple_timeline();
        timeline.tracks[0].clips[0].source_in = 5.0; // in after out

        let err = manager
            .render_export(&timeline, RenderPreset::export_h264())
            .await
            .unwrap_err();
        assert!(matches!(err, DreamcloudError::XmlGeneration { .. }));
        assert!(manager.get_active_jobs().is_empty());
        assert_eq!(temp_entries(&settings), 0);
    }

    #[tokio::test]
    async fn test_unknown_job_queries() {
        let manager = RenderJobManager::new(test_settings("unknown_job")).unwrap();
        assert!(manager.get_job("nope").is_none());
        assert!(manager.cancel_job("nope").is_none());
        assert!(manager.subscribe("nope").is_none());
        assert!(manager.wait("nope").await.is_none());
    }
}
