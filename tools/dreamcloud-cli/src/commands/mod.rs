pub mod check;
pub mod preview;
pub mod render;
pub mod sweep;
pub mod validate;

use std::path::Path;

use dreamcloud_project_model::Timeline;
use dreamcloud_render_engine::{RenderJobManager, RenderStatus};

/// Load a timeline saved as JSON by the studio.
pub(crate) fn load_timeline(path: &Path) -> anyhow::Result<Timeline> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read timeline {}: {e}", path.display()))?;
    let timeline: Timeline = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse timeline {}: {e}", path.display()))?;
    Ok(timeline)
}

/// Follow a job's progress until it reaches a terminal state. Ctrl-C
/// requests cancellation instead of abandoning the render.
pub(crate) async fn watch_job(manager: &RenderJobManager, job_id: &str) -> anyhow::Result<()> {
    let mut updates = manager
        .subscribe(job_id)
        .ok_or_else(|| anyhow::anyhow!("Job {job_id} is not registered"))?;

    loop {
        let job = updates.borrow().clone();
        if job.status.is_terminal() {
            println!();
            return match job.status {
                RenderStatus::Completed => {
                    println!("Render complete: {}", job.output_path.display());
                    Ok(())
                }
                RenderStatus::Cancelled => {
                    println!("Render cancelled.");
                    Ok(())
                }
                _ => Err(anyhow::anyhow!(
                    "Render failed: {}",
                    job.error.unwrap_or_else(|| "unknown error".to_string())
                )),
            };
        }

        let eta = job
            .progress
            .eta_secs
            .map(|eta| format!(", ETA: {eta:.0}s"))
            .unwrap_or_default();
        print!(
            "\r  Progress: {:.1}% ({}/{} frames{eta})  ",
            job.progress.percentage, job.progress.frames_rendered, job.progress.total_frames,
        );

        tokio::select! {
            changed = updates.changed() => changed?,
            _ = tokio::signal::ctrl_c() => {
                println!("\nCancelling render...");
                let _ = manager.cancel_job(job_id);
            }
        }
    }
}
