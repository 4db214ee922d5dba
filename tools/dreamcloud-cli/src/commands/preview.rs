//! Fast preview render, optionally restricted to a time range.

use std::path::PathBuf;

use dreamcloud_common::AppConfig;
use dreamcloud_project_model::TimeRange;
use dreamcloud_render_engine::RenderJobManager;

pub async fn run(path: PathBuf, start: Option<f64>, end: Option<f64>) -> anyhow::Result<()> {
    let config = AppConfig::load();
    let timeline = super::load_timeline(&path)?;

    let range = match (start, end) {
        (None, None) => None,
        (start, end) => Some(TimeRange::new(
            start.unwrap_or(0.0),
            end.unwrap_or_else(|| timeline.duration_secs()),
        )),
    };

    println!("Previewing timeline: {}", path.display());
    if let Some(range) = &range {
        println!("  Range: {:.2}s .. {:.2}s", range.start_secs, range.end_secs);
    }

    let manager = RenderJobManager::new(config.render.clone())?;
    let job_id = manager.render_preview(&timeline, range).await?;

    super::watch_job(&manager, &job_id).await
}
