//! Export a timeline to video.

use std::path::PathBuf;

use dreamcloud_common::AppConfig;
use dreamcloud_project_model::RenderPreset;
use dreamcloud_render_engine::{RenderJobManager, RenderOptions};

pub async fn run(
    path: PathBuf,
    preset_name: String,
    stem: Option<String>,
    keep_artifacts: bool,
) -> anyhow::Result<()> {
    let config = AppConfig::load();
    let timeline = super::load_timeline(&path)?;

    let preset = RenderPreset::by_name(&preset_name).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown preset: {preset_name}. Use: export-h264, export-webm, preview-draft"
        )
    })?;

    println!("Exporting timeline: {}", path.display());
    println!(
        "  Preset: {} ({}x{}, {:.0} fps, .{})",
        preset.name,
        preset.profile.width,
        preset.profile.height,
        preset.profile.fps(),
        preset.extension(),
    );

    let manager = RenderJobManager::new(config.render.clone())?;
    let options = RenderOptions {
        range: None,
        file_stem: stem,
        keep_artifacts,
    };
    let job_id = manager
        .render_export_with(&timeline, preset, options)
        .await?;

    super::watch_job(&manager, &job_id).await
}
