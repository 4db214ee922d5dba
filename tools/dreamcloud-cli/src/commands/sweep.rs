//! Remove orphaned render workspaces.

use std::time::Duration;

use dreamcloud_common::AppConfig;
use dreamcloud_render_engine::TempResourceManager;

pub fn run(max_age_secs: Option<u64>) -> anyhow::Result<()> {
    let config = AppConfig::load();
    let max_age = Duration::from_secs(max_age_secs.unwrap_or(config.render.orphan_max_age_secs));

    let temp = TempResourceManager::new(config.render.temp_dir.clone());
    let removed = temp.sweep_orphans(max_age)?;

    println!(
        "Removed {removed} orphaned workspace(s) under {}",
        config.render.temp_dir.display()
    );
    Ok(())
}
