//! Check the render engine and configured directories.

use dreamcloud_common::AppConfig;
use dreamcloud_render_engine::EngineChecker;

pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::load();

    println!("Dreamcloud Render Check");
    println!("{}", "=".repeat(50));

    let checker = EngineChecker::new(config.render.engine_path.clone());
    let result = checker.check().await;
    if result.available {
        println!(
            "[OK] melt: {} ({})",
            result
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            result.version.as_deref().unwrap_or("unknown version"),
        );
    } else {
        println!(
            "[FAIL] melt: {}",
            result.error.as_deref().unwrap_or("not available")
        );
    }

    for (label, dir) in [
        ("Export dir", &config.render.export_dir),
        ("Preview dir", &config.render.preview_dir),
        ("Temp dir", &config.render.temp_dir),
    ] {
        let state = if dir.is_dir() { "[OK]" } else { "[--]" };
        println!("{state} {label}: {}", dir.display());
    }

    println!();
    if result.available {
        println!("Render pipeline is ready.");
    } else {
        println!("Install melt to enable rendering.");
    }

    Ok(())
}
