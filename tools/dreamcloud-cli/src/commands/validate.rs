//! Generate project XML for a timeline and validate it.

use std::path::PathBuf;

use dreamcloud_project_model::Profile;
use dreamcloud_render_engine::{generate_project_xml, validate_project_xml};

pub fn run(path: PathBuf, preview: bool, output: Option<PathBuf>) -> anyhow::Result<()> {
    let timeline = super::load_timeline(&path)?;
    let profile = if preview {
        Profile::preview()
    } else {
        Profile::full_hd()
    };

    let xml = generate_project_xml(&timeline, &profile)?;
    validate_project_xml(&xml)?;

    match output {
        Some(out) => {
            std::fs::write(&out, &xml)?;
            println!("Valid project XML written to {}", out.display());
        }
        None => print!("{xml}"),
    }

    Ok(())
}
