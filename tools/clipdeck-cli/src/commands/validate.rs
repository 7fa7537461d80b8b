//! Validate a project snapshot.

use std::path::PathBuf;

use clipdeck_project_model::ProjectSnapshot;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    println!("Validating project at: {}", path.display());

    let snapshot =
        ProjectSnapshot::load(&path).map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))?;

    println!("  Name: {}", snapshot.project_name);
    println!(
        "  Clips: {} video, {} audio",
        snapshot.video_clips.len(),
        snapshot.audio_clips.len()
    );

    let mut issues = snapshot.validate_clips();
    // Unreachable sources are per-clip load errors, not fatal.
    issues.extend(snapshot.validate_sources().into_iter().map(|s| {
        format!("clip {} references a missing source: {}", s.clip_id, s.source_url)
    }));

    if issues.is_empty() {
        println!("  Sources: All present");
        println!("\nProject is valid.");
    } else {
        println!("\nValidation issues:");
        for issue in &issues {
            println!("  - {issue}");
        }
        println!(
            "\n{} issue(s) found. Project may not be fully usable.",
            issues.len()
        );
    }

    Ok(())
}
