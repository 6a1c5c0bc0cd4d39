//! Example: Check a video for black bars using swapreel as a library
//!
//! Run with: cargo run --example detect_crop -- path/to/video.mp4

use std::path::PathBuf;
use swapreel::config::AppConfig;
use swapreel::crop::{analyze_video, CropDecision};
use swapreel::tools::Ffmpeg;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Default settings: cropdetect=24:2:0 and a 5% materiality threshold
    let cfg = AppConfig::default();
    let ffmpeg = Ffmpeg::new(&cfg.tools);

    let input = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("folder/output_1_main.mp4"));

    if input.exists() {
        println!("Analyzing {}...", input.display());
        let analysis = analyze_video(&ffmpeg, &input, &cfg.crop_detect)?;
        println!(
            "Source: {}x{} @ {} fps, {} samples",
            analysis.info.width, analysis.info.height, analysis.info.frame_rate, analysis.samples
        );

        match &analysis.decision {
            CropDecision::Apply { crop, .. } => println!("✓ Frames would be cropped to {crop}"),
            other => println!("{other}"),
        }
    } else {
        println!("Note: {} not found.", input.display());
        println!("Pass a video path, or place a face-swapped output at that path.");
    }

    Ok(())
}
