use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::filters::build_assembly_vf;
use crate::sequence::ImageSet;
use crate::tools::{AssemblyRequest, Transcode};

/// Encode the sequenced images into the source video, then delete them.
///
/// Returns the path of the assembled video. The images are removed only
/// after the encoder reports success and the output file exists.
pub fn assemble_video<T: Transcode + ?Sized>(
    transcoder: &T,
    images: &ImageSet,
    config: &AppConfig,
    progress: &dyn Fn(f64),
) -> PipelineResult<PathBuf> {
    if images.is_empty() {
        return Err(PipelineError::EmptyInput { dir: images.dir.clone() });
    }
    let ext = images.common_extension().ok_or_else(|| {
        PipelineError::assembly(
            "input images use mixed extensions; the frame pattern needs a single one",
            None,
        )
    })?;

    let profile = config.resolution_profile();
    let policy = config.scaling_policy();
    let filter = build_assembly_vf(&profile, policy, &config.video.scaling_algorithm);
    let input_pattern = images.dir.join(format!("img%03d.{ext}"));
    let output = images.dir.join(&config.video.source_video_name);
    let fps = config.video.fps;
    let expected_duration = images.len() as f64 / fps as f64;

    info!(
        frames = images.len(),
        width = profile.width,
        height = profile.height,
        policy = %policy,
        duration_secs = expected_duration,
        "assembling source video"
    );

    let request = AssemblyRequest {
        input_pattern: &input_pattern,
        frame_rate: fps,
        filter: &filter,
        preset: &config.video.quality_preset,
        crf: config.video.crf,
        pixel_format: &config.video.pixel_format,
        output: &output,
        expected_duration,
    };
    transcoder
        .assemble(&request, progress)
        .map_err(|e| PipelineError::assembly("transcoder failed", Some(e)))?;

    if !output.is_file() {
        return Err(PipelineError::assembly(
            format!("transcoder finished but {} was not written", output.display()),
            None,
        ));
    }
    info!(video = %output.display(), "source video created");

    remove_consumed_images(images);
    Ok(output)
}

fn remove_consumed_images(images: &ImageSet) {
    let mut removed = 0usize;
    for img in &images.images {
        match remove_if_present(&img.path) {
            Ok(true) => removed += 1,
            Ok(false) => {}
            Err(e) => warn!(image = %img.path.display(), error = %e, "could not delete consumed image"),
        }
    }
    info!(removed, dir = %images.dir.display(), "deleted sequenced images");
}

pub(crate) fn remove_if_present(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
