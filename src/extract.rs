//! Frame extraction with continuous numbering across videos.
//!
//! Every video gets its own file-name prefix `frame_{start:06}_` where
//! `start` is one past the number of frames written by the videos before it,
//! so frames from the whole batch sort into one global sequence. The frames
//! actually found on disk under a prefix are what advance the counter.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::CropDetectSettings;
use crate::crop::{analyze_video, CropRect};
use crate::error::{PipelineError, PipelineResult};
use crate::filters::build_frame_extraction_vf;
use crate::pipeline::BatchReport;
use crate::tools::{DetectEdges, ExtractFrames, ExtractionRequest, Inspect};

pub const VIDEO_EXTENSION: &str = "mp4";

/// Running total of frames written so far in a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCounter {
    offset: usize,
}

impl FrameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start number for the next video (1-based).
    pub fn next_start(&self) -> usize {
        self.offset + 1
    }

    pub fn advance(&mut self, frames: usize) {
        self.offset += frames;
    }

    pub fn total(&self) -> usize {
        self.offset
    }
}

/// One video's extraction result.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedVideo {
    pub video: PathBuf,
    pub start_number: usize,
    pub frames: usize,
    pub crop: Option<CropRect>,
}

pub fn frame_prefix(start_number: usize) -> String {
    format!("frame_{start_number:06}_")
}

/// Output pattern for a video starting at `start_number`.
pub fn frame_pattern(frames_dir: &Path, start_number: usize) -> PathBuf {
    frames_dir.join(format!("{}%03d.jpg", frame_prefix(start_number)))
}

fn frames_with_prefix(frames_dir: &Path, prefix: &str) -> Vec<PathBuf> {
    WalkDir::new(frames_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_str().is_some_and(|n| n.starts_with(prefix)))
        .map(|e| e.into_path())
        .collect()
}

/// Number of frame files in `frames_dir` carrying the prefix for `start_number`.
pub fn count_frames(frames_dir: &Path, start_number: usize) -> usize {
    frames_with_prefix(frames_dir, &frame_prefix(start_number)).len()
}

/// Delete every frame under the prefix for `start_number`.
///
/// Runs before a dump, so leftovers from an earlier run are not counted, and
/// after a failed one, so the next video can reuse the start number.
fn clear_frames(frames_dir: &Path, start_number: usize) {
    for path in frames_with_prefix(frames_dir, &frame_prefix(start_number)) {
        if let Err(e) = fs::remove_file(&path) {
            warn!(frame = %path.display(), error = %e, "could not delete stale frame");
        }
    }
}

pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(VIDEO_EXTENSION))
}

/// Videos directly inside `dir`, sorted by file name.
pub fn list_videos(dir: &Path) -> Vec<PathBuf> {
    let mut videos: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_video_file(p))
        .collect();
    videos.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    videos
}

/// Analyze one video for black bars and dump its frames starting at `start_number`.
pub fn extract_video<T>(
    tools: &T,
    video: &Path,
    frames_dir: &Path,
    settings: &CropDetectSettings,
    start_number: usize,
    progress: &dyn Fn(f64),
) -> PipelineResult<ExtractedVideo>
where
    T: Inspect + DetectEdges + ExtractFrames + ?Sized,
{
    let analysis = analyze_video(tools, video, settings)
        .map_err(|e| PipelineError::extraction(video, "could not analyze video", Some(e)))?;
    let crop = analysis.decision.crop().copied();

    let filter = build_frame_extraction_vf(analysis.info.frame_rate, crop.as_ref());
    let pattern = frame_pattern(frames_dir, start_number);
    info!(
        video = %video.display(),
        start_number,
        filter = %filter,
        "extracting frames"
    );

    clear_frames(frames_dir, start_number);
    let request = ExtractionRequest {
        video,
        filter: &filter,
        output_pattern: &pattern,
        expected_duration: analysis.info.duration,
    };
    if let Err(e) = tools.extract_frames(&request, progress) {
        clear_frames(frames_dir, start_number);
        return Err(PipelineError::extraction(video, "frame dump failed", Some(e)));
    }

    let frames = count_frames(frames_dir, start_number);
    if frames == 0 {
        warn!(video = %video.display(), "extraction finished without writing any frames");
    }
    Ok(ExtractedVideo {
        video: video.to_path_buf(),
        start_number,
        frames,
        crop,
    })
}

/// Extract every video in order, advancing `counter` by each success.
///
/// A failed video is recorded and skipped; the counter does not move for it.
pub fn extract_all<T>(
    tools: &T,
    videos: &[PathBuf],
    frames_dir: &Path,
    settings: &CropDetectSettings,
    counter: &mut FrameCounter,
    progress: &dyn Fn(usize, usize, f64),
) -> BatchReport<ExtractedVideo>
where
    T: Inspect + DetectEdges + ExtractFrames + ?Sized,
{
    let total = videos.len();
    let mut report = BatchReport::new();

    for (i, video) in videos.iter().enumerate() {
        let index = i + 1;
        let label = video
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| video.display().to_string());
        info!(index, total, video = %label, "processing video");

        progress(index, total, 0.0);
        let result = extract_video(tools, video, frames_dir, settings, counter.next_start(), &|pct| {
            progress(index, total, pct)
        });
        match &result {
            Ok(done) => {
                counter.advance(done.frames);
                info!(video = %label, frames = done.frames, running_total = counter.total(), "frames extracted");
            }
            Err(e) => warn!(video = %label, error = %e, "skipping video"),
        }
        report.push(label, result);
    }
    report
}

/// Extract frames from the videos found in `output_dir` into `frames_dir`.
pub fn extract_from_dir<T>(
    tools: &T,
    output_dir: &Path,
    frames_dir: &Path,
    settings: &CropDetectSettings,
    counter: &mut FrameCounter,
    progress: &dyn Fn(usize, usize, f64),
) -> PipelineResult<BatchReport<ExtractedVideo>>
where
    T: Inspect + DetectEdges + ExtractFrames + ?Sized,
{
    let videos = list_videos(output_dir);
    if videos.is_empty() {
        return Err(PipelineError::EmptyInput {
            dir: output_dir.to_path_buf(),
        });
    }
    fs::create_dir_all(frames_dir)?;
    info!(count = videos.len(), dir = %output_dir.display(), "found videos to extract");
    Ok(extract_all(tools, &videos, frames_dir, settings, counter, progress))
}
