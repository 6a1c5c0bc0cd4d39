//! # swapreel - batch face-swap video pipeline
//!
//! `swapreel` turns a folder of still images into a video, runs one
//! face-fusion job per reference image against that video, and dumps every
//! resulting video back into a single, continuously numbered frame sequence
//! with letterbox or pillarbox bars cropped away.
//!
//! ## Stages
//!
//! 1. **Sequence** - rename the input images to `img001.<ext>`, `img002.<ext>`, ...
//! 2. **Assemble** - encode them into the source video with ffmpeg
//! 3. **Face swap** - drive a job through create, add-step, submit and run
//!    for every main image
//! 4. **Extract** - detect black bars per output video and write
//!    `frame_{start:06}_{n:03}.jpg` files
//! 5. **Clean up** - remove the intermediate videos and job state
//!
//! ## Example
//!
//! ```no_run
//! use swapreel::config::AppConfig;
//! use swapreel::tools::{FaceFusionCli, Ffmpeg};
//! use swapreel::{Pipeline, ProgressPhase};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! let ffmpeg = Ffmpeg::new(&config.tools);
//! let runner = FaceFusionCli::new(&config.job_runner);
//!
//! let summary = Pipeline::new(config, ffmpeg, runner).run(|progress| {
//!     if progress.phase == ProgressPhase::FaceSwapping {
//!         println!("{}/{} jobs", progress.completed, progress.total);
//!     }
//! })?;
//! println!("{} frames", summary.total_frames);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};

pub mod assemble;
pub mod cleanup;
pub mod config;
pub mod crop;
pub mod error;
pub mod extract;
pub mod filters;
pub mod jobs;
pub mod pipeline;
pub mod sequence;
pub mod tools;

pub use error::{PipelineError, PipelineResult, ToolError};
pub use pipeline::{BatchReport, ItemOutcome, Pipeline, RunSummary};

/// Represents the current stage of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressPhase {
    /// Renaming input images into sequence order
    Sequencing,
    /// Encoding the image sequence into the source video
    Assembling,
    /// Running face-fusion jobs, one per main image
    FaceSwapping,
    /// Detecting crops and dumping frames from the output videos
    ExtractingFrames,
    /// Removing intermediate videos and job state
    CleaningUp,
    /// Run finished
    Complete,
}

/// Progress information for a pipeline run
///
/// `completed`/`total` count items (jobs or videos) in the current phase and
/// `percentage` tracks the item in flight when the tool reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    /// Current phase of the run
    pub phase: ProgressPhase,
    /// Number of items completed in the current phase
    pub completed: usize,
    /// Total number of items in the current phase (0 if unknown/indeterminate)
    pub total: usize,
    /// Percentage complete (0.0 to 100.0)
    pub percentage: f64,
    /// Human-readable message describing current status
    pub message: String,
}

impl Progress {
    /// A phase with no measurable progress.
    pub fn indeterminate(phase: ProgressPhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            completed: 0,
            total: 0,
            percentage: 0.0,
            message: message.into(),
        }
    }

    /// A single long-running step reporting a percentage.
    pub fn percent(phase: ProgressPhase, percentage: f64, message: impl Into<String>) -> Self {
        Self {
            phase,
            completed: 0,
            total: 0,
            percentage: percentage.clamp(0.0, 100.0),
            message: message.into(),
        }
    }

    /// Item-counted progress, e.g. jobs finished out of jobs planned.
    pub fn items(phase: ProgressPhase, completed: usize, total: usize) -> Self {
        let percentage = if total > 0 {
            (completed as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            phase,
            completed,
            total,
            percentage,
            message: format!("{} of {}", completed, total),
        }
    }

    /// Frame extraction of video `video_index` (1-based) out of `total`.
    pub fn video_percent(video_index: usize, total: usize, percentage: f64) -> Self {
        Self {
            phase: ProgressPhase::ExtractingFrames,
            completed: video_index.saturating_sub(1),
            total,
            percentage: percentage.clamp(0.0, 100.0),
            message: format!("Extracting frames from video {} of {}", video_index, total),
        }
    }

    /// Create a completion progress update
    pub fn complete(total_frames: usize) -> Self {
        Self {
            phase: ProgressPhase::Complete,
            completed: total_frames,
            total: total_frames,
            percentage: 100.0,
            message: format!("Pipeline complete: {} frames", total_frames),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_progress_computes_percentage() {
        let p = Progress::items(ProgressPhase::FaceSwapping, 2, 8);
        assert_eq!(p.percentage, 25.0);
        assert_eq!(p.message, "2 of 8");
        assert_eq!(Progress::items(ProgressPhase::FaceSwapping, 0, 0).percentage, 0.0);
    }

    #[test]
    fn video_progress_counts_finished_videos() {
        let p = Progress::video_percent(3, 4, 50.0);
        assert_eq!(p.phase, ProgressPhase::ExtractingFrames);
        assert_eq!(p.completed, 2);
        assert_eq!(p.total, 4);
    }
}
