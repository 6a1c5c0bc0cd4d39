//! Stage orchestration.
//!
//! [`Pipeline`] runs Sequencer, Video Assembler, Job Dispatcher, Frame
//! Extractor and Cleanup strictly in that order, one subprocess at a time.

use std::fs;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::assemble::assemble_video;
use crate::cleanup::{cleanup, CleanupReport};
use crate::config::AppConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::extract::{extract_from_dir, ExtractedVideo, FrameCounter};
use crate::jobs::dispatch_from_dir;
use crate::sequence::sequence_images;
use crate::tools::{DetectEdges, ExtractFrames, Inspect, JobRunner, Transcode};
use crate::{Progress, ProgressPhase};

/// Outcome of one item in a best-effort batch.
#[derive(Debug)]
pub struct ItemOutcome<T> {
    /// File name of the image or video the item is about.
    pub label: String,
    pub result: Result<T, PipelineError>,
}

/// Per-item results of a batch stage that keeps going after failures.
#[derive(Debug)]
pub struct BatchReport<T> {
    pub items: Vec<ItemOutcome<T>>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> BatchReport<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: impl Into<String>, result: Result<T, PipelineError>) {
        self.items.push(ItemOutcome {
            label: label.into(),
            result,
        });
    }

    pub fn succeeded(&self) -> impl Iterator<Item = (&str, &T)> {
        self.items
            .iter()
            .filter_map(|item| item.result.as_ref().ok().map(|v| (item.label.as_str(), v)))
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &PipelineError)> {
        self.items
            .iter()
            .filter_map(|item| item.result.as_ref().err().map(|e| (item.label.as_str(), e)))
    }

    pub fn success_count(&self) -> usize {
        self.succeeded().count()
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Everything a full run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub source_video: PathBuf,
    pub jobs: BatchReport<PathBuf>,
    pub extraction: BatchReport<ExtractedVideo>,
    pub total_frames: usize,
    /// `None` when cleanup was skipped.
    pub cleanup: Option<CleanupReport>,
}

/// Full batch pipeline over a transcoder `T` and a job runner `J`.
pub struct Pipeline<T, J> {
    config: AppConfig,
    transcoder: T,
    runner: J,
    keep_videos: bool,
}

impl<T, J> Pipeline<T, J>
where
    T: Transcode + Inspect + DetectEdges + ExtractFrames,
    J: JobRunner,
{
    pub fn new(config: AppConfig, transcoder: T, runner: J) -> Self {
        Self {
            config,
            transcoder,
            runner,
            keep_videos: false,
        }
    }

    /// Leave the source and output videos (and job state) in place.
    pub fn keep_videos(mut self, keep: bool) -> Self {
        self.keep_videos = keep;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn transcoder(&self) -> &T {
        &self.transcoder
    }

    pub fn runner(&self) -> &J {
        &self.runner
    }

    /// Run every stage. Only empty inputs and a failed assembly abort;
    /// per-image and per-video failures are in the returned summary.
    pub fn run<F>(&self, progress_callback: F) -> PipelineResult<RunSummary>
    where
        F: Fn(Progress),
    {
        let cfg = &self.config;
        fs::create_dir_all(&cfg.folders.output)?;
        fs::create_dir_all(cfg.frames_dir())?;

        // Stage 1: sequence
        progress_callback(Progress::indeterminate(ProgressPhase::Sequencing, "Renaming images..."));
        let images = sequence_images(&cfg.folders.files)?;

        // Stage 2: assemble
        progress_callback(Progress::percent(ProgressPhase::Assembling, 0.0, "Encoding source video"));
        let source_video = assemble_video(&self.transcoder, &images, cfg, &|pct| {
            progress_callback(Progress::percent(ProgressPhase::Assembling, pct, "Encoding source video"));
        })?;

        // Stage 3: face swap
        let jobs = dispatch_from_dir(
            &self.runner,
            &cfg.folders.main,
            &source_video,
            &cfg.folders.output,
            cfg.job_runner.output_video_quality,
            &|done, total| progress_callback(Progress::items(ProgressPhase::FaceSwapping, done, total)),
        )?;
        if jobs.failure_count() > 0 {
            warn!(failed = jobs.failure_count(), total = jobs.len(), "some face swap jobs failed");
        }

        // Stage 4: frames
        let (extraction, total_frames) = self.extract_frames(&progress_callback)?;

        // Stage 5: cleanup
        let cleanup = if self.keep_videos {
            info!("keeping intermediate videos and job state");
            None
        } else {
            progress_callback(Progress::indeterminate(ProgressPhase::CleaningUp, "Removing intermediate videos..."));
            Some(cleanup(&self.runner, &source_video, &cfg.folders.output))
        };

        progress_callback(Progress::complete(total_frames));
        Ok(RunSummary {
            source_video,
            jobs,
            extraction,
            total_frames,
            cleanup,
        })
    }

    /// Extract frames from every output video with a fresh frame counter.
    pub fn extract_frames<F>(&self, progress_callback: &F) -> PipelineResult<(BatchReport<ExtractedVideo>, usize)>
    where
        F: Fn(Progress),
    {
        let cfg = &self.config;
        let frames_dir = cfg.frames_dir();
        fs::create_dir_all(&frames_dir)?;

        let mut counter = FrameCounter::new();
        let report = extract_from_dir(
            &self.transcoder,
            &cfg.folders.output,
            &frames_dir,
            &cfg.crop_detect,
            &mut counter,
            &|video_idx, total, pct| {
                progress_callback(Progress::video_percent(video_idx, total, pct));
            },
        )?;
        info!(total_frames = counter.total(), "frame extraction finished");
        Ok((report, counter.total()))
    }

    /// Remove intermediate videos and job state.
    pub fn cleanup(&self) -> CleanupReport {
        cleanup(&self.runner, &self.config.source_video_path(), &self.config.folders.output)
    }
}
