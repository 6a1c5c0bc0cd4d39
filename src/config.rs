//! Run configuration.
//!
//! Loaded once from TOML before the pipeline starts and never changed
//! afterwards. Every field has a default, so a config file only needs the
//! keys it wants to override.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::filters::{resolve_resolution, ResolutionProfile, ScalingPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderConfig {
    /// Still images that become the source video.
    pub files: PathBuf,
    /// Reference ("main") face images, one job each.
    pub main: PathBuf,
    /// Face-fusion output videos land here.
    pub output: PathBuf,
    /// Subfolder of `output` receiving extracted frames.
    pub frames_subdir: String,
}

impl Default for FolderConfig {
    fn default() -> Self {
        Self {
            files: PathBuf::from("files"),
            main: PathBuf::from("main"),
            output: PathBuf::from("folder"),
            frames_subdir: "extracted_frames".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    /// Resolution preset name (`720p`, `1080p`, `1440p`, `2160p`).
    pub resolution: String,
    /// `fit`, `fill` or `stretch`.
    pub scale_mode: String,
    pub use_padding: bool,
    /// ffmpeg `scale` flags value, e.g. `lanczos`.
    pub scaling_algorithm: String,
    pub fps: u32,
    /// x264 preset name.
    pub quality_preset: String,
    /// x264 CRF, 0 is lossless.
    pub crf: u8,
    pub pixel_format: String,
    /// File name of the assembled video inside the files folder.
    pub source_video_name: String,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            resolution: "1440p".to_string(),
            scale_mode: "fit".to_string(),
            use_padding: true,
            scaling_algorithm: "lanczos".to_string(),
            fps: 60,
            quality_preset: "veryslow".to_string(),
            crf: 0,
            pixel_format: "yuv420p".to_string(),
            source_video_name: "source_video.mp4".to_string(),
        }
    }
}

/// Sensitivity of the black-bar detection pass and the materiality gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropDetectSettings {
    pub limit: u32,
    pub round: u32,
    pub reset: u32,
    /// Minimum fractional width or height reduction before a crop is applied.
    pub threshold: f64,
}

impl Default for CropDetectSettings {
    fn default() -> Self {
        Self {
            limit: 24,
            round: 2,
            reset: 0,
            threshold: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub ffmpeg: String,
    pub ffprobe: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobRunnerConfig {
    pub program: String,
    /// Arguments placed before every subcommand (the script path).
    pub args: Vec<String>,
    /// Directory the runner is started in, usually the face-fusion checkout.
    pub working_dir: Option<PathBuf>,
    /// Let the runner write to the terminal instead of capturing its output.
    pub show_output: bool,
    pub output_video_quality: u8,
}

impl Default for JobRunnerConfig {
    fn default() -> Self {
        Self {
            program: "python".to_string(),
            args: vec!["facefusion.py".to_string()],
            working_dir: None,
            show_output: true,
            output_video_quality: 90,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub folders: FolderConfig,
    pub video: VideoSettings,
    pub crop_detect: CropDetectSettings,
    pub tools: ToolPaths,
    pub job_runner: JobRunnerConfig,
}

impl AppConfig {
    /// Load and validate a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let cfg = Self::from_toml_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: AppConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.video.fps == 0 {
            return Err(anyhow!("video.fps must be greater than zero"));
        }
        if self.video.crf > 51 {
            return Err(anyhow!("video.crf must be between 0 and 51, got {}", self.video.crf));
        }
        if !(self.crop_detect.threshold > 0.0 && self.crop_detect.threshold < 1.0) {
            return Err(anyhow!(
                "crop_detect.threshold must be a fraction between 0 and 1, got {}",
                self.crop_detect.threshold
            ));
        }
        if self.job_runner.output_video_quality > 100 {
            return Err(anyhow!("job_runner.output_video_quality must be at most 100"));
        }
        if self.folders.frames_subdir.trim().is_empty() {
            return Err(anyhow!("folders.frames_subdir cannot be empty"));
        }
        Ok(())
    }

    pub fn resolution_profile(&self) -> ResolutionProfile {
        resolve_resolution(&self.video.resolution)
    }

    pub fn scaling_policy(&self) -> ScalingPolicy {
        ScalingPolicy::from_mode(&self.video.scale_mode, self.video.use_padding)
    }

    pub fn source_video_path(&self) -> PathBuf {
        self.folders.files.join(&self.video.source_video_name)
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.folders.output.join(&self.folders.frames_subdir)
    }
}
