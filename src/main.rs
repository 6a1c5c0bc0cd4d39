use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use swapreel::cleanup::{cleanup, CleanupReport};
use swapreel::config::AppConfig;
use swapreel::crop::analyze_video;
use swapreel::extract::ExtractedVideo;
use swapreel::tools::{ensure_in_path, FaceFusionCli, Ffmpeg, JobRunner};
use swapreel::{BatchReport, Pipeline, Progress, ProgressPhase, RunSummary};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = "swapreel.toml";

fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(p) = explicit {
        return AppConfig::from_file(p);
    }

    // Look for swapreel.toml in the user config dir, current dir fallback, then built-in default
    let mut tried: Vec<PathBuf> = Vec::new();
    if let Some(mut d) = dirs::config_dir() {
        d.push("swapreel");
        d.push(CONFIG_FILE);
        tried.push(d);
    }
    tried.push(PathBuf::from(CONFIG_FILE));

    for p in &tried {
        if p.exists() {
            info!(config = %p.display(), "loading config");
            return AppConfig::from_file(p);
        }
    }

    Ok(AppConfig::default())
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the whole pipeline (the default)
    Run,
    /// Report the crop the analyzer would apply to a video
    DetectCrop {
        /// Video to analyze
        video: PathBuf,
    },
    /// Only extract frames from the videos already in the output folder
    Extract,
    /// Remove intermediate videos and face-fusion job state
    Clean,
}

#[derive(Parser, Debug)]
#[command(version, about = "Batch face swap: images to video, one swap per reference image, cropped frames out.")]
struct Args {
    /// Optional subcommands
    #[command(subcommand)]
    cmd: Option<Command>,

    /// Config file (skips the default lookup)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Folder with the images that become the source video
    #[arg(long, global = true)]
    files: Option<PathBuf>,

    /// Folder with the reference (main) images
    #[arg(long, global = true)]
    main: Option<PathBuf>,

    /// Folder receiving the swapped videos and the extracted frames
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Resolution profile for the source video (720p, 1080p, 1440p, 2160p)
    #[arg(long, global = true)]
    resolution: Option<String>,

    /// Scaling mode: fit, fill or stretch
    #[arg(long, global = true)]
    scale_mode: Option<String>,

    /// Do not pad when fitting
    #[arg(long, global = true, default_value_t = false)]
    no_padding: bool,

    /// Frame rate of the source video
    #[arg(long, global = true)]
    fps: Option<u32>,

    /// x264 preset
    #[arg(long, global = true)]
    preset: Option<String>,

    /// x264 constant rate factor (0-51)
    #[arg(long, global = true)]
    crf: Option<u8>,

    /// Keep the source and swapped videos after extraction
    #[arg(long, global = true, default_value_t = false)]
    keep_videos: bool,

    /// Do not ask before renaming and deleting input images
    #[arg(long, short, global = true, default_value_t = false)]
    yes: bool,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,
}

impl Args {
    fn apply_overrides(&self, cfg: &mut AppConfig) {
        if let Some(v) = &self.files {
            cfg.folders.files = v.clone();
        }
        if let Some(v) = &self.main {
            cfg.folders.main = v.clone();
        }
        if let Some(v) = &self.output {
            cfg.folders.output = v.clone();
        }
        if let Some(v) = &self.resolution {
            cfg.video.resolution = v.clone();
        }
        if let Some(v) = &self.scale_mode {
            cfg.video.scale_mode = v.clone();
        }
        if self.no_padding {
            cfg.video.use_padding = false;
        }
        if let Some(v) = self.fps {
            cfg.video.fps = v;
        }
        if let Some(v) = &self.preset {
            cfg.video.quality_preset = v.clone();
        }
        if let Some(v) = self.crf {
            cfg.video.crf = v;
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "swapreel=debug" } else { "swapreel=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn preflight(programs: &[&str]) -> Result<()> {
    for program in programs {
        let path = ensure_in_path(program)?;
        info!(program, path = %path.display(), "found tool");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut cfg = load_config(args.config.as_deref())?;
    args.apply_overrides(&mut cfg);
    cfg.validate().context("invalid configuration")?;

    let ffmpeg = Ffmpeg::new(&cfg.tools);
    let runner = FaceFusionCli::new(&cfg.job_runner);

    match args.cmd.as_ref().unwrap_or(&Command::Run) {
        Command::Run => {
            preflight(&[ffmpeg.ffmpeg_cmd(), ffmpeg.ffprobe_cmd(), runner.program()])?;
            if !args.yes
                && !Confirm::new()
                    .with_prompt(format!(
                        "Images in {} will be renamed and deleted after encoding. Continue?",
                        cfg.folders.files.display()
                    ))
                    .default(false)
                    .interact()?
            {
                println!("Operation cancelled.");
                return Ok(());
            }

            let pipeline = Pipeline::new(cfg.clone(), ffmpeg, runner).keep_videos(args.keep_videos);
            let bars = Bars::default();
            let summary = pipeline.run(|p| bars.update(&p))?;
            bars.finish();

            print_summary(&summary);
            write_details(&cfg, &summary.extraction, summary.total_frames)?;
        }
        Command::DetectCrop { video } => {
            preflight(&[ffmpeg.ffmpeg_cmd(), ffmpeg.ffprobe_cmd()])?;
            let analysis = analyze_video(&ffmpeg, video, &cfg.crop_detect)?;
            println!(
                "{}: {}x{} @ {} fps, {} samples",
                video.display(),
                analysis.info.width,
                analysis.info.height,
                analysis.info.frame_rate,
                analysis.samples
            );
            println!("{}", analysis.decision);
        }
        Command::Extract => {
            preflight(&[ffmpeg.ffmpeg_cmd(), ffmpeg.ffprobe_cmd()])?;
            let pipeline = Pipeline::new(cfg.clone(), ffmpeg, runner);
            let bars = Bars::default();
            let (report, total_frames) = pipeline.extract_frames(&|p| bars.update(&p))?;
            bars.finish();

            print_failures(&report);
            println!("\n{} frames from {} videos in {}", total_frames, report.success_count(), cfg.frames_dir().display());
            write_details(&cfg, &report, total_frames)?;
        }
        Command::Clean => {
            preflight(&[runner.program()])?;
            clean(&runner, &cfg)?;
        }
    }

    Ok(())
}

/// One progress bar per phase, rebuilt whenever the phase or video changes.
#[derive(Default)]
struct Bars {
    state: RefCell<Option<(ProgressPhase, usize, ProgressBar)>>,
}

impl Bars {
    fn update(&self, p: &Progress) {
        let mut state = self.state.borrow_mut();
        let key = (p.phase, if p.phase == ProgressPhase::ExtractingFrames { p.completed } else { 0 });
        let stale = state.as_ref().map_or(true, |(phase, item, _)| (*phase, *item) != key);
        if stale {
            if let Some((_, _, bar)) = state.take() {
                bar.finish_and_clear();
            }
            if p.phase == ProgressPhase::Complete {
                return;
            }
            *state = Some((key.0, key.1, new_bar(p)));
        }
        if let Some((_, _, bar)) = state.as_ref() {
            match p.phase {
                ProgressPhase::FaceSwapping => bar.set_position(p.completed as u64),
                ProgressPhase::Assembling | ProgressPhase::ExtractingFrames => bar.set_position(p.percentage as u64),
                _ => bar.tick(),
            }
            bar.set_message(p.message.clone());
        }
    }

    fn finish(&self) {
        if let Some((_, _, bar)) = self.state.borrow_mut().take() {
            bar.finish_and_clear();
        }
    }
}

fn new_bar(p: &Progress) -> ProgressBar {
    let (len, template) = match p.phase {
        ProgressPhase::FaceSwapping => (
            p.total as u64,
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} jobs {msg}",
        ),
        ProgressPhase::Assembling | ProgressPhase::ExtractingFrames => (
            100,
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}",
        ),
        _ => (0, "{spinner:.green} [{elapsed_precise}] {msg}"),
    };
    let bar = if len == 0 { ProgressBar::new_spinner() } else { ProgressBar::new(len) };
    if let Ok(style) = ProgressStyle::default_bar().template(template) {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar
}

/// Cleanup problems are reported, never turned into a failing exit status.
fn clean<R: JobRunner>(runner: &R, cfg: &AppConfig) -> Result<CleanupReport> {
    let report = cleanup(runner, &cfg.source_video_path(), &cfg.folders.output);
    print_cleanup(&report);
    Ok(report)
}

fn print_cleanup(report: &CleanupReport) {
    println!(
        "Removed source video: {}, swapped videos: {}, jobs deleted: {}",
        report.source_removed, report.videos_removed, report.jobs_deleted
    );
    for warning in &report.warnings {
        eprintln!("  cleanup: {warning}");
    }
}

fn print_failures<T>(report: &BatchReport<T>) {
    for (label, err) in report.failed() {
        warn!(item = %label, error = %err, "failed");
        eprintln!("  failed: {label}: {err}");
    }
}

fn print_summary(summary: &RunSummary) {
    println!("\nSource video: {}", summary.source_video.display());
    println!(
        "Face swap jobs: {} succeeded, {} failed",
        summary.jobs.success_count(),
        summary.jobs.failure_count()
    );
    print_failures(&summary.jobs);
    println!(
        "Videos extracted: {} succeeded, {} failed",
        summary.extraction.success_count(),
        summary.extraction.failure_count()
    );
    print_failures(&summary.extraction);
    if let Some(cleanup) = &summary.cleanup {
        for warning in &cleanup.warnings {
            eprintln!("  cleanup: {warning}");
        }
    }
    println!("\nTotal frames extracted: {}", summary.total_frames);
}

// --- Create details.md ---
fn write_details(cfg: &AppConfig, report: &BatchReport<ExtractedVideo>, total_frames: usize) -> Result<()> {
    let profile = cfg.resolution_profile();
    let mut details = format!(
        "Version: {}\nFrames: {}\nVideos: {}\nResolution: {} ({}x{})\nScaling: {}\nFPS: {}\n",
        env!("CARGO_PKG_VERSION"),
        total_frames,
        report.len(),
        profile.name,
        profile.width,
        profile.height,
        cfg.scaling_policy(),
        cfg.video.fps
    );
    for (label, video) in report.succeeded() {
        let crop = video.crop.map_or_else(|| "none".to_string(), |c| c.to_string());
        details.push_str(&format!(
            "\n- {}: frames {}-{} ({} frames), crop {}",
            label,
            video.start_number,
            video.start_number + video.frames.saturating_sub(1),
            video.frames,
            crop
        ));
    }
    for (label, err) in report.failed() {
        details.push_str(&format!("\n- {}: failed: {}", label, err));
    }
    details.push('\n');

    let frames_dir = cfg.frames_dir();
    fs::create_dir_all(&frames_dir).context("creating frames dir")?;
    fs::write(frames_dir.join("details.md"), &details).context("writing details file")?;
    Ok(())
}
