//! External tool seams.
//!
//! Every stage talks to ffmpeg, ffprobe and the face-fusion CLI through the
//! narrow traits defined here, so the crop consensus and frame numbering
//! logic can run against fakes. [`Ffmpeg`] and [`FaceFusionCli`] are the
//! subprocess-backed implementations used by the binary.

use serde::Deserialize;
use std::collections::VecDeque;
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command as ProcCommand, Stdio};
use std::str::FromStr;
use std::sync::OnceLock;
use std::thread;

use regex::Regex;
use tracing::{debug, trace};

use crate::config::{CropDetectSettings, JobRunnerConfig, ToolPaths};
use crate::error::{JobPhase, ToolError};
use crate::jobs::FaceSwapJob;

/// Exact frame rate as reported by ffprobe (`r_frame_rate`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl FromStr for FrameRate {
    type Err = String;

    /// Parses `"30000/1001"` or a bare integer like `"60"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (num, den) = match s.split_once('/') {
            Some((n, d)) => (n.trim(), d.trim()),
            None => (s, "1"),
        };
        let num: u32 = num.parse().map_err(|_| format!("bad frame rate numerator in '{s}'"))?;
        let den: u32 = den.parse().map_err(|_| format!("bad frame rate denominator in '{s}'"))?;
        if num == 0 || den == 0 {
            return Err(format!("frame rate '{s}' is undefined"));
        }
        Ok(FrameRate { num, den })
    }
}

/// Stream metadata needed by crop analysis and frame extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    /// Container duration in seconds, when ffprobe reports one.
    pub duration: Option<f64>,
}

/// Everything the encoder needs to turn the renamed frames into a video.
#[derive(Debug, Clone)]
pub struct AssemblyRequest<'a> {
    /// printf-style pattern such as `files/img%03d.jpg`.
    pub input_pattern: &'a Path,
    pub frame_rate: u32,
    pub filter: &'a str,
    pub preset: &'a str,
    pub crf: u8,
    pub pixel_format: &'a str,
    pub output: &'a Path,
    /// Used only to turn encoder time into a percentage.
    pub expected_duration: f64,
}

#[derive(Debug, Clone)]
pub struct ExtractionRequest<'a> {
    pub video: &'a Path,
    pub filter: &'a str,
    /// printf-style pattern such as `frames/frame_000121_%03d.jpg`.
    pub output_pattern: &'a Path,
    pub expected_duration: Option<f64>,
}

/// Encode an image sequence into a video.
pub trait Transcode {
    fn assemble(&self, request: &AssemblyRequest<'_>, progress: &dyn Fn(f64)) -> Result<(), ToolError>;
}

/// Read stream metadata from a video file.
pub trait Inspect {
    fn inspect(&self, video: &Path) -> Result<VideoInfo, ToolError>;
}

/// Run an edge-detection pass and return every raw crop token (`W:H:X:Y`)
/// in the order the tool emitted them.
pub trait DetectEdges {
    fn detect_edges(&self, video: &Path, settings: &CropDetectSettings) -> Result<Vec<String>, ToolError>;
}

/// Write one image per decoded frame.
pub trait ExtractFrames {
    fn extract_frames(&self, request: &ExtractionRequest<'_>, progress: &dyn Fn(f64)) -> Result<(), ToolError>;
}

/// Face-fusion job lifecycle. Each call is a separate process invocation.
pub trait JobRunner {
    fn run_phase(&self, phase: JobPhase, job: &FaceSwapJob) -> Result<(), ToolError>;
    fn delete_all_jobs(&self) -> Result<(), ToolError>;
}

/// Fail with [`ToolError::NotFound`] unless `program` resolves on PATH.
pub fn ensure_in_path(program: &str) -> Result<PathBuf, ToolError> {
    which::which(program).map_err(|_| ToolError::NotFound {
        program: program.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Log adapters
// ---------------------------------------------------------------------------

fn crop_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"crop=(\d+:\d+:\d+:\d+)").expect("crop token regex is valid"))
}

/// Pull the `W:H:X:Y` token out of one cropdetect log line, if present.
pub fn parse_crop_token(line: &str) -> Option<&str> {
    crop_token_re()
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Call `f` with every line of `reader`.
///
/// Tools write file names and metadata tags verbatim, so lines are decoded
/// lossily instead of failing on the first byte that is not UTF-8.
pub fn for_each_lossy_line<R: BufRead>(mut reader: R, mut f: impl FnMut(&str)) -> std::io::Result<()> {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        f(line.trim_end_matches(|c: char| c == '\r' || c == '\n'));
    }
}

/// Lines kept from a cropdetect log for the error report.
const CROP_LOG_TAIL_LINES: usize = 64;

/// What a cropdetect pass wrote to its log channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CropLog {
    /// Crop tokens in emission order.
    pub tokens: Vec<String>,
    /// Last lines that carried no token.
    pub tail: VecDeque<String>,
}

/// Scan a whole diagnostic stream for crop tokens, keeping emission order.
pub fn collect_crop_tokens<R: BufRead>(reader: R) -> std::io::Result<CropLog> {
    let mut log = CropLog::default();
    for_each_lossy_line(reader, |line| match parse_crop_token(line) {
        Some(token) => log.tokens.push(token.to_string()),
        None => {
            log.tail.push_back(line.to_string());
            if log.tail.len() > CROP_LOG_TAIL_LINES {
                log.tail.pop_front();
            }
        }
    })?;
    Ok(log)
}

/// Incremental parser for ffmpeg's `-progress` key/value stream.
#[derive(Debug, Clone)]
pub struct ProgressParser {
    total_us: f64,
    percent: f64,
}

impl ProgressParser {
    pub fn new(expected_duration_secs: Option<f64>) -> Self {
        Self {
            total_us: expected_duration_secs.unwrap_or(0.0).max(0.0) * 1_000_000.0,
            percent: 0.0,
        }
    }

    /// Feed one line; returns the new percentage when it moved.
    pub fn feed(&mut self, line: &str) -> Option<f64> {
        let (key, value) = line.trim().split_once('=')?;
        let next = match key {
            // ffmpeg reports out_time_ms in microseconds too.
            "out_time_us" | "out_time_ms" => {
                if self.total_us <= 0.0 {
                    return None;
                }
                let us: f64 = value.trim().parse().ok()?;
                (us / self.total_us * 100.0).clamp(0.0, 100.0)
            }
            "progress" if value.trim() == "end" => 100.0,
            _ => return None,
        };
        if next > self.percent {
            self.percent = next;
            Some(next)
        } else {
            None
        }
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }
}

// ---------------------------------------------------------------------------
// ffmpeg / ffprobe
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Parse `ffprobe -of json` output into [`VideoInfo`].
pub fn parse_ffprobe_json(program: &str, json: &[u8]) -> Result<VideoInfo, ToolError> {
    let probe: FfprobeOutput =
        serde_json::from_slice(json).map_err(|e| ToolError::parse(program, format!("invalid JSON: {e}")))?;

    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref().map_or(true, |t| t == "video"))
        .ok_or_else(|| ToolError::parse(program, "no video stream"))?;

    let width = stream.width.filter(|w| *w > 0);
    let height = stream.height.filter(|h| *h > 0);
    let (width, height) = match (width, height) {
        (Some(w), Some(h)) => (w, h),
        _ => return Err(ToolError::parse(program, "video stream has no dimensions")),
    };

    let frame_rate = stream
        .r_frame_rate
        .as_deref()
        .ok_or_else(|| ToolError::parse(program, "video stream has no r_frame_rate"))?
        .parse::<FrameRate>()
        .map_err(|e| ToolError::parse(program, e))?;

    let duration = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| *d > 0.0);

    Ok(VideoInfo {
        width,
        height,
        frame_rate,
        duration,
    })
}

/// ffmpeg and ffprobe invoked as subprocesses.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg: String,
    ffprobe: String,
}

impl Ffmpeg {
    pub fn new(paths: &ToolPaths) -> Self {
        Self {
            ffmpeg: paths.ffmpeg.clone(),
            ffprobe: paths.ffprobe.clone(),
        }
    }

    pub fn ffmpeg_cmd(&self) -> &str {
        &self.ffmpeg
    }

    pub fn ffprobe_cmd(&self) -> &str {
        &self.ffprobe
    }

    /// Run ffmpeg with `-progress pipe:1`, forwarding percentages and
    /// keeping stderr for the error report.
    fn run_with_progress(&self, args: &[String], expected_duration: Option<f64>, progress: &dyn Fn(f64)) -> Result<(), ToolError> {
        debug!(program = %self.ffmpeg, args = ?args, "spawning ffmpeg");
        let mut child = ProcCommand::new(&self.ffmpeg)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ToolError::Spawn {
                program: self.ffmpeg.clone(),
                source,
            })?;

        let stderr = child.stderr.take();
        let stderr_thread = thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut err) = stderr {
                let _ = err.read_to_end(&mut buf);
            }
            String::from_utf8_lossy(&buf).into_owned()
        });

        let mut parser = ProgressParser::new(expected_duration);
        let read = match child.stdout.take() {
            Some(stdout) => for_each_lossy_line(BufReader::new(stdout), |line| {
                trace!(line = %line, "ffmpeg progress");
                if let Some(pct) = parser.feed(line) {
                    progress(pct);
                }
            }),
            None => Ok(()),
        };

        // Reap the child and the reader thread before reporting a read error.
        let status = child.wait();
        let stderr_text = stderr_thread.join().unwrap_or_default();
        read?;
        let status = status?;
        if !status.success() {
            return Err(ToolError::failed(&self.ffmpeg, status.code(), &stderr_text));
        }
        Ok(())
    }
}

/// ffmpeg arguments for encoding the image sequence at a constant frame rate.
pub fn assembly_args(request: &AssemblyRequest<'_>) -> Vec<String> {
    let fps = request.frame_rate.to_string();
    vec![
        "-y".into(),
        "-hide_banner".into(),
        "-nostats".into(),
        "-loglevel".into(),
        "error".into(),
        "-progress".into(),
        "pipe:1".into(),
        "-framerate".into(),
        fps.clone(),
        "-i".into(),
        request.input_pattern.to_string_lossy().into_owned(),
        "-c:v".into(),
        "libx264".into(),
        "-pix_fmt".into(),
        request.pixel_format.to_string(),
        "-preset".into(),
        request.preset.to_string(),
        "-crf".into(),
        request.crf.to_string(),
        "-r".into(),
        fps,
        "-vf".into(),
        request.filter.to_string(),
        request.output.to_string_lossy().into_owned(),
    ]
}

/// ffmpeg arguments for dumping every decoded frame as a best-quality JPEG.
pub fn extraction_args(request: &ExtractionRequest<'_>) -> Vec<String> {
    vec![
        "-y".into(),
        "-hide_banner".into(),
        "-nostats".into(),
        "-loglevel".into(),
        "error".into(),
        "-progress".into(),
        "pipe:1".into(),
        "-i".into(),
        request.video.to_string_lossy().into_owned(),
        "-vf".into(),
        request.filter.to_string(),
        "-vsync".into(),
        "0".into(),
        "-q:v".into(),
        "0".into(),
        request.output_pattern.to_string_lossy().into_owned(),
    ]
}

impl Transcode for Ffmpeg {
    fn assemble(&self, request: &AssemblyRequest<'_>, progress: &dyn Fn(f64)) -> Result<(), ToolError> {
        self.run_with_progress(&assembly_args(request), Some(request.expected_duration), progress)
    }
}

impl Inspect for Ffmpeg {
    fn inspect(&self, video: &Path) -> Result<VideoInfo, ToolError> {
        let output = ProcCommand::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=codec_type,width,height,r_frame_rate:format=duration",
                "-of",
                "json",
            ])
            .arg(video)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ToolError::Spawn {
                program: self.ffprobe.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ToolError::failed(
                &self.ffprobe,
                output.status.code(),
                &String::from_utf8_lossy(&output.stderr),
            ));
        }
        parse_ffprobe_json(&self.ffprobe, &output.stdout)
    }
}

impl DetectEdges for Ffmpeg {
    fn detect_edges(&self, video: &Path, settings: &CropDetectSettings) -> Result<Vec<String>, ToolError> {
        let filter = format!("cropdetect={}:{}:{}", settings.limit, settings.round, settings.reset);
        debug!(video = %video.display(), filter = %filter, "running cropdetect pass");
        let mut child = ProcCommand::new(&self.ffmpeg)
            .arg("-hide_banner")
            .arg("-nostats")
            .arg("-i")
            .arg(video)
            .args(["-vf", &filter, "-f", "null", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ToolError::Spawn {
                program: self.ffmpeg.clone(),
                source,
            })?;

        // cropdetect only reports through the log channel.
        let scanned = match child.stderr.take() {
            Some(stderr) => collect_crop_tokens(BufReader::new(stderr)),
            None => Ok(CropLog::default()),
        };

        let status = child.wait()?;
        let log = scanned?;
        if !status.success() {
            let tail: Vec<&str> = log.tail.iter().map(String::as_str).collect();
            return Err(ToolError::failed(&self.ffmpeg, status.code(), &tail.join("\n")));
        }
        Ok(log.tokens)
    }
}

impl ExtractFrames for Ffmpeg {
    fn extract_frames(&self, request: &ExtractionRequest<'_>, progress: &dyn Fn(f64)) -> Result<(), ToolError> {
        self.run_with_progress(&extraction_args(request), request.expected_duration, progress)
    }
}

// ---------------------------------------------------------------------------
// face-fusion CLI
// ---------------------------------------------------------------------------

/// The face-fusion job runner (`python facefusion.py ...` by default).
#[derive(Debug, Clone)]
pub struct FaceFusionCli {
    config: JobRunnerConfig,
}

impl FaceFusionCli {
    pub fn new(config: &JobRunnerConfig) -> Self {
        Self { config: config.clone() }
    }

    pub fn program(&self) -> &str {
        &self.config.program
    }

    /// Arguments for one lifecycle phase, after the runner's base args.
    pub fn phase_args(phase: JobPhase, job: &FaceSwapJob) -> Vec<String> {
        let mut args = vec![phase.subcommand().to_string(), job.name.clone()];
        if phase == JobPhase::AddStep {
            args.push("-s".into());
            args.push(job.source_image.to_string_lossy().into_owned());
            args.push("-t".into());
            args.push(job.target_video.to_string_lossy().into_owned());
            args.push("-o".into());
            args.push(job.output.to_string_lossy().into_owned());
            args.push("--processors".into());
            args.extend(job.processors.iter().cloned());
            args.push("--output-video-quality".into());
            args.push(job.output_video_quality.to_string());
        }
        args
    }

    fn invoke(&self, args: &[String]) -> Result<(), ToolError> {
        let mut cmd = ProcCommand::new(&self.config.program);
        cmd.args(&self.config.args).args(args).stdin(Stdio::null());
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        debug!(program = %self.config.program, args = ?args, "invoking job runner");

        let spawn_err = |source| ToolError::Spawn {
            program: self.config.program.clone(),
            source,
        };

        if self.config.show_output {
            let status = cmd.status().map_err(spawn_err)?;
            if !status.success() {
                return Err(ToolError::failed(&self.config.program, status.code(), ""));
            }
        } else {
            let output = cmd.output().map_err(spawn_err)?;
            if !output.status.success() {
                return Err(ToolError::failed(
                    &self.config.program,
                    output.status.code(),
                    &String::from_utf8_lossy(&output.stderr),
                ));
            }
        }
        Ok(())
    }
}

impl JobRunner for FaceFusionCli {
    fn run_phase(&self, phase: JobPhase, job: &FaceSwapJob) -> Result<(), ToolError> {
        self.invoke(&Self::phase_args(phase, job))
    }

    fn delete_all_jobs(&self) -> Result<(), ToolError> {
        self.invoke(&["job-delete-all".to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn frame_rate_parses_rationals_and_integers() {
        assert_eq!("30000/1001".parse::<FrameRate>().unwrap(), FrameRate { num: 30000, den: 1001 });
        assert_eq!("60".parse::<FrameRate>().unwrap(), FrameRate { num: 60, den: 1 });
        assert!("0/0".parse::<FrameRate>().is_err());
        assert!("29.97".parse::<FrameRate>().is_err());
        let ntsc = FrameRate { num: 30000, den: 1001 };
        assert!((ntsc.as_f64() - 29.97).abs() < 0.01);
        assert_eq!(ntsc.to_string(), "30000/1001");
    }

    #[test]
    fn crop_token_is_scraped_from_cropdetect_line() {
        let line = "[Parsed_cropdetect_0 @ 0x7f8] x1:0 x2:1919 y1:140 y2:939 w:1920 h:800 x:0 y:140 pts:1 t:0.033 crop=1920:800:0:140";
        assert_eq!(parse_crop_token(line), Some("1920:800:0:140"));
        assert_eq!(parse_crop_token("frame=  10 fps=0.0 q=-0.0 size=N/A"), None);
    }

    #[test]
    fn collect_keeps_emission_order() {
        let log = "\
Input #0, mov,mp4, from 'a.mp4':
[Parsed_cropdetect_0 @ 0x1] crop=1920:1080:0:0
[Parsed_cropdetect_0 @ 0x1] crop=1920:800:0:140
noise line
[Parsed_cropdetect_0 @ 0x1] crop=1920:800:0:140
";
        let scanned = collect_crop_tokens(Cursor::new(log)).unwrap();
        assert_eq!(scanned.tokens, vec!["1920:1080:0:0", "1920:800:0:140", "1920:800:0:140"]);
        assert_eq!(scanned.tail, vec!["Input #0, mov,mp4, from 'a.mp4':", "noise line"]);
    }

    #[test]
    fn invalid_utf8_in_the_log_does_not_hide_tokens() {
        let mut log: Vec<u8> = b"Input #0, mov,mp4, from 'caf".to_vec();
        log.extend_from_slice(b"\xe9.mp4':\r\n    title           : \xff\xfe\n");
        log.extend_from_slice(b"[Parsed_cropdetect_0 @ 0x1] crop=1920:800:0:140\n");
        log.extend_from_slice(b"[Parsed_cropdetect_0 @ 0x1] crop=1920:800:0:140");
        let scanned = collect_crop_tokens(Cursor::new(log)).unwrap();
        assert_eq!(scanned.tokens, vec!["1920:800:0:140", "1920:800:0:140"]);
        assert_eq!(scanned.tail.len(), 2);
        assert!(scanned.tail[0].ends_with(".mp4':"));
    }

    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path, script: &str) -> Ffmpeg {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("ffmpeg");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        Ffmpeg::new(&ToolPaths {
            ffmpeg: path.to_string_lossy().into_owned(),
            ffprobe: "ffprobe".into(),
        })
    }

    #[cfg(unix)]
    #[test]
    fn detect_edges_survives_latin1_file_names() {
        let tmp = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(
            tmp.path(),
            r"#!/bin/sh
printf 'Input #0, mov,mp4, from caf\351.mp4:\n    title: \377\376\n' >&2
printf '[Parsed_cropdetect_0 @ 0x1] crop=1920:800:0:140\n' >&2
printf '[Parsed_cropdetect_0 @ 0x1] crop=1920:800:0:140\n' >&2
exit 0
",
        );
        let tokens = ffmpeg
            .detect_edges(Path::new("caf.mp4"), &CropDetectSettings::default())
            .unwrap();
        assert_eq!(tokens, vec!["1920:800:0:140", "1920:800:0:140"]);
    }

    #[cfg(unix)]
    #[test]
    fn detect_edges_reports_the_log_tail_on_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(
            tmp.path(),
            r"#!/bin/sh
printf 'clip.mp4: Invalid data found when processing input\n' >&2
exit 1
",
        );
        match ffmpeg.detect_edges(Path::new("clip.mp4"), &CropDetectSettings::default()) {
            Err(ToolError::Failed { exit_code, stderr: Some(tail), .. }) => {
                assert_eq!(exit_code, Some(1));
                assert!(tail.contains("Invalid data"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn assembly_args_pin_rate_codec_and_quality() {
        let request = AssemblyRequest {
            input_pattern: Path::new("files/img%03d.jpg"),
            frame_rate: 60,
            filter: "scale=1920:1440",
            preset: "veryslow",
            crf: 0,
            pixel_format: "yuv420p",
            output: Path::new("files/source_video.mp4"),
            expected_duration: 2.0,
        };
        let args = assembly_args(&request);
        let pair = |flag: &str| {
            let i = args.iter().position(|a| a == flag).unwrap_or_else(|| panic!("missing {flag}"));
            args[i + 1].as_str()
        };
        assert_eq!(pair("-framerate"), "60");
        assert_eq!(pair("-r"), "60");
        assert_eq!(pair("-i"), "files/img%03d.jpg");
        assert_eq!(pair("-c:v"), "libx264");
        assert_eq!(pair("-pix_fmt"), "yuv420p");
        assert_eq!(pair("-preset"), "veryslow");
        assert_eq!(pair("-crf"), "0");
        assert_eq!(pair("-vf"), "scale=1920:1440");
        assert_eq!(pair("-progress"), "pipe:1");
        // Input options come before the input, the output path is last.
        assert!(args.iter().position(|a| a == "-framerate") < args.iter().position(|a| a == "-i"));
        assert_eq!(args.last().map(String::as_str), Some("files/source_video.mp4"));
    }

    #[test]
    fn extraction_args_keep_every_frame_at_best_quality() {
        let request = ExtractionRequest {
            video: Path::new("folder/output_1_a.mp4"),
            filter: "fps=30/1,crop=1920:800:0:140",
            output_pattern: Path::new("folder/extracted_frames/frame_000001_%03d.jpg"),
            expected_duration: Some(4.0),
        };
        let args = extraction_args(&request);
        let pair = |flag: &str| {
            let i = args.iter().position(|a| a == flag).unwrap_or_else(|| panic!("missing {flag}"));
            args[i + 1].as_str()
        };
        assert_eq!(pair("-i"), "folder/output_1_a.mp4");
        assert_eq!(pair("-vf"), "fps=30/1,crop=1920:800:0:140");
        assert_eq!(pair("-vsync"), "0");
        assert_eq!(pair("-q:v"), "0");
        assert_eq!(
            args.last().map(String::as_str),
            Some("folder/extracted_frames/frame_000001_%03d.jpg")
        );
    }

    #[test]
    fn progress_parser_tracks_out_time() {
        let mut parser = ProgressParser::new(Some(10.0));
        assert_eq!(parser.feed("frame=12"), None);
        assert_eq!(parser.feed("out_time_us=5000000"), Some(50.0));
        // Going backwards is ignored.
        assert_eq!(parser.feed("out_time_ms=4000000"), None);
        assert_eq!(parser.feed("progress=continue"), None);
        assert_eq!(parser.feed("progress=end"), Some(100.0));
        assert_eq!(parser.percent(), 100.0);
    }

    #[test]
    fn progress_parser_without_duration_only_reports_end() {
        let mut parser = ProgressParser::new(None);
        assert_eq!(parser.feed("out_time_us=5000000"), None);
        assert_eq!(parser.feed("progress=end"), Some(100.0));
    }

    #[test]
    fn ffprobe_json_is_parsed() {
        let json = br#"{
            "programs": [],
            "streams": [{"codec_type": "video", "width": 1920, "height": 1080, "r_frame_rate": "60/1"}],
            "format": {"duration": "4.250000"}
        }"#;
        let info = parse_ffprobe_json("ffprobe", json).unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));
        assert_eq!(info.frame_rate, FrameRate { num: 60, den: 1 });
        assert_eq!(info.duration, Some(4.25));
    }

    #[test]
    fn ffprobe_without_dimensions_is_an_error() {
        let json = br#"{"streams": [{"codec_type": "video", "r_frame_rate": "25/1"}]}"#;
        assert!(matches!(parse_ffprobe_json("ffprobe", json), Err(ToolError::Parse { .. })));
    }

    #[test]
    fn add_step_arguments_carry_the_processor_chain() {
        let job = FaceSwapJob {
            index: 2,
            name: "BatchSwapJob_2".into(),
            source_image: PathBuf::from("main/b.jpg"),
            target_video: PathBuf::from("files/source_video.mp4"),
            output: PathBuf::from("folder/output_2_b.mp4"),
            processors: vec!["face_swapper".into(), "face_enhancer".into()],
            output_video_quality: 90,
        };
        let args = FaceFusionCli::phase_args(JobPhase::AddStep, &job);
        assert_eq!(
            args,
            vec![
                "job-add-step", "BatchSwapJob_2", "-s", "main/b.jpg", "-t", "files/source_video.mp4", "-o",
                "folder/output_2_b.mp4", "--processors", "face_swapper", "face_enhancer", "--output-video-quality", "90",
            ]
        );
        assert_eq!(FaceFusionCli::phase_args(JobPhase::Run, &job), vec!["job-run", "BatchSwapJob_2"]);
    }
}
