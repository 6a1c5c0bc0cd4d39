//! Error types for the pipeline stages and the external tools they drive.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Number of trailing stderr lines kept on a failed tool run.
const STDERR_TAIL_LINES: usize = 12;

/// Failure of an external process (transcoder, prober or job runner).
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("`{program}` not found in PATH")]
    NotFound { program: String },

    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {}", exit_label(.exit_code))]
    Failed {
        program: String,
        exit_code: Option<i32>,
        stderr: Option<String>,
    },

    #[error("could not parse output of `{program}`: {message}")]
    Parse { program: String, message: String },

    #[error("IO error while talking to a tool: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_string(),
    }
}

impl ToolError {
    /// Build a `Failed` error, keeping only the tail of stderr.
    pub fn failed(program: impl Into<String>, exit_code: Option<i32>, stderr: &str) -> Self {
        let lines: Vec<&str> = stderr.lines().collect();
        let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
        let tail = lines[start..].join("\n");
        Self::Failed {
            program: program.into(),
            exit_code,
            stderr: if tail.trim().is_empty() { None } else { Some(tail) },
        }
    }

    pub fn parse(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            program: program.into(),
            message: message.into(),
        }
    }
}

/// The four face-fusion job lifecycle phases that run per main image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobPhase {
    Create,
    AddStep,
    Submit,
    Run,
}

impl JobPhase {
    /// All phases in lifecycle order.
    pub const ALL: [JobPhase; 4] = [JobPhase::Create, JobPhase::AddStep, JobPhase::Submit, JobPhase::Run];

    /// Subcommand name understood by the job runner.
    pub fn subcommand(self) -> &'static str {
        match self {
            JobPhase::Create => "job-create",
            JobPhase::AddStep => "job-add-step",
            JobPhase::Submit => "job-submit",
            JobPhase::Run => "job-run",
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobPhase::Create => "create",
            JobPhase::AddStep => "add-step",
            JobPhase::Submit => "submit",
            JobPhase::Run => "run",
        };
        f.write_str(name)
    }
}

/// Errors raised by the pipeline stages.
///
/// `EmptyInput` and `Assembly` abort a run. `JobPhase` and `Extraction`
/// are per-item and end up in a [`crate::BatchReport`] instead of being
/// propagated.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("nothing to process in {}", .dir.display())]
    EmptyInput { dir: PathBuf },

    #[error("video assembly failed: {message}")]
    Assembly {
        message: String,
        #[source]
        source: Option<ToolError>,
    },

    #[error("job phase `{phase}` failed for main image {index}: {source}")]
    JobPhase {
        phase: JobPhase,
        index: usize,
        #[source]
        source: ToolError,
    },

    #[error("frame extraction failed for {}: {message}", .video.display())]
    Extraction {
        video: PathBuf,
        message: String,
        #[source]
        source: Option<ToolError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Tool(#[from] ToolError),
}

impl PipelineError {
    pub fn assembly(message: impl Into<String>, source: Option<ToolError>) -> Self {
        Self::Assembly {
            message: message.into(),
            source,
        }
    }

    pub fn extraction(video: impl Into<PathBuf>, message: impl Into<String>, source: Option<ToolError>) -> Self {
        Self::Extraction {
            video: video.into(),
            message: message.into(),
            source,
        }
    }

    /// True for the errors that abort a whole run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PipelineError::JobPhase { .. } | PipelineError::Extraction { .. })
    }
}

/// Non-fatal problem met during cleanup. Logged and reported, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupWarning {
    pub target: String,
    pub message: String,
}

impl fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not clean up {}: {}", self.target, self.message)
    }
}
