use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::error::{JobPhase, PipelineError, PipelineResult};
use crate::pipeline::BatchReport;
use crate::sequence::list_images;
use crate::tools::JobRunner;

/// Processor chain applied by every face-swap job.
pub const PROCESSORS: [&str; 2] = ["face_swapper", "face_enhancer"];

/// One face-swap job: a main image swapped onto the source video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceSwapJob {
    /// 1-based position of the main image.
    pub index: usize,
    pub name: String,
    pub source_image: PathBuf,
    pub target_video: PathBuf,
    pub output: PathBuf,
    pub processors: Vec<String>,
    pub output_video_quality: u8,
}

impl FaceSwapJob {
    pub fn new(index: usize, main_image: &Path, target_video: &Path, output_dir: &Path, output_video_quality: u8) -> Self {
        let stem = main_image.file_stem().and_then(|s| s.to_str()).unwrap_or("main");
        Self {
            index,
            name: job_name(index),
            source_image: main_image.to_path_buf(),
            target_video: target_video.to_path_buf(),
            output: output_dir.join(format!("output_{index}_{stem}.mp4")),
            processors: PROCESSORS.iter().map(|p| p.to_string()).collect(),
            output_video_quality,
        }
    }
}

pub fn job_name(index: usize) -> String {
    format!("BatchSwapJob_{index}")
}

/// Drive one job through create, add-step, submit and run.
///
/// Stops at the first failing phase. Nothing is retried or rolled back.
pub fn run_job<R: JobRunner + ?Sized>(runner: &R, job: &FaceSwapJob) -> PipelineResult<PathBuf> {
    for phase in JobPhase::ALL {
        info!(job = %job.name, %phase, "job phase");
        runner.run_phase(phase, job).map_err(|source| PipelineError::JobPhase {
            phase,
            index: job.index,
            source,
        })?;
    }
    Ok(job.output.clone())
}

/// Run one job per main image, in the given order.
///
/// Failures are recorded per image and never stop the batch.
pub fn dispatch_jobs<R: JobRunner + ?Sized>(
    runner: &R,
    main_images: &[PathBuf],
    target_video: &Path,
    output_dir: &Path,
    output_video_quality: u8,
    progress: &dyn Fn(usize, usize),
) -> BatchReport<PathBuf> {
    let total = main_images.len();
    let mut report = BatchReport::new();
    progress(0, total);

    for (i, main_image) in main_images.iter().enumerate() {
        let index = i + 1;
        let label = main_image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| main_image.display().to_string());
        info!(index, total, image = %label, "processing main image");

        let job = FaceSwapJob::new(index, main_image, target_video, output_dir, output_video_quality);
        let result = run_job(runner, &job);
        match &result {
            Ok(output) => info!(index, output = %output.display(), "face swap complete"),
            Err(e) => error!(index, image = %label, error = %e, "face swap failed, moving on"),
        }
        report.push(label, result);
        progress(index, total);
    }
    report
}

/// List the main images in `main_dir` and dispatch a job for each.
pub fn dispatch_from_dir<R: JobRunner + ?Sized>(
    runner: &R,
    main_dir: &Path,
    target_video: &Path,
    output_dir: &Path,
    output_video_quality: u8,
    progress: &dyn Fn(usize, usize),
) -> PipelineResult<BatchReport<PathBuf>> {
    let main_images = list_images(main_dir);
    if main_images.is_empty() {
        return Err(PipelineError::EmptyInput { dir: main_dir.to_path_buf() });
    }
    info!(count = main_images.len(), "found main images");
    Ok(dispatch_jobs(runner, &main_images, target_video, output_dir, output_video_quality, progress))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<(JobPhase, String)>>,
        fail: Option<(usize, JobPhase)>,
    }

    impl JobRunner for Recorder {
        fn run_phase(&self, phase: JobPhase, job: &FaceSwapJob) -> Result<(), ToolError> {
            self.calls.borrow_mut().push((phase, job.name.clone()));
            if self.fail == Some((job.index, phase)) {
                return Err(ToolError::failed("python", Some(1), "boom"));
            }
            Ok(())
        }

        fn delete_all_jobs(&self) -> Result<(), ToolError> {
            Ok(())
        }
    }

    #[test]
    fn job_naming_is_index_scoped() {
        let job = FaceSwapJob::new(3, Path::new("main/Carol.png"), Path::new("files/source_video.mp4"), Path::new("folder"), 90);
        assert_eq!(job.name, "BatchSwapJob_3");
        assert_eq!(job.output, PathBuf::from("folder/output_3_Carol.mp4"));
        assert_eq!(job.processors, vec!["face_swapper", "face_enhancer"]);
    }

    #[test]
    fn phases_run_in_lifecycle_order() {
        let runner = Recorder::default();
        let job = FaceSwapJob::new(1, Path::new("a.jpg"), Path::new("v.mp4"), Path::new("out"), 90);
        run_job(&runner, &job).unwrap();
        let phases: Vec<JobPhase> = runner.calls.borrow().iter().map(|(p, _)| *p).collect();
        assert_eq!(phases, JobPhase::ALL.to_vec());
    }

    #[test]
    fn failing_phase_stops_that_job_only() {
        let runner = Recorder {
            fail: Some((2, JobPhase::AddStep)),
            ..Default::default()
        };
        let images: Vec<PathBuf> = ["a.jpg", "b.jpg", "c.jpg"].iter().map(PathBuf::from).collect();
        let report = dispatch_jobs(&runner, &images, Path::new("v.mp4"), Path::new("out"), 90, &|_, _| {});

        assert_eq!(report.success_count(), 2);
        assert_eq!(report.failure_count(), 1);
        let calls = runner.calls.borrow();
        // Job 2 stops after add-step: 4 + 2 + 4 calls.
        assert_eq!(calls.len(), 10);
        assert!(!calls.contains(&(JobPhase::Submit, "BatchSwapJob_2".to_string())));
        match &report.items[1].result {
            Err(PipelineError::JobPhase { phase, index, .. }) => {
                assert_eq!(*phase, JobPhase::AddStep);
                assert_eq!(*index, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
