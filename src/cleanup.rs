use std::path::Path;

use tracing::{info, warn};

use crate::assemble::remove_if_present;
use crate::error::CleanupWarning;
use crate::extract::list_videos;
use crate::tools::JobRunner;

/// What a cleanup pass removed. Problems are collected, never raised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub source_removed: bool,
    pub videos_removed: usize,
    pub jobs_deleted: bool,
    pub warnings: Vec<CleanupWarning>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Delete the assembled source video, the face-swapped videos in
/// `output_dir` and every job the runner still holds.
///
/// Safe to run repeatedly: targets that are already gone are skipped.
pub fn cleanup<R: JobRunner + ?Sized>(runner: &R, source_video: &Path, output_dir: &Path) -> CleanupReport {
    let mut report = CleanupReport::default();

    match remove_if_present(source_video) {
        Ok(removed) => report.source_removed = removed,
        Err(e) => report.warnings.push(CleanupWarning {
            target: source_video.display().to_string(),
            message: e.to_string(),
        }),
    }

    for video in list_videos(output_dir) {
        match remove_if_present(&video) {
            Ok(true) => report.videos_removed += 1,
            Ok(false) => {}
            Err(e) => report.warnings.push(CleanupWarning {
                target: video.display().to_string(),
                message: e.to_string(),
            }),
        }
    }

    match runner.delete_all_jobs() {
        Ok(()) => report.jobs_deleted = true,
        Err(e) => report.warnings.push(CleanupWarning {
            target: "face-fusion jobs".to_string(),
            message: e.to_string(),
        }),
    }

    for warning in &report.warnings {
        warn!("{warning}");
    }
    info!(
        source_removed = report.source_removed,
        videos_removed = report.videos_removed,
        jobs_deleted = report.jobs_deleted,
        "cleanup finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{JobPhase, ToolError};
    use crate::jobs::FaceSwapJob;
    use std::fs;

    struct Runner {
        fail_delete: bool,
    }

    impl JobRunner for Runner {
        fn run_phase(&self, _phase: JobPhase, _job: &FaceSwapJob) -> Result<(), ToolError> {
            Ok(())
        }

        fn delete_all_jobs(&self) -> Result<(), ToolError> {
            if self.fail_delete {
                Err(ToolError::failed("python", Some(1), "no jobs"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn removes_videos_but_keeps_frames() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source_video.mp4");
        let out = tmp.path().join("folder");
        let frames = out.join("extracted_frames");
        fs::create_dir_all(&frames).unwrap();
        fs::write(&source, b"v").unwrap();
        fs::write(out.join("output_1_a.mp4"), b"v").unwrap();
        fs::write(out.join("output_2_b.mp4"), b"v").unwrap();
        fs::write(frames.join("frame_000001_001.jpg"), b"f").unwrap();

        let report = cleanup(&Runner { fail_delete: false }, &source, &out);
        assert!(report.source_removed);
        assert_eq!(report.videos_removed, 2);
        assert!(report.jobs_deleted);
        assert!(report.is_clean());
        assert!(frames.join("frame_000001_001.jpg").exists());
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source_video.mp4");
        fs::write(&source, b"v").unwrap();
        let runner = Runner { fail_delete: false };

        cleanup(&runner, &source, tmp.path());
        let again = cleanup(&runner, &source, tmp.path());
        assert!(!again.source_removed);
        assert_eq!(again.videos_removed, 0);
        assert!(again.is_clean());
    }

    #[test]
    fn missing_paths_and_job_errors_are_warnings() {
        let tmp = tempfile::tempdir().unwrap();
        let report = cleanup(
            &Runner { fail_delete: true },
            &tmp.path().join("gone.mp4"),
            &tmp.path().join("no-such-dir"),
        );
        assert!(!report.jobs_deleted);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].target, "face-fusion jobs");
    }
}
