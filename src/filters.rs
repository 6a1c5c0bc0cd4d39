use std::fmt;

use tracing::warn;

use crate::crop::CropRect;
use crate::tools::FrameRate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionProfile {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
}

pub const RESOLUTION_PROFILES: &[ResolutionProfile] = &[
    ResolutionProfile { name: "720p", width: 1280, height: 720 },
    ResolutionProfile { name: "1080p", width: 1920, height: 1080 },
    ResolutionProfile { name: "1440p", width: 1920, height: 1440 },
    ResolutionProfile { name: "2160p", width: 3840, height: 2160 },
];

/// Profile used when the configured name is not in the table.
pub const DEFAULT_RESOLUTION: ResolutionProfile = ResolutionProfile { name: "1080p", width: 1920, height: 1080 };

pub fn find_resolution_profile(name: &str) -> Option<&'static ResolutionProfile> {
    RESOLUTION_PROFILES.iter().find(|profile| profile.name.eq_ignore_ascii_case(name.trim()))
}

/// Look up a profile by name, falling back to [`DEFAULT_RESOLUTION`].
pub fn resolve_resolution(name: &str) -> ResolutionProfile {
    match find_resolution_profile(name) {
        Some(profile) => *profile,
        None => {
            let available = RESOLUTION_PROFILES.iter().map(|p| p.name).collect::<Vec<_>>().join(", ");
            warn!(requested = name, fallback = DEFAULT_RESOLUTION.name, "unknown resolution preset (available: {available})");
            DEFAULT_RESOLUTION
        }
    }
}

/// Geometric transform applied while assembling the source video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingPolicy {
    /// Scale down to fit, then pad to the exact target size.
    FitWithPadding,
    /// Scale up to cover, then crop to the exact target size.
    FillWithCrop,
    /// Scale to the target size ignoring aspect ratio.
    Stretch,
    /// Scale down to fit; output may be smaller than the target.
    FitWithoutPadding,
}

impl ScalingPolicy {
    /// Map a configured scale mode and padding flag to a policy.
    ///
    /// Unknown modes behave like `fit` without padding.
    pub fn from_mode(mode: &str, use_padding: bool) -> Self {
        match mode.trim().to_ascii_lowercase().as_str() {
            "fit" if use_padding => ScalingPolicy::FitWithPadding,
            "fill" => ScalingPolicy::FillWithCrop,
            "stretch" => ScalingPolicy::Stretch,
            _ => ScalingPolicy::FitWithoutPadding,
        }
    }
}

impl fmt::Display for ScalingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalingPolicy::FitWithPadding => "fit-with-padding",
            ScalingPolicy::FillWithCrop => "fill-with-crop",
            ScalingPolicy::Stretch => "stretch",
            ScalingPolicy::FitWithoutPadding => "fit-without-padding",
        };
        f.write_str(name)
    }
}

/// Filter graph for turning the image sequence into the source video.
pub fn build_assembly_vf(profile: &ResolutionProfile, policy: ScalingPolicy, algorithm: &str) -> String {
    let (w, h) = (profile.width, profile.height);
    let flags = algorithm.trim();
    match policy {
        ScalingPolicy::FitWithPadding => format!(
            "scale=w={w}:h={h}:flags={flags}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2"
        ),
        ScalingPolicy::FillWithCrop => {
            format!("scale={w}:{h}:flags={flags}:force_original_aspect_ratio=increase,crop={w}:{h}")
        }
        ScalingPolicy::Stretch => format!("scale={w}:{h}:flags={flags}"),
        ScalingPolicy::FitWithoutPadding => {
            format!("scale={w}:{h}:flags={flags}:force_original_aspect_ratio=decrease")
        }
    }
}

/// Filter graph for dumping frames: native rate first, then the optional crop.
pub(crate) fn build_frame_extraction_vf(rate: FrameRate, crop: Option<&CropRect>) -> String {
    let base = format!("fps={rate}");
    match crop {
        Some(rect) => format!("{base},crop={rect}"),
        None => base,
    }
}
