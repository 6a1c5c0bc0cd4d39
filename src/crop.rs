//! Black-bar detection and crop consensus.
//!
//! The edge-detection pass emits one `W:H:X:Y` proposal per sampled frame.
//! Proposals are tallied by exact string, the most frequent one wins (ties go
//! to the proposal seen first in the scan), and the winner is applied only if
//! it trims more than the materiality threshold off the width or the height.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, info};

use crate::config::CropDetectSettings;
use crate::error::ToolError;
use crate::tools::{DetectEdges, Inspect, VideoInfo};

/// A crop rectangle in ffmpeg's `crop=w:h:x:y` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CropRect {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

impl CropRect {
    /// True if the rectangle lies entirely inside a `width`×`height` frame.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && u64::from(self.x) + u64::from(self.width) <= u64::from(width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(height)
    }
}

impl fmt::Display for CropRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.width, self.height, self.x, self.y)
    }
}

impl FromStr for CropRect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 4 {
            return Err(format!("expected W:H:X:Y, got '{s}'"));
        }
        let mut nums = [0u32; 4];
        for (slot, part) in nums.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| format!("non-numeric component in '{s}'"))?;
        }
        Ok(CropRect {
            width: nums[0],
            height: nums[1],
            x: nums[2],
            y: nums[3],
        })
    }
}

/// One bucket of identical proposals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    pub token: String,
    pub count: usize,
}

/// Count proposals by exact string. Buckets are in first-seen order.
pub fn tally_proposals<S: AsRef<str>>(tokens: &[S]) -> Vec<Tally> {
    let mut tallies: Vec<Tally> = Vec::new();
    for token in tokens {
        let token = token.as_ref();
        match tallies.iter_mut().find(|t| t.token == token) {
            Some(t) => t.count += 1,
            None => tallies.push(Tally {
                token: token.to_string(),
                count: 1,
            }),
        }
    }
    tallies
}

/// Most frequent proposal. On equal counts the one seen first wins.
pub fn consensus<S: AsRef<str>>(tokens: &[S]) -> Option<Tally> {
    let mut best: Option<Tally> = None;
    for tally in tally_proposals(tokens) {
        // Strictly greater keeps the earlier bucket on ties.
        if best.as_ref().map_or(true, |b| tally.count > b.count) {
            best = Some(tally);
        }
    }
    best
}

/// Fraction of the source width and height a crop removes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reduction {
    pub width: f64,
    pub height: f64,
}

impl Reduction {
    pub fn between(source_width: u32, source_height: u32, crop: &CropRect) -> Self {
        Self {
            width: (source_width as f64 - crop.width as f64) / source_width as f64,
            height: (source_height as f64 - crop.height as f64) / source_height as f64,
        }
    }

    pub fn is_material(&self, threshold: f64) -> bool {
        self.width > threshold || self.height > threshold
    }
}

/// What the analyzer decided for one video.
#[derive(Debug, Clone, PartialEq)]
pub enum CropDecision {
    /// The detection pass emitted nothing.
    NoProposals,
    /// The consensus trims too little to be worth applying.
    BelowThreshold { proposal: CropRect, reduction: Reduction },
    /// The consensus cannot be applied to this frame size.
    Rejected { token: String, reason: String },
    Apply { crop: CropRect, reduction: Reduction },
}

impl CropDecision {
    pub fn crop(&self) -> Option<&CropRect> {
        match self {
            CropDecision::Apply { crop, .. } => Some(crop),
            _ => None,
        }
    }
}

impl fmt::Display for CropDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CropDecision::NoProposals => write!(f, "no crop proposals, keeping original dimensions"),
            CropDecision::BelowThreshold { proposal, reduction } => write!(
                f,
                "minimal black bars ({proposal}: {:.1}% width, {:.1}% height), keeping original dimensions",
                reduction.width * 100.0,
                reduction.height * 100.0
            ),
            CropDecision::Rejected { token, reason } => write!(f, "ignoring crop {token}: {reason}"),
            CropDecision::Apply { crop, reduction } => write!(
                f,
                "crop {crop} (removes {:.1}% width, {:.1}% height)",
                reduction.width * 100.0,
                reduction.height * 100.0
            ),
        }
    }
}

/// Pick the consensus proposal and run it through the materiality gate.
pub fn decide_crop<S: AsRef<str>>(tokens: &[S], source_width: u32, source_height: u32, threshold: f64) -> CropDecision {
    let Some(winner) = consensus(tokens) else {
        return CropDecision::NoProposals;
    };
    debug!(token = %winner.token, votes = winner.count, samples = tokens.len(), "crop consensus");

    let rect = match winner.token.parse::<CropRect>() {
        Ok(rect) => rect,
        Err(reason) => return CropDecision::Rejected { token: winner.token, reason },
    };
    if source_width == 0 || source_height == 0 {
        return CropDecision::Rejected {
            token: winner.token,
            reason: "source has no dimensions".to_string(),
        };
    }
    // A crop may only take area away, never reach past the frame.
    if !rect.fits_within(source_width, source_height) {
        return CropDecision::Rejected {
            token: winner.token,
            reason: format!("does not fit inside {source_width}x{source_height}"),
        };
    }

    let reduction = Reduction::between(source_width, source_height, &rect);
    if reduction.is_material(threshold) {
        CropDecision::Apply { crop: rect, reduction }
    } else {
        CropDecision::BelowThreshold {
            proposal: rect,
            reduction,
        }
    }
}

/// Result of analyzing one video.
#[derive(Debug, Clone, PartialEq)]
pub struct CropAnalysis {
    pub info: VideoInfo,
    /// Number of proposals the detection pass emitted.
    pub samples: usize,
    pub decision: CropDecision,
}

/// Probe `video`, run the detection pass over it and decide on a crop.
pub fn analyze_video<T: Inspect + DetectEdges + ?Sized>(
    tools: &T,
    video: &Path,
    settings: &CropDetectSettings,
) -> Result<CropAnalysis, ToolError> {
    let info = tools.inspect(video)?;
    info!(
        video = %video.display(),
        width = info.width,
        height = info.height,
        fps = %info.frame_rate,
        "video details"
    );

    let tokens = tools.detect_edges(video, settings)?;
    let decision = decide_crop(&tokens, info.width, info.height, settings.threshold);
    info!(video = %video.display(), samples = tokens.len(), "{decision}");

    Ok(CropAnalysis {
        info,
        samples: tokens.len(),
        decision,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repeat(token: &str, n: usize) -> Vec<String> {
        vec![token.to_string(); n]
    }

    #[test]
    fn majority_letterbox_is_applied() {
        let mut tokens = repeat("1920:800:0:140", 5);
        tokens.extend(repeat("1920:1080:0:0", 2));
        let decision = decide_crop(&tokens, 1920, 1080, 0.05);
        match decision {
            CropDecision::Apply { crop, reduction } => {
                assert_eq!(crop, CropRect { width: 1920, height: 800, x: 0, y: 140 });
                assert!((reduction.height - 0.259).abs() < 0.001);
                assert_eq!(reduction.width, 0.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn minor_trim_stays_below_threshold() {
        let decision = decide_crop(&["1900:1070:10:5"], 1920, 1080, 0.05);
        assert!(matches!(decision, CropDecision::BelowThreshold { .. }));
        assert!(decision.crop().is_none());
    }

    #[test]
    fn no_proposals_means_no_crop() {
        let empty: Vec<String> = Vec::new();
        assert_eq!(decide_crop(&empty, 1920, 1080, 0.05), CropDecision::NoProposals);
    }

    #[test]
    fn ties_go_to_the_first_seen_proposal() {
        let tokens = [
            "1440:1080:240:0",
            "1920:800:0:140",
            "1920:800:0:140",
            "1440:1080:240:0",
        ];
        assert_eq!(consensus(&tokens).unwrap().token, "1440:1080:240:0");

        let reordered = [
            "1920:800:0:140",
            "1440:1080:240:0",
            "1440:1080:240:0",
            "1920:800:0:140",
        ];
        assert_eq!(consensus(&reordered).unwrap().token, "1920:800:0:140");
    }

    #[test]
    fn one_pixel_difference_is_a_separate_bucket() {
        let tokens = ["1920:800:0:140", "1920:802:0:139", "1920:802:0:139"];
        let tallies = tally_proposals(&tokens);
        assert_eq!(tallies.len(), 2);
        assert_eq!(consensus(&tokens).unwrap(), Tally { token: "1920:802:0:139".into(), count: 2 });
    }

    #[test]
    fn threshold_is_exclusive() {
        // Exactly 5% off the height is not enough.
        let decision = decide_crop(&["1920:1026:0:27"], 1920, 1080, 0.05);
        assert!(matches!(decision, CropDecision::BelowThreshold { .. }));
        let decision = decide_crop(&["1920:1024:0:28"], 1920, 1080, 0.05);
        assert!(matches!(decision, CropDecision::Apply { .. }));
    }

    #[test]
    fn pillarbox_is_detected_on_width() {
        let decision = decide_crop(&["1440:1080:240:0"], 1920, 1080, 0.05);
        let crop = decision.crop().copied().unwrap();
        assert_eq!(crop.to_string(), "1440:1080:240:0");
    }

    #[test]
    fn proposal_larger_than_source_is_rejected() {
        let decision = decide_crop(&["1920:900:0:200"], 1920, 1080, 0.05);
        assert!(matches!(decision, CropDecision::Rejected { .. }));
        let decision = decide_crop(&["2000:800:0:0"], 1920, 1080, 0.05);
        assert!(matches!(decision, CropDecision::Rejected { .. }));
    }

    #[test]
    fn malformed_token_is_rejected() {
        let decision = decide_crop(&["1920:800:0"], 1920, 1080, 0.05);
        assert!(matches!(decision, CropDecision::Rejected { .. }));
    }

    #[test]
    fn crop_rect_round_trips_through_display() {
        let rect: CropRect = "1280:536:0:92".parse().unwrap();
        assert_eq!(rect, CropRect { width: 1280, height: 536, x: 0, y: 92 });
        assert_eq!(rect.to_string(), "1280:536:0:92");
        assert!("a:b:c:d".parse::<CropRect>().is_err());
    }
}
