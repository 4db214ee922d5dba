//! Parsing the engine's `-progress2` output stream.
//!
//! melt reports progress as one line per rendered chunk on stderr:
//!
//! ```text
//! Current Frame:        123, percentage:         41
//! ```
//!
//! The parser is a lazy line-by-line transform: each line yields zero or one
//! progress event. Out-of-order or duplicate frame counts are dropped so the
//! emitted sequence is always non-decreasing.

use std::time::Instant;

use serde::Serialize;

/// Progress of one render job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RenderProgress {
    /// Frames rendered so far.
    pub frames_rendered: u64,

    /// Total frames expected (estimated from timeline duration x fps).
    pub total_frames: u64,

    /// Completion percentage in `[0.0, 100.0]`.
    pub percentage: f64,

    /// Estimated seconds remaining, once there is enough data to guess.
    pub eta_secs: Option<f64>,
}

impl RenderProgress {
    /// Zero progress at the start of a job.
    pub fn starting(total_frames: u64) -> Self {
        Self {
            frames_rendered: 0,
            total_frames,
            percentage: 0.0,
            eta_secs: None,
        }
    }

    /// The final 100% update for a successful job.
    pub fn completed(total_frames: u64) -> Self {
        Self {
            frames_rendered: total_frames,
            total_frames,
            percentage: 100.0,
            eta_secs: Some(0.0),
        }
    }
}

/// Stateful line parser for one job's progress stream.
pub struct ProgressParser {
    total_frames: u64,
    last_frames: u64,
    started: Instant,
}

impl ProgressParser {
    pub fn new(total_frames: u64) -> Self {
        Self {
            total_frames,
            last_frames: 0,
            started: Instant::now(),
        }
    }

    /// Parse one stream line. Non-progress lines and regressing frame
    /// counts yield `None`.
    pub fn parse_line(&mut self, line: &str) -> Option<RenderProgress> {
        let frames = parse_current_frame(line)?;
        if frames < self.last_frames {
            return None;
        }
        self.last_frames = frames;

        let frames = frames.min(self.total_frames);
        let percentage = if self.total_frames == 0 {
            0.0
        } else {
            frames as f64 / self.total_frames as f64 * 100.0
        };

        let eta_secs = if frames > 0 && frames < self.total_frames {
            let elapsed = self.started.elapsed().as_secs_f64();
            let rate = frames as f64 / elapsed.max(1e-3);
            Some((self.total_frames - frames) as f64 / rate)
        } else if frames >= self.total_frames {
            Some(0.0)
        } else {
            None
        };

        Some(RenderProgress {
            frames_rendered: frames,
            total_frames: self.total_frames,
            percentage,
            eta_secs,
        })
    }
}

/// Extract the frame count from a `Current Frame: N, percentage: P` line.
fn parse_current_frame(line: &str) -> Option<u64> {
    let rest = line.trim().strip_prefix("Current Frame:")?;
    let frame_part = match rest.split_once(',') {
        Some((frames, _)) => frames,
        None => rest,
    };
    frame_part.trim().parse().ok()
}
