//! Output profiles: resolution, frame rate, and aspect description.

use serde::{Deserialize, Serialize};

/// A rational frame rate (e.g. 30000/1001 for NTSC, 30/1 for exact 30fps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Frames per second as a float.
    pub fn fps(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Convert a duration in seconds to a whole frame count.
    ///
    /// All seconds-to-frames conversions in the pipeline go through this
    /// single rounding rule so frame arithmetic stays consistent.
    pub fn frames_for(&self, secs: f64) -> u64 {
        (secs * self.fps()).round().max(0.0) as u64
    }
}

/// Resolution, frame rate, and sample aspect applied to a render.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Output width in pixels.
    pub width: u32,

    /// Output height in pixels.
    pub height: u32,

    /// Output frame rate.
    pub frame_rate: FrameRate,

    /// Sample (pixel) aspect ratio numerator/denominator.
    pub sample_aspect_num: u32,
    pub sample_aspect_den: u32,

    /// Progressive scan (as opposed to interlaced).
    pub progressive: bool,
}

impl Profile {
    /// Full-quality 1080p export profile.
    pub const fn full_hd() -> Self {
        Self {
            width: 1920,
            height: 1080,
            frame_rate: FrameRate::new(30, 1),
            sample_aspect_num: 1,
            sample_aspect_den: 1,
            progressive: true,
        }
    }

    /// Quarter-resolution profile for fast preview renders.
    pub const fn preview() -> Self {
        Self {
            width: 960,
            height: 540,
            frame_rate: FrameRate::new(30, 1),
            sample_aspect_num: 1,
            sample_aspect_den: 1,
            progressive: true,
        }
    }

    /// Frames per second as a float.
    pub fn fps(&self) -> f64 {
        self.frame_rate.fps()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rational_fps() {
        let ntsc = FrameRate::new(30000, 1001);
        assert!((ntsc.fps() - 29.97).abs() < 0.01);
        assert!((FrameRate::new(30, 1).fps() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_frames_for_rounds() {
        let fr = FrameRate::new(30, 1);
        assert_eq!(fr.frames_for(10.0), 300);
        assert_eq!(fr.frames_for(0.9999), 30);
        assert_eq!(fr.frames_for(0.0166), 0);
        assert_eq!(fr.frames_for(-1.0), 0);
    }

    #[test]
    fn test_canonical_profiles() {
        let full = Profile::full_hd();
        assert_eq!((full.width, full.height), (1920, 1080));

        let preview = Profile::preview();
        assert!(preview.width < full.width);
        assert_eq!(preview.frame_rate, full.frame_rate);
    }
}
