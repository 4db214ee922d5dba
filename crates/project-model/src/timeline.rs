//! Editing timeline: ordered tracks of trimmed clips with transitions.
//!
//! The timeline is the editor's in-memory project structure, independent of
//! any render-engine format. The render pipeline takes it as read-only
//! input; range renders work on an owned, re-trimmed copy.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::geometry::{NormalizedRect, PanZoom};

/// Tolerance for seconds comparisons throughout the model.
pub const TIME_EPSILON: f64 = 1e-6;

/// Kind of source asset a clip references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Video,
    Image,
    Audio,
}

/// Per-clip transform expressed in editor percentages.
///
/// `scale_pct` of 100 with zero offsets is the identity; the render pipeline
/// converts these into normalized rectangles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipTransform {
    /// Window size as a percentage of the frame (100 = full frame).
    #[serde(default = "default_scale")]
    pub scale_pct: f64,

    /// Horizontal offset of the window center, percent of frame width.
    #[serde(default)]
    pub offset_x_pct: f64,

    /// Vertical offset of the window center, percent of frame height.
    #[serde(default)]
    pub offset_y_pct: f64,

    /// Optional animated pan/zoom preset. Overrides the static window.
    #[serde(default)]
    pub pan_zoom: Option<PanZoom>,
}

fn default_scale() -> f64 {
    100.0
}

impl Default for ClipTransform {
    fn default() -> Self {
        Self {
            scale_pct: 100.0,
            offset_x_pct: 0.0,
            offset_y_pct: 0.0,
            pan_zoom: None,
        }
    }
}

impl ClipTransform {
    /// Whether this transform leaves the frame untouched.
    pub fn is_identity(&self) -> bool {
        self.pan_zoom.is_none()
            && (self.scale_pct - 100.0).abs() < TIME_EPSILON
            && self.offset_x_pct.abs() < TIME_EPSILON
            && self.offset_y_pct.abs() < TIME_EPSILON
    }

    /// The static window this transform describes, as a normalized rect.
    pub fn to_rect(&self) -> NormalizedRect {
        let size = (self.scale_pct / 100.0).clamp(0.01, 1.0);
        NormalizedRect::centered(
            0.5 + self.offset_x_pct / 100.0,
            0.5 + self.offset_y_pct / 100.0,
            size,
            size,
        )
    }
}

/// One trimmed reference to a source asset, placed on a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    /// Resolved path to the source media file.
    pub asset_path: PathBuf,

    /// What kind of media the path points at.
    pub asset_kind: AssetKind,

    /// In-point within the source, seconds.
    pub source_in: f64,

    /// Out-point within the source, seconds.
    pub source_out: f64,

    /// Placement start time on the track, seconds.
    pub start: f64,

    /// Optional scale/offset/pan-zoom transform.
    #[serde(default)]
    pub transform: Option<ClipTransform>,

    /// Optional volume level (1.0 = unity gain).
    #[serde(default)]
    pub volume: Option<f64>,
}

impl Clip {
    /// Trimmed duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.source_out - self.source_in
    }

    /// Placement end time on the track, seconds.
    pub fn end_secs(&self) -> f64 {
        self.start + self.duration_secs()
    }
}

/// Visual style of a transition between adjacent clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Dissolve,
    Wipe,
}

impl TransitionKind {
    /// Engine service name used in generated project documents.
    pub fn service(&self) -> &'static str {
        match self {
            TransitionKind::Dissolve => "luma",
            TransitionKind::Wipe => "wipe",
        }
    }
}

/// A declared transition between a clip and its successor.
///
/// Keyed by the index of the clip that comes before the transition, in the
/// track's placement order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Index of the preceding clip (0 = between clips 0 and 1).
    pub after_clip: usize,

    /// Transition style.
    pub kind: TransitionKind,

    /// Declared overlap window, seconds.
    pub duration_secs: f64,
}

/// Kind of track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

/// One ordered lane of clips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub kind: TrackKind,

    pub clips: Vec<Clip>,

    /// Transitions between adjacent clips, keyed by preceding clip index.
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

impl Track {
    /// Clip references sorted by placement start time.
    pub fn sorted_clips(&self) -> Vec<&Clip> {
        let mut clips: Vec<&Clip> = self.clips.iter().collect();
        clips.sort_by(|a, b| a.start.total_cmp(&b.start));
        clips
    }

    /// Track extent: the latest placement end among its clips, seconds.
    pub fn extent_secs(&self) -> f64 {
        self.clips
            .iter()
            .map(|c| c.end_secs())
            .fold(0.0, f64::max)
    }

    /// The declared transition following the clip at `index` (placement
    /// order), if any.
    pub fn transition_after(&self, index: usize) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.after_clip == index)
    }
}

/// Half-open time window `[start_secs, end_secs)` for partial renders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_secs: f64,
    pub end_secs: f64,
}

impl TimeRange {
    pub fn new(start_secs: f64, end_secs: f64) -> Self {
        Self {
            start_secs,
            end_secs,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }

    pub fn is_valid(&self) -> bool {
        self.start_secs >= 0.0
            && self.start_secs.is_finite()
            && self.end_secs.is_finite()
            && self.duration_secs() > TIME_EPSILON
    }
}

/// The complete editing timeline handed to the render pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub tracks: Vec<Track>,
}

/// Structural defects detected by [`Timeline::validate`].
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    #[error("track {track}, clip {clip}: asset path is empty")]
    UnresolvedAsset { track: usize, clip: usize },

    #[error("track {track}, clip {clip}: time values must be finite and non-negative")]
    InvalidTime { track: usize, clip: usize },

    #[error(
        "track {track}, clip {clip}: in-point {source_in}s is after out-point {source_out}s"
    )]
    InvertedTrim {
        track: usize,
        clip: usize,
        source_in: f64,
        source_out: f64,
    },

    #[error("track {track}: transition after clip {clip} has non-positive duration")]
    InvalidTransitionDuration { track: usize, clip: usize },

    #[error("track {track}: transition after clip {clip} references a non-adjacent pair")]
    NonAdjacentTransition { track: usize, clip: usize },

    #[error(
        "track {track}: clips {first} and {second} overlap by {overlap_secs:.3}s without a transition"
    )]
    OverlappingClips {
        track: usize,
        first: usize,
        second: usize,
        overlap_secs: f64,
    },

    #[error(
        "track {track}: clips {first} and {second} overlap by {overlap_secs:.3}s, more than the declared {duration_secs:.3}s transition"
    )]
    OverlapExceedsTransition {
        track: usize,
        first: usize,
        second: usize,
        overlap_secs: f64,
        duration_secs: f64,
    },
}

impl Timeline {
    pub fn new() -> Self {
        Self { tracks: Vec::new() }
    }

    /// Timeline duration: the widest track extent, seconds.
    pub fn duration_secs(&self) -> f64 {
        self.tracks
            .iter()
            .map(|t| t.extent_secs())
            .fold(0.0, f64::max)
    }

    /// Check the structural invariants the render pipeline relies on:
    /// resolvable asset paths, `in <= out` trims, placements that never
    /// overlap except inside a declared transition's window, and
    /// transitions that actually sit between adjacent clips.
    pub fn validate(&self) -> Result<(), TimelineError> {
        for (track_idx, track) in self.tracks.iter().enumerate() {
            let clips = track.sorted_clips();

            for (clip_idx, clip) in clips.iter().enumerate() {
                if clip.asset_path.as_os_str().is_empty() {
                    return Err(TimelineError::UnresolvedAsset {
                        track: track_idx,
                        clip: clip_idx,
                    });
                }
                let times = [clip.source_in, clip.source_out, clip.start];
                if times.iter().any(|t| !t.is_finite() || *t < 0.0) {
                    return Err(TimelineError::InvalidTime {
                        track: track_idx,
                        clip: clip_idx,
                    });
                }
                if clip.source_in > clip.source_out + TIME_EPSILON {
                    return Err(TimelineError::InvertedTrim {
                        track: track_idx,
                        clip: clip_idx,
                        source_in: clip.source_in,
                        source_out: clip.source_out,
                    });
                }
            }

            for transition in &track.transitions {
                if transition.duration_secs <= TIME_EPSILON {
                    return Err(TimelineError::InvalidTransitionDuration {
                        track: track_idx,
                        clip: transition.after_clip,
                    });
                }
                if transition.after_clip + 1 >= clips.len() {
                    return Err(TimelineError::NonAdjacentTransition {
                        track: track_idx,
                        clip: transition.after_clip,
                    });
                }
            }

            for pair in 0..clips.len().saturating_sub(1) {
                let overlap = clips[pair].end_secs() - clips[pair + 1].start;
                let transition = track.transition_after(pair);
                match transition {
                    Some(t) => {
                        if overlap <= TIME_EPSILON {
                            return Err(TimelineError::NonAdjacentTransition {
                                track: track_idx,
                                clip: pair,
                            });
                        }
                        if overlap > t.duration_secs + TIME_EPSILON {
                            return Err(TimelineError::OverlapExceedsTransition {
                                track: track_idx,
                                first: pair,
                                second: pair + 1,
                                overlap_secs: overlap,
                                duration_secs: t.duration_secs,
                            });
                        }
                    }
                    None => {
                        if overlap > TIME_EPSILON {
                            return Err(TimelineError::OverlappingClips {
                                track: track_idx,
                                first: pair,
                                second: pair + 1,
                                overlap_secs: overlap,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Produce an owned copy restricted to `[range.start, range.end)`.
    ///
    /// Clips fully outside the window are dropped; clips straddling a
    /// boundary are re-trimmed and everything is rebased so the copy starts
    /// at zero. The original timeline is never touched.
    pub fn clipped_to_range(&self, range: &TimeRange) -> Timeline {
        let mut tracks = Vec::with_capacity(self.tracks.len());

        for track in &self.tracks {
            let sorted = track.sorted_clips();
            let mut kept: Vec<(usize, Clip)> = Vec::new();

            for (idx, clip) in sorted.iter().enumerate() {
                if clip.end_secs() <= range.start_secs + TIME_EPSILON
                    || clip.start >= range.end_secs - TIME_EPSILON
                {
                    continue;
                }
                let mut trimmed = (*clip).clone();
                let front_cut = (range.start_secs - trimmed.start).max(0.0);
                let back_cut = (trimmed.end_secs() - range.end_secs).max(0.0);
                trimmed.source_in += front_cut;
                trimmed.source_out -= back_cut;
                trimmed.start = (trimmed.start - range.start_secs).max(0.0);
                kept.push((idx, trimmed));
            }

            let mut transitions = Vec::new();
            for transition in &track.transitions {
                let first = kept.iter().position(|(orig, _)| *orig == transition.after_clip);
                let second = kept
                    .iter()
                    .position(|(orig, _)| *orig == transition.after_clip + 1);
                if let (Some(first), Some(second)) = (first, second) {
                    if second != first + 1 {
                        continue;
                    }
                    let overlap = kept[first].1.end_secs() - kept[second].1.start;
                    if overlap > TIME_EPSILON {
                        transitions.push(Transition {
                            after_clip: first,
                            kind: transition.kind,
                            duration_secs: transition.duration_secs,
                        });
                    }
                }
            }

            tracks.push(Track {
                kind: track.kind,
                clips: kept.into_iter().map(|(_, clip)| clip).collect(),
                transitions,
            });
        }

        Timeline { tracks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_clip(path: &str, source_in: f64, source_out: f64, start: f64) -> Clip {
        Clip {
            asset_path: PathBuf::from(path),
            asset_kind: AssetKind::Video,
            source_in,
            source_out,
            start,
            transform: None,
            volume: None,
        }
    }

    fn single_track(clips: Vec<Clip>, transitions: Vec<Transition>) -> Timeline {
        Timeline {
            tracks: vec![Track {
                kind: TrackKind::Video,
                clips,
                transitions,
            }],
        }
    }

    #[test]
    fn test_duration_is_widest_track_extent() {
        let timeline = Timeline {
            tracks: vec![
                Track {
                    kind: TrackKind::Video,
                    clips: vec![video_clip("a.mp4", 0.0, 4.0, 0.0)],
                    transitions: vec![],
                },
                Track {
                    kind: TrackKind::Audio,
                    clips: vec![video_clip("b.mp3", 0.0, 6.0, 1.0)],
                    transitions: vec![],
                },
            ],
        };
        assert!((timeline.duration_secs() - 7.0).abs() < TIME_EPSILON);
    }

    #[test]
    fn test_validate_rejects_inverted_trim() {
        let timeline = single_track(vec![video_clip("a.mp4", 5.0, 2.0, 0.0)], vec![]);
        assert!(matches!(
            timeline.validate(),
            Err(TimelineError::InvertedTrim { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_asset_path() {
        let timeline = single_track(vec![video_clip("", 0.0, 2.0, 0.0)], vec![]);
        assert!(matches!(
            timeline.validate(),
            Err(TimelineError::UnresolvedAsset { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_overlap_without_transition() {
        let timeline = single_track(
            vec![
                video_clip("a.mp4", 0.0, 4.0, 0.0),
                video_clip("b.mp4", 0.0, 4.0, 3.0),
            ],
            vec![],
        );
        assert!(matches!(
            timeline.validate(),
            Err(TimelineError::OverlappingClips { .. })
        ));
    }

    #[test]
    fn test_validate_accepts_overlap_inside_transition_window() {
        let timeline = single_track(
            vec![
                video_clip("a.mp4", 0.0, 4.0, 0.0),
                video_clip("b.mp4", 0.0, 4.0, 3.0),
            ],
            vec![Transition {
                after_clip: 0,
                kind: TransitionKind::Dissolve,
                duration_secs: 1.0,
            }],
        );
        assert!(timeline.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_dangling_transition() {
        let timeline = single_track(
            vec![video_clip("a.mp4", 0.0, 4.0, 0.0)],
            vec![Transition {
                after_clip: 0,
                kind: TransitionKind::Dissolve,
                duration_secs: 1.0,
            }],
        );
        assert!(matches!(
            timeline.validate(),
            Err(TimelineError::NonAdjacentTransition { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_butted_clips_with_transition() {
        // A declared transition needs an actual overlap window.
        let timeline = single_track(
            vec![
                video_clip("a.mp4", 0.0, 4.0, 0.0),
                video_clip("b.mp4", 0.0, 4.0, 4.0),
            ],
            vec![Transition {
                after_clip: 0,
                kind: TransitionKind::Dissolve,
                duration_secs: 1.0,
            }],
        );
        assert!(matches!(
            timeline.validate(),
            Err(TimelineError::NonAdjacentTransition { .. })
        ));
    }

    #[test]
    fn test_clipped_to_range_drops_and_retrims() {
        let timeline = single_track(
            vec![
                video_clip("a.mp4", 0.0, 4.0, 0.0),   // straddles range start
                video_clip("b.mp4", 1.0, 3.0, 4.0),   // fully inside
                video_clip("c.mp4", 0.0, 5.0, 20.0),  // fully outside
            ],
            vec![],
        );

        let clipped = timeline.clipped_to_range(&TimeRange::new(2.0, 8.0));
        let track = &clipped.tracks[0];
        assert_eq!(track.clips.len(), 2);

        // First clip lost its first 2 seconds and rebased to 0.
        assert!((track.clips[0].source_in - 2.0).abs() < TIME_EPSILON);
        assert!((track.clips[0].start - 0.0).abs() < TIME_EPSILON);

        // Second clip kept its trim, rebased from 4.0 to 2.0.
        assert!((track.clips[1].start - 2.0).abs() < TIME_EPSILON);
        assert!((track.clips[1].source_in - 1.0).abs() < TIME_EPSILON);
    }

    #[test]
    fn test_clipped_to_range_does_not_mutate_the_original() {
        let timeline = single_track(vec![video_clip("a.mp4", 0.0, 10.0, 0.0)], vec![]);
        let before = timeline.clone();
        let _ = timeline.clipped_to_range(&TimeRange::new(2.0, 5.0));
        assert_eq!(timeline, before);
    }

    #[test]
    fn test_clipped_to_range_keeps_surviving_transitions() {
        let timeline = single_track(
            vec![
                video_clip("a.mp4", 0.0, 4.0, 0.0),
                video_clip("b.mp4", 0.0, 4.0, 3.0),
            ],
            vec![Transition {
                after_clip: 0,
                kind: TransitionKind::Dissolve,
                duration_secs: 1.0,
            }],
        );

        let clipped = timeline.clipped_to_range(&TimeRange::new(0.0, 7.0));
        assert_eq!(clipped.tracks[0].transitions.len(), 1);

        // Cutting away the second clip drops the transition with it.
        let clipped = timeline.clipped_to_range(&TimeRange::new(0.0, 2.0));
        assert_eq!(clipped.tracks[0].clips.len(), 1);
        assert!(clipped.tracks[0].transitions.is_empty());
    }

    #[test]
    fn test_transform_identity_and_rect() {
        let identity = ClipTransform::default();
        assert!(identity.is_identity());
        assert_eq!(identity.to_rect(), NormalizedRect::FULL);

        let shrunk = ClipTransform {
            scale_pct: 50.0,
            offset_x_pct: 0.0,
            offset_y_pct: 0.0,
            pan_zoom: None,
        };
        assert!(!shrunk.is_identity());
        let rect = shrunk.to_rect();
        assert!((rect.w - 0.5).abs() < TIME_EPSILON);
        assert!((rect.x - 0.25).abs() < TIME_EPSILON);
    }
}
