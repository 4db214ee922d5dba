//! Render presets: immutable, versioned bundles of profile + encoding choices.
//!
//! A project never mutates a preset, it selects one. Presets carry a version
//! so a stored reference can detect when the catalog definition changed.

use serde::{Deserialize, Serialize};

use crate::profile::Profile;

/// Output container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Mp4,
    Webm,
}

impl Container {
    /// File extension for output paths.
    pub fn extension(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Webm => "webm",
        }
    }
}

/// A named bundle of profile, container, codec, and quality choices.
///
/// Serializable for job reporting; presets are only ever constructed from
/// the catalog, never parsed back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderPreset {
    /// Catalog name (stable identifier).
    pub name: &'static str,

    /// Catalog revision of this preset definition.
    pub version: u32,

    /// Output profile.
    pub profile: Profile,

    /// Container format.
    pub container: Container,

    /// Video codec handed to the encoder.
    pub video_codec: &'static str,

    /// Audio codec handed to the encoder.
    pub audio_codec: &'static str,

    /// Constant rate factor (lower = higher quality).
    pub crf: u32,

    /// Audio bitrate (encoder syntax, e.g. "192k").
    pub audio_bitrate: &'static str,

    /// Encoder speed/quality tradeoff preset.
    pub speed: &'static str,
}

impl RenderPreset {
    /// Full-quality H.264 export.
    pub const fn export_h264() -> Self {
        Self {
            name: "export-h264",
            version: 2,
            profile: Profile::full_hd(),
            container: Container::Mp4,
            video_codec: "libx264",
            audio_codec: "aac",
            crf: 18,
            audio_bitrate: "192k",
            speed: "medium",
        }
    }

    /// Full-quality VP9 export for web delivery.
    pub const fn export_webm() -> Self {
        Self {
            name: "export-webm",
            version: 1,
            profile: Profile::full_hd(),
            container: Container::Webm,
            video_codec: "libvpx-vp9",
            audio_codec: "libopus",
            crf: 24,
            audio_bitrate: "128k",
            speed: "good",
        }
    }

    /// Fast, low-resolution draft used for preview renders.
    pub const fn preview_draft() -> Self {
        Self {
            name: "preview-draft",
            version: 2,
            profile: Profile::preview(),
            container: Container::Mp4,
            video_codec: "libx264",
            audio_codec: "aac",
            crf: 28,
            audio_bitrate: "128k",
            speed: "ultrafast",
        }
    }

    /// Look up a preset by catalog name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "export-h264" => Some(Self::export_h264()),
            "export-webm" => Some(Self::export_webm()),
            "preview-draft" => Some(Self::preview_draft()),
            _ => None,
        }
    }

    /// File extension for output paths.
    pub fn extension(&self) -> &'static str {
        self.container.extension()
    }

    /// The `key=value` properties appended to the engine's consumer
    /// argument, selecting codecs and quality for this preset.
    pub fn consumer_properties(&self) -> Vec<String> {
        vec![
            format!("vcodec={}", self.video_codec),
            format!("acodec={}", self.audio_codec),
            format!("ab={}", self.audio_bitrate),
            format!("crf={}", self.crf),
            format!("preset={}", self.speed),
            format!("width={}", self.profile.width),
            format!("height={}", self.profile.height),
            format!("frame_rate_num={}", self.profile.frame_rate.num),
            format!("frame_rate_den={}", self.profile.frame_rate.den),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_lookup_by_name() {
        let preset = RenderPreset::by_name("export-h264").unwrap();
        assert_eq!(preset, RenderPreset::export_h264());
        assert!(RenderPreset::by_name("nonexistent").is_none());
    }

    #[test]
    fn test_preview_is_cheaper_than_export() {
        let export = RenderPreset::export_h264();
        let preview = RenderPreset::preview_draft();
        assert!(preview.crf > export.crf);
        assert!(preview.profile.width < export.profile.width);
        assert_eq!(preview.extension(), "mp4");
    }

    #[test]
    fn test_consumer_properties_carry_codec_and_profile() {
        let props = RenderPreset::export_h264().consumer_properties();
        assert!(props.contains(&"vcodec=libx264".to_string()));
        assert!(props.contains(&"crf=18".to_string()));
        assert!(props.contains(&"width=1920".to_string()));
        assert!(props.contains(&"frame_rate_num=30".to_string()));
    }
}
