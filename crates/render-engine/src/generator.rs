//! Timeline to engine project XML translation.
//!
//! Produces the multitrack project document consumed by the external melt
//! renderer: one de-duplicated `<producer>` per distinct source trim, one
//! `<playlist>` per track (blanks for gaps, transitions over declared
//! overlaps), and a single `<tractor>` compositing the tracks under the
//! profile declared on the `<mlt>` root.
//!
//! Generation is pure and deterministic: identical timeline + profile input
//! produces byte-identical output, and all failure modes are reported before
//! any file I/O happens.

use std::collections::HashMap;

use dreamcloud_common::{DreamcloudError, DreamcloudResult};
use dreamcloud_project_model::{
    AssetKind, Clip, NormalizedRect, Profile, TimeRange, Timeline, TrackKind, TransitionKind,
};

/// Generate the project document for a full timeline render.
pub fn generate_project_xml(timeline: &Timeline, profile: &Profile) -> DreamcloudResult<String> {
    generate(timeline, profile, None)
}

/// Generate the project document for a partial render of `[start, end)`.
///
/// Clips outside the window are excluded, straddling clips are re-trimmed,
/// and the document duration is padded to the full window length. The
/// caller's timeline is never mutated.
pub fn generate_project_xml_for_range(
    timeline: &Timeline,
    profile: &Profile,
    range: &TimeRange,
) -> DreamcloudResult<String> {
    if !range.is_valid() {
        return Err(DreamcloudError::xml_generation(format!(
            "invalid render range [{}, {})",
            range.start_secs, range.end_secs
        )));
    }
    let clipped = timeline.clipped_to_range(range);
    let window_frames = profile.frame_rate.frames_for(range.duration_secs());
    generate(&clipped, profile, Some(window_frames))
}

/// Estimated total output frames for a render of this timeline.
pub fn estimate_total_frames(
    timeline: &Timeline,
    profile: &Profile,
    range: Option<&TimeRange>,
) -> u64 {
    match range {
        Some(range) => profile.frame_rate.frames_for(range.duration_secs()),
        None => profile.frame_rate.frames_for(timeline.duration_secs()),
    }
}

/// One producer definition: a distinct (asset, in, out) trim.
struct ProducerDef {
    resource: String,
    service: &'static str,
    in_frame: u64,
    out_frame: u64,
}

/// Interning table keeping producers unique and in first-seen order.
#[derive(Default)]
struct ProducerTable {
    defs: Vec<ProducerDef>,
    index: HashMap<(String, u64, u64), usize>,
}

impl ProducerTable {
    fn intern(&mut self, clip: &Clip, in_frame: u64, out_frame: u64) -> usize {
        let resource = clip.asset_path.to_string_lossy().into_owned();
        let key = (resource.clone(), in_frame, out_frame);
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = self.defs.len();
        self.defs.push(ProducerDef {
            resource,
            service: producer_service(clip.asset_kind),
            in_frame,
            out_frame,
        });
        self.index.insert(key, id);
        id
    }
}

fn producer_service(kind: AssetKind) -> &'static str {
    match kind {
        AssetKind::Video | AssetKind::Audio => "avformat",
        AssetKind::Image => "pixbuf",
    }
}

/// A planned playlist element.
enum PlaylistItem {
    Blank {
        length: u64,
    },
    Entry {
        producer: usize,
        in_frame: u64,
        out_frame: u64,
        filters: Vec<FilterPlan>,
    },
    Transition {
        service: &'static str,
        in_frame: u64,
        out_frame: u64,
    },
}

/// A filter attached to a playlist entry.
enum FilterPlan {
    /// Animated or static window, as normalized-rect keyframes.
    Affine {
        start: NormalizedRect,
        end: NormalizedRect,
        last_frame: u64,
    },
    Volume {
        level: f64,
    },
}

fn generate(
    timeline: &Timeline,
    profile: &Profile,
    window_frames: Option<u64>,
) -> DreamcloudResult<String> {
    timeline
        .validate()
        .map_err(|e| DreamcloudError::xml_generation(e.to_string()))?;

    let frame_rate = profile.frame_rate;
    let mut producers = ProducerTable::default();
    let mut playlists: Vec<Vec<PlaylistItem>> = Vec::with_capacity(timeline.tracks.len());
    let mut playlist_extents: Vec<u64> = Vec::with_capacity(timeline.tracks.len());

    for (track_idx, track) in timeline.tracks.iter().enumerate() {
        let clips = track.sorted_clips();

        // Frame-domain positions and trims, computed once so playlist sums
        // stay integer-exact.
        let mut positions = Vec::with_capacity(clips.len());
        let mut trims = Vec::with_capacity(clips.len());
        for (clip_idx, clip) in clips.iter().enumerate() {
            let in_frame = frame_rate.frames_for(clip.source_in);
            let out_frame = frame_rate.frames_for(clip.source_out);
            if out_frame <= in_frame {
                return Err(DreamcloudError::xml_generation(format!(
                    "track {track_idx}, clip {clip_idx}: trim is shorter than one frame"
                )));
            }
            positions.push(frame_rate.frames_for(clip.start));
            trims.push((in_frame, out_frame));
        }

        let mut items: Vec<PlaylistItem> = Vec::new();
        let mut cursor: u64 = 0;

        for (i, clip) in clips.iter().enumerate() {
            let (in_frame, out_frame) = trims[i];
            let full_duration = out_frame - in_frame;
            let mut entry_duration = full_duration;
            let mut transition = None;

            if let Some(declared) = track.transition_after(i) {
                let end_frame = positions[i] + full_duration;
                let overlap = end_frame.saturating_sub(positions[i + 1]);
                if overlap >= full_duration {
                    return Err(DreamcloudError::xml_generation(format!(
                        "track {track_idx}: transition after clip {i} swallows the whole clip"
                    )));
                }
                // A declared overlap can round down to zero frames; the pair
                // then butts together and the transition is dropped.
                if overlap > 0 {
                    entry_duration = positions[i + 1] - positions[i];
                    transition = Some(PlaylistItem::Transition {
                        service: transition_service(track.kind, declared.kind),
                        in_frame: positions[i + 1],
                        out_frame: end_frame - 1,
                    });
                }
            }

            if positions[i] > cursor {
                items.push(PlaylistItem::Blank {
                    length: positions[i] - cursor,
                });
                cursor = positions[i];
            }

            let producer = producers.intern(clip, in_frame, out_frame - 1);
            items.push(PlaylistItem::Entry {
                producer,
                in_frame,
                out_frame: in_frame + entry_duration - 1,
                filters: entry_filters(clip, entry_duration),
            });
            cursor += entry_duration;

            if let Some(transition) = transition {
                items.push(transition);
            }
        }

        playlists.push(items);
        playlist_extents.push(cursor);
    }

    let content_frames = playlist_extents.iter().copied().max().unwrap_or(0);
    let total_frames = window_frames.unwrap_or(content_frames).max(content_frames);
    if total_frames == 0 {
        return Err(DreamcloudError::xml_generation(
            "timeline contains no renderable clips",
        ));
    }

    Ok(write_document(profile, &producers.defs, &playlists, total_frames))
}

fn transition_service(track: TrackKind, kind: TransitionKind) -> &'static str {
    match track {
        TrackKind::Video => kind.service(),
        TrackKind::Audio => "mix",
    }
}

fn entry_filters(clip: &Clip, entry_duration: u64) -> Vec<FilterPlan> {
    let mut filters = Vec::new();

    if let Some(transform) = &clip.transform {
        if let Some(pan_zoom) = transform.pan_zoom {
            let (start, end) = pan_zoom.rects();
            filters.push(FilterPlan::Affine {
                start,
                end,
                last_frame: entry_duration.saturating_sub(1),
            });
        } else if !transform.is_identity() {
            let rect = transform.to_rect();
            filters.push(FilterPlan::Affine {
                start: rect,
                end: rect,
                last_frame: entry_duration.saturating_sub(1),
            });
        }
    }

    if let Some(level) = clip.volume {
        if (level - 1.0).abs() > f64::EPSILON {
            filters.push(FilterPlan::Volume { level });
        }
    }

    filters
}

fn write_document(
    profile: &Profile,
    producers: &[ProducerDef],
    playlists: &[Vec<PlaylistItem>],
    total_frames: u64,
) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    xml.push_str(&format!(
        "<mlt width=\"{}\" height=\"{}\" frame_rate_num=\"{}\" frame_rate_den=\"{}\" sample_aspect_num=\"{}\" sample_aspect_den=\"{}\" progressive=\"{}\">\n",
        profile.width,
        profile.height,
        profile.frame_rate.num,
        profile.frame_rate.den,
        profile.sample_aspect_num,
        profile.sample_aspect_den,
        u8::from(profile.progressive),
    ));

    for (id, producer) in producers.iter().enumerate() {
        xml.push_str(&format!(
            "  <producer id=\"producer{}\" in=\"{}\" out=\"{}\">\n",
            id, producer.in_frame, producer.out_frame
        ));
        xml.push_str(&format!(
            "    <property name=\"resource\">{}</property>\n",
            escape_xml(&producer.resource)
        ));
        xml.push_str(&format!(
            "    <property name=\"mlt_service\">{}</property>\n",
            producer.service
        ));
        xml.push_str("  </producer>\n");
    }

    for (id, items) in playlists.iter().enumerate() {
        xml.push_str(&format!("  <playlist id=\"playlist{id}\">\n"));
        for item in items {
            match item {
                PlaylistItem::Blank { length } => {
                    xml.push_str(&format!("    <blank length=\"{length}\"/>\n"));
                }
                PlaylistItem::Entry {
                    producer,
                    in_frame,
                    out_frame,
                    filters,
                } => {
                    if filters.is_empty() {
                        xml.push_str(&format!(
                            "    <entry producer=\"producer{producer}\" in=\"{in_frame}\" out=\"{out_frame}\"/>\n"
                        ));
                    } else {
                        xml.push_str(&format!(
                            "    <entry producer=\"producer{producer}\" in=\"{in_frame}\" out=\"{out_frame}\">\n"
                        ));
                        for filter in filters {
                            write_filter(&mut xml, filter);
                        }
                        xml.push_str("    </entry>\n");
                    }
                }
                PlaylistItem::Transition {
                    service,
                    in_frame,
                    out_frame,
                } => {
                    xml.push_str(&format!(
                        "    <transition mlt_service=\"{service}\" in=\"{in_frame}\" out=\"{out_frame}\"/>\n"
                    ));
                }
            }
        }
        xml.push_str("  </playlist>\n");
    }

    xml.push_str(&format!(
        "  <tractor id=\"tractor0\" in=\"0\" out=\"{}\">\n",
        total_frames - 1
    ));
    for id in 0..playlists.len() {
        xml.push_str(&format!("    <track producer=\"playlist{id}\"/>\n"));
    }
    xml.push_str("  </tractor>\n");
    xml.push_str("</mlt>\n");

    xml
}

fn write_filter(xml: &mut String, filter: &FilterPlan) {
    match filter {
        FilterPlan::Affine {
            start,
            end,
            last_frame,
        } => {
            xml.push_str("      <filter mlt_service=\"affine\">\n");
            let keyframes = if start == end || *last_frame == 0 {
                format!("0={}", start.to_geometry_string())
            } else {
                format!(
                    "0={};{}={}",
                    start.to_geometry_string(),
                    last_frame,
                    end.to_geometry_string()
                )
            };
            xml.push_str(&format!(
                "        <property name=\"transition.rect\">{keyframes}</property>\n"
            ));
            xml.push_str("      </filter>\n");
        }
        FilterPlan::Volume { level } => {
            xml.push_str("      <filter mlt_service=\"volume\">\n");
            xml.push_str(&format!(
                "        <property name=\"level\">{level:.4}</property>\n"
            ));
            xml.push_str("      </filter>\n");
        }
    }
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use dreamcloud_project_model::{ClipTransform, PanZoom, Track, Transition};
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn clip(path: &str, source_in: f64, source_out: f64, start: f64) -> Clip {
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

    fn video_track(clips: Vec<Clip>, transitions: Vec<Transition>) -> Track {
        Track {
            kind: TrackKind::Video,
            clips,
            transitions,
        }
    }

    fn parse(xml: &str) -> roxmltree::Document<'_> {
        roxmltree::Document::parse(xml).expect("generated XML must be well-formed")
    }

    fn count_elements(doc: &roxmltree::Document<'_>, name: &str) -> usize {
        doc.descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == name)
            .count()
    }

    #[test]
    fn test_producers_dedup_by_asset_and_trim() {
        // Same trim on two tracks, a different trim on the second track.
        let timeline = Timeline {
            tracks: vec![
                video_track(vec![clip("a.mp4", 0.0, 2.0, 0.0)], vec![]),
                video_track(
                    vec![clip("a.mp4", 0.0, 2.0, 0.0), clip("a.mp4", 1.0, 3.0, 2.0)],
                    vec![],
                ),
            ],
        };
        let xml = generate_project_xml(&timeline, &Profile::full_hd()).unwrap();
        let doc = parse(&xml);
        assert_eq!(count_elements(&doc, "producer"), 2);
        assert_eq!(count_elements(&doc, "playlist"), 2);
    }

    #[test]
    fn test_playlist_duration_matches_track_extent() {
        let profile = Profile::full_hd();
        let timeline = Timeline {
            tracks: vec![video_track(
                vec![
                    clip("a.mp4", 0.0, 2.5, 0.0),
                    clip("b.mp4", 1.0, 3.0, 4.0), // 1.5s gap before this clip
                ],
                vec![],
            )],
        };
        let xml = generate_project_xml(&timeline, &profile).unwrap();
        let doc = parse(&xml);

        let mut frames = 0u64;
        for node in doc.descendants().filter(|n| n.is_element()) {
            match node.tag_name().name() {
                "blank" => {
                    frames += node.attribute("length").unwrap().parse::<u64>().unwrap();
                }
                "entry" => {
                    let in_f: u64 = node.attribute("in").unwrap().parse().unwrap();
                    let out_f: u64 = node.attribute("out").unwrap().parse().unwrap();
                    frames += out_f - in_f + 1;
                }
                _ => {}
            }
        }
        assert_eq!(frames, profile.frame_rate.frames_for(6.0));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let timeline = Timeline {
            tracks: vec![video_track(
                vec![clip("a.mp4", 0.0, 2.0, 0.0), clip("b.mp4", 0.0, 3.0, 2.0)],
                vec![],
            )],
        };
        let first = generate_project_xml(&timeline, &Profile::full_hd()).unwrap();
        let second = generate_project_xml(&timeline, &Profile::full_hd()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_root_carries_profile_attributes() {
        let timeline = Timeline {
            tracks: vec![video_track(vec![clip("a.mp4", 0.0, 1.0, 0.0)], vec![])],
        };
        let xml = generate_project_xml(&timeline, &Profile::preview()).unwrap();
        let doc = parse(&xml);
        let root = doc.root_element();
        assert_eq!(root.tag_name().name(), "mlt");
        assert_eq!(root.attribute("width"), Some("960"));
        assert_eq!(root.attribute("height"), Some("540"));
        assert_eq!(root.attribute("frame_rate_num"), Some("30"));
    }

    #[test]
    fn test_inverted_trim_is_rejected_before_any_output() {
        let timeline = Timeline {
            tracks: vec![video_track(vec![clip("a.mp4", 5.0, 2.0, 0.0)], vec![])],
        };
        let err = generate_project_xml(&timeline, &Profile::full_hd()).unwrap_err();
        assert!(matches!(err, DreamcloudError::XmlGeneration { .. }));
    }

    #[test]
    fn test_empty_timeline_is_rejected() {
        let timeline = Timeline::new();
        let err = generate_project_xml(&timeline, &Profile::full_hd()).unwrap_err();
        assert!(matches!(err, DreamcloudError::XmlGeneration { .. }));
    }

    #[test]
    fn test_transition_cuts_outgoing_entry_and_spans_overlap() {
        let profile = Profile::full_hd();
        // 4s + 4s clips overlapping by 1s at t=3.
        let timeline = Timeline {
            tracks: vec![video_track(
                vec![clip("a.mp4", 0.0, 4.0, 0.0), clip("b.mp4", 0.0, 4.0, 3.0)],
                vec![Transition {
                    after_clip: 0,
                    kind: TransitionKind::Dissolve,
                    duration_secs: 1.0,
                }],
            )],
        };
        let xml = generate_project_xml(&timeline, &profile).unwrap();
        let doc = parse(&xml);

        let transition = doc
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == "transition")
            .expect("declared transition must be emitted");
        assert_eq!(transition.attribute("mlt_service"), Some("luma"));
        assert_eq!(transition.attribute("in"), Some("90"));
        assert_eq!(transition.attribute("out"), Some("119"));

        // Outgoing entry is cut at the incoming clip's start frame.
        let first_entry = doc
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == "entry")
            .unwrap();
        assert_eq!(first_entry.attribute("out"), Some("89"));
    }

    #[test]
    fn test_pan_zoom_emits_affine_keyframes_and_volume_filter() {
        let mut first = clip("a.jpg", 0.0, 4.0, 0.0);
        first.asset_kind = AssetKind::Image;
        first.transform = Some(ClipTransform {
            pan_zoom: Some(PanZoom::ZoomIn),
            ..ClipTransform::default()
        });
        first.volume = Some(0.5);

        let timeline = Timeline {
            tracks: vec![video_track(vec![first], vec![])],
        };
        let xml = generate_project_xml(&timeline, &Profile::full_hd()).unwrap();

        assert!(xml.contains("mlt_service=\"affine\""));
        assert!(xml.contains("0=0.0000/0.0000/1.0000/1.0000;119=0.1000/0.1000/0.8000/0.8000"));
        assert!(xml.contains("mlt_service=\"volume\""));
        assert!(xml.contains("<property name=\"level\">0.5000</property>"));
        assert!(xml.contains("<property name=\"mlt_service\">pixbuf</property>"));
    }

    #[test]
    fn test_range_render_pads_to_window_and_drops_outside_clips() {
        let profile = Profile::full_hd();
        let timeline = Timeline {
            tracks: vec![video_track(
                vec![clip("a.mp4", 0.0, 4.0, 0.0), clip("b.mp4", 0.0, 4.0, 20.0)],
                vec![],
            )],
        };
        let range = TimeRange::new(1.0, 6.0);
        let xml = generate_project_xml_for_range(&timeline, &profile, &range).unwrap();
        let doc = parse(&xml);

        // Only the straddling clip survives.
        assert_eq!(count_elements(&doc, "producer"), 1);

        let tractor = doc
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == "tractor")
            .unwrap();
        let out: u64 = tractor.attribute("out").unwrap().parse().unwrap();
        assert_eq!(out + 1, profile.frame_rate.frames_for(5.0));
    }

    #[test]
    fn test_range_render_does_not_mutate_caller_timeline() {
        let timeline = Timeline {
            tracks: vec![video_track(vec![clip("a.mp4", 0.0, 10.0, 0.0)], vec![])],
        };
        let before = timeline.clone();
        let _ = generate_project_xml_for_range(
            &timeline,
            &Profile::full_hd(),
            &TimeRange::new(2.0, 4.0),
        )
        .unwrap();
        assert_eq!(timeline, before);
    }

    #[test]
    fn test_two_track_three_clip_scenario_is_300_frames() {
        // 10 seconds across two tracks at 30fps renders as 300 frames.
        let timeline = Timeline {
            tracks: vec![
                video_track(
                    vec![clip("a.mp4", 0.0, 6.0, 0.0), clip("b.mp4", 0.0, 4.0, 6.0)],
                    vec![],
                ),
                Track {
                    kind: TrackKind::Audio,
                    clips: vec![{
                        let mut c = clip("music.mp3", 0.0, 10.0, 0.0);
                        c.asset_kind = AssetKind::Audio;
                        c
                    }],
                    transitions: vec![],
                },
            ],
        };
        let profile = Profile::full_hd();
        let xml = generate_project_xml(&timeline, &profile).unwrap();
        let doc = parse(&xml);

        let tractor = doc
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == "tractor")
            .unwrap();
        let out: u64 = tractor.attribute("out").unwrap().parse().unwrap();
        assert_eq!(out + 1, 300);
        assert_eq!(estimate_total_frames(&timeline, &profile, None), 300);
    }

    #[test]
    fn test_paths_are_escaped() {
        let timeline = Timeline {
            tracks: vec![video_track(vec![clip("a & b <clip>.mp4", 0.0, 1.0, 0.0)], vec![])],
        };
        let xml = generate_project_xml(&timeline, &Profile::full_hd()).unwrap();
        assert!(xml.contains("a &amp; b &lt;clip&gt;.mp4"));
        parse(&xml);
    }

    proptest! {
        /// Gapped, non-overlapping layouts always produce playlists whose
        /// frame sum equals the frame-domain track extent.
        #[test]
        fn prop_playlist_frames_cover_track_extent(
            layout in proptest::collection::vec((0.1f64..5.0, 0.0f64..2.0), 1..8)
        ) {
            let profile = Profile::full_hd();
            let mut clips = Vec::new();
            let mut at = 0.0f64;
            for (duration, gap) in layout {
                at += gap;
                clips.push(clip("a.mp4", 0.0, duration, at));
                at += duration;
            }
            let timeline = Timeline { tracks: vec![video_track(clips, vec![])] };

            let xml = generate_project_xml(&timeline, &profile).unwrap();
            let doc = roxmltree::Document::parse(&xml).unwrap();

            let mut frames = 0u64;
            for node in doc.descendants().filter(|n| n.is_element()) {
                match node.tag_name().name() {
                    "blank" => frames += node.attribute("length").unwrap().parse::<u64>().unwrap(),
                    "entry" => {
                        let in_f: u64 = node.attribute("in").unwrap().parse().unwrap();
                        let out_f: u64 = node.attribute("out").unwrap().parse().unwrap();
                        frames += out_f - in_f + 1;
                    }
                    _ => {}
                }
            }

            let extent = profile.frame_rate.frames_for(timeline.duration_secs());
            let diff = frames.abs_diff(extent);
            prop_assert!(diff <= timeline.tracks[0].clips.len() as u64,
                "frames {} vs extent {}", frames, extent);
        }
    }
}
