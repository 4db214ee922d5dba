//! Structural validation of generated project documents.
//!
//! The generator enforces its own invariants; this pass re-parses the
//! finished document and checks the structure the external renderer relies
//! on, independent of how the document was produced. It runs before any
//! process is spawned, so a defective document never reaches disk or melt.

use std::collections::HashSet;

use dreamcloud_common::{DreamcloudError, DreamcloudResult};

/// Validate a generated project document.
pub fn validate_project_xml(xml: &str) -> DreamcloudResult<()> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| DreamcloudError::xml_validation(format!("document is not well-formed: {e}")))?;

    let root = doc.root_element();
    if root.tag_name().name() != "mlt" {
        return Err(DreamcloudError::xml_validation(format!(
            "root element must be <mlt>, found <{}>",
            root.tag_name().name()
        )));
    }

    for attr in ["width", "height", "frame_rate_num", "frame_rate_den"] {
        let value = root.attribute(attr).ok_or_else(|| {
            DreamcloudError::xml_validation(format!("root is missing the {attr} attribute"))
        })?;
        let parsed: u64 = value.parse().map_err(|_| {
            DreamcloudError::xml_validation(format!("root attribute {attr}={value:?} is not a number"))
        })?;
        if parsed == 0 {
            return Err(DreamcloudError::xml_validation(format!(
                "root attribute {attr} must be positive"
            )));
        }
    }

    let mut producer_ids: HashSet<&str> = HashSet::new();
    for producer in root
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "producer")
    {
        let id = producer
            .attribute("id")
            .ok_or_else(|| DreamcloudError::xml_validation("producer is missing an id"))?;
        if !producer_ids.insert(id) {
            return Err(DreamcloudError::xml_validation(format!(
                "duplicate producer id {id:?}"
            )));
        }
        check_frame_window(&producer, "producer")?;
    }
    if producer_ids.is_empty() {
        return Err(DreamcloudError::xml_validation(
            "document declares no producers",
        ));
    }

    let mut playlist_ids: HashSet<&str> = HashSet::new();
    for playlist in root
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "playlist")
    {
        let id = playlist
            .attribute("id")
            .ok_or_else(|| DreamcloudError::xml_validation("playlist is missing an id"))?;
        if !playlist_ids.insert(id) {
            return Err(DreamcloudError::xml_validation(format!(
                "duplicate playlist id {id:?}"
            )));
        }

        for child in playlist.children().filter(|n| n.is_element()) {
            match child.tag_name().name() {
                "entry" => {
                    let target = child.attribute("producer").ok_or_else(|| {
                        DreamcloudError::xml_validation(format!(
                            "playlist {id:?} has an entry without a producer reference"
                        ))
                    })?;
                    if !producer_ids.contains(target) {
                        return Err(DreamcloudError::xml_validation(format!(
                            "playlist {id:?} references undeclared producer {target:?}"
                        )));
                    }
                    check_frame_window(&child, "entry")?;
                }
                "blank" => {
                    let length = child.attribute("length").ok_or_else(|| {
                        DreamcloudError::xml_validation(format!(
                            "playlist {id:?} has a blank without a length"
                        ))
                    })?;
                    length.parse::<u64>().map_err(|_| {
                        DreamcloudError::xml_validation(format!(
                            "playlist {id:?} has a non-numeric blank length {length:?}"
                        ))
                    })?;
                }
                "transition" => {
                    if child.attribute("mlt_service").is_none() {
                        return Err(DreamcloudError::xml_validation(format!(
                            "playlist {id:?} has a transition without a service"
                        )));
                    }
                    check_frame_window(&child, "transition")?;
                }
                other => {
                    return Err(DreamcloudError::xml_validation(format!(
                        "playlist {id:?} contains unexpected element <{other}>"
                    )));
                }
            }
        }
    }
    if playlist_ids.is_empty() {
        return Err(DreamcloudError::xml_validation(
            "document declares no playlists",
        ));
    }

    let tractors: Vec<_> = root
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "tractor")
        .collect();
    if tractors.len() != 1 {
        return Err(DreamcloudError::xml_validation(format!(
            "document must declare exactly one tractor, found {}",
            tractors.len()
        )));
    }
    let tractor = &tractors[0];
    check_frame_window(tractor, "tractor")?;

    let mut track_count = 0;
    for track in tractor
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "track")
    {
        track_count += 1;
        let target = track
            .attribute("producer")
            .ok_or_else(|| DreamcloudError::xml_validation("tractor track is missing a producer"))?;
        if !playlist_ids.contains(target) {
            return Err(DreamcloudError::xml_validation(format!(
                "tractor references undeclared playlist {target:?}"
            )));
        }
    }
    if track_count == 0 {
        return Err(DreamcloudError::xml_validation("tractor has no tracks"));
    }

    Ok(())
}

/// Check that an element's optional in/out frame attributes are
/// non-negative integers with `in <= out`.
fn check_frame_window(node: &roxmltree::Node<'_, '_>, what: &str) -> DreamcloudResult<()> {
    let parse = |attr: &str| -> DreamcloudResult<Option<u64>> {
        match node.attribute(attr) {
            None => Ok(None),
            Some(value) => value.parse::<u64>().map(Some).map_err(|_| {
                DreamcloudError::xml_validation(format!(
                    "{what} has a non-numeric {attr} frame {value:?}"
                ))
            }),
        }
    };

    let in_frame = parse("in")?;
    let out_frame = parse("out")?;
    if let (Some(in_frame), Some(out_frame)) = (in_frame, out_frame) {
        if in_frame > out_frame {
            return Err(DreamcloudError::xml_validation(format!(
                "{what} has in frame {in_frame} after out frame {out_frame}"
            )));
        }
    }
    Ok(())
}
