use crate::classify::{classify_channel, is_drum_kit};
use crate::features::{active_channels, extract_channel_features};
use crate::gm::DRUM_KIT;
use crate::palette::Palette;
use crate::stream::{Event, EventKind, Stream, Track, DRUM_CHANNEL};
use std::collections::BTreeMap;

/// Snap a classified program onto the palette's allowed set.
///
/// Allowed programs pass through; anything else becomes the first allowed
/// program that is not the drum kit.
pub fn resolve_program(program: u8, palette: &Palette) -> u8 {
    let allowed = palette.allowed_programs();
    if allowed.contains(&program) {
        return program;
    }
    allowed
        .iter()
        .copied()
        .find(|&p| p != DRUM_KIT)
        .or_else(|| allowed.first().copied())
        .unwrap_or(0)
}

/// Resolved program for every sounding channel.
pub fn channel_assignments(stream: &Stream, palette: &Palette) -> BTreeMap<u8, u8> {
    active_channels(stream)
        .into_iter()
        .filter_map(|channel| {
            let features = extract_channel_features(stream, channel)?;
            let classified = classify_channel(channel, &features, palette);
            let resolved = resolve_program(classified, palette);
            if resolved != classified {
                tracing::debug!(channel, classified, resolved, "program outside palette, substituted");
            }
            Some((channel, resolved))
        })
        .collect()
}

/// Produce a new stream with each sounding channel re-voiced for `palette`.
///
/// Every output track starts with one program change per assigned channel
/// in that track (ascending channel id, delta 0), followed by copies of the
/// original events. Channels assigned the drum kit are moved to channel 9.
/// Note content, track count, and the delta sequence of copied events are
/// unchanged.
pub fn remap(stream: &Stream, palette: &Palette) -> Stream {
    let assignments = channel_assignments(stream, palette);

    let tracks: Vec<Track> = stream
        .tracks()
        .iter()
        .map(|track| remap_track(track, &assignments))
        .collect();

    tracing::debug!(
        tracks = tracks.len(),
        channels = assignments.len(),
        "remapped stream"
    );

    stream.with_tracks(tracks)
}

fn remap_track(track: &Track, assignments: &BTreeMap<u8, u8>) -> Track {
    let mut events = Vec::with_capacity(track.events.len() + 16);

    for channel in track.channels() {
        if let Some(&program) = assignments.get(&channel) {
            let (channel, program) = output_voice(channel, program);
            events.push(Event::new(0, EventKind::ProgramChange { channel, program }));
        }
    }

    for event in &track.events {
        let mut kind = event.kind.clone();
        if let Some(&program) = kind.channel().and_then(|ch| assignments.get(&ch)) {
            if is_drum_kit(program) {
                kind.set_channel(DRUM_CHANNEL);
            }
            if let EventKind::ProgramChange {
                channel: original, ..
            } = event.kind
            {
                let (channel, program) = output_voice(original, program);
                kind = EventKind::ProgramChange { channel, program };
            }
        }
        events.push(Event::new(event.delta, kind));
    }

    Track::new(events)
}

/// Channel and program to emit for an assignment. The drum kit is program 0
/// on the drum channel.
fn output_voice(channel: u8, program: u8) -> (u8, u8) {
    if is_drum_kit(program) {
        (DRUM_CHANNEL, 0)
    } else {
        (channel, program)
    }
}
