use crate::features::{active_channels, extract_channel_features, ChannelFeatures};
use crate::gm::{self, DRUM_KIT};
use crate::palette::{Palette, Role};
use crate::stream::{Stream, DRUM_CHANNEL};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How one channel was classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelClassification {
    pub program: u8,
    pub role: Role,
    pub label: String,
    pub features: ChannelFeatures,
}

/// Rule-based role and program selection for one channel.
///
/// Rules are checked in priority order and the first match wins. Melodic
/// roles pick from the palette bucket round-robin by channel id.
pub fn classify_with_role(channel: u8, features: &ChannelFeatures, palette: &Palette) -> (Role, u8) {
    let role = classify_role(channel, features);
    (role, palette.pick(role, channel))
}

/// Program for a channel; 128 marks the drum kit.
pub fn classify_channel(channel: u8, features: &ChannelFeatures, palette: &Palette) -> u8 {
    classify_with_role(channel, features, palette).1
}

fn classify_role(channel: u8, f: &ChannelFeatures) -> Role {
    // Rule 1: GM drum channel
    if channel == DRUM_CHANNEL {
        return Role::Percussion;
    }

    // Rule 2: drum-map pitches, repeated hits, irregular and off-grid timing
    if f.percussion_range_ratio > 0.7
        && f.note_repeat_rate > 0.3
        && f.ioi_std_dev > 100.0
        && f.beat_aligned_ratio < 0.6
    {
        return Role::Percussion;
    }

    // Rule 3: dynamic, dense, short, accented off-beats
    if f.velocity_std_dev > 30.0
        && f.note_density > 2.0
        && f.mean_note_duration < 480.0
        && f.syncopation_score > 0.2
    {
        return Role::Percussion;
    }

    // Rule 4: low and narrow
    if f.pitch_max < 55 && f.pitch_range < 24 {
        return Role::Bass;
    }

    // Rule 5: high, unhurried, sustained
    if f.pitch_min > 60 && f.note_density < 4.0 && f.mean_note_duration > 240.0 {
        return Role::Lead;
    }

    // Rule 6: long notes
    if f.mean_note_duration > 960.0 {
        return Role::Pad;
    }

    Role::Lead
}

/// Classify every sounding channel of a stream. Silent channels are omitted.
pub fn classify_stream(stream: &Stream, palette: &Palette) -> BTreeMap<u8, ChannelClassification> {
    active_channels(stream)
        .into_iter()
        .filter_map(|channel| {
            let features = extract_channel_features(stream, channel)?;
            let (role, program) = classify_with_role(channel, &features, palette);
            tracing::debug!(channel, %role, program, "classified channel");
            Some((
                channel,
                ChannelClassification {
                    program,
                    role,
                    label: gm::program_name(program).to_string(),
                    features,
                },
            ))
        })
        .collect()
}

/// Whether a program number is the drum-kit marker.
pub fn is_drum_kit(program: u8) -> bool {
    program == DRUM_KIT
}
