use crate::stream::{EventKind, Stream};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Lowest pitch of the GM percussion key map (Acoustic Bass Drum).
pub const PERCUSSION_PITCH_MIN: u8 = 35;
/// Highest pitch of the GM percussion key map (Open Triangle).
pub const PERCUSSION_PITCH_MAX: u8 = 81;

/// Statistical fingerprint of one channel's note events.
///
/// Tick-valued fields use the stream's own resolution. Ratios are in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelFeatures {
    pub channel: u8,

    // Register
    pub pitch_min: u8,
    pub pitch_max: u8,
    pub pitch_range: u8,

    // Dynamics
    pub mean_velocity: f64,
    pub velocity_std_dev: f64,

    // Temporal
    pub note_count: usize,
    /// Notes per beat over the span up to the last onset.
    pub note_density: f64,
    /// Mean note length in ticks, over notes that were released.
    pub mean_note_duration: f64,
    pub mean_ioi: f64,
    pub ioi_std_dev: f64,

    // Pattern
    pub note_repeat_rate: f64,
    pub percussion_range_ratio: f64,
    pub beat_aligned_ratio: f64,
    pub syncopation_score: f64,
}

/// Compute the fingerprint for `channel`, or `None` if it never sounds a note.
///
/// Tracks are walked in order, each with its own tick clock. Onsets are kept
/// in walk order, so inter-onset intervals may go negative across a track
/// boundary. A second note-on for a pitch that is still held replaces the
/// pending onset.
pub fn extract_channel_features(stream: &Stream, channel: u8) -> Option<ChannelFeatures> {
    let mut pitches: Vec<u8> = Vec::new();
    let mut velocities: Vec<u8> = Vec::new();
    let mut onsets: Vec<u64> = Vec::new();
    let mut durations: Vec<i64> = Vec::new();
    let mut note_repeats = 0usize;
    let mut percussion_notes = 0usize;
    // pitch -> (onset_tick, velocity)
    let mut open_notes: HashMap<u8, (u64, u8)> = HashMap::new();

    for (tick, event) in stream.channel_events(channel) {
        match event.kind {
            EventKind::NoteOn {
                pitch, velocity, ..
            } if velocity > 0 => {
                if pitches.last() == Some(&pitch) {
                    note_repeats += 1;
                }
                if (PERCUSSION_PITCH_MIN..=PERCUSSION_PITCH_MAX).contains(&pitch) {
                    percussion_notes += 1;
                }
                pitches.push(pitch);
                velocities.push(velocity);
                onsets.push(tick);
                open_notes.insert(pitch, (tick, velocity));
            }
            EventKind::NoteOn { pitch, .. } | EventKind::NoteOff { pitch, .. } => {
                if let Some((onset, _)) = open_notes.remove(&pitch) {
                    durations.push(tick as i64 - onset as i64);
                }
            }
            _ => {}
        }
    }

    if pitches.is_empty() {
        return None;
    }

    let note_count = pitches.len();
    let ppq = stream.ticks_per_beat() as u64;

    let pitch_min = pitches.iter().copied().min().unwrap_or(0);
    let pitch_max = pitches.iter().copied().max().unwrap_or(0);

    let (mean_velocity, velocity_std_dev) =
        mean_and_std_dev(velocities.iter().map(|&v| v as f64));

    let iois: Vec<f64> = onsets
        .windows(2)
        .map(|w| w[1] as f64 - w[0] as f64)
        .collect();
    let (mean_ioi, ioi_std_dev) = mean_and_std_dev(iois.iter().copied());

    let mean_note_duration = if durations.is_empty() {
        0.0
    } else {
        durations.iter().sum::<i64>() as f64 / durations.len() as f64
    };

    let last_onset = onsets.iter().copied().max().unwrap_or(0);
    let span_beats = last_onset as f64 / ppq as f64;
    let note_density = if span_beats > 0.0 {
        note_count as f64 / span_beats
    } else {
        note_count as f64
    };

    let note_repeat_rate = if note_count > 1 {
        note_repeats as f64 / note_count as f64
    } else {
        0.0
    };

    Some(ChannelFeatures {
        channel,
        pitch_min,
        pitch_max,
        pitch_range: pitch_max - pitch_min,
        mean_velocity,
        velocity_std_dev,
        note_count,
        note_density,
        mean_note_duration,
        mean_ioi,
        ioi_std_dev,
        note_repeat_rate,
        percussion_range_ratio: percussion_notes as f64 / note_count as f64,
        beat_aligned_ratio: beat_aligned_ratio(&onsets, ppq),
        syncopation_score: syncopation_score(&onsets, &velocities, ppq),
    })
}

/// Sorted channel ids that appear on any note-on or note-off event.
pub fn active_channels(stream: &Stream) -> Vec<u8> {
    stream
        .tracks()
        .iter()
        .flat_map(|t| t.events.iter())
        .filter(|e| e.kind.is_note())
        .filter_map(|e| e.kind.channel())
        .collect::<BTreeSet<u8>>()
        .into_iter()
        .collect()
}

/// Fraction of onsets within 10% of a sixteenth-note grid line, measured
/// forward from the line.
fn beat_aligned_ratio(onsets: &[u64], ppq: u64) -> f64 {
    // Resolutions below 4 ticks per beat have no sub-beat grid; every
    // tick is on it.
    let grid = (ppq / 4).max(1);
    let tolerance = grid as f64 * 0.1;
    let on_grid = onsets
        .iter()
        .filter(|&&t| ((t % grid) as f64) < tolerance)
        .count();
    on_grid as f64 / onsets.len() as f64
}

/// Fraction of onsets that are loud (velocity > 80) and land in the back
/// half of a beat.
fn syncopation_score(onsets: &[u64], velocities: &[u8], ppq: u64) -> f64 {
    let off_beat = (ppq / 2) as f64 * 0.9;
    let syncopated = onsets
        .iter()
        .zip(velocities)
        .filter(|&(&t, &v)| (t % ppq) as f64 > off_beat && v > 80)
        .count();
    syncopated as f64 / onsets.len() as f64
}

/// Population mean and standard deviation; (0, 0) for no samples.
pub(crate) fn mean_and_std_dev(values: impl Iterator<Item = f64> + Clone) -> (f64, f64) {
    let count = values.clone().count();
    if count == 0 {
        return (0.0, 0.0);
    }

    let mean = values.clone().sum::<f64>() / count as f64;
    let variance = values
        .map(|x| {
            let diff = x - mean;
            diff * diff
        })
        .sum::<f64>()
        / count as f64;

    (mean, variance.sqrt())
}
