//! Content-preservation metrics between a reference and a candidate stream.

use crate::features::mean_and_std_dev;
use crate::stream::{EventKind, Stream, DEFAULT_TEMPO_MICROS, DRUM_CHANNEL};
use serde::{Deserialize, Serialize};

/// Default onset matching window: 50 ms.
pub const DEFAULT_ONSET_TOLERANCE_SECONDS: f64 = 0.05;

/// Onset alignment scores, each rounded to 4 decimal places.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OnsetAlignment {
    pub precision: f64,
    pub recall: f64,
    pub f_measure: f64,
}

/// Both metrics for one (reference, candidate) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub melody_similarity: f64,
    pub onset_alignment: OnsetAlignment,
}

pub fn evaluate_pair(reference: &Stream, candidate: &Stream, tolerance_seconds: f64) -> EvaluationResult {
    EvaluationResult {
        melody_similarity: melody_similarity(reference, candidate),
        onset_alignment: onset_alignment(reference, candidate, tolerance_seconds),
    }
}

/// Pitches of the dominant melodic channel, in event order.
///
/// Dominant means the non-drum channel with the highest mean pitch; the
/// earliest-seen channel wins ties. Empty when no non-drum channel sounds.
pub fn melody_pitches(stream: &Stream) -> Vec<u8> {
    // (channel, pitches) in first-seen order
    let mut channels: Vec<(u8, Vec<u8>)> = Vec::new();

    for event in stream.tracks().iter().flat_map(|t| t.events.iter()) {
        if let EventKind::NoteOn {
            channel,
            pitch,
            velocity,
        } = event.kind
        {
            if velocity == 0 || channel == DRUM_CHANNEL {
                continue;
            }
            match channels.iter_mut().find(|(ch, _)| *ch == channel) {
                Some((_, pitches)) => pitches.push(pitch),
                None => channels.push((channel, vec![pitch])),
            }
        }
    }

    let mut best: Option<(f64, Vec<u8>)> = None;
    for (_, pitches) in channels {
        let mean = pitches.iter().map(|&p| p as f64).sum::<f64>() / pitches.len() as f64;
        if best.as_ref().map_or(true, |(m, _)| mean > *m) {
            best = Some((mean, pitches));
        }
    }

    best.map(|(_, pitches)| pitches).unwrap_or_default()
}

/// Pearson correlation of the two streams' melody contours over their
/// common prefix. In [-1, 1]; 0.0 for fewer than two notes, a flat
/// contour, or a non-finite result.
pub fn melody_similarity(a: &Stream, b: &Stream) -> f64 {
    let pitches_a = melody_pitches(a);
    let pitches_b = melody_pitches(b);

    let n = pitches_a.len().min(pitches_b.len());
    if n < 2 {
        return 0.0;
    }

    let xs: Vec<f64> = pitches_a[..n].iter().map(|&p| p as f64).collect();
    let ys: Vec<f64> = pitches_b[..n].iter().map(|&p| p as f64).collect();

    pearson(&xs, &ys)
}

fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let (mean_x, std_x) = mean_and_std_dev(xs.iter().copied());
    let (mean_y, std_y) = mean_and_std_dev(ys.iter().copied());
    if std_x == 0.0 || std_y == 0.0 {
        return 0.0;
    }

    let (sxy, sxx, syy) = xs.iter().zip(ys).fold((0.0, 0.0, 0.0), |(sxy, sxx, syy), (&x, &y)| {
        let dx = x - mean_x;
        let dy = y - mean_y;
        (sxy + dx * dy, sxx + dx * dx, syy + dy * dy)
    });

    let corr = sxy / (sxx * syy).sqrt();
    if corr.is_finite() {
        corr.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Sorted note-on times in seconds.
///
/// Each track keeps its own tempo, starting at 120 BPM and updated by the
/// tempo events it contains. An event's delta is timed at the tempo in
/// effect before the event.
pub fn onset_times(stream: &Stream) -> Vec<f64> {
    let ppq = stream.ticks_per_beat() as f64;
    let mut onsets = Vec::new();

    for track in stream.tracks() {
        let mut tempo = DEFAULT_TEMPO_MICROS;
        let mut seconds = 0.0;

        for event in &track.events {
            seconds += event.delta as f64 * tempo as f64 / 1_000_000.0 / ppq;

            match event.kind {
                EventKind::Tempo { micros_per_beat } => tempo = micros_per_beat,
                EventKind::NoteOn { velocity, .. } if velocity > 0 => onsets.push(seconds),
                _ => {}
            }
        }
    }

    onsets.sort_by(|a, b| a.total_cmp(b));
    onsets
}

/// Precision, recall, and F-measure of candidate onsets against reference
/// onsets within `tolerance_seconds`.
///
/// Matching is greedy: each reference onset in turn takes the nearest
/// unmatched candidate inside the window. This is not an optimal
/// assignment.
pub fn onset_alignment(reference: &Stream, candidate: &Stream, tolerance_seconds: f64) -> OnsetAlignment {
    let ref_onsets = onset_times(reference);
    let cand_onsets = onset_times(candidate);

    if ref_onsets.is_empty() || cand_onsets.is_empty() {
        return OnsetAlignment::default();
    }

    let mut matched = vec![false; cand_onsets.len()];
    let mut true_positives = 0usize;

    for &ref_t in &ref_onsets {
        let mut best: Option<(usize, f64)> = None;
        for (j, &cand_t) in cand_onsets.iter().enumerate() {
            if matched[j] {
                continue;
            }
            let dist = (ref_t - cand_t).abs();
            if dist <= tolerance_seconds && best.map_or(true, |(_, d)| dist < d) {
                best = Some((j, dist));
            }
        }
        if let Some((j, _)) = best {
            matched[j] = true;
            true_positives += 1;
        }
    }

    let precision = true_positives as f64 / cand_onsets.len() as f64;
    let recall = true_positives as f64 / ref_onsets.len() as f64;
    let f_measure = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    OnsetAlignment {
        precision: round4(precision),
        recall: round4(recall),
        f_measure: round4(f_measure),
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
