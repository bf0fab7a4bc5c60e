use serde::{Deserialize, Serialize};

/// The General MIDI percussion channel (zero-based).
pub const DRUM_CHANNEL: u8 = 9;

/// Tempo assumed before any tempo event is seen: 120 BPM.
pub const DEFAULT_TEMPO_MICROS: u32 = 500_000;

/// Channel voice messages that carry no note or program payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMessage {
    Controller { controller: u8, value: u8 },
    /// Raw 14-bit value, 8192 is centered.
    PitchBend { value: u16 },
    Aftertouch { pitch: u8, pressure: u8 },
    ChannelAftertouch { pressure: u8 },
}

/// Meta events other than tempo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaEvent {
    EndOfTrack,
    TimeSignature {
        numerator: u8,
        denominator_pow: u8,
        clocks_per_click: u8,
        notes_per_quarter: u8,
    },
    /// Any other meta event, kept as its type byte and payload.
    Raw { kind: u8, data: Vec<u8> },
}

/// What an event does. Channel-scoped kinds carry their channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    NoteOff { channel: u8, pitch: u8, velocity: u8 },
    ProgramChange { channel: u8, program: u8 },
    Control { channel: u8, message: ControlMessage },
    Tempo { micros_per_beat: u32 },
    Meta(MetaEvent),
    SysEx(Vec<u8>),
    Escape(Vec<u8>),
}

impl EventKind {
    pub fn channel(&self) -> Option<u8> {
        match self {
            Self::NoteOn { channel, .. }
            | Self::NoteOff { channel, .. }
            | Self::ProgramChange { channel, .. }
            | Self::Control { channel, .. } => Some(*channel),
            _ => None,
        }
    }

    /// Rewrite the channel of a channel-scoped event. No-op otherwise.
    pub fn set_channel(&mut self, new_channel: u8) {
        match self {
            Self::NoteOn { channel, .. }
            | Self::NoteOff { channel, .. }
            | Self::ProgramChange { channel, .. }
            | Self::Control { channel, .. } => *channel = new_channel,
            _ => {}
        }
    }

    /// A note-on with non-zero velocity.
    pub fn is_sounding_note_on(&self) -> bool {
        matches!(self, Self::NoteOn { velocity, .. } if *velocity > 0)
    }

    /// Note-off, or note-on with velocity 0.
    pub fn is_note_release(&self) -> bool {
        matches!(
            self,
            Self::NoteOff { .. } | Self::NoteOn { velocity: 0, .. }
        )
    }

    pub fn is_note(&self) -> bool {
        matches!(self, Self::NoteOn { .. } | Self::NoteOff { .. })
    }
}

/// One timestamped message, relative to the previous event in its track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub delta: u32,
    pub kind: EventKind,
}

impl Event {
    pub fn new(delta: u32, kind: EventKind) -> Self {
        Self { delta, kind }
    }
}

/// Events sharing one timeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub events: Vec<Event>,
}

impl Track {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    /// Events paired with their absolute tick position.
    pub fn timed_events(&self) -> impl Iterator<Item = (u64, &Event)> + '_ {
        self.events.iter().scan(0u64, |tick, event| {
            *tick += event.delta as u64;
            Some((*tick, event))
        })
    }

    /// Distinct channels referenced by channel-scoped events, ascending.
    pub fn channels(&self) -> Vec<u8> {
        let mut channels: Vec<u8> = self
            .events
            .iter()
            .filter_map(|e| e.kind.channel())
            .collect();
        channels.sort_unstable();
        channels.dedup();
        channels
    }
}

/// A symbolic event stream: tracks plus a tick resolution.
///
/// Constructed only through [`Stream::new`], so every instance has a
/// positive resolution and at least one track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stream {
    ticks_per_beat: u16,
    tracks: Vec<Track>,
}

impl Stream {
    pub fn new(ticks_per_beat: u16, tracks: Vec<Track>) -> crate::Result<Self> {
        if ticks_per_beat == 0 {
            return Err(crate::Error::InvalidStream(
                "ticks per beat must be positive".to_string(),
            ));
        }
        if tracks.is_empty() {
            return Err(crate::Error::InvalidStream(
                "stream has no tracks".to_string(),
            ));
        }
        Ok(Self {
            ticks_per_beat,
            tracks,
        })
    }

    pub fn ticks_per_beat(&self) -> u16 {
        self.ticks_per_beat
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Same resolution, replacement tracks. Callers keep one track per
    /// original track, so the invariants carry over.
    pub(crate) fn with_tracks(&self, tracks: Vec<Track>) -> Self {
        debug_assert_eq!(tracks.len(), self.tracks.len());
        Self {
            ticks_per_beat: self.ticks_per_beat,
            tracks,
        }
    }

    /// Every event on `channel`, across all tracks, with per-track ticks.
    pub fn channel_events(&self, channel: u8) -> impl Iterator<Item = (u64, &Event)> + '_ {
        self.tracks
            .iter()
            .flat_map(|t| t.timed_events())
            .filter(move |(_, e)| e.kind.channel() == Some(channel))
    }

    /// Count of note-on events with non-zero velocity.
    pub fn sounding_note_count(&self) -> usize {
        self.tracks
            .iter()
            .flat_map(|t| t.events.iter())
            .filter(|e| e.kind.is_sounding_note_on())
            .count()
    }
}
