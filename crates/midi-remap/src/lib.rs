//! Re-voice General MIDI streams for the instrument palette of a retro
//! console, and score how much musical content survived.
//!
//! The pipeline is parse, classify every sounding channel into a role
//! (lead, pad, bass, percussion), pick a palette program for that role,
//! then write program changes in front of each track's events. Notes,
//! timing, and track layout pass through untouched.
//!
//! ```rust,no_run
//! use midi_remap::{codec, palette::Catalogue, remap};
//!
//! let bytes = std::fs::read("song.mid").unwrap();
//! let stream = codec::parse(&bytes).unwrap();
//! let catalogue = Catalogue::builtin();
//! let snes = catalogue.palette("snes").unwrap();
//! let remapped = remap(&stream, snes);
//! std::fs::write("song.snes.mid", codec::serialize(&remapped).unwrap()).unwrap();
//! ```

pub mod classify;
pub mod codec;
pub mod evaluate;
pub mod features;
pub mod gm;
pub mod palette;
pub mod remap;
pub mod stream;

pub use classify::{classify_channel, classify_stream, classify_with_role, ChannelClassification};
pub use evaluate::{
    evaluate_pair, melody_similarity, onset_alignment, EvaluationResult, OnsetAlignment,
    DEFAULT_ONSET_TOLERANCE_SECONDS,
};
pub use features::{active_channels, extract_channel_features, ChannelFeatures};
pub use palette::{Catalogue, Palette, Role};
pub use remap::{channel_assignments, remap, resolve_program};
pub use stream::{Event, EventKind, Stream, Track};

/// Errors from parsing, validating, or looking up MIDI data.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("MIDI parse error: {0}")]
    MidiParse(String),

    #[error("invalid stream: {0}")]
    InvalidStream(String),

    #[error("invalid palette: {0}")]
    InvalidPalette(String),

    #[error("unknown style '{style}' (valid: {valid})")]
    UnknownStyle { style: String, valid: String },
}

pub type Result<T> = std::result::Result<T, Error>;
