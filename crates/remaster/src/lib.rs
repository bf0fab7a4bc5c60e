//! remaster - re-voice MIDI files for retro console palettes
//!
//! The binary is a thin clap layer; the command bodies live here so they
//! can be exercised against temp directories in tests.

pub mod commands;
pub mod corpus;

pub use commands::build_catalogue;
