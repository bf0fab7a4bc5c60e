//! Standard MIDI File boundary: bytes in, [`Stream`] out, and back.

use crate::stream::{ControlMessage, Event, EventKind, MetaEvent, Stream, Track};
use midly::{Fps, MetaMessage, MidiMessage, Smf, TrackEventKind};

/// Parse SMF bytes into a [`Stream`].
pub fn parse(bytes: &[u8]) -> crate::Result<Stream> {
    let smf = Smf::parse(bytes).map_err(|e| crate::Error::MidiParse(e.to_string()))?;

    let ticks_per_beat = match smf.header.timing {
        midly::Timing::Metrical(ticks) => ticks.as_int(),
        midly::Timing::Timecode(_, _) => {
            return Err(crate::Error::InvalidStream(
                "SMPTE timecode timing is not supported".to_string(),
            ))
        }
    };

    let tracks = smf
        .tracks
        .iter()
        .map(|track| {
            Track::new(
                track
                    .iter()
                    .map(|event| Event::new(event.delta.as_int(), convert_kind(&event.kind)))
                    .collect(),
            )
        })
        .collect();

    Stream::new(ticks_per_beat, tracks)
}

fn convert_kind(kind: &TrackEventKind<'_>) -> EventKind {
    match *kind {
        TrackEventKind::Midi { channel, message } => {
            let channel = channel.as_int();
            match message {
                MidiMessage::NoteOn { key, vel } => EventKind::NoteOn {
                    channel,
                    pitch: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::NoteOff { key, vel } => EventKind::NoteOff {
                    channel,
                    pitch: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::ProgramChange { program } => EventKind::ProgramChange {
                    channel,
                    program: program.as_int(),
                },
                MidiMessage::Controller { controller, value } => EventKind::Control {
                    channel,
                    message: ControlMessage::Controller {
                        controller: controller.as_int(),
                        value: value.as_int(),
                    },
                },
                MidiMessage::PitchBend { bend } => EventKind::Control {
                    channel,
                    message: ControlMessage::PitchBend {
                        value: bend.0.as_int(),
                    },
                },
                MidiMessage::Aftertouch { key, vel } => EventKind::Control {
                    channel,
                    message: ControlMessage::Aftertouch {
                        pitch: key.as_int(),
                        pressure: vel.as_int(),
                    },
                },
                MidiMessage::ChannelAftertouch { vel } => EventKind::Control {
                    channel,
                    message: ControlMessage::ChannelAftertouch {
                        pressure: vel.as_int(),
                    },
                },
            }
        }
        TrackEventKind::Meta(meta) => convert_meta(meta),
        TrackEventKind::SysEx(data) => EventKind::SysEx(data.to_vec()),
        TrackEventKind::Escape(data) => EventKind::Escape(data.to_vec()),
    }
}

fn convert_meta(meta: MetaMessage<'_>) -> EventKind {
    let raw = |kind: u8, data: &[u8]| {
        EventKind::Meta(MetaEvent::Raw {
            kind,
            data: data.to_vec(),
        })
    };

    match meta {
        MetaMessage::Tempo(tempo) => EventKind::Tempo {
            micros_per_beat: tempo.as_int(),
        },
        MetaMessage::EndOfTrack => EventKind::Meta(MetaEvent::EndOfTrack),
        MetaMessage::TimeSignature(numerator, denominator_pow, clocks_per_click, notes_per_quarter) => {
            EventKind::Meta(MetaEvent::TimeSignature {
                numerator,
                denominator_pow,
                clocks_per_click,
                notes_per_quarter,
            })
        }
        MetaMessage::TrackNumber(number) => match number {
            Some(n) => raw(0x00, &n.to_be_bytes()),
            None => raw(0x00, &[]),
        },
        MetaMessage::Text(data) => raw(0x01, data),
        MetaMessage::Copyright(data) => raw(0x02, data),
        MetaMessage::TrackName(data) => raw(0x03, data),
        MetaMessage::InstrumentName(data) => raw(0x04, data),
        MetaMessage::Lyric(data) => raw(0x05, data),
        MetaMessage::Marker(data) => raw(0x06, data),
        MetaMessage::CuePoint(data) => raw(0x07, data),
        MetaMessage::ProgramName(data) => raw(0x08, data),
        MetaMessage::DeviceName(data) => raw(0x09, data),
        MetaMessage::MidiChannel(channel) => raw(0x20, &[channel.as_int()]),
        MetaMessage::MidiPort(port) => raw(0x21, &[port.as_int()]),
        MetaMessage::SmpteOffset(time) => {
            let rate: u8 = match time.fps() {
                Fps::Fps24 => 0,
                Fps::Fps25 => 1,
                Fps::Fps29 => 2,
                Fps::Fps30 => 3,
            };
            raw(
                0x54,
                &[
                    (rate << 5) | time.hour(),
                    time.minute(),
                    time.second(),
                    time.frame(),
                    time.subframe(),
                ],
            )
        }
        MetaMessage::KeySignature(sharps, minor) => raw(0x59, &[sharps as u8, minor as u8]),
        MetaMessage::SequencerSpecific(data) => raw(0x7F, data),
        MetaMessage::Unknown(kind, data) => raw(kind, data),
    }
}

/// Largest value a variable-length quantity can hold (28 bits).
const MAX_VLQ: u32 = 0x0FFF_FFFF;

/// Largest tempo the 3-byte tempo meta can hold.
const MAX_TEMPO_MICROS: u32 = 0x00FF_FFFF;

/// Write a [`Stream`] as Standard MIDI File format 1 bytes.
///
/// Explicit status bytes on every event; an end-of-track meta is appended
/// to any track that lacks one. Deltas and payload lengths above 28 bits,
/// or tempos above 24 bits, are rejected as [`crate::Error::InvalidStream`].
pub fn serialize(stream: &Stream) -> crate::Result<Vec<u8>> {
    let tracks = stream
        .tracks()
        .iter()
        .enumerate()
        .map(|(index, track)| encode_track(index, track))
        .collect::<crate::Result<Vec<_>>>()?;
    Ok(build_midi_file(stream.ticks_per_beat(), &tracks))
}

fn encode_track(index: usize, track: &Track) -> crate::Result<Vec<u8>> {
    let mut track_data = Vec::new();

    for (position, event) in track.events.iter().enumerate() {
        check_event(event).map_err(|reason| {
            crate::Error::InvalidStream(format!("track {index} event {position}: {reason}"))
        })?;
        write_vlq(&mut track_data, event.delta);
        encode_kind(&mut track_data, &event.kind);
    }

    let terminated = matches!(
        track.events.last().map(|e| &e.kind),
        Some(EventKind::Meta(MetaEvent::EndOfTrack))
    );
    if !terminated {
        write_vlq(&mut track_data, 0);
        track_data.extend_from_slice(&[0xFF, 0x2F, 0x00]);
    }

    Ok(track_data)
}

/// Values the SMF encoding cannot represent.
fn check_event(event: &Event) -> std::result::Result<(), String> {
    if event.delta > MAX_VLQ {
        return Err(format!("delta {} exceeds {MAX_VLQ}", event.delta));
    }
    let payload_len = match &event.kind {
        EventKind::Tempo { micros_per_beat } if *micros_per_beat > MAX_TEMPO_MICROS => {
            return Err(format!(
                "tempo {micros_per_beat} exceeds {MAX_TEMPO_MICROS} microseconds per beat"
            ));
        }
        EventKind::Meta(MetaEvent::Raw { data, .. })
        | EventKind::SysEx(data)
        | EventKind::Escape(data) => data.len(),
        _ => 0,
    };
    if payload_len > MAX_VLQ as usize {
        return Err(format!("payload of {payload_len} bytes exceeds {MAX_VLQ}"));
    }
    Ok(())
}

fn encode_kind(buf: &mut Vec<u8>, kind: &EventKind) {
    match kind {
        EventKind::NoteOn {
            channel,
            pitch,
            velocity,
        } => buf.extend_from_slice(&[0x90 | (channel & 0x0F), pitch & 0x7F, velocity & 0x7F]),
        EventKind::NoteOff {
            channel,
            pitch,
            velocity,
        } => buf.extend_from_slice(&[0x80 | (channel & 0x0F), pitch & 0x7F, velocity & 0x7F]),
        EventKind::ProgramChange { channel, program } => {
            buf.extend_from_slice(&[0xC0 | (channel & 0x0F), program & 0x7F])
        }
        EventKind::Control { channel, message } => {
            let ch = channel & 0x0F;
            match *message {
                ControlMessage::Controller { controller, value } => {
                    buf.extend_from_slice(&[0xB0 | ch, controller & 0x7F, value & 0x7F])
                }
                ControlMessage::PitchBend { value } => buf.extend_from_slice(&[
                    0xE0 | ch,
                    (value & 0x7F) as u8,
                    ((value >> 7) & 0x7F) as u8,
                ]),
                ControlMessage::Aftertouch { pitch, pressure } => {
                    buf.extend_from_slice(&[0xA0 | ch, pitch & 0x7F, pressure & 0x7F])
                }
                ControlMessage::ChannelAftertouch { pressure } => {
                    buf.extend_from_slice(&[0xD0 | ch, pressure & 0x7F])
                }
            }
        }
        EventKind::Tempo { micros_per_beat } => {
            let usec = *micros_per_beat;
            buf.extend_from_slice(&[
                0xFF,
                0x51,
                0x03,
                (usec >> 16) as u8,
                (usec >> 8) as u8,
                usec as u8,
            ]);
        }
        EventKind::Meta(MetaEvent::EndOfTrack) => buf.extend_from_slice(&[0xFF, 0x2F, 0x00]),
        EventKind::Meta(MetaEvent::TimeSignature {
            numerator,
            denominator_pow,
            clocks_per_click,
            notes_per_quarter,
        }) => buf.extend_from_slice(&[
            0xFF,
            0x58,
            0x04,
            *numerator,
            *denominator_pow,
            *clocks_per_click,
            *notes_per_quarter,
        ]),
        EventKind::Meta(MetaEvent::Raw { kind, data }) => {
            buf.extend_from_slice(&[0xFF, *kind]);
            write_vlq(buf, data.len() as u32);
            buf.extend_from_slice(data);
        }
        EventKind::SysEx(data) => {
            buf.push(0xF0);
            write_vlq(buf, data.len() as u32);
            buf.extend_from_slice(data);
        }
        EventKind::Escape(data) => {
            buf.push(0xF7);
            write_vlq(buf, data.len() as u32);
            buf.extend_from_slice(data);
        }
    }
}

/// Assemble a complete MIDI file from track data blobs.
fn build_midi_file(ppq: u16, tracks: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::new();

    // MThd header
    buf.extend_from_slice(b"MThd");
    buf.extend_from_slice(&6u32.to_be_bytes());
    buf.extend_from_slice(&1u16.to_be_bytes()); // format 1
    buf.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    buf.extend_from_slice(&ppq.to_be_bytes());

    for track_data in tracks {
        buf.extend_from_slice(b"MTrk");
        buf.extend_from_slice(&(track_data.len() as u32).to_be_bytes());
        buf.extend_from_slice(track_data);
    }

    buf
}

/// Write a variable-length quantity to a byte buffer.
fn write_vlq(buf: &mut Vec<u8>, mut value: u32) {
    if value == 0 {
        buf.push(0);
        return;
    }

    let mut bytes = Vec::new();
    bytes.push((value & 0x7F) as u8);
    value >>= 7;

    while value > 0 {
        bytes.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }

    bytes.reverse();
    buf.extend_from_slice(&bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn make_test_midi_format1() -> Vec<u8> {
        let mut buf = Vec::new();

        buf.extend_from_slice(b"MThd");
        buf.extend_from_slice(&6u32.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&2u16.to_be_bytes());
        buf.extend_from_slice(&480u16.to_be_bytes());

        // Track 0: tempo + time sig
        let mut track0 = Vec::new();
        track0.extend_from_slice(&[0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20]);
        track0.extend_from_slice(&[0x00, 0xFF, 0x58, 0x04, 0x04, 0x02, 0x18, 0x08]);
        track0.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);
        buf.extend_from_slice(b"MTrk");
        buf.extend_from_slice(&(track0.len() as u32).to_be_bytes());
        buf.extend_from_slice(&track0);

        // Track 1: name, program, C4 E4 with a controller in between
        let mut track1 = Vec::new();
        track1.extend_from_slice(&[0x00, 0xFF, 0x03, 0x04, b'L', b'e', b'a', b'd']);
        track1.extend_from_slice(&[0x00, 0xC0, 0x05]);
        track1.extend_from_slice(&[0x00, 0x90, 60, 100]);
        track1.extend_from_slice(&[0x83, 0x60, 0x80, 60, 0]);
        track1.extend_from_slice(&[0x00, 0xB0, 0x07, 0x64]);
        track1.extend_from_slice(&[0x00, 0x90, 64, 100]);
        track1.extend_from_slice(&[0x83, 0x60, 0x90, 64, 0]);
        track1.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);
        buf.extend_from_slice(b"MTrk");
        buf.extend_from_slice(&(track1.len() as u32).to_be_bytes());
        buf.extend_from_slice(&track1);

        buf
    }

    #[test]
    fn parse_format1() {
        let stream = parse(&make_test_midi_format1()).unwrap();

        assert_eq!(stream.ticks_per_beat(), 480);
        assert_eq!(stream.tracks().len(), 2);
        assert_eq!(
            stream.tracks()[0].events[0].kind,
            EventKind::Tempo {
                micros_per_beat: 500_000
            }
        );
        assert_eq!(
            stream.tracks()[1].events[0].kind,
            EventKind::Meta(MetaEvent::Raw {
                kind: 0x03,
                data: b"Lead".to_vec()
            })
        );
        assert_eq!(stream.sounding_note_count(), 2);
        // vel=0 NoteOn stays a NoteOn
        assert!(stream.tracks()[1].events[6].kind.is_note_release());
    }

    #[test]
    fn serialize_then_parse_preserves_events() {
        let stream = parse(&make_test_midi_format1()).unwrap();
        let bytes = serialize(&stream).unwrap();
        let reparsed = parse(&bytes).unwrap();

        assert_eq!(reparsed, stream);
    }

    #[test]
    fn end_of_track_appended_once() {
        let stream = Stream::new(
            96,
            vec![Track::new(vec![Event::new(
                0,
                EventKind::NoteOn {
                    channel: 0,
                    pitch: 60,
                    velocity: 90,
                },
            )])],
        )
        .unwrap();

        let smf_bytes = serialize(&stream).unwrap();
        let smf = Smf::parse(&smf_bytes).expect("Generated MIDI should be valid");
        assert_eq!(smf.header.format, midly::Format::Parallel);
        assert_eq!(smf.tracks[0].len(), 2);

        let reparsed = parse(&smf_bytes).unwrap();
        let again = serialize(&reparsed).unwrap();
        assert_eq!(Smf::parse(&again).unwrap().tracks[0].len(), 2);
    }

    #[test]
    fn pitch_bend_round_trip() {
        let stream = Stream::new(
            480,
            vec![Track::new(vec![Event::new(
                10,
                EventKind::Control {
                    channel: 3,
                    message: ControlMessage::PitchBend { value: 12_000 },
                },
            )])],
        )
        .unwrap();

        let reparsed = parse(&serialize(&stream).unwrap()).unwrap();
        assert_eq!(reparsed.tracks()[0].events[0], stream.tracks()[0].events[0]);
    }

    fn single_event_stream(event: Event) -> Stream {
        Stream::new(480, vec![Track::new(vec![event])]).unwrap()
    }

    #[test]
    fn oversized_delta_rejected() {
        let stream = single_event_stream(Event::new(
            0x1000_0000,
            EventKind::NoteOn {
                channel: 0,
                pitch: 60,
                velocity: 90,
            },
        ));
        let err = serialize(&stream).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidStream(_)));
        assert!(err.to_string().contains("delta"));
    }

    #[test]
    fn largest_delta_round_trips() {
        let stream = single_event_stream(Event::new(
            0x0FFF_FFFF,
            EventKind::NoteOn {
                channel: 0,
                pitch: 60,
                velocity: 90,
            },
        ));
        let reparsed = parse(&serialize(&stream).unwrap()).unwrap();
        assert_eq!(reparsed.tracks()[0].events[0], stream.tracks()[0].events[0]);
    }

    #[test]
    fn oversized_tempo_rejected() {
        let stream = single_event_stream(Event::new(
            0,
            EventKind::Tempo {
                micros_per_beat: 0x0100_0001,
            },
        ));
        let err = serialize(&stream).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidStream(_)));
        assert!(err.to_string().contains("tempo"));
    }

    #[test]
    fn largest_tempo_round_trips() {
        let stream = single_event_stream(Event::new(
            0,
            EventKind::Tempo {
                micros_per_beat: 0x00FF_FFFF,
            },
        ));
        let reparsed = parse(&serialize(&stream).unwrap()).unwrap();
        assert_eq!(reparsed.tracks()[0].events[0], stream.tracks()[0].events[0]);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = parse(b"not a midi file").unwrap_err();
        assert!(matches!(err, crate::Error::MidiParse(_)));
    }

    #[test]
    fn zero_ppq_is_invalid_stream() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"MThd");
        buf.extend_from_slice(&6u32.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(b"MTrk");
        buf.extend_from_slice(&4u32.to_be_bytes());
        buf.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);

        let err = parse(&buf).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidStream(_)));
    }

    #[test]
    fn vlq_encoding() {
        let mut buf = Vec::new();
        write_vlq(&mut buf, 0);
        assert_eq!(buf, vec![0x00]);

        buf.clear();
        write_vlq(&mut buf, 127);
        assert_eq!(buf, vec![0x7F]);

        buf.clear();
        write_vlq(&mut buf, 128);
        assert_eq!(buf, vec![0x81, 0x00]);

        buf.clear();
        write_vlq(&mut buf, 480);
        assert_eq!(buf, vec![0x83, 0x60]);
    }
}
