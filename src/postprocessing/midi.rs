use midly::num::{u15, u24, u28, u7};
use midly::Format;
use midly::Header;
use midly::MetaMessage;
use midly::MidiMessage;
use midly::Smf;
use midly::Timing;
use midly::Track;
use midly::TrackEvent;
use midly::TrackEventKind;

use crate::constants::TEMPO_MICROS_PER_QUARTER;
use crate::error::{Result, TranscribeError};

use super::note_events::Timeline;

/// Largest tick a track event can sit at.
const MAX_TICK: u32 = (1 << 28) - 1;
const MAX_DIVISION: u16 = 0x7FFF;

#[derive(Debug, Clone)]
struct TrackEventAbsolute<'a> {
    tick: u32,
    kind: TrackEventKind<'a>,
}

/// Ticks per quarter note that make one step last one tick at 120 bpm.
///
/// # Arguments
///
/// * `sample_rate` - Sample rate of the analysed audio.
/// * `hop_size` - Samples per step.
///
/// # Returns
///
/// * `round(0.5 * sample_rate / hop_size)`, kept inside what an SMF header can hold.
pub fn division_for(sample_rate: u32, hop_size: usize) -> u16 {
    let division = (0.5 * sample_rate as f64 / hop_size as f64).round();
    division.clamp(1.0, MAX_DIVISION as f64) as u16
}

/// Convert the timeline into delta-timed track events, one tick per step.
pub fn generate_ordered_midi_events(timeline: &Timeline) -> Result<Vec<TrackEvent<'static>>> {
    let mut track_events_absolute: Vec<TrackEventAbsolute> = Vec::with_capacity(timeline.len());
    for event in timeline.events() {
        if event.step > MAX_TICK {
            return Err(TranscribeError::TooManyFrames(event.step as usize));
        }

        let key = u7::new(event.note);
        let message = if event.is_onset {
            MidiMessage::NoteOn { key, vel: u7::new(event.velocity) }
        } else {
            MidiMessage::NoteOff { key, vel: u7::new(0) }
        };
        track_events_absolute.push(TrackEventAbsolute {
            tick: event.step,
            kind: TrackEventKind::Midi { channel: 0.into(), message },
        });
    }

    // Stable, so an offset stays ahead of a re-strike at the same step.
    track_events_absolute.sort_by_key(|event| event.tick);

    let mut track_events = Vec::with_capacity(track_events_absolute.len());
    let mut previous_tick = 0;
    for event in track_events_absolute {
        track_events.push(TrackEvent {
            delta: u28::new(event.tick - previous_tick),
            kind: event.kind,
        });
        previous_tick = event.tick;
    }

    Ok(track_events)
}

/// Generate MIDI file data from a note timeline.
///
/// # Arguments
///
/// * `timeline` - Cleaned note events.
/// * `division` - Ticks per quarter note, see [`division_for`].
///
/// # Returns
///
/// * The bytes of a single-track Standard MIDI File.
pub fn generate_midi_file_data(timeline: &Timeline, division: u16) -> Result<Vec<u8>> {
    let timing = Timing::Metrical(u15::new(division));

    let mut smf = Smf::new(Header {
        format: Format::SingleTrack,
        timing,
    });
    let mut track = Track::new();

    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(TEMPO_MICROS_PER_QUARTER))),
    });

    track.extend(generate_ordered_midi_events(timeline)?);

    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    smf.tracks.push(track);

    let mut buffer = Vec::new();
    smf.write_std(&mut buffer)
        .map_err(|e| TranscribeError::Midi(e.to_string()))?;

    Ok(buffer)
}
