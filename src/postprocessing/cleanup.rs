//! Passes that tidy the raw timeline before it is written out.
//!
//! Every pass walks the events once, pairing each offset with the open onset
//! of its note. Removed pairs are tombstoned in a rebuilt list and compacted
//! at the end of the pass, so no stored index ever needs shifting.

use crate::config::{CleanupConfig, NotePass};
use crate::constants::NOTE_COUNT;

use super::note_events::{NoteEvent, Timeline};

/// Counts from one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub removed_pairs: usize,
    pub orphan_offsets: usize,
    pub inserted_offsets: usize,
    /// Notes with no offset when the pass finished.
    pub still_open: usize,
}

/// The onsets sounding at a given point of a pass.
struct OpenNotes<'a> {
    events: &'a [Option<NoteEvent>],
    open: &'a [Option<usize>; NOTE_COUNT],
}

impl OpenNotes<'_> {
    fn onset(&self, note: u8) -> Option<&NoteEvent> {
        self.open
            .get(note as usize)
            .copied()
            .flatten()
            .and_then(|index| self.events[index].as_ref())
    }
}

/// Decides which on/off pairs a pass removes.
trait PairFilter {
    /// An onset is about to open; `open` holds the other sounding notes.
    fn opened(&mut self, _onset: &NoteEvent, _open: &OpenNotes) {}

    /// Whether the pair opened by `onset` and closed at `off_step` goes.
    fn remove(&mut self, onset: &NoteEvent, off_step: u32) -> bool;
}

struct KeepAll;

impl PairFilter for KeepAll {
    fn remove(&mut self, _onset: &NoteEvent, _off_step: u32) -> bool {
        false
    }
}

struct ShortNotes(NotePass);

impl PairFilter for ShortNotes {
    fn remove(&mut self, onset: &NoteEvent, off_step: u32) -> bool {
        off_step.saturating_sub(onset.step) <= self.0.duration && onset.velocity <= self.0.velocity
    }
}

struct LongNotes(NotePass);

impl PairFilter for LongNotes {
    fn remove(&mut self, onset: &NoteEvent, off_step: u32) -> bool {
        off_step.saturating_sub(onset.step) >= self.0.duration && onset.velocity <= self.0.velocity
    }
}

/// Flags a note whose onset lands while the note an octave below is
/// sounding at least as loud.
struct Octaves {
    flagged: [bool; NOTE_COUNT],
}

impl PairFilter for Octaves {
    fn opened(&mut self, onset: &NoteEvent, open: &OpenNotes) {
        let below = onset.note.checked_sub(12).and_then(|note| open.onset(note));
        self.flagged[onset.note as usize] = below.is_some_and(|lower| lower.velocity >= onset.velocity);
    }

    fn remove(&mut self, onset: &NoteEvent, _off_step: u32) -> bool {
        self.flagged[onset.note as usize]
    }
}

fn close_pair<F: PairFilter>(
    events: &mut [Option<NoteEvent>],
    on_index: usize,
    off_index: usize,
    off_step: u32,
    filter: &mut F,
    stats: &mut PassStats,
) {
    let Some(onset) = events[on_index] else {
        return;
    };
    if filter.remove(&onset, off_step) {
        events[on_index] = None;
        events[off_index] = None;
        stats.removed_pairs += 1;
    }
}

impl Timeline {
    /// One pairing walk. Returns the stats and the notes left sounding.
    fn rebuild<F: PairFilter>(&mut self, filter: &mut F) -> (PassStats, Vec<u8>) {
        let mut stats = PassStats::default();
        let mut rebuilt: Vec<Option<NoteEvent>> = Vec::with_capacity(self.len());
        let mut open: [Option<usize>; NOTE_COUNT] = [None; NOTE_COUNT];

        for &event in self.events() {
            let note = event.note as usize;
            if event.is_onset {
                if let Some(on_index) = open[note].take() {
                    rebuilt.push(Some(NoteEvent::offset(event.step, event.note)));
                    stats.inserted_offsets += 1;
                    let off_index = rebuilt.len() - 1;
                    close_pair(&mut rebuilt, on_index, off_index, event.step, filter, &mut stats);
                }
                filter.opened(&event, &OpenNotes { events: &rebuilt, open: &open });
                rebuilt.push(Some(event));
                open[note] = Some(rebuilt.len() - 1);
            } else {
                match open[note].take() {
                    None => stats.orphan_offsets += 1,
                    Some(on_index) => {
                        rebuilt.push(Some(event));
                        let off_index = rebuilt.len() - 1;
                        close_pair(&mut rebuilt, on_index, off_index, event.step, filter, &mut stats);
                    }
                }
            }
        }

        let still_open: Vec<u8> = (0..NOTE_COUNT)
            .filter(|&note| open[note].is_some())
            .map(|note| note as u8)
            .collect();
        stats.still_open = still_open.len();

        self.replace(rebuilt.into_iter().flatten().collect());
        (stats, still_open)
    }

    /// Drop orphan offsets, close notes that are re-struck while sounding,
    /// and close every note still sounding one step after the last step.
    pub fn regulate(&mut self) -> PassStats {
        let (stats, still_open) = self.rebuild(&mut KeepAll);
        if let Some(last_step) = self.last_step() {
            for note in still_open {
                self.push(NoteEvent::offset(last_step + 1, note));
            }
        }
        log::debug!("regulate: {:?}", stats);
        stats
    }

    /// Remove pairs lasting at most `duration` steps with onset velocity at
    /// most `velocity`.
    pub fn remove_short_notes(&mut self, duration: u32, velocity: u8) -> PassStats {
        let (stats, _) = self.rebuild(&mut ShortNotes(NotePass { duration, velocity }));
        log::debug!("remove short notes ({}, {}): {:?}", duration, velocity, stats);
        stats
    }

    /// Remove pairs lasting at least `duration` steps with onset velocity at
    /// most `velocity`.
    pub fn remove_long_notes(&mut self, duration: u32, velocity: u8) -> PassStats {
        let (stats, _) = self.rebuild(&mut LongNotes(NotePass { duration, velocity }));
        log::debug!("remove long notes ({}, {}): {:?}", duration, velocity, stats);
        stats
    }

    /// Remove notes struck while the note an octave below sounds at least as
    /// loud.
    pub fn remove_octaves(&mut self) -> PassStats {
        let (stats, _) = self.rebuild(&mut Octaves { flagged: [false; NOTE_COUNT] });
        log::debug!("remove octaves: {:?}", stats);
        stats
    }

    /// The full cleanup chain: regulate, short-note passes, the optional
    /// long-note pass, octave removal.
    pub fn clean_up(&mut self, config: &CleanupConfig) {
        let before = self.len();
        self.regulate();
        for pass in &config.short_notes {
            self.remove_short_notes(pass.duration, pass.velocity);
        }
        if let Some(pass) = config.long_notes {
            self.remove_long_notes(pass.duration, pass.velocity);
        }
        if config.remove_octaves {
            self.remove_octaves();
        }
        log::debug!("cleanup: {} events -> {}", before, self.len());
    }
}
