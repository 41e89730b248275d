use crate::analysis::note_intensity::VelocityVector;
use crate::config::DetectionConfig;
use crate::constants::{NOTE_COUNT, RELEASE_VELOCITY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    /// Frame index the event belongs to, also its MIDI tick.
    pub step: u32,
    pub is_onset: bool,
    pub note: u8,
    pub velocity: u8,
}

impl NoteEvent {
    pub fn onset(step: u32, note: u8, velocity: u8) -> Self {
        Self { step, is_onset: true, note, velocity }
    }

    /// Offsets carry the default release velocity.
    pub fn offset(step: u32, note: u8) -> Self {
        Self { step, is_onset: false, note, velocity: RELEASE_VELOCITY }
    }
}

/// Note events in step order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    events: Vec<NoteEvent>,
    /// Last analysed step, which may lie past the last event.
    last_frame: Option<u32>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[NoteEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The later of the last event and the last analysed frame.
    pub fn last_step(&self) -> Option<u32> {
        let last_event = self.events.last().map(|event| event.step);
        last_event.max(self.last_frame)
    }

    pub fn onsets(&self) -> impl Iterator<Item = &NoteEvent> {
        self.events.iter().filter(|event| event.is_onset)
    }

    pub(crate) fn push(&mut self, event: NoteEvent) -> usize {
        self.events.push(event);
        self.events.len() - 1
    }

    pub(crate) fn set_velocity(&mut self, index: usize, velocity: u8) {
        self.events[index].velocity = velocity;
    }

    pub(crate) fn replace(&mut self, events: Vec<NoteEvent>) {
        self.events = events;
    }
}

impl From<Vec<NoteEvent>> for Timeline {
    fn from(events: Vec<NoteEvent>) -> Self {
        Self { events, last_frame: None }
    }
}

impl IntoIterator for Timeline {
    type Item = NoteEvent;
    type IntoIter = std::vec::IntoIter<NoteEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

/// Velocity levels driving the on/off state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// A silent note turns on above this velocity.
    pub on: u8,
    /// A sounding note turns off at or below this velocity.
    pub off: u8,
    /// Rise over the held onset velocity that restarts a sounding note.
    pub peak: u8,
}

impl From<&DetectionConfig> for Thresholds {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            on: config.on_threshold,
            off: config.off_threshold,
            peak: config.peak_threshold,
        }
    }
}

/// Turns per-frame velocity vectors into onset/offset events.
pub struct NoteTracker {
    timeline: Timeline,
    last_step: Option<u32>,
    /// Index of each sounding note's onset in the timeline.
    open: [Option<usize>; NOTE_COUNT],
    thresholds: Thresholds,
}

impl NoteTracker {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            timeline: Timeline::new(),
            last_step: None,
            open: [None; NOTE_COUNT],
            thresholds,
        }
    }

    /// Feed the velocities of frame `step`.
    pub fn check(&mut self, step: u32, velocity: &VelocityVector) {
        self.last_step = Some(step);
        for (note, &v) in velocity.iter().enumerate() {
            let key = note as u8;
            match self.open[note] {
                None => {
                    if v > self.thresholds.on {
                        self.open[note] = Some(self.timeline.push(NoteEvent::onset(step, key, v)));
                    }
                }
                Some(index) => {
                    let held = self.timeline.events()[index].velocity;
                    if v <= self.thresholds.off {
                        self.timeline.push(NoteEvent::offset(step, key));
                        self.open[note] = None;
                    } else if v as u16 >= held as u16 + self.thresholds.peak as u16 {
                        self.timeline.push(NoteEvent::offset(step, key));
                        self.open[note] = Some(self.timeline.push(NoteEvent::onset(step, key, v)));
                    } else if v > held {
                        self.timeline.set_velocity(index, v);
                    }
                }
            }
        }
    }

    pub fn sounding(&self) -> usize {
        self.open.iter().filter(|index| index.is_some()).count()
    }

    /// The raw timeline. Notes still sounding are left open for regulation to close.
    pub fn finish(mut self) -> Timeline {
        self.timeline.last_frame = self.last_step;
        self.timeline
    }
}
