// Output sink - where the engine sends its MIDI
//
// Every emission is fire-and-forget: a sink that cannot deliver records the
// failure on its own connectivity status and returns normally.

use super::event::{MidiEvent, pitch_bend_from_normalized};

pub trait OutputSink {
    fn note_on(&mut self, note: u8, velocity: u8);
    fn note_off(&mut self, note: u8);
    fn control_change(&mut self, controller: u8, value: u8);
    /// Normalized bend in [-1, 1], 0 = center
    fn pitch_bend(&mut self, value: f32);
    /// Panic: all-notes-off controller plus pitch bend reset
    fn all_notes_off(&mut self);
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    fn note_on(&mut self, note: u8, velocity: u8) {
        (**self).note_on(note, velocity)
    }

    fn note_off(&mut self, note: u8) {
        (**self).note_off(note)
    }

    fn control_change(&mut self, controller: u8, value: u8) {
        (**self).control_change(controller, value)
    }

    fn pitch_bend(&mut self, value: f32) {
        (**self).pitch_bend(value)
    }

    fn all_notes_off(&mut self) {
        (**self).all_notes_off()
    }
}

impl<S: OutputSink + ?Sized> OutputSink for Box<S> {
    fn note_on(&mut self, note: u8, velocity: u8) {
        (**self).note_on(note, velocity)
    }

    fn note_off(&mut self, note: u8) {
        (**self).note_off(note)
    }

    fn control_change(&mut self, controller: u8, value: u8) {
        (**self).control_change(controller, value)
    }

    fn pitch_bend(&mut self, value: f32) {
        (**self).pitch_bend(value)
    }

    fn all_notes_off(&mut self) {
        (**self).all_notes_off()
    }
}

/// In-memory sink that keeps every emitted event in order.
///
/// Used for dry runs and for asserting engine output in tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    events: Vec<MidiEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[MidiEvent] {
        &self.events
    }

    /// Take the recorded events, leaving the sink empty
    pub fn drain(&mut self) -> Vec<MidiEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn note_ons(&self) -> Vec<(u8, u8)> {
        self.events
            .iter()
            .filter_map(|e| match *e {
                MidiEvent::NoteOn { note, velocity } => Some((note, velocity)),
                _ => None,
            })
            .collect()
    }

    pub fn note_offs(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match *e {
                MidiEvent::NoteOff { note } => Some(note),
                _ => None,
            })
            .collect()
    }

    /// Values sent on one controller, in order
    pub fn controller_values(&self, controller: u8) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match *e {
                MidiEvent::ControlChange { controller: c, value } if c == controller => {
                    Some(value)
                }
                _ => None,
            })
            .collect()
    }

    pub fn all_notes_off_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, MidiEvent::AllNotesOff))
            .count()
    }
}

impl OutputSink for RecordingSink {
    fn note_on(&mut self, note: u8, velocity: u8) {
        self.events.push(MidiEvent::note_on(note, velocity));
    }

    fn note_off(&mut self, note: u8) {
        self.events.push(MidiEvent::note_off(note));
    }

    fn control_change(&mut self, controller: u8, value: u8) {
        self.events.push(MidiEvent::control_change(controller, value));
    }

    fn pitch_bend(&mut self, value: f32) {
        self.events.push(MidiEvent::PitchBend {
            value: pitch_bend_from_normalized(value),
        });
    }

    fn all_notes_off(&mut self) {
        self.events.push(MidiEvent::AllNotesOff);
    }
}

/// Sink that writes every event to the log instead of a device
#[derive(Debug, Default)]
pub struct LogSink;

impl OutputSink for LogSink {
    fn note_on(&mut self, note: u8, velocity: u8) {
        log::info!("note on  {:3} vel {:3}", note, velocity);
    }

    fn note_off(&mut self, note: u8) {
        log::info!("note off {:3}", note);
    }

    fn control_change(&mut self, controller: u8, value: u8) {
        log::debug!("cc {:3} = {:3}", controller, value);
    }

    fn pitch_bend(&mut self, value: f32) {
        log::debug!("pitch bend {:+.3}", value);
    }

    fn all_notes_off(&mut self) {
        log::info!("all notes off");
    }
}
