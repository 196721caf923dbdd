// MIDI event types and wire framing

use std::fmt;

/// Portamento (glide) on/off controller used for slides
pub const CC_PORTAMENTO: u8 = 102;
/// Channel mode message: all notes off
pub const CC_ALL_NOTES_OFF: u8 = 123;
/// 14-bit pitch bend center
pub const PITCH_BEND_CENTER: i16 = 8192;
const PITCH_BEND_MAX: i16 = 16383;

/// MIDI channel, 1-based as users see it (1..=16)
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct MidiChannel(u8);

impl MidiChannel {
    /// Create a channel, clamped to 1..=16
    pub fn new(channel: u8) -> Self {
        Self(channel.clamp(1, 16))
    }

    /// 1-based channel number
    pub fn number(&self) -> u8 {
        self.0
    }

    /// Low nibble of the status byte
    pub fn nibble(&self) -> u8 {
        self.0 - 1
    }
}

impl Default for MidiChannel {
    fn default() -> Self {
        Self(1)
    }
}

impl From<u8> for MidiChannel {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl From<MidiChannel> for u8 {
    fn from(channel: MidiChannel) -> Self {
        channel.0
    }
}

impl fmt::Display for MidiChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch {}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    ControlChange { controller: u8, value: u8 },
    /// Raw 14-bit value, 8192 = center
    PitchBend { value: i16 },
    AllNotesOff,
}

/// Convert a normalized bend in [-1, 1] to the 14-bit wire value
pub fn pitch_bend_from_normalized(value: f32) -> i16 {
    let value = if value.is_finite() { value.clamp(-1.0, 1.0) } else { 0.0 };
    let raw = PITCH_BEND_CENTER as f32 + value * PITCH_BEND_CENTER as f32;
    (raw.round() as i16).clamp(0, PITCH_BEND_MAX)
}

impl MidiEvent {
    /// Build a note-on, clamping note and velocity to 7 bits
    pub fn note_on(note: u8, velocity: u8) -> Self {
        MidiEvent::NoteOn {
            note: note.min(127),
            velocity: velocity.min(127),
        }
    }

    pub fn note_off(note: u8) -> Self {
        MidiEvent::NoteOff { note: note.min(127) }
    }

    pub fn control_change(controller: u8, value: u8) -> Self {
        MidiEvent::ControlChange {
            controller: controller.min(127),
            value: value.min(127),
        }
    }

    /// Encode as a 3-byte channel voice message
    pub fn to_bytes(&self, channel: MidiChannel) -> [u8; 3] {
        let ch = channel.nibble();
        match *self {
            MidiEvent::NoteOn { note, velocity } => [0x90 | ch, note & 0x7F, velocity & 0x7F],
            MidiEvent::NoteOff { note } => [0x80 | ch, note & 0x7F, 0],
            MidiEvent::ControlChange { controller, value } => {
                [0xB0 | ch, controller & 0x7F, value & 0x7F]
            }
            MidiEvent::PitchBend { value } => {
                let value = value.clamp(0, PITCH_BEND_MAX) as u16;
                [0xE0 | ch, (value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8]
            }
            MidiEvent::AllNotesOff => [0xB0 | ch, CC_ALL_NOTES_OFF, 0],
        }
    }

    /// Parse a raw MIDI message (channel nibble is ignored)
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 3 {
            return None;
        }

        let status = bytes[0];
        match status & 0xF0 {
            0x90 => {
                // Velocity 0 = Note Off
                if bytes[2] == 0 {
                    Some(MidiEvent::NoteOff { note: bytes[1] })
                } else {
                    Some(MidiEvent::NoteOn {
                        note: bytes[1],
                        velocity: bytes[2],
                    })
                }
            }
            0x80 => Some(MidiEvent::NoteOff { note: bytes[1] }),
            0xB0 if bytes[1] == CC_ALL_NOTES_OFF => Some(MidiEvent::AllNotesOff),
            0xB0 => Some(MidiEvent::ControlChange {
                controller: bytes[1],
                value: bytes[2],
            }),
            0xE0 => {
                let lsb = bytes[1] as i16;
                let msb = bytes[2] as i16;
                Some(MidiEvent::PitchBend {
                    value: (msb << 7) | lsb,
                })
            }
            _ => None,
        }
    }
}
