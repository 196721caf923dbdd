// Timeline - tempo and step durations
// One step is a sixteenth note: four steps per beat

use std::fmt;
use std::time::Duration;

pub const MIN_BPM: u16 = 30;
pub const MAX_BPM: u16 = 300;
pub const MIN_BASE_OCTAVE: u8 = 1;
pub const MAX_BASE_OCTAVE: u8 = 6;
pub const STEPS_PER_BEAT: u32 = 4;

/// Tempo in BPM, clamped to [30, 300]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(from = "u16", into = "u16")]
pub struct Tempo {
    bpm: u16,
}

impl Tempo {
    pub fn new(bpm: u16) -> Self {
        Self {
            bpm: bpm.clamp(MIN_BPM, MAX_BPM),
        }
    }

    pub fn bpm(&self) -> u16 {
        self.bpm
    }

    pub fn set_bpm(&mut self, bpm: u16) {
        self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
    }

    /// Duration of one beat in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm as f64
    }

    /// (60000 / bpm) / 4, i.e. 15000 / bpm
    pub fn step_duration_ms(&self) -> f64 {
        self.beat_duration_seconds() * 1000.0 / STEPS_PER_BEAT as f64
    }

    pub fn step_duration(&self) -> Duration {
        Duration::from_secs_f64(self.beat_duration_seconds() / STEPS_PER_BEAT as f64)
    }

    /// Portion of a step a note sounds before release
    pub fn gate_duration(&self, gate_fraction: f64) -> Duration {
        self.step_duration().mul_f64(gate_fraction.clamp(0.0, 1.0))
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(120)
    }
}

impl From<u16> for Tempo {
    fn from(bpm: u16) -> Self {
        Self::new(bpm)
    }
}

impl From<Tempo> for u16 {
    fn from(tempo: Tempo) -> Self {
        tempo.bpm
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} BPM", self.bpm)
    }
}

/// Tempo and base octave shared by the whole pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub tempo: Tempo,
    pub base_octave: u8,
}

impl TransportConfig {
    pub fn new(bpm: u16, base_octave: u8) -> Self {
        Self {
            tempo: Tempo::new(bpm),
            base_octave: base_octave.clamp(MIN_BASE_OCTAVE, MAX_BASE_OCTAVE),
        }
    }

    pub fn set_base_octave(&mut self, base_octave: u8) {
        self.base_octave = base_octave.clamp(MIN_BASE_OCTAVE, MAX_BASE_OCTAVE);
    }

    /// Re-clamp after deserialization
    pub fn sanitize(&mut self) {
        self.base_octave = self.base_octave.clamp(MIN_BASE_OCTAVE, MAX_BASE_OCTAVE);
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new(120, 3)
    }
}
