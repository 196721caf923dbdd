// Step pattern data - pitch, octave and articulation per sixteenth

use std::fmt;

pub const DEFAULT_SEQUENCE_LENGTH: usize = 16;

/// The twelve semitone names of an octave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum PitchClass {
    #[default]
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Semitone index within the octave (C = 0 .. B = 11)
    pub fn index(&self) -> u8 {
        *self as u8
    }

    pub fn from_index(index: u8) -> Self {
        Self::ALL[(index % 12) as usize]
    }

    pub fn name(&self) -> &'static str {
        const NAMES: [&str; 12] = [
            "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
        ];
        NAMES[self.index() as usize]
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One pulse of the pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Step {
    pub pitch_class: PitchClass,
    /// -1, 0 or +1 octave relative to the base octave
    pub octave_offset: i8,
    pub accent: bool,
    pub slide: bool,
    pub tie: bool,
    pub active: bool,
}

impl Step {
    /// An active, unaccented note
    pub fn note(pitch_class: PitchClass) -> Self {
        Self {
            pitch_class,
            active: true,
            ..Self::rest()
        }
    }

    /// An inactive step
    pub fn rest() -> Self {
        Self {
            pitch_class: PitchClass::C,
            octave_offset: 0,
            accent: false,
            slide: false,
            tie: false,
            active: false,
        }
    }

    pub fn with_octave(mut self, octave_offset: i8) -> Self {
        self.octave_offset = octave_offset.clamp(-1, 1);
        self
    }

    pub fn with_accent(mut self) -> Self {
        self.accent = true;
        self
    }

    pub fn with_slide(mut self) -> Self {
        self.slide = true;
        self
    }

    pub fn with_tie(mut self) -> Self {
        self.tie = true;
        self
    }

    /// Clamp values that arrived from outside (files, editors)
    pub fn sanitize(&mut self) {
        self.octave_offset = self.octave_offset.clamp(-1, 1);
    }
}

impl Default for Step {
    fn default() -> Self {
        Self::rest()
    }
}

/// Fixed-length cyclic list of steps
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Sequence {
    steps: Vec<Step>,
}

impl Sequence {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// `length` inactive steps
    pub fn empty(length: usize) -> Self {
        Self {
            steps: vec![Step::rest(); length],
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step at `index`, wrapping modulo the length
    pub fn step(&self, index: usize) -> Option<Step> {
        if self.steps.is_empty() {
            None
        } else {
            Some(self.steps[index % self.steps.len()])
        }
    }

    /// The step played after `index`, wrapping at the end
    pub fn next_step(&self, index: usize) -> Option<Step> {
        self.step(index.wrapping_add(1))
    }

    pub fn set_step(&mut self, index: usize, step: Step) {
        if let Some(slot) = self.steps.get_mut(index) {
            *slot = step;
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn sanitize(&mut self) {
        self.steps.iter_mut().for_each(Step::sanitize);
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::empty(DEFAULT_SEQUENCE_LENGTH)
    }
}

impl From<Vec<Step>> for Sequence {
    fn from(steps: Vec<Step>) -> Self {
        Self::new(steps)
    }
}
