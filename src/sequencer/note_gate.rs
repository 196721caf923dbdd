// Note gate - per-step rest/hold/retrigger/slide decisions
//
// Monophonic: at most one note is held at any time, and at most one deferred
// release is pending. Every evaluation starts by cancelling that release, so a
// timer left over from the previous step can never cut a note that the
// current step keeps sounding.

use super::scheduler::{DeferredAction, DeferredQueue, TaskHandle};
use super::step::Step;
use crate::midi::event::CC_PORTAMENTO;
use crate::midi::sink::OutputSink;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

pub const DEFAULT_GATE_FRACTION: f64 = 0.85;
const GLIDE_ON: u8 = 127;
const GLIDE_OFF: u8 = 0;

/// Inclusive velocity range a trigger draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VelocityRange {
    pub min: u8,
    pub max: u8,
}

impl VelocityRange {
    /// Accented notes: upper range
    pub const ACCENT: VelocityRange = VelocityRange { min: 100, max: 127 };
    /// Unaccented notes: lower range
    pub const NORMAL: VelocityRange = VelocityRange { min: 1, max: 98 };

    /// Build a range inside 1..=127, swapping bounds if needed
    pub fn new(a: u8, b: u8) -> Self {
        let a = a.clamp(1, 127);
        let b = b.clamp(1, 127);
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn contains(&self, velocity: u8) -> bool {
        (self.min..=self.max).contains(&velocity)
    }

    fn sample(&self, rng: &mut impl Rng) -> u8 {
        let range = Self::new(self.min, self.max);
        rng.gen_range(range.min..=range.max)
    }
}

/// Gate length and humanized velocity ranges
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GateSettings {
    /// Fraction of the step a triggered note sounds before release
    pub gate_fraction: f64,
    pub accent_velocity: VelocityRange,
    pub normal_velocity: VelocityRange,
}

impl GateSettings {
    pub fn sanitize(&mut self) {
        self.gate_fraction = if self.gate_fraction.is_finite() {
            self.gate_fraction.clamp(0.05, 1.0)
        } else {
            DEFAULT_GATE_FRACTION
        };
        self.accent_velocity =
            VelocityRange::new(self.accent_velocity.min, self.accent_velocity.max);
        self.normal_velocity =
            VelocityRange::new(self.normal_velocity.min, self.normal_velocity.max);
    }
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            gate_fraction: DEFAULT_GATE_FRACTION,
            accent_velocity: VelocityRange::ACCENT,
            normal_velocity: VelocityRange::NORMAL,
        }
    }
}

/// (base_octave + octave_offset + 1) * 12 + pitch class, clamped to 0..=127
pub fn midi_note(base_octave: u8, step: &Step) -> u8 {
    let octave = base_octave as i32 + step.octave_offset as i32 + 1;
    (octave * 12 + step.pitch_class.index() as i32).clamp(0, 127) as u8
}

/// What one evaluation decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Inactive step, nothing sounding
    Rest,
    /// Inactive untied step cut the held note
    Release { note: u8 },
    /// Tied step: the held note keeps sounding untouched
    Hold { note: u8 },
    /// New note-on
    Trigger {
        note: u8,
        velocity: u8,
        slide: bool,
        /// False when the next step is tied and the note bridges into it
        release_scheduled: bool,
    },
}

/// Everything the gate reads for one step, by value
#[derive(Debug, Clone, Copy)]
pub struct StepContext {
    pub step: Step,
    /// Step that plays after this one (one step look-ahead only)
    pub next_step: Option<Step>,
    pub base_octave: u8,
    /// Instant the step started (clock anchor, not wake-up time)
    pub tick_at: Instant,
    pub step_duration: Duration,
}

pub struct NoteGate {
    settings: GateSettings,
    held_note: Option<u8>,
    pending_release: Option<TaskHandle>,
    rng: StdRng,
}

impl NoteGate {
    pub fn new(settings: GateSettings) -> Self {
        Self::with_rng(settings, StdRng::from_entropy())
    }

    /// Deterministic velocity humanization
    pub fn with_seed(settings: GateSettings, seed: u64) -> Self {
        Self::with_rng(settings, StdRng::seed_from_u64(seed))
    }

    fn with_rng(mut settings: GateSettings, rng: StdRng) -> Self {
        settings.sanitize();
        Self {
            settings,
            held_note: None,
            pending_release: None,
            rng,
        }
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, mut settings: GateSettings) {
        settings.sanitize();
        self.settings = settings;
    }

    pub fn held_note(&self) -> Option<u8> {
        self.held_note
    }

    pub fn has_pending_release(&self) -> bool {
        self.pending_release.is_some()
    }

    /// Cancel the deferred release left by the previous evaluation
    pub fn cancel_pending(&mut self, queue: &mut DeferredQueue) {
        if let Some(handle) = self.pending_release.take() {
            queue.cancel(handle);
        }
    }

    /// Evaluate one step: cancel, decide, emit, then schedule the release.
    pub fn evaluate<S: OutputSink + ?Sized>(
        &mut self,
        ctx: &StepContext,
        queue: &mut DeferredQueue,
        sink: &mut S,
    ) -> GateDecision {
        self.cancel_pending(queue);
        let step = ctx.step;

        if !step.active {
            return match self.held_note {
                // A tied rest carries the held note through silently
                Some(note) if step.tie => GateDecision::Hold { note },
                Some(note) => {
                    self.held_note = None;
                    sink.note_off(note);
                    GateDecision::Release { note }
                }
                None => GateDecision::Rest,
            };
        }

        if step.tie {
            if let Some(note) = self.held_note {
                return GateDecision::Hold { note };
            }
        }

        let note = midi_note(ctx.base_octave, &step);
        let range = if step.accent {
            self.settings.accent_velocity
        } else {
            self.settings.normal_velocity
        };
        let velocity = range.sample(&mut self.rng);

        sink.control_change(CC_PORTAMENTO, if step.slide { GLIDE_ON } else { GLIDE_OFF });
        match self.held_note.take() {
            // Overlap so the synth glides from the old pitch
            Some(previous) if step.slide && previous != note => {
                sink.note_on(note, velocity);
                sink.note_off(previous);
            }
            Some(previous) => {
                sink.note_off(previous);
                sink.note_on(note, velocity);
            }
            None => sink.note_on(note, velocity),
        }
        self.held_note = Some(note);

        let bridges = ctx.next_step.is_some_and(|next| next.tie);
        if !bridges {
            let gate = ctx.step_duration.mul_f64(self.settings.gate_fraction);
            let handle = queue.schedule(ctx.tick_at + gate, DeferredAction::NoteOff { note });
            self.pending_release = Some(handle);
        }

        GateDecision::Trigger {
            note,
            velocity,
            slide: step.slide,
            release_scheduled: !bridges,
        }
    }

    /// Run a deferred action popped from the queue
    pub fn on_deferred<S: OutputSink + ?Sized>(
        &mut self,
        handle: TaskHandle,
        action: DeferredAction,
        sink: &mut S,
    ) {
        if self.pending_release == Some(handle) {
            self.pending_release = None;
        }
        match action {
            DeferredAction::NoteOff { note } => {
                if self.held_note == Some(note) {
                    self.held_note = None;
                    sink.note_off(note);
                }
            }
        }
    }

    /// Silence everything: cancel the pending release, release the held
    /// note, and put the glide control back to neutral.
    pub fn release_all<S: OutputSink + ?Sized>(&mut self, queue: &mut DeferredQueue, sink: &mut S) {
        self.cancel_pending(queue);
        if let Some(note) = self.held_note.take() {
            sink.note_off(note);
        }
        sink.control_change(CC_PORTAMENTO, GLIDE_OFF);
    }
}
