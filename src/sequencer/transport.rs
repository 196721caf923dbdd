// Transport - play/stop orchestration of step clock, note gate and modulation
//
// The transport owns all engine state. Callers pass the current instant and an
// immutable pattern snapshot into every call; nothing here reads a clock or
// shares mutable state with the pattern editor.

use super::clock::TimingClock;
use super::modulation::{ModulationBank, ModulationEngine};
use super::note_gate::{GateDecision, GateSettings, NoteGate, StepContext};
use super::scheduler::DeferredQueue;
use super::step::{Sequence, Step};
use super::timeline::{Tempo, TransportConfig};
use crate::midi::sink::OutputSink;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::time::Instant;

/// Transport state (play/stop)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
}

impl TransportState {
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, TransportState::Stopped)
    }
}

/// Everything the engine reads from the pattern store, by value
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct PatternSnapshot {
    pub config: TransportConfig,
    pub sequence: Sequence,
    pub modulation: ModulationBank,
}

/// Observable copy of the engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatus {
    pub state: TransportState,
    pub current_step: usize,
    pub held_note: Option<u8>,
    pub pending_actions: usize,
    pub last_tick: Option<Instant>,
    pub tempo: Tempo,
}

/// Shared playback state for observers on other threads
#[derive(Debug)]
pub struct SharedTransportState {
    playing: AtomicBool,
    current_step: AtomicUsize,
    tempo_bpm: AtomicU16,
}

impl SharedTransportState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> TransportState {
        if self.playing.load(Ordering::Relaxed) {
            TransportState::Playing
        } else {
            TransportState::Stopped
        }
    }

    pub fn current_step(&self) -> usize {
        self.current_step.load(Ordering::Relaxed)
    }

    pub fn tempo_bpm(&self) -> u16 {
        self.tempo_bpm.load(Ordering::Relaxed)
    }

    /// Publish the engine status (called by the playback thread)
    pub fn publish(&self, status: &EngineStatus) {
        self.playing
            .store(status.state.is_playing(), Ordering::Relaxed);
        self.current_step
            .store(status.current_step, Ordering::Relaxed);
        self.tempo_bpm.store(status.tempo.bpm(), Ordering::Relaxed);
    }
}

impl Default for SharedTransportState {
    fn default() -> Self {
        Self {
            playing: AtomicBool::new(false),
            current_step: AtomicUsize::new(0),
            tempo_bpm: AtomicU16::new(Tempo::default().bpm()),
        }
    }
}

/// Transport controller
pub struct Transport {
    clock: TimingClock,
    gate: NoteGate,
    modulation: ModulationEngine,
    deferred: DeferredQueue,
    state: TransportState,
    current_step: usize,
    last_tick: Option<Instant>,
}

impl Transport {
    pub fn new(settings: GateSettings) -> Self {
        Self::with_gate(NoteGate::new(settings))
    }

    /// Use a preconfigured gate (e.g. seeded for reproducible velocities)
    pub fn with_gate(gate: NoteGate) -> Self {
        Self {
            clock: TimingClock::default(),
            gate,
            modulation: ModulationEngine::new(),
            deferred: DeferredQueue::new(),
            state: TransportState::Stopped,
            current_step: 0,
            last_tick: None,
        }
    }

    /// Start playback from step 0. Step 0 and the modulation channels are
    /// evaluated right away; later steps follow the step clock. Returns false
    /// if already playing.
    pub fn play<S: OutputSink + ?Sized>(
        &mut self,
        now: Instant,
        snapshot: &PatternSnapshot,
        sink: &mut S,
    ) -> bool {
        if self.state.is_playing() {
            return false;
        }

        self.current_step = 0;
        self.state = TransportState::Playing;
        self.clock.start(snapshot.config.tempo, now);
        self.modulation.reset_timing();
        log::info!("transport: play at {}", snapshot.config.tempo);

        self.last_tick = Some(now);
        self.evaluate_step(now, snapshot, sink);
        self.modulation.tick(now, &snapshot.modulation, sink);
        true
    }

    /// Stop playback: cancel the clock and any pending release, release the
    /// held note, reset glide and send one all-notes-off.
    pub fn stop<S: OutputSink + ?Sized>(&mut self, sink: &mut S) {
        self.clock.stop();
        self.gate.release_all(&mut self.deferred, sink);
        self.deferred.clear();
        sink.all_notes_off();

        if self.state.is_playing() {
            log::info!("transport: stop");
        }
        self.state = TransportState::Stopped;
        self.current_step = 0;
        self.last_tick = None;
    }

    /// Drive the step clock and deferred releases up to `now`.
    ///
    /// The snapshot is the only source of tempo: a changed tempo reschedules
    /// the pending tick, and a stopped transport still picks it up so the
    /// reported status stays current. Releases due before the new step start
    /// fire first; the step is then evaluated at its anchored tick instant.
    /// Returns the gate decision if a step was played.
    pub fn poll<S: OutputSink + ?Sized>(
        &mut self,
        now: Instant,
        snapshot: &PatternSnapshot,
        sink: &mut S,
    ) -> Option<GateDecision> {
        self.clock.set_tempo(snapshot.config.tempo, now);
        if !self.state.is_playing() {
            return None;
        }

        let mut decision = None;
        if let Some(tick_at) = self.clock.poll(now) {
            self.fire_deferred(tick_at, sink);
            let length = snapshot.sequence.len().max(1);
            self.current_step = (self.current_step + 1) % length;
            self.last_tick = Some(tick_at);
            decision = Some(self.evaluate_step(tick_at, snapshot, sink));
        }
        self.fire_deferred(now, sink);
        decision
    }

    /// Advance the modulation channels (only while playing)
    pub fn tick_modulation<S: OutputSink + ?Sized>(
        &mut self,
        now: Instant,
        bank: &ModulationBank,
        sink: &mut S,
    ) -> usize {
        if !self.state.is_playing() {
            return 0;
        }
        self.modulation.tick(now, bank, sink)
    }

    fn evaluate_step<S: OutputSink + ?Sized>(
        &mut self,
        tick_at: Instant,
        snapshot: &PatternSnapshot,
        sink: &mut S,
    ) -> GateDecision {
        let sequence = &snapshot.sequence;
        if !sequence.is_empty() {
            self.current_step %= sequence.len();
        }

        let ctx = StepContext {
            step: sequence.step(self.current_step).unwrap_or_else(Step::rest),
            next_step: sequence.next_step(self.current_step),
            base_octave: snapshot.config.base_octave,
            tick_at,
            step_duration: self.clock.period(),
        };
        let decision = self.gate.evaluate(&ctx, &mut self.deferred, sink);
        log::debug!("step {:2}: {:?}", self.current_step, decision);
        decision
    }

    fn fire_deferred<S: OutputSink + ?Sized>(&mut self, until: Instant, sink: &mut S) {
        while let Some((handle, action)) = self.deferred.pop_due(until) {
            self.gate.on_deferred(handle, action, sink);
        }
    }

    /// Earliest instant anything is due (next step or deferred release)
    pub fn next_deadline(&self) -> Option<Instant> {
        if !self.state.is_playing() {
            return None;
        }
        match (self.clock.next_tick(), self.deferred.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn held_note(&self) -> Option<u8> {
        self.gate.held_note()
    }

    /// Deferred actions still waiting to fire
    pub fn pending_actions(&self) -> usize {
        self.deferred.len()
    }

    pub fn tempo(&self) -> Tempo {
        self.clock.tempo()
    }

    pub fn modulation(&self) -> &ModulationEngine {
        &self.modulation
    }

    pub fn gate_settings(&self) -> &GateSettings {
        self.gate.settings()
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            state: self.state,
            current_step: self.current_step,
            held_note: self.gate.held_note(),
            pending_actions: self.deferred.len(),
            last_tick: self.last_tick,
            tempo: self.clock.tempo(),
        }
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(GateSettings::default())
    }
}
