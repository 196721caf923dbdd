// Modulation engine - free-running LFOs that drive synth controllers
//
// Decoupled from the step clock: each tick measures the real time elapsed
// since the channel's previous tick and advances its phase by that amount,
// so an irregular tick cadence never makes the LFO drift.

use crate::midi::sink::OutputSink;
use std::f64::consts::TAU;
use std::fmt;
use std::time::Instant;

pub const MIN_PERIOD_SECONDS: f64 = 0.1;
pub const MAX_PERIOD_SECONDS: f64 = 100.0;

/// Synth parameter a channel drives, each bound to one controller number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ModulationTarget {
    EnvelopeMod,
    AccentLevel,
    Resonance,
    Cutoff,
    Decay,
}

impl ModulationTarget {
    pub const ALL: [ModulationTarget; 5] = [
        ModulationTarget::EnvelopeMod,
        ModulationTarget::AccentLevel,
        ModulationTarget::Resonance,
        ModulationTarget::Cutoff,
        ModulationTarget::Decay,
    ];

    pub fn controller(&self) -> u8 {
        match self {
            ModulationTarget::EnvelopeMod => 12,
            ModulationTarget::AccentLevel => 16,
            ModulationTarget::Resonance => 71,
            ModulationTarget::Cutoff => 74,
            ModulationTarget::Decay => 75,
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModulationTarget::EnvelopeMod => "env mod",
            ModulationTarget::AccentLevel => "accent",
            ModulationTarget::Resonance => "resonance",
            ModulationTarget::Cutoff => "cutoff",
            ModulationTarget::Decay => "decay",
        }
    }
}

impl fmt::Display for ModulationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (CC {})", self.name(), self.controller())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum OscillatorShape {
    #[default]
    Sine,
    Saw,
    Square,
    Triangle,
}

fn sine(phase: f64) -> f64 {
    (TAU * phase).sin()
}

fn saw(phase: f64) -> f64 {
    phase * 2.0 - 1.0
}

fn square(phase: f64) -> f64 {
    if phase < 0.5 { 1.0 } else { -1.0 }
}

fn triangle(phase: f64) -> f64 {
    if phase < 0.5 {
        phase * 4.0 - 1.0
    } else {
        3.0 - phase * 4.0
    }
}

/// Indexed by `OscillatorShape as usize`
const SHAPE_TABLE: [fn(f64) -> f64; 4] = [sine, saw, square, triangle];

impl OscillatorShape {
    /// Bipolar waveform value in [-1, 1] at `phase` (cycles; only the
    /// fractional part matters)
    pub fn value(&self, phase: f64) -> f64 {
        SHAPE_TABLE[*self as usize](phase.rem_euclid(1.0))
    }
}

/// One LFO configuration
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModulationChannel {
    pub target: ModulationTarget,
    pub enabled: bool,
    pub low: u8,
    pub high: u8,
    /// Seconds per cycle
    pub speed_period_seconds: f64,
    pub shape: OscillatorShape,
}

impl ModulationChannel {
    /// Disabled full-range sine with a 4 second period
    pub fn new(target: ModulationTarget) -> Self {
        Self {
            target,
            enabled: false,
            low: 0,
            high: 127,
            speed_period_seconds: 4.0,
            shape: OscillatorShape::Sine,
        }
    }

    pub fn with_range(mut self, low: u8, high: u8) -> Self {
        self.low = low.min(127);
        self.high = high.min(127);
        self
    }

    pub fn with_period(mut self, seconds: f64) -> Self {
        self.speed_period_seconds = clamp_period(seconds);
        self
    }

    pub fn with_shape(mut self, shape: OscillatorShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn sanitize(&mut self) {
        self.low = self.low.min(127);
        self.high = self.high.min(127);
        self.speed_period_seconds = clamp_period(self.speed_period_seconds);
    }

    /// Map a bipolar waveform value onto [low, high]
    pub fn scale(&self, raw: f64) -> u8 {
        let unit = (raw.clamp(-1.0, 1.0) + 1.0) / 2.0;
        let low = self.low as f64;
        let high = self.high as f64;
        (low + (high - low) * unit).round().clamp(0.0, 127.0) as u8
    }
}

fn clamp_period(seconds: f64) -> f64 {
    if seconds.is_finite() {
        seconds.clamp(MIN_PERIOD_SECONDS, MAX_PERIOD_SECONDS)
    } else {
        MAX_PERIOD_SECONDS
    }
}

/// The five channels, one per target, in `ModulationTarget::ALL` order
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(from = "Vec<ModulationChannel>", into = "Vec<ModulationChannel>")]
pub struct ModulationBank {
    channels: [ModulationChannel; 5],
}

impl ModulationBank {
    pub fn channel(&self, target: ModulationTarget) -> &ModulationChannel {
        &self.channels[target.index()]
    }

    /// Replace the channel for `channel.target`
    pub fn set(&mut self, mut channel: ModulationChannel) {
        channel.sanitize();
        self.channels[channel.target.index()] = channel;
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModulationChannel> {
        self.channels.iter()
    }

    pub fn sanitize(&mut self) {
        self.channels.iter_mut().for_each(ModulationChannel::sanitize);
    }
}

impl Default for ModulationBank {
    fn default() -> Self {
        Self {
            channels: ModulationTarget::ALL.map(ModulationChannel::new),
        }
    }
}

impl From<Vec<ModulationChannel>> for ModulationBank {
    /// First entry per target wins; missing targets get defaults
    fn from(list: Vec<ModulationChannel>) -> Self {
        let channels = ModulationTarget::ALL.map(|target| {
            list.iter()
                .find(|c| c.target == target)
                .copied()
                .unwrap_or_else(|| ModulationChannel::new(target))
        });
        let mut bank = Self { channels };
        bank.sanitize();
        bank
    }
}

impl From<ModulationBank> for Vec<ModulationChannel> {
    fn from(bank: ModulationBank) -> Self {
        bank.channels.to_vec()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct OscillatorState {
    phase: f64,
    last_tick: Option<Instant>,
    current_value: Option<u8>,
}

/// Phase accumulators for the five channels
#[derive(Debug, Clone, Default)]
pub struct ModulationEngine {
    states: [OscillatorState; 5],
}

impl ModulationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance every enabled channel to `now` and emit its controller value.
    /// Returns the number of controller messages sent.
    pub fn tick<S: OutputSink + ?Sized>(
        &mut self,
        now: Instant,
        bank: &ModulationBank,
        sink: &mut S,
    ) -> usize {
        let mut emitted = 0;
        for channel in bank.iter() {
            let state = &mut self.states[channel.target.index()];
            if !channel.enabled {
                // Re-enabling starts from zero elapsed time
                state.last_tick = None;
                continue;
            }

            let elapsed = state
                .last_tick
                .map(|last| now.saturating_duration_since(last).as_secs_f64())
                .unwrap_or(0.0);
            state.last_tick = Some(now);
            state.phase += elapsed / channel.speed_period_seconds;

            let value = channel.scale(channel.shape.value(state.phase));
            sink.control_change(channel.target.controller(), value);
            state.current_value = Some(value);
            emitted += 1;
        }
        emitted
    }

    /// Forget last-tick timestamps so time spent stopped is not counted
    pub fn reset_timing(&mut self) {
        self.states.iter_mut().for_each(|s| s.last_tick = None);
    }

    /// Accumulated phase in cycles
    pub fn phase(&self, target: ModulationTarget) -> f64 {
        self.states[target.index()].phase
    }

    /// Last value emitted for `target`
    pub fn current_value(&self, target: ModulationTarget) -> Option<u8> {
        self.states[target.index()].current_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::sink::RecordingSink;
    use std::time::Duration;

    const EPSILON: f64 = 1e-9;

    fn bank_with(channel: ModulationChannel) -> ModulationBank {
        let mut bank = ModulationBank::default();
        bank.set(channel);
        bank
    }

    #[test]
    fn test_controller_assignment() {
        let ccs: Vec<u8> = ModulationTarget::ALL.iter().map(|t| t.controller()).collect();
        assert_eq!(ccs, vec![12, 16, 71, 74, 75]);
    }

    #[test]
    fn test_shapes() {
        assert!(OscillatorShape::Sine.value(0.0).abs() < EPSILON);
        assert!((OscillatorShape::Sine.value(0.25) - 1.0).abs() < EPSILON);

        assert!((OscillatorShape::Saw.value(0.0) + 1.0).abs() < EPSILON);
        assert!(OscillatorShape::Saw.value(0.5).abs() < EPSILON);
        assert!((OscillatorShape::Saw.value(0.999) - 0.998).abs() < 1e-6);

        assert_eq!(OscillatorShape::Square.value(0.2), 1.0);
        assert_eq!(OscillatorShape::Square.value(0.7), -1.0);

        assert!((OscillatorShape::Triangle.value(0.0) + 1.0).abs() < EPSILON);
        assert!((OscillatorShape::Triangle.value(0.5) - 1.0).abs() < EPSILON);
        assert!((OscillatorShape::Triangle.value(0.25)).abs() < EPSILON);
        assert!((OscillatorShape::Triangle.value(0.75)).abs() < EPSILON);
    }

    #[test]
    fn test_shapes_use_fractional_phase() {
        for shape in [
            OscillatorShape::Sine,
            OscillatorShape::Saw,
            OscillatorShape::Square,
            OscillatorShape::Triangle,
        ] {
            assert!((shape.value(3.3) - shape.value(0.3)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_scale() {
        let channel = ModulationChannel::new(ModulationTarget::Cutoff).with_range(40, 120);
        assert_eq!(channel.scale(-1.0), 40);
        assert_eq!(channel.scale(0.0), 80);
        assert_eq!(channel.scale(1.0), 120);
        assert_eq!(channel.scale(7.0), 120);

        let inverted = ModulationChannel::new(ModulationTarget::Cutoff).with_range(100, 20);
        assert_eq!(inverted.scale(1.0), 20);
    }

    #[test]
    fn test_period_clamped() {
        let channel = ModulationChannel::new(ModulationTarget::Decay).with_period(0.0);
        assert_eq!(channel.speed_period_seconds, MIN_PERIOD_SECONDS);
        let channel = ModulationChannel::new(ModulationTarget::Decay).with_period(1e6);
        assert_eq!(channel.speed_period_seconds, MAX_PERIOD_SECONDS);
    }

    #[test]
    fn test_quarter_cycle_sine_reaches_high() {
        let t0 = Instant::now();
        let bank = bank_with(
            ModulationChannel::new(ModulationTarget::Cutoff)
                .with_range(40, 120)
                .with_period(2.0)
                .enabled(true),
        );
        let mut engine = ModulationEngine::new();
        let mut sink = RecordingSink::new();

        engine.tick(t0, &bank, &mut sink);
        engine.tick(t0 + Duration::from_millis(500), &bank, &mut sink);

        assert_eq!(sink.controller_values(74), vec![80, 120]);
        assert_eq!(engine.current_value(ModulationTarget::Cutoff), Some(120));
        assert!((engine.phase(ModulationTarget::Cutoff) - 0.25).abs() < EPSILON);
    }

    #[test]
    fn test_phase_follows_real_elapsed_time() {
        let t0 = Instant::now();
        let bank = bank_with(
            ModulationChannel::new(ModulationTarget::Resonance)
                .with_period(1.0)
                .enabled(true),
        );
        let mut engine = ModulationEngine::new();
        let mut sink = RecordingSink::new();

        // Irregular tick spacing adds up to exactly 1.5 s
        let mut t = t0;
        engine.tick(t, &bank, &mut sink);
        for ms in [16, 40, 3, 250, 691, 500] {
            t += Duration::from_millis(ms);
            engine.tick(t, &bank, &mut sink);
        }
        assert!((engine.phase(ModulationTarget::Resonance) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_disabled_channel_is_silent_and_frozen() {
        let t0 = Instant::now();
        let bank = ModulationBank::default();
        let mut engine = ModulationEngine::new();
        let mut sink = RecordingSink::new();

        for i in 0..10 {
            let emitted = engine.tick(t0 + Duration::from_millis(16 * i), &bank, &mut sink);
            assert_eq!(emitted, 0);
        }
        assert!(sink.events().is_empty());
        for target in ModulationTarget::ALL {
            assert_eq!(engine.phase(target), 0.0);
            assert_eq!(engine.current_value(target), None);
        }
    }

    #[test]
    fn test_reenable_does_not_count_disabled_time() {
        let t0 = Instant::now();
        let on = ModulationChannel::new(ModulationTarget::Decay)
            .with_period(1.0)
            .enabled(true);
        let mut engine = ModulationEngine::new();
        let mut sink = RecordingSink::new();

        engine.tick(t0, &bank_with(on), &mut sink);
        engine.tick(t0 + Duration::from_millis(100), &bank_with(on), &mut sink);
        engine.tick(t0 + Duration::from_secs(5), &bank_with(on.enabled(false)), &mut sink);
        engine.tick(t0 + Duration::from_secs(10), &bank_with(on), &mut sink);

        assert!((engine.phase(ModulationTarget::Decay) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_only_enabled_channels_emit() {
        let t0 = Instant::now();
        let mut bank = ModulationBank::default();
        bank.set(ModulationChannel::new(ModulationTarget::EnvelopeMod).enabled(true));
        bank.set(ModulationChannel::new(ModulationTarget::Decay).enabled(true));
        let mut engine = ModulationEngine::new();
        let mut sink = RecordingSink::new();

        assert_eq!(engine.tick(t0, &bank, &mut sink), 2);
        assert_eq!(sink.controller_values(12).len(), 1);
        assert_eq!(sink.controller_values(75).len(), 1);
        assert!(sink.controller_values(74).is_empty());
    }

    #[test]
    fn test_bank_from_list_orders_by_target() {
        let list = vec![
            ModulationChannel::new(ModulationTarget::Decay).enabled(true),
            ModulationChannel::new(ModulationTarget::Cutoff).with_range(10, 20),
        ];
        let bank = ModulationBank::from(list);

        assert!(bank.channel(ModulationTarget::Decay).enabled);
        assert_eq!(bank.channel(ModulationTarget::Cutoff).low, 10);
        assert!(!bank.channel(ModulationTarget::Resonance).enabled);
        let targets: Vec<_> = bank.iter().map(|c| c.target).collect();
        assert_eq!(targets, ModulationTarget::ALL.to_vec());
    }
}
