// Project types - everything persisted for one pattern

use crate::midi::event::MidiChannel;
use crate::sequencer::modulation::{
    ModulationBank, ModulationChannel, ModulationTarget, OscillatorShape,
};
use crate::sequencer::note_gate::GateSettings;
use crate::sequencer::player::DEFAULT_MODULATION_INTERVAL_MS;
use crate::sequencer::step::{PitchClass, Sequence, Step};
use crate::sequencer::timeline::TransportConfig;
use crate::sequencer::transport::PatternSnapshot;
use serde::{Deserialize, Serialize};

/// Output binding
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiSettings {
    /// Output port name (exact or substring); first port when unset
    pub port_name: Option<String>,
    pub channel: MidiChannel,
}

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub gate: GateSettings,
    /// Modulation update cadence
    pub modulation_interval_ms: u64,
}

impl EngineSettings {
    pub fn sanitize(&mut self) {
        self.gate.sanitize();
        self.modulation_interval_ms = self.modulation_interval_ms.clamp(1, 1000);
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            gate: GateSettings::default(),
            modulation_interval_ms: DEFAULT_MODULATION_INTERVAL_MS,
        }
    }
}

/// Pattern project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    pub name: String,
    pub transport: TransportConfig,
    pub sequence: Sequence,
    pub modulation: ModulationBank,
    pub midi: MidiSettings,
    pub engine: EngineSettings,
}

impl Project {
    /// Empty 16-step project
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportConfig::default(),
            sequence: Sequence::default(),
            modulation: ModulationBank::default(),
            midi: MidiSettings::default(),
            engine: EngineSettings::default(),
        }
    }

    /// Sixteen-step bass line with a slow filter sweep
    pub fn demo() -> Self {
        use PitchClass::*;

        let steps = vec![
            Step::note(C).with_accent(),
            Step::note(C),
            Step::note(C).with_octave(1).with_slide(),
            Step::note(C),
            Step::rest(),
            Step::note(DSharp).with_accent(),
            Step::note(DSharp).with_tie(),
            Step::note(F),
            Step::note(G).with_slide(),
            Step::note(G).with_octave(1),
            Step::rest(),
            Step::note(ASharp).with_octave(-1).with_accent(),
            Step::note(C),
            Step::note(C).with_tie(),
            Step::note(G).with_slide(),
            Step::note(F).with_accent(),
        ];

        let mut project = Self::new("Demo");
        project.sequence = Sequence::new(steps);
        project.modulation.set(
            ModulationChannel::new(ModulationTarget::Cutoff)
                .with_range(30, 110)
                .with_period(8.0)
                .enabled(true),
        );
        project.modulation.set(
            ModulationChannel::new(ModulationTarget::Resonance)
                .with_range(60, 100)
                .with_period(3.0)
                .with_shape(OscillatorShape::Triangle)
                .enabled(true),
        );
        project
    }

    /// Clamp every value into its valid range
    pub fn sanitize(&mut self) {
        if self.name.trim().is_empty() {
            self.name = "Untitled".to_string();
        }
        self.transport.sanitize();
        self.sequence.sanitize();
        self.modulation.sanitize();
        self.engine.sanitize();
    }

    /// The part of the project the playback engine reads
    pub fn snapshot(&self) -> PatternSnapshot {
        PatternSnapshot {
            config: self.transport,
            sequence: self.sequence.clone(),
            modulation: self.modulation.clone(),
        }
    }
}

/// Fields missing from a project file come from here, never from the demo
impl Default for Project {
    fn default() -> Self {
        Self::new("Untitled")
    }
}
