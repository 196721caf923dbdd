// Sequencer module
// Step pattern, step clock, note gating, modulation and the playback loop

pub mod clock;
pub mod modulation;
pub mod note_gate;
pub mod player;
pub mod scheduler;
pub mod step;
pub mod timeline;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock, TimingClock};
pub use modulation::{
    ModulationBank, ModulationChannel, ModulationEngine, ModulationTarget, OscillatorShape,
};
pub use note_gate::{GateDecision, GateSettings, NoteGate, StepContext, VelocityRange};
pub use player::Player;
pub use scheduler::{DeferredAction, DeferredQueue, TaskHandle};
pub use step::{PitchClass, Sequence, Step};
pub use timeline::{Tempo, TransportConfig};
pub use transport::{
    EngineStatus, PatternSnapshot, SharedTransportState, Transport, TransportState,
};
