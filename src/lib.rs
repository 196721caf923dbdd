// stepseq - Library exports for the runner, tests and benchmarks

pub mod connection;
pub mod messaging;
pub mod midi;
pub mod project;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use connection::{AtomicDeviceStatus, DeviceStatus, ReconnectionStrategy};
pub use messaging::channels::{create_command_channel, create_notification_channel};
pub use messaging::{Command, Notification};
pub use midi::{
    LogSink, MidiChannel, MidiError, MidiEvent, MidiOutputSink, OutputSink, RecordingSink,
};
pub use project::{Project, ProjectError, ProjectManager};
pub use sequencer::{
    ManualClock, ModulationBank, ModulationChannel, ModulationTarget, PatternSnapshot, PitchClass,
    Player, Sequence, Step, SystemClock, Tempo, Transport, TransportConfig, TransportState,
};
