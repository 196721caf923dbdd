// MIDI output: events, sinks and device binding

pub mod device;
pub mod event;
pub mod output;
pub mod sink;

pub use device::{MidiDeviceInfo, MidiDeviceManager};
pub use event::{MidiChannel, MidiEvent};
pub use output::MidiOutputSink;
pub use sink::{LogSink, OutputSink, RecordingSink};

use thiserror::Error;

/// MIDI device errors
#[derive(Debug, Error)]
pub enum MidiError {
    #[error("Failed to initialize MIDI: {0}")]
    Init(#[from] midir::InitError),

    #[error("No MIDI output ports available")]
    NoPorts,

    #[error("MIDI output port '{0}' not found")]
    PortNotFound(String),

    #[error("Failed to connect to MIDI output: {0}")]
    Connect(String),
}
