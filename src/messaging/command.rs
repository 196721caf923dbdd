// Control commands - editor/CLI -> playback thread

use crate::sequencer::transport::PatternSnapshot;

#[derive(Debug, Clone)]
pub enum Command {
    Play,
    Stop,
    /// Tempo in BPM, clamped by the transport
    SetTempo(u16),
    /// Replace the pattern the engine reads at the next tick
    UpdatePattern(Box<PatternSnapshot>),
    Quit,
}
