// Player - playback loop: drains commands, drives the transport, paces modulation

use super::clock::Clock;
use super::timeline::Tempo;
use super::transport::{PatternSnapshot, SharedTransportState, Transport};
use crate::messaging::channels::CommandConsumer;
use crate::messaging::command::Command;
use crate::midi::sink::OutputSink;
use ringbuf::traits::Consumer;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_MODULATION_INTERVAL_MS: u64 = 16;

/// Longest the loop sleeps, so commands are picked up promptly when idle
const IDLE_SLEEP: Duration = Duration::from_millis(5);

/// Owns the transport, the output sink and the current pattern snapshot.
///
/// Everything runs on one thread: commands arrive through a lock-free ring
/// buffer and are applied between engine steps, so the engine never observes a
/// half-edited pattern.
pub struct Player<C: Clock, S: OutputSink> {
    clock: C,
    sink: S,
    transport: Transport,
    snapshot: PatternSnapshot,
    commands: CommandConsumer,
    shared: Arc<SharedTransportState>,
    modulation_interval: Duration,
    next_modulation: Option<Instant>,
}

impl<C: Clock, S: OutputSink> Player<C, S> {
    pub fn new(
        clock: C,
        sink: S,
        transport: Transport,
        snapshot: PatternSnapshot,
        commands: CommandConsumer,
    ) -> Self {
        Self {
            clock,
            sink,
            transport,
            snapshot,
            commands,
            shared: SharedTransportState::new(),
            modulation_interval: Duration::from_millis(DEFAULT_MODULATION_INTERVAL_MS),
            next_modulation: None,
        }
    }

    pub fn with_modulation_interval(mut self, interval: Duration) -> Self {
        self.modulation_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_shared_state(mut self, shared: Arc<SharedTransportState>) -> Self {
        self.shared = shared;
        self
    }

    /// Run one iteration. Returns false once a `Quit` command was seen.
    pub fn pump(&mut self) -> bool {
        let now = self.clock.now();

        while let Some(command) = self.commands.try_pop() {
            if !self.handle_command(command, now) {
                self.transport.stop(&mut self.sink);
                self.shared.publish(&self.transport.status());
                return false;
            }
        }

        self.transport.poll(now, &self.snapshot, &mut self.sink);

        if self.transport.is_playing() && self.next_modulation.is_none_or(|due| now >= due) {
            self.transport
                .tick_modulation(now, &self.snapshot.modulation, &mut self.sink);
            self.schedule_modulation(now);
        }

        self.shared.publish(&self.transport.status());
        true
    }

    fn handle_command(&mut self, command: Command, now: Instant) -> bool {
        match command {
            Command::Play => {
                if self.transport.play(now, &self.snapshot, &mut self.sink) {
                    self.next_modulation = Some(now + self.modulation_interval);
                }
            }
            Command::Stop => {
                self.transport.stop(&mut self.sink);
                self.next_modulation = None;
            }
            Command::SetTempo(bpm) => {
                // Applied by the transport on the next poll
                let tempo = Tempo::new(bpm);
                self.snapshot.config.tempo = tempo;
                log::info!("player: tempo set to {}", tempo);
            }
            Command::UpdatePattern(snapshot) => {
                let mut snapshot = *snapshot;
                snapshot.config.sanitize();
                snapshot.sequence.sanitize();
                snapshot.modulation.sanitize();
                self.snapshot = snapshot;
                log::debug!("player: pattern updated ({} steps)", self.snapshot.sequence.len());
            }
            Command::Quit => return false,
        }
        true
    }

    fn schedule_modulation(&mut self, now: Instant) {
        let next = self
            .next_modulation
            .map(|due| due + self.modulation_interval)
            .filter(|next| *next > now)
            .unwrap_or(now + self.modulation_interval);
        self.next_modulation = Some(next);
    }

    /// Earliest instant the loop has work to do
    pub fn next_wakeup(&self) -> Option<Instant> {
        let modulation = self
            .next_modulation
            .filter(|_| self.transport.is_playing());
        match (self.transport.next_deadline(), modulation) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Loop until `Quit`, sleeping between deadlines. Returns the sink.
    pub fn run(mut self) -> S {
        log::info!("player: started");
        while self.pump() {
            let now = self.clock.now();
            let sleep = self
                .next_wakeup()
                .map(|at| at.saturating_duration_since(now))
                .unwrap_or(IDLE_SLEEP)
                .min(IDLE_SLEEP);
            if !sleep.is_zero() {
                std::thread::sleep(sleep);
            }
        }
        log::info!("player: stopped");
        self.sink
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn snapshot(&self) -> &PatternSnapshot {
        &self.snapshot
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn shared_state(&self) -> Arc<SharedTransportState> {
        Arc::clone(&self.shared)
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::channels::{CommandProducer, create_command_channel};
    use crate::midi::sink::RecordingSink;
    use crate::sequencer::clock::ManualClock;
    use crate::sequencer::modulation::{ModulationChannel, ModulationTarget};
    use crate::sequencer::note_gate::{GateSettings, NoteGate};
    use crate::sequencer::step::{PitchClass, Sequence, Step};
    use crate::sequencer::timeline::TransportConfig;
    use crate::sequencer::transport::TransportState;
    use ringbuf::traits::Producer;

    fn setup(steps: Vec<Step>) -> (Player<ManualClock, RecordingSink>, CommandProducer) {
        let (tx, rx) = create_command_channel(16);
        let snapshot = PatternSnapshot {
            config: TransportConfig::new(120, 3),
            sequence: Sequence::new(steps),
            ..Default::default()
        };
        let transport = Transport::with_gate(NoteGate::with_seed(GateSettings::default(), 3));
        let player = Player::new(
            ManualClock::new(Instant::now()),
            RecordingSink::new(),
            transport,
            snapshot,
            rx,
        );
        (player, tx)
    }

    /// Advance the manual clock 1 ms at a time, pumping on every step
    fn run_for(player: &mut Player<ManualClock, RecordingSink>, span: Duration) {
        let end = player.clock().now() + span;
        while player.clock().now() < end {
            player.clock().advance(Duration::from_millis(1));
            assert!(player.pump());
        }
    }

    #[test]
    fn test_play_command_starts_transport() {
        let (mut player, mut tx) = setup(vec![Step::note(PitchClass::C); 16]);
        assert!(tx.try_push(Command::Play).is_ok());
        assert!(player.pump());

        assert!(player.transport().is_playing());
        assert_eq!(player.sink().note_ons().len(), 1);
        assert_eq!(player.shared_state().state(), TransportState::Playing);
    }

    #[test]
    fn test_plays_sixteen_steps_per_two_seconds() {
        let (mut player, mut tx) = setup(vec![Step::note(PitchClass::C); 16]);
        assert!(tx.try_push(Command::Play).is_ok());
        player.pump();
        run_for(&mut player, Duration::from_millis(1999));

        assert_eq!(player.sink().note_ons().len(), 16);
        assert_eq!(player.transport().current_step(), 15);
    }

    #[test]
    fn test_stop_then_quit() {
        let (mut player, mut tx) = setup(vec![Step::note(PitchClass::C); 4]);
        assert!(tx.try_push(Command::Play).is_ok());
        player.pump();
        run_for(&mut player, Duration::from_millis(50));

        assert!(tx.try_push(Command::Stop).is_ok());
        assert!(player.pump());
        assert!(!player.transport().is_playing());
        assert_eq!(player.sink().all_notes_off_count(), 1);

        assert!(tx.try_push(Command::Quit).is_ok());
        assert!(!player.pump());
        assert_eq!(player.sink().all_notes_off_count(), 2);
    }

    #[test]
    fn test_set_tempo_updates_snapshot() {
        let (mut player, mut tx) = setup(vec![Step::rest(); 16]);
        assert!(tx.try_push(Command::SetTempo(500)).is_ok());
        player.pump();

        assert_eq!(player.snapshot().config.tempo.bpm(), 300);
        assert_eq!(player.transport().tempo().bpm(), 300);
    }

    #[test]
    fn test_update_pattern_applies_on_next_step() {
        let (mut player, mut tx) = setup(vec![Step::note(PitchClass::C); 4]);
        assert!(tx.try_push(Command::Play).is_ok());
        player.pump();

        let mut snapshot = player.snapshot().clone();
        snapshot.sequence = Sequence::new(vec![Step::note(PitchClass::G); 4]);
        assert!(tx.try_push(Command::UpdatePattern(Box::new(snapshot))).is_ok());
        run_for(&mut player, Duration::from_millis(125));

        let pitches: Vec<u8> = player.sink().note_ons().iter().map(|(n, _)| *n).collect();
        assert_eq!(pitches, vec![48, 55]);
    }

    #[test]
    fn test_modulation_paced_by_interval() {
        let (mut player, mut tx) = setup(vec![Step::rest(); 16]);
        let mut snapshot = player.snapshot().clone();
        snapshot
            .modulation
            .set(ModulationChannel::new(ModulationTarget::Resonance).enabled(true));
        assert!(tx.try_push(Command::UpdatePattern(Box::new(snapshot))).is_ok());
        assert!(tx.try_push(Command::Play).is_ok());
        player.pump();
        run_for(&mut player, Duration::from_millis(160));

        // Immediate tick on play plus one every 16 ms
        let values = player.sink().controller_values(ModulationTarget::Resonance.controller());
        assert_eq!(values.len(), 11);
    }

    #[test]
    fn test_no_modulation_while_stopped() {
        let (mut player, mut tx) = setup(vec![Step::rest(); 16]);
        let mut snapshot = player.snapshot().clone();
        snapshot
            .modulation
            .set(ModulationChannel::new(ModulationTarget::Cutoff).enabled(true));
        assert!(tx.try_push(Command::UpdatePattern(Box::new(snapshot))).is_ok());
        run_for(&mut player, Duration::from_millis(100));

        assert!(player.sink().events().is_empty());
        assert!(player.next_wakeup().is_none());
    }
}
