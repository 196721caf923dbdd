// MIDI output sink backed by a midir connection
//
// Sends are best effort. A failed send marks the device as errored and drops
// the connection. Nothing is queued or retried: a late note is worse than a
// missing one. Reopening the port happens on a monitor thread, which hands a
// ready connection to the sink through a one-slot ring buffer; the playback
// thread never opens ports itself.

use super::MidiError;
use super::device::MidiDeviceManager;
use super::event::{MidiChannel, MidiEvent, PITCH_BEND_CENTER, pitch_bend_from_normalized};
use super::sink::OutputSink;
use crate::connection::reconnect::ReconnectSchedule;
use crate::connection::status::{AtomicDeviceStatus, DeviceStatus};
use crate::messaging::channels::NotificationProducer;
use crate::messaging::notification::{Notification, NotificationCategory};
use midir::MidiOutputConnection;
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Producer, Split};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// How often the monitor looks at the connection status
const MONITOR_POLL: Duration = Duration::from_millis(250);

/// An opened port and its name, passed from the monitor to the sink
type Handoff<T> = (T, String);
type HandoffProducer<T> = ringbuf::HeapProd<Handoff<T>>;
type HandoffConsumer<T> = ringbuf::HeapCons<Handoff<T>>;

fn open_port(target: Option<&str>) -> Result<Handoff<MidiOutputConnection>, MidiError> {
    let (midi_out, port, name) = MidiDeviceManager::new().find_output_port(target)?;
    let conn = midi_out
        .connect(&port, "stepseq-out")
        .map_err(|e| MidiError::Connect(e.to_string()))?;
    Ok((conn, name))
}

fn status_for_error(error: &MidiError) -> DeviceStatus {
    match error {
        MidiError::NoPorts | MidiError::PortNotFound(_) => DeviceStatus::Disconnected,
        _ => DeviceStatus::Error,
    }
}

/// Reopens the output port whenever the sink reports it lost.
///
/// Generic over the connection type so the retry logic runs without a MIDI
/// backend.
struct ReconnectMonitor<T> {
    target: Option<String>,
    status: AtomicDeviceStatus,
    handoff: HandoffProducer<T>,
    schedule: ReconnectSchedule,
}

impl<T> ReconnectMonitor<T> {
    /// One monitoring step. `open` is only called when the device is down and
    /// the backoff allows an attempt. Returns true if a connection was handed
    /// over.
    fn poll<F>(&mut self, now: Instant, open: F) -> bool
    where
        F: FnOnce(Option<&str>) -> Result<Handoff<T>, MidiError>,
    {
        match self.status.get() {
            DeviceStatus::Connected => {
                self.schedule.succeeded();
                return false;
            }
            DeviceStatus::Connecting => return false,
            DeviceStatus::Disconnected | DeviceStatus::Error => {}
        }
        if !self.schedule.is_due(now) {
            return false;
        }

        self.status.set(DeviceStatus::Connecting);
        log::debug!("MIDI output: reconnection attempt {}", self.schedule.attempts() + 1);

        match open(self.target.as_deref()) {
            Ok(handoff) => {
                // Connected before the push: the sink may fail the new
                // connection right away and must not be overwritten
                self.status.set(DeviceStatus::Connected);
                if self.handoff.try_push(handoff).is_err() {
                    log::warn!("MIDI output: sink still holds an unused connection");
                    self.status.set(DeviceStatus::Disconnected);
                    return false;
                }
                self.schedule.succeeded();
                true
            }
            Err(e) => {
                self.status.set(status_for_error(&e));
                log::debug!("MIDI output: reconnection failed: {}", e);
                if self.schedule.failed(now) {
                    log::warn!(
                        "MIDI output: still unreachable, next attempt in {:?}",
                        self.schedule
                            .next_attempt()
                            .map(|at| at.saturating_duration_since(now))
                            .unwrap_or_default()
                    );
                }
                false
            }
        }
    }
}

impl ReconnectMonitor<MidiOutputConnection> {
    fn run(mut self, shutdown: Arc<AtomicBool>) {
        while !shutdown.load(Ordering::Relaxed) {
            self.poll(Instant::now(), open_port);
            thread::sleep(MONITOR_POLL);
        }
    }
}

struct MonitorHandle {
    shutdown: Arc<AtomicBool>,
    thread: thread::JoinHandle<()>,
}

pub struct MidiOutputSink {
    connection: Option<MidiOutputConnection>,
    /// Requested port (None = first available)
    target: Option<String>,
    channel: MidiChannel,
    status: AtomicDeviceStatus,
    handoff: HandoffConsumer<MidiOutputConnection>,
    /// Producer side of the handoff until a monitor takes it
    handoff_tx: Option<HandoffProducer<MidiOutputConnection>>,
    monitor: Option<MonitorHandle>,
    notifications: Option<NotificationProducer>,
    dropped: u64,
    /// An "unavailable" warning was sent for the current outage
    warned: bool,
}

impl MidiOutputSink {
    /// Open the target port now, failing if it cannot be reached
    pub fn connect(target: Option<&str>, channel: MidiChannel) -> Result<Self, MidiError> {
        let mut sink = Self::disconnected(target, channel);
        sink.status.set(DeviceStatus::Connecting);

        match open_port(target) {
            Ok((conn, name)) => {
                log::info!("MIDI output connected: {} ({})", name, channel);
                sink.connection = Some(conn);
                sink.status.set(DeviceStatus::Connected);
                Ok(sink)
            }
            Err(e) => {
                sink.status.set(status_for_error(&e));
                Err(e)
            }
        }
    }

    /// Create a sink with no connection. Messages are dropped until a
    /// reconnect monitor (see `with_reconnect`) hands over an open port.
    pub fn disconnected(target: Option<&str>, channel: MidiChannel) -> Self {
        let (handoff_tx, handoff) = HeapRb::<Handoff<MidiOutputConnection>>::new(1).split();
        Self {
            connection: None,
            target: target.map(str::to_string),
            channel,
            status: AtomicDeviceStatus::new(DeviceStatus::Disconnected),
            handoff,
            handoff_tx: Some(handoff_tx),
            monitor: None,
            notifications: None,
            dropped: 0,
            warned: false,
        }
    }

    /// Push connectivity changes to a notification channel
    pub fn with_notifications(mut self, notifications: NotificationProducer) -> Self {
        self.notifications = Some(notifications);
        self
    }

    /// Spawn the thread that reopens the port after it is lost
    pub fn with_reconnect(mut self) -> io::Result<Self> {
        let Some(handoff) = self.handoff_tx.take() else {
            return Ok(self);
        };

        let monitor = ReconnectMonitor {
            target: self.target.clone(),
            status: self.status.clone(),
            handoff,
            schedule: ReconnectSchedule::default(),
        };
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let thread = thread::Builder::new()
            .name("stepseq-midi-monitor".to_string())
            .spawn(move || monitor.run(flag))?;

        self.monitor = Some(MonitorHandle { shutdown, thread });
        Ok(self)
    }

    /// Shared handle on the connectivity status
    pub fn status(&self) -> AtomicDeviceStatus {
        self.status.clone()
    }

    /// Number of messages dropped while disconnected or after send errors
    pub fn dropped_messages(&self) -> u64 {
        self.dropped
    }

    fn take_handoff(&mut self) {
        if let Some((conn, name)) = self.handoff.try_pop() {
            self.connection = Some(conn);
            self.warned = false;
            self.notify(Notification::info(
                NotificationCategory::Midi,
                format!("MIDI output connected: {} ({})", name, self.channel),
            ));
        }
    }

    fn drop_message(&mut self) {
        self.dropped += 1;
        if !self.warned {
            self.warned = true;
            self.notify(Notification::warning(
                NotificationCategory::Midi,
                "MIDI output unavailable, dropping messages until it reconnects".to_string(),
            ));
        }
    }

    fn send(&mut self, event: MidiEvent) {
        if self.connection.is_none() {
            self.take_handoff();
        }

        let bytes = event.to_bytes(self.channel);
        let Some(conn) = self.connection.as_mut() else {
            self.drop_message();
            return;
        };

        if let Err(e) = conn.send(&bytes) {
            self.connection = None;
            self.dropped += 1;
            self.warned = true;
            self.status.set(DeviceStatus::Error);
            self.notify(Notification::error(
                NotificationCategory::Midi,
                format!("MIDI send failed: {}", e),
            ));
        }
    }

    /// Hand off to the notification channel; log directly when there is none
    /// or it is full
    fn notify(&mut self, notification: Notification) {
        let rejected = match self.notifications.as_mut() {
            Some(tx) => tx.try_push(notification).err(),
            None => Some(notification),
        };
        if let Some(notification) = rejected {
            notification.log();
        }
    }
}

impl Drop for MidiOutputSink {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.shutdown.store(true, Ordering::Relaxed);
            let _ = monitor.thread.join();
        }
        if self.dropped_messages() > 0 {
            log::info!("MIDI output closed, {} messages were dropped", self.dropped_messages());
        }
    }
}

impl OutputSink for MidiOutputSink {
    fn note_on(&mut self, note: u8, velocity: u8) {
        self.send(MidiEvent::note_on(note, velocity));
    }

    fn note_off(&mut self, note: u8) {
        self.send(MidiEvent::note_off(note));
    }

    fn control_change(&mut self, controller: u8, value: u8) {
        self.send(MidiEvent::control_change(controller, value));
    }

    fn pitch_bend(&mut self, value: f32) {
        self.send(MidiEvent::PitchBend {
            value: pitch_bend_from_normalized(value),
        });
    }

    fn all_notes_off(&mut self) {
        self.send(MidiEvent::AllNotesOff);
        self.send(MidiEvent::PitchBend {
            value: PITCH_BEND_CENTER,
        });
    }
}
