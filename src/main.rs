use clap::Parser;
use ringbuf::traits::{Consumer, Producer};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use stepseq::messaging::{CommandProducer, NotificationConsumer};
use stepseq::midi::MidiDeviceManager;
use stepseq::project::{ProjectLoadOptions, ProjectManager};
use stepseq::sequencer::SharedTransportState;
use stepseq::{
    AtomicDeviceStatus, Command, LogSink, MidiChannel, MidiError, MidiOutputSink, OutputSink,
    Player, Project, ProjectError, SystemClock, Tempo, Transport, create_command_channel,
    create_notification_channel,
};

// Ringbuffer capacity constants
// Commands come from a human at a terminal; notifications are connectivity
// changes, a handful per reconnection cycle.
const COMMAND_RINGBUFFER_CAPACITY: usize = 64;
const NOTIFICATION_RINGBUFFER_CAPACITY: usize = 256;

/// How often queued notifications are written to the log
const NOTIFICATION_DRAIN_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "stepseq", version, about = "Step sequencer driving an external MIDI bass synth")]
struct Cli {
    /// Project file (.ron or .json); the saved default or the demo pattern otherwise
    #[arg(short, long, value_name = "FILE")]
    project: Option<PathBuf>,

    /// Output port name (exact, or a case-insensitive substring)
    #[arg(long, value_name = "NAME")]
    port: Option<String>,

    /// MIDI channel 1-16
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=16))]
    channel: Option<u8>,

    /// Tempo in BPM (30-300)
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(30..=300))]
    tempo: Option<u16>,

    /// Start playing immediately
    #[arg(long)]
    play: bool,

    /// List MIDI output ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Log MIDI messages instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// Write the demo project to FILE and exit
    #[arg(long, value_name = "FILE")]
    write_default: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error(transparent)]
    Midi(#[from] MidiError),

    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// One line typed on stdin
#[derive(Debug, Clone, PartialEq, Eq)]
enum ControlLine {
    Play,
    Stop,
    Tempo(u16),
    Reload,
    Status,
    Quit,
}

fn parse_control_line(line: &str) -> Option<ControlLine> {
    let mut words = line.split_whitespace();
    let keyword = words.next()?.to_ascii_lowercase();
    match keyword.as_str() {
        "play" | "p" => Some(ControlLine::Play),
        "stop" | "s" => Some(ControlLine::Stop),
        "tempo" | "t" => words.next()?.parse().ok().map(ControlLine::Tempo),
        "reload" | "r" => Some(ControlLine::Reload),
        "status" => Some(ControlLine::Status),
        "quit" | "q" | "exit" => Some(ControlLine::Quit),
        _ => None,
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), RunError> {
    if cli.list_ports {
        let ports = MidiDeviceManager::new().list_output_ports()?;
        if ports.is_empty() {
            println!("No MIDI output ports found");
        }
        for port in ports {
            let marker = if port.is_default { " (default)" } else { "" };
            println!("{}: {}{}", port.id, port.name, marker);
        }
        return Ok(());
    }

    let manager = ProjectManager::new();

    if let Some(path) = &cli.write_default {
        manager.save_project(&Project::demo(), path)?;
        println!("Wrote demo project to {}", path.display());
        return Ok(());
    }

    let project_path = cli.project.clone().or_else(|| manager.default_project_path());
    let mut project = match &cli.project {
        Some(path) => manager.load_project(path, &ProjectLoadOptions::default())?,
        None => manager.load_default()?,
    };
    apply_overrides(&mut project, &cli);

    let (command_tx, command_rx) = create_command_channel(COMMAND_RINGBUFFER_CAPACITY);
    let (notification_tx, notification_rx) =
        create_notification_channel(NOTIFICATION_RINGBUFFER_CAPACITY);

    let mut output_status = None;
    let sink: Box<dyn OutputSink> = if cli.dry_run {
        log::info!("Dry run: MIDI output is logged only");
        Box::new(LogSink)
    } else {
        let port = project.midi.port_name.as_deref();
        let sink = match MidiOutputSink::connect(port, project.midi.channel) {
            Ok(sink) => sink,
            Err(e) => {
                log::warn!("{}; will keep retrying in the background", e);
                MidiOutputSink::disconnected(port, project.midi.channel)
            }
        };
        let sink = sink.with_notifications(notification_tx).with_reconnect()?;
        output_status = Some(sink.status());
        Box::new(sink)
    };

    let shared = SharedTransportState::new();
    let player = Player::new(
        SystemClock,
        sink,
        Transport::new(project.engine.gate),
        project.snapshot(),
        command_rx,
    )
    .with_modulation_interval(Duration::from_millis(project.engine.modulation_interval_ms))
    .with_shared_state(Arc::clone(&shared));

    println!(
        "'{}': {} steps at {}, {}",
        project.name,
        project.sequence.len(),
        project.transport.tempo,
        project.midi.channel
    );
    println!("Commands: play, stop, tempo <bpm>, reload, status, quit");

    let mut command_tx = command_tx;
    if cli.play {
        send(&mut command_tx, Command::Play);
    }

    let _notifications = std::thread::Builder::new()
        .name("stepseq-notifications".to_string())
        .spawn(move || drain_notifications(notification_rx))?;

    let status = StatusView {
        transport: shared,
        output: output_status,
    };
    let _control = std::thread::Builder::new()
        .name("stepseq-control".to_string())
        .spawn(move || control_loop(command_tx, status, project_path))?;

    player.run();
    Ok(())
}

fn apply_overrides(project: &mut Project, cli: &Cli) {
    if let Some(port) = &cli.port {
        project.midi.port_name = Some(port.clone());
    }
    if let Some(channel) = cli.channel {
        project.midi.channel = MidiChannel::new(channel);
    }
    if let Some(bpm) = cli.tempo {
        project.transport.tempo = Tempo::new(bpm);
    }
}

fn send(tx: &mut CommandProducer, command: Command) {
    if let Err(command) = tx.try_push(command) {
        log::warn!("Command queue full, dropped {:?}", command);
    }
}

/// Write notifications from the playback thread to the log
fn drain_notifications(mut notification_rx: NotificationConsumer) {
    loop {
        while let Some(notification) = notification_rx.try_pop() {
            notification.log();
        }
        std::thread::sleep(NOTIFICATION_DRAIN_INTERVAL);
    }
}

/// What the `status` command reports
struct StatusView {
    transport: Arc<SharedTransportState>,
    /// None for a dry run
    output: Option<AtomicDeviceStatus>,
}

impl StatusView {
    fn describe(&self) -> String {
        let output = match &self.output {
            Some(status) => format!("MIDI output {}", status.get()),
            None => "dry run".to_string(),
        };
        format!(
            "{:?} step {} at {} BPM, {}",
            self.transport.state(),
            self.transport.current_step() + 1,
            self.transport.tempo_bpm(),
            output
        )
    }
}

/// Read stdin lines and forward them as commands. EOF quits.
fn control_loop(
    mut command_tx: CommandProducer,
    status: StatusView,
    project_path: Option<PathBuf>,
) {
    let manager = ProjectManager::new();
    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };

        match parse_control_line(&line) {
            Some(ControlLine::Play) => send(&mut command_tx, Command::Play),
            Some(ControlLine::Stop) => send(&mut command_tx, Command::Stop),
            Some(ControlLine::Tempo(bpm)) => send(&mut command_tx, Command::SetTempo(bpm)),
            Some(ControlLine::Reload) => match &project_path {
                Some(path) if path.exists() => {
                    match manager.load_project(path, &ProjectLoadOptions::default()) {
                        Ok(project) => send(
                            &mut command_tx,
                            Command::UpdatePattern(Box::new(project.snapshot())),
                        ),
                        Err(e) => log::error!("Reload failed: {}", e),
                    }
                }
                _ => log::warn!("No project file to reload"),
            },
            Some(ControlLine::Status) => println!("{}", status.describe()),
            Some(ControlLine::Quit) => break,
            None if line.trim().is_empty() => {}
            None => println!("Unknown command: {}", line.trim()),
        }
    }

    send(&mut command_tx, Command::Quit);
}
