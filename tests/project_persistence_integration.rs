// Integration test: project files feed the playback loop
//
// Saves and reloads projects on disk, then plays the loaded pattern through a
// player driven by a manual clock.

use ringbuf::traits::Producer;
use std::fs;
use std::time::{Duration, Instant};
use stepseq::messaging::create_command_channel;
use stepseq::project::{ProjectError, ProjectLoadOptions, ProjectManager};
use stepseq::sequencer::{
    GateSettings, ManualClock, ModulationChannel, ModulationTarget, NoteGate, OscillatorShape,
    PitchClass, Player, Sequence, Step, Transport,
};
use stepseq::{Command, MidiChannel, Project, RecordingSink};
use tempfile::tempdir;

fn bass_line() -> Project {
    let mut project = Project::new("Bass line");
    project.sequence = Sequence::new(vec![
        Step::note(PitchClass::A).with_accent(),
        Step::note(PitchClass::A).with_octave(1).with_slide(),
        Step::note(PitchClass::E),
        Step::note(PitchClass::C).with_tie(),
    ]);
    project.transport.set_base_octave(2);
    project.midi.channel = MidiChannel::new(2);
    project.modulation.set(
        ModulationChannel::new(ModulationTarget::EnvelopeMod)
            .with_range(20, 90)
            .with_period(1.5)
            .with_shape(OscillatorShape::Square)
            .enabled(true),
    );
    project
}

#[test]
fn test_ron_and_json_files_load_identically() {
    let dir = tempdir().unwrap();
    let manager = ProjectManager::with_dir(dir.path());
    let project = bass_line();

    let ron_path = dir.path().join("bass.ron");
    let json_path = dir.path().join("bass.json");
    manager.save_project(&project, &ron_path).unwrap();
    manager.save_project(&project, &json_path).unwrap();

    let options = ProjectLoadOptions::default();
    let from_ron = manager.load_project(&ron_path, &options).unwrap();
    let from_json = manager.load_project(&json_path, &options).unwrap();

    assert_eq!(from_ron, project);
    assert_eq!(from_json, project);
    assert_eq!(from_ron.snapshot(), from_json.snapshot());
}

#[test]
fn test_hand_written_ron_is_clamped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hand.ron");
    fs::write(
        &path,
        r#"(
            name: "Hand written",
            transport: (tempo: 12, base_octave: 9),
            sequence: [
                (pitch_class: G, octave_offset: 5, accent: true, active: true),
                (active: false),
            ],
            midi: (channel: 0),
        )"#,
    )
    .unwrap();

    let project = ProjectManager::with_dir(dir.path())
        .load_project(&path, &ProjectLoadOptions::default())
        .unwrap();

    assert_eq!(project.transport.tempo.bpm(), 30);
    assert_eq!(project.transport.base_octave, 6);
    assert_eq!(project.midi.channel.number(), 1);
    assert_eq!(project.sequence.len(), 2);
    assert_eq!(project.sequence.steps()[0].octave_offset, 1);
    assert!(project.sequence.steps()[0].active);
    assert!(!project.sequence.steps()[1].active);
}

#[test]
fn test_garbage_file_reports_format_error() {
    let dir = tempdir().unwrap();
    let manager = ProjectManager::with_dir(dir.path());
    let options = ProjectLoadOptions::default();

    let ron_path = dir.path().join("broken.ron");
    fs::write(&ron_path, "(name: ").unwrap();
    assert!(matches!(
        manager.load_project(&ron_path, &options),
        Err(ProjectError::Ron(_))
    ));

    let json_path = dir.path().join("broken.json");
    fs::write(&json_path, "[1, 2").unwrap();
    assert!(matches!(
        manager.load_project(&json_path, &options),
        Err(ProjectError::Json(_))
    ));
}

#[test]
fn test_loaded_project_plays_through_player() {
    let dir = tempdir().unwrap();
    let manager = ProjectManager::with_dir(dir.path());
    let path = dir.path().join("bass.ron");
    manager.save_project(&bass_line(), &path).unwrap();
    let project = manager
        .load_project(&path, &ProjectLoadOptions::default())
        .unwrap();

    let (mut tx, rx) = create_command_channel(8);
    let mut player = Player::new(
        ManualClock::new(Instant::now()),
        RecordingSink::new(),
        Transport::with_gate(NoteGate::with_seed(GateSettings::default(), 9)),
        project.snapshot(),
        rx,
    )
    .with_modulation_interval(Duration::from_millis(project.engine.modulation_interval_ms));

    assert!(tx.try_push(Command::Play).is_ok());
    player.pump();
    for _ in 0..500 {
        player.clock().advance(Duration::from_millis(1));
        player.pump();
    }
    assert!(tx.try_push(Command::Quit).is_ok());
    assert!(!player.pump());

    let sink = player.sink();
    // Base octave 2: A = 45, A+1 = 57, E = 40; step 3 holds the E
    let pitches: Vec<u8> = sink.note_ons().iter().map(|(note, _)| *note).collect();
    assert_eq!(pitches, vec![45, 57, 40, 45]);
    assert_eq!(sink.note_offs().iter().filter(|n| **n == 40).count(), 1);
    assert!((100..=127).contains(&sink.note_ons()[0].1));

    // Square LFO between 20 and 90 on the envelope-mod controller
    let env_mod = sink.controller_values(ModulationTarget::EnvelopeMod.controller());
    assert!(!env_mod.is_empty());
    assert!(env_mod.iter().all(|v| *v == 20 || *v == 90));

    assert_eq!(sink.all_notes_off_count(), 1);
    assert!(!player.transport().is_playing());
}
