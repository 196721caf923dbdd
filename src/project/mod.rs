// Project persistence
// A project is one step pattern plus its modulation, transport and MIDI settings,
// stored as RON or JSON.

pub mod manager;
pub mod serialization;
pub mod types;

pub use manager::{ProjectError, ProjectLoadOptions, ProjectManager, default_project_dir};
pub use serialization::ProjectFormat;
pub use types::{EngineSettings, MidiSettings, Project};

/// Longest sequence a project may hold
pub const MAX_SEQUENCE_LENGTH: usize = 256;

/// Helper function to validate project structure
pub fn validate_project_structure(project: &Project) -> Result<(), ProjectError> {
    if project.name.len() > 255 {
        return Err(ProjectError::ValidationFailed(
            "Project name cannot exceed 255 characters".to_string(),
        ));
    }

    if project.sequence.len() > MAX_SEQUENCE_LENGTH {
        return Err(ProjectError::ValidationFailed(format!(
            "Sequence has {} steps (maximum {})",
            project.sequence.len(),
            MAX_SEQUENCE_LENGTH
        )));
    }

    if let Some(port) = &project.midi.port_name {
        if port.trim().is_empty() {
            return Err(ProjectError::ValidationFailed(
                "MIDI port name cannot be blank".to_string(),
            ));
        }
    }

    Ok(())
}
