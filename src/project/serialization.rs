// Serialization utilities for project persistence

use crate::project::ProjectError;
use crate::project::types::Project;
use ron::ser::PrettyConfig;
use std::path::Path;

/// On-disk encodings, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectFormat {
    Ron,
    Json,
}

impl ProjectFormat {
    pub fn from_path(path: &Path) -> Result<Self, ProjectError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("ron") => Ok(ProjectFormat::Ron),
            Some("json") => Ok(ProjectFormat::Json),
            _ => Err(ProjectError::UnsupportedFormat(path.display().to_string())),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ProjectFormat::Ron => "ron",
            ProjectFormat::Json => "json",
        }
    }
}

/// Serialize project state to RON format
pub fn serialize_to_ron(project: &Project) -> Result<String, ProjectError> {
    ron::ser::to_string_pretty(project, PrettyConfig::default())
        .map_err(|e| ProjectError::Ron(format!("Failed to serialize to RON: {}", e)))
}

/// Deserialize project state from RON format
pub fn deserialize_from_ron(ron_data: &str) -> Result<Project, ProjectError> {
    ron::from_str(ron_data)
        .map_err(|e| ProjectError::Ron(format!("Failed to deserialize from RON: {}", e)))
}

pub fn serialize_to_json(project: &Project) -> Result<String, ProjectError> {
    Ok(serde_json::to_string_pretty(project)?)
}

pub fn deserialize_from_json(json_data: &str) -> Result<Project, ProjectError> {
    Ok(serde_json::from_str(json_data)?)
}

pub fn serialize(project: &Project, format: ProjectFormat) -> Result<String, ProjectError> {
    match format {
        ProjectFormat::Ron => serialize_to_ron(project),
        ProjectFormat::Json => serialize_to_json(project),
    }
}

pub fn deserialize(data: &str, format: ProjectFormat) -> Result<Project, ProjectError> {
    match format {
        ProjectFormat::Ron => deserialize_from_ron(data),
        ProjectFormat::Json => deserialize_from_json(data),
    }
}
