// Project manager for loading and saving projects

use crate::project::serialization::{self, ProjectFormat};
use crate::project::types::Project;
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "stepseq";
const DEFAULT_PROJECT_FILE: &str = "default.ron";

/// Project error types
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON error: {0}")]
    Ron(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported project file (expected .ron or .json): {0}")]
    UnsupportedFormat(String),

    #[error("Project validation failed: {0}")]
    ValidationFailed(String),
}

/// Options for loading a project
#[derive(Debug, Clone)]
pub struct ProjectLoadOptions {
    /// Reject structurally invalid projects instead of loading them
    pub validate: bool,
    /// Clamp values into range after loading
    pub sanitize: bool,
}

impl Default for ProjectLoadOptions {
    fn default() -> Self {
        Self {
            validate: true,
            sanitize: true,
        }
    }
}

/// Project manager - handles saving/loading projects
#[derive(Debug, Clone)]
pub struct ProjectManager {
    project_dir: Option<PathBuf>,
}

impl ProjectManager {
    /// Manager rooted at the platform config directory
    pub fn new() -> Self {
        Self {
            project_dir: default_project_dir(),
        }
    }

    /// Manager rooted at an explicit directory
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: Some(dir.into()),
        }
    }

    pub fn project_dir(&self) -> Option<&Path> {
        self.project_dir.as_deref()
    }

    /// Path of the default project, if a project directory is known
    pub fn default_project_path(&self) -> Option<PathBuf> {
        self.project_dir
            .as_ref()
            .map(|dir| dir.join(DEFAULT_PROJECT_FILE))
    }

    /// Save project to a .ron or .json file, creating parent directories
    pub fn save_project<P: AsRef<Path>>(
        &self,
        project: &Project,
        path: P,
    ) -> Result<(), ProjectError> {
        let path = path.as_ref();
        let format = ProjectFormat::from_path(path)?;
        let data = serialization::serialize(project, format)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)?;

        log::info!("Saved project '{}' to {}", project.name, path.display());
        Ok(())
    }

    /// Load project from a .ron or .json file
    pub fn load_project<P: AsRef<Path>>(
        &self,
        path: P,
        options: &ProjectLoadOptions,
    ) -> Result<Project, ProjectError> {
        let path = path.as_ref();
        let format = ProjectFormat::from_path(path)?;
        let data = fs::read_to_string(path)?;
        let mut project = serialization::deserialize(&data, format)?;

        if options.validate {
            crate::project::validate_project_structure(&project)?;
        }
        if options.sanitize {
            project.sanitize();
        }

        log::info!(
            "Loaded project '{}' from {} ({} steps)",
            project.name,
            path.display(),
            project.sequence.len()
        );
        Ok(project)
    }

    /// Load the default project, or the built-in demo when none is saved
    pub fn load_default(&self) -> Result<Project, ProjectError> {
        match self.default_project_path() {
            Some(path) if path.exists() => {
                self.load_project(path, &ProjectLoadOptions::default())
            }
            _ => Ok(Project::demo()),
        }
    }
}

impl Default for ProjectManager {
    fn default() -> Self {
        Self::new()
    }
}

/// `<config dir>/stepseq`
pub fn default_project_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME))
}
