// ❗ Pipeline errors
// Every stage returns PipelineError; the binary wraps it with anyhow context.

use std::fmt;
use std::path::PathBuf;

// ============================================================================
// STAGE
// ============================================================================

/// Pipeline stage, used to tell the user where a run aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Clean,
    Aggregate,
    Merge,
    Write,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Clean => "clean",
            Stage::Aggregate => "aggregate",
            Stage::Merge => "merge",
            Stage::Write => "write",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// PIPELINE ERROR
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Raw entity name has no entry in the harmonization table
    #[error("unmapped entity name: {name:?}")]
    UnmappedEntity { name: String },

    /// Indicator code outside the official/private taxonomy
    #[error("unknown indicator code: {code}")]
    UnknownIndicator { code: String },

    /// CRS fallback file absent or unreadable
    #[error("CRS source {path:?} unusable: {reason}")]
    CrsSource { path: PathBuf, reason: String },

    /// Upstream API request or payload failure
    #[error("extraction from {source_name} failed: {message}")]
    Extraction {
        source_name: String,
        message: String,
    },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wraps any of the above with the stage that produced it
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<PipelineError>,
    },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn unmapped(name: impl Into<String>) -> Self {
        Self::UnmappedEntity { name: name.into() }
    }

    pub fn crs(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CrsSource {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn extraction(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Tag this error with a stage (idempotent: an already tagged error keeps its stage)
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            already @ PipelineError::Stage { .. } => already,
            other => PipelineError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage the error was raised in, if known
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Extension for tagging results with the stage that produced them
pub trait StageExt<T> {
    fn stage(self, stage: Stage) -> Result<T>;
}

impl<T> StageExt<T> for Result<T> {
    fn stage(self, stage: Stage) -> Result<T> {
        self.map_err(|e| e.in_stage(stage))
    }
}
