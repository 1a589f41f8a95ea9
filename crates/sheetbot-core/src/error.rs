//! Error types for sheet building, backend I/O, LLM calls and configuration.

use std::fmt;

use thiserror::Error;

/// Failures that are worth retrying from scratch.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Errors returned by a spreadsheet backend.
#[derive(Error, Debug)]
pub enum SheetsError {
    /// The service is overloaded or temporarily down (HTTP 503).
    #[error("spreadsheet service unavailable ({status}): {message}")]
    Unavailable { status: u16, message: String },

    /// Permission, not-found, malformed request and every other non-transient status.
    #[error("spreadsheet API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("spreadsheet request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("spreadsheet response decode: {0}")]
    Decode(String),
}

impl SheetsError {
    /// Map a non-success HTTP status and its body to the right error class.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 503 {
            SheetsError::Unavailable { status, message }
        } else {
            SheetsError::Api { status, message }
        }
    }
}

impl Transient for SheetsError {
    fn is_transient(&self) -> bool {
        matches!(self, SheetsError::Unavailable { .. })
    }
}

/// Sub-steps of processing one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionPhase {
    CopyTemplate,
    ReadScratch,
    Transplant,
    ReplacePlaceholders,
}

impl fmt::Display for SectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SectionPhase::CopyTemplate => "copy section template",
            SectionPhase::ReadScratch => "read scratch sheet",
            SectionPhase::Transplant => "copy rows into target",
            SectionPhase::ReplacePlaceholders => "replace placeholders",
        };
        f.write_str(s)
    }
}

/// Where in the build procedure a failure happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStep {
    ResolveTitle,
    CopyTopTemplate,
    RenameSheet,
    MeasureHeader,
    LocateSectionTemplate,
    Section { name: String, phase: SectionPhase },
    WriteTotal,
}

impl BuildStep {
    pub fn section(name: &str, phase: SectionPhase) -> Self {
        BuildStep::Section {
            name: name.to_string(),
            phase,
        }
    }
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStep::ResolveTitle => f.write_str("resolve unique title"),
            BuildStep::CopyTopTemplate => f.write_str("copy top template"),
            BuildStep::RenameSheet => f.write_str("rename sheet"),
            BuildStep::MeasureHeader => f.write_str("measure header rows"),
            BuildStep::LocateSectionTemplate => f.write_str("locate section template"),
            BuildStep::Section { name, phase } => write!(f, "section '{}': {}", name, phase),
            BuildStep::WriteTotal => f.write_str("write total formula"),
        }
    }
}

/// A failed build attempt. No rollback is performed; the step tells the caller what
/// was already created.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("invalid project request: {0}")]
    InvalidRequest(String),

    #[error("{step} failed: {source}")]
    Step {
        step: BuildStep,
        #[source]
        source: SheetsError,
    },
}

impl BuildError {
    pub fn step(&self) -> Option<&BuildStep> {
        match self {
            BuildError::Step { step, .. } => Some(step),
            BuildError::InvalidRequest(_) => None,
        }
    }
}

impl Transient for BuildError {
    fn is_transient(&self) -> bool {
        match self {
            BuildError::Step { source, .. } => source.is_transient(),
            BuildError::InvalidRequest(_) => false,
        }
    }
}

/// Attach a build step to a backend result.
pub(crate) trait StepContext<T> {
    fn at(self, step: BuildStep) -> Result<T, BuildError>;
}

impl<T> StepContext<T> for Result<T, SheetsError> {
    fn at(self, step: BuildStep) -> Result<T, BuildError> {
        self.map_err(|source| BuildError::Step { step, source })
    }
}

/// Errors from the LLM endpoint (extraction and chat).
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM request: {0}")]
    Request(#[from] reqwest::Error),

    #[error("LLM API error {0}: {1}")]
    Api(u16, String),

    #[error("LLM response parse: {0}")]
    Parse(String),

    #[error("LLM returned no content")]
    Empty,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config load failed: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("missing required setting: {0}")]
    Missing(&'static str),
}
