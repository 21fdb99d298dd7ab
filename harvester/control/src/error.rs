use thiserror::Error;

/// Invalid startup parameters. Fatal: the loop never starts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// The target identifier is empty.
    #[error("host is empty")]
    EmptyTarget,
    /// A field that must be strictly positive is zero, negative, or not finite.
    #[error("{field} must be greater than 0")]
    NotPositive {
        /// Name of the offending field.
        field: &'static str,
    },
    /// The configured extraction success chance lies outside `[0, 1]`.
    #[error("extraction_chance must be between 0 and 1, got {0}")]
    ExtractionChanceOutOfRange(f64),
    /// The step profile could not be read or parsed.
    #[error("invalid step profile: {0}")]
    InvalidProfile(String),
}

/// Failures that stop a running controller.
///
/// Zero-effect actions and unreadable tuning records are feedback, not
/// errors, and never surface here.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Configuration rejected while building the controller.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A required collaborator was not supplied to the builder.
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),
    /// The target, executor, or tuning store failed.
    #[error("collaborator failure: {0}")]
    Collaborator(#[from] anyhow::Error),
}
