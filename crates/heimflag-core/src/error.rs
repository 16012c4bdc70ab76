use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Options deserialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Options must be a JSON object, got {0}")]
    InvalidOptions(String),
    #[error("Invalid value for option '{option}': {reason}")]
    InvalidOption { option: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Non-fatal findings while ingesting context options.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigWarning {
    #[error("Unknown context option: {0}")]
    UnknownOption(String),
    #[error("Context option '{0}' cannot be set from JSON; use the builder")]
    NotSerializable(String),
    #[error("Feature '{key}' ignored: {reason}")]
    InvalidFeature { key: String, reason: String },
    #[error("Forced variation for '{0}' ignored: not an integer")]
    InvalidForcedVariation(String),
}

/// Destination for [`ConfigWarning`]s, injected by the host.
pub trait WarningSink {
    fn warn(&mut self, warning: ConfigWarning);
}

impl WarningSink for Vec<ConfigWarning> {
    fn warn(&mut self, warning: ConfigWarning) {
        self.push(warning);
    }
}

#[derive(Debug, Error)]
#[error("Tracking callback failed: {0}")]
pub struct TrackingError(pub String);

impl TrackingError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
