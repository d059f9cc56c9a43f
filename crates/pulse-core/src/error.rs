use thiserror::Error;

#[derive(Debug, Error)]
pub enum PulseError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PulseError {
    /// Short error code string for logs and JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            PulseError::Config(_) => "config_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, PulseError>;
