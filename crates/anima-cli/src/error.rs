use std::fmt;

/// Message-carrying error for CLI operations. Everything that can fail
/// here ends up printed to stderr, so a single string payload is all
/// the structure the binary needs.
#[derive(Debug)]
pub struct CliError(pub String);

impl CliError {
    /// Prefix an underlying failure with what was being attempted.
    pub fn context(what: &str, err: impl fmt::Display) -> Self {
        CliError(format!("{what}: {err}"))
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CliError {}

impl From<String> for CliError {
    fn from(s: String) -> Self {
        CliError(s)
    }
}

impl From<&str> for CliError {
    fn from(s: &str) -> Self {
        CliError(s.to_string())
    }
}

impl From<anima::AnimaError> for CliError {
    fn from(e: anima::AnimaError) -> Self {
        CliError(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError(format!("JSON error: {e}"))
    }
}

impl From<toml::de::Error> for CliError {
    fn from(e: toml::de::Error) -> Self {
        CliError(format!("Config parse error: {e}"))
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError(format!("IO error: {e}"))
    }
}

pub type CliResult<T> = Result<T, CliError>;
