use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("invalid {field} '{value}': {reason}")]
    Invalid {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("invalid version '{0}', expected a number or 'tip'")]
    Version(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read configuration file [{path}]: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Server entry #{0} is missing a url")]
    MissingUrl(usize),

    #[error("Server entry #{0} has an empty url")]
    EmptyUrl(usize),

    #[error("Server url [{0}] is not a valid url")]
    InvalidUrl(String),

    #[error("Server url [{0}] appears more than once")]
    DuplicateUrl(String),

    #[error("The cache section requires a non-empty path")]
    MissingCachePath,
}

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No metadata.pbtxt or model.config found in [{0}]")]
    NotFound(PathBuf),

    #[error("metadata.pbtxt parse error at line {line}: {message}")]
    Pbtxt { line: usize, message: String },

    #[error("model.config parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("model.config is missing a <model> element")]
    MissingModelElement,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid request url: {0}")]
    InvalidUrl(String),

    #[error("Unable to read form attachment [{path}]: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Network error: {0}")]
    Network(String),
}
