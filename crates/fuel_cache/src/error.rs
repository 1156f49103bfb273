use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Identifier [{0}] needs a server url, an owner and a name")]
    IncompleteIdentifier(String),

    #[error("Destination [{0}] already exists")]
    AlreadyExists(PathBuf),

    #[error("No manifest found after extracting into [{0}]")]
    MissingManifest(PathBuf),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
