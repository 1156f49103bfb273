use fuel_cache::CacheError;
use fuel_core::error::{MetadataError, TransportError};
use thiserror::Error;

/// Failures inside the client. Public operations fold them into a
/// [`fuel_core::result::FuelResult`] after logging them.
#[derive(Error, Debug)]
pub enum FuelClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Server returned error {0}: {1}")]
    ServerError(u16, String),

    #[error("Url grammar error: {0}")]
    Grammar(#[from] regex::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, FuelClientError>;
