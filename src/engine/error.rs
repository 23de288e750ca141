use thiserror::Error;

use crate::model::Vin;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("vehicle already provisioned: {0}")]
    AlreadyExists(Vin),
    #[error("invalid VIN: {0:?}")]
    InvalidVin(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    /// The backing log could not be read or written.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}
