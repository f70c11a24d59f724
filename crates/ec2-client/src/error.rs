//! EC2 client errors

use thiserror::Error;

/// Errors that can occur when interacting with the EC2 API
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Ec2Error {
    /// Resource (or attachment) not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request conflicts with the current state of the resource
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A describe call used a filter name the API does not recognise
    #[error("unknown filter name: {0:?}")]
    UnknownFilter(String),

    /// Invalid request (e.g., missing required fields)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// EC2 API returned an error
    #[error("EC2 API error: {0}")]
    Api(String),
}

impl Ec2Error {
    /// True for `NotFound`, which callers usually treat as "absent" rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Ec2Error::NotFound(_))
    }
}
