//! Errors of the link services

use thiserror::Error;

use crate::password;
use crate::storage;

/// Everything that can go wrong creating, resolving or managing links
#[derive(Debug, Error)]
pub enum LinkError {
    /// Malformed URL, missing field, bad date or bad geo rule
    #[error("{0}")]
    InvalidInput(String),

    /// The custom alias is already used by another link, deleted or not
    #[error("Custom alias is already in use")]
    AliasTaken,

    /// Every generated code collided with an existing one
    #[error("Could not generate a unique code, please try again")]
    GenerationExhausted,

    /// No such link, or not one of the caller
    #[error("Link not found")]
    NotFound,

    /// Owner-scoped operation without an owner
    #[error("Unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Storage(#[from] storage::Error),

    #[error(transparent)]
    Password(#[from] password::Error),
}

impl LinkError {
    pub fn invalid_input<M>(message: M) -> Self
    where
        M: ToString,
    {
        Self::InvalidInput(message.to_string())
    }
}
