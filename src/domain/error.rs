//! レジストリ操作のエラー型

use thiserror::Error;

/// Client registry errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The username is held by a currently-connected client
    #[error("Username already taken, try another.")]
    UsernameTaken,

    /// No connected client carries that username
    #[error("User not found.")]
    UserNotFound,
}
