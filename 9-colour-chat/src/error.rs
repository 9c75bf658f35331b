//! Errors surfaced to a connected user or to the code driving the hub.
//!
//! The `Display` text of [`AuthError`] and [`ProtocolError`] is exactly what
//! the session writes back to the connection.

use thiserror::Error;

/// Reasons a `login` or `register` attempt is refused.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("Wrong username/password details.")]
    WrongCredentials,

    #[error("Someone has already logged in to this account!")]
    AlreadyLoggedIn,

    #[error("Username already exists. Please choose a different username.")]
    DuplicateUsername,
}

/// A pre-auth line that is not one of the accepted commands.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// `login`/`register` without exactly a username and a password.
    #[error("Invalid command. Please try again.")]
    WrongArgumentCount,

    #[error("Invalid command. Please use 'login' or 'register'.")]
    UnknownCommand,
}

/// The hub task is gone, so membership events can no longer be delivered.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("chat hub is no longer running")]
pub struct HubClosed;
