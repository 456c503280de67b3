//! Errors returned when editing a command line.

/// An error from a [`crate::Kargs`] mutation or lookup.
///
/// Failed operations never leave the command line partially modified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The key contains whitespace and can't be written as one argument.
    #[error("key '{0}' contains invalid characters")]
    InvalidKey(String),
    /// No argument matched the requested key (or `key=value`).
    #[error("kernel argument '{0}' does not exist")]
    NotExists(String),
}
