//! The shape results take at the scripting boundary.
//!
//! Script callers never see a raised error: a failed call returns
//! `nil, message[, code]`, so "no more items" (a bare `nil`) stays
//! distinguishable from failure.

use std::fmt;

use serde::Serialize;

use crate::error::Error;

/// The `message, code` half of a `nil, message, code` return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    /// Human-readable description.
    pub message: String,
    /// errno-style code, when the transport supplied one.
    pub code: Option<i32>,
}

impl From<&Error> for Failure {
    fn from(err: &Error) -> Self {
        Self { message: err.to_string(), code: err.code() }
    }
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        Self::from(&err)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Result as a script caller receives it.
pub type ScriptResult<T> = Result<T, Failure>;

/// Converts core results into [`ScriptResult`]s.
pub trait IntoScript<T> {
    /// Maps the error side to a [`Failure`].
    ///
    /// # Errors
    ///
    /// Returns the failure triple when `self` is an error.
    fn into_script(self) -> ScriptResult<T>;
}

impl<T> IntoScript<T> for crate::Result<T> {
    fn into_script(self) -> ScriptResult<T> {
        self.map_err(Failure::from)
    }
}
