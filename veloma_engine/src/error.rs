//! Configuration-time errors.
//!
//! Nothing on the tick path returns an error: backend failures are handled
//! inside the lifecycle controller and only logged.

use std::fmt;

use veloma_music::PoolError;

#[derive(Clone, Debug, PartialEq)]
pub enum EngineError {
    /// A config field is outside its allowed range.
    InvalidConfig { field: &'static str, reason: String },
    /// The scale/root/octave combination produced no playable pitches.
    Pool(PoolError),
}

impl EngineError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        EngineError::InvalidConfig { field, reason: reason.into() }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidConfig { field, reason } => {
                write!(f, "invalid {}: {}", field, reason)
            }
            EngineError::Pool(e) => write!(f, "pitch pool: {}", e),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Pool(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PoolError> for EngineError {
    fn from(e: PoolError) -> Self { EngineError::Pool(e) }
}
