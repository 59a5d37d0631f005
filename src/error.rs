//! Error types for the controller core.
//!
//! None of these are fatal to the dispatch loop: validation failures drop the
//! offending frame, protocol and middleware failures are logged and skipped,
//! search failures are returned to the caller.

use crate::types::{Device, Phase, Position};
use thiserror::Error;

/// A frame or payload that does not form a valid message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("unknown message type `{0}`")]
    UnknownType(String),

    #[error("invalid `{kind}` payload `{payload}`: {reason}")]
    InvalidPayload {
        kind: &'static str,
        payload: String,
        reason: String,
    },

    #[error("frame exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },
}

impl ValidationError {
    pub fn payload(kind: &'static str, payload: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            kind,
            payload: payload.into(),
            reason: reason.into(),
        }
    }
}

/// A valid message that makes no sense in the current phase.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("`{kind}` from {device} is not handled while {phase}")]
    UnexpectedMessage {
        device: Device,
        kind: &'static str,
        phase: Phase,
    },

    #[error("unknown device label `{0}`")]
    UnknownDevice(String),
}

/// Why a shortest-path search produced no path.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SearchError {
    #[error("position {0} is outside the arena")]
    OutOfArena(Position),

    #[error("start {0} is not accessible")]
    StartInaccessible(Position),

    #[error("target {0} is not accessible")]
    TargetInaccessible(Position),

    #[error("no path from {start} to {target}")]
    Unreachable { start: Position, target: Position },
}

/// Failure inside one middleware or state handler.
#[derive(Debug, Error)]
pub enum MiddlewareError {
    #[error("an acknowledgement is already pending ({pending}), cannot expect {requested}")]
    AckPending { pending: String, requested: String },

    #[error("invalid robot position {0}")]
    InvalidPosition(Position),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    MapIo(#[from] MapIoError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Map persistence failures.
#[derive(Debug, Error)]
pub enum MapIoError {
    #[error("map file i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed map data: {0}")]
    Format(String),

    #[error("map is {found_width}x{found_height}, expected {width}x{height}")]
    Dimensions {
        width: usize,
        height: usize,
        found_width: usize,
        found_height: usize,
    },
}

/// A grid observer that could not take a change notification.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("observer `{observer}` failed: {reason}")]
pub struct ObserverError {
    pub observer: String,
    pub reason: String,
}

impl ObserverError {
    pub fn new(observer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            observer: observer.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Timer runs need a tokio runtime to spawn on.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    #[error("no tokio runtime available to run the timer")]
    NoRuntime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_error_converts_into_middleware_error() {
        let err: MiddlewareError = SearchError::TargetInaccessible(Position::new(13, 1)).into();
        assert!(matches!(err, MiddlewareError::Search(_)));
        assert_eq!(err.to_string(), "target 13,1 is not accessible");
    }

    #[test]
    fn payload_error_display() {
        let err = ValidationError::payload("mapupdate", "1,2", "expected 5 readings");
        assert_eq!(
            err.to_string(),
            "invalid `mapupdate` payload `1,2`: expected 5 readings"
        );
    }

    #[test]
    fn protocol_error_names_phase() {
        let err = ProtocolError::UnexpectedMessage {
            device: Device::Android,
            kind: "loadmap",
            phase: Phase::FastRun,
        };
        assert_eq!(err.to_string(), "`loadmap` from android is not handled while run");
    }
}
