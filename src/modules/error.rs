//! Error types shared by every part of the elevator bank.
//!
//! Decoding never panics: malformed datagrams surface as [`WireError`],
//! car rejections as [`QueueError`] and intake rejections as [`RequestError`].

use thiserror::Error;

use crate::modules::request_object::request_init::Direction;

/// Failures while turning a datagram or a text line into a typed value.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WireError {
    #[error("expected {expected} fields, found {found} in {payload:?}")]
    FieldCount { expected: &'static str, found: usize, payload: String },

    #[error("unknown direction {0:?}")]
    UnknownDirection(String),

    #[error("unknown fault tag {0:?}")]
    UnknownFault(String),

    #[error("invalid flag {0:?}, expected \"1\" or \"0\"")]
    InvalidFlag(String),

    #[error("invalid number {0:?}")]
    InvalidNumber(String),

    #[error("invalid time of day {0:?}")]
    InvalidTime(String),

    #[error("payload is not ASCII text")]
    NotText,

    #[error("car id {0} does not fit a car identifier")]
    CarIdOutOfRange(u32),

    #[error("unrecognised message {0:?}")]
    Unrecognised(String),
}

/// Reasons a car refuses to put a request into its queue.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueueError {
    #[error("car {car_id} is full ({capacity} passengers)")]
    Full { car_id: u8, capacity: usize },

    #[error("floor {requested} already passed going {direction:?} (head destination {head})")]
    PassedFloor { requested: u8, head: u8, direction: Direction },

    #[error("car {0} is out of service")]
    OutOfService(u8),

    #[error(transparent)]
    Invalid(#[from] RequestError),
}

/// Why a request is classified as a BadRequest at intake.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RequestError {
    #[error("request is tagged BAD_REQUEST")]
    Tagged,

    #[error("origin and destination are both floor {0}")]
    SameFloor(u8),

    #[error("request has no direction")]
    NoDirection,

    #[error("direction {direction:?} does not lead from floor {origin} to floor {destination}")]
    DirectionMismatch { direction: Direction, origin: u8, destination: u8 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Crate-wide error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no reply to status query within {0} ms")]
    StatusTimeout(u64),

    #[error("car {0} has stopped")]
    CarStopped(u8),
}

pub type Result<T> = std::result::Result<T, Error>;
