//! Status values a car reports about itself, and the snapshot it publishes
//! so that readers never wait on the movement loop.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::modules::error::WireError;
use crate::modules::request_object::request_init::Direction;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DoorState {
    Open,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotorState {
    On,
    Off,
}

/// State word carried in status lines and movement notifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Idle,
    Transporting,
    Fault,
    Unknown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Idle => "IDLE",
            Status::Transporting => "TRANSPORTING",
            Status::Fault => "FAULT",
            Status::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Never fails: a word we do not know is reported as `Unknown`.
impl FromStr for Status {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "IDLE" => Status::Idle,
            "TRANSPORTING" => Status::Transporting,
            "FAULT" => Status::Fault,
            _ => Status::Unknown,
        })
    }
}

/// One line of a status report: `carId;state;currentFloor;direction`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarInfo {
    pub id: u8,
    pub status: Status,
    pub floor: u8,
    pub direction: Direction,
}

/// Everything a reader may want to know about a car at one instant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CarSnapshot {
    pub id: u8,
    pub status: Status,
    pub current_floor: u8,
    pub direction: Direction,
    pub door: DoorState,
    pub motor: MotorState,
    pub queue_len: usize,
}

impl CarSnapshot {
    pub fn info(&self) -> CarInfo {
        CarInfo {
            id: self.id,
            status: self.status,
            floor: self.current_floor,
            direction: self.direction,
        }
    }
}

/// Shared cell the car writes after every change and readers copy out of.
#[derive(Clone, Debug)]
pub struct SharedSnapshot(Arc<Mutex<CarSnapshot>>);

impl SharedSnapshot {
    pub fn new(snapshot: CarSnapshot) -> SharedSnapshot {
        SharedSnapshot(Arc::new(Mutex::new(snapshot)))
    }

    pub fn read(&self) -> CarSnapshot {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn publish(&self, snapshot: CarSnapshot) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}

//----------------------------------TESTS-------------------------------------------------------------
