//! One passenger's floor call and the small enums it carries.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::modules::error::{RequestError, WireError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    None,
}

/// Fault tag a request can carry through the system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Fault {
    NoFault,
    BadRequest,
    DoorNotOpen,
    DoorNotClose,
    Death,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub requested_at: NaiveTime,
    pub origin_floor: u8,
    pub direction: Direction,
    pub destination_floor: u8,
    pub loaded: bool,    // Passenger has boarded
    pub completed: bool, // Passenger has been dropped off
    pub fault: Fault,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::None => "NONE",
        }
    }

    /// Direction needed to get from `from` to `to`. Equal floors give `None`.
    pub fn between(from: u8, to: u8) -> Direction {
        if to > from {
            Direction::Up
        } else if to < from {
            Direction::Down
        } else {
            Direction::None
        }
    }

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::None => Direction::None,
        }
    }

    /// True when `floor` lies strictly past `reference` going this way.
    pub fn is_beyond(&self, floor: u8, reference: u8) -> bool {
        match self {
            Direction::Up => floor > reference,
            Direction::Down => floor < reference,
            Direction::None => false,
        }
    }

    /// The floor one step from `floor` in this direction.
    pub fn step_from(&self, floor: u8) -> u8 {
        match self {
            Direction::Up => floor.saturating_add(1),
            Direction::Down => floor.saturating_sub(1),
            Direction::None => floor,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "UP" => Ok(Direction::Up),
            "DOWN" => Ok(Direction::Down),
            "NONE" => Ok(Direction::None),
            other => Err(WireError::UnknownDirection(other.to_string())),
        }
    }
}

impl Fault {
    pub fn as_str(&self) -> &'static str {
        match self {
            Fault::NoFault => "NO_FAULT",
            Fault::BadRequest => "BAD_REQUEST",
            Fault::DoorNotOpen => "DOOR_NOT_OPEN",
            Fault::DoorNotClose => "DOOR_NOT_CLOSE",
            Fault::Death => "DEATH",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Fault::DoorNotOpen | Fault::DoorNotClose)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Fault {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "NO_FAULT" | "" => Ok(Fault::NoFault),
            "BAD_REQUEST" => Ok(Fault::BadRequest),
            "DOOR_NOT_OPEN" => Ok(Fault::DoorNotOpen),
            "DOOR_NOT_CLOSE" => Ok(Fault::DoorNotClose),
            "DEATH" => Ok(Fault::Death),
            other => Err(WireError::UnknownFault(other.to_string())),
        }
    }
}

impl Request {
    pub fn init(requested_at: NaiveTime, origin_floor: u8, direction: Direction, destination_floor: u8) -> Request {
        Self {
            requested_at,
            origin_floor,
            direction,
            destination_floor,
            loaded: false,
            completed: false,
            fault: Fault::NoFault,
        }
    }

    pub fn with_fault(mut self, fault: Fault) -> Request {
        self.fault = fault;
        self
    }

    /// Direction the passenger actually travels, derived from the floors.
    pub fn travel_direction(&self) -> Direction {
        Direction::between(self.origin_floor, self.destination_floor)
    }

    /// Distance in floors between pickup and drop-off.
    pub fn span(&self) -> u32 {
        u32::from(self.origin_floor.abs_diff(self.destination_floor))
    }

    /// validate
    ///
    /// Classifies BadRequests: tagged ones, zero-length trips and requests whose
    /// direction does not take the passenger from origin to destination.
    ///
    /// # Returns:
    ///
    /// Returns -Result<(), RequestError>- Ok when the request can be scheduled.
    ///
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.fault == Fault::BadRequest {
            return Err(RequestError::Tagged);
        }
        if self.origin_floor == self.destination_floor {
            return Err(RequestError::SameFloor(self.origin_floor));
        }
        if self.direction == Direction::None {
            return Err(RequestError::NoDirection);
        }
        if self.direction != self.travel_direction() {
            return Err(RequestError::DirectionMismatch {
                direction: self.direction,
                origin: self.origin_floor,
                destination: self.destination_floor,
            });
        }
        Ok(())
    }

    /// Two requests are the same call if they were made at the same time for the
    /// same trip, whatever their lifecycle flags say. Two passengers making the
    /// identical call count as one.
    pub fn same_call(&self, other: &Request) -> bool {
        self.requested_at == other.requested_at
            && self.origin_floor == other.origin_floor
            && self.direction == other.direction
            && self.destination_floor == other.destination_floor
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}->{} ({})",
            self.requested_at.format("%H:%M:%S%.3f"),
            self.origin_floor,
            self.destination_floor,
            self.direction
        )
    }
}

//----------------------------------TESTS-------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        assert_eq!(Request::init(at(14, 5, 15), 2, Direction::Up, 4).validate(), Ok(()));
        assert_eq!(Request::init(at(14, 5, 15), 6, Direction::Down, 1).validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_bad_requests() {
        let tagged = Request::init(at(9, 0, 0), 2, Direction::Up, 4).with_fault(Fault::BadRequest);
        assert_eq!(tagged.validate(), Err(RequestError::Tagged));

        let same = Request::init(at(9, 0, 0), 3, Direction::Up, 3);
        assert_eq!(same.validate(), Err(RequestError::SameFloor(3)));

        let none = Request::init(at(9, 0, 0), 3, Direction::None, 5);
        assert_eq!(none.validate(), Err(RequestError::NoDirection));

        let wrong_way = Request::init(at(9, 0, 0), 2, Direction::Down, 3);
        assert!(matches!(wrong_way.validate(), Err(RequestError::DirectionMismatch { .. })));
    }

    #[test]
    fn test_same_call_ignores_flags() {
        let call = Request::init(at(10, 0, 0), 1, Direction::Up, 7);
        let mut done = call.clone();
        done.loaded = true;
        done.completed = true;
        assert!(call.same_call(&done));

        let later = Request::init(at(10, 0, 1), 1, Direction::Up, 7);
        assert!(!call.same_call(&later));
    }

    #[test]
    fn test_direction_helpers() {
        assert_eq!(Direction::between(3, 7), Direction::Up);
        assert_eq!(Direction::between(7, 3), Direction::Down);
        assert_eq!(Direction::between(4, 4), Direction::None);
        assert!(Direction::Up.is_beyond(5, 4));
        assert!(!Direction::Up.is_beyond(4, 4));
        assert!(Direction::Down.is_beyond(0, 1));
        assert_eq!(Direction::Down.step_from(0), 0);
        assert_eq!("DOWN".parse::<Direction>(), Ok(Direction::Down));
        assert!("SIDEWAYS".parse::<Direction>().is_err());
        assert_eq!("DOOR_NOT_CLOSE".parse::<Fault>(), Ok(Fault::DoorNotClose));
    }
}
