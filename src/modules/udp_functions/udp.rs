//! ## UDP Module
//! This module turns the ASCII datagrams exchanged by the dispatcher, the car
//! process and the floor collaborator into typed messages and back.
//!
//! ## Message Types:
//! - **Request:** `time;direction;origin;destination;loaded;completed[;fault]`. Floor to dispatcher,
//!   and car process to dispatcher for completions and bounces.
//! - **Dispatch:** a request followed by the 4-byte big-endian id of the chosen car.
//! - **StatusQuery:** the literal `GET-INFO`.
//! - **StatusReport:** one `carId;state;floor;direction` line per car.
//! - **FaultNotice:** `<TAG> fault encountered by Elevator <id> at floor <floor>`.
//! - **Movement:** `carId;state;nextFloor;direction;destination;unloaded;loaded`.
//!
//! ## The functions includes:
//! - 'msg_serialize'    encodes a `UdpMsg` into datagram bytes.
//! - 'msg_deserialize'  classifies a datagram and decodes it into a `UdpMsg`.
//! - 'encode_request' / 'decode_request'  the request text used inside several messages.
//!
//! Nothing past this module ever looks at the raw strings.

//----------------------------------------------Imports
use std::fmt;

use chrono::NaiveTime;

use crate::modules::car_object::car_status_functions::{CarInfo, Status};
use crate::modules::error::WireError;
use crate::modules::request_object::request_init::{Direction, Fault, Request};

//-------------- GLOBALS/and CONSTANTS
pub const GET_INFO: &str = "GET-INFO";
pub const MAX_DATAGRAM: usize = 1024;
const FAULT_CLAUSE: &str = " fault encountered by Elevator ";
const CAR_ID_BYTES: usize = 4;

//----------------------------------------------Enum
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    Request,
    Dispatch,
    StatusQuery,
    StatusReport,
    FaultNotice,
    Movement,
}

//----------------------------------------------Structs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaultNotice {
    pub fault: Fault,
    pub car_id: u8,
    pub floor: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MovementNotice {
    pub car_id: u8,
    pub status: Status,
    pub next_floor: u8,
    pub direction: Direction,
    pub destination_floor: u8,
    pub unloaded: usize,
    pub loaded: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum UdpMsg {
    Request(Request),
    Dispatch { request: Request, car_id: u8 },
    StatusQuery,
    StatusReport(Vec<CarInfo>),
    FaultNotice(FaultNotice),
    Movement(MovementNotice),
}

impl UdpMsg {
    pub fn message_type(&self) -> MessageType {
        match self {
            UdpMsg::Request(_) => MessageType::Request,
            UdpMsg::Dispatch { .. } => MessageType::Dispatch,
            UdpMsg::StatusQuery => MessageType::StatusQuery,
            UdpMsg::StatusReport(_) => MessageType::StatusReport,
            UdpMsg::FaultNotice(_) => MessageType::FaultNotice,
            UdpMsg::Movement(_) => MessageType::Movement,
        }
    }
}

impl fmt::Display for FaultNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{} at floor {}", self.fault, FAULT_CLAUSE, self.car_id, self.floor)
    }
}

impl fmt::Display for MovementNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{};{};{};{};{};{}",
            self.car_id,
            self.status,
            self.next_floor,
            self.direction,
            self.destination_floor,
            self.unloaded,
            self.loaded
        )
    }
}

/// encode_request
///
/// # Arguments:
///
/// * `request` - &Request - Request to encode.
///
/// # Returns:
///
/// Returns -String- `time;direction;origin;destination;loaded;completed`, with the
/// fault tag appended as a seventh field only when the request carries one.
///
pub fn encode_request(request: &Request) -> String {
    let mut text = format!(
        "{};{};{};{};{};{}",
        request.requested_at.format("%H:%M:%S%.f"),
        request.direction,
        request.origin_floor,
        request.destination_floor,
        flag(request.loaded),
        flag(request.completed)
    );
    if request.fault != Fault::NoFault {
        text.push(';');
        text.push_str(request.fault.as_str());
    }
    text
}

/// decode_request
///
/// # Arguments:
///
/// * `text` - &str - Six or seven semicolon separated fields.
///
/// # Returns:
///
/// Returns -Result<Request, WireError>- The request, or why the text is not one.
///
pub fn decode_request(text: &str) -> Result<Request, WireError> {
    let fields: Vec<&str> = text.trim().split(';').collect();
    if fields.len() != 6 && fields.len() != 7 {
        return Err(WireError::FieldCount {
            expected: "6 or 7",
            found: fields.len(),
            payload: text.to_string(),
        });
    }

    let mut request = Request::init(
        parse_time(fields[0])?,
        parse_number(fields[2])?,
        fields[1].parse()?,
        parse_number(fields[3])?,
    );
    request.loaded = parse_flag(fields[4])?;
    request.completed = parse_flag(fields[5])?;
    if let Some(tag) = fields.get(6) {
        request.fault = tag.parse()?;
    }
    Ok(request)
}

/// msg_serialize
/// Turns a message into the bytes that go on the wire.
///
/// # Arguments:
///
/// * `msg` - &UdpMsg - Message to send.
///
/// # Returns:
///
/// Returns -Vec<u8>- Datagram payload.
///
pub fn msg_serialize(msg: &UdpMsg) -> Vec<u8> {
    match msg {
        UdpMsg::Request(request) => encode_request(request).into_bytes(),
        UdpMsg::Dispatch { request, car_id } => {
            let mut bytes = encode_request(request).into_bytes();
            bytes.extend_from_slice(&u32::from(*car_id).to_be_bytes());
            bytes
        }
        UdpMsg::StatusQuery => GET_INFO.as_bytes().to_vec(),
        UdpMsg::StatusReport(cars) => cars
            .iter()
            .map(|car| format!("{};{};{};{}", car.id, car.status, car.floor, car.direction))
            .collect::<Vec<_>>()
            .join("\n")
            .into_bytes(),
        UdpMsg::FaultNotice(notice) => notice.to_string().into_bytes(),
        UdpMsg::Movement(notice) => notice.to_string().into_bytes(),
    }
}

/// msg_deserialize
/// Classifies a datagram by its shape and decodes it.
///
/// A dispatch packet is recognised by its binary tail: text never contains a NUL
/// byte, and the first byte of a car id below 2^24 always is one.
///
/// # Arguments:
///
/// * `buffer` - &[u8] - Received datagram.
///
/// # Returns:
///
/// Returns -Result<UdpMsg, WireError>- The decoded message.
///
pub fn msg_deserialize(buffer: &[u8]) -> Result<UdpMsg, WireError> {
    if buffer.len() > CAR_ID_BYTES && buffer[buffer.len() - CAR_ID_BYTES] == 0 {
        let (text, id_bytes) = buffer.split_at(buffer.len() - CAR_ID_BYTES);
        let request = decode_request(as_text(text)?)?;
        let raw_id = u32::from_be_bytes([id_bytes[0], id_bytes[1], id_bytes[2], id_bytes[3]]);
        let car_id = u8::try_from(raw_id).map_err(|_| WireError::CarIdOutOfRange(raw_id))?;
        return Ok(UdpMsg::Dispatch { request, car_id });
    }

    let text = as_text(buffer)?.trim();
    if text == GET_INFO {
        return Ok(UdpMsg::StatusQuery);
    }
    if let Some((tag, rest)) = text.split_once(FAULT_CLAUSE) {
        return decode_fault_notice(tag, rest).map(UdpMsg::FaultNotice);
    }

    let first_line = text.lines().next().unwrap_or_default();
    let fields: Vec<&str> = first_line.split(';').collect();
    match fields.len() {
        4 => decode_status_report(text).map(UdpMsg::StatusReport),
        7 if fields[0].parse::<u8>().is_ok() => decode_movement(&fields).map(UdpMsg::Movement),
        6 | 7 => decode_request(text).map(UdpMsg::Request),
        _ => Err(WireError::Unrecognised(text.to_string())),
    }
}

/// Decodes a full status report. Unknown state words become `Status::Unknown`.
pub fn decode_status_report(text: &str) -> Result<Vec<CarInfo>, WireError> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let fields: Vec<&str> = line.split(';').collect();
            if fields.len() != 4 {
                return Err(WireError::FieldCount {
                    expected: "4",
                    found: fields.len(),
                    payload: line.to_string(),
                });
            }
            Ok(CarInfo {
                id: parse_number(fields[0])?,
                status: fields[1].parse()?,
                floor: parse_number(fields[2])?,
                direction: fields[3].parse()?,
            })
        })
        .collect()
}

fn decode_fault_notice(tag: &str, rest: &str) -> Result<FaultNotice, WireError> {
    let (id, floor) = rest
        .split_once(" at floor ")
        .ok_or_else(|| WireError::Unrecognised(rest.to_string()))?;
    Ok(FaultNotice {
        fault: tag.parse()?,
        car_id: parse_number(id)?,
        floor: parse_number(floor)?,
    })
}

fn decode_movement(fields: &[&str]) -> Result<MovementNotice, WireError> {
    Ok(MovementNotice {
        car_id: parse_number(fields[0])?,
        status: fields[1].parse()?,
        next_floor: parse_number(fields[2])?,
        direction: fields[3].parse()?,
        destination_floor: parse_number(fields[4])?,
        unloaded: parse_number(fields[5])?,
        loaded: parse_number(fields[6])?,
    })
}

fn as_text(bytes: &[u8]) -> Result<&str, WireError> {
    if !bytes.is_ascii() {
        return Err(WireError::NotText);
    }
    std::str::from_utf8(bytes).map_err(|_| WireError::NotText)
}

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

fn parse_flag(field: &str) -> Result<bool, WireError> {
    match field.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Err(WireError::InvalidFlag(other.to_string())),
    }
}

fn parse_number<T: std::str::FromStr>(field: &str) -> Result<T, WireError> {
    field.trim().parse().map_err(|_| WireError::InvalidNumber(field.to_string()))
}

/// ISO local time, with or without seconds and fraction.
pub fn parse_time(field: &str) -> Result<NaiveTime, WireError> {
    let field = field.trim();
    NaiveTime::parse_from_str(field, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(field, "%H:%M"))
        .map_err(|_| WireError::InvalidTime(field.to_string()))
}

//----------------------------------TESTS-------------------------------------------------------------
