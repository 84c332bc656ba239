//! Request files for the floor collaborator.
//!
//! One call per row: `time;floor;direction;destination[;fault]`, for example
//! `14:05:15.000;2;Up;4` or `14:06:00;6;down;1;DOOR_NOT_OPEN`. Blank rows and
//! rows starting with `#` are skipped; rows that do not parse are logged and
//! skipped.
//!
//! A call is identified by its time and floors, so two identical rows would
//! reach the dispatcher as the same call. The second one is dropped here, with
//! a warning.

use std::fs;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{info, warn};

use crate::modules::error::{Result, WireError};
use crate::modules::request_object::request_init::{Direction, Request};
use crate::modules::udp_functions::udp::parse_time;

/// parse_record
///
/// # Arguments:
///
/// * `record` - &StringRecord - One row, fields already trimmed.
///
/// # Returns:
///
/// Returns -Result<Option<Request>, WireError>- `None` for a row with nothing in it.
///
pub fn parse_record(record: &StringRecord) -> std::result::Result<Option<Request>, WireError> {
    if record.iter().all(str::is_empty) {
        return Ok(None);
    }
    if record.len() != 4 && record.len() != 5 {
        return Err(WireError::FieldCount {
            expected: "4 or 5",
            found: record.len(),
            payload: record.iter().collect::<Vec<_>>().join(";"),
        });
    }

    let number = |field: &str| field.parse::<u8>().map_err(|_| WireError::InvalidNumber(field.to_string()));
    let direction: Direction = record[2].to_ascii_uppercase().parse()?;
    let mut request = Request::init(parse_time(&record[0])?, number(&record[1])?, direction, number(&record[3])?);
    if let Some(tag) = record.get(4) {
        request.fault = tag.to_ascii_uppercase().parse()?;
    }
    Ok(Some(request))
}

/// parse_requests
/// Parses a whole file body, dropping bad rows and repeated calls, and orders
/// the calls by time.
///
/// # Arguments:
///
/// * `text` - &str - File contents.
///
/// # Returns:
///
/// Returns -Vec<Request>- Calls in the order they are to be placed.
///
pub fn parse_requests(text: &str) -> Vec<Request> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let mut requests = Vec::new();
    for row in reader.records() {
        let record = match row {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "skipping unreadable request row");
                continue;
            }
        };
        match parse_record(&record) {
            Ok(Some(request)) => requests.push(request),
            Ok(None) => {}
            Err(e) => {
                let line = record.position().map(|position| position.line());
                warn!(line, error = %e, "skipping request row");
            }
        }
    }

    requests.sort_by_key(|request| (request.requested_at, request.origin_floor, request.destination_floor));
    requests.dedup_by(|later, earlier| {
        let repeated = later.same_call(earlier);
        if repeated {
            warn!(request = %later, "identical call already in the file, dropped");
        }
        repeated
    });
    requests
}

pub fn load_requests(path: &Path) -> Result<Vec<Request>> {
    let text = fs::read_to_string(path)?;
    let requests = parse_requests(&text);
    info!(path = %path.display(), count = requests.len(), "request file loaded");
    Ok(requests)
}

//----------------------------------TESTS-------------------------------------------------------------
