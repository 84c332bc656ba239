//! ## Floor Module
//! Stands in for the floors of the building: it replays a file of passenger
//! calls to the dispatcher in their recorded rhythm and shows where every car
//! is from the movement and fault notices the cars send back.

//----------------------------------------------Imports
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use super::csv_parser::load_requests;
use crate::modules::car_object::car_status_functions::Status;
use crate::modules::config::SimConfig;
use crate::modules::error::Result;
use crate::modules::request_object::request_init::{Direction, Request};
use crate::modules::udp_functions::udp::UdpMsg;
use crate::modules::udp_functions::udp_handler_init::{init_udp_handler, UdpHandler};

//----------------------------------------------Structs
/// What the floor lamps show for one car.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Lamp {
    pub floor: u8,
    pub direction: Direction,
    pub status: Status,
    pub destination_floor: Option<u8>,
}

#[derive(Clone, Debug, Default)]
pub struct FloorDisplay {
    lamps: HashMap<u8, Lamp>,
}

impl FloorDisplay {
    /// apply
    /// Updates the lamps from one notice from the cars.
    ///
    /// # Arguments:
    ///
    /// * `msg` - &UdpMsg - Decoded datagram.
    ///
    /// # Returns:
    ///
    /// Returns -bool- False if the message is not meant for the floors.
    ///
    pub fn apply(&mut self, msg: &UdpMsg) -> bool {
        match msg {
            UdpMsg::Movement(notice) => {
                info!(
                    car = notice.car_id,
                    floor = notice.next_floor,
                    direction = %notice.direction,
                    destination = notice.destination_floor,
                    unloaded = notice.unloaded,
                    loaded = notice.loaded,
                    "car moved"
                );
                self.lamps.insert(
                    notice.car_id,
                    Lamp {
                        floor: notice.next_floor,
                        direction: notice.direction,
                        status: notice.status,
                        destination_floor: Some(notice.destination_floor),
                    },
                );
                true
            }
            UdpMsg::FaultNotice(notice) => {
                if notice.fault.is_transient() {
                    warn!(car = notice.car_id, floor = notice.floor, fault = notice.fault.as_str(), "door trouble");
                    return true;
                }
                error!(car = notice.car_id, floor = notice.floor, fault = notice.fault.as_str(), "car out of service");
                self.lamps.insert(
                    notice.car_id,
                    Lamp { floor: notice.floor, direction: Direction::None, status: Status::Fault, destination_floor: None },
                );
                true
            }
            other => {
                warn!(message_type = ?other.message_type(), "floor ignoring message");
                false
            }
        }
    }

    pub fn lamp(&self, car_id: u8) -> Option<Lamp> {
        self.lamps.get(&car_id).copied()
    }

    pub fn len(&self) -> usize {
        self.lamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lamps.is_empty()
    }
}

/// replay_offsets
/// Pairs every request with its delay after the first one. Expects requests sorted by time.
///
/// # Arguments:
///
/// * `requests` - Vec<Request> - Calls in time order.
///
/// # Returns:
///
/// Returns -Vec<(Duration, Request)>- Delay from the start of the replay and the request.
///
pub fn replay_offsets(requests: Vec<Request>) -> Vec<(Duration, Request)> {
    let Some(first) = requests.first().map(|request| request.requested_at) else {
        return Vec::new();
    };
    requests
        .into_iter()
        .map(|request| {
            let offset = request.requested_at.signed_duration_since(first).to_std().unwrap_or_default();
            (offset, request)
        })
        .collect()
}

/// Sends every request to the dispatcher at its offset. Returns how many went out.
pub fn replay(udp: &UdpHandler, dispatcher: SocketAddr, requests: Vec<Request>) -> usize {
    let start = Instant::now();
    let mut sent = 0;

    for (offset, request) in replay_offsets(requests) {
        thread::sleep((start + offset).saturating_duration_since(Instant::now()));
        match udp.send(dispatcher, &UdpMsg::Request(request.clone())) {
            Ok(()) => {
                info!(%request, "call placed");
                sent += 1;
            }
            Err(e) => warn!(%request, error = %e, "could not place call"),
        }
    }
    sent
}

pub fn spawn_replayer(udp: UdpHandler, dispatcher: SocketAddr, requests: Vec<Request>) -> Result<JoinHandle<usize>> {
    let handle = thread::Builder::new()
        .name("floor-replay".into())
        .spawn(move || {
            let sent = replay(&udp, dispatcher, requests);
            info!(sent, "replay finished");
            sent
        })?;
    Ok(handle)
}

/// run_floor
/// Loads `file`, starts the replay and keeps the lamps updated forever.
///
/// # Arguments:
///
/// * `config` - Arc<SimConfig> - Addresses of the floor socket and the dispatcher.
/// * `file` - &Path - Request file.
///
pub fn run_floor(config: Arc<SimConfig>, file: &Path) -> Result<()> {
    let requests = load_requests(file)?;
    let udp = init_udp_handler(config.network.floor_addr)?;
    info!(addr = %udp.local_addr()?, calls = requests.len(), "floor up");

    let _replayer = spawn_replayer(udp.clone(), config.network.dispatcher_addr, requests)?;

    let mut display = FloorDisplay::default();
    loop {
        listen_once(&udp, &mut display, None);
    }
}

/// listen_once
/// Feeds at most one datagram into the display. A failed receive is logged and
/// the floor keeps listening.
///
/// # Arguments:
///
/// * `udp` - &UdpHandler - Floor socket.
/// * `display` - &mut FloorDisplay - Lamps to update.
/// * `max_wait` - Option<Duration> - How long to wait; `None` blocks.
///
/// # Returns:
///
/// Returns -bool- True if a notice was applied.
///
pub fn listen_once(udp: &UdpHandler, display: &mut FloorDisplay, max_wait: Option<Duration>) -> bool {
    match udp.receive(max_wait) {
        Ok(Some((msg, _sender))) => display.apply(&msg),
        Ok(None) => false,
        Err(e) => {
            warn!(error = %e, "receive failed");
            false
        }
    }
}

//----------------------------------TESTS-------------------------------------------------------------
