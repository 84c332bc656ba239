//! ## Car Subsystem
//! The process that owns the cars. It answers status polls, routes dispatch
//! packets to the addressed car and forwards everything the cars report:
//! completions and bounces to the dispatcher, movement and fault notices to the
//! floor collaborator.

//----------------------------------------------Imports
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel as cbc;
use tracing::{error, info, warn};

use crate::modules::car_object::car::CarEvent;
use crate::modules::car_object::car_handle::{spawn_car, CarHandle};
use crate::modules::car_object::car_status_functions::CarInfo;
use crate::modules::config::SimConfig;
use crate::modules::error::Result;
use crate::modules::request_object::request_init::{Fault, Request};
use crate::modules::udp_functions::udp::UdpMsg;
use crate::modules::udp_functions::udp_handler_init::{init_udp_handler, UdpHandler};

pub struct CarSubsystem {
    cars: Vec<CarHandle>,
    udp: UdpHandler,
    _forwarder: JoinHandle<()>,
}

impl CarSubsystem {
    /// init
    /// Binds the car-process socket, parks `num_cars` cars (ids from 1) at floor 0
    /// and starts forwarding their events.
    ///
    /// # Arguments:
    ///
    /// * `config` - Arc<SimConfig> - Timings, car count and peer addresses.
    ///
    /// # Returns:
    ///
    /// Returns -Result<CarSubsystem>- The running subsystem.
    ///
    pub fn init(config: Arc<SimConfig>) -> Result<CarSubsystem> {
        let udp = init_udp_handler(config.network.car_subsystem_addr)?;
        let (event_tx, event_rx) = cbc::unbounded();

        let cars = (1..=config.num_cars)
            .map(|id| spawn_car(id, 0, Arc::clone(&config), event_tx.clone()))
            .collect::<Result<Vec<_>>>()?;
        drop(event_tx);

        let forwarder = spawn_event_forwarder(
            udp.clone(),
            event_rx,
            config.network.dispatcher_addr,
            config.network.floor_addr,
        )?;
        info!(addr = %udp.local_addr()?, cars = cars.len(), "car subsystem up");

        Ok(CarSubsystem { cars, udp, _forwarder: forwarder })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.udp.local_addr()
    }

    pub fn car(&self, id: u8) -> Option<&CarHandle> {
        self.cars.iter().find(|car| car.id == id)
    }

    pub fn status_report(&self) -> Vec<CarInfo> {
        self.cars.iter().map(CarHandle::info).collect()
    }

    /// handle_message
    ///
    /// # Arguments:
    ///
    /// * `msg` - UdpMsg - Decoded datagram.
    ///
    /// # Returns:
    ///
    /// Returns -Option<UdpMsg>- Reply for the sender, if the message calls for one.
    ///
    pub fn handle_message(&self, msg: UdpMsg) -> Option<UdpMsg> {
        match msg {
            UdpMsg::StatusQuery => Some(UdpMsg::StatusReport(self.status_report())),
            UdpMsg::Dispatch { request, car_id } => {
                self.handle_dispatch(request, car_id);
                None
            }
            other => {
                warn!(message_type = ?other.message_type(), "car subsystem ignoring message");
                None
            }
        }
    }

    fn handle_dispatch(&self, request: Request, car_id: u8) {
        let Some(car) = self.car(car_id) else {
            warn!(%request, car = car_id, "dispatch for unknown car");
            return;
        };

        let sent = match request.fault {
            Fault::BadRequest => {
                warn!(%request, car = car_id, "bad request ignored");
                return;
            }
            Fault::Death => {
                warn!(car = car_id, "DEATH injected");
                car.inject_fault()
            }
            _ => car.assign(request),
        };
        if let Err(e) = sent {
            error!(car = car_id, error = %e, "could not reach car");
        }
    }

    /// serve_once
    /// Handles at most one datagram. Socket errors are logged and swallowed, so
    /// one bad receive never stops the cars.
    ///
    /// # Arguments:
    ///
    /// * `max_wait` - Option<Duration> - How long to wait; `None` blocks.
    ///
    /// # Returns:
    ///
    /// Returns -bool- True if a datagram was handled.
    ///
    pub fn serve_once(&self, max_wait: Option<Duration>) -> bool {
        let (msg, sender) = match self.udp.receive(max_wait) {
            Ok(Some(received)) => received,
            Ok(None) => return false,
            Err(e) => {
                warn!(error = %e, "receive failed");
                return false;
            }
        };
        if let Some(reply) = self.handle_message(msg) {
            if let Err(e) = self.udp.send(sender, &reply) {
                warn!(to = %sender, error = %e, "status reply failed");
            }
        }
        true
    }

    /// Serves the socket forever.
    pub fn run(&self) -> Result<()> {
        loop {
            self.serve_once(None);
        }
    }
}

/// spawn_event_forwarder
/// Turns car events into datagrams until every car has stopped.
///
/// # Arguments:
///
/// * `udp` - UdpHandler - Socket to send from.
/// * `events` - cbc::Receiver<CarEvent> - Merged events of all cars.
/// * `dispatcher` - SocketAddr - Gets completions and bounces.
/// * `floor` - SocketAddr - Gets movement and fault notices.
///
pub fn spawn_event_forwarder(
    udp: UdpHandler,
    events: cbc::Receiver<CarEvent>,
    dispatcher: SocketAddr,
    floor: SocketAddr,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new().name("car-events".into()).spawn(move || {
        for event in events.iter() {
            let (target, msg) = match event {
                CarEvent::Completed { request, .. } => (dispatcher, UdpMsg::Request(request)),
                CarEvent::Bounced { mut request, .. } => {
                    request.loaded = false;
                    request.completed = false;
                    (dispatcher, UdpMsg::Request(request))
                }
                CarEvent::Movement(notice) => (floor, UdpMsg::Movement(notice)),
                CarEvent::Fault(notice) => (floor, UdpMsg::FaultNotice(notice)),
            };
            if let Err(e) = udp.send(target, &msg) {
                warn!(to = %target, error = %e, "forwarding car event failed");
            }
        }
    })?;
    Ok(handle)
}

//----------------------------------TESTS-------------------------------------------------------------
