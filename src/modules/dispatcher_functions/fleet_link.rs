//! How the dispatcher reaches the cars: one status poll per request and one
//! dispatch per assignment. The UDP link talks to the car process; tests plug in
//! their own implementation.

use std::net::SocketAddr;
use std::time::Duration;

use crate::modules::car_object::car_status_functions::CarInfo;
use crate::modules::config::SimConfig;
use crate::modules::error::{Result, WireError};
use crate::modules::request_object::request_init::Request;
use crate::modules::udp_functions::udp::{MessageType, UdpMsg};
use crate::modules::udp_functions::udp_handler_init::{init_udp_handler, UdpHandler};

pub trait FleetLink {
    /// Live `(id, state, floor, direction)` of every car, in poll order.
    fn poll_status(&self) -> Result<Vec<CarInfo>>;

    /// Hands `request` to car `car_id`.
    fn dispatch(&self, request: &Request, car_id: u8) -> Result<()>;
}

pub struct UdpFleetLink {
    udp: UdpHandler,
    car_subsystem: SocketAddr,
    status_timeout: Duration,
}

impl UdpFleetLink {
    /// Binds a private socket on an ephemeral port so poll replies never mix with
    /// the dispatcher's inbound traffic.
    pub fn init(config: &SimConfig) -> Result<UdpFleetLink> {
        let bind_ip = config.network.dispatcher_addr.ip();
        Ok(UdpFleetLink {
            udp: init_udp_handler(SocketAddr::new(bind_ip, 0))?,
            car_subsystem: config.network.car_subsystem_addr,
            status_timeout: config.status_timeout(),
        })
    }
}

impl FleetLink for UdpFleetLink {
    fn poll_status(&self) -> Result<Vec<CarInfo>> {
        let reply = self.udp.request_reply(
            self.car_subsystem,
            &UdpMsg::StatusQuery,
            MessageType::StatusReport,
            self.status_timeout,
        )?;
        match reply {
            UdpMsg::StatusReport(cars) => Ok(cars),
            other => Err(WireError::Unrecognised(format!("{:?}", other)).into()),
        }
    }

    fn dispatch(&self, request: &Request, car_id: u8) -> Result<()> {
        self.udp.send(
            self.car_subsystem,
            &UdpMsg::Dispatch { request: request.clone(), car_id },
        )
    }
}

impl<T: FleetLink + ?Sized> FleetLink for std::sync::Arc<T> {
    fn poll_status(&self) -> Result<Vec<CarInfo>> {
        (**self).poll_status()
    }

    fn dispatch(&self, request: &Request, car_id: u8) -> Result<()> {
        (**self).dispatch(request, car_id)
    }
}
