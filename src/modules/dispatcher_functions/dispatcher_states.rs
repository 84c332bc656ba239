//! The dispatcher's intake pipeline:
//! AwaitingRequest -> ProcessingRequest -> ElevatorDispatch -> AwaitingRequest.

use tracing::{debug, info, warn};

use super::dispatcher::Dispatcher;
use super::fleet_link::FleetLink;
use super::selection::select_car;
use crate::modules::request_object::request_init::Request;

#[derive(Clone, Debug, PartialEq)]
pub enum DispatcherState {
    AwaitingRequest,
    ProcessingRequest(Request),
    ElevatorDispatch { request: Request, car_id: u8 },
}

impl<L: FleetLink> Dispatcher<L> {
    /// step
    /// Does the work of the current state and moves on. AwaitingRequest blocks
    /// on the inbound channel.
    ///
    /// # Returns:
    ///
    /// Returns -bool- `false` once the inbound channel has closed.
    ///
    pub fn step(&mut self) -> bool {
        let current = std::mem::replace(&mut self.state, DispatcherState::AwaitingRequest);
        let next = match current {
            DispatcherState::AwaitingRequest => match self.inbound.recv() {
                Ok(request) => DispatcherState::ProcessingRequest(request),
                Err(_) => return false,
            },
            DispatcherState::ProcessingRequest(request) => self.process(request),
            DispatcherState::ElevatorDispatch { request, car_id } => {
                self.send_to(&request, car_id);
                DispatcherState::AwaitingRequest
            }
        };
        debug!(state = ?next, "dispatcher state");
        self.state = next;
        true
    }

    /// Completions close their pending entry and give waiting requests another
    /// try. Anything else is validated, admitted to the pending queue and matched
    /// against a fresh poll of the fleet.
    fn process(&mut self, request: Request) -> DispatcherState {
        if request.completed {
            self.complete(request);
            if self.pending.has_unassigned() {
                match self.link.poll_status() {
                    Ok(cars) => self.retry_orphans(&cars, None),
                    Err(e) => warn!(error = %e, "status poll failed, waiting requests stay pending"),
                }
            }
            return DispatcherState::AwaitingRequest;
        }
        if let Err(reason) = request.validate() {
            warn!(%request, %reason, "bad request discarded");
            return DispatcherState::AwaitingRequest;
        }

        let refused_by = self.pending.admit(request.clone());
        let cars = match self.link.poll_status() {
            Ok(cars) => cars,
            Err(e) => {
                warn!(%request, error = %e, "status poll failed, request left pending");
                return DispatcherState::AwaitingRequest;
            }
        };
        self.retry_orphans(&cars, Some(&request));

        match select_car(&request, &cars, self.config.floors_per_second, &refused_by) {
            Some(car_id) => {
                info!(%request, car = car_id, "assigning");
                DispatcherState::ElevatorDispatch { request, car_id }
            }
            None => DispatcherState::AwaitingRequest,
        }
    }
}
