//! Idle, Transporting and Fault, and the single `step` that moves a car
//! between them.
//!
//! Idle sleeps on the mailbox until something is queued. Transporting runs
//! trips until the queue drains. Fault is entered once, for a DEATH or a
//! timeout, and never left.

use std::thread;

use tracing::{error, info, warn};

use super::car::{Car, CarEvent, FaultCause, Interrupt, TripClock};
use super::car_status_functions::{DoorState, MotorState, Status};
use crate::modules::request_object::request_init::{Direction, Fault, Request};
use crate::modules::udp_functions::udp::{FaultNotice, MovementNotice};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CarState {
    Idle,
    Transporting,
    Fault,
}

impl CarState {
    pub fn status(&self) -> Status {
        match self {
            CarState::Idle => Status::Idle,
            CarState::Transporting => Status::Transporting,
            CarState::Fault => Status::Fault,
        }
    }
}

/// What happened at one stop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct StopReport {
    unloaded: usize,
    loaded: usize,
    furthest: Option<u8>, // Furthest destination among those who boarded
}

impl Car {
    /// step
    /// Runs the current state's work and moves to whatever state comes next.
    ///
    /// # Returns:
    ///
    /// Returns -bool- `false` once the car has been shut down.
    ///
    pub fn step(&mut self) -> bool {
        let next = match self.state {
            CarState::Idle => self.idle(),
            CarState::Transporting => self.transport(),
            CarState::Fault => self.out_of_service(),
        };
        match next {
            Some(state) => {
                if state != self.state {
                    info!(car = self.id, floor = self.current_floor, from = ?self.state, to = ?state, "state change");
                    self.state = state;
                    self.publish();
                }
                true
            }
            None => false,
        }
    }

    fn idle(&mut self) -> Option<CarState> {
        self.motor = MotorState::Off;
        self.direction = Direction::None;
        self.publish();

        while self.queue.is_empty() {
            if !self.wait_for_command() || self.shutdown {
                return None;
            }
            if self.pending_fault {
                self.pending_fault = false;
                self.enter_fault(FaultCause::Death);
                return Some(CarState::Fault);
            }
        }
        Some(CarState::Transporting)
    }

    fn transport(&mut self) -> Option<CarState> {
        match self.run_trips() {
            Ok(()) => {
                self.motor = MotorState::Off;
                self.direction = Direction::None;
                Some(CarState::Idle)
            }
            Err(Interrupt::HardFault(cause)) => {
                self.enter_fault(cause);
                Some(CarState::Fault)
            }
            Err(Interrupt::Shutdown) => None,
        }
    }

    /// Out of service: every assignment is bounced until shutdown.
    fn out_of_service(&mut self) -> Option<CarState> {
        if !self.wait_for_command() || self.shutdown {
            return None;
        }
        self.pending_fault = false;
        Some(CarState::Fault)
    }

    /// run_trips
    /// Serves the head of the queue until the queue is empty.
    ///
    /// For each head: pick the trip direction from its floors, board it right away
    /// if the car is already at its origin, detour the other way first if the
    /// origin is behind, then ride to its destination.
    ///
    fn run_trips(&mut self) -> Result<(), Interrupt> {
        loop {
            self.check_interrupts()?;
            let Some(head) = self.queue.head().cloned() else {
                return Ok(());
            };

            let trip = head.travel_direction();
            self.direction = trip;
            self.motor = MotorState::On;
            self.publish();

            if !head.loaded {
                if head.origin_floor == self.current_floor {
                    let floor = self.current_floor;
                    self.serve_stop(floor, trip, false);
                    self.report_completed();
                } else if trip.opposite().is_beyond(head.origin_floor, self.current_floor) {
                    info!(car = self.id, pickup = head.origin_floor, "detour for pickup");
                    self.direction = trip.opposite();
                    self.move_car(head.origin_floor, trip.opposite(), true)?;
                    self.direction = trip;
                }
            }

            self.move_car(head.destination_floor, trip, false)?;

            let stuck_at_destination = self.queue.head().is_some_and(|now| {
                now.loaded && !now.completed && now.destination_floor == self.current_floor
            });
            if stuck_at_destination {
                let floor = self.current_floor;
                self.serve_stop(floor, trip, false);
                self.report_completed();
            }
        }
    }

    /// move_car
    /// Rides one floor at a time towards `target`, which may grow as requests come
    /// in but never shrinks.
    ///
    /// # Arguments:
    ///
    /// * `target` - u8 - Floor to reach.
    /// * `direction` - Direction - Way the car is travelling.
    /// * `detour` - bool - True while heading back for an initial pickup.
    ///
    /// # Returns:
    ///
    /// Returns -Result<(), Interrupt>- Err when a fault, a timeout or shutdown cut the move short.
    ///
    fn move_car(&mut self, target: u8, direction: Direction, detour: bool) -> Result<(), Interrupt> {
        let mut target = target;
        self.trip = TripClock::start();

        while direction.is_beyond(target, self.current_floor) {
            self.check_interrupts()?;
            let elapsed = self.trip.elapsed();
            if elapsed > self.timeout_budget {
                error!(
                    car = self.id,
                    floor = self.current_floor,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = self.timeout_budget.as_millis() as u64,
                    "trip overran its budget"
                );
                return Err(Interrupt::HardFault(FaultCause::Timeout));
            }

            self.current_floor = direction.step_from(self.current_floor);
            self.publish();
            let floor = self.current_floor;

            if let Some(head) = self.queue.head() {
                if !head.loaded && direction.is_beyond(head.origin_floor, target) {
                    target = head.origin_floor;
                }
            }

            let stop = self.serve_stop(floor, direction, detour);
            if !detour {
                if let Some(furthest) = stop.furthest.filter(|f| direction.is_beyond(*f, target)) {
                    target = furthest;
                }
            }

            self.emit(CarEvent::Movement(MovementNotice {
                car_id: self.id,
                status: self.state.status(),
                next_floor: floor,
                direction,
                destination_floor: target,
                unloaded: stop.unloaded,
                loaded: stop.loaded,
            }));
            self.report_completed();

            if direction.is_beyond(target, self.current_floor) {
                let per_floor = self.config.travel_time(1);
                self.pause(per_floor)?;
            }
        }
        Ok(())
    }

    /// serve_stop
    /// Lets off every loaded passenger bound for `floor` and boards everyone
    /// waiting there who goes the right way, with one door cycle for the lot.
    ///
    /// On a detour the right way is the opposite of `direction`.
    ///
    fn serve_stop(&mut self, floor: u8, direction: Direction, detour: bool) -> StopReport {
        let leaving = |r: &Request| {
            r.loaded && !r.completed && r.destination_floor == floor
        };
        let boarding = |r: &Request| {
            !r.loaded
                && r.origin_floor == floor
                && if detour { r.direction != direction } else { r.direction == direction }
        };

        let unloaded = self.queue.iter().filter(|r| leaving(r)).count();
        let loaded = self.queue.iter().filter(|r| boarding(r)).count();
        if unloaded + loaded == 0 {
            return StopReport::default();
        }

        info!(car = self.id, floor, unloaded, loaded, "stopping");
        self.door_cycle(floor, unloaded + loaded);

        let mut report = StopReport { unloaded, loaded, furthest: None };
        for request in self.queue.iter_mut() {
            if leaving(request) {
                request.completed = true;
            } else if boarding(request) {
                request.loaded = true;
                let destination = request.destination_floor;
                report.furthest = match report.furthest {
                    Some(f) if !direction.is_beyond(destination, f) => Some(f),
                    _ => Some(destination),
                };
            }
        }
        report
    }

    /// enter_fault
    /// Drops the queue, finishes the floor in progress if the motor was running,
    /// stops the motor and opens the doors.
    ///
    fn enter_fault(&mut self, cause: FaultCause) {
        error!(car = self.id, floor = self.current_floor, ?cause, "hard fault, car out of service");
        self.state = CarState::Fault;

        let dropped = self.queue.clear();
        if !dropped.is_empty() {
            warn!(car = self.id, dropped = dropped.len(), "queued requests dropped");
        }

        if self.motor == MotorState::On {
            let nearest = self.direction.step_from(self.current_floor);
            if nearest != self.current_floor {
                thread::sleep(self.config.travel_time(1));
                self.current_floor = nearest;
            }
        }
        self.motor = MotorState::Off;
        self.direction = Direction::None;
        self.publish();

        if self.door == DoorState::Closed {
            self.open_doors();
        }

        self.emit(CarEvent::Fault(FaultNotice {
            fault: Fault::Death,
            car_id: self.id,
            floor: self.current_floor,
        }));
    }
}
