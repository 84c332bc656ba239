//! ## Car Module
//! One elevator car: its physical state, its queue and the mailbox through
//! which everything outside the car talks to it.
//!
//! The car runs on its own thread (see `car_handle`). Nothing else touches its
//! fields; assignments, fault injection and shutdown arrive as [`CarCommand`]s
//! and everything the car has to say leaves as [`CarEvent`]s. Readers get a
//! copy of the latest [`CarSnapshot`] without waiting on the movement loop.

//----------------------------------------------Imports
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel as cbc;
use tracing::{debug, info, warn};

use super::car_queue::CarQueue;
use super::car_states::CarState;
use super::car_status_functions::{CarSnapshot, DoorState, MotorState, SharedSnapshot};
use crate::modules::config::SimConfig;
use crate::modules::error::QueueError;
use crate::modules::request_object::request_init::{Direction, Fault, Request};
use crate::modules::udp_functions::udp::{FaultNotice, MovementNotice};

//----------------------------------------------Enum

/// Messages into a car's mailbox.
#[derive(Clone, Debug, PartialEq)]
pub enum CarCommand {
    Assign(Request),
    /// Take the car out of service for good.
    HardFault,
    /// Push the clock of the move in progress forward, as if the car had been stuck.
    Stall(Duration),
    Shutdown,
}

/// Everything a car reports upstream.
#[derive(Clone, Debug, PartialEq)]
pub enum CarEvent {
    Completed { car_id: u8, request: Request },
    Bounced { car_id: u8, request: Request, reason: QueueError },
    Movement(MovementNotice),
    Fault(FaultNotice),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultCause {
    Death,
    Timeout,
}

/// Why a trip stopped before the queue drained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Interrupt {
    HardFault(FaultCause),
    Shutdown,
}

//----------------------------------------------Structs

/// Start of the current multi-floor move plus any injected stall.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TripClock {
    started: Instant,
    skew: Duration,
}

impl TripClock {
    pub(crate) fn start() -> TripClock {
        TripClock { started: Instant::now(), skew: Duration::ZERO }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed() + self.skew
    }
}

pub struct Car {
    pub id: u8,
    pub current_floor: u8,
    pub door: DoorState,
    pub motor: MotorState,
    pub direction: Direction,
    pub state: CarState,
    pub queue: CarQueue,
    pub timeout_budget: Duration,       // Accumulated over everything queued
    pub(crate) config: Arc<SimConfig>,
    pub(crate) trip: TripClock,
    pub(crate) pending_fault: bool,     // Hard fault requested through the mailbox
    pub(crate) shutdown: bool,
    mailbox: cbc::Receiver<CarCommand>,
    events: cbc::Sender<CarEvent>,
    snapshot: SharedSnapshot,
}

impl Car {
    /// new
    ///
    /// # Arguments:
    ///
    /// * `id` - u8 - Car id, as used on the wire.
    /// * `starting_floor` - u8 - Where the car is parked at start.
    /// * `config` - Arc<SimConfig> - Timings and capacity.
    /// * `mailbox` - cbc::Receiver<CarCommand> - Incoming commands.
    /// * `events` - cbc::Sender<CarEvent> - Where completions, bounces and notices go.
    ///
    /// # Returns:
    ///
    /// Returns -Car- An idle car with closed doors and the motor off.
    ///
    pub fn new(
        id: u8,
        starting_floor: u8,
        config: Arc<SimConfig>,
        mailbox: cbc::Receiver<CarCommand>,
        events: cbc::Sender<CarEvent>,
    ) -> Car {
        let mut car = Car {
            id,
            current_floor: starting_floor,
            door: DoorState::Closed,
            motor: MotorState::Off,
            direction: Direction::None,
            state: CarState::Idle,
            queue: CarQueue::new(),
            timeout_budget: Duration::ZERO,
            config,
            trip: TripClock::start(),
            pending_fault: false,
            shutdown: false,
            mailbox,
            events,
            snapshot: SharedSnapshot::new(CarSnapshot {
                id,
                status: CarState::Idle.status(),
                current_floor: starting_floor,
                direction: Direction::None,
                door: DoorState::Closed,
                motor: MotorState::Off,
                queue_len: 0,
            }),
        };
        car.publish();
        car
    }

    /// Cell the car keeps up to date; clone it before moving the car to its thread.
    pub fn snapshot(&self) -> SharedSnapshot {
        self.snapshot.clone()
    }

    /// Runs the state machine until shutdown.
    pub fn run(mut self) {
        info!(car = self.id, floor = self.current_floor, "car started");
        while self.step() {}
        info!(car = self.id, state = ?self.state, "car stopped");
    }

    /// estimate
    /// Worst acceptable time for one request, added to the timeout budget.
    ///
    /// # Arguments:
    ///
    /// * `request` - &Request - Request about to be queued.
    ///
    /// # Returns:
    ///
    /// Returns -Duration- pickup travel + drop-off travel + 2 loads + 4 door moves + slack.
    ///
    pub fn estimate(&self, request: &Request) -> Duration {
        let pickup = u32::from(self.current_floor.abs_diff(request.origin_floor));
        self.config.travel_time(request.span())
            + self.config.travel_time(pickup)
            + self.config.load_time() * 2
            + self.config.door_time() * 4
            + self.config.timeout_slack()
    }

    /// enqueue
    ///
    /// # Arguments:
    ///
    /// * `request` - Request - Request assigned to this car.
    ///
    /// # Returns:
    ///
    /// Returns -Result<(), QueueError>- Why the car refused, if it did. The budget is
    /// restarted when the queue was empty and grows otherwise.
    ///
    pub fn enqueue(&mut self, request: Request) -> Result<(), QueueError> {
        if self.state == CarState::Fault {
            return Err(QueueError::OutOfService(self.id));
        }
        request.validate()?;

        let estimate = self.estimate(&request);
        let was_empty = self.queue.is_empty();
        self.queue.insert(request, self.id, self.config.max_passengers)?;
        self.timeout_budget = if was_empty { estimate } else { self.timeout_budget + estimate };

        debug!(car = self.id, queued = self.queue.len(), budget_ms = self.timeout_budget.as_millis() as u64, "request queued");
        self.publish();
        Ok(())
    }

    /// Queues the request or sends it back upstream with the reason.
    pub(crate) fn accept(&mut self, request: Request) {
        if let Err(reason) = self.enqueue(request.clone()) {
            warn!(car = self.id, %request, %reason, "request bounced");
            self.emit(CarEvent::Bounced { car_id: self.id, request, reason });
        }
    }

    //---------------------------------- Mailbox

    pub(crate) fn handle_command(&mut self, command: CarCommand) {
        match command {
            CarCommand::Assign(request) => self.accept(request),
            CarCommand::HardFault => self.pending_fault = true,
            CarCommand::Stall(by) => {
                debug!(car = self.id, stall_ms = by.as_millis() as u64, "stall injected");
                self.trip.skew += by;
            }
            CarCommand::Shutdown => self.shutdown = true,
        }
    }

    /// Blocks for the next command. `false` once the mailbox is gone.
    pub(crate) fn wait_for_command(&mut self) -> bool {
        match self.mailbox.recv() {
            Ok(command) => {
                self.handle_command(command);
                true
            }
            Err(_) => {
                self.shutdown = true;
                false
            }
        }
    }

    /// Applies every command already waiting, then reports anything that must
    /// stop the trip: shutdown, an injected hard fault or a DEATH tag on the head.
    pub(crate) fn check_interrupts(&mut self) -> Result<(), Interrupt> {
        loop {
            match self.mailbox.try_recv() {
                Ok(command) => self.handle_command(command),
                Err(cbc::TryRecvError::Empty) => break,
                Err(cbc::TryRecvError::Disconnected) => {
                    self.shutdown = true;
                    break;
                }
            }
        }
        if self.shutdown {
            return Err(Interrupt::Shutdown);
        }
        if self.pending_fault {
            self.pending_fault = false;
            return Err(Interrupt::HardFault(FaultCause::Death));
        }
        if self.queue.head().is_some_and(|head| head.fault == Fault::Death) {
            return Err(Interrupt::HardFault(FaultCause::Death));
        }
        Ok(())
    }

    /// Waits out one floor of travel. Commands arriving meanwhile are applied at
    /// once; a hard fault or shutdown cuts the wait short.
    pub(crate) fn pause(&mut self, duration: Duration) -> Result<(), Interrupt> {
        let deadline = Instant::now() + duration;
        loop {
            match self.mailbox.recv_deadline(deadline) {
                Ok(command) => {
                    self.handle_command(command);
                    if self.shutdown || self.pending_fault {
                        return self.check_interrupts();
                    }
                }
                Err(cbc::RecvTimeoutError::Timeout) => return Ok(()),
                Err(cbc::RecvTimeoutError::Disconnected) => {
                    self.shutdown = true;
                    return Err(Interrupt::Shutdown);
                }
            }
        }
    }

    //---------------------------------- Doors

    /// door_cycle
    /// Opens, lets `passengers` through and closes again. Transient door faults on
    /// the head request are retried in place; nothing here can be interrupted.
    ///
    /// # Arguments:
    ///
    /// * `floor` - u8 - Floor the car is stopped at.
    /// * `passengers` - usize - Number boarding plus leaving.
    ///
    pub(crate) fn door_cycle(&mut self, floor: u8, passengers: usize) {
        self.retry_door_fault(Fault::DoorNotOpen, floor);
        self.open_doors();
        thread::sleep(self.config.load_time() * passengers as u32);
        self.retry_door_fault(Fault::DoorNotClose, floor);
        self.close_doors();
    }

    fn retry_door_fault(&mut self, fault: Fault, floor: u8) {
        while self.queue.head().is_some_and(|head| head.fault == fault) {
            warn!(car = self.id, floor, %fault, "door fault, retrying");
            self.emit(CarEvent::Fault(FaultNotice { fault, car_id: self.id, floor }));
            thread::sleep(self.config.transient_fault_time());
            if let Some(head) = self.queue.head_mut() {
                head.fault = Fault::NoFault;
            }
        }
    }

    pub(crate) fn open_doors(&mut self) {
        if self.door == DoorState::Open {
            return;
        }
        thread::sleep(self.config.door_time());
        self.door = DoorState::Open;
        debug!(car = self.id, floor = self.current_floor, "doors open");
        self.publish();
    }

    pub(crate) fn close_doors(&mut self) {
        if self.door == DoorState::Closed {
            return;
        }
        thread::sleep(self.config.door_time());
        self.door = DoorState::Closed;
        debug!(car = self.id, floor = self.current_floor, "doors closed");
        self.publish();
    }

    //---------------------------------- Reporting

    pub(crate) fn publish(&mut self) {
        self.snapshot.publish(CarSnapshot {
            id: self.id,
            status: self.state.status(),
            current_floor: self.current_floor,
            direction: self.direction,
            door: self.door,
            motor: self.motor,
            queue_len: self.queue.len(),
        });
    }

    pub(crate) fn emit(&self, event: CarEvent) {
        if self.events.send(event).is_err() {
            debug!(car = self.id, "nobody is listening for car events");
        }
    }

    /// Removes finished requests and reports each one upstream.
    pub(crate) fn report_completed(&mut self) {
        for request in self.queue.remove_completed() {
            info!(car = self.id, %request, "request completed");
            self.emit(CarEvent::Completed { car_id: self.id, request });
        }
        self.publish();
    }
}

//----------------------------------TESTS-------------------------------------------------------------
