//! Owner-side handle to a car running on its own thread.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel as cbc;
use tracing::warn;

use super::car::{Car, CarCommand, CarEvent};
use super::car_status_functions::{CarInfo, CarSnapshot, SharedSnapshot};
use crate::modules::config::SimConfig;
use crate::modules::error::{Error, Result};
use crate::modules::request_object::request_init::Request;

pub struct CarHandle {
    pub id: u8,
    mailbox: cbc::Sender<CarCommand>,
    snapshot: SharedSnapshot,
    thread: Option<JoinHandle<()>>,
}

/// spawn_car
///
/// # Arguments:
///
/// * `id` - u8 - Car id.
/// * `starting_floor` - u8 - Floor the car is parked at.
/// * `config` - Arc<SimConfig> - Shared timings.
/// * `events` - cbc::Sender<CarEvent> - Where the car reports.
///
/// # Returns:
///
/// Returns -Result<CarHandle>- Handle to the running car.
///
pub fn spawn_car(id: u8, starting_floor: u8, config: Arc<SimConfig>, events: cbc::Sender<CarEvent>) -> Result<CarHandle> {
    let (mailbox, inbox) = cbc::unbounded();
    let car = Car::new(id, starting_floor, config, inbox, events);
    let snapshot = car.snapshot();
    let thread = thread::Builder::new()
        .name(format!("car-{}", id))
        .spawn(move || car.run())?;

    Ok(CarHandle { id, mailbox, snapshot, thread: Some(thread) })
}

impl CarHandle {
    pub fn assign(&self, request: Request) -> Result<()> {
        self.send(CarCommand::Assign(request))
    }

    /// Takes the car out of service, interrupting any move in progress.
    pub fn inject_fault(&self) -> Result<()> {
        self.send(CarCommand::HardFault)
    }

    /// Makes the move in progress look `by` longer than it really is.
    pub fn inject_stall(&self, by: Duration) -> Result<()> {
        self.send(CarCommand::Stall(by))
    }

    pub fn status(&self) -> CarSnapshot {
        self.snapshot.read()
    }

    pub fn info(&self) -> CarInfo {
        self.snapshot.read().info()
    }

    /// Stops the car thread and waits for it. Door operations in progress finish first.
    pub fn shutdown(&mut self) {
        let _ = self.mailbox.send(CarCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(car = self.id, "car thread panicked");
            }
        }
    }

    fn send(&self, command: CarCommand) -> Result<()> {
        self.mailbox.send(command).map_err(|_| Error::CarStopped(self.id))
    }
}

impl Drop for CarHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
