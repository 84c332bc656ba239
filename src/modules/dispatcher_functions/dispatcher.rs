//! ## Dispatcher Module
//! Central intake for floor calls. Keeps every request that has not been
//! completed in the pending queue, together with the car it was sent to, and
//! the completed ones in the response log.
//!
//! ## The functions includes:
//! - 'Dispatcher::run'        drives the intake pipeline (see `dispatcher_states`).
//! - 'retry_orphans'          re-places pending requests that have no working car.
//! - 'spawn_request_listener' feeds decoded datagrams into the pipeline.
//! - 'run_dispatcher'         wires all of it to UDP for a standalone process.

//----------------------------------------------Imports
use std::net::SocketAddr;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel as cbc;
use tracing::{debug, info, warn};

use super::dispatcher_states::DispatcherState;
use super::fleet_link::{FleetLink, UdpFleetLink};
use super::selection::select_car;
use crate::modules::car_object::car_status_functions::{CarInfo, Status};
use crate::modules::config::SimConfig;
use crate::modules::error::Result;
use crate::modules::request_object::request_init::{Fault, Request};
use crate::modules::udp_functions::udp::UdpMsg;
use crate::modules::udp_functions::udp_handler_init::{init_udp_handler, UdpHandler};

//----------------------------------------------Structs

#[derive(Clone, Debug, PartialEq)]
pub struct PendingEntry {
    pub request: Request,
    pub assigned_car: Option<u8>,
    pub refused_by: Vec<u8>, // Cars that bounced this request back
}

/// Requests sent to a car (or waiting for one) and not yet completed.
/// Every change wakes anyone waiting on the queue.
#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: Mutex<Vec<PendingEntry>>,
    changed: Condvar,
}

impl PendingQueue {
    pub fn new() -> PendingQueue {
        PendingQueue::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PendingEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// admit
    /// Adds a new request, or reopens the entry of one that came back.
    ///
    /// # Arguments:
    ///
    /// * `request` - Request - Incoming request.
    ///
    /// # Returns:
    ///
    /// Returns -Vec<u8>- Cars that have refused this request so far.
    ///
    pub fn admit(&self, request: Request) -> Vec<u8> {
        let mut entries = self.lock();
        let refused_by = match entries.iter_mut().find(|entry| entry.request.same_call(&request)) {
            Some(entry) => {
                if let Some(car) = entry.assigned_car.take() {
                    if !entry.refused_by.contains(&car) {
                        entry.refused_by.push(car);
                    }
                }
                entry.request.loaded = false;
                debug!(%request, refused_by = ?entry.refused_by, "request came back");
                entry.refused_by.clone()
            }
            None => {
                entries.push(PendingEntry { request, assigned_car: None, refused_by: Vec::new() });
                Vec::new()
            }
        };
        self.changed.notify_all();
        refused_by
    }

    pub fn assign(&self, request: &Request, car_id: u8) {
        let mut entries = self.lock();
        if let Some(entry) = entries.iter_mut().find(|entry| entry.request.same_call(request)) {
            entry.assigned_car = Some(car_id);
        }
        self.changed.notify_all();
    }

    /// complete
    /// Closes the entry of a finished request. The car that finished it has room
    /// again, so it is taken off every other entry's refusal list.
    ///
    /// # Arguments:
    ///
    /// * `request` - &Request - Completed request.
    ///
    /// # Returns:
    ///
    /// Returns -Option<PendingEntry>- The closed entry, if it was pending.
    ///
    pub fn complete(&self, request: &Request) -> Option<PendingEntry> {
        let mut entries = self.lock();
        let position = entries.iter().position(|entry| entry.request.same_call(request))?;
        let entry = entries.remove(position);
        if let Some(car) = entry.assigned_car {
            for other in entries.iter_mut() {
                other.refused_by.retain(|refused| *refused != car);
            }
        }
        self.changed.notify_all();
        Some(entry)
    }

    /// True while some entry waits for a car.
    pub fn has_unassigned(&self) -> bool {
        self.lock().iter().any(|entry| entry.assigned_car.is_none())
    }

    /// orphans
    /// Entries with no car, or whose car is in fault or missing from the poll.
    /// Those from a faulted car are reopened; a DEATH-tagged one has done its job
    /// by killing that car and is dropped instead of being passed on.
    ///
    /// # Arguments:
    ///
    /// * `cars` - &[CarInfo] - Latest poll.
    /// * `skip` - Option<&Request> - Request being processed right now, if any.
    ///
    /// # Returns:
    ///
    /// Returns -Vec<(Request, Vec<u8>)>- Requests to place again, each with the cars
    /// that have refused it.
    ///
    pub fn orphans(&self, cars: &[CarInfo], skip: Option<&Request>) -> Vec<(Request, Vec<u8>)> {
        let car_lost = |id: u8| {
            cars.iter()
                .find(|car| car.id == id)
                .map_or(true, |car| car.status == Status::Fault)
        };

        let mut entries = self.lock();
        entries.retain(|entry| {
            let consumed = entry.request.fault == Fault::Death && entry.assigned_car.is_some_and(car_lost);
            if consumed {
                info!(request = %entry.request, "fault injection consumed");
            }
            !consumed
        });

        let mut orphans = Vec::new();
        for entry in entries.iter_mut().filter(|entry| !skip.is_some_and(|skip| entry.request.same_call(skip))) {
            match entry.assigned_car {
                Some(car) if car_lost(car) => {
                    warn!(request = %entry.request, car, "car lost, request orphaned");
                    entry.assigned_car = None;
                    entry.request.loaded = false;
                    orphans.push((entry.request.clone(), entry.refused_by.clone()));
                }
                Some(_) => {}
                None => orphans.push((entry.request.clone(), entry.refused_by.clone())),
            }
        }
        self.changed.notify_all();
        orphans
    }

    pub fn entries(&self) -> Vec<PendingEntry> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Blocks until the queue is empty or `timeout` passes. `true` if it emptied.
    pub fn wait_until_empty(&self, timeout: Duration) -> bool {
        let entries = self.lock();
        let (entries, _) = self
            .changed
            .wait_timeout_while(entries, timeout, |entries| !entries.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        entries.is_empty()
    }
}

pub struct Dispatcher<L: FleetLink> {
    pub(crate) config: Arc<SimConfig>,
    pub(crate) link: L,
    pub(crate) inbound: cbc::Receiver<Request>,
    pub(crate) pending: Arc<PendingQueue>,
    response_log: Arc<Mutex<Vec<Request>>>,
    pub state: DispatcherState,
}

impl<L: FleetLink> Dispatcher<L> {
    /// new
    ///
    /// # Arguments:
    ///
    /// * `config` - Arc<SimConfig> - Car speed for the selection heuristic.
    /// * `link` - L - Way to poll and reach the cars.
    /// * `inbound` - cbc::Receiver<Request> - Decoded requests, completions and bounces.
    ///
    pub fn new(config: Arc<SimConfig>, link: L, inbound: cbc::Receiver<Request>) -> Dispatcher<L> {
        Dispatcher {
            config,
            link,
            inbound,
            pending: Arc::new(PendingQueue::new()),
            response_log: Arc::new(Mutex::new(Vec::new())),
            state: DispatcherState::AwaitingRequest,
        }
    }

    pub fn pending(&self) -> Arc<PendingQueue> {
        Arc::clone(&self.pending)
    }

    /// Completed requests, oldest first.
    pub fn response_log(&self) -> Vec<Request> {
        self.response_log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Runs the pipeline until the inbound channel closes.
    pub fn run(mut self) {
        info!("dispatcher awaiting requests");
        while self.step() {}
        info!("dispatcher stopped");
    }

    /// Runs one request through the pipeline without waiting on the channel.
    pub fn handle(&mut self, request: Request) {
        self.state = DispatcherState::ProcessingRequest(request);
        while self.state != DispatcherState::AwaitingRequest {
            self.step();
        }
    }

    pub(crate) fn complete(&self, request: Request) {
        match self.pending.complete(&request) {
            Some(entry) => info!(%request, car = ?entry.assigned_car, "request completed"),
            None => debug!(%request, "completion for a request not pending"),
        }
        self.response_log.lock().unwrap_or_else(PoisonError::into_inner).push(request);
    }

    /// Sends to the car and records the assignment. A failed send leaves the
    /// request pending without a car, so the next cycle picks it up.
    pub(crate) fn send_to(&self, request: &Request, car_id: u8) -> bool {
        match self.link.dispatch(request, car_id) {
            Ok(()) => {
                self.pending.assign(request, car_id);
                true
            }
            Err(e) => {
                warn!(%request, car = car_id, error = %e, "dispatch failed");
                false
            }
        }
    }

    /// retry_orphans
    /// Places again every pending request without a working car, using the poll
    /// already taken for the request in progress. Cars that refused a request are
    /// not offered it again until they complete something.
    pub(crate) fn retry_orphans(&self, cars: &[CarInfo], current: Option<&Request>) {
        for (orphan, refused_by) in self.pending.orphans(cars, current) {
            if let Some(car_id) = select_car(&orphan, cars, self.config.floors_per_second, &refused_by) {
                info!(request = %orphan, car = car_id, "re-dispatching orphan");
                self.send_to(&orphan, car_id);
            }
        }
    }
}

/// spawn_request_listener
/// Receives on the dispatcher socket and forwards every request datagram into
/// the pipeline. Stops when the pipeline is gone.
///
/// # Arguments:
///
/// * `udp` - UdpHandler - Socket bound to the dispatcher port.
/// * `requests` - cbc::Sender<Request> - Pipeline input.
///
pub fn spawn_request_listener(udp: UdpHandler, requests: cbc::Sender<Request>) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new().name("dispatcher-rx".into()).spawn(move || loop {
        match udp.receive(None) {
            Ok(Some((UdpMsg::Request(request), _))) => {
                if requests.send(request).is_err() {
                    break;
                }
            }
            Ok(Some((other, sender))) => {
                warn!(from = %sender, message_type = ?other.message_type(), "dispatcher ignoring message");
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "dispatcher receive failed"),
        }
    })?;
    Ok(handle)
}

/// Standalone dispatcher process: listens on the configured port and talks to
/// the car process over UDP. Returns only if the pipeline stops.
pub fn run_dispatcher(config: Arc<SimConfig>) -> Result<()> {
    let udp = init_udp_handler(config.network.dispatcher_addr)?;
    let bound: SocketAddr = udp.local_addr()?;
    info!(addr = %bound, cars = %config.network.car_subsystem_addr, "dispatcher listening");

    let (tx, rx) = cbc::unbounded();
    let _listener = spawn_request_listener(udp, tx)?;
    let link = UdpFleetLink::init(&config)?;
    Dispatcher::new(config, link, rx).run();
    Ok(())
}

//----------------------------------TESTS-------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::error::Error;
    use crate::modules::request_object::request_init::Direction;
    use crate::modules::udp_functions::udp::decode_status_report;
    use chrono::NaiveTime;

    #[derive(Default)]
    struct FakeFleet {
        cars: Mutex<Vec<CarInfo>>,
        dispatched: Mutex<Vec<(Request, u8)>>,
        polls: Mutex<usize>,
        bounce_to: Mutex<Option<cbc::Sender<Request>>>, // When set, every car refuses
    }

    impl FakeFleet {
        fn with(status: &str) -> Arc<FakeFleet> {
            let fleet = FakeFleet::default();
            fleet.set(status);
            Arc::new(fleet)
        }

        fn set(&self, status: &str) {
            *self.cars.lock().unwrap() = decode_status_report(status).unwrap();
        }

        fn dispatched(&self) -> Vec<(Request, u8)> {
            self.dispatched.lock().unwrap().clone()
        }
    }

    impl FleetLink for FakeFleet {
        fn poll_status(&self) -> Result<Vec<CarInfo>> {
            *self.polls.lock().unwrap() += 1;
            let cars = self.cars.lock().unwrap().clone();
            if cars.is_empty() {
                return Err(Error::StatusTimeout(1));
            }
            Ok(cars)
        }

        fn dispatch(&self, request: &Request, car_id: u8) -> Result<()> {
            self.dispatched.lock().unwrap().push((request.clone(), car_id));
            if let Some(back) = self.bounce_to.lock().unwrap().as_ref() {
                back.send(request.clone()).unwrap();
            }
            Ok(())
        }
    }

    fn request(second: u32, origin: u8, direction: Direction, destination: u8) -> Request {
        Request::init(NaiveTime::from_hms_opt(10, 0, second).unwrap(), origin, direction, destination)
    }

    fn dispatcher(fleet: &Arc<FakeFleet>) -> (Dispatcher<Arc<FakeFleet>>, cbc::Sender<Request>) {
        let (tx, rx) = cbc::unbounded();
        (Dispatcher::new(Arc::new(SimConfig::default()), Arc::clone(fleet), rx), tx)
    }

    #[test]
    fn test_pipeline_states_from_channel() {
        let fleet = FakeFleet::with("1;IDLE;3;UP\n2;TRANSPORTING;5;DOWN\n3;IDLE;2;UP");
        let (mut dispatcher, tx) = dispatcher(&fleet);
        let call = request(0, 3, Direction::Up, 10);
        tx.send(call.clone()).unwrap();

        assert!(dispatcher.step());
        assert_eq!(dispatcher.state, DispatcherState::ProcessingRequest(call.clone()));
        assert!(dispatcher.step());
        assert_eq!(dispatcher.state, DispatcherState::ElevatorDispatch { request: call.clone(), car_id: 1 });
        assert!(dispatcher.step());
        assert_eq!(dispatcher.state, DispatcherState::AwaitingRequest);

        assert_eq!(fleet.dispatched(), vec![(call.clone(), 1)]);
        assert_eq!(dispatcher.pending().entries()[0].assigned_car, Some(1));

        drop(tx);
        assert!(!dispatcher.step());
    }

    #[test]
    fn test_bad_request_is_discarded() {
        let fleet = FakeFleet::with("1;IDLE;0;NONE");
        let (mut dispatcher, _tx) = dispatcher(&fleet);

        dispatcher.handle(request(0, 4, Direction::Up, 4));
        dispatcher.handle(request(1, 4, Direction::Up, 1));
        dispatcher.handle(request(2, 1, Direction::Up, 4).with_fault(Fault::BadRequest));

        assert!(dispatcher.pending().is_empty());
        assert!(fleet.dispatched().is_empty());
        assert_eq!(*fleet.polls.lock().unwrap(), 0);
    }

    #[test]
    fn test_completion_moves_request_to_response_log() {
        let fleet = FakeFleet::with("1;IDLE;0;NONE");
        let (mut dispatcher, _tx) = dispatcher(&fleet);
        let call = request(0, 0, Direction::Up, 5);
        dispatcher.handle(call.clone());
        assert_eq!(dispatcher.pending().len(), 1);

        let mut done = call.clone();
        done.loaded = true;
        done.completed = true;
        dispatcher.handle(done.clone());

        assert!(dispatcher.pending().is_empty());
        assert_eq!(dispatcher.response_log(), vec![done]);
        assert_eq!(fleet.dispatched().len(), 1);
    }

    #[test]
    fn test_unplaced_request_is_retried_next_cycle() {
        let fleet = FakeFleet::with("1;FAULT;0;NONE\n2;FAULT;4;NONE");
        let (mut dispatcher, _tx) = dispatcher(&fleet);
        let first = request(0, 2, Direction::Up, 6);
        dispatcher.handle(first.clone());

        let pending = dispatcher.pending().entries();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].assigned_car, None);
        assert!(fleet.dispatched().is_empty());

        fleet.set("1;FAULT;0;NONE\n2;FAULT;4;NONE\n3;IDLE;1;NONE");
        let second = request(1, 8, Direction::Down, 0);
        dispatcher.handle(second.clone());

        assert_eq!(fleet.dispatched(), vec![(first, 3), (second, 3)]);
        assert!(dispatcher.pending().entries().iter().all(|entry| entry.assigned_car == Some(3)));
    }

    #[test]
    fn test_failed_poll_leaves_request_pending() {
        let fleet = Arc::new(FakeFleet::default());
        let (mut dispatcher, _tx) = dispatcher(&fleet);
        dispatcher.handle(request(0, 1, Direction::Up, 2));
        assert_eq!(dispatcher.pending().len(), 1);
        assert!(fleet.dispatched().is_empty());
    }

    #[test]
    fn test_bounced_request_goes_to_another_car() {
        let fleet = FakeFleet::with("1;IDLE;0;NONE\n2;IDLE;6;NONE");
        let (mut dispatcher, _tx) = dispatcher(&fleet);
        let call = request(0, 1, Direction::Up, 3);
        dispatcher.handle(call.clone());
        dispatcher.handle(call.clone());

        let pending = dispatcher.pending().entries();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].refused_by, vec![1]);
        assert_eq!(pending[0].assigned_car, Some(2));
        assert_eq!(fleet.dispatched(), vec![(call.clone(), 1), (call, 2)]);
    }

    #[test]
    fn test_requests_of_a_dead_car_are_reassigned() {
        let fleet = FakeFleet::with("1;IDLE;0;NONE\n2;IDLE;9;NONE");
        let (mut dispatcher, _tx) = dispatcher(&fleet);
        let riding = request(0, 1, Direction::Up, 4);
        let killer = request(1, 0, Direction::Up, 2).with_fault(Fault::Death);
        dispatcher.handle(riding.clone());
        dispatcher.handle(killer.clone());
        assert_eq!(fleet.dispatched(), vec![(riding.clone(), 1), (killer, 1)]);

        fleet.set("1;FAULT;1;NONE\n2;IDLE;9;NONE");
        let next = request(2, 7, Direction::Down, 3);
        dispatcher.handle(next.clone());

        let dispatched = fleet.dispatched();
        assert_eq!(dispatched[2], (riding, 2));
        assert_eq!(dispatched[3], (next, 2));
        assert_eq!(dispatched.len(), 4);
        assert_eq!(dispatcher.pending().len(), 2);
    }

    /// Steps until the dispatcher is idle with nothing queued. Returns the step count.
    fn settle(dispatcher: &mut Dispatcher<Arc<FakeFleet>>) -> usize {
        let mut steps = 0;
        while !(dispatcher.state == DispatcherState::AwaitingRequest && dispatcher.inbound.is_empty()) {
            assert!(steps < 100, "dispatcher still busy after {} steps", steps);
            dispatcher.step();
            steps += 1;
        }
        steps
    }

    #[test]
    fn test_requests_refused_by_every_car_wait_for_room() {
        let fleet = FakeFleet::with("1;TRANSPORTING;0;UP\n2;FAULT;6;NONE");
        let (mut dispatcher, tx) = dispatcher(&fleet);
        let riding = request(0, 0, Direction::Up, 8);
        dispatcher.handle(riding.clone());
        assert_eq!(fleet.dispatched(), vec![(riding.clone(), 1)]);

        *fleet.bounce_to.lock().unwrap() = Some(tx.clone());
        let first = request(1, 1, Direction::Up, 3);
        let second = request(2, 2, Direction::Up, 5);
        tx.send(first.clone()).unwrap();
        tx.send(second.clone()).unwrap();
        settle(&mut dispatcher);

        assert_eq!(fleet.dispatched().len(), 3);
        assert_eq!(*fleet.polls.lock().unwrap(), 5);
        let waiting: Vec<PendingEntry> = dispatcher
            .pending()
            .entries()
            .into_iter()
            .filter(|entry| entry.assigned_car.is_none())
            .collect();
        assert_eq!(waiting.len(), 2);
        assert!(waiting.iter().all(|entry| entry.refused_by == vec![1]));

        *fleet.bounce_to.lock().unwrap() = None;
        let mut done = riding;
        done.loaded = true;
        done.completed = true;
        tx.send(done).unwrap();
        settle(&mut dispatcher);

        let dispatched = fleet.dispatched();
        assert_eq!(dispatched[3..].to_vec(), vec![(first, 1), (second, 1)]);
        let pending = dispatcher.pending().entries();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|entry| entry.assigned_car == Some(1) && entry.refused_by.is_empty()));
    }

    #[test]
    fn test_wait_until_empty() {
        let queue = Arc::new(PendingQueue::new());
        let call = request(0, 1, Direction::Up, 2);
        queue.admit(call.clone());
        assert!(!queue.wait_until_empty(Duration::from_millis(10)));

        let remote = Arc::clone(&queue);
        let finisher = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.complete(&call);
        });
        assert!(queue.wait_until_empty(Duration::from_secs(2)));
        finisher.join().unwrap();
    }
}
