//! Cars driven through their handles, on real threads with shortened timings.

//----------------------------------TESTS-------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use chrono::NaiveTime;
    use crossbeam_channel as cbc;

    use elevator_bank::modules::car_object::car::CarEvent;
    use elevator_bank::modules::car_object::car_handle::{spawn_car, CarHandle};
    use elevator_bank::modules::car_object::car_status_functions::{CarSnapshot, DoorState, MotorState, Status};
    use elevator_bank::modules::config::SimConfig;
    use elevator_bank::modules::error::QueueError;
    use elevator_bank::modules::request_object::request_init::{Direction, Fault, Request};

    /// Helper: a config where a floor takes `floor_ms` and doors and loading 5ms.
    fn fast_config(floor_ms: u64) -> SimConfig {
        SimConfig {
            load_time_ms: 5,
            door_time_ms: 5,
            floors_per_second: 1000.0 / floor_ms as f64,
            transient_fault_time_ms: 10,
            timeout_slack_ms: 2_000,
            ..SimConfig::default()
        }
    }

    fn start(floor: u8, config: SimConfig) -> (CarHandle, cbc::Receiver<CarEvent>) {
        let (events_tx, events_rx) = cbc::unbounded();
        let car = spawn_car(1, floor, Arc::new(config), events_tx).unwrap();
        (car, events_rx)
    }

    fn request(origin: u8, direction: Direction, destination: u8) -> Request {
        Request::init(NaiveTime::from_hms_opt(10, 0, 0).unwrap(), origin, direction, destination)
    }

    fn wait_until(car: &CarHandle, check: impl Fn(&CarSnapshot) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if check(&car.status()) {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    /// Collects events until one matches `last`, or gives up after a few seconds.
    fn events_until(events: &cbc::Receiver<CarEvent>, last: impl Fn(&CarEvent) -> bool) -> Vec<CarEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = Vec::new();
        while let Ok(event) = events.recv_deadline(deadline) {
            let done = last(&event);
            seen.push(event);
            if done {
                break;
            }
        }
        seen
    }

    fn is_completed(event: &CarEvent) -> bool {
        matches!(event, CarEvent::Completed { .. })
    }

    #[test]
    fn test_pickup_and_dropoff() {
        let (car, events) = start(0, fast_config(5));
        car.assign(request(3, Direction::Up, 4)).unwrap();

        let seen = events_until(&events, is_completed);
        match seen.last() {
            Some(CarEvent::Completed { car_id: 1, request }) => {
                assert_eq!((request.origin_floor, request.destination_floor), (3, 4));
                assert!(request.loaded && request.completed);
            }
            other => panic!("expected a completion, got {:?}", other),
        }

        let floors: Vec<u8> = seen
            .iter()
            .filter_map(|event| match event {
                CarEvent::Movement(notice) => Some(notice.next_floor),
                _ => None,
            })
            .collect();
        assert_eq!(floors, vec![1, 2, 3, 4]);

        assert!(wait_until(&car, |s| s.status == Status::Idle && s.current_floor == 4));
        let snapshot = car.status();
        assert_eq!((snapshot.door, snapshot.motor, snapshot.direction), (DoorState::Closed, MotorState::Off, Direction::None));
        assert_eq!(snapshot.queue_len, 0);
    }

    #[test]
    fn test_transporting_while_moving() {
        let (car, _events) = start(0, fast_config(40));
        assert_eq!(car.info().status, Status::Idle);

        car.assign(request(0, Direction::Up, 6)).unwrap();
        assert!(wait_until(&car, |s| s.status == Status::Transporting && s.current_floor >= 1));
        let snapshot = car.status();
        assert_eq!((snapshot.direction, snapshot.motor), (Direction::Up, MotorState::On));

        assert!(wait_until(&car, |s| s.status == Status::Idle && s.current_floor == 6));
    }

    #[test]
    fn test_pickup_behind_the_car() {
        let (car, events) = start(5, fast_config(5));
        car.assign(request(2, Direction::Up, 4)).unwrap();

        let seen = events_until(&events, is_completed);
        let floors: Vec<u8> = seen
            .iter()
            .filter_map(|event| match event {
                CarEvent::Movement(notice) => Some(notice.next_floor),
                _ => None,
            })
            .collect();
        assert_eq!(floors, vec![4, 3, 2, 3, 4]);
        assert!(wait_until(&car, |s| s.status == Status::Idle && s.current_floor == 4));
    }

    #[test]
    fn test_death_is_permanent() {
        let (car, events) = start(0, fast_config(30));
        car.assign(request(0, Direction::Up, 8)).unwrap();
        assert!(wait_until(&car, |s| s.current_floor >= 1));

        car.inject_fault().unwrap();
        assert!(wait_until(&car, |s| s.status == Status::Fault));

        let seen = events_until(&events, |event| matches!(event, CarEvent::Fault(_)));
        match seen.last() {
            Some(CarEvent::Fault(notice)) => assert_eq!((notice.fault, notice.car_id), (Fault::Death, 1)),
            other => panic!("expected a fault notice, got {:?}", other),
        }
        let snapshot = car.status();
        assert_eq!((snapshot.door, snapshot.motor, snapshot.queue_len), (DoorState::Open, MotorState::Off, 0));

        car.assign(request(0, Direction::Up, 2)).unwrap();
        let seen = events_until(&events, |event| matches!(event, CarEvent::Bounced { .. }));
        match seen.last() {
            Some(CarEvent::Bounced { reason, .. }) => assert_eq!(*reason, QueueError::OutOfService(1)),
            other => panic!("expected a bounce, got {:?}", other),
        }

        thread::sleep(Duration::from_millis(100));
        assert_eq!(car.info().status, Status::Fault);
    }

    #[test]
    fn test_death_tagged_request_takes_car_down() {
        let (car, events) = start(3, fast_config(5));
        car.assign(request(3, Direction::Up, 7).with_fault(Fault::Death)).unwrap();

        assert!(wait_until(&car, |s| s.status == Status::Fault));
        let seen = events_until(&events, |event| matches!(event, CarEvent::Fault(_)));
        assert!(!seen.iter().any(is_completed));
    }

    #[test]
    fn test_stalled_move_times_out() {
        let config = SimConfig { timeout_slack_ms: 200, ..fast_config(20) };
        let (car, events) = start(0, config);
        car.assign(request(0, Direction::Up, 20)).unwrap();
        assert!(wait_until(&car, |s| s.current_floor >= 2));

        car.inject_stall(Duration::from_secs(10)).unwrap();
        assert!(wait_until(&car, |s| s.status == Status::Fault));
        let snapshot = car.status();
        assert!(snapshot.current_floor < 20);
        assert_eq!((snapshot.motor, snapshot.direction, snapshot.door), (MotorState::Off, Direction::None, DoorState::Open));

        let seen = events_until(&events, |event| matches!(event, CarEvent::Fault(_)));
        assert!(matches!(seen.last(), Some(CarEvent::Fault(notice)) if notice.fault == Fault::Death));
    }

    #[test]
    fn test_door_not_open_is_retried() {
        let config = SimConfig { transient_fault_time_ms: 300, ..fast_config(5) };
        let (car, events) = start(0, config);
        car.assign(request(0, Direction::Up, 3).with_fault(Fault::DoorNotOpen)).unwrap();

        thread::sleep(Duration::from_millis(100));
        let snapshot = car.status();
        assert_eq!((snapshot.current_floor, snapshot.door), (0, DoorState::Closed));

        let seen = events_until(&events, is_completed);
        assert!(seen.iter().any(|event| matches!(
            event,
            CarEvent::Fault(notice) if notice.fault == Fault::DoorNotOpen && notice.floor == 0
        )));
        match seen.last() {
            Some(CarEvent::Completed { request, .. }) => assert_eq!(request.fault, Fault::NoFault),
            other => panic!("expected a completion, got {:?}", other),
        }
        assert!(wait_until(&car, |s| s.status == Status::Idle && s.current_floor == 3));
    }

    #[test]
    fn test_door_not_close_is_retried() {
        let config = SimConfig { transient_fault_time_ms: 300, ..fast_config(5) };
        let (car, events) = start(0, config);
        car.assign(request(0, Direction::Up, 2).with_fault(Fault::DoorNotClose)).unwrap();

        thread::sleep(Duration::from_millis(100));
        let snapshot = car.status();
        assert_eq!((snapshot.current_floor, snapshot.door), (0, DoorState::Open));

        let seen = events_until(&events, is_completed);
        assert!(seen.iter().any(|event| matches!(
            event,
            CarEvent::Fault(notice) if notice.fault == Fault::DoorNotClose
        )));
        assert!(wait_until(&car, |s| s.status == Status::Idle && s.current_floor == 2));
    }

    #[test]
    fn test_status_reads_do_not_change_anything() {
        let (car, _events) = start(4, fast_config(5));
        let first = car.info();
        let second = car.info();
        assert_eq!(first, second);
        assert_eq!((first.id, first.status, first.floor, first.direction), (1, Status::Idle, 4, Direction::None));
    }

    #[test]
    fn test_full_car_bounces() {
        let config = SimConfig { door_time_ms: 100, ..fast_config(50) };
        let (car, events) = start(0, config);
        for destination in 2..=7 {
            car.assign(request(0, Direction::Up, destination)).unwrap();
        }

        let seen = events_until(&events, |event| matches!(event, CarEvent::Bounced { .. }));
        match seen.last() {
            Some(CarEvent::Bounced { request, reason, .. }) => {
                assert_eq!(request.destination_floor, 7);
                assert_eq!(*reason, QueueError::Full { car_id: 1, capacity: 5 });
            }
            other => panic!("expected a bounce, got {:?}", other),
        }
    }

    #[test]
    fn test_passengers_picked_up_on_the_way() {
        let (car, events) = start(0, fast_config(60));
        car.assign(request(0, Direction::Up, 4)).unwrap();
        assert!(wait_until(&car, |s| s.current_floor >= 1));
        car.assign(request(2, Direction::Up, 6)).unwrap();

        let mut completed = Vec::new();
        while completed.len() < 2 {
            match events_until(&events, is_completed).pop() {
                Some(CarEvent::Completed { request, .. }) => completed.push(request.destination_floor),
                other => panic!("expected a completion, got {:?}", other),
            }
        }
        assert_eq!(completed, vec![4, 6]);
    }
}
