//! ## Selection Module
//! Picks the car that should serve a request from one status poll of the fleet.
//!
//! - **Tier 1:** idle cars, and transporting cars the request is on the way for.
//! - **Tier 2:** every car not in fault.
//!
//! Within a tier the car with the shortest travel time to the pickup wins; on a
//! tie the car listed first in the poll wins.

use tracing::{debug, warn};

use crate::modules::car_object::car_status_functions::{CarInfo, Status};
use crate::modules::request_object::request_init::{Direction, Request};

/// travel_time_secs
///
/// # Arguments:
///
/// * `car_floor` - u8 - Where the car is.
/// * `origin_floor` - u8 - Where the passenger waits.
/// * `floors_per_second` - f64 - Car speed.
///
/// # Returns:
///
/// Returns -u64- Whole seconds to reach the pickup, rounded up.
///
pub fn travel_time_secs(car_floor: u8, origin_floor: u8, floors_per_second: f64) -> u64 {
    let floors = f64::from(car_floor.abs_diff(origin_floor));
    (floors / floors_per_second).ceil() as u64
}

/// A moving car is on the way when the pickup is more than one floor ahead of it
/// and the passenger wants to go the same way the car is going.
pub fn is_on_the_way(car: &CarInfo, request: &Request) -> bool {
    let origin = i32::from(request.origin_floor);
    let floor = i32::from(car.floor);
    match (car.direction, request.direction) {
        (Direction::Up, Direction::Up) => origin > floor + 1,
        (Direction::Down, Direction::Down) => origin < floor - 1,
        _ => false,
    }
}

fn is_tier_one(car: &CarInfo, request: &Request) -> bool {
    match car.status {
        Status::Idle => true,
        Status::Transporting => is_on_the_way(car, request),
        Status::Fault | Status::Unknown => false,
    }
}

/// Working cars that have not refused the request, with their travel time.
fn candidates<'a>(
    request: &'a Request,
    cars: &'a [CarInfo],
    floors_per_second: f64,
    excluded: &'a [u8],
) -> impl Iterator<Item = (u64, &'a CarInfo)> + 'a {
    cars.iter()
        .filter(move |car| car.status != Status::Fault && !excluded.contains(&car.id))
        .map(move |car| (travel_time_secs(car.floor, request.origin_floor, floors_per_second), car))
}

/// select_car
///
/// # Arguments:
///
/// * `request` - &Request - Request to place.
/// * `cars` - &[CarInfo] - Fleet status, in poll order.
/// * `floors_per_second` - f64 - Car speed.
/// * `excluded` - &[u8] - Cars that must not be picked (they already refused this request).
///
/// # Returns:
///
/// Returns -Option<u8>- Chosen car id, `None` when no car can take it.
///
pub fn select_car(request: &Request, cars: &[CarInfo], floors_per_second: f64, excluded: &[u8]) -> Option<u8> {
    // min_by_key keeps the first of equal keys, which is the poll order tie-break
    let tier_one = candidates(request, cars, floors_per_second, excluded)
        .filter(|(_, car)| is_tier_one(car, request))
        .min_by_key(|(time, _)| *time);
    let tier_two = || candidates(request, cars, floors_per_second, excluded).min_by_key(|(time, _)| *time);

    match tier_one.map(|pick| (1, pick)).or_else(|| tier_two().map(|pick| (2, pick))) {
        Some((tier, (time, car))) => {
            debug!(%request, car = car.id, tier, travel_secs = time, "car selected");
            Some(car.id)
        }
        None => {
            warn!(%request, "no elevator found");
            None
        }
    }
}

//----------------------------------TESTS-------------------------------------------------------------
