//! Ordered pickup/drop-off queue owned by a single car.
//!
//! The first request into an empty queue fixes its order: ascending by
//! destination for an upward trip, descending for a downward one. Later
//! requests are kept in that order, ties after the ones already queued.

use crate::modules::error::QueueError;
use crate::modules::request_object::request_init::{Direction, Request};

#[derive(Clone, Debug)]
pub struct CarQueue {
    entries: Vec<Request>,
    order: Direction,
}

impl Default for CarQueue {
    fn default() -> Self {
        CarQueue::new()
    }
}

impl CarQueue {
    pub fn new() -> CarQueue {
        CarQueue { entries: Vec::new(), order: Direction::None }
    }

    /// insert
    ///
    /// # Arguments:
    ///
    /// * `request` - Request - Request to add.
    /// * `car_id` - u8 - Owner, for the error report.
    /// * `capacity` - usize - Maximum number of queued requests.
    ///
    /// # Returns:
    ///
    /// Returns -Result<(), QueueError>- `Full` when at capacity, `PassedFloor` when the
    /// request needs a floor the established trip has already gone past.
    ///
    pub fn insert(&mut self, request: Request, car_id: u8, capacity: usize) -> Result<(), QueueError> {
        if self.entries.len() + 1 > capacity {
            return Err(QueueError::Full { car_id, capacity });
        }

        if let Some(head) = self.entries.first() {
            let passed = match request.direction {
                Direction::Up => request.destination_floor < head.destination_floor,
                Direction::Down => request.destination_floor > head.destination_floor,
                Direction::None => false,
            };
            if passed {
                return Err(QueueError::PassedFloor {
                    requested: request.destination_floor,
                    head: head.destination_floor,
                    direction: request.direction,
                });
            }
        } else {
            self.order = match request.direction {
                Direction::None => request.travel_direction(),
                direction => direction,
            };
        }

        let order = self.order;
        let position = self
            .entries
            .iter()
            .position(|queued| order.is_beyond(queued.destination_floor, request.destination_floor))
            .unwrap_or(self.entries.len());
        self.entries.insert(position, request);
        Ok(())
    }

    pub fn head(&self) -> Option<&Request> {
        self.entries.first()
    }

    pub fn head_mut(&mut self) -> Option<&mut Request> {
        self.entries.first_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Request> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Request> {
        self.entries.iter_mut()
    }

    /// Takes every completed request out of the queue, in queue order.
    pub fn remove_completed(&mut self) -> Vec<Request> {
        let (done, remaining): (Vec<Request>, Vec<Request>) =
            self.entries.drain(..).partition(|request| request.completed);
        self.entries = remaining;
        if self.entries.is_empty() {
            self.order = Direction::None;
        }
        done
    }

    /// Empties the queue and hands back what was in it.
    pub fn clear(&mut self) -> Vec<Request> {
        self.order = Direction::None;
        std::mem::take(&mut self.entries)
    }

    pub fn order(&self) -> Direction {
        self.order
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//----------------------------------TESTS-------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn request(origin: u8, direction: Direction, destination: u8) -> Request {
        Request::init(NaiveTime::from_hms_opt(12, 0, 0).unwrap(), origin, direction, destination)
    }

    fn destinations(queue: &CarQueue) -> Vec<u8> {
        queue.iter().map(|r| r.destination_floor).collect()
    }

    #[test]
    fn test_first_request_fixes_order() {
        let mut queue = CarQueue::new();
        queue.insert(request(2, Direction::Up, 5), 1, 5).unwrap();
        queue.insert(request(2, Direction::Up, 4), 1, 5).unwrap();
        assert_eq!(queue.order(), Direction::Up);
        assert_eq!(queue.head().unwrap().destination_floor, 4);
        assert_eq!(queue.len(), 2);

        let mut down = CarQueue::new();
        down.insert(request(9, Direction::Down, 3), 1, 5).unwrap();
        down.insert(request(9, Direction::Down, 6), 1, 5).unwrap();
        assert_eq!(destinations(&down), vec![6, 3]);
    }

    #[test]
    fn test_passed_floor_is_rejected() {
        let mut queue = CarQueue::new();
        queue.insert(request(2, Direction::Up, 4), 1, 5).unwrap();
        queue.insert(request(2, Direction::Up, 5), 1, 5).unwrap();

        let err = queue.insert(request(1, Direction::Up, 2), 1, 5).unwrap_err();
        assert_eq!(err, QueueError::PassedFloor { requested: 2, head: 4, direction: Direction::Up });
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_opposite_direction_future_floor_is_interleaved() {
        let mut queue = CarQueue::new();
        queue.insert(request(2, Direction::Up, 4), 1, 5).unwrap();
        queue.insert(request(2, Direction::Up, 5), 1, 5).unwrap();

        queue.insert(request(6, Direction::Down, 3), 1, 5).unwrap();
        assert_eq!(queue.len(), 3);
        assert_eq!(destinations(&queue), vec![3, 4, 5]);
        assert_eq!(queue.order(), Direction::Up);
    }

    #[test]
    fn test_capacity() {
        let mut queue = CarQueue::new();
        for destination in 3..8 {
            queue.insert(request(1, Direction::Up, destination), 7, 5).unwrap();
        }
        let err = queue.insert(request(1, Direction::Up, 9), 7, 5).unwrap_err();
        assert_eq!(err, QueueError::Full { car_id: 7, capacity: 5 });
        assert_eq!(queue.len(), 5);
    }

    #[test]
    fn test_remove_completed_resets_order_when_empty() {
        let mut queue = CarQueue::new();
        queue.insert(request(0, Direction::Up, 2), 1, 5).unwrap();
        queue.insert(request(0, Direction::Up, 3), 1, 5).unwrap();
        queue.iter_mut().for_each(|r| r.completed = r.destination_floor == 2);

        let done = queue.remove_completed();
        assert_eq!(done.len(), 1);
        assert_eq!(queue.order(), Direction::Up);

        queue.head_mut().unwrap().completed = true;
        queue.remove_completed();
        assert!(queue.is_empty());
        assert_eq!(queue.order(), Direction::None);
    }
}
