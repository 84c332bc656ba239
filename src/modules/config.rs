//! ## Config Module
//!
//! Timing constants, capacity and socket addresses for one deployment of the
//! elevator bank. Every field has a default, so a JSON file only needs to name
//! what it overrides:
//!
//! ```json
//! { "door_time_ms": 1500, "network": { "floor_addr": "127.0.0.1:12000" } }
//! ```

//----------------------------------------------Imports
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::modules::error::ConfigError;

//----------------------------------------------Structs

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub load_time_ms: u64,            // Time per passenger boarding or leaving
    pub door_time_ms: u64,            // Time to open or to close the doors
    pub floors_per_second: f64,
    pub transient_fault_time_ms: u64, // Wait between door retries
    pub max_passengers: usize,
    pub timeout_slack_ms: u64,        // Fixed slack added to every trip budget
    pub num_cars: u8,
    pub network: NetworkConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub dispatcher_addr: SocketAddr,
    pub car_subsystem_addr: SocketAddr,
    pub floor_addr: SocketAddr,
    pub status_timeout_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            load_time_ms: 1000,
            door_time_ms: 3000,
            floors_per_second: 2.0,
            transient_fault_time_ms: 2000,
            max_passengers: 5,
            timeout_slack_ms: 30_000,
            num_cars: 5,
            network: NetworkConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            dispatcher_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            car_subsystem_addr: SocketAddr::from(([127, 0, 0, 1], 6000)),
            floor_addr: SocketAddr::from(([127, 0, 0, 1], 12345)),
            status_timeout_ms: 1000,
        }
    }
}

impl SimConfig {

    /// load
    ///
    /// # Arguments:
    ///
    /// * `path` - &Path - JSON file with any subset of the fields.
    ///
    /// # Returns:
    ///
    /// Returns -Result<SimConfig, ConfigError>- The validated config, defaults filled in.
    ///
    pub fn load(path: &Path) -> Result<SimConfig, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: SimConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Uses the file when one is given, the defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<SimConfig, ConfigError> {
        match path {
            Some(path) => SimConfig::load(path),
            None => {
                info!("no config file given, using defaults");
                Ok(SimConfig::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.floors_per_second > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "floors_per_second must be positive, got {}",
                self.floors_per_second
            )));
        }
        if self.max_passengers == 0 {
            return Err(ConfigError::Invalid("max_passengers must be at least 1".to_string()));
        }
        if self.num_cars == 0 {
            return Err(ConfigError::Invalid("num_cars must be at least 1".to_string()));
        }
        Ok(())
    }

    /// travel_time
    ///
    /// # Arguments:
    ///
    /// * `floors` - u32 - Number of floors to cover.
    ///
    /// # Returns:
    ///
    /// Returns -Duration- `round(floors / floors_per_second * 1000)` milliseconds.
    ///
    pub fn travel_time(&self, floors: u32) -> Duration {
        let millis = (f64::from(floors) / self.floors_per_second * 1000.0).round();
        Duration::from_millis(millis as u64)
    }

    pub fn load_time(&self) -> Duration {
        Duration::from_millis(self.load_time_ms)
    }

    pub fn door_time(&self) -> Duration {
        Duration::from_millis(self.door_time_ms)
    }

    pub fn transient_fault_time(&self) -> Duration {
        Duration::from_millis(self.transient_fault_time_ms)
    }

    pub fn timeout_slack(&self) -> Duration {
        Duration::from_millis(self.timeout_slack_ms)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.network.status_timeout_ms)
    }
}

//----------------------------------TESTS-------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_travel_time() {
        let config = SimConfig::default();
        assert_eq!(config.travel_time(4), Duration::from_millis(2000));
        assert_eq!(config.travel_time(1), Duration::from_millis(500));
        assert_eq!(config.travel_time(0), Duration::ZERO);

        let odd = SimConfig { floors_per_second: 3.0, ..SimConfig::default() };
        assert_eq!(odd.travel_time(1), Duration::from_millis(333));
        assert_eq!(odd.travel_time(2), Duration::from_millis(667));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: SimConfig =
            serde_json::from_str(r#"{ "door_time_ms": 10, "network": { "status_timeout_ms": 50 } }"#).unwrap();
        assert_eq!(config.door_time_ms, 10);
        assert_eq!(config.network.status_timeout_ms, 50);
        assert_eq!(config.max_passengers, 5);
        assert_eq!(config.network.dispatcher_addr.port(), 5000);
        assert_eq!(config.network.car_subsystem_addr.port(), 6000);
        assert_eq!(config.network.floor_addr.port(), 12345);
    }

    #[test]
    fn test_validate_rejects_zero_speed() {
        let config = SimConfig { floors_per_second: 0.0, ..SimConfig::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = SimConfig { max_passengers: 0, ..SimConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), r#"{ "num_cars": 3, "floors_per_second": 4.0 }"#).unwrap();
        let config = SimConfig::load(file.path()).unwrap();
        assert_eq!(config.num_cars, 3);
        assert_eq!(config.travel_time(2), Duration::from_millis(500));
    }
}
