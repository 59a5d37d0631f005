//! Controller configuration.
//!
//! Every section is defaulted, so a config file only needs the fields it
//! overrides:
//!
//! ```json
//! { "exploration": { "time_limit_secs": 360 }, "map_save_path": "explored.bin" }
//! ```

use crate::error::ConfigError;
use crate::orientation::AbsoluteOrientation;
use crate::types::{DEFAULT_ARENA_HEIGHT, DEFAULT_ARENA_WIDTH, Device, FOOTPRINT_RADIUS, Position};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub arena: ArenaConfig,
    pub exploration: ExplorationConfig,
    pub map_update: MapUpdateConfig,
    pub fast_run: FastRunConfig,
    pub network: NetworkConfig,
    /// Where the explored map is written when exploration ends
    pub map_save_path: Option<PathBuf>,
}

/// Arena geometry and the robot's initial pose.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    pub width: usize,
    pub height: usize,
    pub start_center: Position,
    pub end_center: Position,
    pub start_orientation: AbsoluteOrientation,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_ARENA_WIDTH,
            height: DEFAULT_ARENA_HEIGHT,
            start_center: Position::new(1, 18),
            end_center: Position::new(13, 1),
            start_orientation: AbsoluteOrientation::East,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorationConfig {
    /// Exploration budget in seconds; no countdown when unset
    pub time_limit_secs: Option<u32>,
    /// Coverage (percent) that ends the first round early
    pub coverage_limit: Option<u32>,
    /// Coverage needed to stop once back at the start
    pub end_coverage_threshold: u32,
    /// Fraction of the time budget left when the robot heads home
    pub go_back_fraction: f64,
    /// Watchdog bound on a move acknowledgement
    pub ack_timeout_ms: Option<u64>,
    /// Walk back to the start once the arena is fully explored
    pub return_to_start: bool,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            time_limit_secs: None,
            coverage_limit: None,
            end_coverage_threshold: 60,
            go_back_fraction: 0.5,
            ack_timeout_ms: Some(3000),
            return_to_start: true,
        }
    }
}

/// Sensor fusion overwrite rules.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapUpdateConfig {
    /// Let a clear reading downgrade a known obstacle
    pub overwrite_obstacle: bool,
    /// Let an obstacle reading overwrite a known clear cell
    pub overwrite_clear: bool,
    /// Emit `mapstatus` telemetry with the changed cells
    pub report_changes: bool,
}

impl Default for MapUpdateConfig {
    fn default() -> Self {
        Self {
            overwrite_obstacle: false,
            overwrite_clear: true,
            report_changes: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FastRunConfig {
    /// Fold consecutive forward moves into `mf*N`
    pub compress: bool,
}

impl Default for FastRunConfig {
    fn default() -> Self {
        Self { compress: true }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_address: String,
    pub android_port: u16,
    pub arduino_port: u16,
    pub pc_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            android_port: 9039,
            arduino_port: 9029,
            pc_port: 9020,
        }
    }
}

impl NetworkConfig {
    pub fn port_for(&self, device: Device) -> u16 {
        match device {
            Device::Android => self.android_port,
            Device::Arduino => self.arduino_port,
            Device::Pc => self.pc_port,
        }
    }

    /// `host:port` the link for `device` listens on.
    pub fn address_for(&self, device: Device) -> String {
        format!("{}:{}", self.bind_address, self.port_for(device))
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let arena = &self.arena;
        let min_side = (2 * FOOTPRINT_RADIUS + 1) as usize;
        if arena.width < min_side || arena.height < min_side {
            return Err(ConfigError::Invalid(format!(
                "arena must be at least {min_side}x{min_side}"
            )));
        }
        for (name, center) in [("start", arena.start_center), ("end", arena.end_center)] {
            if !arena.zone_fits(center) {
                return Err(ConfigError::Invalid(format!(
                    "{name} zone around {center} does not fit in the arena"
                )));
            }
        }
        if !arena.start_orientation.is_travel_direction() {
            return Err(ConfigError::Invalid(format!(
                "start orientation {} is not a travel direction",
                arena.start_orientation
            )));
        }
        let exploration = &self.exploration;
        if !(0.0..=1.0).contains(&exploration.go_back_fraction) {
            return Err(ConfigError::Invalid("go_back_fraction must be within 0..=1".into()));
        }
        if exploration.end_coverage_threshold > 100 || exploration.coverage_limit.is_some_and(|c| c > 100) {
            return Err(ConfigError::Invalid("coverage values are percentages".into()));
        }
        Ok(())
    }
}

impl ArenaConfig {
    /// Whether the 3x3 block centered on `center` lies inside the arena.
    pub fn zone_fits(&self, center: Position) -> bool {
        let r = FOOTPRINT_RADIUS;
        center.x - r >= 0
            && center.y - r >= 0
            && ((center.x + r) as usize) < self.width
            && ((center.y + r) as usize) < self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_the_standard_arena() {
        let config = Config::default();
        assert_eq!(config.arena.width, 15);
        assert_eq!(config.arena.height, 20);
        assert_eq!(config.arena.start_center, Position::new(1, 18));
        assert_eq!(config.exploration.end_coverage_threshold, 60);
        assert!(!config.map_update.overwrite_obstacle);
        assert!(config.map_update.overwrite_clear);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"exploration": {"time_limit_secs": 120}, "network": {"pc_port": 7000}}"#)
                .unwrap();
        assert_eq!(config.exploration.time_limit_secs, Some(120));
        assert_eq!(config.exploration.go_back_fraction, 0.5);
        assert_eq!(config.network.address_for(Device::Pc), "127.0.0.1:7000");
        assert_eq!(config.network.port_for(Device::Arduino), 9029);
    }

    #[test]
    fn zones_must_fit() {
        let mut config = Config::default();
        config.arena.end_center = Position::new(14, 1);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn start_orientation_must_be_a_travel_direction() {
        let mut config = Config::default();
        config.arena.start_orientation = AbsoluteOrientation::NorthEast;
        assert!(config.validate().is_err());
    }
}
