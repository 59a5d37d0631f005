use crate::config::{ArenaConfig, MapUpdateConfig};
use crate::map::{Grid, OverwritePolicy};
use crate::message::{Command, SensorReadings};
use crate::robot::Robot;
use crate::types::{Cell, CellChange, Position};
use log::debug;

/// Result of fusing one set of sensor readings into the grid.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SenseOutcome {
    pub clear: Vec<Position>,
    pub obstacles: Vec<Position>,
    /// Cells whose value actually changed
    pub changes: Vec<CellChange>,
}

/// Overwrite rules for sensor fusion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SensePolicy {
    pub overwrite_obstacle: bool,
    pub overwrite_clear: bool,
}

impl Default for SensePolicy {
    fn default() -> Self {
        Self {
            overwrite_obstacle: false,
            overwrite_clear: true,
        }
    }
}

impl From<&MapUpdateConfig> for SensePolicy {
    fn from(config: &MapUpdateConfig) -> Self {
        Self {
            overwrite_obstacle: config.overwrite_obstacle,
            overwrite_clear: config.overwrite_clear,
        }
    }
}

/// The controller's model: what is known of the arena and where the robot is.
#[derive(Debug)]
pub struct World {
    pub grid: Grid,
    pub robot: Robot,
    arena: ArenaConfig,
}

impl World {
    pub fn new(arena: &ArenaConfig) -> Self {
        Self {
            grid: Grid::from_config(arena),
            robot: Robot::from_config(arena),
            arena: arena.clone(),
        }
    }

    pub fn arena(&self) -> &ArenaConfig {
        &self.arena
    }

    /// Forget everything; grid observers stay registered.
    pub fn reset(&mut self) {
        self.grid.reset();
        self.robot = Robot::from_config(&self.arena);
    }

    pub fn sense(&mut self, readings: &SensorReadings, policy: SensePolicy) -> SenseOutcome {
        let (clear, obstacles) = self.robot.sense_area(readings);
        let mut changes = self.grid.set_cell_list(
            &clear,
            Cell::Clear,
            OverwritePolicy {
                keep_existing_obstacle: !policy.overwrite_obstacle,
                keep_existing_clear: false,
            },
        );
        changes.extend(self.grid.set_cell_list(
            &obstacles,
            Cell::Obstacle,
            OverwritePolicy {
                keep_existing_obstacle: false,
                keep_existing_clear: !policy.overwrite_clear,
            },
        ));
        debug!("sensed {readings}: {} cells changed", changes.len());
        SenseOutcome {
            clear,
            obstacles,
            changes,
        }
    }

    /// Execute an acknowledged motion and pin the new footprint clear.
    pub fn apply_move(&mut self, command: &Command) -> Vec<CellChange> {
        if !self.robot.execute_command(command) {
            return Vec::new();
        }
        self.grid.set_fixed_cells(&self.robot.footprint(), Cell::Clear)
    }

    pub fn robot_at_start(&self) -> bool {
        self.robot.is_at(self.grid.start_center())
    }

    pub fn robot_at_goal(&self) -> bool {
        self.robot.is_at(self.grid.end_center())
    }

    pub fn coverage(&self) -> f64 {
        self.grid.coverage()
    }
}
