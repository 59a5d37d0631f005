//! # Mazerunner Types Module
//!
//! Core data types shared by the grid model, the navigation algorithms and the
//! control state machine.
//!
//! ## Key Components
//!
//! - **Position**: integer grid coordinate (x grows eastward, y grows southward)
//! - **Cell**: the value stored in one grid cell
//! - **CellChange**: one coordinate whose value changed, as reported to observers
//! - **Device**: labels of the external devices exchanging messages with the controller
//! - **Phase**: the top-level phase of the control state machine
//!
//! All types are serializable so they can travel inside configuration files and
//! wire messages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// NOTE - Default arena width (cells along x)
pub const DEFAULT_ARENA_WIDTH: usize = 15;

/// NOTE - Default arena height (cells along y)
pub const DEFAULT_ARENA_HEIGHT: usize = 20;

/// NOTE - Half-size of the square robot footprint and of the protected zones
pub const FOOTPRINT_RADIUS: i32 = 1;

/// NOTE - Grid coordinate; may lie outside the arena while rays are cast
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Position shifted by the given delta, saturating at the `i32` bounds.
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }

    pub fn manhattan(self, other: Position) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// The 3x3 block centered on this position, row by row.
    pub fn block(self) -> Vec<Position> {
        let mut block = Vec::with_capacity(9);
        for dy in -FOOTPRINT_RADIUS..=FOOTPRINT_RADIUS {
            for dx in -FOOTPRINT_RADIUS..=FOOTPRINT_RADIUS {
                block.push(self.offset(dx, dy));
            }
        }
        block
    }
}

impl From<(i32, i32)> for Position {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// NOTE - Enum for all possible cell values on the grid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cell {
    Clear,     // NOTE - Seen and traversable
    Obstacle,  // NOTE - Seen and blocked
    Unknown,   // NOTE - Never observed
    StartZone, // NOTE - Start zone marker (map files only)
    EndZone,   // NOTE - Goal zone marker (map files only)
}

impl Cell {
    /// Numeric value used by map files and `mapstatus` payloads.
    pub const fn value(self) -> u8 {
        match self {
            Cell::Clear => 0,
            Cell::Obstacle => 1,
            Cell::Unknown => 2,
            Cell::StartZone => 3,
            Cell::EndZone => 4,
        }
    }

    pub const fn from_value(value: u8) -> Option<Cell> {
        match value {
            0 => Some(Cell::Clear),
            1 => Some(Cell::Obstacle),
            2 => Some(Cell::Unknown),
            3 => Some(Cell::StartZone),
            4 => Some(Cell::EndZone),
            _ => None,
        }
    }
}

/// A single coordinate whose value changed during a batch mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellChange {
    pub position: Position,
    pub cell: Cell,
}

impl CellChange {
    pub const fn new(position: Position, cell: Cell) -> Self {
        Self { position, cell }
    }
}

impl fmt::Display for CellChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.position, self.cell.value())
    }
}

/// NOTE - Devices connected to the controller
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Android, // NOTE - Operator tablet
    Arduino, // NOTE - Sensor/actuator unit
    Pc,      // NOTE - Operator workstation
}

impl Device {
    pub const ALL: [Device; 3] = [Device::Android, Device::Arduino, Device::Pc];

    pub const fn label(self) -> &'static str {
        match self {
            Device::Android => "android",
            Device::Arduino => "arduino",
            Device::Pc => "pc",
        }
    }

    pub fn from_label(label: &str) -> Option<Device> {
        Device::ALL.into_iter().find(|d| d.label() == label)
    }

    /// Operators may issue commands; the sensing device only reports.
    pub const fn is_command_source(self) -> bool {
        matches!(self, Device::Android | Device::Pc)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// NOTE - Top-level phases of the control state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Ready,           // NOTE - Waiting for operator commands
    Exploring,       // NOTE - Mapping the unknown arena
    ExplorationDone, // NOTE - Map complete, waiting for the fast run
    FastRun,         // NOTE - Running the shortest path to the goal
    End,             // NOTE - Goal reached
}

impl Phase {
    /// Name carried by `stchange` telemetry.
    pub const fn wire_name(self) -> &'static str {
        match self {
            Phase::Ready => "ready",
            Phase::Exploring => "explore",
            Phase::ExplorationDone => "ee",
            Phase::FastRun => "run",
            Phase::End => "end",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Phase> {
        [
            Phase::Ready,
            Phase::Exploring,
            Phase::ExplorationDone,
            Phase::FastRun,
            Phase::End,
        ]
        .into_iter()
        .find(|p| p.wire_name() == name)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}
