use crate::config::ArenaConfig;
use crate::map::Grid;
use crate::message::{Command, NOTHING_DETECTED, SENSOR_COUNT, SensorReadings};
use crate::orientation::{AbsoluteOrientation, Action, RelativeOrientation};
use crate::types::{Cell, Position};

/// One distance sensor mounted on the robot body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sensor {
    pub slot: RelativeOrientation,
    pub range: u32,
}

/// Mounting order matches the order of the readings in a `mapupdate`.
pub const SENSORS: [Sensor; SENSOR_COUNT] = [
    Sensor { slot: RelativeOrientation::FrontLeft, range: 2 },
    Sensor { slot: RelativeOrientation::FrontRight, range: 2 },
    Sensor { slot: RelativeOrientation::Front, range: 2 },
    Sensor { slot: RelativeOrientation::Left, range: 4 },
    Sensor { slot: RelativeOrientation::Right, range: 2 },
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Robot {
    position: Position,
    orientation: AbsoluteOrientation,
}

impl Robot {
    pub fn new(position: Position, orientation: AbsoluteOrientation) -> Self {
        Self { position, orientation }
    }

    pub fn from_config(arena: &ArenaConfig) -> Self {
        Self::new(arena.start_center, arena.start_orientation)
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn orientation(&self) -> AbsoluteOrientation {
        self.orientation
    }

    // Simulation-only absolute repositioning
    pub fn set_pose(&mut self, position: Position, orientation: Option<AbsoluteOrientation>) {
        self.position = position;
        if let Some(orientation) = orientation {
            self.orientation = orientation;
        }
    }

    pub fn execute(&mut self, action: Action) {
        match action {
            Action::MoveForward => {
                let (dx, dy) = self.orientation.to_pos_change();
                self.position = self.position.offset(dx, dy);
            }
            turn => self.orientation = self.orientation.if_applied(turn),
        }
    }

    /// Apply a motion command. Returns false for non-motion commands.
    pub fn execute_command(&mut self, command: &Command) -> bool {
        if !command.is_motion() {
            return false;
        }
        for action in command.actions() {
            self.execute(action);
        }
        true
    }

    pub fn footprint(&self) -> Vec<Position> {
        self.position.block()
    }

    pub fn head_position(&self) -> Position {
        let (dx, dy) = self.orientation.to_pos_change();
        self.position.offset(dx, dy)
    }

    /// Cell and facing of a sensor at the current pose.
    pub fn sensor_state(&self, sensor: &Sensor) -> (Position, AbsoluteOrientation) {
        let (dx, dy) = sensor.slot.to_pos_change(self.orientation);
        (
            self.position.offset(dx, dy),
            sensor.slot.resolve(self.orientation, true),
        )
    }

    /// Split the cells swept by each ray into clear and obstacle positions.
    pub fn sense_area(&self, readings: &SensorReadings) -> (Vec<Position>, Vec<Position>) {
        let mut clear = Vec::new();
        let mut obstacles = Vec::new();
        for (index, sensor) in SENSORS.iter().enumerate() {
            let (origin, facing) = self.sensor_state(sensor);
            let (dx, dy) = facing.to_pos_change();
            let cell_at = |k: u32| origin.offset(dx * k as i32, dy * k as i32);
            match readings.distance(index) {
                None => clear.extend((0..=sensor.range).map(cell_at)),
                Some(distance) => {
                    clear.extend((0..=distance).map(cell_at));
                    obstacles.push(cell_at(distance + 1));
                }
            }
        }
        (clear, obstacles)
    }

    /// Readings a physical sensor set would report against `truth`.
    pub fn sensor_readings(&self, truth: &Grid) -> SensorReadings {
        let mut values = [NOTHING_DETECTED; SENSOR_COUNT];
        for (value, sensor) in values.iter_mut().zip(SENSORS.iter()) {
            let (mut cell, facing) = self.sensor_state(sensor);
            let (dx, dy) = facing.to_pos_change();
            for distance in 0..sensor.range as i32 {
                cell = cell.offset(dx, dy);
                if matches!(truth.get_cell(cell), None | Some(Cell::Obstacle)) {
                    *value = distance;
                    break;
                }
            }
        }
        SensorReadings::from_valid(values)
    }

    pub fn is_at(&self, position: Position) -> bool {
        self.position == position
    }
}
