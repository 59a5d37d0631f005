//! Simulated sensing device: a ground-truth arena and a robot that answers
//! the controller's commands the way the physical robot does.

use crate::config::ArenaConfig;
use crate::error::MapIoError;
use crate::map::Grid;
use crate::message::{Command, Message};
use crate::robot::Robot;
use crate::types::{Cell, Position};
use log::{debug, warn};
use noise::{NoiseFn, Perlin};
use rand::prelude::*;

/// Ground truth the simulated robot senses against.
#[derive(Debug)]
pub struct SimulatedArena {
    grid: Grid,
}

impl SimulatedArena {
    /// No obstacles at all.
    pub fn empty(arena: &ArenaConfig) -> Self {
        Self::with_obstacles(arena, &[])
    }

    pub fn with_obstacles(arena: &ArenaConfig, obstacles: &[Position]) -> Self {
        let mut grid = Grid::from_config(arena);
        let all: Vec<Position> = (0..arena.height as i32)
            .flat_map(|y| (0..arena.width as i32).map(move |x| Position::new(x, y)))
            .collect();
        for pos in all {
            let cell = if obstacles.contains(&pos) { Cell::Obstacle } else { Cell::Clear };
            grid.set_cell(pos, cell);
        }
        Self { grid }
    }

    /// Perlin-noise obstacles; cells above `threshold` are blocked.
    pub fn generate(arena: &ArenaConfig, seed: Option<u32>, threshold: f64) -> Self {
        let seed = seed.unwrap_or_else(|| rand::thread_rng().r#gen());
        debug!("generating arena with seed {seed}");
        let perlin = Perlin::new(seed);
        let (width, height) = (arena.width, arena.height);
        let mut rows = vec![vec![Cell::Clear; width]; height];
        for (y, row) in rows.iter_mut().enumerate() {
            for (x, cell) in row.iter_mut().enumerate() {
                let nx = x as f64 / width as f64;
                let ny = y as f64 / height as f64;
                if perlin.get([nx * 4.0, ny * 4.0]) > threshold {
                    *cell = Cell::Obstacle;
                }
            }
        }
        Self {
            grid: Self::pinned(rows, arena),
        }
    }

    /// Arena from loaded rows; unknown cells count as clear.
    pub fn from_rows(arena: &ArenaConfig, rows: Vec<Vec<Cell>>) -> Result<Self, MapIoError> {
        let grid = Grid::with_cells(rows, arena.start_center, arena.end_center)?;
        Ok(Self { grid })
    }

    // with_cells only fails on ragged rows, which generate never builds
    fn pinned(rows: Vec<Vec<Cell>>, arena: &ArenaConfig) -> Grid {
        match Grid::with_cells(rows, arena.start_center, arena.end_center) {
            Ok(grid) => grid,
            Err(_) => Grid::from_config(arena),
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn obstacle_count(&self) -> usize {
        self.grid.rows().iter().flatten().filter(|c| **c == Cell::Obstacle).count()
    }
}

/// Device-side protocol: acknowledges moves with `robotmove` and reports
/// `mapupdate` readings while exploring.
#[derive(Debug)]
pub struct SimulatedDevice {
    arena: SimulatedArena,
    robot: Robot,
    home: Robot,
    sensing: bool,
    fast_run: bool,
}

impl SimulatedDevice {
    pub fn new(arena: SimulatedArena, config: &ArenaConfig) -> Self {
        let home = Robot::from_config(config);
        Self {
            arena,
            robot: home.clone(),
            home,
            sensing: false,
            fast_run: false,
        }
    }

    pub fn robot(&self) -> &Robot {
        &self.robot
    }

    pub fn arena(&self) -> &SimulatedArena {
        &self.arena
    }

    fn readings(&self) -> Message {
        Message::MapUpdate(self.robot.sensor_readings(self.arena.grid()))
    }

    fn footprint_free(&self, robot: &Robot) -> bool {
        robot
            .footprint()
            .into_iter()
            .all(|pos| matches!(self.arena.grid().get_cell(pos), Some(cell) if cell != Cell::Obstacle))
    }

    /// Replies to one controller message.
    pub fn handle(&mut self, message: &Message) -> Vec<Message> {
        match message {
            Message::Command(command) if command.is_motion() => self.drive(command),
            Message::Command(Command::Explore) => {
                self.sensing = true;
                self.fast_run = false;
                vec![self.readings()]
            }
            Message::Command(Command::EndExplore) => {
                self.sensing = false;
                Vec::new()
            }
            Message::Command(Command::FastRun) => {
                self.fast_run = true;
                Vec::new()
            }
            Message::Command(Command::SensorRequest | Command::Sense) => vec![self.readings()],
            Message::Command(Command::Reset) => {
                self.robot = self.home.clone();
                self.sensing = false;
                self.fast_run = false;
                Vec::new()
            }
            Message::SetRobotPosition(position, orientation) => {
                self.robot.set_pose(*position, *orientation);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn drive(&mut self, command: &Command) -> Vec<Message> {
        let mut moved = self.robot.clone();
        for action in command.actions() {
            moved.execute(action);
            if !self.footprint_free(&moved) {
                warn!("simulated robot cannot {command} from {}", self.robot.position());
                return Vec::new();
            }
        }
        self.robot = moved;
        let mut replies = vec![Message::RobotMove(command.clone())];
        if self.sensing && !self.fast_run {
            replies.push(self.readings());
        }
        replies
    }
}
